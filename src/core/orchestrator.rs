//! 任务编排器：单工作者队列 + 暂停/恢复协议
//!
//! 后台工作者按提交顺序取第一个 pending 任务执行，同一时刻最多一个任务处于 processing / waiting_input。
//! 任务体在独立的 tokio 任务中运行，panic 经 JoinHandle 捕获后记为 failed，不影响后续任务。
//! 每次变更后向订阅者广播完整任务列表。

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::core::error::{AutomationError, GateError};
use crate::core::gate::HumanInputGate;
use crate::core::log_store::TaskLogStore;
use crate::core::store::TaskStore;
use crate::core::task::{format_log_line, Task, TaskId, TaskStatus};
use crate::form::FillContext;

/// 执行单个任务的组件（生产环境为 AutomationService）
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &Task, ctx: &dyn FillContext) -> Result<(), AutomationError>;
}

/// 推送给观察者的事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum QueueEvent {
    /// 任一任务变更后的完整列表
    QueueUpdate(Vec<Task>),
    /// 有任务开始等待人工输入
    RequestInput {
        #[serde(rename = "taskId")]
        task_id: TaskId,
        question: String,
    },
}

impl QueueEvent {
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::QueueUpdate(_) => "queueUpdate",
            QueueEvent::RequestInput { .. } => "requestInput",
        }
    }
}

const EVENT_CAPACITY: usize = 64;

struct Inner {
    store: Arc<dyn TaskStore>,
    gate: HumanInputGate,
    logs: TaskLogStore,
    events: broadcast::Sender<QueueEvent>,
    wake: mpsc::UnboundedSender<()>,
    shutdown: CancellationToken,
    /// 保证广播顺序与变更顺序一致
    publish: Mutex<()>,
}

impl Inner {
    fn publish(&self, event: QueueEvent) {
        // 没有订阅者时 send 返回 Err，忽略即可
        let _ = self.events.send(event);
    }

    /// 修改任务并广播快照
    fn mutate(&self, id: &str, mut f: impl FnMut(&mut Task)) -> Option<Task> {
        let _guard = self.publish.lock().unwrap_or_else(PoisonError::into_inner);
        let updated = self.store.update(id, &mut f);
        if updated.is_some() {
            self.publish(QueueEvent::QueueUpdate(self.store.list()));
        }
        updated
    }

    /// 按状态机迁移；非法迁移只记 warn，不修改任务
    fn transition(
        &self,
        id: &str,
        next: TaskStatus,
        question: Option<String>,
        error: Option<String>,
    ) -> bool {
        let mut applied = false;
        self.mutate(id, |task| {
            if task.status.can_transition_to(next) {
                task.status = next;
                task.current_question = question.clone();
                task.error = error.clone();
                applied = true;
            } else {
                tracing::warn!(
                    task_id = %task.id,
                    from = ?task.status,
                    to = ?next,
                    "rejected invalid status transition"
                );
            }
        });
        applied
    }

    /// waiting_input -> processing，并清除问题；其他状态不动
    fn resume(&self, id: &str) {
        self.mutate(id, |task| {
            if task.status == TaskStatus::WaitingInput {
                task.status = TaskStatus::Processing;
                task.current_question = None;
            }
        });
    }

    fn append_log(&self, id: &str, message: &str) {
        let line = format_log_line(Utc::now(), message);
        tracing::debug!(task_id = %id, "{}", message);
        self.mutate(id, |task| task.logs.push(line.clone()));
        self.logs.append(id, &line);
    }

    /// 提交顺序中第一个 pending 任务
    fn next_pending(&self) -> Option<Task> {
        self.store
            .list()
            .into_iter()
            .find(|t| t.status == TaskStatus::Pending)
    }

    async fn run_one(self: &Arc<Self>, task: Task, runner: Arc<dyn TaskRunner>) {
        let id = task.id.clone();
        if !self.transition(&id, TaskStatus::Processing, None, None) {
            return;
        }
        tracing::info!(task_id = %id, url = %task.url, "task started");

        let handle = TaskHandle {
            inner: Arc::clone(self),
            task_id: id.clone(),
        };
        let joined = tokio::spawn(async move { runner.run(&task, &handle).await }).await;

        let failure = match joined {
            Ok(Ok(())) => None,
            Ok(Err(e)) if e.is_fatal() => Some(e.to_string()),
            Ok(Err(e)) => {
                tracing::warn!(task_id = %id, error = %e, "non-fatal error escaped task body");
                self.append_log(&id, &format!("Warning: {}", e));
                None
            }
            Err(join) => Some(AutomationError::Internal(format!("task aborted: {}", join)).to_string()),
        };

        self.gate.close_for(&id);
        match failure {
            None => {
                self.transition(&id, TaskStatus::Completed, None, None);
                tracing::info!(task_id = %id, "task completed");
            }
            Some(message) => {
                self.append_log(&id, &format!("ERROR: {}", message));
                // waiting_input 中途 panic 时先回到 processing，再进入 failed
                self.resume(&id);
                self.transition(&id, TaskStatus::Failed, None, Some(message.clone()));
                tracing::error!(task_id = %id, error = %message, "task failed");
            }
        }
    }
}

/// 单个任务的填写上下文：日志写入任务，提问经由闸门
struct TaskHandle {
    inner: Arc<Inner>,
    task_id: TaskId,
}

#[async_trait]
impl FillContext for TaskHandle {
    fn log(&self, message: &str) {
        self.inner.append_log(&self.task_id, message);
    }

    async fn ask_user(&self, question: &str) -> Result<String, GateError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(GateError::Closed);
        }
        // 先占用槽位，观察者看到 waiting_input 时问题已可回答
        let pending = self.inner.gate.open(&self.task_id, question)?;
        self.inner.transition(
            &self.task_id,
            TaskStatus::WaitingInput,
            Some(question.to_string()),
            None,
        );
        self.inner.publish(QueueEvent::RequestInput {
            task_id: self.task_id.clone(),
            question: question.to_string(),
        });

        let answer = pending.wait().await;
        // 正常回答时 answer_for 已切回 processing；闸门关闭时在这里补上
        self.inner.resume(&self.task_id);
        answer
    }
}

/// 任务编排器
#[derive(Clone)]
pub struct TaskOrchestrator {
    inner: Arc<Inner>,
}

impl TaskOrchestrator {
    /// 创建编排器并启动后台工作者（需在 tokio 运行时内调用）
    pub fn start(runner: Arc<dyn TaskRunner>, store: Arc<dyn TaskStore>, logs: TaskLogStore) -> Self {
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(Inner {
            store,
            gate: HumanInputGate::new(),
            logs,
            events,
            wake: wake_tx,
            shutdown: CancellationToken::new(),
            publish: Mutex::new(()),
        });
        tokio::spawn(worker(Arc::clone(&inner), runner, wake_rx));
        Self { inner }
    }

    /// 创建 pending 任务并唤醒工作者，立即返回
    pub fn submit(&self, url: impl Into<String>, form_data: Value) -> Task {
        let task = Task::new(url, form_data);
        {
            let _guard = self
                .inner
                .publish
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.store.insert(task.clone());
            self.inner
                .publish(QueueEvent::QueueUpdate(self.inner.store.list()));
        }
        tracing::info!(task_id = %task.id, url = %task.url, "task queued");
        let _ = self.inner.wake.send(());
        task
    }

    /// 全部任务（提交顺序）
    pub fn list_tasks(&self) -> Vec<Task> {
        self.inner.store.list()
    }

    pub fn get_task(&self, id: &str) -> Option<Task> {
        self.inner.store.get(id)
    }

    /// 回答当前唯一的待答问题；没有时为空操作，返回 None
    pub fn answer_pending_question(&self, value: impl Into<String>) -> Option<TaskId> {
        let (task_id, _) = self.inner.gate.pending()?;
        self.answer_for(&task_id, value)
    }

    /// 带任务 ID 的回答；ID 与待答问题不符时返回 None
    pub fn answer_for(&self, task_id: &str, value: impl Into<String>) -> Option<TaskId> {
        match self.inner.gate.pending() {
            Some((pending, _)) if pending == task_id => {}
            _ => return None,
        }
        self.inner.resume(task_id);
        self.inner.gate.answer_for(task_id, value)
    }

    /// 当前待答问题（任务 ID，问题文本）
    pub fn pending_question(&self) -> Option<(TaskId, String)> {
        self.inner.gate.pending()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// 读取持久化的任务日志；从未产生日志时返回 LogNotFound
    pub fn read_log(&self, task_id: &str) -> Result<String, AutomationError> {
        self.inner.logs.read(task_id)
    }

    /// 停止启动新任务并关闭待答问题；正在执行的任务跳过该字段后继续收尾
    pub fn shutdown(&self) {
        tracing::info!("orchestrator shutting down");
        self.inner.shutdown.cancel();
        self.inner.gate.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

async fn worker(inner: Arc<Inner>, runner: Arc<dyn TaskRunner>, mut wake: mpsc::UnboundedReceiver<()>) {
    loop {
        tokio::select! {
            biased;
            _ = inner.shutdown.cancelled() => break,
            msg = wake.recv() => {
                if msg.is_none() {
                    break;
                }
            }
        }
        while !inner.shutdown.is_cancelled() {
            let Some(task) = inner.next_pending() else {
                break;
            };
            inner.run_one(task, Arc::clone(&runner)).await;
        }
    }
    tracing::debug!("orchestrator worker stopped");
}
