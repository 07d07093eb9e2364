//! 人工输入闸门：单槽位会合点
//!
//! 填写引擎通过 `ask` 提出唯一一个问题并挂起，直到外部调用 `answer` 给出答案。
//! 槽位记录发问任务的 ID，`answer_for` 可校验任务；等待没有超时。

use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::core::error::GateError;
use crate::core::task::TaskId;

struct PendingQuestion {
    task_id: TaskId,
    question: String,
    reply: oneshot::Sender<String>,
}

/// 已登记问题的答案
pub struct PendingAnswer {
    rx: oneshot::Receiver<String>,
}

impl PendingAnswer {
    /// 没有超时；闸门关闭时返回 Closed
    pub async fn wait(self) -> Result<String, GateError> {
        self.rx.await.map_err(|_| GateError::Closed)
    }
}

/// 单槽位问答闸门
#[derive(Default)]
pub struct HumanInputGate {
    slot: Mutex<Option<PendingQuestion>>,
}

impl HumanInputGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 提出问题并挂起直到回答；槽位已被占用时立即返回 AlreadyPending
    pub async fn ask(&self, task_id: &str, question: &str) -> Result<String, GateError> {
        self.open(task_id, question)?.wait().await
    }

    /// 只占用槽位，不等待；调用方可以先发布状态再 `wait`
    pub fn open(&self, task_id: &str, question: &str) -> Result<PendingAnswer, GateError> {
        let mut slot = self.slot.lock().map_err(|_| GateError::Closed)?;
        if let Some(pending) = slot.as_ref() {
            if !pending.reply.is_closed() {
                return Err(GateError::AlreadyPending(pending.task_id.clone()));
            }
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(PendingQuestion {
            task_id: task_id.to_string(),
            question: question.to_string(),
            reply: tx,
        });
        tracing::debug!(task_id, question, "input gate opened");
        Ok(PendingAnswer { rx })
    }

    /// 回答当前问题；无待答问题时为空操作，返回 None
    pub fn answer(&self, value: impl Into<String>) -> Option<TaskId> {
        let pending = self.slot.lock().ok()?.take()?;
        let task_id = pending.task_id;
        if pending.reply.send(value.into()).is_err() {
            tracing::warn!(task_id = %task_id, "answer arrived after the asking task stopped waiting");
            return None;
        }
        Some(task_id)
    }

    /// 带任务 ID 校验的回答；ID 不匹配时不消费槽位
    pub fn answer_for(&self, task_id: &str, value: impl Into<String>) -> Option<TaskId> {
        {
            let slot = self.slot.lock().ok()?;
            match slot.as_ref() {
                Some(pending) if pending.task_id == task_id => {}
                _ => return None,
            }
        }
        self.answer(value)
    }

    /// 当前待答问题（任务 ID，问题文本）
    pub fn pending(&self) -> Option<(TaskId, String)> {
        let slot = self.slot.lock().ok()?;
        slot.as_ref()
            .filter(|p| !p.reply.is_closed())
            .map(|p| (p.task_id.clone(), p.question.clone()))
    }

    /// 关闭指定任务的待答问题，等待方收到 GateError::Closed
    pub fn close_for(&self, task_id: &str) {
        if let Ok(mut slot) = self.slot.lock() {
            if slot.as_ref().is_some_and(|p| p.task_id == task_id) {
                slot.take();
            }
        }
    }

    /// 关闭任何待答问题
    pub fn close(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    async fn wait_pending(gate: &HumanInputGate) -> (TaskId, String) {
        for _ in 0..100 {
            if let Some(p) = gate.pending() {
                return p;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("question never opened");
    }

    #[tokio::test]
    async fn test_ask_then_answer() {
        let gate = Arc::new(HumanInputGate::new());
        let asker = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.ask("t1", "Please provide a value for: Phone").await })
        };

        let (task_id, question) = wait_pending(&gate).await;
        assert_eq!(task_id, "t1");
        assert_eq!(question, "Please provide a value for: Phone");

        assert_eq!(gate.answer("12345"), Some("t1".to_string()));
        assert_eq!(asker.await.unwrap(), Ok("12345".to_string()));
        assert!(gate.pending().is_none());
    }

    #[tokio::test]
    async fn test_answer_without_question_is_noop() {
        let gate = HumanInputGate::new();
        assert_eq!(gate.answer("ignored"), None);
    }

    #[tokio::test]
    async fn test_second_question_is_rejected() {
        let gate = Arc::new(HumanInputGate::new());
        let first = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.ask("t1", "q1").await })
        };
        wait_pending(&gate).await;

        let second = gate.ask("t2", "q2").await;
        assert_eq!(second, Err(GateError::AlreadyPending("t1".to_string())));

        gate.answer("a1");
        assert_eq!(first.await.unwrap(), Ok("a1".to_string()));
    }

    #[tokio::test]
    async fn test_answer_for_checks_task_id() {
        let gate = Arc::new(HumanInputGate::new());
        let asker = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.ask("t1", "q").await })
        };
        wait_pending(&gate).await;

        assert_eq!(gate.answer_for("other", "x"), None);
        assert!(gate.pending().is_some());
        assert_eq!(gate.answer_for("t1", "y"), Some("t1".to_string()));
        assert_eq!(asker.await.unwrap(), Ok("y".to_string()));
    }

    #[tokio::test]
    async fn test_close_wakes_waiter_with_error() {
        let gate = Arc::new(HumanInputGate::new());
        let asker = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.ask("t1", "q").await })
        };
        wait_pending(&gate).await;

        gate.close_for("t1");
        assert_eq!(asker.await.unwrap(), Err(GateError::Closed));
    }

    #[tokio::test]
    async fn test_open_registers_before_wait() {
        let gate = HumanInputGate::new();
        let pending = gate.open("t1", "q").unwrap();
        assert_eq!(gate.pending(), Some(("t1".to_string(), "q".to_string())));
        gate.answer("a");
        assert_eq!(pending.wait().await, Ok("a".to_string()));
    }
}
