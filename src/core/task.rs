//! 任务模型：一次表单提交作业
//!
//! 状态机：pending -> processing；processing <-> waiting_input；processing -> completed | failed。

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 任务 ID（创建时间的毫秒时间戳字符串，保证单调递增）
pub type TaskId = String;

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 等待执行
    Pending,
    /// 正在执行
    Processing,
    /// 等待人工补全缺失字段
    WaitingInput,
    /// 已完成
    Completed,
    /// 执行失败
    Failed,
}

impl TaskStatus {
    /// 状态机允许的边
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, WaitingInput)
                | (WaitingInput, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// 占用执行槽位（processing / waiting_input）
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Processing | TaskStatus::WaitingInput)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// 表单提交任务
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub url: String,
    /// 用户提供的数据记录，原样传给映射服务
    pub form_data: Value,
    pub status: TaskStatus,
    /// 仅在 waiting_input 时存在
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question: Option<String>,
    /// 追加式日志，每行带时间戳
    pub logs: Vec<String>,
    /// 仅在 failed 时存在
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(url: impl Into<String>, form_data: Value) -> Self {
        Self {
            id: next_task_id(),
            url: url.into(),
            form_data: parse_form_data(form_data),
            status: TaskStatus::Pending,
            current_question: None,
            logs: Vec::new(),
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// 若 formData 以 JSON 字符串形式提交，则解析为结构化记录；否则原样保留
fn parse_form_data(form_data: Value) -> Value {
    match form_data {
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
            _ => Value::String(raw),
        },
        other => other,
    }
}

/// 带时间戳的日志行：`[RFC3339] message`
pub fn format_log_line(at: DateTime<Utc>, message: &str) -> String {
    format!(
        "[{}] {}",
        at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        message
    )
}

static LAST_TASK_MILLIS: AtomicI64 = AtomicI64::new(0);

fn next_task_id() -> TaskId {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_TASK_MILLIS.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_TASK_MILLIS.compare_exchange_weak(
            last,
            candidate,
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate.to_string(),
            Err(actual) => last = actual,
        }
    }
}
