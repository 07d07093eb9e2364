//! 自动化错误类型
//!
//! 只有 Configuration / Extraction / Browser（页面打不开）以及未预料的错误会让任务进入 failed；
//! Mapping / Fill / SubmissionNotFound / NavigationTimeout 在任务内部被吸收，只体现在任务日志里。

use thiserror::Error;

/// 任务执行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AutomationError {
    /// 缺少外部服务凭据（如 GEMINI_API_KEY），在任何页面交互之前终止任务
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 没有抽取到任何可用字段
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// 映射服务失败；调用方降级为「全部未映射」
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// 单个字段填写失败；记录日志后跳过该字段
    #[error("Fill error on \"{label}\": {reason}")]
    Fill { label: String, reason: String },

    #[error("Submit control not found")]
    SubmissionNotFound,

    #[error("Navigation did not occur within {0} ms")]
    NavigationTimeout(u64),

    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("Input error: {0}")]
    Input(#[from] GateError),

    #[error("Log not found for task {0}")]
    LogNotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    pub fn fill(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fill {
            label: label.into(),
            reason: reason.into(),
        }
    }

    /// 是否会让任务进入 failed
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Mapping(_)
                | Self::Fill { .. }
                | Self::SubmissionNotFound
                | Self::NavigationTimeout(_)
        )
    }
}

/// 浏览器驱动错误
#[derive(Error, Debug, Clone)]
pub enum BrowserError {
    #[error("Launch failed: {0}")]
    Launch(String),

    #[error("Navigate failed: {0}")]
    Navigate(String),

    #[error("Script \"{name}\" failed: {reason}")]
    Script { name: String, reason: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Session closed")]
    Closed,
}

/// 人工输入闸门错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    /// 已有一个未回答的问题（单槽位）
    #[error("Another question is already pending for task {0}")]
    AlreadyPending(String),

    /// 等待期间闸门被关闭（任务结束或进程关闭）
    #[error("Input gate closed before an answer arrived")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AutomationError::Configuration("no key".into()).is_fatal());
        assert!(AutomationError::Extraction("empty".into()).is_fatal());
        assert!(AutomationError::Browser(BrowserError::Closed).is_fatal());
        assert!(!AutomationError::Mapping("timeout".into()).is_fatal());
        assert!(!AutomationError::fill("Phone", "boom").is_fatal());
        assert!(!AutomationError::SubmissionNotFound.is_fatal());
        assert!(!AutomationError::NavigationTimeout(5000).is_fatal());
    }

    #[test]
    fn test_fill_error_message() {
        let err = AutomationError::fill("Phone", "element detached");
        assert_eq!(err.to_string(), "Fill error on \"Phone\": element detached");
    }
}
