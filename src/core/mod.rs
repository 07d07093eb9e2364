//! 核心编排层：任务模型、错误、人工输入闸门、任务存储与日志、编排器

pub mod error;
pub mod gate;
pub mod log_store;
pub mod orchestrator;
pub mod store;
pub mod task;

pub use error::{AutomationError, BrowserError, GateError};
pub use gate::{HumanInputGate, PendingAnswer};
pub use log_store::TaskLogStore;
pub use orchestrator::{QueueEvent, TaskOrchestrator, TaskRunner};
pub use store::{InMemoryTaskStore, TaskStore};
pub use task::{format_log_line, Task, TaskId, TaskStatus};
