//! 任务日志持久化
//!
//! 每个任务一个文本文件 `task_<id>.log`，每行 `[RFC3339] message`，按写入顺序追加。

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::error::AutomationError;

/// 按任务 ID 存取日志文件
#[derive(Debug, Clone)]
pub struct TaskLogStore {
    dir: PathBuf,
}

impl TaskLogStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("task_{}.log", sanitize_id(task_id)))
    }

    /// 追加一行已带时间戳的日志；写入失败只记录诊断日志
    pub fn append(&self, task_id: &str, line: &str) {
        if let Err(e) = self.try_append(task_id, line) {
            tracing::error!(task_id, error = %e, "failed to write task log");
        }
    }

    fn try_append(&self, task_id: &str, line: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(task_id))?;
        writeln!(file, "{}", line)
    }

    /// 读取任务日志全文；从未写过日志或含非法字符的 ID 返回 LogNotFound
    pub fn read(&self, task_id: &str) -> Result<String, AutomationError> {
        // 清洗后不同的 ID 会与别的任务共用文件名，不能读
        if task_id.is_empty() || sanitize_id(task_id) != task_id {
            return Err(AutomationError::LogNotFound(task_id.to_string()));
        }
        let path = self.path_for(task_id);
        if !path.exists() {
            return Err(AutomationError::LogNotFound(task_id.to_string()));
        }
        std::fs::read_to_string(&path).map_err(|e| AutomationError::Internal(e.to_string()))
    }
}

/// ID 来自外部请求，只保留安全字符以免路径逃逸
fn sanitize_id(task_id: &str) -> String {
    task_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}
