//! 任务存储
//!
//! 编排器只通过 TaskStore 访问任务，内存实现之外可替换为持久化后端。
//! `list` 必须按提交顺序返回。

use std::sync::RwLock;

use crate::core::task::Task;

/// 任务存储 trait
pub trait TaskStore: Send + Sync {
    fn insert(&self, task: Task);

    /// 原地修改任务并返回修改后的快照；任务不存在时返回 None
    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Task)) -> Option<Task>;

    fn get(&self, id: &str) -> Option<Task>;

    /// 按提交顺序的全部任务
    fn list(&self) -> Vec<Task>;
}

/// 内存任务存储（进程生命周期内保留全部任务）
#[derive(Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn insert(&self, task: Task) {
        if let Ok(mut tasks) = self.tasks.write() {
            tasks.push(task);
        }
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut Task)) -> Option<Task> {
        let mut tasks = self.tasks.write().ok()?;
        let task = tasks.iter_mut().find(|t| t.id == id)?;
        f(task);
        Some(task.clone())
    }

    fn get(&self, id: &str) -> Option<Task> {
        let tasks = self.tasks.read().ok()?;
        tasks.iter().find(|t| t.id == id).cloned()
    }

    fn list(&self) -> Vec<Task> {
        match self.tasks.read() {
            Ok(tasks) => tasks.clone(),
            Err(_) => vec![],
        }
    }
}
