//! 任务队列：有序任务 + 游标
//!
//! 不变量 0 ≤ cursor ≤ len；cursor == len 表示本阶段完成。

use serde::Serialize;

use crate::pipeline::types::Task;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskQueue {
    tasks: Vec<Task>,
    cursor: usize,
}

impl TaskQueue {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks, cursor: 0 }
    }

    /// 整体替换任务并把游标归零
    pub fn replace(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
        self.cursor = 0;
    }

    pub fn current(&self) -> Option<&Task> {
        self.tasks.get(self.cursor)
    }

    pub fn advance(&mut self) {
        if self.cursor < self.tasks.len() {
            self.cursor += 1;
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.tasks.len()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}
