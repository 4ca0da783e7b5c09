//! In-memory task table owned by the scheduler
//!
//! Tasks stay here for their whole life, terminal states included. The only
//! removal is the cancel of a task that never started.

use crate::task::{Task, TaskId, TaskStatus};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: HashMap<TaskId, Task>,
    /// Insertion order, for stable listings
    order: Vec<TaskId>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, task: Task) {
        let id = task.id;
        if self.tasks.insert(id, task).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn remove(&mut self, id: &TaskId) -> Option<Task> {
        let removed = self.tasks.remove(id);
        if removed.is_some() {
            self.order.retain(|existing| existing != id);
        }
        removed
    }

    /// Replace the stored snapshot; snapshots of removed tasks are dropped
    pub fn update(&mut self, task: Task) -> bool {
        match self.tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task;
                true
            }
            None => false,
        }
    }

    /// Move a pending task to in-progress and hand out a copy for its worker
    ///
    /// Returns `None` when the task is gone or no longer pending, so a task
    /// cancelled while queued is never picked up.
    pub fn claim(&mut self, id: &TaskId) -> Option<Task> {
        let task = self.tasks.get_mut(id)?;
        if task.status != TaskStatus::Pending {
            return None;
        }
        task.mark_started();
        Some(task.clone())
    }

    /// All tasks in creation order
    pub fn all(&self) -> Vec<Task> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskContext, TaskType};

    fn task() -> Task {
        Task::new(TaskType::Analysis, "demo", 0, TaskContext::default(), Vec::new())
    }

    #[test]
    fn test_listing_keeps_creation_order() {
        let mut store = TaskStore::new();
        let first = task();
        let second = task();
        let ids = vec![first.id, second.id];
        store.insert(first);
        store.insert(second);

        let listed: Vec<TaskId> = store.all().iter().map(|t| t.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn test_claim_only_pending_tasks() {
        let mut store = TaskStore::new();
        let task = task();
        let id = task.id;
        store.insert(task);

        let claimed = store.claim(&id).unwrap();
        assert_eq!(claimed.status, TaskStatus::InProgress);
        assert!(claimed.started_at.is_some());
        assert!(store.claim(&id).is_none());
    }

    #[test]
    fn test_update_after_removal_is_dropped() {
        let mut store = TaskStore::new();
        let task = task();
        let id = task.id;
        store.insert(task.clone());

        assert!(store.remove(&id).is_some());
        assert!(!store.update(task));
        assert!(store.is_empty());
    }
}
