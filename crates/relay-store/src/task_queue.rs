//! Serialized execution of store work.
//!
//! Work that touches the record tiers after an asynchronous boundary
//! (a network response, a cache read) is queued as a [`Task`] and run in
//! submission order, one task to completion before the next.

use std::collections::VecDeque;
use std::fmt;

use crate::error::StoreError;
use crate::store_data::StoreData;

/// A unit of work against the store.
pub type Task = Box<dyn FnOnce(&mut StoreData) -> Result<(), StoreError>>;

/// FIFO queue of [`Task`]s.
#[derive(Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue::default()
    }

    pub fn enqueue(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").field("pending", &self.tasks.len()).finish()
    }
}
