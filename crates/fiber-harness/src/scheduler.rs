#![forbid(unsafe_code)]

//! A manually drained microtask queue.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use fiber_core::{BatchScheduler, Task};

/// Tasks allowed in one [`MicrotaskQueue::run_until_idle`] before it assumes
/// the queue never settles.
pub const RUN_LIMIT: usize = 10_000;

/// FIFO of batch tasks. Clones share the same queue.
#[derive(Clone, Default)]
pub struct MicrotaskQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
    ran: Rc<Cell<usize>>,
}

impl std::fmt::Debug for MicrotaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicrotaskQueue")
            .field("queued", &self.len())
            .field("ran", &self.ran.get())
            .finish()
    }
}

impl MicrotaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The queue as the scheduler handed to a root.
    #[must_use]
    pub fn scheduler(&self) -> Rc<dyn BatchScheduler> {
        Rc::new(self.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Tasks run over the queue's lifetime.
    #[must_use]
    pub fn ran(&self) -> usize {
        self.ran.get()
    }

    /// Run the oldest task. Returns `false` when the queue was empty.
    pub fn run_one(&self) -> bool {
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                self.ran.set(self.ran.get() + 1);
                true
            }
            None => false,
        }
    }

    /// Run tasks, including ones queued while running, until none are left.
    /// Returns the number run.
    ///
    /// # Panics
    ///
    /// Panics after [`RUN_LIMIT`] tasks.
    pub fn run_until_idle(&self) -> usize {
        let mut count = 0;
        while self.run_one() {
            count += 1;
            assert!(count <= RUN_LIMIT, "microtask queue did not settle after {RUN_LIMIT} tasks");
        }
        count
    }
}

impl BatchScheduler for MicrotaskQueue {
    fn schedule_batch(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_queued_while_running_also_run() {
        let queue = MicrotaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let (inner_queue, inner_log) = (queue.clone(), Rc::clone(&log));
        queue.schedule_batch(Box::new(move || {
            inner_log.borrow_mut().push(1);
            let log = Rc::clone(&inner_log);
            inner_queue.schedule_batch(Box::new(move || log.borrow_mut().push(2)));
        }));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.run_until_idle(), 2);
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert!(queue.is_empty());
    }
}
