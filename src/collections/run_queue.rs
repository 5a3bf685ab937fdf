use core::cell::Cell;

use tracing::warn;

use crate::error::{Result, SkipListError};
use crate::internal::skiplist::{NodeHandle, SkipList};

/// An entity that can sit in a [RunQueue](RunQueue).
///
/// The entity keeps the handle of its own node, so it can be taken off the
/// queue at any time without a search.
pub trait Queued<'a>: Sized + 'a {
    fn node_slot(&self) -> &Cell<Option<NodeHandle<'a, Self>>>;

    fn is_queued(&self) -> bool {
        let handle = self.node_slot().take();
        let queued = handle.is_some();
        self.node_slot().set(handle);

        queued
    }
}

/// [RunQueue](RunQueue) is implemented using a [SkipList](crate::SkipList) and
/// orders borrowed entities by a `u64` priority, lowest first. Entities with
/// equal priority run in the order they were queued.
pub struct RunQueue<'a, T>
where
    T: Queued<'a>,
{
    queue: SkipList<'a, T>,
}

impl<'a, T> RunQueue<'a, T>
where
    T: Queued<'a>,
{
    pub fn new() -> Self {
        RunQueue {
            queue: SkipList::new(),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        RunQueue {
            queue: SkipList::with_seed(seed),
        }
    }

    pub fn try_with_seed(seed: u64) -> Result<Self> {
        SkipList::try_with_seed(seed).map(|queue| RunQueue { queue })
    }

    /// Queues `task` under `key`, storing the node handle in the task.
    pub fn enqueue(&mut self, task: &'a T, key: u64) -> Result<()> {
        if task.is_queued() {
            return Err(SkipListError::AlreadyQueued);
        }

        let handle = self.queue.try_insert_random(key, task)?;
        task.node_slot().set(Some(handle));

        Ok(())
    }

    /// Like [RunQueue::enqueue](RunQueue::enqueue), with caller-supplied
    /// entropy for the node level, e.g. a nanosecond timestamp.
    pub fn enqueue_with_entropy(&mut self, task: &'a T, key: u64, entropy: u64) -> Result<()> {
        if task.is_queued() {
            return Err(SkipListError::AlreadyQueued);
        }

        let handle = self.queue.try_insert(key, task, entropy)?;
        task.node_slot().set(Some(handle));

        Ok(())
    }

    /// Takes `task` off the queue. Returns `false` if it was not queued.
    pub fn dequeue(&mut self, task: &'a T) -> Result<bool> {
        let slot = task.node_slot();

        match slot.take() {
            None => Ok(false),
            Some(handle) if self.queue.owns(&handle) => self.queue.remove(handle).map(|_| true),
            Some(handle) => {
                let err = SkipListError::ForeignHandle {
                    list: self.queue.id(),
                    handle_list: handle.list_id(),
                };
                slot.set(Some(handle));

                Err(err)
            }
        }
    }

    /// Moves a task to a new priority. Its position among equal keys is reset
    /// to the back.
    pub fn requeue(&mut self, task: &'a T, key: u64) -> Result<()> {
        self.dequeue(task)?;
        self.enqueue(task, key)
    }

    /// The task with the lowest key, in O(1).
    pub fn peek(&self) -> Option<&'a T> {
        self.queue.peek_min().map(|(_, task)| task)
    }

    pub fn peek_key(&self) -> Option<u64> {
        self.queue.peek_min().map(|(key, _)| key)
    }

    /// Removes and returns the task with the lowest key.
    ///
    /// Returns `None` if the queue is empty. It also returns `None`, leaving
    /// the task queued, if the first task's slot does not hold the handle of
    /// its node; [`RunQueue::len`] can then be non-zero after `pop` gave
    /// `None`. Slots only go out of step when a [`Queued`] implementation
    /// hands out a cell other than the one its task was queued with.
    pub fn pop(&mut self) -> Option<&'a T> {
        let first = self.queue.first()?;
        let task = first.value()?;

        let handle = match task.node_slot().take() {
            Some(handle) => handle,
            None => {
                warn!(key = first.key(), "first task holds no node handle");
                return None;
            }
        };

        if !handle.points_to(first) {
            warn!(key = first.key(), "first task holds the handle of another node");
            task.node_slot().set(Some(handle));
            return None;
        }

        self.queue.remove(handle).ok()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued tasks with their keys, in run order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &'a T)> + '_ {
        self.queue
            .iter()
            .filter_map(|node| node.value().map(|task| (node.key(), task)))
    }
}

impl<'a, T> Default for RunQueue<'a, T>
where
    T: Queued<'a>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> Drop for RunQueue<'a, T>
where
    T: Queued<'a>,
{
    fn drop(&mut self) {
        // handles of a dropped queue are dead, clear them so the tasks can be
        // queued elsewhere
        for node in self.queue.iter() {
            if let Some(task) = node.value() {
                task.node_slot().set(None);
            }
        }
    }
}

#[cfg(test)]
mod run_queue_test {
    use std::cmp::Reverse;
    use std::collections::BinaryHeap;

    use super::*;

    struct Task<'a> {
        pid: usize,
        node: Cell<Option<NodeHandle<'a, Task<'a>>>>,
    }

    impl<'a> Task<'a> {
        fn new(pid: usize) -> Self {
            Task {
                pid,
                node: Cell::new(None),
            }
        }
    }

    impl<'a> Queued<'a> for Task<'a> {
        fn node_slot(&self) -> &Cell<Option<NodeHandle<'a, Self>>> {
            &self.node
        }
    }

    fn tasks<'a>(n: usize) -> Vec<Task<'a>> {
        (0..n).map(Task::new).collect()
    }

    #[test]
    fn test_enqueue_pop() {
        let tasks = tasks(3);
        let mut queue = RunQueue::new();

        queue.enqueue(&tasks[0], 5).unwrap();
        queue.enqueue(&tasks[1], 3).unwrap();
        queue.enqueue(&tasks[2], 8).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.peek().map(|t| t.pid), Some(1));
        assert_eq!(queue.peek_key(), Some(3));

        let order: Vec<usize> = std::iter::from_fn(|| queue.pop()).map(|t| t.pid).collect();
        assert_eq!(order, vec![1, 0, 2]);

        assert!(queue.is_empty());
        assert!(tasks.iter().all(|t| !t.is_queued()));
    }

    #[test]
    fn test_enqueue_twice() {
        let tasks = tasks(1);
        let mut queue = RunQueue::new();

        queue.enqueue(&tasks[0], 1).unwrap();

        assert_eq!(queue.enqueue(&tasks[0], 2), Err(SkipListError::AlreadyQueued));
        assert_eq!(queue.len(), 1);
        assert!(tasks[0].is_queued());
    }

    #[test]
    fn test_dequeue() {
        let tasks = tasks(4);
        let mut queue = RunQueue::with_seed(11);

        for (key, task) in tasks.iter().enumerate() {
            queue.enqueue(task, key as u64).unwrap();
        }

        assert_eq!(queue.dequeue(&tasks[0]), Ok(true));
        assert_eq!(queue.dequeue(&tasks[0]), Ok(false));
        assert_eq!(queue.dequeue(&tasks[2]), Ok(true));

        let pids: Vec<usize> = queue.iter().map(|(_, t)| t.pid).collect();
        assert_eq!(pids, vec![1, 3]);
        assert!(!tasks[0].is_queued());
    }

    #[test]
    fn test_dequeue_from_other_queue() {
        let tasks = tasks(1);
        let mut queue = RunQueue::new();
        let mut other = RunQueue::new();

        other.enqueue(&tasks[0], 1).unwrap();

        assert!(matches!(
            queue.dequeue(&tasks[0]),
            Err(SkipListError::ForeignHandle { .. })
        ));
        assert!(tasks[0].is_queued());
        assert_eq!(other.dequeue(&tasks[0]), Ok(true));
    }

    #[test]
    fn test_requeue() {
        let tasks = tasks(3);
        let mut queue = RunQueue::new();

        queue.enqueue(&tasks[0], 1).unwrap();
        queue.enqueue(&tasks[1], 2).unwrap();
        queue.enqueue(&tasks[2], 2).unwrap();

        queue.requeue(&tasks[0], 2).unwrap();

        let pids: Vec<usize> = queue.iter().map(|(_, t)| t.pid).collect();
        assert_eq!(pids, vec![1, 2, 0]);
    }

    #[test]
    fn test_equal_keys_round_robin() {
        let tasks = tasks(5);
        let mut queue = RunQueue::new();

        for task in tasks.iter() {
            queue
                .enqueue_with_entropy(task, 10, rand::random())
                .unwrap();
        }

        let order: Vec<usize> = std::iter::from_fn(|| queue.pop()).map(|t| t.pid).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_drop_clears_slots() {
        let tasks = tasks(10);

        {
            let mut queue = RunQueue::new();
            for task in tasks.iter() {
                queue.enqueue(task, rand::random()).unwrap();
            }
        }

        assert!(tasks.iter().all(|t| !t.is_queued()));

        let mut queue = RunQueue::new();
        queue.enqueue(&tasks[0], 1).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_pop_with_swapped_slots() {
        let tasks = tasks(2);
        let mut queue = RunQueue::new();

        queue.enqueue(&tasks[0], 1).unwrap();
        queue.enqueue(&tasks[1], 2).unwrap();

        tasks[0].node.swap(&tasks[1].node);

        assert!(queue.pop().is_none());
        assert_eq!(queue.len(), 2);
        assert!(tasks.iter().all(|t| t.is_queued()));

        tasks[0].node.swap(&tasks[1].node);

        assert_eq!(queue.pop().map(|t| t.pid), Some(0));
        assert_eq!(queue.pop().map(|t| t.pid), Some(1));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_try_with_seed() {
        use crate::internal::test_alloc::with_failing_alloc;

        let tasks = tasks(1);

        let failed = with_failing_alloc(0, || RunQueue::<'_, Task<'_>>::try_with_seed(5));
        assert!(matches!(failed, Err(SkipListError::Alloc { .. })));

        let mut queue = RunQueue::try_with_seed(5).unwrap();
        queue.enqueue(&tasks[0], 4).unwrap();
        assert_eq!(queue.peek_key(), Some(4));
    }

    #[test]
    fn test_with_std() {
        let n = 10_000;
        let tasks = tasks(n);
        let mut seed: u8 = rand::random();
        let mut queue: RunQueue<'_, Task<'_>> = RunQueue::new();
        let mut sq = BinaryHeap::new();

        for task in tasks.iter() {
            seed ^= seed << 4;
            seed ^= seed >> 3;
            seed ^= seed << 5;

            match seed % 5 {
                0 => {
                    let expected = sq.pop().map(|Reverse((_, pid))| pid);
                    assert_eq!(expected, queue.pop().map(|t| t.pid));
                }
                _ => {
                    sq.push(Reverse((seed, task.pid)));
                    queue.enqueue(task, seed as u64).unwrap();
                }
            }
        }

        while let Some(Reverse((_, pid))) = sq.pop() {
            assert_eq!(queue.pop().map(|t| t.pid), Some(pid));
        }

        assert!(queue.is_empty());
    }
}
