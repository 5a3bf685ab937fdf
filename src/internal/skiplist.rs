use core::{fmt::Debug, marker::PhantomData, ptr::NonNull};

use tracing::{debug, trace};

use crate::error::{or_abort, InvariantViolation, Result, SkipListError};
use crate::internal::utils::{
    next_list_id, random_level, Link, ListState, Node, Sentinel, NUM_LEVELS,
};

/// A skip list of borrowed values ordered by a `u64` priority.
///
/// Keys may repeat; equal keys come out in insertion order. The minimum is
/// always the sentinel's level-0 successor, so [`SkipList::first`] is O(1).
/// Entries are removed through the [`NodeHandle`] returned on insertion, which
/// unlinks them in O(level) without searching.
///
/// The list stores `&'a T` and never drops or frees the values themselves.
/// Mutation takes `&mut self`; share a list between threads behind a lock.
pub struct SkipList<'a, T> {
    head: NonNull<Node<'a, T>>,
    state: ListState,
    id: u64,
}

unsafe impl<'a, T: Sync> Send for SkipList<'a, T> {}

unsafe impl<'a, T: Sync> Sync for SkipList<'a, T> {}

impl<'a, T> SkipList<'a, T> {
    /// Instantiates a new, empty [SkipList](SkipList), aborting if the sentinel
    /// cannot be allocated.
    pub fn new() -> Self {
        or_abort(Self::try_new())
    }

    pub fn try_new() -> Result<Self> {
        Sentinel::try_new().map(Self::with_sentinel)
    }

    /// Builds an empty list around an already allocated sentinel.
    pub fn with_sentinel(sentinel: Sentinel<'a, T>) -> Self {
        Self::from_parts(sentinel, ListState::new())
    }

    /// An empty list whose self-generated entropy starts from `seed`, for
    /// reproducible level assignment through [`SkipList::insert_random`].
    pub fn with_seed(seed: u64) -> Self {
        or_abort(Self::try_with_seed(seed))
    }

    /// Like [`SkipList::with_seed`], but reports a failed sentinel allocation.
    /// No system entropy is drawn.
    pub fn try_with_seed(seed: u64) -> Result<Self> {
        let sentinel = Sentinel::try_new()?;

        Ok(Self::from_parts(sentinel, ListState::with_seed(seed)))
    }

    fn from_parts(sentinel: Sentinel<'a, T>, state: ListState) -> Self {
        SkipList {
            head: sentinel.into_raw(),
            state,
            id: next_list_id(),
        }
    }

    pub fn len(&self) -> usize {
        self.state.len
    }

    pub fn is_empty(&self) -> bool {
        self.state.len < 1
    }

    /// The current height: the highest level of any linked node, or 0.
    pub fn level(&self) -> usize {
        self.state.level
    }

    /// Identity of this list, shared by every handle it issues.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The sentinel node.
    pub fn header(&self) -> &Node<'a, T> {
        unsafe { self.head.as_ref() }
    }

    /// The node with the smallest key, earliest inserted among ties.
    pub fn first(&self) -> Option<&Node<'a, T>> {
        let first = self.header().links[0].next;

        if self.is_head(first) {
            None
        } else {
            unsafe { Some(&*first) }
        }
    }

    pub fn peek_min(&self) -> Option<(u64, &'a T)> {
        let first = self.first()?;

        first.value.map(|value| (first.key, value))
    }

    /// Inserts `value` under `key`, using `entropy` to pick the node's level.
    /// Aborts if the node cannot be allocated.
    pub fn insert(&mut self, key: u64, value: &'a T, entropy: u64) -> NodeHandle<'a, T> {
        or_abort(self.try_insert(key, value, entropy))
    }

    /// Inserts with entropy drawn from the list's own xorshift state.
    pub fn insert_random(&mut self, key: u64, value: &'a T) -> NodeHandle<'a, T> {
        or_abort(self.try_insert_random(key, value))
    }

    pub fn try_insert_random(&mut self, key: u64, value: &'a T) -> Result<NodeHandle<'a, T>> {
        let entropy = self.state.next_entropy();
        self.try_insert(key, value, entropy)
    }

    /// Inserts `value` under `key`. The node lands after every node whose key
    /// is less than or equal to `key`. On allocation failure the list is left
    /// untouched.
    pub fn try_insert(
        &mut self,
        key: u64,
        value: &'a T,
        entropy: u64,
    ) -> Result<NodeHandle<'a, T>> {
        let head = self.head.as_ptr();
        let mut update = [head; NUM_LEVELS];

        unsafe {
            let mut prev = head;

            for level in (0..=self.state.level).rev() {
                loop {
                    let next = Node::link(prev, level).next;

                    // the sentinel closes every chain, whatever key it holds
                    if self.is_head(next) || (*next).key > key {
                        break;
                    }

                    prev = next;
                }

                update[level] = prev;
            }
        }

        // Grow by at most one level per insertion. update[level] is already
        // the sentinel for every level above the current height.
        let level = core::cmp::min(random_level(entropy), self.state.level + 1);

        let node = Node::alloc(key, Some(value), level, level + 1)?;

        if level > self.state.level {
            self.state.level = level;
            debug!(list = self.id, level, "list height grew");
        }

        unsafe { Self::link_node(node.as_ptr(), &update) };

        self.state.len += 1;
        trace!(list = self.id, key, level, "inserted node");

        Ok(NodeHandle {
            node,
            list: self.id,
            key,
            level,
            value,
        })
    }

    /// This function is unsafe, as it does not check whether node or the
    /// predecessors are valid pointers.
    /// To call this function safely:
    /// - node must be freshly allocated and not linked anywhere
    /// - update[i] must be a linked node of this list reaching level i, for
    ///   every level of node
    unsafe fn link_node(node: *mut Node<'a, T>, update: &[*mut Node<'a, T>; NUM_LEVELS]) {
        for (level, &prev) in update.iter().enumerate().take((*node).level + 1) {
            let next = Node::link(prev, level).next;

            *Node::link_mut(node, level) = Link { next, prev };
            Node::link_mut(prev, level).next = node;
            Node::link_mut(next, level).prev = node;
        }
    }

    /// Unlinks and frees the node behind `handle`, returning its value.
    ///
    /// Runs in O(level + 1) without touching any other part of the list. A
    /// handle issued by another list is rejected.
    pub fn remove(&mut self, handle: NodeHandle<'a, T>) -> Result<&'a T> {
        if !self.owns(&handle) {
            return Err(SkipListError::ForeignHandle {
                list: self.id,
                handle_list: handle.list,
            });
        }

        let NodeHandle {
            node,
            key,
            level,
            value,
            ..
        } = handle;

        unsafe {
            Self::unlink(node.as_ptr());
            Node::dealloc(node);
        }

        self.state.len -= 1;
        trace!(list = self.id, key, level, "removed node");

        if level == self.state.level {
            self.shrink();
        }

        Ok(value)
    }

    /// Logically removes the node from the list by linking its adjacent nodes
    /// to one-another.
    unsafe fn unlink(node: *mut Node<'a, T>) {
        for level in 0..=(*node).level {
            let Link { next, prev } = Node::link(node, level);

            Node::link_mut(prev, level).next = next;
            Node::link_mut(next, level).prev = prev;
        }
    }

    /// Lowers the height past every empty top level.
    fn shrink(&mut self) {
        let head = self.header();
        let mut level = self.state.level;

        while level > 0
            && self.is_head(head.links[level].next)
            && self.is_head(head.links[level].prev)
        {
            level -= 1;
        }

        if level != self.state.level {
            debug!(list = self.id, from = self.state.level, to = level, "list height shrank");
            self.state.level = level;
        }
    }

    /// Whether `handle` was issued by this list.
    pub fn owns(&self, handle: &NodeHandle<'a, T>) -> bool {
        handle.list == self.id
    }

    /// The node behind `handle`, if the handle belongs to this list.
    pub fn get(&self, handle: &NodeHandle<'a, T>) -> Option<&Node<'a, T>> {
        if self.owns(handle) {
            unsafe { Some(handle.node.as_ref()) }
        } else {
            None
        }
    }

    /// Walks level 0 from the minimum to the maximum.
    pub fn iter(&self) -> iter::Iter<'_, 'a, T> {
        iter::Iter::from_list(self, 0)
    }

    #[cfg(test)]
    pub(crate) fn chain(&self, level: usize) -> iter::Iter<'_, 'a, T> {
        iter::Iter::from_list(self, level)
    }

    fn is_head(&self, ptr: *const Node<'a, T>) -> bool {
        core::ptr::eq(ptr, self.head.as_ptr())
    }

    /// Verifies the structure: every chain is circular, sorted and doubly
    /// linked, holds exactly the nodes tall enough for it, and the recorded
    /// height and length match what is linked.
    pub fn check_invariants(&self) -> core::result::Result<(), InvariantViolation> {
        let mut tall_enough = [0usize; NUM_LEVELS];
        let mut highest = 0;

        for node in self.iter().take(self.state.len + 1) {
            for count in tall_enough.iter_mut().take(node.level + 1) {
                *count += 1;
            }

            highest = core::cmp::max(highest, node.level);
        }

        if tall_enough[0] != self.state.len {
            return Err(InvariantViolation::Length {
                recorded: self.state.len,
                counted: tall_enough[0],
            });
        }

        if highest != self.state.level {
            return Err(InvariantViolation::Height {
                recorded: self.state.level,
                actual: highest,
            });
        }

        for (level, &expected) in tall_enough.iter().enumerate() {
            self.check_chain(level, expected)?;
        }

        Ok(())
    }

    fn check_chain(
        &self,
        level: usize,
        expected: usize,
    ) -> core::result::Result<(), InvariantViolation> {
        let mut prev = self.header();
        let mut counted = 0;

        loop {
            let next = match prev.next(level) {
                Some(next) => next,
                None => {
                    return Err(InvariantViolation::TooHigh {
                        level,
                        node_level: prev.level,
                    })
                }
            };

            if !next.prev(level).map_or(false, |back| core::ptr::eq(back, prev)) {
                return Err(InvariantViolation::BrokenLink {
                    level,
                    key: next.key,
                });
            }

            if self.is_head(next) {
                break;
            }

            if next.level < level {
                return Err(InvariantViolation::TooHigh {
                    level,
                    node_level: next.level,
                });
            }

            if !prev.is_sentinel() && prev.key > next.key {
                return Err(InvariantViolation::Unsorted {
                    level,
                    prev_key: prev.key,
                    key: next.key,
                });
            }

            counted += 1;
            if counted > self.state.len {
                return Err(InvariantViolation::Unterminated { level });
            }

            prev = next;
        }

        if counted != expected {
            return Err(InvariantViolation::ChainLength {
                level,
                counted,
                expected,
            });
        }

        Ok(())
    }
}

impl<'a, T> Default for SkipList<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> Drop for SkipList<'a, T> {
    fn drop(&mut self) {
        let head = self.head.as_ptr();

        unsafe {
            let mut node = Node::link(head, 0).next;

            while node != head {
                let temp = node;
                node = Node::link(temp, 0).next;
                Node::dealloc(NonNull::new_unchecked(temp));
            }

            Node::dealloc(self.head);
        }
    }
}

impl<'a, T> Debug for SkipList<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipList")
            .field("id", &self.id)
            .field("len", &self.state.len)
            .field("level", &self.state.level)
            .field(
                "keys",
                &self.iter().map(|node| node.key).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Proof of a node's membership in a list, returned by insertion and
/// consumed by [`SkipList::remove`].
///
/// A handle cannot be cloned, so every node is removed at most once. Dropping
/// a handle leaves its node linked until the list itself is dropped.
#[must_use = "a node can only be removed through its handle"]
pub struct NodeHandle<'a, T> {
    node: NonNull<Node<'a, T>>,
    list: u64,
    key: u64,
    level: usize,
    value: &'a T,
}

unsafe impl<'a, T: Sync> Send for NodeHandle<'a, T> {}

unsafe impl<'a, T: Sync> Sync for NodeHandle<'a, T> {}

impl<'a, T> NodeHandle<'a, T> {
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn value(&self) -> &'a T {
        self.value
    }

    /// Identity of the list that issued this handle.
    pub fn list_id(&self) -> u64 {
        self.list
    }

    /// Whether this handle refers to `node`.
    pub fn points_to(&self, node: &Node<'a, T>) -> bool {
        core::ptr::eq(self.node.as_ptr(), node)
    }
}

impl<'a, T> Debug for NodeHandle<'a, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("node", &self.node)
            .field("list", &self.list)
            .field("key", &self.key)
            .field("level", &self.level)
            .finish()
    }
}

pub mod iter {
    use super::*;

    /// Walks one level's chain from the sentinel's successor back around to
    /// the sentinel.
    pub struct Iter<'l, 'a, T> {
        head: *const Node<'a, T>,
        next: *const Node<'a, T>,
        level: usize,
        _lt: PhantomData<&'l Node<'a, T>>,
    }

    impl<'l, 'a, T> Iter<'l, 'a, T> {
        pub(crate) fn from_list(list: &'l SkipList<'a, T>, level: usize) -> Self {
            let head = list.head.as_ptr() as *const Node<'a, T>;

            Iter {
                head,
                next: list.header().links[level].next,
                level,
                _lt: PhantomData,
            }
        }
    }

    impl<'l, 'a, T> Iterator for Iter<'l, 'a, T> {
        type Item = &'l Node<'a, T>;

        fn next(&mut self) -> Option<Self::Item> {
            if core::ptr::eq(self.next, self.head) {
                return None;
            }

            unsafe {
                let node = &*self.next;
                self.next = node.links[self.level].next as *const _;

                Some(node)
            }
        }
    }

    impl<'l, 'a, T> IntoIterator for &'l SkipList<'a, T> {
        type Item = &'l Node<'a, T>;
        type IntoIter = Iter<'l, 'a, T>;

        fn into_iter(self) -> Self::IntoIter {
            self.iter()
        }
    }
}
