extern crate alloc;

use alloc::alloc::{alloc, dealloc, Layout};

use core::{
    fmt::{Debug, Display},
    mem,
    ptr::{self, NonNull},
};

use crate::error::{Result, SkipListError};

use super::NUM_LEVELS;

/// One level's neighbors. Chains are circular, so both pointers are always
/// valid once a node is linked; they are only null between allocation and
/// splicing.
pub(crate) struct Link<'a, T> {
    pub(crate) next: *mut Node<'a, T>,
    pub(crate) prev: *mut Node<'a, T>,
}

impl<'a, T> Link<'a, T> {
    fn unlinked() -> Self {
        Link {
            next: ptr::null_mut(),
            prev: ptr::null_mut(),
        }
    }
}

impl<'a, T> Clone for Link<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for Link<'a, T> {}

/// An entry of the list.
///
/// A node holds a priority `key`, a borrowed `value` and one [`Link`] per
/// level it participates in (`level + 1` of them). The sentinel is a node
/// too: it carries the maximum key, no value and a link for every level.
pub struct Node<'a, T> {
    pub(crate) level: usize,
    pub(crate) key: u64,
    pub(crate) value: Option<&'a T>,
    pub(crate) links: Vec<Link<'a, T>>,
}

impl<'a, T> Node<'a, T> {
    /// Allocates a node with `width` unlinked levels.
    ///
    /// Both allocations are fallible: the link storage is reserved with
    /// `try_reserve_exact` and the node itself goes through the global
    /// allocator directly.
    pub(crate) fn alloc(
        key: u64,
        value: Option<&'a T>,
        level: usize,
        width: usize,
    ) -> Result<NonNull<Self>> {
        debug_assert!(width > level && width <= NUM_LEVELS);

        let mut links = Vec::new();

        if let Err(err) = links.try_reserve_exact(width) {
            return Err(match Layout::array::<Link<'a, T>>(width) {
                Ok(layout) => SkipListError::Alloc { layout },
                Err(_) => SkipListError::Reserve(err),
            });
        }

        links.resize(width, Link::unlinked());

        let layout = Layout::new::<Self>();
        let ptr = unsafe { alloc(layout) }.cast::<Self>();

        let node = NonNull::new(ptr).ok_or(SkipListError::Alloc { layout })?;

        unsafe {
            ptr::write(
                node.as_ptr(),
                Node {
                    level,
                    key,
                    value,
                    links,
                },
            )
        };

        Ok(node)
    }

    /// This function is unsafe, as `ptr` must come from [`Node::alloc`] and
    /// must not be used again afterwards.
    pub(crate) unsafe fn dealloc(ptr: NonNull<Self>) {
        ptr::drop_in_place(ptr.as_ptr());
        dealloc(ptr.as_ptr().cast(), Layout::new::<Self>());
    }

    /// Copies the link at `level` out of the node behind `this`.
    ///
    /// This function is unsafe, as `this` must point to a live node with at
    /// least `level + 1` links.
    pub(crate) unsafe fn link(this: *const Self, level: usize) -> Link<'a, T> {
        (&(*this).links)[level]
    }

    /// Borrows the link at `level` of the node behind `this` for writing,
    /// without borrowing the rest of the node.
    ///
    /// This function is unsafe, as `this` must point to a live node with at
    /// least `level + 1` links, and no other reference to that link may be
    /// alive while the returned one is used.
    pub(crate) unsafe fn link_mut<'l>(this: *mut Self, level: usize) -> &'l mut Link<'a, T> {
        &mut (&mut (*this).links)[level]
    }

    /// The level this node was assigned at insertion. It never changes.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    /// The caller's value, or `None` for the sentinel.
    pub fn value(&self) -> Option<&'a T> {
        self.value
    }

    pub fn is_sentinel(&self) -> bool {
        self.value.is_none()
    }

    /// The successor at `level`, or `None` if this node does not reach that
    /// level. Chains are circular: the last node's successor is the sentinel.
    pub fn next(&self, level: usize) -> Option<&Node<'a, T>> {
        self.links.get(level).map(|link| unsafe { &*link.next })
    }

    /// The predecessor at `level`, or `None` if this node does not reach that
    /// level.
    pub fn prev(&self, level: usize) -> Option<&Node<'a, T>> {
        self.links.get(level).map(|link| unsafe { &*link.prev })
    }

    /// Number of chains this node has storage for.
    #[cfg(test)]
    pub(crate) fn width(&self) -> usize {
        self.links.len()
    }
}

impl<'a, T> Debug for Node<'a, T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("level", &self.level)
            .field(
                "links",
                &self.links.iter().fold(String::new(), |acc, link| {
                    format!("{}[{:?}, {:?}], ", acc, link.prev, link.next)
                }),
            )
            .finish()
    }
}

impl<'a, T> Display for Node<'a, T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        (0..=self.level).try_for_each(|level| {
            writeln!(
                f,
                "[key:  {:?}, value: {:?}, level: {}]",
                self.key, self.value, level,
            )
        })
    }
}

/// The boundary node of a list: head and tail of every level's circular
/// chain. Created once and handed to [`SkipList::with_sentinel`], which owns
/// it from then on.
///
/// [`SkipList::with_sentinel`]: crate::SkipList::with_sentinel
pub struct Sentinel<'a, T> {
    head: NonNull<Node<'a, T>>,
}

impl<'a, T> Sentinel<'a, T> {
    /// Allocates a sentinel whose every level links back to itself.
    pub fn try_new() -> Result<Self> {
        let head = Node::alloc(u64::MAX, None, 0, NUM_LEVELS)?;

        unsafe {
            let ptr = head.as_ptr();
            for link in (&mut (*ptr).links).iter_mut() {
                link.next = ptr;
                link.prev = ptr;
            }
        }

        Ok(Sentinel { head })
    }

    /// Like [`Sentinel::try_new`], but aborts through the allocation error
    /// handler if the allocator fails.
    pub fn new() -> Self {
        crate::error::or_abort(Self::try_new())
    }

    pub(crate) fn into_raw(self) -> NonNull<Node<'a, T>> {
        let head = self.head;
        mem::forget(self);
        head
    }

    pub fn node(&self) -> &Node<'a, T> {
        unsafe { self.head.as_ref() }
    }
}

impl<'a, T> Default for Sentinel<'a, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T> Drop for Sentinel<'a, T> {
    fn drop(&mut self) {
        unsafe { Node::dealloc(self.head) };
    }
}
