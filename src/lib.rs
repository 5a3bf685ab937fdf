//! A priority skip list for run queues.
//!
//! Entries are keyed by a `u64` priority and hold a borrowed value. The entry
//! with the smallest key is always the first node of the lowest level, so it
//! can be read in O(1). Insertion returns a [NodeHandle](NodeHandle) that
//! removes the entry again in O(level) without a search, which lets a
//! scheduler keep the handle next to the task it belongs to.
//!
//! ```
//! use bfs_skiplist::SkipList;
//!
//! let (a, b, c) = ("a", "b", "c");
//! let mut list = SkipList::new();
//!
//! let ha = list.insert(5, &a, 0b01);
//! let _hb = list.insert(3, &b, 0b0100);
//! let _hc = list.insert(8, &c, 0b10);
//!
//! assert_eq!(list.peek_min(), Some((3, &"b")));
//!
//! list.remove(ha).unwrap();
//! let keys: Vec<u64> = list.iter().map(|node| node.key()).collect();
//! assert_eq!(keys, vec![3, 8]);
//! ```
#![warn(
    // missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]
pub mod collections;
pub mod error;
mod internal;
pub mod skiplist;

pub use error::{InvariantViolation, Result, SkipListError};
pub use skiplist::{iter, NodeHandle, SkipList};
pub use internal::utils::{random_level, Node, Sentinel, MAX_LEVEL, NUM_LEVELS};
