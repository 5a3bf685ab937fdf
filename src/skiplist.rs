//! The single-threaded priority skip list.
//!
//! Mutation takes `&mut self`, so exclusive access is checked at compile
//! time. To share a list between threads, put it behind a lock.

pub use crate::internal::skiplist::{iter, NodeHandle, SkipList};
