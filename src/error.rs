use std::alloc::Layout;
use std::collections::TryReserveError;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SkipListError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SkipListError {
    /// The allocator returned null for a sentinel or node allocation.
    #[error("skip list allocation of {} bytes failed", .layout.size())]
    Alloc { layout: Layout },

    /// The link storage of a node could not be sized at all.
    #[error("link storage reservation failed: {0}")]
    Reserve(#[from] TryReserveError),

    /// The handle was issued by a different list.
    #[error("node handle belongs to list {handle_list}, not list {list}")]
    ForeignHandle { list: u64, handle_list: u64 },

    #[error("entity is already linked into a run queue")]
    AlreadyQueued,
}

/// A structural problem found by [`SkipList::check_invariants`].
///
/// [`SkipList::check_invariants`]: crate::SkipList::check_invariants
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("level {level}: key {key} does not link back to its predecessor")]
    BrokenLink { level: usize, key: u64 },

    #[error("level {level}: key {key} follows larger key {prev_key}")]
    Unsorted {
        level: usize,
        prev_key: u64,
        key: u64,
    },

    #[error("level {level}: chain does not return to the sentinel")]
    Unterminated { level: usize },

    #[error("level {level}: node of level {node_level} is linked above its height")]
    TooHigh { level: usize, node_level: usize },

    #[error("level {level}: chain holds {counted} nodes, {expected} expected")]
    ChainLength {
        level: usize,
        counted: usize,
        expected: usize,
    },

    #[error("list height is {recorded}, highest linked node is at {actual}")]
    Height { recorded: usize, actual: usize },

    #[error("list length is {recorded}, level 0 holds {counted} nodes")]
    Length { recorded: usize, counted: usize },
}

/// Unwraps the result of an allocation-only fallible path, aborting the
/// process on allocation failure the way infallible std collections do.
pub(crate) fn or_abort<T>(result: Result<T>) -> T {
    match result {
        Ok(val) => val,
        Err(SkipListError::Alloc { layout }) => std::alloc::handle_alloc_error(layout),
        // same as a `Vec` whose capacity overflows
        Err(SkipListError::Reserve(err)) => panic!("{}", err),
        Err(err) => unreachable!("allocation path reported {}", err),
    }
}
