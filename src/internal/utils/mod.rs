use core::sync::atomic::{AtomicU64, Ordering};

mod node;

pub use node::{Node, Sentinel};
pub(crate) use node::Link;

/// Highest level a node can be assigned.
pub const MAX_LEVEL: usize = 15;

/// Number of per-level chains the sentinel carries.
pub const NUM_LEVELS: usize = MAX_LEVEL + 1;

/// Bits of entropy consumed per coin flip. Two bits give a continuation
/// probability of 1/4.
pub(crate) const BRANCH_BITS: u32 = 2;

const BRANCH_MASK: u64 = (1 << BRANCH_BITS) - 1;

static LIST_IDS: AtomicU64 = AtomicU64::new(1);

/// Hands out a process-unique identity for every list, so handles can be
/// checked against the list they came from.
pub(crate) fn next_list_id() -> u64 {
    LIST_IDS.fetch_add(1, Ordering::Relaxed)
}

/// Maps one 64-bit entropy value to a level in `0..=MAX_LEVEL`.
///
/// Every zero pair of low bits is a successful coin flip, so the result is
/// geometrically distributed with `P(level = L) = 0.75 * 0.25^L` as long as
/// the entropy is unpredictable. The tail is clamped to [`MAX_LEVEL`].
///
/// ```
/// use bfs_skiplist::random_level;
///
/// assert_eq!(random_level(0b01), 0);
/// assert_eq!(random_level(0b0100), 1);
/// assert_eq!(random_level(0), 0);
/// assert_eq!(random_level(1 << 62), 15);
/// ```
pub fn random_level(mut entropy: u64) -> usize {
    let mut level = 0;

    while entropy != 0 && entropy & BRANCH_MASK == 0 {
        entropy >>= BRANCH_BITS;
        level += 1;
    }

    core::cmp::min(level, MAX_LEVEL)
}

pub(crate) struct ListState {
    pub(crate) len: usize,
    pub(crate) level: usize,
    pub(crate) seed: u64,
}

impl ListState {
    pub(crate) fn new() -> Self {
        Self::with_seed(rand::random())
    }

    pub(crate) fn with_seed(seed: u64) -> Self {
        ListState {
            len: 0,
            level: 0,
            // xorshift never leaves zero
            seed: seed.max(1),
        }
    }

    /// Advances the xorshift64 state and returns it as entropy for the next
    /// node level.
    pub(crate) fn next_entropy(&mut self) -> u64 {
        let seed = &mut self.seed;
        *seed ^= *seed << 13;
        *seed ^= *seed >> 7;
        *seed ^= *seed << 17;

        *seed
    }
}
