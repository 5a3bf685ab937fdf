//! A global allocator for the test binary that can be told to fail.
//!
//! Failure is armed per thread, so tests running in parallel keep allocating
//! normally.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::ptr;

struct FailingAlloc;

#[global_allocator]
static ALLOC: FailingAlloc = FailingAlloc;

thread_local! {
    // allocations this thread may still make, usize::MAX when disarmed
    static ALLOWED: Cell<usize> = const { Cell::new(usize::MAX) };
}

fn should_fail() -> bool {
    ALLOWED
        .try_with(|allowed| match allowed.get() {
            usize::MAX => false,
            0 => true,
            n => {
                allowed.set(n - 1);
                false
            }
        })
        .unwrap_or(false)
}

unsafe impl GlobalAlloc for FailingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if should_fail() {
            return ptr::null_mut();
        }

        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

struct Disarm;

impl Drop for Disarm {
    fn drop(&mut self) {
        let _ = ALLOWED.try_with(|allowed| allowed.set(usize::MAX));
    }
}

/// Runs `f` with the first `allowed` allocations of this thread succeeding
/// and every later one returning null.
pub(crate) fn with_failing_alloc<R>(allowed: usize, f: impl FnOnce() -> R) -> R {
    let _disarm = Disarm;
    ALLOWED.with(|slot| slot.set(allowed));

    f()
}

#[cfg(test)]
mod test_alloc_test {
    use super::*;

    #[test]
    fn test_fails_after_allowed() {
        let (first, second) = with_failing_alloc(1, || {
            (Vec::<u8>::new().try_reserve(8), Vec::<u8>::new().try_reserve(8))
        });

        assert!(first.is_ok());
        assert!(second.is_err());

        let mut after = Vec::<u8>::new();
        assert!(after.try_reserve(8).is_ok());
    }
}
