//! Non-reentrant guards for the session's critical sections.

use std::sync::atomic::{AtomicU8, Ordering};

const FREE: u8 = 0;
const HELD: u8 = 1;
const CLOSED: u8 = 2;

/// A try-lock whose guard releases on drop, including during unwinding.
///
/// A closed latch can never be acquired again.
#[derive(Debug, Default)]
pub struct Latch {
    state: AtomicU8,
}

impl Latch {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(FREE),
        }
    }

    pub fn try_acquire(&self) -> Option<LatchGuard<'_>> {
        self.state
            .compare_exchange(FREE, HELD, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LatchGuard { latch: self })
    }

    pub fn is_held(&self) -> bool {
        self.state.load(Ordering::Acquire) == HELD
    }

    pub fn close(&self) {
        self.state.store(CLOSED, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) == CLOSED
    }
}

#[must_use = "the latch is released as soon as the guard is dropped"]
pub struct LatchGuard<'a> {
    latch: &'a Latch,
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        // a close() while held must survive the release
        let _ = self.latch.state.compare_exchange(
            HELD,
            FREE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let latch = Latch::new();
        let guard = latch.try_acquire();
        assert!(guard.is_some());
        assert!(latch.try_acquire().is_none());
        drop(guard);
        assert!(latch.try_acquire().is_some());
    }

    #[test]
    fn test_released_on_panic() {
        let latch = Latch::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = latch.try_acquire();
            panic!("resolver blew up");
        }));
        assert!(result.is_err());
        assert!(!latch.is_held());
    }

    #[test]
    fn test_close_outlives_guard() {
        let latch = Latch::new();
        let guard = latch.try_acquire();
        latch.close();
        drop(guard);
        assert!(latch.is_closed());
        assert!(latch.try_acquire().is_none());
    }
}
