//! Run guard used to drop overlapping sweep invocations.

use std::sync::atomic::{AtomicBool, Ordering};

/// Flag that admits at most one holder at a time. Acquisition fails instead
/// of waiting, so an overlapping invocation is dropped rather than queued.
#[derive(Debug, Default)]
pub(crate) struct RunLatch(AtomicBool);

impl RunLatch {
    pub(crate) const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Returns a guard when the latch was free; `None` when already held.
    pub(crate) fn try_acquire(&self) -> Option<RunGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then_some(RunGuard(&self.0))
    }
}

/// Releases the latch on drop, including on unwind.
#[derive(Debug)]
pub(crate) struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::RunLatch;

    #[test]
    fn second_acquisition_fails_until_guard_drops() {
        let latch = RunLatch::new();
        let guard = latch.try_acquire().expect("latch should be free");
        assert!(latch.try_acquire().is_none());
        drop(guard);
        assert!(latch.try_acquire().is_some());
    }
}
