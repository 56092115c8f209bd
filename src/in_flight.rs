//! in_flight.rs - Compare-and-set "already running" flag
//!
//! Shared between the tick and background tasks. A second caller that finds
//! the flag set gets nothing back and is expected to skip its work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicBool>);

impl InFlight {
    pub fn new() -> Self {
        InFlight::default()
    }

    /// Set the flag if it was clear; the caller must `release` later
    pub fn try_claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Claim the flag for the lifetime of the returned guard
    pub fn try_begin(&self) -> Option<InFlightGuard> {
        self.try_claim().then(|| InFlightGuard(self.clone()))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Clears the flag on drop
#[derive(Debug)]
pub struct InFlightGuard(InFlight);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}
