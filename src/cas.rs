//! The baseline busy lock, [`CasBusyLock`].

use crate::{internal::state::LockState, lock::BusyLock, stats};
use core::fmt::{self, Debug, Formatter};

/// Busy lock built on a CAS loop over a single state word.
///
/// Read acquisition is **lock-free** while no writer is present: every failed CAS means some other
/// reader succeeded. Under heavy read contention all readers hammer the same cache line, so this
/// lock scales poorly with thread count.
///
/// # Examples
///
/// ```
/// use busylock::{BusyLock, CasBusyLock};
///
/// static LOCK: CasBusyLock = CasBusyLock::new();
///
/// if LOCK.try_acquire() {
///     // read side payload
///     LOCK.release();
/// }
///
/// LOCK.block();
/// assert!(!LOCK.try_acquire());
/// LOCK.unblock();
/// ```
#[derive(Default)]
pub struct CasBusyLock {
    state: LockState,
}

impl Debug for CasBusyLock {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CasBusyLock")
            .field("state", &self.state)
            .finish()
    }
}

impl CasBusyLock {
    #[inline]
    pub const fn new() -> Self {
        CasBusyLock {
            state: LockState::new(),
        }
    }

    /// Number of readers currently inside the lock.
    #[inline]
    pub fn readers(&self) -> u32 {
        self.state.readers()
    }

    /// Whether a writer has requested, or holds, exclusive access.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.state.is_write_requested()
    }
}

impl BusyLock for CasBusyLock {
    #[inline]
    fn try_acquire(&self) -> bool {
        let mut failures = 0;
        let acquired = self.state.try_acquire_with(|_| failures += 1);
        stats::read_cas_failures(failures);
        if !acquired {
            stats::read_rejected();
        }
        acquired
    }

    #[inline]
    fn release(&self) {
        self.state.release()
    }

    fn block(&self) {
        let (failures, yields) = self.state.block();
        stats::write_cas_failures(failures);
        stats::write_wait_yields(yields);
        log::debug!("busy lock blocked after {} reader drain yields", yields);
    }

    #[inline]
    fn unblock(&self) {
        self.state.unblock()
    }
}
