//! The wait-free reader busy lock, [`IncrementBusyLock`].

use crate::{lock::BusyLock, stats};
use core::{
    fmt::{self, Debug, Formatter},
    sync::atomic::{
        AtomicBool, AtomicU32,
        Ordering::{Release, SeqCst},
    },
};
use std::thread;

/// Busy lock whose readers never retry.
///
/// A reader unconditionally increments the reader count and only then looks at the writer flag,
/// backing its increment out if a writer is present. There is no CAS loop, so read acquisition is
/// **wait-free** on targets where the increment is a single instruction (`lock xadd` on x86).
///
/// # Writer starvation
///
/// The writer can starve. It sets its flag and waits for the reader count to reach zero, but every
/// arriving reader bumps the count before noticing the flag:
///
/// - the writer sets the flag;
/// - reader A increments (0 -> 1);
/// - the writer sees one reader and retries;
/// - reader B increments (1 -> 2);
/// - reader A sees the flag, decrements and returns `false` (2 -> 1);
/// - the writer still sees one reader and retries again, and so on.
///
/// New readers keep failing, yet the writer never observes zero. This is accepted in exchange for
/// the shorter read path. Mutual exclusion is best-effort for the same reason, and the writer flag
/// is a plain store, so only one writer may ever be waiting.
///
/// # Examples
///
/// ```
/// use busylock::{BusyLock, IncrementBusyLock};
///
/// let lock = IncrementBusyLock::new();
/// assert!(lock.try_acquire());
/// lock.release();
///
/// lock.block();
/// assert!(!lock.try_acquire());
/// assert_eq!(lock.readers(), 0);
/// ```
#[derive(Default)]
pub struct IncrementBusyLock {
    readers: AtomicU32,
    writer:  AtomicBool,
}

impl Debug for IncrementBusyLock {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("IncrementBusyLock")
            .field("readers", &self.readers.load(SeqCst))
            .field("writer", &self.writer.load(SeqCst))
            .finish()
    }
}

impl IncrementBusyLock {
    #[inline]
    pub const fn new() -> Self {
        IncrementBusyLock {
            readers: AtomicU32::new(0),
            writer:  AtomicBool::new(false),
        }
    }

    /// Number of readers currently counted, including readers about to back out.
    #[inline]
    pub fn readers(&self) -> u32 {
        self.readers.load(SeqCst)
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.writer.load(SeqCst)
    }
}

impl BusyLock for IncrementBusyLock {
    #[inline]
    fn try_acquire(&self) -> bool {
        // SeqCst on both sides: the increment must be visible to a writer that already stored its
        // flag, or the reader must see that flag.
        let _ = self.readers.fetch_add(1, SeqCst);

        if unlikely!(self.writer.load(SeqCst)) {
            let _ = self.readers.fetch_sub(1, SeqCst);
            stats::read_rejected();
            return false;
        }

        true
    }

    #[inline]
    fn release(&self) {
        let _prev = self.readers.fetch_sub(1, Release);
        debug_assert!(_prev != 0, "attempt to release an unacquired `IncrementBusyLock`");
    }

    fn block(&self) {
        self.writer.store(true, SeqCst);

        let mut yields = 0;
        while self.readers.load(SeqCst) != 0 {
            thread::yield_now();
            yields += 1;
        }
        stats::write_wait_yields(yields);
        log::debug!("increment lock blocked after {} reader drain yields", yields);
    }

    #[inline]
    fn unblock(&self) {
        self.writer.store(false, Release)
    }
}
