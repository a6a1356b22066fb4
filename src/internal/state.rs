//! The reader count and writer-pending flag shared by most of the busy locks, packed into a single
//! atomic word.
//!
//! The low 30 bits count the active readers. Bit 30 is set once a writer has asked for exclusive
//! access, and from then on no read acquisition can succeed. A write acquisition is complete only
//! when the word is exactly `WRITER_BIT`, i.e. every reader that got in before the bit was set has
//! released.
//!
//! The spinning queue reuses the same word per node, where the writer bit means "the item has been
//! claimed" and the readers are threads inspecting the item in place.

use core::{
    fmt::{self, Debug, Formatter},
    sync::atomic::{
        AtomicU32,
        Ordering::{Acquire, Relaxed, Release},
    },
};
use std::thread;

/// Set once a writer has requested exclusive access.
pub const WRITER_BIT: u32 = 1 << 30;

/// Bits holding the number of active readers.
pub const READER_MASK: u32 = WRITER_BIT - 1;

#[inline]
pub const fn writer_pending(val: u32) -> bool {
    val & WRITER_BIT != 0
}

#[inline]
pub const fn reader_count(val: u32) -> u32 {
    val & READER_MASK
}

pub struct LockState {
    state: AtomicU32,
}

impl Debug for LockState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Relaxed);
        formatter
            .debug_struct("LockState")
            .field("readers", &reader_count(state))
            .field("writer_pending", &writer_pending(state))
            .finish()
    }
}

impl Default for LockState {
    #[inline]
    fn default() -> Self {
        LockState::new()
    }
}

impl LockState {
    #[inline]
    pub const fn new() -> Self {
        LockState {
            state: AtomicU32::new(0),
        }
    }

    /// A state whose writer bit is already set. Used for the queue's sentinel nodes, which never
    /// hold an item.
    #[inline]
    pub const fn claimed() -> Self {
        LockState {
            state: AtomicU32::new(WRITER_BIT),
        }
    }

    #[inline]
    pub fn load(&self) -> u32 {
        self.state.load(Acquire)
    }

    #[inline]
    pub fn readers(&self) -> u32 {
        reader_count(self.load())
    }

    #[inline]
    pub fn is_write_requested(&self) -> bool {
        writer_pending(self.load())
    }

    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_with(|_| {})
    }

    /// CAS loop adding one reader. Gives up as soon as the writer bit is observed.
    ///
    /// `on_contention` is called after every failed CAS with the number of failures preceding it,
    /// so the first call receives 0.
    #[inline]
    pub fn try_acquire_with<F: FnMut(u32)>(&self, mut on_contention: F) -> bool {
        let mut state = self.state.load(Relaxed);
        let mut failures = 0;
        loop {
            if unlikely!(writer_pending(state)) {
                return false;
            }
            debug_assert!(
                reader_count(state) < READER_MASK,
                "overflowed the maximum number of readers on a `LockState`"
            );
            match self
                .state
                .compare_exchange(state, state + 1, Acquire, Relaxed)
            {
                Ok(_) => return true,
                Err(actual) => {
                    on_contention(failures);
                    failures += 1;
                    state = actual;
                }
            }
        }
    }

    #[inline]
    pub fn release(&self) {
        let _prev = self.state.fetch_sub(1, Release);
        debug_assert!(
            reader_count(_prev) != 0,
            "attempt to release a `LockState` without readers"
        );
    }

    /// ORs the writer bit into the word with a CAS loop. Returns the number of failed CAS attempts.
    ///
    /// The bit is set even if another writer already set it, so writers must be serialized by the
    /// caller.
    #[inline]
    pub fn request_exclusive(&self) -> u32 {
        let mut state = self.state.load(Relaxed);
        let mut failures = 0;
        loop {
            match self
                .state
                .compare_exchange_weak(state, state | WRITER_BIT, Acquire, Relaxed)
            {
                Ok(_) => return failures,
                Err(actual) => {
                    failures += 1;
                    state = actual;
                }
            }
        }
    }

    /// Sets the writer bit, returning true only for the caller that actually flipped it.
    #[inline]
    pub fn try_claim(&self) -> bool {
        !writer_pending(self.state.fetch_or(WRITER_BIT, Acquire))
    }

    /// Yields until every reader admitted before the writer bit was set has released. Returns the
    /// number of yields.
    #[inline]
    pub fn wait_for_readers(&self) -> u32 {
        let mut yields = 0;
        while likely!(self.state.load(Acquire) != WRITER_BIT) {
            thread::yield_now();
            yields += 1;
        }
        yields
    }

    /// Full write acquisition. Returns `(cas_failures, yields)`.
    #[inline]
    pub fn block(&self) -> (u32, u32) {
        let failures = self.request_exclusive();
        let yields = self.wait_for_readers();
        (failures, yields)
    }

    #[inline]
    pub fn unblock(&self) {
        let _prev = self.state.fetch_and(!WRITER_BIT, Release);
        debug_assert!(
            writer_pending(_prev),
            "attempt to unblock a `LockState` that was not blocked"
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crossbeam_utils::thread;
    use std::sync::atomic::{AtomicBool, Ordering::SeqCst};

    fn send_sync<T: Send + Sync>() {}

    #[test]
    fn is_send_sync() {
        send_sync::<LockState>()
    }

    #[test]
    fn writer_bit_layout() {
        assert_eq!(WRITER_BIT, 0x4000_0000);
        assert_eq!(READER_MASK & WRITER_BIT, 0);
        assert!(writer_pending(WRITER_BIT | 3));
        assert_eq!(reader_count(WRITER_BIT | 3), 3);
    }

    #[test]
    fn acquire_release_balances() {
        let state = LockState::new();
        for _ in 0..1_000 {
            assert!(state.try_acquire());
            state.release();
        }
        assert_eq!(state.load(), 0);
    }

    #[test]
    fn readers_accumulate() {
        let state = LockState::new();
        for _ in 0..5 {
            assert!(state.try_acquire());
        }
        assert_eq!(state.readers(), 5);
        assert!(!state.is_write_requested());
        for _ in 0..5 {
            state.release();
        }
        assert_eq!(state.readers(), 0);
    }

    #[test]
    fn writer_bit_rejects_readers() {
        let state = LockState::new();
        let (_, yields) = state.block();
        assert_eq!(yields, 0, "no reader to wait for");
        assert_eq!(state.load(), WRITER_BIT);
        assert!(!state.try_acquire());
        assert_eq!(state.load(), WRITER_BIT, "a rejected reader must not touch the state");
        state.unblock();
        assert_eq!(state.load(), 0);
        assert!(state.try_acquire());
        state.release();
    }

    #[test]
    fn contention_callback_not_called_uncontended() {
        let state = LockState::new();
        let mut calls = 0;
        assert!(state.try_acquire_with(|_| calls += 1));
        assert_eq!(calls, 0);
        state.release();
    }

    #[test]
    fn claim_is_exclusive() {
        let state = LockState::new();
        assert!(state.try_claim());
        assert!(!state.try_claim());
        assert!(!LockState::claimed().try_claim());
    }

    #[test]
    fn block_waits_for_readers() {
        let state = LockState::new();
        let released = AtomicBool::new(false);
        assert!(state.try_acquire());
        thread::scope(|s| {
            s.spawn(|_| {
                state.block();
                assert!(released.load(SeqCst), "writer completed with a reader inside");
            });
            std::thread::sleep(std::time::Duration::from_millis(20));
            released.store(true, SeqCst);
            state.release();
        })
        .unwrap();
        assert_eq!(state.load(), WRITER_BIT);
    }
}
