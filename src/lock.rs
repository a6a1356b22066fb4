//! The reader/writer contract shared by every busy lock, [`BusyLock`], and its RAII guards.
//!
//! The raw operations mirror how the locks are driven in benchmarks: a reader calls
//! [`try_acquire`](BusyLock::try_acquire) and, if it got in, [`release`](BusyLock::release); a
//! writer calls [`block`](BusyLock::block) and later [`unblock`](BusyLock::unblock). The guards
//! pair those calls automatically.

use core::{
    fmt::{self, Debug, Formatter},
    marker::PhantomData,
};

/// A reader-biased busy lock.
///
/// Reads never wait: [`try_acquire`](BusyLock::try_acquire) either enters immediately or reports
/// that a writer is present. Writes spin until every reader has left.
///
/// # Writers
///
/// None of the implementations protect against two threads calling [`block`](BusyLock::block) at
/// the same time. Writers must be serialized by the caller.
pub trait BusyLock: Sync {
    /// Attempts to enter as a reader.
    ///
    /// Returns `true` if the read lock is now held, in which case [`release`](BusyLock::release)
    /// must be called exactly once. Returns `false` if a writer has requested exclusive access;
    /// nothing is held and no cleanup is needed.
    fn try_acquire(&self) -> bool;

    /// Leaves a read lock taken by a successful [`try_acquire`](BusyLock::try_acquire).
    ///
    /// Calling this without a matching acquire corrupts the lock. It is not checked outside of
    /// debug assertions.
    fn release(&self);

    /// Acquires exclusive access, spinning until all readers have released.
    ///
    /// There is no timeout and no way to cancel the wait.
    fn block(&self);

    /// Ends the exclusive session started by [`block`](BusyLock::block).
    ///
    /// Must only be called by the thread whose `block` returned.
    fn unblock(&self);

    /// Attempts to enter as a reader, returning a guard that releases on drop.
    ///
    /// # Examples
    ///
    /// ```
    /// use busylock::{BusyLock, CasBusyLock};
    ///
    /// let lock = CasBusyLock::new();
    /// {
    ///     let _read = lock.try_read().expect("no writer is present");
    ///     assert_eq!(lock.readers(), 1);
    /// }
    /// assert_eq!(lock.readers(), 0);
    /// ```
    #[inline]
    fn try_read(&self) -> Option<ReadGuard<'_, Self>>
    where
        Self: Sized,
    {
        if self.try_acquire() {
            Some(ReadGuard {
                lock:    self,
                _marker: PhantomData,
            })
        } else {
            None
        }
    }

    /// Acquires exclusive access, returning a guard that unblocks on drop.
    ///
    /// # Examples
    ///
    /// ```
    /// use busylock::{BusyLock, CasBusyLock};
    ///
    /// let lock = CasBusyLock::new();
    /// {
    ///     let _write = lock.write();
    ///     assert!(lock.try_read().is_none());
    /// }
    /// assert!(lock.try_read().is_some());
    /// ```
    #[inline]
    fn write(&self) -> WriteGuard<'_, Self>
    where
        Self: Sized,
    {
        self.block();
        WriteGuard {
            lock:    self,
            _marker: PhantomData,
        }
    }
}

/// A held read lock. Released on drop.
///
/// Released on the thread that acquired it; the striped lock picks its stripe per thread.
#[must_use = "if unused the read lock will immediately be released"]
pub struct ReadGuard<'a, L: BusyLock> {
    lock:    &'a L,
    _marker: PhantomData<*const ()>,
}

impl<'a, L: BusyLock> Debug for ReadGuard<'a, L> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.pad("ReadGuard { .. }")
    }
}

impl<'a, L: BusyLock> Drop for ReadGuard<'a, L> {
    #[inline]
    fn drop(&mut self) {
        self.lock.release()
    }
}

/// An exclusive session. Unblocked on drop.
#[must_use = "if unused the write lock will immediately be unblocked"]
pub struct WriteGuard<'a, L: BusyLock> {
    lock:    &'a L,
    _marker: PhantomData<*const ()>,
}

impl<'a, L: BusyLock> Debug for WriteGuard<'a, L> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.pad("WriteGuard { .. }")
    }
}

impl<'a, L: BusyLock> Drop for WriteGuard<'a, L> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unblock()
    }
}
