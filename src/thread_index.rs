//! Per thread indices, [`ThreadIndex`], used to pick a stripe of a
//! [`StripedBusyLock`](crate::striped::StripedBusyLock).
//!
//! Every thread is handed the next value of a process wide counter the first time it calls
//! [`get`]. The value is cached for the rest of the thread's life and never
//! recomputed.

use core::{
    fmt::{self, Debug, Formatter},
    sync::atomic::{AtomicUsize, Ordering::Relaxed},
};

static NEXT_INDEX: AtomicUsize = AtomicUsize::new(0);

/// A monotonically assigned index identifying the calling context.
///
/// Indices are usually obtained through [`get`], which caches one per thread. Worker pools that
/// want to control the assignment themselves can draw indices with [`ThreadIndex::next`] when a
/// worker is created, or build them with [`ThreadIndex::from_raw`], and pass them explicitly to the
/// `*_at` methods of the striped lock.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ThreadIndex(usize);

impl Debug for ThreadIndex {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.debug_tuple("ThreadIndex").field(&self.0).finish()
    }
}

impl ThreadIndex {
    /// Draws a fresh index from the process wide counter.
    ///
    /// # Examples
    ///
    /// ```
    /// use busylock::thread_index::ThreadIndex;
    ///
    /// let a = ThreadIndex::next();
    /// let b = ThreadIndex::next();
    /// assert!(b.get() > a.get());
    /// ```
    #[inline]
    pub fn next() -> Self {
        ThreadIndex(NEXT_INDEX.fetch_add(1, Relaxed))
    }

    /// Wraps an index chosen by the caller.
    #[inline]
    pub const fn from_raw(index: usize) -> Self {
        ThreadIndex(index)
    }

    #[inline]
    pub const fn get(self) -> usize {
        self.0
    }

    /// The slot this index maps to in a table of `len` slots.
    #[inline]
    pub const fn slot(self, len: usize) -> usize {
        self.0 % len
    }
}

thread_local! {
    static THREAD_INDEX: ThreadIndex = ThreadIndex::next();
}

/// Returns the calling thread's index, assigning one on first use.
///
/// # Panics
///
/// Panics if called from a thread local destructor after the index itself has been destroyed.
///
/// # Examples
///
/// ```
/// use busylock::thread_index;
///
/// let index = thread_index::get();
/// assert_eq!(index, thread_index::get());
///
/// let other = std::thread::spawn(thread_index::get).join().unwrap();
/// assert_ne!(index, other);
/// ```
#[inline]
pub fn get() -> ThreadIndex {
    THREAD_INDEX.with(|index| *index)
}
