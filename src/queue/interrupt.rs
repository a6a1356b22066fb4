use core::{
    fmt::{self, Debug, Formatter},
    sync::atomic::{
        AtomicBool,
        Ordering::{Acquire, Release},
    },
};
use crossbeam_utils::CachePadded;
use std::sync::Arc;

/// A cancellation signal for the waiting operations of a
/// [`SpinningQueue`](crate::queue::SpinningQueue).
///
/// Clones share the same flag, so one clone can be handed to the waiting thread and another kept
/// by whoever may need to cancel it. A waiting operation that observes the flag clears it and
/// returns [`QueueError::Interrupted`](crate::queue::QueueError::Interrupted), so each call to
/// [`interrupt`](Interrupt::interrupt) aborts at most one wait.
///
/// # Examples
///
/// ```
/// use busylock::queue::{Interrupt, QueueError, SpinningQueue};
///
/// let queue = SpinningQueue::<u32>::new();
/// let interrupt = Interrupt::new();
///
/// interrupt.interrupt();
/// assert_eq!(queue.take(&interrupt), Err(QueueError::Interrupted));
/// assert!(!interrupt.is_interrupted());
/// ```
#[derive(Clone, Default)]
pub struct Interrupt {
    flag: Arc<CachePadded<AtomicBool>>,
}

impl Debug for Interrupt {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Interrupt")
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

impl Interrupt {
    #[inline]
    pub fn new() -> Self {
        Interrupt::default()
    }

    /// Raises the flag. The next check by a waiting operation aborts it.
    #[inline]
    pub fn interrupt(&self) {
        self.flag.store(true, Release)
    }

    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Acquire)
    }

    /// Lowers the flag without anyone observing it.
    #[inline]
    pub fn clear(&self) {
        self.flag.store(false, Release)
    }

    /// Observes and clears the flag.
    #[inline]
    pub(crate) fn take(&self) -> bool {
        // cheap load first, the flag is almost never set
        self.is_interrupted() && self.flag.swap(false, Acquire)
    }
}
