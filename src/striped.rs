//! The striped busy lock, [`StripedBusyLock`].
//!
//! Each stripe is a separate baseline busy lock. Readers only touch the stripe picked by their
//! [`ThreadIndex`], so readers on different stripes share nothing. A writer has to take every
//! stripe, which makes writing cost proportional to the stripe count.

use crate::{
    internal::state::LockState,
    lock::BusyLock,
    stats,
    thread_index::{self, ThreadIndex},
};
use core::{
    fmt::{self, Debug, Formatter},
    mem,
};

/// Minimum distance in bytes between two stripes.
///
/// Two lines rather than one, since adjacent line prefetching on x86 pulls cache lines in pairs.
pub const STRIPE_ALIGN: usize = 128;

/// Stripe count of a [`StripedBusyLock`] when none is given.
pub const DEFAULT_STRIPES: usize = 16;

/// A lock state alone on its own pair of cache lines.
#[repr(align(128))]
struct Stripe {
    state: LockState,
}

const _: () = assert!(mem::align_of::<Stripe>() == STRIPE_ALIGN);
const _: () = assert!(mem::size_of::<Stripe>() == STRIPE_ALIGN);

#[allow(clippy::declare_interior_mutable_const)]
const UNLOCKED_STRIPE: Stripe = Stripe {
    state: LockState::new(),
};

/// Busy lock split into `N` independently padded stripes.
///
/// Every thread is bound to one stripe by its [`ThreadIndex`] (the index modulo `N`). While there
/// are no more threads than stripes and indices are distinct, readers never contend and
/// throughput scales linearly. Memory use is `N * STRIPE_ALIGN` bytes.
///
/// # Examples
///
/// ```
/// use busylock::{BusyLock, StripedBusyLock};
///
/// let lock: StripedBusyLock = StripedBusyLock::new();
/// assert!(lock.try_acquire());
/// lock.release();
///
/// let small = StripedBusyLock::<4>::new();
/// small.block();
/// assert!(!small.try_acquire());
/// small.unblock();
/// ```
pub struct StripedBusyLock<const N: usize = DEFAULT_STRIPES> {
    stripes: [Stripe; N],
}

impl<const N: usize> Debug for StripedBusyLock<N> {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_list()
            .entries(self.stripes.iter().map(|stripe| &stripe.state))
            .finish()
    }
}

impl<const N: usize> Default for StripedBusyLock<N> {
    #[inline]
    fn default() -> Self {
        StripedBusyLock::new()
    }
}

impl<const N: usize> StripedBusyLock<N> {
    const AT_LEAST_ONE_STRIPE: () =
        assert!(N > 0, "a `StripedBusyLock` needs at least one stripe");

    /// Creates a lock with `N` stripes.
    ///
    /// A stripe count of zero does not compile:
    ///
    /// ```compile_fail
    /// use busylock::StripedBusyLock;
    ///
    /// let lock = StripedBusyLock::<0>::new();
    /// ```
    #[inline]
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::AT_LEAST_ONE_STRIPE;
        StripedBusyLock {
            stripes: [UNLOCKED_STRIPE; N],
        }
    }

    /// Number of stripes.
    #[inline]
    pub const fn stripe_count(&self) -> usize {
        N
    }

    /// The stripe `index` maps to.
    #[inline]
    pub const fn stripe_of(&self, index: ThreadIndex) -> usize {
        index.slot(N)
    }

    /// Number of readers currently inside `stripe`.
    ///
    /// # Panics
    ///
    /// Panics if `stripe >= N`.
    #[inline]
    pub fn readers_at(&self, stripe: usize) -> u32 {
        self.stripes[stripe].state.readers()
    }

    /// Total number of readers across all stripes. Not a consistent snapshot under concurrency.
    pub fn readers(&self) -> u32 {
        self.stripes.iter().map(|stripe| stripe.state.readers()).sum()
    }

    /// Whether a writer has requested exclusive access on any stripe.
    pub fn is_blocked(&self) -> bool {
        self.stripes
            .iter()
            .any(|stripe| stripe.state.is_write_requested())
    }

    #[inline]
    fn state_for(&self, index: ThreadIndex) -> &LockState {
        &self.stripes[index.slot(N)].state
    }

    /// Attempts to enter as a reader on the stripe of an explicit index.
    ///
    /// The matching [`release_at`](StripedBusyLock::release_at) must use the same index.
    #[inline]
    pub fn try_acquire_at(&self, index: ThreadIndex) -> bool {
        let mut failures = 0;
        let acquired = self
            .state_for(index)
            .try_acquire_with(|_| failures += 1);
        stats::read_cas_failures(failures);
        if !acquired {
            stats::read_rejected();
        }
        acquired
    }

    /// Leaves a read lock taken with [`try_acquire_at`](StripedBusyLock::try_acquire_at).
    #[inline]
    pub fn release_at(&self, index: ThreadIndex) {
        self.state_for(index).release()
    }
}

impl<const N: usize> BusyLock for StripedBusyLock<N> {
    #[inline]
    fn try_acquire(&self) -> bool {
        self.try_acquire_at(thread_index::get())
    }

    #[inline]
    fn release(&self) {
        self.release_at(thread_index::get())
    }

    /// Write-acquires every stripe, in index order.
    ///
    /// Once this returns no reader is inside, or can enter, any stripe.
    fn block(&self) {
        let mut total_yields = 0;
        for (i, stripe) in self.stripes.iter().enumerate() {
            let (failures, yields) = stripe.state.block();
            stats::write_cas_failures(failures);
            stats::write_wait_yields(yields);
            log::trace!("stripe {} blocked after {} yields", i, yields);
            total_yields += yields;
        }
        log::debug!(
            "striped lock blocked {} stripes after {} reader drain yields",
            N,
            total_yields
        );
    }

    fn unblock(&self) {
        for stripe in &self.stripes {
            stripe.state.unblock()
        }
    }
}
