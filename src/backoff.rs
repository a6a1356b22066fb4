//! The backoff busy lock, [`BackoffBusyLock`], and its tiered wait policy, [`BackoffPolicy`].
//!
//! The policy is adopted from the .NET `SpinLock`. Failed CAS attempts are counted, and the count
//! picks one of three tiers:
//!
//! - spin for a number of cycles that grows linearly with the attempt;
//! - once spinning has not helped, give up the rest of the time slice;
//! - once yielding has not helped either, really sleep.
//!
//! With a tiny critical section contention is so high that making some threads "colder" raises
//! aggregate throughput, even though each of them responds more slowly.

use crate::{internal::state::LockState, lock::BusyLock, stats};
use core::{
    fmt::{self, Debug, Formatter},
    hint,
    time::Duration,
};
use std::thread;

/// Spin cycles per attempt in the spinning tier.
pub const SPIN_CYCLES: u32 = 20;

/// Number of failed attempts handled by spinning.
pub const SPIN_COUNT: u32 = 10;

/// Number of failed attempts handled by yielding, after spinning.
pub const YIELD_COUNT: u32 = 5;

/// Sleep duration of the last tier, the smallest the OS reliably honors.
pub const SLEEP: Duration = Duration::from_millis(1);

/// What to do after a failed attempt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Tier {
    /// Busy-spin this many cycles with a processor spin hint.
    Spin(u32),
    /// Yield the remainder of the time slice.
    Yield,
    /// Sleep for the given duration.
    Sleep(Duration),
}

/// Maps the number of consecutive failed attempts to a [`Tier`].
///
/// # Examples
///
/// ```
/// use busylock::backoff::{BackoffPolicy, Tier};
///
/// let policy = BackoffPolicy::new();
/// assert_eq!(policy.tier(0), Tier::Spin(20));
/// assert_eq!(policy.tier(9), Tier::Spin(200));
/// assert_eq!(policy.tier(10), Tier::Yield);
/// assert!(matches!(policy.tier(15), Tier::Sleep(_)));
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    spin_cycles: u32,
    spin_count:  u32,
    yield_count: u32,
    sleep:       Duration,
}

impl Default for BackoffPolicy {
    #[inline]
    fn default() -> Self {
        BackoffPolicy::new()
    }
}

impl BackoffPolicy {
    /// The default policy: [`SPIN_CYCLES`], [`SPIN_COUNT`], [`YIELD_COUNT`] and [`SLEEP`].
    #[inline]
    pub const fn new() -> Self {
        BackoffPolicy {
            spin_cycles: SPIN_CYCLES,
            spin_count:  SPIN_COUNT,
            yield_count: YIELD_COUNT,
            sleep:       SLEEP,
        }
    }

    #[inline]
    pub const fn with_spin_cycles(self, spin_cycles: u32) -> Self {
        BackoffPolicy {
            spin_cycles,
            ..self
        }
    }

    #[inline]
    pub const fn with_spin_count(self, spin_count: u32) -> Self {
        BackoffPolicy { spin_count, ..self }
    }

    #[inline]
    pub const fn with_yield_count(self, yield_count: u32) -> Self {
        BackoffPolicy {
            yield_count,
            ..self
        }
    }

    #[inline]
    pub const fn with_sleep(self, sleep: Duration) -> Self {
        BackoffPolicy { sleep, ..self }
    }

    /// The tier for the `attempt`-th consecutive failure, counting from zero.
    #[inline]
    pub fn tier(&self, attempt: u32) -> Tier {
        if attempt < self.spin_count {
            Tier::Spin(self.spin_cycles.saturating_mul(attempt + 1))
        } else if attempt < self.spin_count.saturating_add(self.yield_count) {
            Tier::Yield
        } else {
            Tier::Sleep(self.sleep)
        }
    }

    /// Waits according to the tier of `attempt`.
    #[cold]
    pub fn wait(&self, attempt: u32) {
        match self.tier(attempt) {
            Tier::Spin(cycles) => {
                stats::backoff_spin();
                for _ in 0..cycles {
                    hint::spin_loop();
                }
            }
            Tier::Yield => {
                stats::backoff_yield();
                thread::yield_now();
            }
            Tier::Sleep(duration) => {
                stats::backoff_sleep();
                if attempt == self.spin_count.saturating_add(self.yield_count) {
                    log::trace!("backoff escalated to sleeping after {} failed attempts", attempt);
                }
                thread::sleep(duration);
            }
        }
    }
}

/// Same lock as [`CasBusyLock`](crate::CasBusyLock), with a tiered backoff between failed read
/// CAS attempts.
///
/// Only the read path backs off. [`release`](BusyLock::release) and [`block`](BusyLock::block) are
/// the baseline ones. Without contention no CAS fails and no backoff ever happens, so a single
/// thread sees exactly the baseline behavior.
///
/// # Examples
///
/// ```
/// use busylock::{backoff::BackoffPolicy, BackoffBusyLock, BusyLock};
///
/// let lock = BackoffBusyLock::with_policy(BackoffPolicy::new().with_spin_count(4));
/// assert!(lock.try_acquire());
/// lock.release();
/// ```
#[derive(Default)]
pub struct BackoffBusyLock {
    state:  LockState,
    policy: BackoffPolicy,
}

impl Debug for BackoffBusyLock {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BackoffBusyLock")
            .field("state", &self.state)
            .field("policy", &self.policy)
            .finish()
    }
}

impl BackoffBusyLock {
    #[inline]
    pub const fn new() -> Self {
        BackoffBusyLock::with_policy(BackoffPolicy::new())
    }

    #[inline]
    pub const fn with_policy(policy: BackoffPolicy) -> Self {
        BackoffBusyLock {
            state: LockState::new(),
            policy,
        }
    }

    #[inline]
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Number of readers currently inside the lock.
    #[inline]
    pub fn readers(&self) -> u32 {
        self.state.readers()
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.state.is_write_requested()
    }
}

impl BusyLock for BackoffBusyLock {
    #[inline]
    fn try_acquire(&self) -> bool {
        let mut failures = 0;
        let policy = &self.policy;
        let acquired = self.state.try_acquire_with(|attempt| {
            failures += 1;
            policy.wait(attempt)
        });
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
        log::debug!("backoff lock blocked after {} reader drain yields", yields);
    }

    #[inline]
    fn unblock(&self) {
        self.state.unblock()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::CasBusyLock;
    use crossbeam_utils::thread;

    fn send_sync<T: Send + Sync>() {}

    #[test]
    fn is_send_sync() {
        send_sync::<BackoffBusyLock>()
    }

    #[test]
    fn default_tiers() {
        let policy = BackoffPolicy::default();
        for attempt in 0..SPIN_COUNT {
            assert_eq!(policy.tier(attempt), Tier::Spin(SPIN_CYCLES * (attempt + 1)));
        }
        for attempt in SPIN_COUNT..SPIN_COUNT + YIELD_COUNT {
            assert_eq!(policy.tier(attempt), Tier::Yield);
        }
        for attempt in SPIN_COUNT + YIELD_COUNT..SPIN_COUNT + YIELD_COUNT + 10 {
            assert_eq!(policy.tier(attempt), Tier::Sleep(SLEEP));
        }
        assert_eq!(policy.tier(u32::max_value()), Tier::Sleep(SLEEP));
    }

    #[test]
    fn custom_tiers() {
        let policy = BackoffPolicy::new()
            .with_spin_cycles(3)
            .with_spin_count(1)
            .with_yield_count(0)
            .with_sleep(Duration::from_micros(50));
        assert_eq!(policy.tier(0), Tier::Spin(3));
        assert_eq!(policy.tier(1), Tier::Sleep(Duration::from_micros(50)));
    }

    #[test]
    fn wait_runs_every_tier() {
        let policy = BackoffPolicy::new().with_sleep(Duration::from_micros(100));
        crate::stats::flush_thread_stats();
        let before = crate::stats::stats().map(|stats| {
            (
                stats.backoff_spin.count(),
                stats.backoff_yield.count(),
                stats.backoff_sleep.count(),
            )
        });

        policy.wait(0);
        policy.wait(SPIN_COUNT);
        let start = std::time::Instant::now();
        policy.wait(SPIN_COUNT + YIELD_COUNT);
        assert!(start.elapsed() >= Duration::from_micros(100));

        crate::stats::flush_thread_stats();
        let after = crate::stats::stats().map(|stats| {
            (
                stats.backoff_spin.count(),
                stats.backoff_yield.count(),
                stats.backoff_sleep.count(),
            )
        });
        if let (Some((spin, yield_, sleep)), Some((spin2, yield2, sleep2))) = (before, after) {
            // other tests may record concurrently, so only a lower bound holds
            assert!(spin2 > spin);
            assert!(yield2 > yield_);
            assert!(sleep2 > sleep);
        } else {
            assert!(cfg!(not(feature = "stats")));
        }
    }

    #[test]
    fn single_thread_matches_baseline() {
        let backoff = BackoffBusyLock::new();
        let baseline = CasBusyLock::new();

        for _ in 0..1_000 {
            assert_eq!(backoff.try_acquire(), baseline.try_acquire());
            assert_eq!(backoff.readers(), baseline.readers());
        }
        for _ in 0..1_000 {
            backoff.release();
            baseline.release();
        }
        backoff.block();
        baseline.block();
        assert_eq!(backoff.try_acquire(), baseline.try_acquire());
        assert_eq!(backoff.is_blocked(), baseline.is_blocked());
        backoff.unblock();
        baseline.unblock();
        assert_eq!(backoff.readers(), 0);
        assert!(!backoff.is_blocked());
    }

    #[test]
    fn uncontended_never_waits() {
        // a policy that sleeps on the very first failure would make this test take minutes
        let lock = BackoffBusyLock::with_policy(
            BackoffPolicy::new()
                .with_spin_count(0)
                .with_yield_count(0)
                .with_sleep(Duration::from_secs(60)),
        );
        let start = std::time::Instant::now();
        for _ in 0..10_000 {
            assert!(lock.try_acquire());
            lock.release();
        }
        assert!(start.elapsed() < Duration::from_secs(30));
    }

    #[test]
    fn contended_readers_all_succeed() {
        const THREAD_COUNT: usize = 8;
        const ITER_COUNT: usize = 5_000;
        let lock = BackoffBusyLock::new();
        thread::scope(|s| {
            for _ in 0..THREAD_COUNT {
                s.spawn(|_| {
                    for _ in 0..ITER_COUNT {
                        assert!(lock.try_acquire());
                        lock.release();
                    }
                });
            }
        })
        .unwrap();
        assert_eq!(lock.readers(), 0);
    }
}
