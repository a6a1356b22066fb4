//! Contention statistics. Enabled with `--features stats`.
//!
//! Every thread records into its own [`Stats`] object, which is merged into a global one when the
//! thread exits or when [`flush_thread_stats`] is called. With the feature disabled the recording
//! functions are empty and get optimized away.

use std::fmt::{self, Debug, Formatter};

#[derive(Copy, Clone, Default, Debug)]
struct MinMaxTotal {
    min:   u64,
    max:   u64,
    total: u64,
}

#[doc(hidden)]
#[derive(Default, Clone)]
pub struct Size {
    min_max_total: Option<MinMaxTotal>,
    count:         u64,
}

impl Debug for Size {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Size")
            .field("count", &self.count)
            .field("min", &self.min_max_total.map(|x| x.min))
            .field("max", &self.min_max_total.map(|x| x.max))
            .field("total", &self.min_max_total.map(|x| x.total))
            .field(
                "avg",
                &self
                    .min_max_total
                    .map(|x| x.total as f64 / self.count as f64),
            )
            .finish()
    }
}

impl Size {
    /// Number of recorded samples.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sum of all recorded samples.
    pub fn total(&self) -> u64 {
        self.min_max_total.unwrap_or_default().total
    }

    /// Largest recorded sample, if any.
    pub fn max(&self) -> Option<u64> {
        self.min_max_total.map(|x| x.max)
    }

    pub(crate) fn record(&mut self, size: u64) {
        self.count += 1;
        if let Some(ref mut min_max_total) = &mut self.min_max_total {
            min_max_total.min = min_max_total.min.min(size);
            min_max_total.max = min_max_total.max.max(size);
            min_max_total.total += size;
        } else {
            self.min_max_total = Some(MinMaxTotal {
                min:   size,
                max:   size,
                total: size,
            });
        }
    }

    #[cfg_attr(not(feature = "stats"), allow(dead_code))]
    fn merge(&mut self, rhs: &Self) {
        self.count += rhs.count;
        self.min_max_total = match (self.min_max_total, rhs.min_max_total) {
            (Some(a), Some(b)) => Some(MinMaxTotal {
                min:   a.min.min(b.min),
                max:   a.max.max(b.max),
                total: a.total + b.total,
            }),
            (a, b) => a.or(b),
        };
    }
}

#[doc(hidden)]
#[derive(Default, Debug, Clone)]
pub struct Event {
    count: u64,
}

impl Event {
    /// Number of times the event happened.
    pub fn count(&self) -> u64 {
        self.count
    }

    fn happened(&mut self) {
        self.count += 1
    }

    #[cfg_attr(not(feature = "stats"), allow(dead_code))]
    fn merge(&mut self, rhs: &Self) {
        self.count += rhs.count
    }
}

macro_rules! stats_func {
    ($(#[$attr:meta])* $name:ident: Event) => {
        #[inline]
        $(#[$attr])*
        pub(crate) fn $name() {
            with_thread_stats(|stats| stats.$name.happened())
        }
    };
    ($(#[$attr:meta])* $name:ident: Size) => {
        #[inline]
        $(#[$attr])*
        pub(crate) fn $name(size: u32) {
            with_thread_stats(|stats| stats.$name.record(u64::from(size)))
        }
    };
}

macro_rules! stats {
    ($($(#[$attr:meta])* $names:ident: $kinds:tt),* $(,)*) => {
        /// A collection of busylock statistics.
        #[derive(Default, Debug, Clone)]
        pub struct Stats {
            $($(#[$attr])*pub $names: $kinds),*
        }

        impl Stats {
            #[cfg_attr(not(feature = "stats"), allow(dead_code))]
            fn merge(&mut self, rhs: &Self) {
                $(self.$names.merge(&rhs.$names));*
            }
        }

        $(stats_func!{$(#[$attr])* $names: $kinds})*
    };
}

stats! {
    /// Number of failed CAS attempts per read acquisition (successful or not).
    read_cas_failures:    Size,

    /// A read acquisition that failed because a writer was present.
    read_rejected:        Event,

    /// Number of failed CAS attempts while setting the writer bit, per stripe or lock.
    write_cas_failures:   Size,

    /// Number of times a writer yielded while waiting for readers to drain, per stripe or lock.
    write_wait_yields:    Size,

    /// A backoff lock busy-spun after a failed CAS.
    backoff_spin:         Event,

    /// A backoff lock gave up its time slice after a failed CAS.
    backoff_yield:        Event,

    /// A backoff lock slept after a failed CAS.
    backoff_sleep:        Event,

    /// Number of failed dequeue attempts before a waiting queue operation returned.
    queue_empty_polls:    Size,

    /// A waiting queue operation was interrupted.
    queue_interrupted:    Event,

    /// A timed queue poll ran out of time.
    queue_timeout:        Event,
}

impl Stats {
    /// Prints a summary of the stats object.
    pub fn print_summary(&self) {
        println!("{:#?}", self);

        let reads = self.read_cas_failures.count();
        println!(
            "{:>12}: {:>12} {:>12}: {:.4} {:>13}: {:.4}",
            "reads",
            reads,
            "reject rate",
            self.read_rejected.count() as f64 / reads as f64,
            "cas fail avg",
            self.read_cas_failures.total() as f64 / reads as f64,
        );
        println!(
            "{:>12}: {:>12} {:>12}: {:>12} {:>13}: {:>6}",
            "backoff spin",
            self.backoff_spin.count(),
            "yield",
            self.backoff_yield.count(),
            "sleep",
            self.backoff_sleep.count(),
        );
        let waits = self.queue_empty_polls.count();
        println!(
            "{:>12}: {:>12} {:>12}: {:.4} {:>13}: {:>6}",
            "queue waits",
            waits,
            "poll avg",
            self.queue_empty_polls.total() as f64 / waits as f64,
            "interrupted",
            self.queue_interrupted.count(),
        );
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "stats")] {
        use parking_lot::{Mutex, MutexGuard};
        use std::cell::RefCell;

        /// Thread local statistics, flushed to the global `Stats` object on thread exit.
        struct ThreadStats(RefCell<Stats>);

        impl ThreadStats {
            fn flush(&self) {
                let mut borrow = self.0.borrow_mut();
                GLOBAL.lock().merge(&*borrow);
                *borrow = Default::default()
            }
        }

        impl Drop for ThreadStats {
            fn drop(&mut self) {
                self.flush()
            }
        }

        thread_local! {
            static THREAD_STAT: ThreadStats = {
                // initialize global now, so that flushing on thread exit never races its creation
                lazy_static::initialize(&GLOBAL);
                ThreadStats(Default::default())
            };
        }

        lazy_static::lazy_static! {
            static ref GLOBAL: Mutex<Stats> = Mutex::default();
        }

        #[inline]
        fn with_thread_stats<F: FnOnce(&mut Stats)>(f: F) {
            // recording from a thread local destructor after THREAD_STAT is gone is dropped
            let _ = THREAD_STAT.try_with(|stats| f(&mut *stats.0.borrow_mut()));
        }

        /// Returns the global stats object, or None if the feature is disabled.
        pub fn stats() -> Option<MutexGuard<'static, Stats>> {
            Some(GLOBAL.lock())
        }

        /// Merges the calling thread's stats into the global stats object and resets them.
        pub fn flush_thread_stats() {
            let _ = THREAD_STAT.try_with(ThreadStats::flush);
        }
    } else {
        #[inline(always)]
        fn with_thread_stats<F: FnOnce(&mut Stats)>(_: F) {}

        /// Returns the global stats object, or None if the feature is disabled.
        pub fn stats() -> Option<&'static Stats> {
            None
        }

        /// Merges the calling thread's stats into the global stats object and resets them.
        pub fn flush_thread_stats() {}
    }
}

/// Prints a summary of the global stats object.
///
/// It may be necessary to call [`flush_thread_stats`] first.
pub fn print_stats() {
    match self::stats() {
        Some(stats) => stats.print_summary(),
        None => println!("`busylock/stats` feature is not enabled"),
    }
}
