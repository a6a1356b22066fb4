//! Busy-waiting reader/writer locks and a spinning queue.
//!
//! `busylock` is a small collection of synchronization primitives for latency critical code that
//! runs on dedicated, warm cores. Nothing in here ever parks a thread: readers either get in
//! immediately or are told a writer is present, writers spin until the readers drain, and queue
//! consumers busy-poll.
//!
//! # Examples
//!
//! Guarding a read-mostly payload:
//! ```
//! use busylock::{BusyLock, CasBusyLock};
//!
//! static LOCK: CasBusyLock = CasBusyLock::new();
//!
//! if let Some(_read) = LOCK.try_read() {
//!     // read side payload
//! }
//!
//! let write = LOCK.write();
//! assert!(LOCK.try_read().is_none());
//! drop(write);
//! ```
//!
//! Handing work between threads:
//! ```
//! use busylock::queue::{Interrupt, SpinningQueue};
//! use std::time::Duration;
//!
//! let queue = SpinningQueue::new();
//! queue.put(1);
//! assert_eq!(queue.poll_timeout(Duration::from_millis(1), &Interrupt::new()), Ok(Some(1)));
//! ```
//!
//! # Features
//!
//! * Readers never block. [`try_acquire`](BusyLock::try_acquire) returns `false` while a writer is
//!   present, and the caller decides what to do instead.
//! * Writers spin until every reader has left. Writers are not mutually excluded, so at most one
//!   thread may write at a time.
//! * All state fits in fixed size atomics. The locks perform no heap allocation and are `const`
//!   constructible.
//! * With the `stats` feature, contention events are counted per thread and can be printed with
//!   [`stats::print_stats`].
//!
//! ## Locks
//!
//! * [`CasBusyLock`], the baseline: a CAS loop over a single state word.
//! * [`IncrementBusyLock`], a single unconditional increment per read, at the cost of possible
//!   reader starvation.
//! * [`StripedBusyLock`], readers spread over cache line padded stripes for linear read scaling.
//! * [`BackoffBusyLock`], the baseline with a tiered spin, yield and sleep backoff.
//!
//! ## Queues
//!
//! * [`SpinningQueue`], an unbounded FIFO queue whose consumers busy-poll instead of parking.

#![warn(macro_use_extern_crate)]
#![warn(missing_debug_implementations)]
#![warn(unused_lifetimes)]
#![cfg_attr(not(test), warn(unused_results))]
#![deny(rust_2018_idioms)]
#![deny(unused_must_use)]

#[macro_use]
mod internal;

pub mod backoff;
mod cas;
mod increment;
mod lock;
pub mod queue;
pub mod stats;
pub mod striped;
pub mod thread_index;

pub use backoff::BackoffBusyLock;
pub use cas::CasBusyLock;
pub use increment::IncrementBusyLock;
pub use lock::{BusyLock, ReadGuard, WriteGuard};
pub use queue::SpinningQueue;
pub use striped::StripedBusyLock;
