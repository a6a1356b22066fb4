use busylock::queue::{Interrupt, SpinningQueue};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use crossbeam_utils::thread;
use std::{
    sync::mpsc,
    time::{Duration, Instant},
};

/// Ping-pong between two threads over a pair of queues. Each iteration is one round trip, i.e. two
/// hand-offs.
fn spinning_round_trip(iters: u64) -> Duration {
    let ping = SpinningQueue::new();
    let pong = SpinningQueue::new();
    thread::scope(|s| {
        s.spawn(|_| {
            let interrupt = Interrupt::new();
            for _ in 0..iters {
                let x = ping.take(&interrupt).unwrap();
                pong.put(black_box(x));
            }
        });
        let interrupt = Interrupt::new();
        let start = Instant::now();
        for i in 0..iters {
            ping.put(i);
            black_box(pong.take(&interrupt).unwrap());
        }
        start.elapsed()
    })
    .unwrap()
}

/// The same ping-pong over parking std channels.
fn parking_round_trip(iters: u64) -> Duration {
    let (ping_tx, ping_rx) = mpsc::channel();
    let (pong_tx, pong_rx) = mpsc::channel();
    thread::scope(|s| {
        s.spawn(move |_| {
            for x in ping_rx.iter().take(iters as usize) {
                pong_tx.send(black_box(x)).unwrap();
            }
        });
        let start = Instant::now();
        for i in 0..iters {
            ping_tx.send(i).unwrap();
            black_box(pong_rx.recv().unwrap());
        }
        start.elapsed()
    })
    .unwrap()
}

fn latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");
    group.bench_function("spinning_queue", |b| b.iter_custom(spinning_round_trip));
    group.bench_function("mpsc_channel", |b| b.iter_custom(parking_round_trip));
    group.finish();
}

criterion_group!(benches, latency);
criterion_main!(benches);
