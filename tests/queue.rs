mod queue {
    use busylock::queue::{Interrupt, QueueError, SpinningQueue};
    use crossbeam_utils::thread;
    use std::{
        sync::{
            atomic::{
                AtomicBool, AtomicUsize,
                Ordering::{Relaxed, SeqCst},
            },
            Arc,
        },
        time::{Duration, Instant},
    };

    #[test]
    fn fifo_across_threads() {
        const COUNT: usize = 10_000;
        let queue = SpinningQueue::new();
        thread::scope(|s| {
            s.spawn(|_| {
                for i in 0..COUNT {
                    queue.put(i);
                }
            });
            let interrupt = Interrupt::new();
            for i in 0..COUNT {
                assert_eq!(queue.take(&interrupt), Ok(i));
            }
        })
        .unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn take_blocks_until_put() {
        let queue = SpinningQueue::new();
        let put = AtomicBool::new(false);
        thread::scope(|s| {
            s.spawn(|_| {
                std::thread::sleep(Duration::from_millis(50));
                put.store(true, SeqCst);
                queue.put("late");
            });
            assert_eq!(queue.take(&Interrupt::new()), Ok("late"));
            assert!(put.load(SeqCst));
        })
        .unwrap();
    }

    #[test]
    fn zero_timeout_returns_promptly() {
        let queue = SpinningQueue::<u64>::new();
        let start = Instant::now();
        assert_eq!(
            queue.poll_timeout(Duration::from_secs(0), &Interrupt::new()),
            Ok(None)
        );
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn poll_timeout_sees_late_element() {
        let queue = SpinningQueue::new();
        thread::scope(|s| {
            s.spawn(|_| {
                std::thread::sleep(Duration::from_millis(10));
                queue.put(7);
            });
            assert_eq!(
                queue.poll_timeout(Duration::from_secs(30), &Interrupt::new()),
                Ok(Some(7))
            );
        })
        .unwrap();
    }

    #[test]
    fn drain_stubs() {
        let queue: SpinningQueue<_> = (0..10).collect();
        let mut sink = Vec::new();
        assert_eq!(queue.drain_to(&mut sink), 0);
        assert_eq!(
            queue.drain_to_max(&mut sink, 3),
            Err(QueueError::Unsupported("drain_to_max"))
        );
        assert!(sink.is_empty());
        assert_eq!(queue.to_vec(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn interrupt_from_another_thread() {
        let queue = SpinningQueue::<String>::new();
        let interrupt = Interrupt::new();
        let waiters = AtomicUsize::new(0);
        thread::scope(|s| {
            let remote = interrupt.clone();
            s.spawn(|_| {
                let _ = waiters.fetch_add(1, SeqCst);
                assert_eq!(queue.take(&interrupt), Err(QueueError::Interrupted));
            });
            while waiters.load(SeqCst) == 0 {
                std::thread::yield_now();
            }
            remote.interrupt();
        })
        .unwrap();
        assert!(!interrupt.is_interrupted());
    }

    #[test]
    fn mpmc_conservation() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 10_000;
        const TOTAL: usize = PRODUCERS * PER_PRODUCER;

        let queue = SpinningQueue::new();
        let taken = AtomicUsize::new(0);
        let mut seen = thread::scope(|s| {
            for p in 0..PRODUCERS {
                let queue = &queue;
                s.spawn(move |_| {
                    for i in 0..PER_PRODUCER {
                        queue.put(p * PER_PRODUCER + i);
                    }
                });
            }
            let mut consumers = Vec::new();
            for _ in 0..CONSUMERS {
                let (queue, taken) = (&queue, &taken);
                consumers.push(s.spawn(move |_| {
                    let mut local = Vec::new();
                    let mut last = vec![None; PRODUCERS];
                    while taken.load(Relaxed) < TOTAL {
                        if let Some(x) = queue.poll() {
                            let _ = taken.fetch_add(1, Relaxed);
                            // elements of a single producer come out in order
                            let producer = x / PER_PRODUCER;
                            assert!(last[producer] < Some(x));
                            last[producer] = Some(x);
                            local.push(x);
                        }
                    }
                    local
                }));
            }
            let mut seen = Vec::with_capacity(TOTAL);
            for consumer in consumers {
                seen.extend(consumer.join().unwrap());
            }
            seen
        })
        .unwrap();

        seen.sort_unstable();
        assert_eq!(seen, (0..TOTAL).collect::<Vec<_>>());
        assert!(queue.is_empty());
        busylock::stats::print_stats();
    }

    #[test]
    fn removal_while_consuming() {
        const COUNT: usize = 20_000;
        let queue: SpinningQueue<_> = (0..COUNT).collect();
        let taken = thread::scope(|s| {
            let consumer = s.spawn(|_| {
                let mut taken = Vec::new();
                while let Some(x) = queue.poll() {
                    taken.push(x);
                }
                taken
            });
            let _ = queue.retain(|x| x % 3 != 0);
            let mut taken = consumer.join().unwrap();
            // anything left behind after the consumer gave up
            while let Some(x) = queue.poll() {
                taken.push(x);
            }
            taken
        })
        .unwrap();

        let mut last = None;
        for &x in &taken {
            assert!(last < Some(x), "fifo order broken");
            last = Some(x);
        }
        // every element not divisible by 3 was taken, the rest were taken or removed
        let kept = taken.iter().filter(|x| *x % 3 != 0).count();
        assert_eq!(kept, (0..COUNT).filter(|x| x % 3 != 0).count());
    }

    #[test]
    fn unconsumed_elements_dropped() {
        let token = Arc::new(());
        {
            let queue = SpinningQueue::new();
            for _ in 0..100 {
                queue.put(token.clone());
            }
            assert_eq!(queue.poll().map(|t| Arc::strong_count(&t)), Some(101));
            assert!(queue.remove_item(&token));
            assert_eq!(Arc::strong_count(&token), 99);
        }
        assert_eq!(Arc::strong_count(&token), 1);
    }
}
