mod striped {
    use busylock::{striped::STRIPE_ALIGN, thread_index::ThreadIndex, BusyLock, StripedBusyLock};
    use crossbeam_utils::thread;
    use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};

    const STRIPES: usize = 8;
    const ITER_COUNT: usize = 10_000;

    #[test]
    fn distinct_stripes_are_independent() {
        let lock = StripedBusyLock::<STRIPES>::new();
        thread::scope(|s| {
            for i in 0..STRIPES {
                let lock = &lock;
                s.spawn(move |_| {
                    let index = ThreadIndex::from_raw(i);
                    assert_eq!(lock.stripe_of(index), i);
                    for _ in 0..ITER_COUNT {
                        assert!(lock.try_acquire_at(index));
                        // nobody else ever touches this stripe
                        assert_eq!(lock.readers_at(i), 1);
                        lock.release_at(index);
                        assert_eq!(lock.readers_at(i), 0);
                    }
                });
            }
        })
        .unwrap();
        assert_eq!(lock.readers(), 0);
    }

    #[test]
    fn shared_stripes_count_every_reader() {
        let lock = StripedBusyLock::<2>::new();
        let held = AtomicUsize::new(0);
        thread::scope(|s| {
            for i in 0..6 {
                let (lock, held) = (&lock, &held);
                s.spawn(move |_| {
                    let index = ThreadIndex::from_raw(i);
                    assert!(lock.try_acquire_at(index));
                    let _ = held.fetch_add(1, SeqCst);
                    while held.load(SeqCst) < 6 {
                        std::thread::yield_now();
                    }
                    assert_eq!(lock.readers(), 6);
                });
            }
        })
        .unwrap();
        assert_eq!(lock.readers_at(0), 3);
        assert_eq!(lock.readers_at(1), 3);
        for i in 0..6 {
            lock.release_at(ThreadIndex::from_raw(i));
        }
        assert_eq!(lock.readers(), 0);
    }

    #[test]
    fn writer_excludes_all_stripes() {
        let lock = StripedBusyLock::<STRIPES>::new();
        let _write = lock.write();
        thread::scope(|s| {
            for i in 0..STRIPES * 2 {
                let lock = &lock;
                s.spawn(move |_| assert!(!lock.try_acquire_at(ThreadIndex::from_raw(i))));
            }
        })
        .unwrap();
    }

    #[test]
    fn padded_layout() {
        assert_eq!(
            std::mem::size_of::<StripedBusyLock<STRIPES>>(),
            STRIPES * STRIPE_ALIGN
        );
        let lock = Box::new(StripedBusyLock::<STRIPES>::new());
        assert_eq!(&*lock as *const _ as usize % STRIPE_ALIGN, 0);
    }
}
