use {
    crate::Gate,
    parking_lot::lock_api::RawRwLock,
    std::{
        sync::{
            Barrier,
            atomic::{AtomicBool, AtomicUsize, Ordering::Relaxed},
        },
        thread,
        time::Duration,
    },
};

const BLOCK_CHECK: Duration = Duration::from_millis(100);

fn assert_default(gate: &Gate) {
    assert_eq!(gate.busy.load(Relaxed), false);
    assert_eq!(gate.shared_holders.load(Relaxed), 0);
    assert_eq!(gate.raw.is_locked(), false);
}

fn run_in_thread<T: Send>(f: impl FnOnce() -> T + Send) -> T {
    thread::scope(|s| s.spawn(|| f()).join().unwrap())
}

#[test]
fn default() {
    let gate = Gate::default();
    assert_default(&gate);
    assert_default(&Gate::new());
}

#[test]
fn acquire_release() {
    let gate = Gate::new();
    assert!(gate.acquire_shared());
    assert_eq!(gate.shared_holders(), 1);
    assert_eq!(gate.raw.is_locked(), true);
    assert!(gate.release_shared());
    assert_default(&gate);
}

#[test]
fn concurrent_shared() {
    const N: usize = 8;
    let gate = Gate::new();
    let acquired = Barrier::new(N);
    let checked = Barrier::new(N);
    thread::scope(|s| {
        for _ in 0..N {
            s.spawn(|| {
                assert!(gate.acquire_shared());
                acquired.wait();
                assert_eq!(gate.shared_holders(), N);
                checked.wait();
                assert!(gate.release_shared());
            });
        }
    });
    assert_default(&gate);
}

#[test]
fn busy_rejects_shared() {
    const N: usize = 8;
    let gate = Gate::new();
    assert!(gate.begin_busy());
    let successes = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..N {
            s.spawn(|| {
                if gate.acquire_shared() {
                    successes.fetch_add(1, Relaxed);
                }
            });
        }
    });
    assert_eq!(successes.load(Relaxed), 0);
    assert_eq!(gate.shared_holders(), 0);
    assert_eq!(gate.raw.is_locked(), false);
    assert!(gate.is_busy());
}

#[test]
fn release_without_acquire() {
    let gate = Gate::new();
    assert!(!gate.release_shared());
    assert_default(&gate);
    assert!(gate.acquire_shared());
    assert!(gate.release_shared());
    assert!(!gate.release_shared());
    assert_default(&gate);
}

#[test]
fn release_on_other_thread() {
    let gate = Gate::new();
    assert!(gate.acquire_shared());
    run_in_thread(|| {
        assert!(gate.release_shared());
    });
    assert_default(&gate);
    assert!(gate.try_begin_busy());
}

#[test]
fn begin_busy_waits_for_readers() {
    const M: usize = 3;
    let gate = Gate::new();
    for _ in 0..M {
        assert!(gate.acquire_shared());
    }
    let done = AtomicBool::new(false);
    thread::scope(|s| {
        let handle = s.spawn(|| {
            let res = gate.begin_busy();
            done.store(true, Relaxed);
            res
        });
        thread::sleep(BLOCK_CHECK);
        assert_eq!(done.load(Relaxed), false);
        assert_eq!(gate.is_busy(), false);
        for _ in 0..M {
            assert!(gate.release_shared());
        }
        assert!(handle.join().unwrap());
    });
    assert_eq!(done.load(Relaxed), true);
    assert_eq!(gate.is_busy(), true);
    assert_eq!(gate.raw.is_locked(), false);
}

#[test]
fn pending_writer_blocks_new_readers() {
    let gate = Gate::new();
    assert!(gate.acquire_shared());
    let reader_done = AtomicBool::new(false);
    thread::scope(|s| {
        let writer = s.spawn(|| gate.begin_busy());
        thread::sleep(BLOCK_CHECK);
        let reader = s.spawn(|| {
            let res = gate.acquire_shared();
            reader_done.store(true, Relaxed);
            res
        });
        thread::sleep(BLOCK_CHECK);
        // A second acquisition by the holding thread would wait here as well.
        assert_eq!(reader_done.load(Relaxed), false);
        assert!(gate.release_shared());
        assert!(writer.join().unwrap());
        assert_eq!(reader.join().unwrap(), false);
    });
    assert!(gate.is_busy());
    assert_eq!(gate.shared_holders(), 0);
}

#[test]
fn try_begin_busy() {
    let gate = Gate::new();
    assert!(gate.acquire_shared());
    assert!(gate.acquire_shared());
    assert!(!gate.try_begin_busy());
    assert!(!gate.is_busy());
    assert!(gate.release_shared());
    assert!(!gate.try_begin_busy());
    assert!(!gate.is_busy());
    assert!(gate.release_shared());
    assert!(gate.try_begin_busy());
    assert!(gate.is_busy());
    assert!(!gate.acquire_shared());
}

#[test]
fn try_begin_busy_while_busy() {
    let gate = Gate::new();
    assert!(gate.try_begin_busy());
    assert!(gate.try_begin_busy());
    assert!(gate.is_busy());
}

#[test]
fn busy_round_trip() {
    let gate = Gate::new();
    assert!(gate.begin_busy());
    assert!(!gate.acquire_shared());
    assert!(gate.end_busy());
    assert!(gate.acquire_shared());
    assert!(gate.release_shared());
    assert_default(&gate);
}

#[test]
fn end_busy_waits_for_readers() {
    let gate = Gate::new();
    assert!(gate.acquire_shared());
    let done = AtomicBool::new(false);
    thread::scope(|s| {
        let handle = s.spawn(|| {
            let res = gate.end_busy();
            done.store(true, Relaxed);
            res
        });
        thread::sleep(BLOCK_CHECK);
        assert_eq!(done.load(Relaxed), false);
        assert!(gate.release_shared());
        assert!(handle.join().unwrap());
    });
    assert_default(&gate);
}

#[test]
fn no_holders_after_begin_busy() {
    const N: usize = 8;
    let gate = Gate::new();
    let start = Barrier::new(N + 1);
    thread::scope(|s| {
        for _ in 0..N {
            s.spawn(|| {
                start.wait();
                for _ in 0..100 {
                    if gate.acquire_shared() {
                        thread::yield_now();
                        assert!(gate.release_shared());
                    }
                }
            });
        }
        start.wait();
        assert!(gate.begin_busy());
        assert_eq!(gate.shared_holders(), 0);
        assert!(!gate.acquire_shared());
    });
    assert!(gate.is_busy());
    assert_eq!(gate.raw.is_locked(), false);
}

#[test]
fn wait_for_quiescence() {
    let gate = Gate::new();
    assert!(gate.acquire_shared());
    assert!(gate.acquire_shared());
    let done = AtomicBool::new(false);
    thread::scope(|s| {
        let handle = s.spawn(|| {
            gate.wait_for_quiescence();
            done.store(true, Relaxed);
        });
        thread::sleep(BLOCK_CHECK);
        assert_eq!(done.load(Relaxed), false);
        assert!(gate.release_shared());
        thread::sleep(BLOCK_CHECK);
        assert_eq!(done.load(Relaxed), false);
        assert!(gate.release_shared());
        handle.join().unwrap();
    });
    assert_eq!(done.load(Relaxed), true);
    assert_default(&gate);
}

#[test]
fn wait_for_quiescence_open_gate() {
    let gate = Gate::new();
    gate.wait_for_quiescence();
    assert_default(&gate);
}

#[test]
fn end_to_end() {
    let gate = Gate::new();
    assert!(gate.acquire_shared());
    assert!(run_in_thread(|| gate.acquire_shared()));
    assert_eq!(gate.shared_holders(), 2);
    let done = AtomicBool::new(false);
    thread::scope(|s| {
        let writer = s.spawn(|| {
            let res = gate.begin_busy();
            done.store(true, Relaxed);
            res
        });
        thread::sleep(BLOCK_CHECK);
        assert_eq!(done.load(Relaxed), false);
        assert!(gate.release_shared());
        thread::sleep(BLOCK_CHECK);
        assert_eq!(done.load(Relaxed), false);
        assert!(run_in_thread(|| gate.release_shared()));
        assert!(writer.join().unwrap());
    });
    assert!(gate.is_busy());
    assert!(!run_in_thread(|| gate.acquire_shared()));
    assert!(gate.end_busy());
    assert!(run_in_thread(|| gate.acquire_shared()));
    assert!(gate.release_shared());
    assert_default(&gate);
}

#[test]
#[should_panic(expected = "gate dropped with 1 outstanding shared acquisitions")]
fn drop_while_held() {
    let gate = Gate::new();
    assert!(gate.acquire_shared());
    drop(gate);
}

#[test]
fn debug() {
    let gate = Gate::new();
    assert!(gate.acquire_shared());
    let formatted = format!("{gate:?}");
    assert!(formatted.contains("busy: false"));
    assert!(formatted.contains("shared_holders: 1"));
    assert!(gate.release_shared());
}
