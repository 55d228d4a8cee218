//! Real-hardware checks of the barrier pair and of the Mach executor.
//!
//! On macOS/iOS the heavy side is the IPI barrier and the light side a
//! compiler fence; elsewhere both sides are `SeqCst` fences, so the
//! heavy/light ordering tests hold on every host.

#![cfg(not(feature = "loom"))]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use mach_barrier::{heavy_barrier, light_barrier};

/// Rounds for the message-passing tests.
const ROUNDS: usize = 5_000;

/// Reader threads per round in the SWMR test.
const NUM_READERS: usize = 4;

/// Writer: `data = 1; heavy; flag = 1`. Readers: `flag; light; data`.
/// A reader that sees the flag must see the data.
fn message_passing_round(readers: usize) {
    let data = Arc::new(AtomicUsize::new(0));
    let flag = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..readers)
        .map(|_| {
            let (data, flag) = (data.clone(), flag.clone());
            thread::spawn(move || {
                let seen_flag = flag.load(Ordering::Relaxed);
                light_barrier();
                let seen_data = data.load(Ordering::Relaxed);
                if seen_flag == 1 {
                    assert_eq!(seen_data, 1, "saw flag=1 but data=0");
                }
            })
        })
        .collect();

    data.store(1, Ordering::Relaxed);
    heavy_barrier();
    flag.store(1, Ordering::Relaxed);

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_basic_ordering() {
    for _ in 0..ROUNDS {
        message_passing_round(1);
    }
}

#[test]
fn test_swmr_ordering() {
    for _ in 0..ROUNDS / 5 {
        message_passing_round(NUM_READERS);
    }
}

/// Writer bumps `data` then publishes the same value as `version`.
/// A reader must never see a version newer than the data behind it.
#[test]
fn test_versioned_publish() {
    const PUBLISHES: usize = 20_000;

    let version = Arc::new(AtomicUsize::new(0));
    let data = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..NUM_READERS)
        .map(|_| {
            let (version, data, done) = (version.clone(), data.clone(), done.clone());
            thread::spawn(move || {
                while done.load(Ordering::Relaxed) == 0 {
                    let v = version.load(Ordering::Relaxed);
                    light_barrier();
                    let d = data.load(Ordering::Relaxed);
                    assert!(d >= v, "version {v} published before data {d}");
                    std::hint::spin_loop();
                }
            })
        })
        .collect();

    for i in 1..=PUBLISHES {
        data.store(i, Ordering::Relaxed);
        heavy_barrier();
        version.store(i, Ordering::Relaxed);
    }
    done.store(1, Ordering::Relaxed);

    for reader in readers {
        reader.join().unwrap();
    }
}

/// Acceleration follows the capability probe on Apple targets and is off elsewhere.
///
/// 在 Apple 目标上加速与能力探测一致，其他平台不加速。
#[test]
fn test_acceleration_matches_platform() {
    let apple = cfg!(any(target_os = "macos", target_os = "ios"));
    assert_eq!(
        mach_barrier::is_accelerated(),
        apple && mach_barrier::is_supported()
    );
}

/// The probe is a pure function of the target architecture.
#[test]
fn test_is_supported_follows_arch() {
    let expected = cfg!(any(target_arch = "x86_64", target_arch = "aarch64"));
    assert_eq!(mach_barrier::is_supported(), expected);
    assert_eq!(mach_barrier::ThreadStateFlavor::NATIVE.is_some(), expected);
}

#[cfg(all(
    any(target_os = "macos", target_os = "ios"),
    any(target_arch = "x86_64", target_arch = "aarch64"),
))]
mod apple {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering, compiler_fence};
    use std::thread;

    use mach_barrier::flush_process_write_buffers;

    /// Only the calling thread (and the test harness) exists: still succeeds.
    #[test]
    fn test_flush_with_few_threads() {
        flush_process_write_buffers().unwrap();
    }

    /// Busy-spinning threads do not stall the barrier.
    #[test]
    fn test_flush_with_spinning_threads() {
        const SPINNERS: usize = 8;
        let stop = Arc::new(AtomicBool::new(false));
        let spins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..SPINNERS)
            .map(|_| {
                let stop = stop.clone();
                let spins = spins.clone();
                thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        spins.fetch_add(1, Ordering::Relaxed);
                        std::hint::spin_loop();
                    }
                })
            })
            .collect();

        for _ in 0..1_000 {
            flush_process_write_buffers().unwrap();
        }

        stop.store(true, Ordering::Relaxed);
        for handle in handles {
            handle.join().unwrap();
        }
    }

    /// Store-buffer litmus: each reader publishes its own flag with a relaxed
    /// store then reads the writer's flag after a compiler fence. The writer
    /// does the mirror image around the heavy barrier. Both reading 0 would
    /// mean a store was still buffered past the barrier.
    #[test]
    fn test_flush_drains_store_buffers() {
        const READERS: usize = 4;
        const ROUNDS: usize = 2_000;

        for _ in 0..ROUNDS {
            let writer_flag = Arc::new(AtomicUsize::new(0));
            let reader_flags: Arc<Vec<AtomicUsize>> =
                Arc::new((0..READERS).map(|_| AtomicUsize::new(0)).collect());
            let reader_saw: Arc<Vec<AtomicBool>> =
                Arc::new((0..READERS).map(|_| AtomicBool::new(false)).collect());

            let readers: Vec<_> = (0..READERS)
                .map(|i| {
                    let writer_flag = writer_flag.clone();
                    let reader_flags = reader_flags.clone();
                    let reader_saw = reader_saw.clone();
                    thread::spawn(move || {
                        reader_flags[i].store(1, Ordering::Relaxed);
                        compiler_fence(Ordering::SeqCst);
                        if writer_flag.load(Ordering::Relaxed) == 1 {
                            reader_saw[i].store(true, Ordering::Relaxed);
                        }
                    })
                })
                .collect();

            writer_flag.store(1, Ordering::Relaxed);
            flush_process_write_buffers().unwrap();
            let writer_saw: Vec<bool> = reader_flags
                .iter()
                .map(|flag| flag.load(Ordering::Relaxed) == 1)
                .collect();

            for reader in readers {
                reader.join().unwrap();
            }

            for (i, &saw_reader) in writer_saw.iter().enumerate() {
                assert!(
                    saw_reader || reader_saw[i].load(Ordering::Relaxed),
                    "store buffer not drained: reader {i} and writer both read 0"
                );
            }
        }
    }

    /// 10,000 back-to-back calls: no accumulated state, no leaked ports.
    #[test]
    fn test_repeated_flush() {
        for i in 0..10_000 {
            if let Err(err) = flush_process_write_buffers() {
                panic!("call {i} failed: {err}");
            }
        }
    }
}
