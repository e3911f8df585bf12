//! Read latency under concurrent readers and a busy writer

use blackboard::interfaces::skiller::SkillerInterface;
use blackboard::{BlackBoard, BlackBoardConfig};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn local() -> BlackBoard {
    BlackBoard::new(BlackBoardConfig::local(1 << 20)).unwrap()
}

/// Ten readers polling the same interface
fn bench_concurrent_readers(c: &mut Criterion) {
    let bb = local();
    let mut writer = bb.open_for_writing::<SkillerInterface>("bench").unwrap();
    writer.write().unwrap();

    c.bench_function("concurrent_10_readers", |b| {
        b.iter(|| {
            let barrier = Arc::new(Barrier::new(11));
            let handles: Vec<_> = (0..10)
                .map(|_| {
                    let bb = bb.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        let mut reader = bb.open_for_reading::<SkillerInterface>("bench").unwrap();
                        barrier.wait();
                        for _ in 0..100 {
                            reader.read().unwrap();
                            black_box(reader.revision());
                        }
                    })
                })
                .collect();

            barrier.wait();
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });
}

/// One reader while another thread writes as fast as it can
fn bench_reader_under_write_pressure(c: &mut Criterion) {
    let bb = local();
    let stop = Arc::new(AtomicBool::new(false));
    let started = Arc::new(Barrier::new(2));

    let writer_thread = {
        let bb = bb.clone();
        let stop = stop.clone();
        let started = started.clone();
        thread::spawn(move || {
            let mut writer = bb.open_for_writing::<SkillerInterface>("pressure").unwrap();
            started.wait();
            let mut n = 0u32;
            while !stop.load(Ordering::Relaxed) {
                n = n.wrapping_add(1);
                writer.data_mut().exclusive_controller = n;
                writer.write().unwrap();
            }
        })
    };
    started.wait();

    let mut reader = bb.open_for_reading::<SkillerInterface>("pressure").unwrap();
    c.bench_function("reader_under_write_pressure", |b| {
        b.iter(|| {
            reader.read().unwrap();
            black_box(reader.data().exclusive_controller);
        });
    });

    stop.store(true, Ordering::Relaxed);
    writer_thread.join().unwrap();
}

criterion_group!(benches, bench_concurrent_readers, bench_reader_under_write_pressure);
criterion_main!(benches);
