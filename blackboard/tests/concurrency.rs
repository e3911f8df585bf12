//! Multi-threaded access: single writer and torn-read freedom

use blackboard::interfaces::motor::MotorInterface;
use blackboard::interfaces::skiller::SkillerInterface;
use blackboard::{BbError, BlackBoard, BlackBoardConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn local() -> BlackBoard {
    BlackBoard::new(BlackBoardConfig::local(1 << 20)).unwrap()
}

#[test]
fn test_racing_writers_one_wins() {
    let bb = local();
    let barrier = Arc::new(Barrier::new(8));
    let wins = Arc::new(AtomicUsize::new(0));
    let held = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let bb = bb.clone();
            let barrier = barrier.clone();
            let wins = wins.clone();
            let held = held.clone();
            thread::spawn(move || {
                barrier.wait();
                let result = bb.open_for_writing::<MotorInterface>("Robotino");
                match &result {
                    Ok(_) => {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => assert!(matches!(e, BbError::WriterAlreadyActive { .. }), "{e}"),
                }
                // Keep the winner open until everyone has tried
                held.wait();
                drop(result);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert!(bb.list_all().unwrap().is_empty());
}

/// Fill every byte-carrying field from one counter so a torn copy shows
/// up as disagreeing fields
fn stamp(data: &mut SkillerInterface, value: u32) {
    data.exclusive_controller = value;
    data.set_skill_string(&format!("{value:0>1000}"));
    data.set_error(&format!("{value:0>100}"));
}

fn consistent(data: &SkillerInterface) -> Option<u32> {
    let value = data.exclusive_controller;
    (data.skill_string() == format!("{value:0>1000}") && data.error() == format!("{value:0>100}"))
        .then_some(value)
}

#[test]
fn test_no_torn_reads() {
    const WRITES: u32 = 5_000;
    const READERS: usize = 4;

    let bb = local();
    let mut writer = bb.open_for_writing::<SkillerInterface>("Skiller").unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let bb = bb.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut reader = bb.open_for_reading::<SkillerInterface>("Skiller").unwrap();
                let mut last = 0;
                let mut reads = 0usize;
                while !done.load(Ordering::Acquire) {
                    reader.read().unwrap();
                    let value = consistent(reader.data())
                        .unwrap_or_else(|| panic!("torn read at revision {}", reader.revision()));
                    assert!(value <= WRITES);
                    // Monotonic: never an earlier write after a later one
                    assert!(value >= last, "went back from {last} to {value}");
                    last = value;
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for value in 1..=WRITES {
        stamp(writer.data_mut(), value);
        writer.write().unwrap();
    }
    done.store(true, Ordering::Release);

    for handle in readers {
        assert!(handle.join().unwrap() > 0);
    }

    let mut reader = bb.open_for_reading::<SkillerInterface>("Skiller").unwrap();
    reader.read().unwrap();
    assert_eq!(consistent(reader.data()), Some(WRITES));
    assert_eq!(reader.revision(), u64::from(WRITES));
}

#[test]
fn test_concurrent_open_close_keeps_directory_consistent() {
    let bb = local();
    let handles: Vec<_> = (0..6)
        .map(|t| {
            let bb = bb.clone();
            thread::spawn(move || {
                for round in 0..200 {
                    let id = format!("m{}", (t + round) % 3);
                    let reader = bb.open_for_reading::<MotorInterface>(&id).unwrap();
                    if let Ok(writer) = bb.open_for_writing::<MotorInterface>(&id) {
                        bb.close(writer).unwrap();
                    }
                    bb.close(reader).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(bb.list_all().unwrap().is_empty());
    let stats = bb.stats().unwrap();
    assert_eq!(stats.arena.used_chunks, 0);
    assert_eq!(stats.arena.free_bytes, stats.arena.heap_size);
}
