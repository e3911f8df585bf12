//! Sequence counter for optimistic concurrency control
//!
//! Each data block starts with a sequence word. The single writer moves it
//! to an odd value before copying the payload in and back to an even value
//! after. Readers copy the payload out and accept the copy only if the
//! sequence was even and unchanged across the copy.

use std::sync::atomic::{AtomicU64, Ordering, fence};

/// Even/odd sequence counter living in shared memory
#[derive(Debug)]
#[repr(transparent)]
pub struct SeqCounter {
    counter: AtomicU64,
}

impl SeqCounter {
    /// Create a new counter starting at 0 (even)
    pub const fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// View an atomic that lives inside a mapped block as a counter
    pub fn from_atomic(atomic: &AtomicU64) -> &Self {
        // SAFETY: repr(transparent) over AtomicU64
        unsafe { &*(atomic as *const AtomicU64 as *const SeqCounter) }
    }

    /// Get current sequence with acquire ordering
    pub fn load(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Begin write operation - move to an odd sequence.
    ///
    /// Payload stores issued after this call cannot become visible before
    /// the odd value does.
    pub fn begin_write(&self) -> u64 {
        let next = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        fence(Ordering::Release);
        next
    }

    /// Complete write operation - publish an even sequence
    pub fn end_write(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Release) + 1
    }

    /// Snapshot the sequence before a read; `None` while a write is in flight
    pub fn read_begin(&self) -> Option<u64> {
        let seq = self.counter.load(Ordering::Acquire);
        Self::is_stable(seq).then_some(seq)
    }

    /// Validate a read started at `start`
    pub fn read_validate(&self, start: u64) -> bool {
        fence(Ordering::Acquire);
        self.counter.load(Ordering::Relaxed) == start
    }

    /// Check if sequence is stable (even)
    pub fn is_stable(seq: u64) -> bool {
        seq % 2 == 0
    }

    /// Check if sequence indicates write in progress (odd)
    pub fn is_writing(seq: u64) -> bool {
        seq % 2 == 1
    }
}

impl Default for SeqCounter {
    fn default() -> Self {
        Self::new()
    }
}
