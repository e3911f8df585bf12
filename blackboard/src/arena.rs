//! First-fit chunk allocator for the shared heap
//!
//! The heap is described by a table of chunk records kept sorted by offset.
//! The records tile the heap exactly: every byte belongs to one free or one
//! used chunk, and no two free chunks are adjacent.

use crate::error::{BbError, BbResult};
use bb_common::consts::CACHE_LINE_SIZE;
use serde::Serialize;

/// Chunk is available
pub const CHUNK_FREE: u32 = 0;
/// Chunk backs an interface block
pub const CHUNK_USED: u32 = 1;

/// One entry of the chunk table, stored in the region
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkRecord {
    /// Offset from the start of the heap
    pub offset: u64,
    /// Chunk size in bytes, multiple of the cache line
    pub size: u64,
    /// `CHUNK_FREE` or `CHUNK_USED`
    pub state: u32,
    _pad: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<ChunkRecord>(), 24);

impl ChunkRecord {
    fn new(offset: u64, size: u64, state: u32) -> Self {
        Self {
            offset,
            size,
            state,
            _pad: 0,
        }
    }

    fn is_free(&self) -> bool {
        self.state == CHUNK_FREE
    }
}

/// Memory usage summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArenaStats {
    /// Heap size in bytes
    pub heap_size: u64,
    /// Bytes in free chunks
    pub free_bytes: u64,
    /// Bytes in used chunks
    pub used_bytes: u64,
    /// Number of free chunks
    pub free_chunks: u32,
    /// Number of used chunks
    pub used_chunks: u32,
    /// Largest single free chunk
    pub largest_free: u64,
}

/// Round up to the cache line, never below one line
pub fn chunk_size_for(size: usize) -> u64 {
    let line = CACHE_LINE_SIZE as u64;
    let size = (size as u64).max(1);
    size.div_ceil(line) * line
}

/// Mutable view of the chunk table.
///
/// Only obtainable while the registry lock is held.
pub struct ChunkTable<'a> {
    len: &'a mut u64,
    records: &'a mut [ChunkRecord],
    heap_size: u64,
}

impl<'a> ChunkTable<'a> {
    /// Wrap an existing table; `records.len()` is the capacity
    pub fn new(len: &'a mut u64, records: &'a mut [ChunkRecord], heap_size: u64) -> Self {
        Self {
            len,
            records,
            heap_size,
        }
    }

    /// Reset to a single free chunk covering the heap
    pub fn format(&mut self) {
        self.records[0] = ChunkRecord::new(0, self.heap_size, CHUNK_FREE);
        *self.len = 1;
    }

    fn used(&self) -> &[ChunkRecord] {
        &self.records[..*self.len as usize]
    }

    /// Number of records in use
    pub fn len(&self) -> usize {
        *self.len as usize
    }

    /// True if no records exist (unformatted table)
    pub fn is_empty(&self) -> bool {
        *self.len == 0
    }

    fn insert(&mut self, index: usize, record: ChunkRecord) {
        let len = *self.len as usize;
        self.records.copy_within(index..len, index + 1);
        self.records[index] = record;
        *self.len += 1;
    }

    fn remove(&mut self, index: usize) {
        let len = *self.len as usize;
        self.records.copy_within(index + 1..len, index);
        *self.len -= 1;
    }

    /// Allocate a chunk of at least `size` bytes, returning its heap offset
    pub fn alloc(&mut self, size: usize) -> BbResult<u64> {
        let want = chunk_size_for(size);
        let Some(index) = self
            .used()
            .iter()
            .position(|r| r.is_free() && r.size >= want)
        else {
            return Err(BbError::OutOfMemory {
                requested: want as usize,
                largest_free: self.stats().largest_free as usize,
            });
        };

        let found = self.records[index];
        let remainder = found.size - want;
        let can_split = remainder >= CACHE_LINE_SIZE as u64 && self.len() < self.records.len();
        if can_split {
            self.records[index].size = want;
            self.insert(
                index + 1,
                ChunkRecord::new(found.offset + want, remainder, CHUNK_FREE),
            );
        }
        self.records[index].state = CHUNK_USED;
        Ok(found.offset)
    }

    /// Return the chunk at `offset` to the free pool, merging neighbours
    pub fn free(&mut self, offset: u64) -> BbResult<()> {
        let index = match self.used().binary_search_by_key(&offset, |r| r.offset) {
            Ok(i) if !self.records[i].is_free() => i,
            _ => return Err(BbError::InvalidFree { offset }),
        };
        self.records[index].state = CHUNK_FREE;

        if index + 1 < self.len() && self.records[index + 1].is_free() {
            self.records[index].size += self.records[index + 1].size;
            self.remove(index + 1);
        }
        if index > 0 && self.records[index - 1].is_free() {
            self.records[index - 1].size += self.records[index].size;
            self.remove(index);
        }
        Ok(())
    }

    /// Usage summary
    pub fn stats(&self) -> ArenaStats {
        let mut stats = ArenaStats {
            heap_size: self.heap_size,
            ..ArenaStats::default()
        };
        for record in self.used() {
            if record.is_free() {
                stats.free_bytes += record.size;
                stats.free_chunks += 1;
                stats.largest_free = stats.largest_free.max(record.size);
            } else {
                stats.used_bytes += record.size;
                stats.used_chunks += 1;
            }
        }
        stats
    }

    /// Verify the tiling invariants, describing the first violation
    pub fn check(&self) -> Result<(), String> {
        let mut expected = 0u64;
        let mut prev_free = false;
        for (i, record) in self.used().iter().enumerate() {
            if record.offset != expected {
                return Err(format!("record {i} at {} expected {expected}", record.offset));
            }
            if record.size == 0 || record.size % CACHE_LINE_SIZE as u64 != 0 {
                return Err(format!("record {i} has bad size {}", record.size));
            }
            if prev_free && record.is_free() {
                return Err(format!("records {} and {i} both free", i - 1));
            }
            prev_free = record.is_free();
            expected += record.size;
        }
        if expected != self.heap_size {
            return Err(format!("records cover {expected} of {}", self.heap_size));
        }
        Ok(())
    }
}
