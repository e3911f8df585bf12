//! Shared region layout and the cross-process registry lock
//!
//! ```text
//! ┌──────────────┬──────────────────────┬──────────────┬──────────────────────┐
//! │ RegionHeader │ DirectoryEntry × N   │ ChunkRecord  │ heap                 │
//! │ magic, pids, │ state, generation,   │ × M, sorted  │ [BlockHeader|payload]│
//! │ lock, serial │ counts, names, block │ by offset    │ [BlockHeader|payload]│
//! └──────────────┴──────────────────────┴──────────────┴──────────────────────┘
//! ```
//!
//! Every cross-process reference is an offset into the mapping. Directory
//! entries and chunk records are only mutated while the registry lock is
//! held; block payloads are guarded by their own sequence counter.

use crate::arena::{ChunkRecord, ChunkTable};
use crate::config::{ArenaMode, BlackBoardConfig};
use crate::error::{BbError, BbResult};
use crate::platform::{
    attach_region_mmap, create_anon_mmap, create_region_mmap, get_current_pid, is_process_alive,
    now_nanos, remove_region_file,
};
use bb_common::consts::{CACHE_LINE_SIZE, INTERFACE_ID_SIZE, INTERFACE_TYPE_SIZE};
use memmap2::MmapMut;
use parking_lot::{Mutex, MutexGuard};
use std::cell::UnsafeCell;
use std::mem::size_of;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Region magic
pub const REGION_MAGIC: [u8; 8] = *b"BBARENA\0";
/// Bumped whenever any shared structure changes shape
pub const LAYOUT_VERSION: u32 = 1;

/// Directory slot is unused
pub const SLOT_FREE: u32 = 0;
/// Directory slot describes a live interface
pub const SLOT_LIVE: u32 = 1;

/// Spins before yielding while waiting for the registry lock
const LOCK_SPINS: u32 = 64;
/// Yields between liveness probes of the lock holder
const LOCK_PROBE_INTERVAL: u32 = 1024;

/// Region header with cache-line alignment
#[repr(C, align(64))]
pub struct RegionHeader {
    /// Magic number for validation
    pub magic: [u8; 8],
    /// Shared structure version
    pub layout_version: u32,
    /// Process that created the region
    pub master_pid: u32,
    /// Creation timestamp, distinguishes re-created regions of the same name
    pub epoch: u64,
    /// 1 while the master keeps the region alive
    pub alive: AtomicU32,
    /// Registry lock word: 0 when free, holder pid otherwise
    pub lock: AtomicU32,
    /// Instance serial counter
    pub next_serial: AtomicU32,
    /// Directory slots
    pub max_interfaces: u32,
    /// Mapped size
    pub total_size: u64,
    /// Chunk table capacity
    pub max_chunks: u32,
    _pad: u32,
    /// Offset of the directory table
    pub directory_offset: u64,
    /// Offset of the chunk table
    pub chunks_offset: u64,
    /// Offset of the heap
    pub heap_offset: u64,
    /// Heap size
    pub heap_size: u64,
    chunk_len: UnsafeCell<u64>,
}

/// Names stored in a directory slot, NUL padded
#[repr(C)]
pub struct EntryNames {
    type_name: [u8; INTERFACE_TYPE_SIZE],
    id: [u8; INTERFACE_ID_SIZE],
}

/// One directory slot
#[repr(C, align(64))]
pub struct DirectoryEntry {
    /// `SLOT_FREE` or `SLOT_LIVE`
    pub state: AtomicU32,
    /// Bumped on every free; handles carry the value they were issued with
    pub generation: AtomicU32,
    /// Open reading accessors, all processes
    pub reader_count: AtomicU32,
    /// 1 while a writing accessor is open
    pub has_writer: AtomicU32,
    /// Process of the writing accessor
    pub writer_pid: AtomicU32,
    /// Serial of the writing accessor
    pub writer_serial: AtomicU32,
    /// Schema hash of the interface type
    pub hash: AtomicU64,
    /// Heap offset of the block
    pub block_offset: AtomicU64,
    /// Block size including its header
    pub block_size: AtomicU64,
    /// Payload size
    pub data_size: AtomicU64,
    names: UnsafeCell<EntryNames>,
}

/// Header in front of every payload block
#[repr(C, align(64))]
pub struct BlockHeader {
    /// Even/odd sequence word
    pub seq: AtomicU64,
    /// Completed writes since creation
    pub revision: AtomicU64,
    /// Wall clock of the last completed write
    pub timestamp_ns: AtomicU64,
}

static_assertions::const_assert_eq!(size_of::<RegionHeader>() % CACHE_LINE_SIZE, 0);
static_assertions::const_assert_eq!(size_of::<DirectoryEntry>() % CACHE_LINE_SIZE, 0);
static_assertions::const_assert_eq!(size_of::<BlockHeader>(), CACHE_LINE_SIZE);

/// Size of the header placed in front of each payload
pub const BLOCK_HEADER_SIZE: usize = size_of::<BlockHeader>();

/// Creation stamp, strictly increasing within this process
fn unique_epoch() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);
    let now = now_nanos();
    let mut last = LAST.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(seen) => last = seen,
        }
    }
}

fn align_up(value: usize) -> usize {
    value.div_ceil(CACHE_LINE_SIZE) * CACHE_LINE_SIZE
}

/// Placement of the tables inside a region of a given size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLayout {
    /// Mapped size
    pub total_size: usize,
    /// Directory slots
    pub max_interfaces: u32,
    /// Chunk table capacity
    pub max_chunks: u32,
    /// Offset of the directory table
    pub directory_offset: usize,
    /// Offset of the chunk table
    pub chunks_offset: usize,
    /// Offset of the heap
    pub heap_offset: usize,
    /// Heap size, multiple of the cache line
    pub heap_size: usize,
}

impl RegionLayout {
    /// Compute the layout; fails if the tables leave no room for a heap
    pub fn compute(total_size: usize, max_interfaces: u32, max_chunks: u32) -> BbResult<Self> {
        let directory_offset = align_up(size_of::<RegionHeader>());
        let chunks_offset =
            align_up(directory_offset + max_interfaces as usize * size_of::<DirectoryEntry>());
        let heap_offset = align_up(chunks_offset + max_chunks as usize * size_of::<ChunkRecord>());
        let heap_size = total_size.saturating_sub(heap_offset) / CACHE_LINE_SIZE * CACHE_LINE_SIZE;
        if heap_size < 2 * CACHE_LINE_SIZE {
            return Err(BbError::OutOfMemory {
                requested: heap_offset + 2 * CACHE_LINE_SIZE,
                largest_free: total_size,
            });
        }
        Ok(Self {
            total_size,
            max_interfaces,
            max_chunks,
            directory_offset,
            chunks_offset,
            heap_offset,
            heap_size,
        })
    }
}

/// A mapped arena, either owned (master) or attached (slave)
pub struct Region {
    name: Option<String>,
    mode: ArenaMode,
    base: NonNull<u8>,
    layout: RegionLayout,
    epoch: u64,
    local_lock: Mutex<()>,
    _mmap: MmapMut,
}

// SAFETY: all shared state reachable through `base` is atomics or is only
// touched while the registry lock is held.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Create and format a region as master
    pub fn create(config: &BlackBoardConfig) -> BbResult<Self> {
        let layout = RegionLayout::compute(
            config.memory_size,
            config.max_interfaces,
            config.max_chunks,
        )?;

        let mut mmap = match &config.region_name {
            Some(name) => {
                crate::lifecycle::reclaim_stale_region(name)?;
                create_region_mmap(name, config.memory_size)?
            }
            None => create_anon_mmap(config.memory_size)?,
        };

        let base = NonNull::new(mmap.as_mut_ptr()).ok_or_else(|| BbError::InvalidRegion {
            name: config.region_name.clone().unwrap_or_default(),
            reason: "null mapping".to_string(),
        })?;
        let epoch = unique_epoch();

        let header = RegionHeader {
            magic: REGION_MAGIC,
            layout_version: LAYOUT_VERSION,
            master_pid: get_current_pid(),
            epoch,
            alive: AtomicU32::new(0),
            lock: AtomicU32::new(0),
            next_serial: AtomicU32::new(1),
            max_interfaces: layout.max_interfaces,
            total_size: layout.total_size as u64,
            max_chunks: layout.max_chunks,
            _pad: 0,
            directory_offset: layout.directory_offset as u64,
            chunks_offset: layout.chunks_offset as u64,
            heap_offset: layout.heap_offset as u64,
            heap_size: layout.heap_size as u64,
            chunk_len: UnsafeCell::new(0),
        };
        // SAFETY: fresh zeroed mapping, large enough per `compute`, nobody
        // else can observe a header whose alive flag is still 0.
        unsafe { std::ptr::write(base.as_ptr() as *mut RegionHeader, header) };

        let region = Self {
            name: config.region_name.clone(),
            mode: ArenaMode::Master,
            base,
            layout,
            epoch,
            local_lock: Mutex::new(()),
            _mmap: mmap,
        };
        {
            let mut guard = region.lock()?;
            guard.chunks().format();
        }
        region.header().alive.store(1, Ordering::Release);

        info!(
            region = region.display_name(),
            size = layout.total_size,
            heap = layout.heap_size,
            slots = layout.max_interfaces,
            "BlackBoard region created"
        );
        Ok(region)
    }

    /// Attach to a region created by a master
    pub fn attach(name: &str) -> BbResult<Self> {
        let mut mmap = attach_region_mmap(name)?;
        let invalid = |reason: String| BbError::InvalidRegion {
            name: name.to_string(),
            reason,
        };

        if mmap.len() < size_of::<RegionHeader>() {
            return Err(invalid(format!("mapping too small ({} bytes)", mmap.len())));
        }
        let base = NonNull::new(mmap.as_mut_ptr()).ok_or_else(|| invalid("null mapping".into()))?;
        // SAFETY: length checked above; mappings are page aligned
        let header = unsafe { &*(base.as_ptr() as *const RegionHeader) };

        if header.alive.load(Ordering::Acquire) != 1 {
            return Err(BbError::AlivenessLost {
                reason: format!("region {name} not alive"),
            });
        }
        if header.magic != REGION_MAGIC {
            return Err(invalid("bad magic".into()));
        }
        if header.layout_version != LAYOUT_VERSION {
            return Err(invalid(format!(
                "layout version {} (expected {LAYOUT_VERSION})",
                header.layout_version
            )));
        }
        if header.total_size as usize != mmap.len() {
            return Err(invalid(format!(
                "header size {} does not match mapping {}",
                header.total_size,
                mmap.len()
            )));
        }
        let layout = RegionLayout::compute(
            header.total_size as usize,
            header.max_interfaces,
            header.max_chunks,
        )?;
        if layout.heap_offset as u64 != header.heap_offset
            || layout.heap_size as u64 != header.heap_size
        {
            return Err(invalid("table offsets disagree".into()));
        }
        let epoch = header.epoch;

        debug!(
            region = name,
            master_pid = header.master_pid,
            "Attached to BlackBoard region"
        );
        Ok(Self {
            name: Some(name.to_string()),
            mode: ArenaMode::Slave,
            base,
            layout,
            epoch,
            local_lock: Mutex::new(()),
            _mmap: mmap,
        })
    }

    /// Region name, `None` for anonymous arenas
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for logs and errors
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<local>")
    }

    /// Master or slave
    pub fn mode(&self) -> ArenaMode {
        self.mode
    }

    /// Table placement
    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    /// Shared header
    pub fn header(&self) -> &RegionHeader {
        // SAFETY: validated at create/attach
        unsafe { &*(self.base.as_ptr() as *const RegionHeader) }
    }

    /// Directory slot `slot`; panics on out-of-range slots
    pub fn entry(&self, slot: u32) -> &DirectoryEntry {
        assert!(slot < self.layout.max_interfaces, "slot {slot} out of range");
        let offset = self.layout.directory_offset + slot as usize * size_of::<DirectoryEntry>();
        // SAFETY: inside the directory table per `RegionLayout`
        unsafe { &*(self.base.as_ptr().add(offset) as *const DirectoryEntry) }
    }

    /// Check that a block lies inside the heap
    pub fn block_in_bounds(&self, offset: u64, size: u64) -> bool {
        offset % CACHE_LINE_SIZE as u64 == 0
            && size >= BLOCK_HEADER_SIZE as u64
            && offset
                .checked_add(size)
                .is_some_and(|end| end <= self.layout.heap_size as u64)
    }

    /// Header of the block at heap offset `offset`
    ///
    /// # Safety
    ///
    /// `offset` must satisfy [`Region::block_in_bounds`].
    pub unsafe fn block_header(&self, offset: u64) -> &BlockHeader {
        let at = self.layout.heap_offset + offset as usize;
        // SAFETY: caller guarantees bounds; heap and offset are line aligned
        unsafe { &*(self.base.as_ptr().add(at) as *const BlockHeader) }
    }

    /// Start of the payload of the block at heap offset `offset`
    ///
    /// # Safety
    ///
    /// `offset` must satisfy [`Region::block_in_bounds`].
    pub unsafe fn payload_ptr(&self, offset: u64) -> *mut u8 {
        let at = self.layout.heap_offset + offset as usize + BLOCK_HEADER_SIZE;
        // SAFETY: caller guarantees bounds
        unsafe { self.base.as_ptr().add(at) }
    }

    /// True while the master keeps this region alive and this mapping is
    /// still the one it published
    pub fn is_alive(&self) -> bool {
        if !self.is_published() {
            return false;
        }
        match self.mode {
            ArenaMode::Master => true,
            ArenaMode::Slave => is_process_alive(self.header().master_pid),
        }
    }

    /// Alive flag set and epoch unchanged; no process probe
    pub fn is_published(&self) -> bool {
        let header = self.header();
        header.alive.load(Ordering::Acquire) == 1 && header.epoch == self.epoch
    }

    /// Next instance serial, unique within the region
    pub fn next_serial(&self) -> u32 {
        self.header().next_serial.fetch_add(1, Ordering::AcqRel)
    }

    /// Acquire the registry lock.
    ///
    /// A lock word left behind by a dead process is taken over.
    pub fn lock(&self) -> BbResult<RegionGuard<'_>> {
        let local = self.local_lock.lock();
        let word = &self.header().lock;
        let pid = get_current_pid();
        let mut attempts: u32 = 0;

        loop {
            match word.compare_exchange_weak(0, pid, Ordering::Acquire, Ordering::Relaxed) {
                Ok(_) => break,
                Err(holder) => {
                    attempts = attempts.wrapping_add(1);
                    if attempts < LOCK_SPINS {
                        std::hint::spin_loop();
                        continue;
                    }
                    if attempts % LOCK_PROBE_INTERVAL == 0 && holder != 0 {
                        if !is_process_alive(holder) {
                            if word
                                .compare_exchange(holder, pid, Ordering::Acquire, Ordering::Relaxed)
                                .is_ok()
                            {
                                warn!(
                                    region = self.display_name(),
                                    dead_pid = holder,
                                    "Registry lock held by dead process, taken over"
                                );
                                break;
                            }
                        } else if self.mode == ArenaMode::Slave && !self.is_alive() {
                            return Err(BbError::AlivenessLost {
                                reason: format!("region {} lost while locking", self.display_name()),
                            });
                        }
                    }
                    std::thread::yield_now();
                }
            }
        }

        Ok(RegionGuard {
            region: self,
            _local: local,
        })
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if self.mode != ArenaMode::Master {
            debug!(region = self.display_name(), "Detached from BlackBoard region");
            return;
        }
        self.header().alive.store(0, Ordering::Release);
        if let Some(name) = &self.name {
            // The file may already belong to a newer master of the same name
            let ours = matches!(
                crate::lifecycle::probe_region(name),
                Ok(Some(probe)) if probe.epoch == self.epoch
            );
            if !ours {
                debug!(region = name.as_str(), "Region file replaced, leaving it");
            } else if let Err(e) = remove_region_file(name) {
                warn!(region = name.as_str(), error = %e, "Failed to remove region file");
            }
        }
        info!(region = self.display_name(), "BlackBoard region destroyed");
    }
}

/// Holds the registry lock; released on drop
pub struct RegionGuard<'a> {
    region: &'a Region,
    _local: MutexGuard<'a, ()>,
}

impl<'a> RegionGuard<'a> {
    /// Region the lock belongs to
    pub fn region(&self) -> &'a Region {
        self.region
    }

    /// Allocator view of the chunk table
    pub fn chunks(&mut self) -> ChunkTable<'_> {
        let layout = self.region.layout;
        let header = self.region.header();
        // SAFETY: the registry lock serializes every access to the chunk
        // table and its length; `&mut self` keeps this view unique.
        unsafe {
            let len = &mut *header.chunk_len.get();
            let records = std::slice::from_raw_parts_mut(
                self.region.base.as_ptr().add(layout.chunks_offset) as *mut ChunkRecord,
                layout.max_chunks as usize,
            );
            ChunkTable::new(len, records, layout.heap_size as u64)
        }
    }

    /// Type name and identifier stored in `slot`
    pub fn entry_names(&self, slot: u32) -> (String, String) {
        let entry = self.region.entry(slot);
        // SAFETY: names are only written under the registry lock
        let names = unsafe { &*entry.names.get() };
        (
            crate::schema::read_fixed_str(&names.type_name),
            crate::schema::read_fixed_str(&names.id),
        )
    }

    /// True if `slot` carries exactly these names
    pub fn entry_is(&self, slot: u32, type_name: &str, id: &str) -> bool {
        let entry = self.region.entry(slot);
        // SAFETY: names are only written under the registry lock
        let names = unsafe { &*entry.names.get() };
        fixed_str_eq(&names.type_name, type_name) && fixed_str_eq(&names.id, id)
    }

    /// Store the names of a slot being claimed
    pub fn set_entry_names(&mut self, slot: u32, type_name: &str, id: &str) {
        let entry = self.region.entry(slot);
        // SAFETY: names are only written under the registry lock
        let names = unsafe { &mut *entry.names.get() };
        crate::schema::write_fixed_str(&mut names.type_name, type_name);
        crate::schema::write_fixed_str(&mut names.id, id);
    }
}

fn fixed_str_eq(buf: &[u8], value: &str) -> bool {
    let len = value.len();
    len < buf.len() && &buf[..len] == value.as_bytes() && buf[len] == 0
}

impl Drop for RegionGuard<'_> {
    fn drop(&mut self) {
        self.region.header().lock.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SIZE: usize = 1 << 20;

    #[test]
    fn test_layout_orders_tables() {
        let layout = RegionLayout::compute(1 << 20, 16, 64).unwrap();
        assert!(layout.directory_offset >= size_of::<RegionHeader>());
        assert!(layout.chunks_offset >= layout.directory_offset + 16 * size_of::<DirectoryEntry>());
        assert!(layout.heap_offset >= layout.chunks_offset + 64 * size_of::<ChunkRecord>());
        assert_eq!(layout.heap_offset % CACHE_LINE_SIZE, 0);
        assert!(layout.heap_offset + layout.heap_size <= 1 << 20);
    }

    #[test]
    fn test_layout_without_heap_rejected() {
        let result = RegionLayout::compute(4096, 256, 1024);
        assert!(matches!(result, Err(BbError::OutOfMemory { .. })));
    }

    #[test]
    fn test_local_region_formats_heap() {
        let region = Region::create(&BlackBoardConfig::local(TEST_SIZE)).unwrap();
        assert!(region.is_alive());
        let mut guard = region.lock().unwrap();
        let stats = guard.chunks().stats();
        assert_eq!(stats.free_bytes, region.layout().heap_size as u64);
        assert_eq!(stats.used_chunks, 0);
    }

    #[test]
    fn test_lock_released_on_drop() {
        let region = Region::create(&BlackBoardConfig::local(TEST_SIZE)).unwrap();
        {
            let _guard = region.lock().unwrap();
            assert_eq!(region.header().lock.load(Ordering::Relaxed), get_current_pid());
        }
        assert_eq!(region.header().lock.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_dead_holder_is_stolen() {
        let region = Region::create(&BlackBoardConfig::local(TEST_SIZE)).unwrap();
        // Highest pid Linux hands out is below this
        region.header().lock.store(u32::MAX >> 1, Ordering::Relaxed);
        let guard = region.lock().unwrap();
        assert_eq!(region.header().lock.load(Ordering::Relaxed), get_current_pid());
        drop(guard);
    }

    #[test]
    fn test_entry_names_round_trip() {
        let region = Region::create(&BlackBoardConfig::local(TEST_SIZE)).unwrap();
        let mut guard = region.lock().unwrap();
        guard.set_entry_names(3, "MotorInterface", "Motor Brutus");
        assert_eq!(
            guard.entry_names(3),
            ("MotorInterface".to_string(), "Motor Brutus".to_string())
        );
        assert!(guard.entry_is(3, "MotorInterface", "Motor Brutus"));
        assert!(!guard.entry_is(3, "MotorInterface", "Motor"));
        assert!(!guard.entry_is(3, "Motor", "Motor Brutus"));
    }

    #[test]
    fn test_named_region_attach_and_teardown() {
        let name = format!("region_test_{}", get_current_pid());
        let master = Region::create(&BlackBoardConfig::master(&name)).unwrap();
        let slave = Region::attach(&name).unwrap();
        assert_eq!(slave.layout(), master.layout());
        assert!(slave.is_alive());

        drop(master);
        assert!(!slave.is_alive());
        assert!(Region::attach(&name).is_err());
    }
}
