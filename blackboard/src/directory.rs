//! Interface directory: `(type, id)` to block, under the registry lock

use crate::error::{BbError, BbResult};
use crate::glob::glob_match;
use crate::region::{BLOCK_HEADER_SIZE, RegionGuard, SLOT_FREE, SLOT_LIVE};
use crate::schema::Schema;
use crate::uid::InterfaceUid;
use serde::Serialize;
use std::sync::atomic::Ordering;
use tracing::{debug, trace};

/// Generation-checked reference to a directory slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockHandle {
    /// Directory slot
    pub slot: u32,
    /// Slot generation when the handle was issued
    pub generation: u32,
}

/// Snapshot of one directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    /// Interface type name
    pub type_name: String,
    /// Instance identifier
    pub id: String,
    /// Schema hash, hex
    pub hash: String,
    /// Payload size
    pub data_size: u64,
    /// Open reading accessors
    pub reader_count: u32,
    /// Writing accessor present
    pub has_writer: bool,
    /// Process of the writer, 0 if none
    pub writer_pid: u32,
    /// Serial of the writer, 0 if none
    pub writer_serial: u32,
    /// Completed writes
    pub revision: u64,
    /// Wall clock of the last write, ns
    pub timestamp_ns: u64,
}

/// Slot holding `uid`, if any
pub fn find(guard: &RegionGuard<'_>, uid: &InterfaceUid) -> Option<u32> {
    let region = guard.region();
    (0..region.layout().max_interfaces).find(|&slot| {
        region.entry(slot).state.load(Ordering::Acquire) == SLOT_LIVE
            && guard.entry_is(slot, uid.type_name(), uid.id())
    })
}

/// Allocate and zero a block for `uid` and claim a free slot for it
pub fn create(guard: &mut RegionGuard<'_>, uid: &InterfaceUid, schema: &Schema) -> BbResult<u32> {
    let region = guard.region();
    let capacity = region.layout().max_interfaces;
    let slot = (0..capacity)
        .find(|&slot| region.entry(slot).state.load(Ordering::Acquire) == SLOT_FREE)
        .ok_or(BbError::DirectoryFull { capacity })?;

    let block_size = BLOCK_HEADER_SIZE + schema.data_size;
    let offset = guard.chunks().alloc(block_size)?;

    // SAFETY: the allocator only hands out chunks inside the heap, and the
    // payload pointer of a block is one header past its start
    unsafe {
        let start = region.payload_ptr(offset).sub(BLOCK_HEADER_SIZE);
        std::ptr::write_bytes(start, 0, block_size);
    }

    let entry = region.entry(slot);
    entry.reader_count.store(0, Ordering::Relaxed);
    entry.has_writer.store(0, Ordering::Relaxed);
    entry.writer_pid.store(0, Ordering::Relaxed);
    entry.writer_serial.store(0, Ordering::Relaxed);
    entry.hash.store(schema.hash(), Ordering::Relaxed);
    entry.block_offset.store(offset, Ordering::Relaxed);
    entry.block_size.store(block_size as u64, Ordering::Relaxed);
    entry.data_size.store(schema.data_size as u64, Ordering::Relaxed);
    guard.set_entry_names(slot, uid.type_name(), uid.id());
    entry.state.store(SLOT_LIVE, Ordering::Release);

    debug!(interface = %uid, slot, offset, size = block_size, "Interface block allocated");
    Ok(slot)
}

/// Reclaim the block of `slot` and free the slot; outstanding handles
/// become stale
pub fn release(guard: &mut RegionGuard<'_>, slot: u32) -> BbResult<()> {
    let region = guard.region();
    let entry = region.entry(slot);
    let offset = entry.block_offset.load(Ordering::Relaxed);

    entry.state.store(SLOT_FREE, Ordering::Release);
    entry.generation.fetch_add(1, Ordering::AcqRel);
    entry.hash.store(0, Ordering::Relaxed);
    guard.chunks().free(offset)?;

    trace!(slot, offset, "Interface block reclaimed");
    Ok(())
}

/// Describe a live slot
pub fn info(guard: &RegionGuard<'_>, slot: u32) -> InterfaceInfo {
    let region = guard.region();
    let entry = region.entry(slot);
    let (type_name, id) = guard.entry_names(slot);
    let offset = entry.block_offset.load(Ordering::Relaxed);
    let size = entry.block_size.load(Ordering::Relaxed);

    let (revision, timestamp_ns) = if region.block_in_bounds(offset, size) {
        // SAFETY: bounds checked above
        let block = unsafe { region.block_header(offset) };
        (
            block.revision.load(Ordering::Acquire),
            block.timestamp_ns.load(Ordering::Acquire),
        )
    } else {
        (0, 0)
    };

    InterfaceInfo {
        type_name,
        id,
        hash: format!("{:016x}", entry.hash.load(Ordering::Relaxed)),
        data_size: entry.data_size.load(Ordering::Relaxed),
        reader_count: entry.reader_count.load(Ordering::Acquire),
        has_writer: entry.has_writer.load(Ordering::Acquire) != 0,
        writer_pid: entry.writer_pid.load(Ordering::Relaxed),
        writer_serial: entry.writer_serial.load(Ordering::Relaxed),
        revision,
        timestamp_ns,
    }
}

/// Live interfaces whose type and id match the glob patterns, sorted
pub fn list(guard: &RegionGuard<'_>, type_pattern: &str, id_pattern: &str) -> Vec<InterfaceInfo> {
    let region = guard.region();
    let mut infos: Vec<InterfaceInfo> = (0..region.layout().max_interfaces)
        .filter(|&slot| region.entry(slot).state.load(Ordering::Acquire) == SLOT_LIVE)
        .filter_map(|slot| {
            let (type_name, id) = guard.entry_names(slot);
            (glob_match(type_pattern, &type_name) && glob_match(id_pattern, &id))
                .then(|| info(guard, slot))
        })
        .collect();
    infos.sort_by(|a, b| (&a.type_name, &a.id).cmp(&(&b.type_name, &b.id)));
    infos
}

/// Number of live slots
pub fn live_count(guard: &RegionGuard<'_>) -> usize {
    let region = guard.region();
    (0..region.layout().max_interfaces)
        .filter(|&slot| region.entry(slot).state.load(Ordering::Acquire) == SLOT_LIVE)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlackBoardConfig;
    use crate::interfaces::{MotorInterface, SkillerInterface};
    use crate::region::Region;
    use crate::schema::InterfaceData;

    fn region() -> Region {
        let config = BlackBoardConfig {
            max_interfaces: 4,
            ..BlackBoardConfig::local(1 << 20)
        };
        Region::create(&config).unwrap()
    }

    fn uid(type_name: &str, id: &str) -> InterfaceUid {
        InterfaceUid::new(type_name, id).unwrap()
    }

    #[test]
    fn test_create_find_release() {
        let region = region();
        let mut guard = region.lock().unwrap();
        let motor = uid("MotorInterface", "Robotino");

        assert_eq!(find(&guard, &motor), None);
        let slot = create(&mut guard, &motor, MotorInterface::schema()).unwrap();
        assert_eq!(find(&guard, &motor), Some(slot));

        let generation = region.entry(slot).generation.load(Ordering::Relaxed);
        release(&mut guard, slot).unwrap();
        assert_eq!(find(&guard, &motor), None);
        assert_eq!(
            region.entry(slot).generation.load(Ordering::Relaxed),
            generation + 1
        );
        assert_eq!(guard.chunks().stats().used_chunks, 0);
    }

    #[test]
    fn test_directory_full() {
        let region = region();
        let mut guard = region.lock().unwrap();
        for i in 0..4 {
            create(&mut guard, &uid("MotorInterface", &format!("m{i}")), MotorInterface::schema())
                .unwrap();
        }
        let err = create(&mut guard, &uid("MotorInterface", "m4"), MotorInterface::schema())
            .unwrap_err();
        assert!(matches!(err, BbError::DirectoryFull { capacity: 4 }));
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let region = region();
        let mut guard = region.lock().unwrap();
        create(&mut guard, &uid("SkillerInterface", "Skiller"), SkillerInterface::schema()).unwrap();
        create(&mut guard, &uid("MotorInterface", "Right"), MotorInterface::schema()).unwrap();
        create(&mut guard, &uid("MotorInterface", "Left"), MotorInterface::schema()).unwrap();

        let all = list(&guard, "*", "*");
        let names: Vec<(&str, &str)> = all
            .iter()
            .map(|i| (i.type_name.as_str(), i.id.as_str()))
            .collect();
        assert_eq!(
            names,
            [
                ("MotorInterface", "Left"),
                ("MotorInterface", "Right"),
                ("SkillerInterface", "Skiller")
            ]
        );

        assert_eq!(list(&guard, "Motor*", "R*").len(), 1);
        assert!(list(&guard, "Laser*", "*").is_empty());
        assert_eq!(live_count(&guard), 3);
        assert_eq!(all[0].data_size, 116);
        assert!(!all[0].has_writer);
    }
}
