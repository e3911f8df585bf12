//! Stale region detection and cleanup
//!
//! A master that dies without unmapping leaves its backing file behind.
//! Before a new master creates a region of the same name it probes the old
//! header and removes the file if nobody owns it any more.

use crate::discovery::region_names;
use crate::error::{BbError, BbResult};
use crate::platform::{attach_region_mmap, is_process_alive, remove_region_file};
use crate::region::{LAYOUT_VERSION, REGION_MAGIC, RegionHeader};
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// Header facts read from a region file without attaching to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionProbe {
    /// Size of the backing file
    pub size: u64,
    /// Magic and layout version match this build
    pub valid: bool,
    /// Alive flag as published by the master
    pub published: bool,
    /// Creating process
    pub master_pid: u32,
    /// Creation stamp
    pub epoch: u64,
}

impl RegionProbe {
    /// Valid, published and the master process still runs
    pub fn is_owned(&self) -> bool {
        self.valid && self.published && is_process_alive(self.master_pid)
    }
}

/// Read the header of region `name`; `None` if it does not exist
pub fn probe_region(name: &str) -> BbResult<Option<RegionProbe>> {
    let mmap = match attach_region_mmap(name) {
        Ok(mmap) => mmap,
        Err(BbError::AlivenessLost { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    let size = mmap.len() as u64;
    if mmap.len() < size_of::<RegionHeader>() {
        return Ok(Some(RegionProbe {
            size,
            valid: false,
            published: false,
            master_pid: 0,
            epoch: 0,
        }));
    }

    // SAFETY: length checked; the mapping is page aligned
    let header = unsafe { &*(mmap.as_ptr() as *const RegionHeader) };
    Ok(Some(RegionProbe {
        size,
        valid: header.magic == REGION_MAGIC && header.layout_version == LAYOUT_VERSION,
        published: header.alive.load(Ordering::Acquire) == 1,
        master_pid: header.master_pid,
        epoch: header.epoch,
    }))
}

/// Remove the backing file of `name` unless a live master owns it.
///
/// # Errors
///
/// `AlreadyExists` if the region is owned by a running master.
pub fn reclaim_stale_region(name: &str) -> BbResult<()> {
    let Some(probe) = probe_region(name)? else {
        return Ok(());
    };
    if probe.is_owned() {
        return Err(BbError::AlreadyExists {
            name: name.to_string(),
        });
    }
    warn!(
        region = name,
        master_pid = probe.master_pid,
        valid = probe.valid,
        published = probe.published,
        "Removing stale region left by a dead master"
    );
    remove_region_file(name)
}

/// Remove every region under the shared memory directory whose master is
/// gone; returns the names removed
pub fn cleanup_orphaned_regions() -> BbResult<Vec<String>> {
    let mut removed = Vec::new();
    for name in region_names()? {
        match probe_region(&name) {
            Ok(Some(probe)) if !probe.is_owned() => {
                remove_region_file(&name)?;
                warn!(region = %name, master_pid = probe.master_pid, "Orphaned region removed");
                removed.push(name);
            }
            Ok(_) => {}
            Err(e) => debug!(region = %name, error = %e, "Region probe failed"),
        }
    }
    Ok(removed)
}
