//! Discovery of named regions under the shared memory directory

use crate::error::BbResult;
use crate::lifecycle::probe_region;
use crate::platform::is_process_alive;
use bb_common::consts::{REGION_PREFIX, SHM_DIR};
use serde::Serialize;

/// A named region found on this machine
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    /// Region name without prefix
    pub name: String,
    /// Mapped size in bytes
    pub size: u64,
    /// Creating process
    pub master_pid: u32,
    /// Magic and layout version recognised
    pub valid: bool,
    /// Alive flag set by the master
    pub published: bool,
    /// Master process still running
    pub master_alive: bool,
}

/// Names of every region file, without prefix, sorted
pub fn region_names() -> BbResult<Vec<String>> {
    let dir = std::path::Path::new(SHM_DIR);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|file| file.strip_prefix(REGION_PREFIX).map(str::to_string))
        .filter(|name| !name.is_empty())
        .collect();
    names.sort();
    Ok(names)
}

/// Describe every region on this machine; unreadable files are skipped
pub fn list_regions() -> BbResult<Vec<RegionInfo>> {
    let mut regions = Vec::new();
    for name in region_names()? {
        if let Ok(Some(probe)) = probe_region(&name) {
            regions.push(RegionInfo {
                master_alive: probe.valid && is_process_alive(probe.master_pid),
                size: probe.size,
                master_pid: probe.master_pid,
                valid: probe.valid,
                published: probe.published,
                name,
            });
        }
    }
    Ok(regions)
}

/// Describe one region by name
pub fn find_region(name: &str) -> BbResult<Option<RegionInfo>> {
    Ok(list_regions()?.into_iter().find(|r| r.name == name))
}
