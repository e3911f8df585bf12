//! Linux-specific shared memory operations

use crate::error::{BbError, BbResult};
use bb_common::consts::{REGION_PREFIX, SHM_DIR};
use memmap2::{MmapMut, MmapOptions};
use nix::unistd::getpid;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Path of the backing file for a named region
pub fn region_path(name: &str) -> PathBuf {
    PathBuf::from(format!("{SHM_DIR}/{REGION_PREFIX}{name}"))
}

/// Create the backing file for a named region and map it.
///
/// The file must not exist yet; stale files are cleaned up by the caller
/// before retrying.
pub fn create_region_mmap(name: &str, size: usize) -> BbResult<MmapMut> {
    let path = region_path(name);
    let file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .mode(0o600) // Owner read/write only
        .open(&path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                BbError::AlreadyExists {
                    name: name.to_string(),
                }
            } else {
                BbError::Io { source: e }
            }
        })?;

    file.set_len(size as u64)?;

    // Fault the pages in now, not on the first write in a control loop
    let mmap = unsafe { MmapOptions::new().populate().map_mut(&file)? };
    Ok(mmap)
}

/// Map an existing named region
pub fn attach_region_mmap(name: &str) -> BbResult<MmapMut> {
    let path = region_path(name);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&path)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BbError::AlivenessLost {
                    reason: format!("region {name} not found"),
                }
            } else {
                BbError::Io { source: e }
            }
        })?;

    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// Map zero-filled anonymous memory for a process-local arena
pub fn create_anon_mmap(size: usize) -> BbResult<MmapMut> {
    Ok(MmapOptions::new().len(size).map_anon()?)
}

/// Unlink the backing file of a named region; missing files are ignored
pub fn remove_region_file(name: &str) -> BbResult<()> {
    match std::fs::remove_file(region_path(name)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BbError::Io { source: e }),
    }
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    #[cfg(target_os = "linux")]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(_) => true,
            Err(nix::Error::ESRCH) => false,
            Err(nix::Error::EPERM) => true, // Exists, not ours to signal
            Err(_) => false,
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}

/// Wall clock in nanoseconds since the Unix epoch
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Name of the calling thread, or its id when unnamed
pub fn current_thread_name() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}
