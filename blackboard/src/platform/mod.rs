//! Platform layer: region mapping and process probes

pub mod linux;

pub use linux::{
    attach_region_mmap, create_anon_mmap, create_region_mmap, current_thread_name,
    get_current_pid, is_process_alive, now_nanos, region_path, remove_region_file,
};
