//! Process and host metrics for the detailed health report

use serde::Serialize;
use std::path::Path;
use sysinfo::{Disks, ProcessesToUpdate, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Metrics for the sidecar's own process
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub memory_usage_mb: f64,
    pub cpu_percent: f32,
    /// Only reported where the OS exposes per-process threads
    pub num_threads: Option<usize>,
    pub status: String,
}

/// Host-wide metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub cpu_count: usize,
    pub memory_total_gb: f64,
    pub memory_available_gb: f64,
    /// Usage of the root filesystem, when it can be found
    pub disk_usage_percent: Option<f64>,
    pub platform: String,
}

/// Snapshot the current process
pub fn process_info() -> ProcessInfo {
    let pid = std::process::id();
    let mut sys = System::new();
    let sys_pid = sysinfo::Pid::from_u32(pid);
    sys.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]));

    match sys.process(sys_pid) {
        Some(process) => ProcessInfo {
            pid,
            memory_usage_mb: process.memory() as f64 / BYTES_PER_MB,
            cpu_percent: process.cpu_usage(),
            num_threads: process.tasks().map(|tasks| tasks.len()),
            status: process.status().to_string().to_lowercase(),
        },
        None => ProcessInfo {
            pid,
            memory_usage_mb: 0.0,
            cpu_percent: 0.0,
            num_threads: None,
            status: "unknown".to_string(),
        },
    }
}

/// Snapshot the host
pub fn system_info() -> SystemInfo {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_all();

    let disks = Disks::new_with_refreshed_list();
    let disk_usage_percent = disks
        .list()
        .iter()
        .find(|disk| disk.mount_point() == Path::new("/"))
        .or_else(|| disks.list().first())
        .and_then(|disk| usage_percent(disk.total_space(), disk.available_space()));

    SystemInfo {
        cpu_count: sys.cpus().len(),
        memory_total_gb: sys.total_memory() as f64 / BYTES_PER_GB,
        memory_available_gb: sys.available_memory() as f64 / BYTES_PER_GB,
        disk_usage_percent,
        platform: std::env::consts::OS.to_string(),
    }
}

fn usage_percent(total: u64, available: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(available) as f64;
    Some((used / total as f64 * 1000.0).round() / 10.0)
}
