//! Process lookup by PID

use serde::Serialize;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Name, command line and status of a live process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessDetails {
    pub name: String,
    pub command_line: Vec<String>,
    pub status: String,
}

/// Capability to describe a process by PID
///
/// Returns `None` when the process has exited or cannot be inspected.
pub trait ProcessInspector: Send + Sync {
    fn inspect(&self, pid: i32) -> Option<ProcessDetails>;
}

/// Inspector backed by sysinfo
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoInspector;

impl ProcessInspector for SysinfoInspector {
    fn inspect(&self, pid: i32) -> Option<ProcessDetails> {
        let pid = Pid::from_u32(u32::try_from(pid).ok()?);
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        sys.process(pid).map(|process| ProcessDetails {
            name: process.name().to_string_lossy().into_owned(),
            command_line: process
                .cmd()
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            status: process.status().to_string().to_lowercase(),
        })
    }
}
