use camino::Utf8Path;
use sysinfo::{Disks, Pid, System};
use thiserror::Error;

/// A running process as listed by the OS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

/// Errors from OS-level operations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SystemError {
    #[error("Process {0} not found")]
    ProcessNotFound(u32),

    #[error("Failed to terminate process {0}")]
    TerminateFailed(u32),
}

/// OS capabilities the converter depends on
#[cfg_attr(test, mockall::automock)]
pub trait HostSystem {
    /// Running processes, in enumeration order
    fn processes(&mut self) -> Vec<ProcessEntry>;

    fn terminate(&mut self, pid: u32) -> Result<(), SystemError>;

    /// Free bytes on the volume holding `path`, if it can be determined
    fn available_space(&mut self, path: &Utf8Path) -> Option<u64>;
}

/// [`HostSystem`] backed by `sysinfo`
pub struct SysinfoSystem {
    system: System,
}

impl SysinfoSystem {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl HostSystem for SysinfoSystem {
    /// Sorted by pid so repeated runs see the same order
    fn processes(&mut self) -> Vec<ProcessEntry> {
        self.system.refresh_processes();

        let mut entries: Vec<ProcessEntry> = self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| ProcessEntry {
                pid: pid.as_u32(),
                name: process.name().to_string(),
            })
            .collect();
        entries.sort_by_key(|entry| entry.pid);
        entries
    }

    fn terminate(&mut self, pid: u32) -> Result<(), SystemError> {
        self.system.refresh_process(Pid::from_u32(pid));
        let process = self
            .system
            .process(Pid::from_u32(pid))
            .ok_or(SystemError::ProcessNotFound(pid))?;

        if process.kill() {
            Ok(())
        } else {
            Err(SystemError::TerminateFailed(pid))
        }
    }

    fn available_space(&mut self, path: &Utf8Path) -> Option<u64> {
        let path = path.as_std_path();
        let disks = Disks::new_with_refreshed_list();

        disks
            .list()
            .iter()
            .filter(|disk| path.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

/// Outcome of an orphaned-instance sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Processes whose name matched
    pub matched: usize,
    /// Pids terminated
    pub terminated: Vec<u32>,
    /// Pids that could not be terminated
    pub failed: Vec<u32>,
}

/// Terminate host application instances beyond `max_processes`.
///
/// Matches process names containing `name_fragment` (case-insensitive). When more
/// than `max_processes` match, every match listed after the first
/// `max_processes` is terminated. Failures are logged and never propagated.
pub fn cleanup_orphaned_processes<S: HostSystem + ?Sized>(
    system: &mut S,
    name_fragment: &str,
    max_processes: usize,
) -> CleanupReport {
    let fragment = name_fragment.to_lowercase();
    let matching: Vec<ProcessEntry> = system
        .processes()
        .into_iter()
        .filter(|p| !p.name.is_empty() && p.name.to_lowercase().contains(&fragment))
        .collect();

    let mut report = CleanupReport {
        matched: matching.len(),
        ..CleanupReport::default()
    };

    if matching.len() <= max_processes {
        tracing::debug!(
            "{} '{}' processes running (limit {})",
            matching.len(),
            name_fragment,
            max_processes
        );
        return report;
    }

    tracing::warn!(
        "Too many '{}' processes ({}), cleaning up...",
        name_fragment,
        matching.len()
    );

    for process in &matching[max_processes..] {
        match system.terminate(process.pid) {
            Ok(()) => {
                tracing::info!("Process {} ({}) terminated", process.pid, process.name);
                report.terminated.push(process.pid);
            }
            Err(e) => {
                tracing::warn!("Could not terminate {}: {}", process.name, e);
                report.failed.push(process.pid);
            }
        }
    }

    report
}
