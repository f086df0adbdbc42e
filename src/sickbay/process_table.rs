//! Process table snapshots and workload search
//!
//! The search mirrors `pgrep -f`: a literal pattern against the full command
//! line, minus the searcher itself and generic wrapper processes.

use crate::identity::{join_argv, WorkloadPattern};
use std::path::Path;
use sysinfo::{ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System, UpdateKind};

/// One row of the process table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent: Option<u32>,
    pub argv: Vec<String>,
}

impl ProcessEntry {
    pub fn cmdline(&self) -> String {
        join_argv(&self.argv)
    }

    /// Basename of argv[0]
    pub fn program(&self) -> Option<&str> {
        self.argv
            .first()
            .and_then(|a| Path::new(a).file_name())
            .and_then(|n| n.to_str())
    }
}

/// Read access to the process table
pub trait ProcessTable {
    fn snapshot(&self) -> Vec<ProcessEntry>;
}

/// The host's process table via sysinfo
#[derive(Debug, Default)]
pub struct SystemTable;

impl ProcessTable for SystemTable {
    fn snapshot(&self) -> Vec<ProcessEntry> {
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(UpdateKind::Always),
        );

        system
            .processes()
            .iter()
            // Threads show up as processes on Linux; zombies are not running
            .filter(|(_, p)| p.thread_kind().is_none())
            .filter(|(_, p)| !matches!(p.status(), ProcessStatus::Zombie))
            .filter(|(_, p)| !p.cmd().is_empty())
            .map(|(pid, p)| ProcessEntry {
                pid: pid.as_u32(),
                parent: p.parent().map(|pp| pp.as_u32()),
                argv: p
                    .cmd()
                    .iter()
                    .map(|a| a.to_string_lossy().into_owned())
                    .collect(),
            })
            .collect()
    }
}

/// Find processes whose command line contains `pattern`
///
/// Skips every pid in `exclude` and every process whose argv[0] basename is
/// one of `wrappers`.
pub fn find_workload<'a>(
    entries: &'a [ProcessEntry],
    pattern: &WorkloadPattern,
    wrappers: &[String],
    exclude: &[u32],
) -> Vec<&'a ProcessEntry> {
    entries
        .iter()
        .filter(|e| !exclude.contains(&e.pid))
        .filter(|e| {
            e.program()
                .is_none_or(|prog| !wrappers.iter().any(|w| w == prog))
        })
        .filter(|e| pattern.is_match(&e.cmdline()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: &str = "lerobot.robots.lekiwi.lekiwi_host";

    fn entry(pid: u32, parent: u32, argv: &[&str]) -> ProcessEntry {
        ProcessEntry {
            pid,
            parent: Some(parent),
            argv: argv.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn wrappers() -> Vec<String> {
        vec!["robot-run".into(), "robot-health".into(), "sh".into(), "pgrep".into()]
    }

    /// Container launched with the default command, probe running
    fn default_container() -> Vec<ProcessEntry> {
        let probe_shell = format!("robot-health --pattern {}", PATTERN);
        vec![
            entry(1, 0, &["robot-run"]),
            entry(7, 1, &["python", "-m", PATTERN]),
            entry(40, 0, &["sh", "-c", probe_shell.as_str()]),
            entry(41, 40, &["/usr/local/bin/robot-health", "--pattern", PATTERN]),
        ]
    }

    #[test]
    fn test_finds_exactly_the_workload() {
        let entries = default_container();
        let found = find_workload(&entries, &WorkloadPattern::new(PATTERN), &wrappers(), &[41, 40]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pid, 7);
    }

    #[test]
    fn test_wrappers_excluded_without_pid_exclusion() {
        let entries = default_container();
        let found = find_workload(&entries, &WorkloadPattern::new(PATTERN), &wrappers(), &[]);
        assert_eq!(found.iter().map(|e| e.pid).collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn test_self_excluded_by_pid() {
        let entries = vec![entry(99, 1, &["custom-probe", PATTERN])];
        let pattern = WorkloadPattern::new(PATTERN);
        assert!(find_workload(&entries, &pattern, &wrappers(), &[99]).is_empty());
        assert_eq!(find_workload(&entries, &pattern, &wrappers(), &[]).len(), 1);
    }

    #[test]
    fn test_absent_workload() {
        let entries = vec![entry(1, 0, &["robot-run"]), entry(8, 1, &["sleep", "30"])];
        let found = find_workload(&entries, &WorkloadPattern::new(PATTERN), &wrappers(), &[]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_program_basename() {
        let e = entry(2, 1, &["/usr/bin/python3", "-m", "x"]);
        assert_eq!(e.program(), Some("python3"));
        assert_eq!(e.cmdline(), "/usr/bin/python3 -m x");
    }

    #[test]
    fn test_system_table_sees_own_process() {
        let me = std::process::id();
        let entries = SystemTable.snapshot();
        assert!(entries.iter().any(|e| e.pid == me));
    }
}
