//! Runtime preconditions: interpreter lookup and module smoke tests

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Result of a bounded command run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub timed_out: bool,
    /// stdout followed by stderr
    pub output: String,
}

/// Access to the container's runtime environment
pub trait Runtime {
    /// Resolve `program` the way execvp(3) would
    fn resolve(&self, program: &str) -> Option<PathBuf>;

    /// Run `program` to completion or until `timeout`, whichever is first
    fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<CommandOutcome>;
}

/// The real environment: `PATH` and child processes
#[derive(Debug, Default)]
pub struct HostRuntime;

impl Runtime for HostRuntime {
    fn resolve(&self, program: &str) -> Option<PathBuf> {
        resolve_on_path(program, std::env::var_os("PATH"))
    }

    fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<CommandOutcome> {
        run_with_timeout(program, args, timeout)
    }
}

/// Python source that imports every module, one statement each
pub fn import_script(modules: &[String]) -> String {
    if modules.is_empty() {
        return "pass".to_string();
    }
    modules
        .iter()
        .map(|m| format!("import {}", m))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Look `program` up in `path_var`; names containing `/` are checked as-is
pub fn resolve_on_path(program: &str, path_var: Option<OsString>) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return is_executable(&path).then_some(path);
    }

    let path_var = path_var?;
    std::env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Run a command with timeout enforcement, killing it when the budget runs out
///
/// Both pipes are drained on reader threads while the child runs, so a noisy
/// child cannot stall on a full pipe. Output still held open by a grandchild
/// is waited for only until the deadline.
pub fn run_with_timeout(program: &Path, args: &[String], timeout: Duration) -> Result<CommandOutcome> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::HealthCheckFailed {
            check: program.display().to_string(),
            message: e.to_string(),
        })?;

    let start = Instant::now();
    let deadline = start + timeout;

    let (tx, rx) = mpsc::channel();
    drain(child.stdout.take(), 0, &tx);
    drain(child.stderr.take(), 1, &tx);
    drop(tx);

    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                return Ok(CommandOutcome {
                    success: status.success(),
                    timed_out: false,
                    output: collect_output(&rx, deadline),
                });
            }
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait(); // Reap the zombie
                    return Ok(CommandOutcome {
                        success: false,
                        timed_out: true,
                        output: format!("timed out after {}ms", timeout.as_millis()),
                    });
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::HealthCheckFailed {
                    check: program.display().to_string(),
                    message: format!("Failed to wait for process: {}", e),
                });
            }
        }
    }
}

/// Read `pipe` to EOF on its own thread and send the text tagged with `slot`
fn drain<R: Read + Send + 'static>(pipe: Option<R>, slot: usize, tx: &mpsc::Sender<(usize, String)>) {
    let Some(mut pipe) = pipe else {
        return;
    };
    let tx = tx.clone();
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send((slot, String::from_utf8_lossy(&buf).into_owned()));
    });
}

/// stdout then stderr, whatever arrived before `deadline`
fn collect_output(rx: &mpsc::Receiver<(usize, String)>, deadline: Instant) -> String {
    let mut parts = [String::new(), String::new()];
    // A child that exits right at the deadline still gets its output read
    let deadline = deadline.max(Instant::now() + Duration::from_millis(100));

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok((slot, text)) => parts[slot] = text,
            Err(_) => break,
        }
    }

    let [stdout, stderr] = parts;
    stdout + &stderr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_import_script() {
        assert_eq!(
            import_script(&args(&["lerobot", "zmq", "cv2"])),
            "import lerobot; import zmq; import cv2"
        );
        assert_eq!(import_script(&[]), "pass");
    }

    #[test]
    fn test_resolve_finds_sh() {
        let found = resolve_on_path("sh", std::env::var_os("PATH")).unwrap();
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn test_resolve_missing() {
        assert!(resolve_on_path("robot-no-such-interpreter", std::env::var_os("PATH")).is_none());
        assert!(resolve_on_path("sh", None).is_none());
    }

    #[test]
    fn test_resolve_skips_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("python");
        std::fs::write(&file, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o644)).unwrap();

        let path_var = Some(dir.path().as_os_str().to_owned());
        assert!(resolve_on_path("python", path_var.clone()).is_none());

        std::fs::set_permissions(&file, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(resolve_on_path("python", path_var), Some(file));
    }

    #[test]
    fn test_run_captures_output() {
        let sh = resolve_on_path("sh", std::env::var_os("PATH")).unwrap();
        let outcome = run_with_timeout(
            &sh,
            &args(&["-c", "echo ready; echo oops >&2; exit 2"]),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(!outcome.success);
        assert!(!outcome.timed_out);
        assert!(outcome.output.contains("ready"));
        assert!(outcome.output.contains("oops"));
    }

    #[test]
    fn test_run_drains_output_larger_than_pipe_buffer() {
        let sh = resolve_on_path("sh", std::env::var_os("PATH")).unwrap();
        let outcome = run_with_timeout(
            &sh,
            &args(&["-c", "head -c 200000 /dev/zero | tr '\\0' x >&2; exit 0"]),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(outcome.success);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.output.len(), 200000);
    }

    #[test]
    fn test_run_not_held_by_background_grandchild() {
        let sh = resolve_on_path("sh", std::env::var_os("PATH")).unwrap();
        let start = Instant::now();
        let outcome =
            run_with_timeout(&sh, &args(&["-c", "echo up; sleep 5 & exit 0"]), Duration::from_secs(1))
                .unwrap();

        assert!(outcome.success);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_run_times_out() {
        let sh = resolve_on_path("sh", std::env::var_os("PATH")).unwrap();
        let start = Instant::now();
        let outcome =
            run_with_timeout(&sh, &args(&["-c", "sleep 5"]), Duration::from_millis(200)).unwrap();

        assert!(outcome.timed_out);
        assert!(!outcome.success);
        assert!(start.elapsed() < Duration::from_secs(3));
    }
}
