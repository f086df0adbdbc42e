//! Workload launching: spawn under the supervisor or replace it
//!
//! `exec_replace` uses execvp(3) directly, the same way a shell's `exec`
//! builtin does, so the caller's command inherits PID 1.

use crate::error::{Error, Result};
use crate::identity::join_argv;
use nix::unistd::{execvp, Pid};
use std::convert::Infallible;
use std::ffi::CString;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

/// Reject commands that cannot possibly be executed
pub fn validate_command(command: &[String]) -> Result<()> {
    match command.first() {
        None => Err(Error::MalformedCommand("empty command".to_string())),
        Some(program) if program.is_empty() => {
            Err(Error::MalformedCommand("empty program name".to_string()))
        }
        Some(_) => match command.iter().find(|arg| arg.contains('\0')) {
            Some(arg) => Err(Error::MalformedCommand(format!(
                "argument contains NUL byte: {:?}",
                arg
            ))),
            None => Ok(()),
        },
    }
}

/// Replace the current process image with `command`
///
/// Only returns on failure.
pub fn exec_replace(command: &[String]) -> Result<Infallible> {
    validate_command(command)?;

    let args = command
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::MalformedCommand(e.to_string()))?;

    execvp(&args[0], &args).map_err(|source| Error::ExecFailed {
        command: join_argv(command),
        source,
    })
}

/// Spawn `command` as a child of the supervisor
///
/// The child leads its own process group so a terminal interrupt reaches only
/// the supervisor, which forwards it exactly once.
pub fn spawn(command: &[String]) -> Result<Pid> {
    validate_command(command)?;

    let child = Command::new(&command[0])
        .args(&command[1..])
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .process_group(0)
        .spawn()
        .map_err(|source| Error::SpawnFailed {
            command: join_argv(command),
            source,
        })?;

    // The std handle is dropped here; the warden reaps the child via waitpid.
    Ok(Pid::from_raw(child.id() as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::{waitpid, WaitStatus};

    fn cmd(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(matches!(validate_command(&[]), Err(Error::MalformedCommand(_))));
        assert!(validate_command(&cmd(&[""])).is_err());
    }

    #[test]
    fn test_validate_rejects_nul() {
        assert!(validate_command(&cmd(&["echo", "a\0b"])).is_err());
    }

    #[test]
    fn test_validate_accepts_command() {
        validate_command(&cmd(&["python", "-m", "lerobot"])).unwrap();
    }

    #[test]
    fn test_exec_missing_program_fails_with_127() {
        let err = exec_replace(&cmd(&["/nonexistent/robot-workload"])).unwrap_err();
        assert!(matches!(err, Error::ExecFailed { .. }));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn test_spawn_missing_program() {
        let err = spawn(&cmd(&["/nonexistent/robot-workload"])).unwrap_err();
        assert!(matches!(err, Error::SpawnFailed { .. }));
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn test_spawned_child_is_reaped_by_pid() {
        let pid = spawn(&cmd(&["sh", "-c", "exit 4"])).unwrap();
        match waitpid(pid, None).unwrap() {
            WaitStatus::Exited(p, code) => {
                assert_eq!(p, pid);
                assert_eq!(code, 4);
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }
}
