//! Launch routing for the supervisor's argument vector
//!
//! Decides whether an explicit command runs under the wait loop (the
//! supervisor stays PID 1) or replaces the supervisor's process image.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

/// How explicit commands are routed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RoutePolicy {
    /// Flags and the wrapper name run the workload; anything else is exec'd
    #[default]
    Auto,
    /// Every explicit command is exec'd verbatim
    AlwaysExec,
    /// Every explicit command runs under the wait loop
    AlwaysWrap,
}

impl FromStr for RoutePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(RoutePolicy::Auto),
            "always-exec" => Ok(RoutePolicy::AlwaysExec),
            "always-wrap" => Ok(RoutePolicy::AlwaysWrap),
            other => Err(format!("unknown routing policy '{}'", other)),
        }
    }
}

impl std::fmt::Display for RoutePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutePolicy::Auto => write!(f, "auto"),
            RoutePolicy::AlwaysExec => write!(f, "always-exec"),
            RoutePolicy::AlwaysWrap => write!(f, "always-wrap"),
        }
    }
}

/// What the supervisor does with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// Spawn `command` as a child and wait for it
    Supervise {
        command: Vec<String>,
        /// True when `command` is the configured workload (possibly with extra args)
        configured: bool,
    },
    /// Replace the supervisor with `command`
    Exec { command: Vec<String> },
}

/// Route the supervisor's arguments (argv without argv[0])
pub fn route(args: &[String], workload: &[String], wrapper_name: &str, policy: RoutePolicy) -> Launch {
    let Some(first) = args.first() else {
        return Launch::Supervise {
            command: workload.to_vec(),
            configured: true,
        };
    };

    if policy == RoutePolicy::AlwaysExec {
        return Launch::Exec {
            command: args.to_vec(),
        };
    }

    if first.starts_with('-') {
        return Launch::Supervise {
            command: workload.iter().chain(args).cloned().collect(),
            configured: true,
        };
    }

    if is_wrapper(first, wrapper_name) {
        return Launch::Supervise {
            command: workload.iter().chain(&args[1..]).cloned().collect(),
            configured: true,
        };
    }

    match policy {
        RoutePolicy::AlwaysWrap => Launch::Supervise {
            command: args.to_vec(),
            configured: false,
        },
        _ => Launch::Exec {
            command: args.to_vec(),
        },
    }
}

/// `robot-run` and `/usr/local/bin/robot-run` both name the wrapper
fn is_wrapper(arg: &str, wrapper_name: &str) -> bool {
    arg == wrapper_name
        || Path::new(arg)
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n == wrapper_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload() -> Vec<String> {
        vec!["python".into(), "-m".into(), "lerobot.robots.lekiwi.lekiwi_host".into()]
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_no_args_supervises_workload() {
        let launch = route(&[], &workload(), "robot-run", RoutePolicy::Auto);
        assert_eq!(
            launch,
            Launch::Supervise {
                command: workload(),
                configured: true
            }
        );
    }

    #[test]
    fn test_no_args_supervises_even_when_always_exec() {
        let launch = route(&[], &workload(), "robot-run", RoutePolicy::AlwaysExec);
        assert!(matches!(launch, Launch::Supervise { configured: true, .. }));
    }

    #[test]
    fn test_flags_are_appended_to_workload() {
        let launch = route(
            &args(&["--robot.id=fleet-robot-001"]),
            &workload(),
            "robot-run",
            RoutePolicy::Auto,
        );
        match launch {
            Launch::Supervise { command, configured } => {
                assert!(configured);
                assert_eq!(command.len(), 4);
                assert_eq!(command[3], "--robot.id=fleet-robot-001");
            }
            other => panic!("unexpected launch: {:?}", other),
        }
    }

    #[test]
    fn test_wrapper_name_runs_workload_with_rest() {
        let launch = route(
            &args(&["/usr/local/bin/robot-run", "--verbose"]),
            &workload(),
            "robot-run",
            RoutePolicy::Auto,
        );
        match launch {
            Launch::Supervise { command, .. } => {
                assert_eq!(command[0], "python");
                assert_eq!(command.last().map(String::as_str), Some("--verbose"));
            }
            other => panic!("unexpected launch: {:?}", other),
        }
    }

    #[test]
    fn test_other_command_is_execd() {
        let cmd = args(&["pgrep", "-f", "lerobot.robots.lekiwi.lekiwi_host"]);
        let launch = route(&cmd, &workload(), "robot-run", RoutePolicy::Auto);
        assert_eq!(launch, Launch::Exec { command: cmd });
    }

    #[test]
    fn test_wrapper_prefix_is_not_wrapper() {
        let cmd = args(&["robot-run-debug"]);
        let launch = route(&cmd, &workload(), "robot-run", RoutePolicy::Auto);
        assert!(matches!(launch, Launch::Exec { .. }));
    }

    #[test]
    fn test_always_exec_execs_flags_verbatim() {
        let cmd = args(&["--robot.id=x"]);
        let launch = route(&cmd, &workload(), "robot-run", RoutePolicy::AlwaysExec);
        assert_eq!(launch, Launch::Exec { command: cmd });
    }

    #[test]
    fn test_always_wrap_supervises_caller_command() {
        let cmd = args(&["whoami"]);
        let launch = route(&cmd, &workload(), "robot-run", RoutePolicy::AlwaysWrap);
        assert_eq!(
            launch,
            Launch::Supervise {
                command: cmd,
                configured: false
            }
        );
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("auto".parse::<RoutePolicy>(), Ok(RoutePolicy::Auto));
        assert_eq!("always-wrap".parse::<RoutePolicy>(), Ok(RoutePolicy::AlwaysWrap));
        assert!("sometimes".parse::<RoutePolicy>().is_err());
        assert_eq!(RoutePolicy::AlwaysExec.to_string(), "always-exec");
    }
}
