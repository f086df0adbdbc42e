//! Process identity registry
//!
//! Health probes find the workload by searching command lines for a pattern.
//! The registry records the command line of every role that can appear in the
//! container's process table and rejects a launch where the supervisor or the
//! probe would match that pattern, or where the workload would not.

use crate::error::{Error, Result};
use std::fmt;

/// Who owns a command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The PID-1 wrapper
    Supervisor,
    /// The long-running process the probe searches for
    Workload,
    /// The orchestrator's health probe invocation
    Probe,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Supervisor => write!(f, "supervisor"),
            Role::Workload => write!(f, "workload"),
            Role::Probe => write!(f, "probe"),
        }
    }
}

/// Command line as seen by `pgrep -f`: argv joined by single spaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub role: Role,
    pub cmdline: String,
}

impl ProcessIdentity {
    pub fn from_argv<S: AsRef<str>>(role: Role, argv: &[S]) -> Self {
        Self {
            role,
            cmdline: join_argv(argv),
        }
    }
}

/// Join argv the way `/proc/<pid>/cmdline` reads when NULs become spaces
pub fn join_argv<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|a| a.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Literal substring searched for in command lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadPattern(String);

impl WorkloadPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_match(&self, cmdline: &str) -> bool {
        cmdline.contains(&self.0)
    }
}

/// Identities registered at supervisor startup
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    pattern: Option<WorkloadPattern>,
    identities: Vec<ProcessIdentity>,
    /// Whether the workload must be findable by the pattern
    require_workload_match: bool,
}

impl IdentityRegistry {
    pub fn new(pattern: Option<WorkloadPattern>) -> Self {
        Self {
            pattern,
            identities: Vec::new(),
            require_workload_match: true,
        }
    }

    /// Caller-supplied commands run under the wait loop need not match the pattern
    pub fn require_workload_match(mut self, required: bool) -> Self {
        self.require_workload_match = required;
        self
    }

    pub fn register(&mut self, identity: ProcessIdentity) -> &mut Self {
        self.identities.push(identity);
        self
    }

    pub fn identities(&self) -> &[ProcessIdentity] {
        &self.identities
    }

    /// Check every registered identity against the pattern
    pub fn validate(&self) -> Result<()> {
        let Some(pattern) = &self.pattern else {
            return Ok(());
        };

        for identity in &self.identities {
            let matched = pattern.is_match(&identity.cmdline);
            match identity.role {
                Role::Supervisor | Role::Probe if matched => {
                    return Err(Error::IdentityConflict {
                        role: identity.role.to_string(),
                        cmdline: identity.cmdline.clone(),
                        pattern: pattern.as_str().to_string(),
                    });
                }
                Role::Workload if !matched && self.require_workload_match => {
                    return Err(Error::WorkloadUnmatched {
                        cmdline: identity.cmdline.clone(),
                        pattern: pattern.as_str().to_string(),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERN: &str = "lerobot.robots.lekiwi.lekiwi_host";

    fn registry() -> IdentityRegistry {
        IdentityRegistry::new(Some(WorkloadPattern::new(PATTERN)))
    }

    #[test]
    fn test_default_layout_is_separated() {
        let mut reg = registry();
        reg.register(ProcessIdentity::from_argv(Role::Supervisor, &["robot-run"]))
            .register(ProcessIdentity::from_argv(
                Role::Workload,
                &["python", "-m", PATTERN],
            ))
            .register(ProcessIdentity::from_argv(Role::Probe, &["robot-health"]));
        reg.validate().unwrap();
        assert_eq!(reg.identities().len(), 3);
    }

    #[test]
    fn test_supervisor_matching_pattern_rejected() {
        let mut reg = registry();
        reg.register(ProcessIdentity::from_argv(
            Role::Supervisor,
            &["robot-run", "--module", PATTERN],
        ));
        let err = reg.validate().unwrap_err();
        assert!(matches!(err, Error::IdentityConflict { ref role, .. } if role == "supervisor"));
    }

    #[test]
    fn test_self_matching_probe_rejected() {
        let mut reg = registry();
        reg.register(ProcessIdentity::from_argv(
            Role::Probe,
            &["pgrep", "-f", PATTERN],
        ));
        assert!(matches!(reg.validate(), Err(Error::IdentityConflict { .. })));
    }

    #[test]
    fn test_unmatched_workload_rejected() {
        let mut reg = registry();
        reg.register(ProcessIdentity::from_argv(
            Role::Workload,
            &["python", "-m", "lerobot.robots.so100.host"],
        ));
        assert!(matches!(reg.validate(), Err(Error::WorkloadUnmatched { .. })));
    }

    #[test]
    fn test_unmatched_caller_command_allowed() {
        let mut reg = registry().require_workload_match(false);
        reg.register(ProcessIdentity::from_argv(Role::Workload, &["whoami"]));
        reg.validate().unwrap();
    }

    #[test]
    fn test_no_pattern_accepts_everything() {
        let mut reg = IdentityRegistry::new(None);
        reg.register(ProcessIdentity::from_argv(Role::Supervisor, &[PATTERN]));
        reg.validate().unwrap();
    }

    #[test]
    fn test_pattern_is_literal() {
        let pattern = WorkloadPattern::new("a.b");
        assert!(pattern.is_match("run a.b now"));
        assert!(!pattern.is_match("run axb now"));
    }
}
