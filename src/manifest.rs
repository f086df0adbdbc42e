//! Configuration file parsing for robot-run
//!
//! Parses `robot-run.toml` using serde. Both the supervisor and the health
//! evaluator read the same file so they agree on the workload pattern.

use crate::error::{Error, Result};
use crate::routing::RoutePolicy;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file inside the image
pub const DEFAULT_CONFIG_PATH: &str = "/etc/robot-run/robot-run.toml";

/// Environment variable naming an alternate configuration file
pub const CONFIG_ENV: &str = "ROBOT_RUN_CONFIG";

/// Load configuration from a file
///
/// With `path == None` the default location is tried and built-in defaults are
/// used when it does not exist. An explicitly named file must exist.
pub fn load(path: Option<&Path>) -> Result<RobotRunConfig> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    let mut config = if !explicit && !path.exists() {
        RobotRunConfig::default()
    } else {
        let content = fs::read_to_string(&path).map_err(|e| Error::ConfigRead {
            path: path.clone(),
            source: e,
        })?;
        toml::from_str(&content)?
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;

    Ok(config)
}

/// Resolve the config path the supervisor should use (`ROBOT_RUN_CONFIG` or default)
pub fn path_from_env() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RobotRunConfig {
    #[serde(default)]
    pub robot: RobotConfig,

    #[serde(default)]
    pub workload: WorkloadConfig,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub probe: ProbePolicy,
}

impl RobotRunConfig {
    /// Apply environment overrides
    ///
    /// `lookup` is `std::env::var` in production; tests pass a closure.
    /// An unknown routing policy is an error, not a silent fallback.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("ROBOT_ID").filter(|v| !v.is_empty()) {
            self.robot.id = id;
        }
        if let Some(env) = lookup("DEPLOY_ENV").filter(|v| !v.is_empty()) {
            self.robot.deploy_env = env;
        }
        if let Some(device) = lookup("SD_DEVICE_ID").filter(|v| !v.is_empty()) {
            self.robot.device_id = Some(device);
        }
        if let Some(policy) = lookup("ROBOT_RUN_ROUTING").filter(|v| !v.is_empty()) {
            self.supervisor.routing = policy
                .parse()
                .map_err(|e| Error::ConfigValidation(format!("ROBOT_RUN_ROUTING: {}", e)))?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.workload.command.first() {
            None => {
                return Err(Error::ConfigValidation(
                    "workload.command must not be empty".into(),
                ))
            }
            Some(program) if program.is_empty() => {
                return Err(Error::ConfigValidation(
                    "workload.command program must not be empty".into(),
                ))
            }
            _ => {}
        }

        if self.supervisor.wrapper_name.is_empty() {
            return Err(Error::ConfigValidation(
                "supervisor.wrapper_name must not be empty".into(),
            ));
        }

        if self.supervisor.wrapper_name.starts_with('-') {
            return Err(Error::ConfigValidation(format!(
                "supervisor.wrapper_name '{}' must not start with '-'",
                self.supervisor.wrapper_name
            )));
        }

        if self.supervisor.stop_timeout == 0 {
            return Err(Error::ConfigValidation(
                "supervisor.stop_timeout must be at least 1 second".into(),
            ));
        }

        if self.health.interpreter.is_empty() {
            return Err(Error::ConfigValidation(
                "health.interpreter must not be empty".into(),
            ));
        }

        if let Some(module) = self.health.modules.iter().find(|m| !is_module_path(m)) {
            return Err(Error::ConfigValidation(format!(
                "health.modules entry '{}' is not a valid module path",
                module
            )));
        }

        if matches!(self.health.pattern.as_deref(), Some("")) {
            return Err(Error::ConfigValidation(
                "health.pattern must not be empty when set".into(),
            ));
        }

        if self.probe.timeout == 0 || self.probe.interval == 0 {
            return Err(Error::ConfigValidation(
                "probe.interval and probe.timeout must be at least 1 second".into(),
            ));
        }

        if self.probe.command.is_empty() {
            return Err(Error::ConfigValidation(
                "probe.command must not be empty".into(),
            ));
        }

        Ok(())
    }
}

/// `a.b_c.d`: dotted identifiers only, so the import script cannot inject code
fn is_module_path(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Robot identity, used for banner lines only
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RobotConfig {
    #[serde(default = "default_robot_id")]
    pub id: String,

    #[serde(default = "default_deploy_env")]
    pub deploy_env: String,

    /// Fleet device id (from `SD_DEVICE_ID`)
    #[serde(default)]
    pub device_id: Option<String>,

    /// Robot model name shown in banners
    #[serde(default = "default_model")]
    pub model: String,

    /// Workload agent name shown in banners
    #[serde(default = "default_agent")]
    pub agent: String,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            id: default_robot_id(),
            deploy_env: default_deploy_env(),
            device_id: None,
            model: default_model(),
            agent: default_agent(),
        }
    }
}

fn default_robot_id() -> String {
    "my-kiwi".to_string()
}

fn default_deploy_env() -> String {
    "production".to_string()
}

fn default_model() -> String {
    "LeKiwi".to_string()
}

fn default_agent() -> String {
    "HostAgent".to_string()
}

/// The long-running workload started in wait-loop mode
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkloadConfig {
    #[serde(default = "default_workload_command")]
    pub command: Vec<String>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            command: default_workload_command(),
        }
    }
}

fn default_workload_command() -> Vec<String> {
    vec![
        "python".to_string(),
        "-m".to_string(),
        "lerobot.robots.lekiwi.lekiwi_host".to_string(),
    ]
}

/// Supervisor behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    /// argv[0] that routes an explicit command through the wait loop
    #[serde(default = "default_wrapper_name")]
    pub wrapper_name: String,

    #[serde(default)]
    pub routing: RoutePolicy,

    /// Seconds to wait after forwarding a shutdown signal before SIGKILL
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: u64,
}

impl SupervisorConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            wrapper_name: default_wrapper_name(),
            routing: RoutePolicy::default(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

fn default_wrapper_name() -> String {
    "robot-run".to_string()
}

fn default_stop_timeout() -> u64 {
    8
}

/// Health evaluator checks
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Interpreter that must be resolvable on PATH
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Modules the interpreter must be able to import
    #[serde(default = "default_modules")]
    pub modules: Vec<String>,

    /// Substring of the workload command line; `None` disables the process check
    #[serde(default = "default_pattern")]
    pub pattern: Option<String>,

    /// argv[0] basenames never counted as the workload
    #[serde(default = "default_wrappers")]
    pub wrappers: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            modules: default_modules(),
            pattern: default_pattern(),
            wrappers: default_wrappers(),
        }
    }
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_modules() -> Vec<String> {
    vec!["lerobot".to_string(), "zmq".to_string(), "cv2".to_string()]
}

fn default_pattern() -> Option<String> {
    Some("lerobot.robots.lekiwi.lekiwi_host".to_string())
}

fn default_wrappers() -> Vec<String> {
    ["robot-run", "robot-health", "sh", "bash", "pgrep", "timeout"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Orchestrator-owned probe constants
///
/// The evaluator does not schedule itself; these values render the
/// `HEALTHCHECK` line and cap the evaluator's own deadline.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbePolicy {
    /// Interval between probes in seconds
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Timeout for each probe in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Initial grace period before probes count, in seconds
    #[serde(default = "default_start_period")]
    pub start_period: u64,

    /// Consecutive failures before the instance is unhealthy
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Command the orchestrator runs for each probe
    #[serde(default = "default_probe_command")]
    pub command: Vec<String>,
}

impl ProbePolicy {
    /// Deadline for one evaluator run: one second under the probe timeout
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.timeout.saturating_sub(1).max(1))
    }

    /// Render as a Dockerfile `HEALTHCHECK` instruction
    pub fn dockerfile_line(&self) -> String {
        let cmd = self
            .command
            .iter()
            .map(|arg| format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "HEALTHCHECK --interval={}s --timeout={}s --start-period={}s --retries={} CMD [{}]",
            self.interval, self.timeout, self.start_period, self.retries, cmd
        )
    }
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
            start_period: default_start_period(),
            retries: default_retries(),
            command: default_probe_command(),
        }
    }
}

fn default_interval() -> u64 {
    30
}

fn default_timeout() -> u64 {
    10
}

fn default_start_period() -> u64 {
    60
}

fn default_retries() -> u32 {
    3
}

fn default_probe_command() -> Vec<String> {
    vec!["robot-health".to_string()]
}
