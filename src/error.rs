//! Unified error types for robot-run

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for supervisor and health evaluator operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    // Launch errors
    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    #[error("Failed to exec '{command}': {source}")]
    ExecFailed { command: String, source: nix::Error },

    #[error("Failed to spawn '{command}': {source}")]
    SpawnFailed { command: String, source: io::Error },

    // Identity errors
    #[error("{role} command line '{cmdline}' matches workload pattern '{pattern}'")]
    IdentityConflict {
        role: String,
        cmdline: String,
        pattern: String,
    },

    #[error("Workload command line '{cmdline}' does not match pattern '{pattern}'")]
    WorkloadUnmatched { cmdline: String, pattern: String },

    // Supervision errors
    #[error("Failed to install signal handler: {0}")]
    Signal(io::Error),

    #[error("Failed to deliver {signal} to pid {pid}: {source}")]
    Forward {
        signal: String,
        pid: i32,
        source: nix::Error,
    },

    #[error("waitpid failed: {0}")]
    Wait(nix::Error),

    // Health check errors
    #[error("Health check '{check}' failed: {message}")]
    HealthCheckFailed { check: String, message: String },
}

impl Error {
    /// Exit status reported to the container runtime for this error
    ///
    /// Follows the shell convention: 127 for a command that could not be
    /// found, 126 for one that was found but could not be executed.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ExecFailed { source, .. } if *source == nix::Error::ENOENT => 127,
            Error::ExecFailed { .. } => 126,
            Error::SpawnFailed { source, .. } if source.kind() == io::ErrorKind::NotFound => 127,
            Error::SpawnFailed { .. } => 126,
            _ => 1,
        }
    }
}

/// Result type alias for robot-run operations
pub type Result<T> = std::result::Result<T, Error>;
