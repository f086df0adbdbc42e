//! Health evaluation for a running robot container
//!
//! Checks run in a fixed order and stop at the first failure. The evaluator
//! keeps no state between runs, so repeated runs against the same container
//! state produce the same verdict.

use crate::identity::WorkloadPattern;
use crate::manifest::HealthConfig;
use crate::sickbay::process_table::{find_workload, ProcessTable, SystemTable};
use crate::sickbay::runtime::{import_script, HostRuntime, Runtime};
use nix::unistd::getppid;
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Overall verdict of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthVerdict {
    Healthy,
    Unhealthy,
}

impl HealthVerdict {
    pub fn exit_code(&self) -> i32 {
        match self {
            HealthVerdict::Healthy => 0,
            HealthVerdict::Unhealthy => 1,
        }
    }
}

impl std::fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthVerdict::Healthy => write!(f, "healthy"),
            HealthVerdict::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// The individual checks, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Interpreter resolvable on PATH
    Interpreter,
    /// Native modules importable
    Modules,
    /// Workload present in the process table
    Process,
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Interpreter => write!(f, "interpreter"),
            CheckKind::Modules => write!(f, "modules"),
            CheckKind::Process => write!(f, "process"),
        }
    }
}

/// Result of a single check
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub check: CheckKind,
    pub passed: bool,
    pub duration_ms: u64,
    pub detail: String,
}

impl CheckResult {
    fn new(check: CheckKind, passed: bool, started: Instant, detail: impl Into<String>) -> Self {
        Self {
            check,
            passed,
            duration_ms: started.elapsed().as_millis() as u64,
            detail: detail.into(),
        }
    }

    /// Get a summary string for this check result
    pub fn summary(&self) -> String {
        let status = if self.passed { "ok" } else { "fail" };
        format!("{}:{} ({}ms) - {}", self.check, status, self.duration_ms, self.detail)
    }
}

/// Verdict plus the checks that produced it
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub verdict: HealthVerdict,
    pub checks: Vec<CheckResult>,
}

impl HealthReport {
    fn from_checks(checks: Vec<CheckResult>) -> Self {
        let verdict = if checks.iter().all(|c| c.passed) {
            HealthVerdict::Healthy
        } else {
            HealthVerdict::Unhealthy
        };
        Self { verdict, checks }
    }

    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }

    pub fn first_failure(&self) -> Option<&CheckResult> {
        self.checks.iter().find(|c| !c.passed)
    }

    /// `OK`, or a single diagnostic line naming the failed check
    pub fn line(&self) -> String {
        match self.first_failure() {
            None => "OK".to_string(),
            Some(failed) => format!("UNHEALTHY: {}: {}", failed.check, failed.detail),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| error_json(self.verdict, &e.to_string()))
    }
}

/// Minimal report used when the full one cannot be serialized
fn error_json(verdict: HealthVerdict, error: &str) -> String {
    serde_json::json!({
        "verdict": verdict,
        "error": error,
    })
    .to_string()
}

/// Evaluates container health from runtime and process-table state
pub struct HealthEvaluator<R = HostRuntime, T = SystemTable> {
    config: HealthConfig,
    /// Deadline for the whole evaluation
    budget: Duration,
    /// Pids never counted as the workload (the evaluator and its caller)
    exclude: Vec<u32>,
    runtime: R,
    table: T,
}

impl HealthEvaluator {
    /// Evaluator against the real host
    pub fn new(config: HealthConfig, budget: Duration) -> Self {
        Self::with_parts(config, budget, HostRuntime, SystemTable)
    }
}

impl<R: Runtime, T: ProcessTable> HealthEvaluator<R, T> {
    pub fn with_parts(config: HealthConfig, budget: Duration, runtime: R, table: T) -> Self {
        Self {
            config,
            budget,
            exclude: vec![std::process::id(), getppid().as_raw() as u32],
            runtime,
            table,
        }
    }

    /// Override the excluded pids
    pub fn with_exclude(mut self, pids: Vec<u32>) -> Self {
        self.exclude = pids;
        self
    }

    /// Run all checks, stopping at the first failure
    pub fn evaluate(&self) -> HealthReport {
        let deadline = Instant::now() + self.budget;
        let mut checks = Vec::with_capacity(3);

        let (result, interpreter) = self.check_interpreter();
        checks.push(result);
        let Some(interpreter) = interpreter else {
            return HealthReport::from_checks(checks);
        };

        let result = self.check_modules(&interpreter, deadline);
        let passed = result.passed;
        checks.push(result);
        if !passed {
            return HealthReport::from_checks(checks);
        }

        if let Some(result) = self.check_process() {
            checks.push(result);
        }

        HealthReport::from_checks(checks)
    }

    fn check_interpreter(&self) -> (CheckResult, Option<PathBuf>) {
        let started = Instant::now();
        match self.runtime.resolve(&self.config.interpreter) {
            Some(path) => {
                let detail = path.display().to_string();
                (CheckResult::new(CheckKind::Interpreter, true, started, detail), Some(path))
            }
            None => {
                let detail = format!("'{}' not found on PATH", self.config.interpreter);
                (CheckResult::new(CheckKind::Interpreter, false, started, detail), None)
            }
        }
    }

    fn check_modules(&self, interpreter: &std::path::Path, deadline: Instant) -> CheckResult {
        let started = Instant::now();

        if self.config.modules.is_empty() {
            return CheckResult::new(CheckKind::Modules, true, started, "no modules required");
        }

        let remaining = deadline.saturating_duration_since(started);
        if remaining.is_zero() {
            return CheckResult::new(CheckKind::Modules, false, started, "check budget exhausted");
        }

        let args = vec!["-c".to_string(), import_script(&self.config.modules)];
        match self.runtime.run(interpreter, &args, remaining) {
            Ok(outcome) if outcome.success => {
                let detail = format!("imported {}", self.config.modules.join(", "));
                CheckResult::new(CheckKind::Modules, true, started, detail)
            }
            Ok(outcome) if outcome.timed_out => {
                let detail = format!("import {}", outcome.output);
                CheckResult::new(CheckKind::Modules, false, started, detail)
            }
            Ok(outcome) => {
                // The last line of a traceback names the failing import
                let detail = outcome
                    .output
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .map(|l| l.trim().to_string())
                    .unwrap_or_else(|| "import failed".to_string());
                CheckResult::new(CheckKind::Modules, false, started, detail)
            }
            Err(e) => CheckResult::new(CheckKind::Modules, false, started, e.to_string()),
        }
    }

    /// `None` when no workload pattern is configured
    fn check_process(&self) -> Option<CheckResult> {
        let pattern = WorkloadPattern::new(self.config.pattern.as_deref()?);
        let started = Instant::now();

        let entries = self.table.snapshot();
        let mut pids: Vec<u32> = find_workload(&entries, &pattern, &self.config.wrappers, &self.exclude)
            .iter()
            .map(|e| e.pid)
            .collect();
        pids.sort_unstable();

        let result = match pids.as_slice() {
            [] => CheckResult::new(
                CheckKind::Process,
                false,
                started,
                format!("no process matching '{}'", pattern.as_str()),
            ),
            [pid] => CheckResult::new(CheckKind::Process, true, started, format!("pid {}", pid)),
            many => {
                let list = many.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ");
                CheckResult::new(CheckKind::Process, true, started, format!("pids {}", list))
            }
        };

        Some(result)
    }
}
