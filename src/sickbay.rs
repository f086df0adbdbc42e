//! Container health evaluation
//!
//! Provides:
//! - Interpreter and native-module preconditions
//! - Process-table search for the workload
//! - Verdicts and reports for the container health probe

pub mod checker;
pub mod process_table;
pub mod runtime;

pub use checker::{CheckKind, CheckResult, HealthEvaluator, HealthReport, HealthVerdict};
