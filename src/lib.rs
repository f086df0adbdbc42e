//! robot-run - PID-1 supervisor and health probe for robot containers
//!
//! `robot-run` starts the robot host agent, forwards signals to it and
//! reaps orphans. `robot-health` decides whether the container is healthy.

pub mod banner;
pub mod cli;
pub mod error;
pub mod identity;
pub mod launch;
pub mod logging;
pub mod manifest;
pub mod routing;
pub mod sickbay;
pub mod signals;
pub mod warden;

pub use error::{Error, Result};
