//! Status banners for line-based log collection
//!
//! Fleet log collection keys on these lines, so their wording is stable.

use crate::manifest::RobotConfig;
use nix::sys::signal::Signal;
use std::io::{self, Write};

/// Writes supervisor banners, one flushed line each
pub struct Banner<W: Write> {
    robot: RobotConfig,
    out: W,
}

impl Banner<io::Stdout> {
    pub fn stdout(robot: RobotConfig) -> Self {
        Self::new(robot, io::stdout())
    }
}

impl<W: Write> Banner<W> {
    pub fn new(robot: RobotConfig, out: W) -> Self {
        Self { robot, out }
    }

    /// Borrow the underlying writer
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn configuring(&mut self) {
        let line = format!(
            "Configuring {} robot '{}' (environment: {})",
            self.robot.model, self.robot.id, self.robot.deploy_env
        );
        self.line(&line);
    }

    pub fn connecting(&mut self) {
        let device = self.robot.device_id.as_deref().unwrap_or("unregistered");
        let line = format!(
            "Connecting {} robot '{}' (device: {})",
            self.robot.model, self.robot.id, device
        );
        self.line(&line);
    }

    pub fn starting(&mut self, cmdline: &str) {
        let line = format!("Starting {}: {}", self.robot.agent, cmdline);
        self.line(&line);
    }

    pub fn ready(&mut self, pid: i32) {
        let line = format!("{} ready (pid {})", self.robot.agent, pid);
        self.line(&line);
    }

    pub fn shutdown(&mut self, sig: Signal) {
        let line = format!("Received {}, shutting down {}", sig, self.robot.agent);
        self.line(&line);
    }

    pub fn killing(&mut self, pid: i32) {
        let line = format!("Killing {} (pid {})", self.robot.agent, pid);
        self.line(&line);
    }

    pub fn stopped(&mut self) {
        let line = format!("{} stopped", self.robot.agent);
        self.line(&line);
    }

    pub fn exited(&mut self, status: &str) {
        let line = format!("{} exited ({})", self.robot.agent, status);
        self.line(&line);
    }

    pub fn holding(&mut self) {
        let line = format!(
            "{} is not running, waiting for shutdown signal",
            self.robot.agent
        );
        self.line(&line);
    }

    fn line(&mut self, line: &str) {
        // PID 1 must survive a closed stdout
        let _ = writeln!(self.out, "{}", line);
        let _ = self.out.flush();
    }
}
