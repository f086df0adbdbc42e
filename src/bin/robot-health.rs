//! robot-health - container health probe
//!
//! Prints `OK` and exits 0 when the container can serve, otherwise prints
//! one diagnostic line and exits 1.

use robot_run::cli::HealthCli;
use robot_run::manifest;
use robot_run::logging;
use robot_run::sickbay::HealthEvaluator;
use tracing::debug;

fn main() {
    let cli = HealthCli::parse_args();
    logging::init(cli.verbose);

    let path = cli.config.clone().or_else(manifest::path_from_env);
    let config = match manifest::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            println!("UNHEALTHY: config: {}", e);
            std::process::exit(1);
        }
    };

    if cli.print_healthcheck {
        println!("{}", config.probe.dockerfile_line());
        return;
    }

    let mut health = config.health;
    if cli.no_process_check {
        health.pattern = None;
    } else if let Some(pattern) = cli.pattern.filter(|p| !p.is_empty()) {
        health.pattern = Some(pattern);
    }

    let report = HealthEvaluator::new(health, config.probe.budget()).evaluate();
    for check in &report.checks {
        debug!("{}", check.summary());
    }

    if cli.json {
        println!("{}", report.to_json());
    } else {
        println!("{}", report.line());
    }

    std::process::exit(report.exit_code());
}
