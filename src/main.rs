//! robot-run - container entrypoint for robot workloads
//!
//! Either supervises the workload as PID 1 or hands PID 1 over to the
//! command the runtime passed in.

use robot_run::banner::Banner;
use robot_run::error::{Error, Result};
use robot_run::identity::{IdentityRegistry, ProcessIdentity, Role, WorkloadPattern};
use robot_run::manifest::{self, RobotRunConfig};
use robot_run::routing::{route, Launch};
use robot_run::signals::SignalSet;
use robot_run::warden::Warden;
use robot_run::{launch, logging};
use tracing::{debug, info};

fn main() {
    logging::init(false);

    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

fn run() -> Result<i32> {
    let argv = argv()?;
    let config = manifest::load(manifest::path_from_env().as_deref())?;

    let decision = route(
        &argv[1..],
        &config.workload.command,
        &config.supervisor.wrapper_name,
        config.supervisor.routing,
    );
    info!(?decision, policy = %config.supervisor.routing, "routed arguments");

    match decision {
        Launch::Exec { command } => match launch::exec_replace(&command)? {},
        Launch::Supervise { command, configured } => {
            check_identities(&config, &argv, &command, configured)?;
            supervise(config, &command, configured)
        }
    }
}

/// Process arguments, including argv[0]
fn argv() -> Result<Vec<String>> {
    let mut argv = std::env::args_os()
        .map(|arg| {
            arg.into_string().map_err(|raw| {
                Error::MalformedCommand(format!("argument is not valid UTF-8: {:?}", raw))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if argv.is_empty() {
        argv.push("robot-run".to_string());
    }
    Ok(argv)
}

/// Refuse to start when the probe could mistake us (or itself) for the workload
fn check_identities(
    config: &RobotRunConfig,
    argv: &[String],
    command: &[String],
    configured: bool,
) -> Result<()> {
    let pattern = config.health.pattern.as_deref().map(WorkloadPattern::new);
    let mut registry = IdentityRegistry::new(pattern).require_workload_match(configured);

    registry
        .register(ProcessIdentity::from_argv(Role::Supervisor, argv))
        .register(ProcessIdentity::from_argv(Role::Workload, command))
        .register(ProcessIdentity::from_argv(Role::Probe, &config.probe.command));

    for identity in registry.identities() {
        debug!(role = %identity.role, cmdline = %identity.cmdline, "registered identity");
    }

    registry.validate()
}

/// `hold` keeps PID 1 up after the configured workload exits
fn supervise(config: RobotRunConfig, command: &[String], hold: bool) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_warden(config, command, hold))
}

async fn run_warden(config: RobotRunConfig, command: &[String], hold: bool) -> Result<i32> {
    // Handlers go in before the child exists
    let mut events = SignalSet::install()?;
    let mut warden = Warden::new(Banner::stdout(config.robot), config.supervisor.stop_timeout())
        .hold_after_exit(hold);
    warden.run(&mut events, command).await
}
