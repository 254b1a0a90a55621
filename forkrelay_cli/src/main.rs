use forkrelay_core::config::{ConfigInputDelivery, ForkrelayConfig};
use forkrelay_core::forkserver::Forkserver;
use forkrelay_core::state::{ExecMode, RunState};
use forkrelay_core::target::{ProcessTarget, Target};
use forkrelay_core::ControlChannel;

use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::os::fd::FromRawFd;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Observe an already running process instead of spawning one. An
    /// adopted process cannot be fed on stdin, so this needs `--input-file`
    /// or file delivery in the config file.
    #[clap(long, value_name = "PID")]
    attach: Option<i32>,
    /// Deliver each test case by rewriting this file instead of the target's stdin.
    #[clap(long, value_name = "PATH")]
    input_file: Option<PathBuf>,
    #[clap(long)]
    metrics: bool,
    #[clap(long)]
    map_size: Option<u32>,
    #[clap(short, long)]
    verbose: bool,
    /// Target command line for spawn mode.
    #[clap(last = true)]
    target_command: Vec<String>,
}

fn load_config(cli: &Cli) -> Result<ForkrelayConfig, anyhow::Error> {
    let mut config = match &cli.config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            ForkrelayConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("forkrelay.toml");
            if default_config_path.exists() {
                info!("No config file specified via CLI, loading default: {default_config_path:?}");
                ForkrelayConfig::load_from_file(&default_config_path)?
            } else {
                info!("No config file specified and default 'forkrelay.toml' not found, using built-in defaults.");
                ForkrelayConfig::default()
            }
        }
    };

    if let Some(pid) = cli.attach {
        config.target.mode = ExecMode::Attach;
        config.target.pid = Some(pid);
    }
    if let Some(path) = &cli.input_file {
        config.target.input_delivery = ConfigInputDelivery::File { path: path.clone() };
    }
    if !cli.target_command.is_empty() {
        if config.target.mode == ExecMode::Spawn {
            config.target.command = cli.target_command.clone();
        } else {
            warn!("Target command given but the relay is attaching. Command ignored.");
        }
    }
    if cli.metrics {
        config.forkserver.metrics = true;
    }
    if let Some(map_size) = cli.map_size {
        config.forkserver.map_size = map_size;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = load_config(&cli)?;
    info!("Effective configuration: {config:?}");

    let mut state = RunState::new(config.run_settings());
    let mut target = ProcessTarget::new(config.process_target_config());
    target.respawn_or_attach(&mut state)?;

    // SAFETY: the fuzzer hands these descriptors to us at exec time and
    // nothing else in this process opens or closes them.
    let control = unsafe { ControlChannel::from_raw_fds(config.forkserver.control_fd) };
    let input = unsafe { File::from_raw_fd(config.forkserver.input_fd) };

    let mut forkserver = Forkserver::new(
        control,
        input,
        config.forkserver.payload_size,
        config.forkserver.map_size,
    );
    let result = forkserver.run(&mut target, &mut state);

    if state.target_pid.is_some() {
        target.teardown(&mut state);
    }

    let summary = result?;
    let snapshot = state.metrics.snapshot();
    info!(
        "Served {} test cases ({:?}); avg mutation wait {}us, avg execution {}us",
        summary.iterations, summary.reason, snapshot.mutation_avg_us, snapshot.execution_avg_us
    );
    Ok(())
}
