use crate::state::{ExecMode, RunState};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("No target command configured for spawn mode")]
    MissingCommand,
    #[error("No target pid configured for attach mode")]
    MissingPid,
    #[error("Failed to spawn target {command:?}: {source}")]
    Spawn {
        command: Vec<String>,
        #[source]
        source: std::io::Error,
    },
    #[error("Target process {0} does not exist")]
    NoSuchProcess(i32),
}

/// The capabilities the forkserver engine needs from whatever actually runs
/// and observes the target.
pub trait Target {
    /// Runs one test case against the target. Blocks until the iteration is
    /// over. May set `state.pending_status`.
    fn execute_one_iteration(&mut self, state: &mut RunState, payload: &[u8]);

    /// Starts the target (spawn mode) or adopts it (attach mode) and records
    /// its pid in `state`.
    fn respawn_or_attach(&mut self, state: &mut RunState) -> Result<(), TargetError>;

    /// Releases the target. Called once when the run cannot continue.
    fn teardown(&mut self, state: &mut RunState);

    /// Whether the target recorded in `state` is still running.
    fn is_alive(&mut self, state: &RunState) -> bool {
        state.target_pid.is_some_and(pid_is_alive)
    }
}

/// Probes `pid` with signal 0. A process we may not signal still exists.
pub fn pid_is_alive(pid: i32) -> bool {
    match kill(Pid::from_raw(pid), None::<Signal>) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

pub enum InputDelivery {
    StdIn,
    File(PathBuf),
}

pub struct ProcessTargetConfig {
    pub command: Vec<String>,
    pub pid: Option<i32>,
    pub input_delivery: InputDelivery,
    pub settle: Duration,
    pub working_dir: Option<PathBuf>,
}

/// A target that is a plain OS process: spawned from a command line or
/// adopted by pid. Payloads go to the child's stdin or to a file the target
/// watches.
pub struct ProcessTarget {
    config: ProcessTargetConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl ProcessTarget {
    pub fn new(config: ProcessTargetConfig) -> Self {
        Self {
            config,
            child: None,
            stdin: None,
        }
    }

    fn spawn(&mut self, state: &mut RunState) -> Result<(), TargetError> {
        if self.config.command.is_empty() {
            return Err(TargetError::MissingCommand);
        }

        self.reap();

        let mut cmd = Command::new(&self.config.command[0]);
        if self.config.command.len() > 1 {
            cmd.args(&self.config.command[1..]);
        }
        if let Some(cwd) = &self.config.working_dir {
            cmd.current_dir(cwd);
        }
        match self.config.input_delivery {
            InputDelivery::StdIn => cmd.stdin(Stdio::piped()),
            InputDelivery::File(_) => cmd.stdin(Stdio::null()),
        };
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|source| TargetError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;
        self.stdin = child.stdin.take();
        let pid = child.id() as i32;
        self.child = Some(child);
        state.target_pid = Some(pid);
        info!("Spawned target {:?} as pid {pid}", self.config.command);
        Ok(())
    }

    fn attach(&mut self, state: &mut RunState) -> Result<(), TargetError> {
        let pid = self.config.pid.ok_or(TargetError::MissingPid)?;
        if !pid_is_alive(pid) {
            return Err(TargetError::NoSuchProcess(pid));
        }
        state.target_pid = Some(pid);
        info!("Attached to target pid {pid}");
        Ok(())
    }

    /// Kills and waits for a previously spawned child, if any.
    fn reap(&mut self) {
        self.stdin = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("Kill of pid {} failed: {e}", child.id());
            }
            match child.wait() {
                Ok(status) => debug!("Reaped pid {}: {status}", child.id()),
                Err(e) => warn!("Failed to reap pid {}: {e}", child.id()),
            }
        }
    }

    fn deliver(&mut self, payload: &[u8]) -> std::io::Result<()> {
        match &self.config.input_delivery {
            InputDelivery::StdIn => match self.stdin.as_mut() {
                Some(stdin) => {
                    stdin.write_all(payload)?;
                    stdin.flush()
                }
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "target stdin is not available",
                )),
            },
            InputDelivery::File(path) => fs::write(path, payload),
        }
    }
}

impl Target for ProcessTarget {
    fn execute_one_iteration(&mut self, state: &mut RunState, payload: &[u8]) {
        if let Err(e) = self.deliver(payload) {
            warn!(
                "Failed to deliver {} byte test case to pid {:?}: {e}",
                payload.len(),
                state.target_pid
            );
        }
        if !self.config.settle.is_zero() {
            std::thread::sleep(self.config.settle);
        }
    }

    fn respawn_or_attach(&mut self, state: &mut RunState) -> Result<(), TargetError> {
        match state.exec_mode() {
            ExecMode::Spawn => self.spawn(state),
            ExecMode::Attach => self.attach(state),
        }
    }

    fn teardown(&mut self, state: &mut RunState) {
        match state.exec_mode() {
            ExecMode::Spawn => self.reap(),
            ExecMode::Attach => info!("Detaching from pid {:?}", state.target_pid),
        }
        state.target_pid = None;
    }

    fn is_alive(&mut self, state: &RunState) -> bool {
        // A dead but unreaped child still answers signal 0.
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => state.target_pid.is_some_and(pid_is_alive),
        }
    }
}

impl Drop for ProcessTarget {
    fn drop(&mut self) {
        self.reap();
    }
}
