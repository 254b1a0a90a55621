use crate::state::{ExecMode, RunSettings};
use crate::target::{InputDelivery, ProcessTargetConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Descriptor the fuzzer writes control words to; we answer on the next one.
pub const DEFAULT_CONTROL_FD: i32 = 198;

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigInputDelivery {
    #[default]
    StdIn,
    File {
        path: PathBuf,
    },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ForkserverSettings {
    #[serde(default = "default_control_fd")]
    pub control_fd: i32,
    #[serde(default)]
    pub input_fd: i32,
    #[serde(default = "default_map_size")]
    pub map_size: u32,
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    #[serde(default)]
    pub metrics: bool,
}

fn default_control_fd() -> i32 {
    DEFAULT_CONTROL_FD
}

pub fn default_map_size() -> u32 {
    65536
}

pub fn default_payload_size() -> usize {
    65536
}

impl Default for ForkserverSettings {
    fn default() -> Self {
        Self {
            control_fd: default_control_fd(),
            input_fd: 0,
            map_size: default_map_size(),
            payload_size: default_payload_size(),
            metrics: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct TargetSettings {
    #[serde(default)]
    pub mode: ExecMode,
    #[serde(default)]
    pub command: Vec<String>,
    pub pid: Option<i32>,
    #[serde(default)]
    pub input_delivery: ConfigInputDelivery,
    #[serde(default)]
    pub settle_ms: u64,
    pub working_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ForkrelayConfig {
    #[serde(default)]
    pub forkserver: ForkserverSettings,
    #[serde(default)]
    pub target: TargetSettings,
}

impl ForkrelayConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: ForkrelayConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    /// Rejects combinations the relay cannot run with.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.forkserver.payload_size == 0 {
            anyhow::bail!("payload-size must be greater than zero");
        }
        if self.forkserver.map_size == 0 {
            anyhow::bail!("map-size must be greater than zero");
        }
        match self.target.mode {
            ExecMode::Spawn if self.target.command.is_empty() => {
                anyhow::bail!("spawn mode requires a target command")
            }
            ExecMode::Attach if self.target.pid.is_none() => {
                anyhow::bail!("attach mode requires a target pid")
            }
            ExecMode::Attach if self.target.input_delivery == ConfigInputDelivery::StdIn => {
                anyhow::bail!("attach mode cannot deliver test cases on the target's stdin")
            }
            _ => Ok(()),
        }
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            metrics: self.forkserver.metrics,
            exec_mode: self.target.mode,
        }
    }

    pub fn process_target_config(&self) -> ProcessTargetConfig {
        let input_delivery = match &self.target.input_delivery {
            ConfigInputDelivery::StdIn => InputDelivery::StdIn,
            ConfigInputDelivery::File { path } => InputDelivery::File(path.clone()),
        };
        ProcessTargetConfig {
            command: self.target.command.clone(),
            pid: self.target.pid,
            input_delivery,
            settle: Duration::from_millis(self.target.settle_ms),
            working_dir: self.target.working_dir.clone(),
        }
    }
}
