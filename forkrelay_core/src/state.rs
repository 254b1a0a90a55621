use crate::metrics::Metrics;
use serde::Deserialize;
use std::fmt;

/// How the relay relates to the target process.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExecMode {
    /// The relay owns the target and may recreate it after a crash.
    #[default]
    Spawn,
    /// The relay observes a process it did not create.
    Attach,
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecMode::Spawn => f.write_str("spawn"),
            ExecMode::Attach => f.write_str("attach"),
        }
    }
}

/// Static settings fixed for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSettings {
    pub metrics: bool,
    pub exec_mode: ExecMode,
}

/// Mutable state threaded through every iteration by the loop driver.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Process id of the target, `None` until spawned or attached.
    pub target_pid: Option<i32>,
    /// Status reported for the current iteration.
    pub pending_status: i32,
    pub metrics: Metrics,
    pub settings: RunSettings,
}

impl RunState {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            target_pid: None,
            pending_status: 0,
            metrics: Metrics::new(),
            settings,
        }
    }

    pub fn exec_mode(&self) -> ExecMode {
        self.settings.exec_mode
    }
}
