pub mod channel;
pub mod config;
pub mod forkserver;
pub mod handshake;
pub mod intake;
pub mod metrics;
pub mod protocol;
pub mod state;
pub mod supervisor;
pub mod target;

#[cfg(test)]
mod mock;

pub use channel::ControlChannel;
pub use config::ForkrelayConfig;
pub use forkserver::{Forkserver, ForkserverError, RunSummary, StopReason};
pub use metrics::{Metrics, MetricsSnapshot, PhaseKind, TimingSample};
pub use state::{ExecMode, RunSettings, RunState};
pub use target::{ProcessTarget, Target, TargetError};
