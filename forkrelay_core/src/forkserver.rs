use crate::channel::ControlChannel;
use crate::handshake;
use crate::intake::{self, Intake};
use crate::metrics::{PhaseKind, TimingSample};
use crate::protocol::{Direction, WordKind};
use crate::state::RunState;
use crate::supervisor;
use crate::target::{Target, TargetError};
use log::{error, info};
use std::io::{Read, Write};
use thiserror::Error;

/// Everything that ends a forkserver run early.
///
/// None of these are retried: once the word stream with the fuzzer is out of
/// step, or the target is gone for good, the run stops and control returns
/// to the caller.
#[derive(Error, Debug)]
pub enum ForkserverError {
    /// Fewer than four bytes of a protocol word arrived.
    #[error("Short read of {kind} from fuzzer: got {len} of 4 bytes")]
    ShortRead { kind: WordKind, len: usize },

    /// Fewer than four bytes of a protocol word were accepted.
    #[error("Short write of {kind} to fuzzer: wrote {len} of 4 bytes")]
    ShortWrite { kind: WordKind, len: usize },

    /// The control channel itself failed.
    #[error("Control channel {direction} of {kind} failed: {source}")]
    Io {
        kind: WordKind,
        direction: Direction,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read test case from input channel: {0}")]
    InputRead(#[source] std::io::Error),

    /// The fuzzer does not speak our protocol revision.
    #[error("Fuzzer handshake reply mismatch: got 0x{actual:08x}, expected 0x{expected:08x}")]
    HandshakeMismatch { expected: u32, actual: u32 },

    /// The target died while attached.
    #[error("Target process {pid:?} died in attach mode")]
    TargetUnavailable { pid: Option<i32> },

    /// The target died and could not be brought back.
    #[error("Target process {pid:?} crashed and could not be respawned: {source}")]
    RecoveryFailed {
        pid: Option<i32>,
        #[source]
        source: TargetError,
    },
}

/// Why a run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The fuzzer closed the control channel.
    FuzzerClosed,
    /// The input channel yielded no bytes for a test case.
    EmptyTestcase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub reason: StopReason,
}

/// The forkserver protocol engine.
///
/// Owns the control channel pair, the input channel and the test case
/// buffer. The target and the run state are lent to it for the duration of
/// [`Forkserver::run`].
pub struct Forkserver<R, W, In> {
    control: ControlChannel<R, W>,
    input: In,
    buffer: Vec<u8>,
    map_size: u32,
    mutation_timer: TimingSample,
}

impl<R: Read, W: Write, In: Read> Forkserver<R, W, In> {
    pub fn new(
        control: ControlChannel<R, W>,
        input: In,
        payload_size: usize,
        map_size: u32,
    ) -> Self {
        Self {
            control,
            input,
            buffer: vec![0u8; payload_size],
            map_size,
            mutation_timer: TimingSample::start(),
        }
    }

    pub fn handshake(&mut self) -> Result<(), ForkserverError> {
        handshake::negotiate(&mut self.control, self.map_size)
    }

    /// Handshakes, then serves test cases until the fuzzer stops sending
    /// them or something fails.
    pub fn run<T: Target + ?Sized>(
        &mut self,
        target: &mut T,
        state: &mut RunState,
    ) -> Result<RunSummary, ForkserverError> {
        if let Err(e) = self.handshake() {
            error!("Unable to start forkserver, handshake failed: {e}");
            return Err(e);
        }

        info!("Everything ready, starting to fuzz!");
        let first_iteration = state.metrics.total_iterations;
        self.mutation_timer = TimingSample::start();

        loop {
            match self.step(target, state) {
                Ok(Step::Continue) => {}
                Ok(Step::Stop(reason)) => {
                    let iterations = state.metrics.total_iterations - first_iteration;
                    info!("Forkserver execution ended after {iterations} iterations ({reason:?})");
                    return Ok(RunSummary { iterations, reason });
                }
                Err(e) => {
                    error!("Forkserver loop terminated: {e}");
                    return Err(e);
                }
            }
        }
    }

    /// Serves a single test case: intake, execution, liveness check and
    /// status report.
    pub fn step<T: Target + ?Sized>(
        &mut self,
        target: &mut T,
        state: &mut RunState,
    ) -> Result<Step, ForkserverError> {
        let next = intake::next_testcase(&mut self.control, &mut self.input, &mut self.buffer)?;
        let len = match next {
            Intake::Finished => return Ok(Step::Stop(StopReason::FuzzerClosed)),
            Intake::Testcase(0) => {
                info!("Input channel yielded an empty test case");
                return Ok(Step::Stop(StopReason::EmptyTestcase));
            }
            Intake::Testcase(len) => len,
        };

        self.mutation_timer.stop();
        state
            .metrics
            .record_phase(PhaseKind::MutationWait, &self.mutation_timer);
        let mut exec_timer = TimingSample::start();

        target.execute_one_iteration(state, &self.buffer[..len]);
        supervisor::check_target(&mut self.control, target, state)?;
        supervisor::report_status(&mut self.control, state)?;
        self.buffer[..len].fill(0);

        exec_timer.stop();
        state.metrics.record_phase(PhaseKind::Execution, &exec_timer);
        state.metrics.complete_iteration();
        if state.settings.metrics {
            info!("{}", state.metrics.report_line(exec_timer.elapsed_us()));
        }

        self.mutation_timer = TimingSample::start();
        Ok(Step::Continue)
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }
}
