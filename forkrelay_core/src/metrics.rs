use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// The two phases of an iteration whose time is accumulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    /// From the end of one iteration until the next test case arrived.
    MutationWait,
    /// Running the target on one test case and observing it.
    Execution,
}

/// A start/stop pair measuring one phase of one iteration.
#[derive(Debug, Clone, Copy)]
pub struct TimingSample {
    start: Instant,
    stop: Option<Instant>,
}

impl TimingSample {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            stop: None,
        }
    }

    pub fn stop(&mut self) {
        self.stop = Some(Instant::now());
    }

    /// Elapsed microseconds between start and stop, or until now if the
    /// sample has not been stopped.
    pub fn elapsed_us(&self) -> u64 {
        let end = self.stop.unwrap_or_else(Instant::now);
        end.saturating_duration_since(self.start).as_micros() as u64
    }
}

/// Per-iteration averages, in microseconds, truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub mutation_avg_us: u64,
    pub execution_avg_us: u64,
}

/// Cumulative timing totals over the whole run.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub mutation_time_us: u64,
    pub execution_time_us: u64,
    pub total_iterations: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_phase(&mut self, kind: PhaseKind, sample: &TimingSample) {
        self.record_us(kind, sample.elapsed_us());
    }

    pub fn record_us(&mut self, kind: PhaseKind, elapsed_us: u64) {
        let total = match kind {
            PhaseKind::MutationWait => &mut self.mutation_time_us,
            PhaseKind::Execution => &mut self.execution_time_us,
        };
        *total = total.saturating_add(elapsed_us);
    }

    pub fn complete_iteration(&mut self) {
        self.total_iterations += 1;
    }

    /// Averages over `total_iterations`. Zero before the first completed
    /// iteration.
    pub fn snapshot(&self) -> MetricsSnapshot {
        if self.total_iterations == 0 {
            return MetricsSnapshot::default();
        }
        MetricsSnapshot {
            mutation_avg_us: self.mutation_time_us / self.total_iterations,
            execution_avg_us: self.execution_time_us / self.total_iterations,
        }
    }

    /// The `[METRICS]` line emitted once per iteration when metrics are on.
    pub fn report_line(&self, current_loop_us: u64) -> String {
        let snapshot = self.snapshot();
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!(
            "[METRICS]: [t={now}] [fc={}] [cur_loop={current_loop_us}] [mut_avg={}] [exec_avg={}]",
            self.total_iterations, snapshot.mutation_avg_us, snapshot.execution_avg_us
        )
    }
}
