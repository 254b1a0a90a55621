use crate::state::RunState;
use crate::target::{Target, TargetError};
use std::collections::VecDeque;

/// A scripted target for driving the engine without a real process.
///
/// Liveness answers and respawn outcomes are consumed in order; once a
/// script runs out the target reports alive and respawns succeed.
pub struct MockTarget {
    liveness: VecDeque<bool>,
    respawn_results: VecDeque<bool>,
    next_pid: i32,
    pub status_on_execute: i32,
    pub executed: Vec<Vec<u8>>,
    pub respawn_calls: usize,
    pub teardown_calls: usize,
}

impl MockTarget {
    pub fn new() -> Self {
        Self {
            liveness: VecDeque::new(),
            respawn_results: VecDeque::new(),
            next_pid: 1000,
            status_on_execute: 0,
            executed: Vec::new(),
            respawn_calls: 0,
            teardown_calls: 0,
        }
    }

    pub fn with_liveness(mut self, answers: &[bool]) -> Self {
        self.liveness.extend(answers);
        self
    }

    pub fn with_respawn_results(mut self, results: &[bool]) -> Self {
        self.respawn_results.extend(results);
        self
    }
}

impl Target for MockTarget {
    fn execute_one_iteration(&mut self, state: &mut RunState, payload: &[u8]) {
        self.executed.push(payload.to_vec());
        state.pending_status = self.status_on_execute;
    }

    fn respawn_or_attach(&mut self, state: &mut RunState) -> Result<(), TargetError> {
        self.respawn_calls += 1;
        if self.respawn_results.pop_front().unwrap_or(true) {
            state.target_pid = Some(self.next_pid);
            self.next_pid += 1;
            Ok(())
        } else {
            Err(TargetError::NoSuchProcess(self.next_pid))
        }
    }

    fn teardown(&mut self, state: &mut RunState) {
        self.teardown_calls += 1;
        state.target_pid = None;
    }

    fn is_alive(&mut self, _state: &RunState) -> bool {
        self.liveness.pop_front().unwrap_or(true)
    }
}
