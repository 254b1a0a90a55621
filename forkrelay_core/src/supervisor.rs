use crate::channel::ControlChannel;
use crate::forkserver::ForkserverError;
use crate::protocol::{ErrorCode, FAULT_STATUS, WordKind};
use crate::state::{ExecMode, RunState};
use crate::target::Target;
use log::{error, info, warn};
use std::io::{Read, Write};

/// Checks that the target survived the iteration and recovers it if it did
/// not.
///
/// A dead target turns the pending status into [`FAULT_STATUS`]. In spawn
/// mode the target is respawned exactly once; if that fails, or in attach
/// mode, the fuzzer gets an error word, the target is torn down and the run
/// is over.
pub fn check_target<R, W, T>(
    control: &mut ControlChannel<R, W>,
    target: &mut T,
    state: &mut RunState,
) -> Result<(), ForkserverError>
where
    R: Read,
    W: Write,
    T: Target + ?Sized,
{
    if target.is_alive(state) {
        return Ok(());
    }

    let pid = state.target_pid;
    warn!("Target process (pid {pid:?}) is not there anymore. Crash?");
    state.pending_status = FAULT_STATUS;

    match state.exec_mode() {
        ExecMode::Spawn => match target.respawn_or_attach(state) {
            Ok(()) => {
                info!("Respawned target as pid {:?}", state.target_pid);
                Ok(())
            }
            Err(source) => {
                error!("Failed to respawn target after crash of pid {pid:?}: {source}");
                send_error(control, ErrorCode::TargetCrashed);
                target.teardown(state);
                Err(ForkserverError::RecoveryFailed { pid, source })
            }
        },
        ExecMode::Attach => {
            error!("Target process (pid {pid:?}) died in attach mode, cannot continue");
            send_error(control, ErrorCode::TargetNoAttach);
            target.teardown(state);
            Err(ForkserverError::TargetUnavailable { pid })
        }
    }
}

/// Reports the pending status for the iteration and resets it.
pub fn report_status<R: Read, W: Write>(
    control: &mut ControlChannel<R, W>,
    state: &mut RunState,
) -> Result<(), ForkserverError> {
    control.write_word(WordKind::ExecutionStatusOut, state.pending_status as u32)?;
    state.pending_status = 0;
    Ok(())
}

/// Best effort: a failure here is logged and otherwise ignored.
pub fn send_error<R: Read, W: Write>(control: &mut ControlChannel<R, W>, code: ErrorCode) {
    if let Err(e) = control.write_word(WordKind::ErrorStatus, code.to_word()) {
        warn!("Error while sending error {} to fuzzer: {e}", code.code());
    }
}
