use crate::channel::ControlChannel;
use crate::forkserver::ForkserverError;
use crate::protocol::{DUMMY_CHILD_PID, WordKind};
use log::{debug, info};
use std::io::{Read, Write};

/// Outcome of waiting for the next test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intake {
    /// A test case of this many bytes is in the buffer and the fuzzer has
    /// been told execution started. May be zero.
    Testcase(usize),
    /// The fuzzer closed the control channel; no more work will come.
    Finished,
}

/// Waits for the fuzzer's go token, reads the payload from `input` into
/// `buf` and reports the placeholder child pid.
///
/// A short or empty read of the token means the fuzzer is gone and yields
/// [`Intake::Finished`]. Failing to read the payload or to report the pid is
/// an error.
pub fn next_testcase<R: Read, W: Write, In: Read>(
    control: &mut ControlChannel<R, W>,
    input: &mut In,
    buf: &mut [u8],
) -> Result<Intake, ForkserverError> {
    match control.read_word(WordKind::TestcaseStatusIn) {
        Ok(_) => {}
        Err(ForkserverError::ShortRead { len, .. }) => {
            info!("Control channel closed by fuzzer ({len} byte read)");
            return Ok(Intake::Finished);
        }
        Err(e) => return Err(e),
    }

    let len = input.read(buf).map_err(ForkserverError::InputRead)?;
    debug!("Read {len} byte test case");

    control.write_word(WordKind::DummyChildPid, DUMMY_CHILD_PID)?;
    Ok(Intake::Testcase(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    struct FailingInput;
    impl Read for FailingInput {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("input gone"))
        }
    }

    struct ClosedWriter;
    impl Write for ClosedWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Ok(0)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn go_token() -> Cursor<Vec<u8>> {
        Cursor::new(0u32.to_ne_bytes().to_vec())
    }

    #[test]
    fn reads_payload_and_reports_dummy_pid() {
        let mut control = ControlChannel::new(go_token(), Vec::new());
        let mut input = Cursor::new(b"0123456789".to_vec());
        let mut buf = [0u8; 64];

        let intake = next_testcase(&mut control, &mut input, &mut buf).unwrap();

        assert_eq!(intake, Intake::Testcase(10));
        assert_eq!(&buf[..10], b"0123456789");
        assert_eq!(control.writer(), &1u32.to_ne_bytes().to_vec());
    }

    #[test]
    fn payload_is_capped_at_buffer_size() {
        let mut control = ControlChannel::new(go_token(), Vec::new());
        let mut input = Cursor::new(vec![0xAA; 32]);
        let mut buf = [0u8; 8];

        let intake = next_testcase(&mut control, &mut input, &mut buf).unwrap();
        assert_eq!(intake, Intake::Testcase(8));
        assert_eq!(input.position(), 8);
    }

    #[test]
    fn closed_control_channel_finishes_without_touching_input() {
        let mut control = ControlChannel::new(Cursor::new(Vec::new()), Vec::new());
        let mut input = Cursor::new(b"unused".to_vec());
        let mut buf = [0u8; 8];

        let intake = next_testcase(&mut control, &mut input, &mut buf).unwrap();
        assert_eq!(intake, Intake::Finished);
        assert_eq!(input.position(), 0);
        assert!(control.writer().is_empty());
    }

    #[test]
    fn empty_payload_is_not_end_of_work() {
        let mut control = ControlChannel::new(go_token(), Vec::new());
        let mut input = Cursor::new(Vec::new());
        let mut buf = [0u8; 8];

        let intake = next_testcase(&mut control, &mut input, &mut buf).unwrap();
        assert_eq!(intake, Intake::Testcase(0));
        assert_eq!(control.writer().len(), 4);
    }

    #[test]
    fn input_error_is_reported_before_pid() {
        let mut control = ControlChannel::new(go_token(), Vec::new());
        let mut buf = [0u8; 8];

        let result = next_testcase(&mut control, &mut FailingInput, &mut buf);
        assert!(matches!(result, Err(ForkserverError::InputRead(_))));
        assert!(control.writer().is_empty());
    }

    #[test]
    fn failed_child_pid_write_is_an_error() {
        let mut control = ControlChannel::new(go_token(), ClosedWriter);
        let mut input = Cursor::new(b"abc".to_vec());
        let mut buf = [0u8; 8];

        let result = next_testcase(&mut control, &mut input, &mut buf);

        assert!(matches!(
            result,
            Err(ForkserverError::ShortWrite {
                kind: WordKind::DummyChildPid,
                len: 0
            })
        ));
        assert_eq!(input.position(), 3);
    }
}
