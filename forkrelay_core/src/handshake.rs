use crate::channel::ControlChannel;
use crate::forkserver::ForkserverError;
use crate::protocol::{FS_NEW_MAGIC, FS_NEW_MAGIC_REPLY, FS_OPTIONS, WordKind};
use log::{error, info};
use std::io::{Read, Write};

/// Runs the version/options exchange with the fuzzer. Must succeed exactly
/// once before any test case is processed.
///
/// The relay announces its magic, expects the XORed magic back, then sends
/// the options word, the coverage map size and the magic again as the final
/// confirmation. Auto-dictionary and shared-memory test cases are never
/// offered.
pub fn negotiate<R: Read, W: Write>(
    control: &mut ControlChannel<R, W>,
    map_size: u32,
) -> Result<(), ForkserverError> {
    control.write_word(WordKind::VersionMagic, FS_NEW_MAGIC)?;

    let reply = control.read_word(WordKind::VersionReply)?;
    if reply != FS_NEW_MAGIC_REPLY {
        error!(
            "Fuzzer reply mismatch: got 0x{reply:08x}, expected 0x{FS_NEW_MAGIC_REPLY:08x}"
        );
        return Err(ForkserverError::HandshakeMismatch {
            expected: FS_NEW_MAGIC_REPLY,
            actual: reply,
        });
    }

    control.write_word(WordKind::OptionsBitfield, FS_OPTIONS)?;
    control.write_word(WordKind::MapSize, map_size)?;
    control.write_word(WordKind::VersionMagic, FS_NEW_MAGIC)?;

    info!("Forkserver handshake complete (map size {map_size})");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    /// Accepts a fixed number of words, then reports zero bytes written.
    struct LimitedWriter {
        written: Vec<u8>,
        accepted_words: usize,
    }

    impl Write for LimitedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.accepted_words == 0 {
                return Ok(0);
            }
            self.accepted_words -= 1;
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn words(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn sends_magic_options_map_size_and_magic() {
        let reply = 0xBEB9_B3FEu32.to_ne_bytes().to_vec();
        let mut control = ControlChannel::new(Cursor::new(reply), Vec::new());

        negotiate(&mut control, 65536).unwrap();

        assert_eq!(
            words(control.writer()),
            vec![0x4146_4C01, 0xC000_0001, 65536, 0x4146_4C01]
        );
    }

    #[test]
    fn wrong_reply_aborts_after_magic() {
        let reply = 0x4146_4C01u32.to_ne_bytes().to_vec();
        let mut control = ControlChannel::new(Cursor::new(reply), Vec::new());

        match negotiate(&mut control, 65536) {
            Err(ForkserverError::HandshakeMismatch { expected, actual }) => {
                assert_eq!(expected, 0xBEB9_B3FE);
                assert_eq!(actual, 0x4146_4C01);
            }
            other => panic!("Expected HandshakeMismatch, got {other:?}"),
        }
        assert_eq!(words(control.writer()), vec![0x4146_4C01]);
    }

    #[test]
    fn missing_reply_fails_without_options() {
        let mut control = ControlChannel::new(Cursor::new(Vec::new()), Vec::new());

        assert!(matches!(
            negotiate(&mut control, 65536),
            Err(ForkserverError::ShortRead {
                kind: WordKind::VersionReply,
                len: 0
            })
        ));
        assert_eq!(words(control.writer()), vec![0x4146_4C01]);
    }

    #[test]
    fn short_options_write_stops_before_final_magic() {
        let reply = 0xBEB9_B3FEu32.to_ne_bytes().to_vec();
        let writer = LimitedWriter {
            written: Vec::new(),
            accepted_words: 1,
        };
        let mut control = ControlChannel::new(Cursor::new(reply), writer);

        assert!(matches!(
            negotiate(&mut control, 65536),
            Err(ForkserverError::ShortWrite {
                kind: WordKind::OptionsBitfield,
                len: 0
            })
        ));
        assert_eq!(words(&control.writer().written), vec![0x4146_4C01]);
    }

    #[test]
    fn short_map_size_write_stops_before_final_magic() {
        let reply = 0xBEB9_B3FEu32.to_ne_bytes().to_vec();
        let writer = LimitedWriter {
            written: Vec::new(),
            accepted_words: 2,
        };
        let mut control = ControlChannel::new(Cursor::new(reply), writer);

        assert!(matches!(
            negotiate(&mut control, 65536),
            Err(ForkserverError::ShortWrite {
                kind: WordKind::MapSize,
                ..
            })
        ));
        assert_eq!(
            words(&control.writer().written),
            vec![0x4146_4C01, 0xC000_0001]
        );
    }
}
