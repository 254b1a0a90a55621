use crate::forkserver::ForkserverError;
use crate::protocol::WordKind;
use log::debug;
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{FromRawFd, RawFd};

/// The pair of byte channels carrying 4-byte protocol words between the
/// relay and the fuzzer: one read end and one write end.
///
/// Words are host-native endian. A transfer that does not move exactly four
/// bytes in one call is a synchronisation loss and is reported as an error,
/// never retried.
pub struct ControlChannel<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> ControlChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn read_word(&mut self, kind: WordKind) -> Result<u32, ForkserverError> {
        let mut buf = [0u8; 4];
        let rlen = self
            .reader
            .read(&mut buf)
            .map_err(|source| ForkserverError::Io {
                kind,
                direction: kind.direction(),
                source,
            })?;
        if rlen != buf.len() {
            return Err(ForkserverError::ShortRead { kind, len: rlen });
        }
        let val = u32::from_ne_bytes(buf);
        debug!("Received {kind}: 0x{val:08x}");
        Ok(val)
    }

    pub fn write_word(&mut self, kind: WordKind, val: u32) -> Result<(), ForkserverError> {
        let buf = val.to_ne_bytes();
        let io_err = |source: std::io::Error| ForkserverError::Io {
            kind,
            direction: kind.direction(),
            source,
        };
        let slen = self.writer.write(&buf).map_err(io_err)?;
        if slen != buf.len() {
            return Err(ForkserverError::ShortWrite { kind, len: slen });
        }
        self.writer.flush().map_err(io_err)?;
        debug!("Sent {kind}: 0x{val:08x}");
        Ok(())
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl ControlChannel<File, File> {
    /// Opens the conventional descriptor pair: `read_fd` for words from the
    /// fuzzer and `read_fd + 1` for words to it.
    ///
    /// # Safety
    ///
    /// Both descriptors must be open and not owned by anything else in this
    /// process; the returned channel closes them on drop.
    pub unsafe fn from_raw_fds(read_fd: RawFd) -> Self {
        let (reader, writer) = unsafe {
            (
                File::from_raw_fd(read_fd),
                File::from_raw_fd(read_fd + 1),
            )
        };
        Self::new(reader, writer)
    }
}
