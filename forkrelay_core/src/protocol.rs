use std::fmt;

/// Highest forkserver protocol revision this relay speaks.
pub const FS_VERSION: u32 = 1;
/// Base of the version magic; the low byte carries the revision.
pub const FS_MAGIC_BASE: u32 = 0x4146_4C00;
/// `FS_MAGIC_BASE | FS_VERSION`.
pub const FS_NEW_MAGIC: u32 = FS_MAGIC_BASE | FS_VERSION;
/// The reply the fuzzer must send back after receiving the magic.
pub const FS_NEW_MAGIC_REPLY: u32 = FS_NEW_MAGIC ^ 0xFFFF_FFFF;

pub const FS_OPT_ENABLED: u32 = 0x8000_0001;
pub const FS_OPT_MAPSIZE: u32 = 0x4000_0000;
/// Declared by the protocol, never asserted by this relay.
pub const FS_OPT_SHDMEM_FUZZ: u32 = 0x0100_0000;
/// Declared by the protocol, never asserted by this relay.
pub const FS_OPT_AUTODICT: u32 = 0x1000_0000;

/// The options word sent during the handshake.
pub const FS_OPTIONS: u32 = FS_OPT_ENABLED | FS_OPT_MAPSIZE;

pub const FS_OPT_ERROR: u32 = 0xF800_008F;

/// Placeholder child pid reported when a test case starts executing.
pub const DUMMY_CHILD_PID: u32 = 1;

/// Status reported for an iteration after which the target was found dead.
pub const FAULT_STATUS: i32 = nix::sys::signal::Signal::SIGSEGV as i32;

/// Reason codes carried by out-of-band error words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The target died and could not be respawned.
    TargetCrashed,
    /// The target died while attached; there is nothing to respawn.
    TargetNoAttach,
}

impl ErrorCode {
    pub fn code(self) -> u32 {
        match self {
            ErrorCode::TargetCrashed => 101,
            ErrorCode::TargetNoAttach => 102,
        }
    }

    /// Encodes the code into an error word the fuzzer can tell apart from
    /// an ordinary execution status.
    pub fn to_word(self) -> u32 {
        error_word(self.code())
    }
}

pub fn error_word(code: u32) -> u32 {
    FS_OPT_ERROR | ((code & 0x0000_FFFF) << 8)
}

/// The semantic tag of a word on the control channel. Every tag has exactly
/// one legal position in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordKind {
    VersionMagic,
    VersionReply,
    OptionsBitfield,
    MapSize,
    TestcaseStatusIn,
    DummyChildPid,
    ExecutionStatusOut,
    ErrorStatus,
}

impl WordKind {
    /// The direction this word travels, seen from the relay.
    pub fn direction(self) -> Direction {
        match self {
            WordKind::VersionReply | WordKind::TestcaseStatusIn => Direction::Read,
            _ => Direction::Write,
        }
    }
}

impl fmt::Display for WordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WordKind::VersionMagic => "version magic",
            WordKind::VersionReply => "version reply",
            WordKind::OptionsBitfield => "options",
            WordKind::MapSize => "map size",
            WordKind::TestcaseStatusIn => "testcase status",
            WordKind::DummyChildPid => "child pid",
            WordKind::ExecutionStatusOut => "execution status",
            WordKind::ErrorStatus => "error status",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => f.write_str("read"),
            Direction::Write => f.write_str("write"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_constants_match_wire_values() {
        assert_eq!(FS_NEW_MAGIC, 0x4146_4C01);
        assert_eq!(FS_NEW_MAGIC_REPLY, 0xBEB9_B3FE);
        assert_eq!(FS_OPTIONS, 0xC000_0001);
        assert_eq!(FS_OPTIONS & (FS_OPT_AUTODICT | FS_OPT_SHDMEM_FUZZ), 0);
    }

    #[test]
    fn error_words_keep_code_in_second_byte() {
        assert_eq!(ErrorCode::TargetCrashed.to_word(), 0xF800_658F);
        assert_eq!(ErrorCode::TargetNoAttach.to_word(), 0xF800_668F);
        assert_eq!(error_word(0x1_0065), error_word(0x65));
    }

    #[test]
    fn fault_status_is_sigsegv() {
        assert_eq!(FAULT_STATUS, 11);
    }

    #[test]
    fn only_reply_and_testcase_status_are_read() {
        assert_eq!(WordKind::VersionReply.direction(), Direction::Read);
        assert_eq!(WordKind::TestcaseStatusIn.direction(), Direction::Read);
        assert_eq!(WordKind::MapSize.direction(), Direction::Write);
        assert_eq!(WordKind::ErrorStatus.direction(), Direction::Write);
    }
}
