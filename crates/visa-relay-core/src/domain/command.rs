//! Client commands and their query/directive classification.

use std::fmt;

/// Whether a command expects the instrument to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// The command ends in `?`; exactly one bounded read follows the write.
    Query,
    /// Any other command; no read is performed.
    Directive,
}

impl CommandKind {
    /// Returns `true` for [`CommandKind::Query`].
    pub fn expects_reply(self) -> bool {
        matches!(self, CommandKind::Query)
    }
}

/// One line of client bytes with its terminator removed.
///
/// The bytes are kept exactly as received, so text that is not valid UTF-8
/// still reaches the instrument unchanged.
///
/// Invariant: the bytes are never empty and never consist solely of ASCII
/// whitespace.  Blank lines are rejected by [`Command::new`] so that they can
/// never reach the instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command(Vec<u8>);

impl Command {
    /// Builds a command from already-unterminated bytes.
    ///
    /// Returns `None` when `bytes` is empty or whitespace only.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Option<Self> {
        let bytes = bytes.into();
        if bytes.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(Self(bytes))
        }
    }

    /// Returns the command bytes exactly as received (minus the terminator).
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Classifies the command by its final byte.
    ///
    /// Only the very last byte counts: `"MEAS:VOLT? "` (trailing space) is a
    /// directive.
    pub fn kind(&self) -> CommandKind {
        if self.0.last() == Some(&b'?') {
            CommandKind::Query
        } else {
            CommandKind::Directive
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
