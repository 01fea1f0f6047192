//! Extracting a [`Command`] from one received line.

use crate::domain::Command;

/// Longest accepted command line, terminator excluded.
pub const DEFAULT_MAX_COMMAND_BYTES: usize = 4096;

/// Removes every trailing `\r` and `\n` byte.
pub fn strip_terminator(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| *b != b'\r' && *b != b'\n')
        .map_or(0, |i| i + 1);
    &line[..end]
}

/// Turns a received line into a [`Command`].
///
/// Returns `None` for lines that are empty or whitespace once the
/// terminator is stripped; those must never reach the instrument.
/// All other bytes are kept as received, whether or not they are UTF-8.
pub fn parse_line(line: &[u8]) -> Option<Command> {
    Command::new(strip_terminator(line))
}
