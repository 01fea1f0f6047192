//! Relay Protocol Handler: one command, one reply, per connection.
//!
//! The handler runs exactly this sequence and then returns, leaving the
//! caller to close the connection:
//!
//! 1. Read bytes until `\n`.  A peer that closes first is a normal
//!    disconnect: nothing is sent to the instrument or back to the peer.
//! 2. Strip trailing `\r`/`\n`.  A blank line is discarded silently.
//! 3. Write the command (plus one `\n`) to the instrument.
//! 4. If the command ends in `?`, read one bounded response; otherwise the
//!    outcome is the fixed acknowledgement.  A failed write skips the read.
//! 5. Write the reply line.
//!
//! Network errors anywhere in 1–5 are caught here.  A best-effort diagnostic
//! line is attempted and then the connection is abandoned; nothing
//! propagates to the accept loop.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use visa_relay_core::protocol::{parse_line, DEFAULT_MAX_COMMAND_BYTES};
use visa_relay_core::{Command, CommandKind, RelayFailure, RelayOutcome, ReplyFormat, SessionError};

/// The handler's view of the instrument session.
///
/// Implementations must guarantee that the write and the optional read of
/// one call are never interleaved with another call's traffic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Writes `command` and, for [`CommandKind::Query`], reads one response.
    ///
    /// Returns `Ok(None)` for directives.
    async fn execute(
        &self,
        command: Command,
        kind: CommandKind,
    ) -> Result<Option<Vec<u8>>, SessionError>;
}

/// Per-connection protocol settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOptions {
    pub max_command_bytes: usize,
    pub reply_format: ReplyFormat,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            max_command_bytes: DEFAULT_MAX_COMMAND_BYTES,
            reply_format: ReplyFormat::Text,
        }
    }
}

/// What happened on one connection.  Used for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// The peer closed before sending a complete line.
    Disconnected,
    /// The line was blank; nothing was relayed.
    Discarded,
    /// A reply line was written.
    Replied(RelayOutcome),
    /// A network error aborted the exchange.
    Aborted,
}

enum LineRead {
    Line(Vec<u8>),
    Closed,
    TooLong,
}

/// Serves one connection to completion.
///
/// Never returns an error: every failure is mapped to a
/// [`ConnectionOutcome`] so the accept loop keeps running.
pub async fn handle_connection<S, E>(
    stream: &mut S,
    executor: &E,
    options: &RelayOptions,
) -> ConnectionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: CommandExecutor + ?Sized,
{
    match relay_once(stream, executor, options).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("connection aborted by network error: {e}");
            let diagnostic = RelayOutcome::Failed(RelayFailure::Network).encode(options.reply_format);
            if let Err(e) = stream.write_all(&diagnostic).await {
                debug!("could not deliver network diagnostic: {e}");
            }
            ConnectionOutcome::Aborted
        }
    }
}

async fn relay_once<S, E>(
    stream: &mut S,
    executor: &E,
    options: &RelayOptions,
) -> std::io::Result<ConnectionOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: CommandExecutor + ?Sized,
{
    let line = match read_command_line(stream, options.max_command_bytes).await? {
        LineRead::Line(line) => line,
        LineRead::Closed => {
            debug!("peer closed before sending a command");
            return Ok(ConnectionOutcome::Disconnected);
        }
        LineRead::TooLong => {
            warn!("command exceeds {} bytes; rejected", options.max_command_bytes);
            let outcome = RelayOutcome::Failed(RelayFailure::CommandTooLong);
            write_reply(stream, &outcome, options.reply_format).await?;
            return Ok(ConnectionOutcome::Replied(outcome));
        }
    };

    let Some(command) = parse_line(&line) else {
        debug!("blank command discarded");
        return Ok(ConnectionOutcome::Discarded);
    };

    let kind = command.kind();
    debug!("relaying {kind:?} \"{command}\"");

    let outcome = match executor.execute(command, kind).await {
        Ok(Some(response)) => RelayOutcome::Response(response),
        Ok(None) => RelayOutcome::Accepted,
        Err(SessionError::Read(e)) => {
            warn!("instrument read failed: {e}");
            RelayOutcome::Failed(RelayFailure::Read)
        }
        Err(e) => {
            warn!("instrument write failed: {e}");
            RelayOutcome::Failed(RelayFailure::Write)
        }
    };

    write_reply(stream, &outcome, options.reply_format).await?;
    Ok(ConnectionOutcome::Replied(outcome))
}

/// Reads up to and including the first `\n`, never buffering more than
/// `limit` bytes of command text.
///
/// Bytes after the first `\n` may be pulled into the read buffer and are
/// dropped with it: a connection carries exactly one command.
async fn read_command_line<S>(stream: &mut S, limit: usize) -> std::io::Result<LineRead>
where
    S: AsyncRead + Unpin,
{
    // One extra byte leaves room for the terminator of a maximal command.
    let mut reader = BufReader::new(stream).take(limit as u64 + 1);
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line).await?;

    if line.last() == Some(&b'\n') {
        Ok(LineRead::Line(line))
    } else if line.len() > limit {
        Ok(LineRead::TooLong)
    } else {
        Ok(LineRead::Closed)
    }
}

async fn write_reply<S>(stream: &mut S, outcome: &RelayOutcome, format: ReplyFormat) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&outcome.encode(format)).await?;
    stream.flush().await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
