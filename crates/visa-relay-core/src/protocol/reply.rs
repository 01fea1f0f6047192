//! Relay outcomes and their one-line encoding.
//!
//! Two encodings are available:
//!
//! - [`ReplyFormat::Text`] – the legacy protocol.  Success and failure share
//!   the same text channel; clients tell them apart by matching the fixed
//!   literals exported from this module.
//! - [`ReplyFormat::Json`] – a one-line envelope with an explicit status:
//!
//! ```text
//! {"status":"ok","kind":"response","payload":"KEYSIGHT,34465A,...\n"}
//! {"status":"ok","kind":"accepted","payload":"Command sent"}
//! {"status":"error","kind":"read","payload":"Error reading response"}
//! ```
//!
//! Both end in exactly one `\n`.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Acknowledgement for directives.  Means "sent", not "verified".
pub const ACK_TEXT: &str = "Command sent";
/// The instrument accepted a query but its response could not be read.
pub const READ_ERROR_TEXT: &str = "Error reading response";
/// The instrument rejected the command outright.
pub const WRITE_ERROR_TEXT: &str = "Error writing command";
/// The command line exceeded the configured bound.
pub const COMMAND_TOO_LONG_TEXT: &str = "Error: command too long";
/// A network error interrupted the exchange.
pub const NETWORK_ERROR_TEXT: &str = "Error: connection failure";

/// Why a relay exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayFailure {
    Write,
    Read,
    CommandTooLong,
    Network,
}

impl RelayFailure {
    /// The fixed diagnostic literal sent to the client.
    pub fn text(self) -> &'static str {
        match self {
            RelayFailure::Write => WRITE_ERROR_TEXT,
            RelayFailure::Read => READ_ERROR_TEXT,
            RelayFailure::CommandTooLong => COMMAND_TOO_LONG_TEXT,
            RelayFailure::Network => NETWORK_ERROR_TEXT,
        }
    }

    fn kind(self) -> &'static str {
        match self {
            RelayFailure::Write => "write",
            RelayFailure::Read => "read",
            RelayFailure::CommandTooLong => "command_too_long",
            RelayFailure::Network => "network",
        }
    }
}

/// The single result of relaying one non-empty command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Raw bytes read from the instrument, untrimmed.
    Response(Vec<u8>),
    /// A directive was written.
    Accepted,
    /// The exchange failed.
    Failed(RelayFailure),
}

impl RelayOutcome {
    /// Encodes the outcome as one reply line, terminator included.
    pub fn encode(&self, format: ReplyFormat) -> Vec<u8> {
        match format {
            ReplyFormat::Text => self.encode_text(),
            ReplyFormat::Json => self.encode_json(),
        }
    }

    fn encode_text(&self) -> Vec<u8> {
        let mut line = match self {
            RelayOutcome::Response(bytes) => bytes.clone(),
            RelayOutcome::Accepted => ACK_TEXT.as_bytes().to_vec(),
            RelayOutcome::Failed(failure) => failure.text().as_bytes().to_vec(),
        };
        line.push(b'\n');
        line
    }

    fn encode_json(&self) -> Vec<u8> {
        let envelope = match self {
            RelayOutcome::Response(bytes) => ReplyEnvelope {
                status: "ok",
                kind: "response",
                payload: String::from_utf8_lossy(bytes),
            },
            RelayOutcome::Accepted => ReplyEnvelope {
                status: "ok",
                kind: "accepted",
                payload: Cow::Borrowed(ACK_TEXT),
            },
            RelayOutcome::Failed(failure) => ReplyEnvelope {
                status: "error",
                kind: failure.kind(),
                payload: Cow::Borrowed(failure.text()),
            },
        };
        // Serialising a struct of strings cannot fail; fall back to the
        // text encoding rather than sending nothing.
        match serde_json::to_vec(&envelope) {
            Ok(mut line) => {
                line.push(b'\n');
                line
            }
            Err(_) => self.encode_text(),
        }
    }
}

#[derive(Serialize)]
struct ReplyEnvelope<'a> {
    status: &'static str,
    kind: &'static str,
    payload: Cow<'a, str>,
}

/// Encoding used for reply lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for ReplyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyFormat::Text => f.write_str("text"),
            ReplyFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for ReplyFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ReplyFormat::Text),
            "json" => Ok(ReplyFormat::Json),
            other => Err(format!("unknown reply format '{other}' (expected text or json)")),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
