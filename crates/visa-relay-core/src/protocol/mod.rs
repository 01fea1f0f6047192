//! Line-oriented relay protocol.
//!
//! Wire format, both directions: one line of text terminated by `\n`.
//!
//! ```text
//! client → relay   "*IDN?\n"
//! relay  → client  "TEKTRONIX,MSO24,C012345,CF:91.1CT FV:2.0.3\n\n"
//!                   └─ raw instrument bytes ─────────────┘ └ relay terminator
//! ```
//!
//! Exactly one command and one reply per connection.  The relay closes the
//! connection after writing the reply.

pub mod framing;
pub mod reply;

pub use framing::{parse_line, strip_terminator, DEFAULT_MAX_COMMAND_BYTES};
pub use reply::{
    RelayFailure, RelayOutcome, ReplyFormat, ACK_TEXT, COMMAND_TOO_LONG_TEXT, NETWORK_ERROR_TEXT,
    READ_ERROR_TEXT, WRITE_ERROR_TEXT,
};
