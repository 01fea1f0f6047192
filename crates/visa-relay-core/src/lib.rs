//! # visa-relay-core
//!
//! Shared library for VISA-Relay containing the instrument transport
//! capability traits, startup discovery (directory + selector), the
//! long-lived instrument session, and the line-oriented relay protocol.
//!
//! This crate performs no network I/O and owns no threads.  Everything that
//! touches a socket or a runtime lives in `visa-relay-server`.
//!
//! # Architecture overview (for beginners)
//!
//! VISA-Relay exposes one bench instrument (an oscilloscope, a power supply,
//! a DMM...) to the network.  A client opens a TCP connection, sends one SCPI
//! command terminated by `\n`, and, if the command was a query, receives the
//! instrument's answer on the same connection.
//!
//! This crate defines:
//!
//! - **`transport`** – The capability the relay consumes: a
//!   [`ResourceManager`] that enumerates and opens instruments, and an
//!   [`InstrumentIo`] handle that writes and reads raw bytes.  A vendor VISA
//!   library, a raw SCPI socket, or the in-memory [`transport::mock`] backend
//!   all plug in behind these traits.
//!
//! - **`discovery`** – The Instrument Directory (enumerate + identify) and the
//!   Instrument Selector (first case-insensitive substring match wins).
//!
//! - **`session`** – The single [`InstrumentSession`] that carries all
//!   command traffic for the lifetime of the process.
//!
//! - **`protocol`** – Line framing for client commands and encoding of the
//!   one-line reply sent back to the client.
//!
//! - **`domain`** – Plain value types shared by everything above.

pub mod discovery;
pub mod domain;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export the most-used types at the crate root so callers can write
// `visa_relay_core::InstrumentSession` instead of the full module path.
pub use discovery::{select, DiscoveredInstrument, InstrumentDirectory};
pub use domain::{Command, CommandKind, ResourceDescriptor};
pub use protocol::{RelayFailure, RelayOutcome, ReplyFormat};
pub use session::{InstrumentSession, SessionError, DEFAULT_MAX_RESPONSE_BYTES};
pub use transport::{InstrumentIo, ResourceManager, TransportError};
