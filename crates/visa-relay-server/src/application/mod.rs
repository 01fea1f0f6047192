//! Application layer use cases for the relay server.
//!
//! - **`open_instrument`** – Runs startup discovery (or takes an explicit
//!   resource) and opens the one [`visa_relay_core::InstrumentSession`] the
//!   process will use.
//!
//! - **`relay`** – The per-connection Relay Protocol Handler: read one line,
//!   forward it, branch on query vs. directive, write one reply.  It talks to
//!   the instrument only through the [`relay::CommandExecutor`] seam, so it
//!   can be tested against in-memory streams without a session worker.

pub mod open_instrument;
pub mod relay;
