//! Infrastructure layer for visa-relay-server.
//!
//! Everything that touches the outside world lives here: the TCP listener,
//! the socket-backed instrument transport, the dedicated session thread and
//! the TOML configuration file.
//!
//! # What does NOT belong here?
//!
//! - Instrument selection rules (application layer)
//! - Line parsing and reply encoding (`visa_relay_core::protocol`)

pub mod config;
pub mod session_worker;
pub mod socket_transport;
pub mod tcp_server;
pub mod transport;

pub use session_worker::{spawn_session_worker, SessionHandle, SessionWorker};
pub use tcp_server::{bind_listener, run_server, ServerOptions};
pub use transport::open_resource_manager;
