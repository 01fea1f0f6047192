//! visa-relay-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the server do? (for beginners)
//!
//! At startup it opens the instrument transport, finds the one instrument
//! whose `*IDN?` string contains the configured search key, and opens a
//! session to it.  It then listens on a TCP port.  Each client connection
//! carries exactly one SCPI command line; the server forwards it to the
//! instrument, reads the answer if the command ends in `?`, writes one reply
//! line back, and closes the connection.
//!
//! ```text
//! main()
//!  └─ open_resource_manager()        -- transport backend from config
//!  └─ open_selected_instrument()     -- discovery + selection + session
//!  └─ spawn_session_worker()         -- single owner of the session
//!  └─ run_server()                   -- accept loop
//!       └─ handle_connection()       -- one command, one reply
//! ```

/// Application layer: startup discovery and the relay protocol handler.
pub mod application;

/// Infrastructure layer: config file, transports, session worker, TCP server.
pub mod infrastructure;
