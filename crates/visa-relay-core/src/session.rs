//! The long-lived Instrument Session.
//!
//! Exactly one [`InstrumentSession`] exists per process.  It is opened once
//! after selection succeeds and closed once at shutdown.  A failed write or
//! read is reported to the caller and leaves the session open and usable:
//! only [`InstrumentSession::close`] ends it.
//!
//! # At most one command in flight
//!
//! Overlapping writes and reads on most instrument transports silently
//! corrupt request/response pairing.  [`InstrumentSession::transact`] takes
//! `&mut self` and performs the write and (for queries) the read as a single
//! call, so whoever owns the session serialises traffic by construction.

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Command, CommandKind, ResourceDescriptor};
use crate::transport::{InstrumentIo, ResourceManager, TransportError};

/// Default bound for a single response read.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 2048;

/// Error type for session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The instrument handle could not be opened.
    #[error("failed to open instrument {descriptor}: {source}")]
    Open {
        descriptor: ResourceDescriptor,
        #[source]
        source: TransportError,
    },

    /// The instrument rejected the command.
    #[error("write failed: {0}")]
    Write(#[source] TransportError),

    /// The query response could not be read.
    #[error("read failed: {0}")]
    Read(#[source] TransportError),

    /// Closing the handle failed.
    #[error("close failed: {0}")]
    Close(#[source] TransportError),

    /// The session is no longer reachable (its owner has shut down).
    #[error("instrument session unavailable")]
    Unavailable,
}

/// One open handle bound to the selected instrument.
pub struct InstrumentSession {
    descriptor: ResourceDescriptor,
    io: Box<dyn InstrumentIo>,
    max_response_bytes: usize,
}

impl std::fmt::Debug for InstrumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("descriptor", &self.descriptor)
            .field("max_response_bytes", &self.max_response_bytes)
            .finish_non_exhaustive()
    }
}

impl InstrumentSession {
    /// Opens the session on `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Open`] if the transport refuses the handle.
    pub fn open(
        manager: &mut dyn ResourceManager,
        descriptor: ResourceDescriptor,
        max_response_bytes: usize,
    ) -> Result<Self, SessionError> {
        let io = manager.open(&descriptor).map_err(|source| SessionError::Open {
            descriptor: descriptor.clone(),
            source,
        })?;
        info!("instrument session opened on {descriptor}");
        Ok(Self {
            descriptor,
            io,
            max_response_bytes,
        })
    }

    /// The descriptor this session is bound to.
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// The bound applied to every response read.
    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }

    /// Sends `command` followed by exactly one `\n`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Write`] carrying the transport status.
    pub fn write(&mut self, command: &Command) -> Result<(), SessionError> {
        let framed = frame(command.as_bytes());
        self.io.write(&framed).map_err(SessionError::Write)?;
        debug!("wrote {} bytes to {}", framed.len(), self.descriptor);
        Ok(())
    }

    /// Reads one response of at most `max_response_bytes`.
    ///
    /// Longer responses are truncated, not rejected; the remainder stays in
    /// the instrument's output buffer.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Read`] carrying the transport status.
    pub fn read(&mut self) -> Result<Vec<u8>, SessionError> {
        let mut bytes = self
            .io
            .read(self.max_response_bytes)
            .map_err(SessionError::Read)?;
        bytes.truncate(self.max_response_bytes);
        debug!("read {} bytes from {}", bytes.len(), self.descriptor);
        Ok(bytes)
    }

    /// Writes `command` and, if `kind` is a query, reads its response.
    ///
    /// A failed write short-circuits: no read is attempted even for queries.
    /// Returns `Ok(None)` for directives.
    pub fn transact(
        &mut self,
        command: &Command,
        kind: CommandKind,
    ) -> Result<Option<Vec<u8>>, SessionError> {
        self.write(command)?;
        match kind {
            CommandKind::Query => self.read().map(Some),
            CommandKind::Directive => Ok(None),
        }
    }

    /// Closes the instrument handle, consuming the session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Close`] if the transport reports a failure;
    /// the handle is released regardless.
    pub fn close(mut self) -> Result<(), SessionError> {
        let result = self.io.close().map_err(SessionError::Close);
        info!("instrument session on {} closed", self.descriptor);
        result
    }
}

/// Appends a single `\n` unless the text is already terminated.
fn frame(bytes: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(bytes.len() + 1);
    framed.extend_from_slice(bytes);
    if bytes.last() != Some(&b'\n') {
        framed.push(b'\n');
    }
    framed
}

// ── Tests ─────────────────────────────────────────────────────────────────────
