//! Instrument transport capability.
//!
//! The relay never talks to a bus directly.  It consumes two traits:
//!
//! - [`ResourceManager`] – the session-wide manager handle.  It enumerates
//!   instrument-class resources and opens handles to them.  Dropping the
//!   manager releases it.
//! - [`InstrumentIo`] – one open handle to one instrument.  Raw bytes in,
//!   raw bytes out, explicit close.
//!
//! # Failure behaviour
//!
//! | Operation        | On failure                                   |
//! |------------------|----------------------------------------------|
//! | `find_resources` | `Err`; callers treat it like "no instruments" |
//! | `open`           | `Err`; caller decides fatal vs. skip          |
//! | `write` / `read` | `Err`; surfaced, never retried                |
//! | `close`          | `Err`; best-effort, logged by the caller      |
//!
//! # Testability
//!
//! [`mock::MockResourceManager`] implements both traits in memory so that
//! discovery, the session and the relay can be exercised without hardware.

use thiserror::Error;

use crate::domain::ResourceDescriptor;

pub mod mock;

/// Error type for transport operations.
///
/// Each variant carries the transport's own status text so it can be logged
/// or shown to an operator verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The resource manager or an instrument handle could not be opened.
    #[error("failed to open {resource}: {status}")]
    OpenFailed { resource: String, status: String },

    /// Enumeration matched nothing, or a descriptor names no known resource.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// A read or write did not complete within the transport's timeout.
    #[error("transport timeout after {0} ms")]
    Timeout(u64),

    /// Any other I/O failure reported by the transport.
    #[error("transport I/O error: {0}")]
    Io(String),

    /// The handle was already closed.
    #[error("handle is closed")]
    Closed,
}

/// An open handle to a single instrument.
///
/// Implementations are blocking: every call returns only once the transport
/// has completed (or failed) the operation.
pub trait InstrumentIo: Send {
    /// Writes `data` to the instrument and returns the number of bytes sent.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Reads at most `max_len` bytes of response.
    ///
    /// Returning fewer bytes than requested is normal: the transport stops
    /// at its end-of-message condition (termination character, EOI, ...).
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError>;

    /// Closes the handle.  Further calls return [`TransportError::Closed`].
    fn close(&mut self) -> Result<(), TransportError>;
}

/// The transport's resource manager.
pub trait ResourceManager: Send {
    /// Lists resources matching the transport-defined discovery `pattern`
    /// (for VISA: `?*INSTR` selects instrument-class resources only).
    ///
    /// Returns an empty vector, not an error, when nothing is attached.
    fn find_resources(&mut self, pattern: &str) -> Result<Vec<ResourceDescriptor>, TransportError>;

    /// Opens a handle to `descriptor`.
    fn open(&mut self, descriptor: &ResourceDescriptor)
        -> Result<Box<dyn InstrumentIo>, TransportError>;
}

impl<T: ResourceManager + ?Sized> ResourceManager for Box<T> {
    fn find_resources(&mut self, pattern: &str) -> Result<Vec<ResourceDescriptor>, TransportError> {
        (**self).find_resources(pattern)
    }

    fn open(
        &mut self,
        descriptor: &ResourceDescriptor,
    ) -> Result<Box<dyn InstrumentIo>, TransportError> {
        (**self).open(descriptor)
    }
}
