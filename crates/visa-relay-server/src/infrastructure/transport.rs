//! Builds the resource manager for the configured transport backend.

use tracing::info;

use visa_relay_core::transport::mock::{MockInstrument, MockResourceManager};
use visa_relay_core::{ResourceManager, TransportError};

use crate::infrastructure::config::{TransportConfig, TransportKind};
use crate::infrastructure::socket_transport::SocketResourceManager;

/// Descriptor of the single instrument the simulated backend exposes.
pub const SIMULATED_RESOURCE: &str = "SIM0::1::INSTR";

/// Opens the session-wide resource manager.
///
/// The returned box is the one manager for the whole process.  Dropping it
/// releases the backend.
///
/// # Errors
///
/// Returns [`TransportError::OpenFailed`] if the backend cannot be set up
/// (for the socket backend: a malformed endpoint).
pub fn open_resource_manager(
    config: &TransportConfig,
) -> Result<Box<dyn ResourceManager>, TransportError> {
    match config.kind {
        TransportKind::Socket => {
            let manager = SocketResourceManager::new(&config.endpoints, config.timeout())?;
            info!(
                "socket transport ready with {} endpoint(s), timeout {} ms",
                config.endpoints.len(),
                config.timeout_ms
            );
            Ok(Box::new(manager))
        }
        TransportKind::Simulated => {
            info!(
                "simulated transport ready: {SIMULATED_RESOURCE} identifies as {:?}",
                config.simulated_identification
            );
            let instrument =
                MockInstrument::new(config.simulated_identification.clone()).echo_unknown_queries();
            Ok(Box::new(
                MockResourceManager::new().with_instrument(SIMULATED_RESOURCE, instrument),
            ))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
