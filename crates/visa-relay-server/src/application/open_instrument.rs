//! Startup use case: choose the instrument and open its session.

use thiserror::Error;
use tracing::info;

use visa_relay_core::discovery::{
    select, InstrumentDirectory, DEFAULT_DISCOVERY_PATTERN, DEFAULT_IDENTIFICATION_QUERY,
};
use visa_relay_core::{InstrumentSession, ResourceDescriptor, ResourceManager, SessionError};

/// Startup failures.  Every variant is fatal for the process.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Enumeration returned nothing.
    #[error("no instruments found")]
    NoInstruments,

    /// Instruments were found but none identified with the search key.
    #[error("no instrument identification contains {key:?} ({candidates} candidates)")]
    NoMatch { key: String, candidates: usize },

    /// Neither a search key nor an explicit resource was configured.
    #[error("no instrument selection configured: set a search key or an explicit resource")]
    NoSelection,

    /// The chosen instrument could not be opened.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// How the instrument is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentSelection {
    /// Case-insensitive substring of the wanted identification string.
    pub search_key: Option<String>,
    /// Explicit descriptor; bypasses discovery when set.
    pub resource: Option<String>,
    pub discovery_pattern: String,
    pub identification_query: String,
    pub max_response_bytes: usize,
}

impl Default for InstrumentSelection {
    fn default() -> Self {
        Self {
            search_key: None,
            resource: None,
            discovery_pattern: DEFAULT_DISCOVERY_PATTERN.to_string(),
            identification_query: DEFAULT_IDENTIFICATION_QUERY.to_string(),
            max_response_bytes: visa_relay_core::DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

/// Runs discovery and opens the session on the selected instrument.
///
/// An explicit `resource` wins over `search_key`.  Otherwise every
/// instrument matching the discovery pattern is identified, and the first
/// one whose identification contains the key is opened.
///
/// # Errors
///
/// Returns [`StartupError`]; the caller is expected to exit.  The resource
/// manager stays owned by the caller and is released when it is dropped.
pub fn open_selected_instrument(
    manager: &mut dyn ResourceManager,
    selection: &InstrumentSelection,
) -> Result<InstrumentSession, StartupError> {
    let descriptor = match (&selection.resource, &selection.search_key) {
        (Some(resource), _) => {
            info!("using configured resource {resource}; discovery skipped");
            ResourceDescriptor::new(resource.clone())
        }
        (None, Some(key)) => discover(manager, selection, key)?,
        (None, None) => return Err(StartupError::NoSelection),
    };

    Ok(InstrumentSession::open(
        manager,
        descriptor,
        selection.max_response_bytes,
    )?)
}

fn discover(
    manager: &mut dyn ResourceManager,
    selection: &InstrumentSelection,
    key: &str,
) -> Result<ResourceDescriptor, StartupError> {
    let instruments = InstrumentDirectory::new(manager)
        .with_pattern(selection.discovery_pattern.clone())
        .with_identification_query(selection.identification_query.clone())
        .discover();

    if instruments.is_empty() {
        return Err(StartupError::NoInstruments);
    }

    let chosen = select(key, &instruments).ok_or_else(|| StartupError::NoMatch {
        key: key.to_string(),
        candidates: instruments.len(),
    })?;

    info!(
        "selected {} ({}) for search key {key:?}",
        chosen.descriptor, chosen.identification
    );
    Ok(chosen.descriptor.clone())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
