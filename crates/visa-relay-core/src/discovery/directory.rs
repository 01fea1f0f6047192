//! Instrument Directory: enumeration and self-identification.

use tracing::{info, warn};

use crate::domain::ResourceDescriptor;
use crate::transport::{ResourceManager, TransportError};

/// VISA pattern matching instrument-class resources only (no raw
/// `INTFC`/`SOCKET` interfaces on VISA transports).
pub const DEFAULT_DISCOVERY_PATTERN: &str = "?*INSTR";

/// IEEE 488.2 identification query.
pub const DEFAULT_IDENTIFICATION_QUERY: &str = "*IDN?";

/// Upper bound for an identification reply.
pub const IDENTIFICATION_MAX_BYTES: usize = 256;

/// One enumerated resource together with its identification text.
///
/// An empty `identification` means the instrument could not be identified
/// (open, query or close failed).  It is not an enumeration failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredInstrument {
    pub descriptor: ResourceDescriptor,
    pub identification: String,
}

impl DiscoveredInstrument {
    pub fn new(descriptor: impl Into<ResourceDescriptor>, identification: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            identification: identification.into(),
        }
    }

    /// `false` when identification failed.
    pub fn is_identified(&self) -> bool {
        !self.identification.is_empty()
    }
}

/// Enumerates instruments through a borrowed [`ResourceManager`].
pub struct InstrumentDirectory<'rm> {
    manager: &'rm mut dyn ResourceManager,
    pattern: String,
    identification_query: String,
}

impl<'rm> InstrumentDirectory<'rm> {
    /// Creates a directory using the default pattern and `*IDN?` query.
    pub fn new(manager: &'rm mut dyn ResourceManager) -> Self {
        Self {
            manager,
            pattern: DEFAULT_DISCOVERY_PATTERN.to_string(),
            identification_query: DEFAULT_IDENTIFICATION_QUERY.to_string(),
        }
    }

    /// Overrides the transport discovery pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    /// Overrides the self-identification query.
    pub fn with_identification_query(mut self, query: impl Into<String>) -> Self {
        self.identification_query = query.into();
        self
    }

    /// Lists instrument-class resources in transport order.
    ///
    /// A transport failure is logged and reported as "nothing attached".
    pub fn enumerate(&mut self) -> Vec<ResourceDescriptor> {
        match self.manager.find_resources(&self.pattern) {
            Ok(found) => {
                info!("instruments found: {}", found.len());
                found
            }
            Err(e) => {
                warn!("instrument search with pattern {:?} failed: {e}", self.pattern);
                Vec::new()
            }
        }
    }

    /// Opens a short-lived handle, sends the identification query, reads the
    /// reply and closes the handle again.
    ///
    /// Returns an empty string if any of those steps fails.
    pub fn identify(&mut self, descriptor: &ResourceDescriptor) -> String {
        match self.try_identify(descriptor) {
            Ok(identification) => identification,
            Err(e) => {
                warn!("could not identify {descriptor}: {e}");
                String::new()
            }
        }
    }

    fn try_identify(&mut self, descriptor: &ResourceDescriptor) -> Result<String, TransportError> {
        let mut io = self.manager.open(descriptor)?;

        let query = format!("{}\n", self.identification_query);
        let reply = io
            .write(query.as_bytes())
            .and_then(|_| io.read(IDENTIFICATION_MAX_BYTES));

        // Always close, even after a failed query.
        let closed = io.close();
        let reply = reply?;
        closed?;

        Ok(String::from_utf8_lossy(&reply).trim_end().to_string())
    }

    /// Enumerates and identifies every attached instrument, in order.
    pub fn discover(&mut self) -> Vec<DiscoveredInstrument> {
        let descriptors = self.enumerate();
        let mut discovered = Vec::with_capacity(descriptors.len());

        for (index, descriptor) in descriptors.into_iter().enumerate() {
            let identification = self.identify(&descriptor);
            if identification.is_empty() {
                info!("{}: {descriptor}, <unidentified>", index + 1);
            } else {
                info!("{}: {descriptor}, {identification}", index + 1);
            }
            discovered.push(DiscoveredInstrument {
                descriptor,
                identification,
            });
        }

        discovered
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockInstrument, MockResourceManager};

    #[test]
    fn test_enumerate_passes_instrument_pattern() {
        // Arrange
        let mut rm = MockResourceManager::new()
            .with_instrument("USB0::1::INSTR", MockInstrument::new("A"));
        let journal = rm.journal();

        // Act
        let found = InstrumentDirectory::new(&mut rm).enumerate();

        // Assert
        assert_eq!(found.len(), 1);
        assert_eq!(journal.patterns(), vec!["?*INSTR".to_string()]);
    }

    #[test]
    fn test_enumerate_with_nothing_attached_is_empty() {
        let mut rm = MockResourceManager::new();
        assert!(InstrumentDirectory::new(&mut rm).enumerate().is_empty());
    }

    #[test]
    fn test_enumerate_transport_failure_is_empty() {
        let mut rm = MockResourceManager::new()
            .with_instrument("USB0::1::INSTR", MockInstrument::new("A"))
            .failing_find();
        assert!(InstrumentDirectory::new(&mut rm).enumerate().is_empty());
    }

    #[test]
    fn test_identify_trims_trailing_terminator_and_closes_handle() {
        // Arrange
        let d = ResourceDescriptor::from("GPIB0::7::INSTR");
        let mut rm = MockResourceManager::new()
            .with_instrument(d.clone(), MockInstrument::new("KEYSIGHT,34465A,MY1,A.03"));
        let journal = rm.journal();

        // Act
        let idn = InstrumentDirectory::new(&mut rm).identify(&d);

        // Assert
        assert_eq!(idn, "KEYSIGHT,34465A,MY1,A.03");
        assert_eq!(journal.writes_to(&d), vec!["*IDN?\n".to_string()]);
        assert_eq!(journal.reads(), vec![(d.clone(), IDENTIFICATION_MAX_BYTES)]);
        assert_eq!(journal.closed(), vec![d]);
    }

    #[test]
    fn test_identify_open_failure_is_empty() {
        let d = ResourceDescriptor::from("GPIB0::7::INSTR");
        let mut rm = MockResourceManager::new()
            .with_instrument(d.clone(), MockInstrument::new("X").failing_open());
        assert_eq!(InstrumentDirectory::new(&mut rm).identify(&d), "");
    }

    #[test]
    fn test_identify_query_failure_is_empty_but_still_closes() {
        // Arrange: the instrument never answers *IDN?
        let d = ResourceDescriptor::from("ASRL1::INSTR");
        let mut rm = MockResourceManager::new().with_instrument(d.clone(), MockInstrument::silent());
        let journal = rm.journal();

        // Act
        let idn = InstrumentDirectory::new(&mut rm).identify(&d);

        // Assert
        assert_eq!(idn, "");
        assert_eq!(journal.closed(), vec![d]);
    }

    #[test]
    fn test_identify_close_failure_is_empty() {
        let d = ResourceDescriptor::from("GPIB0::7::INSTR");
        let mut rm = MockResourceManager::new()
            .with_instrument(d.clone(), MockInstrument::new("X").failing_close());
        assert_eq!(InstrumentDirectory::new(&mut rm).identify(&d), "");
    }

    #[test]
    fn test_custom_identification_query_is_sent() {
        let d = ResourceDescriptor::from("GPIB0::7::INSTR");
        let mut rm = MockResourceManager::new().with_instrument(
            d.clone(),
            MockInstrument::silent().with_response("ID?", b"HP3478A\r\n".to_vec()),
        );

        let idn = InstrumentDirectory::new(&mut rm)
            .with_identification_query("ID?")
            .identify(&d);

        assert_eq!(idn, "HP3478A");
    }

    #[test]
    fn test_discover_keeps_unidentified_entries_in_order() {
        // Arrange
        let mut rm = MockResourceManager::new()
            .with_instrument("USB0::1::INSTR", MockInstrument::new("TEKTRONIX,MSO24,1,1"))
            .with_instrument("USB0::2::INSTR", MockInstrument::silent())
            .with_instrument("USB0::3::INSTR", MockInstrument::new("KEYSIGHT,E36313A,2,2"));

        // Act
        let found = InstrumentDirectory::new(&mut rm).discover();

        // Assert
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].identification, "TEKTRONIX,MSO24,1,1");
        assert!(!found[1].is_identified());
        assert_eq!(found[2].descriptor.as_str(), "USB0::3::INSTR");
    }
}
