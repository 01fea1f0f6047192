//! Resource descriptors: transport-defined instrument addresses.

use std::fmt;

/// An opaque, transport-defined address naming one discoverable instrument.
///
/// Examples: `USB0::0x0699::0x0522::C012345::INSTR`,
/// `GPIB0::22::INSTR`, `TCPIP0::192.168.1.40::5025::SOCKET`.
///
/// A descriptor is only meaningful to the [`crate::ResourceManager`] that
/// produced it.  Some transports invalidate descriptors from an earlier
/// enumeration pass, so descriptors are not cached across passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor(String);

impl ResourceDescriptor {
    /// Wraps a transport address string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Returns the address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceDescriptor {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}
