//! Startup discovery: enumerate attached instruments, identify each one, and
//! pick the one whose identification contains the configured search key.
//!
//! Discovery runs once, before the listener is bound.  The entities here
//! (descriptors, identification strings) do not outlive that pass; only the
//! chosen descriptor is carried forward to open the long-lived session.
//!
//! ```text
//! InstrumentDirectory::discover()
//!   ├─ find_resources("?*INSTR")   → [d0, d1, d2]
//!   └─ identify(dN)                → open / "*IDN?" / read / close
//!         ↓
//! select("tektronix", &[...])      → first case-insensitive match
//! ```

pub mod directory;
pub mod selector;

pub use directory::{
    DiscoveredInstrument, InstrumentDirectory, DEFAULT_DISCOVERY_PATTERN,
    DEFAULT_IDENTIFICATION_QUERY, IDENTIFICATION_MAX_BYTES,
};
pub use selector::select;
