//! Instrument Selector: first case-insensitive substring match wins.

use super::directory::DiscoveredInstrument;

/// Returns the first instrument whose identification contains `key`,
/// ignoring case, scanning in enumeration order.
///
/// Unidentified instruments (empty identification) never match.  There is
/// no scoring: enumeration order is the only tie-break.
///
/// An empty `key` therefore selects the first identified instrument.
pub fn select<'a>(key: &str, instruments: &'a [DiscoveredInstrument]) -> Option<&'a DiscoveredInstrument> {
    let needle = key.to_lowercase();
    instruments
        .iter()
        .filter(|instrument| instrument.is_identified())
        .find(|instrument| instrument.identification.to_lowercase().contains(&needle))
}
