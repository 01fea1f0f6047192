//! TOML-based configuration for the relay.
//!
//! Every field has a serde default, so an empty file (or no file at all) is
//! a valid configuration apart from the instrument selection, which must be
//! supplied either here or on the command line.
//!
//! ```toml
//! log_level = "info"
//!
//! [server]
//! bind_address = "0.0.0.0"
//! port = 12345
//! concurrent_clients = false
//! max_command_bytes = 4096
//! reply_format = "text"          # or "json"
//!
//! [instrument]
//! search_key = "tektronix"
//! # resource = "USB0::0x0699::0x0522::C012345::INSTR"
//! discovery_pattern = "?*INSTR"
//! identification_query = "*IDN?"
//! max_response_bytes = 2048
//!
//! [transport]
//! kind = "socket"                # or "simulated"
//! endpoints = ["192.168.1.40:5025"]
//! timeout_ms = 2000
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use visa_relay_core::discovery::{DEFAULT_DISCOVERY_PATTERN, DEFAULT_IDENTIFICATION_QUERY};
use visa_relay_core::protocol::DEFAULT_MAX_COMMAND_BYTES;
use visa_relay_core::{ReplyFormat, DEFAULT_MAX_RESPONSE_BYTES};

use crate::application::open_instrument::InstrumentSelection;
use crate::application::relay::RelayOptions;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address:port` is not a socket address.
    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    /// A size bound was configured as zero.
    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    /// The socket transport has nothing to enumerate or open.
    #[error("socket transport needs at least one endpoint or an explicit resource")]
    NoEndpoints,
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

/// Listener and relay protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Handle connections on separate tasks.  Instrument traffic stays
    /// serialised through the session worker either way.
    #[serde(default)]
    pub concurrent_clients: bool,
    #[serde(default = "default_max_command_bytes")]
    pub max_command_bytes: usize,
    #[serde(default)]
    pub reply_format: ReplyFormat,
}

/// Which instrument to use and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentConfig {
    /// Case-insensitive substring of the wanted `*IDN?` reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_key: Option<String>,
    /// Explicit resource descriptor; skips discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default = "default_discovery_pattern")]
    pub discovery_pattern: String,
    #[serde(default = "default_identification_query")]
    pub identification_query: String,
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

/// Transport backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
    /// `host:port` SCPI socket endpoints (socket transport only).  IPv6
    /// hosts are bracketed: `[::1]:5025`.
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Connect/read/write timeout for the socket transport.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// `*IDN?` reply of the simulated instrument.
    #[serde(default = "default_simulated_identification")]
    pub simulated_identification: String,
}

/// Available transport backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Raw SCPI over TCP (`TCPIP0::host::port::SOCKET`).
    #[default]
    Socket,
    /// In-memory instrument; no hardware needed.
    Simulated,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Socket => f.write_str("socket"),
            TransportKind::Simulated => f.write_str("simulated"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "socket" => Ok(TransportKind::Socket),
            "simulated" => Ok(TransportKind::Simulated),
            other => Err(format!(
                "unknown transport '{other}' (expected socket or simulated)"
            )),
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    12345
}
fn default_max_command_bytes() -> usize {
    DEFAULT_MAX_COMMAND_BYTES
}
fn default_discovery_pattern() -> String {
    DEFAULT_DISCOVERY_PATTERN.to_string()
}
fn default_identification_query() -> String {
    DEFAULT_IDENTIFICATION_QUERY.to_string()
}
fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}
fn default_timeout_ms() -> u64 {
    2000
}
fn default_simulated_identification() -> String {
    "VISA-RELAY,SIMULATED,0,1.0".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            server: ServerConfig::default(),
            instrument: InstrumentConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            concurrent_clients: false,
            max_command_bytes: default_max_command_bytes(),
            reply_format: ReplyFormat::default(),
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            search_key: None,
            resource: None,
            discovery_pattern: default_discovery_pattern(),
            identification_query: default_identification_query(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            endpoints: Vec::new(),
            timeout_ms: default_timeout_ms(),
            simulated_identification: default_simulated_identification(),
        }
    }
}

// ── Derived views ─────────────────────────────────────────────────────────────

impl ServerConfig {
    /// Parses `bind_address:port`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] if the address is not an
    /// IP literal.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let text = format!("{}:{}", self.bind_address, self.port);
        text.parse().map_err(|_| ConfigError::InvalidBindAddress(text))
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            max_command_bytes: self.max_command_bytes,
            reply_format: self.reply_format,
        }
    }
}

impl InstrumentConfig {
    pub fn selection(&self) -> InstrumentSelection {
        InstrumentSelection {
            search_key: self.search_key.clone(),
            resource: self.resource.clone(),
            discovery_pattern: self.discovery_pattern.clone(),
            identification_query: self.identification_query.clone(),
            max_response_bytes: self.max_response_bytes,
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RelayConfig {
    /// Checks cross-field constraints that serde cannot express.
    ///
    /// The instrument selection itself is checked at startup so that its
    /// error is reported alongside the other discovery failures.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind_addr()?;
        if self.server.max_command_bytes == 0 {
            return Err(ConfigError::ZeroLimit("server.max_command_bytes"));
        }
        if self.instrument.max_response_bytes == 0 {
            return Err(ConfigError::ZeroLimit("instrument.max_response_bytes"));
        }
        if self.transport.kind == TransportKind::Socket
            && self.transport.endpoints.is_empty()
            && self.instrument.resource.is_none()
        {
            return Err(ConfigError::NoEndpoints);
        }
        Ok(())
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads a [`RelayConfig`] from `path`.
///
/// Unlike a per-user settings file, a config path here is always given
/// explicitly, so a missing file is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parses TOML text into a [`RelayConfig`].
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<RelayConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn simulated() -> RelayConfig {
        let mut cfg = RelayConfig::default();
        cfg.transport.kind = TransportKind::Simulated;
        cfg
    }

    #[test]
    fn test_defaults_match_legacy_constants() {
        // Arrange / Act
        let cfg = RelayConfig::default();

        // Assert
        assert_eq!(cfg.server.port, 12345);
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
        assert_eq!(cfg.instrument.max_response_bytes, 2048);
        assert_eq!(cfg.instrument.discovery_pattern, "?*INSTR");
        assert_eq!(cfg.instrument.identification_query, "*IDN?");
        assert_eq!(cfg.server.reply_format, ReplyFormat::Text);
        assert!(!cfg.server.concurrent_clients);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let cfg = parse_config("").expect("empty TOML is valid");
        assert_eq!(cfg, RelayConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        // Arrange
        let toml_str = r#"
            [server]
            port = 5025
            reply_format = "json"

            [instrument]
            search_key = "keysight"
        "#;

        // Act
        let cfg = parse_config(toml_str).unwrap();

        // Assert
        assert_eq!(cfg.server.port, 5025);
        assert_eq!(cfg.server.reply_format, ReplyFormat::Json);
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
        assert_eq!(cfg.instrument.search_key.as_deref(), Some("keysight"));
        assert_eq!(cfg.instrument.max_response_bytes, 2048);
    }

    #[test]
    fn test_transport_section_parses() {
        let cfg = parse_config(
            r#"
            [transport]
            kind = "socket"
            endpoints = ["10.0.0.5:5025", "10.0.0.6:5025"]
            timeout_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(cfg.transport.kind, TransportKind::Socket);
        assert_eq!(cfg.transport.endpoints.len(), 2);
        assert_eq!(cfg.transport.timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = parse_config("[server\nport = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_reply_format_is_parse_error() {
        let result = parse_config("[server]\nreply_format = \"xml\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_serializes_and_deserializes_round_trip() {
        let mut cfg = simulated();
        cfg.instrument.search_key = Some("rigol".to_string());
        cfg.server.port = 9000;

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored = parse_config(&toml_str).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = load_config(Path::new("/nonexistent/visa-relay/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_bind_addr_combines_address_and_port() {
        let cfg = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 4000,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.bind_addr().unwrap().to_string(), "127.0.0.1:4000");
    }

    #[test]
    fn test_validate_rejects_bad_bind_address() {
        let mut cfg = simulated();
        cfg.server.bind_address = "not.an.ip".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidBindAddress(_))));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut cfg = simulated();
        cfg.instrument.max_response_bytes = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroLimit(_))));

        let mut cfg = simulated();
        cfg.server.max_command_bytes = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroLimit(_))));
    }

    #[test]
    fn test_validate_socket_transport_needs_endpoints_or_resource() {
        let mut cfg = RelayConfig::default();
        assert!(matches!(cfg.validate(), Err(ConfigError::NoEndpoints)));

        cfg.transport.endpoints = vec!["10.0.0.5:5025".to_string()];
        assert!(cfg.validate().is_ok());

        let mut cfg = RelayConfig::default();
        cfg.instrument.resource = Some("TCPIP0::10.0.0.5::5025::SOCKET".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_transport_kind_parses_from_cli_text() {
        assert_eq!("Simulated".parse::<TransportKind>(), Ok(TransportKind::Simulated));
        assert!("gpib".parse::<TransportKind>().is_err());
    }

    #[test]
    fn test_selection_and_relay_options_mirror_config() {
        let mut cfg = simulated();
        cfg.instrument.search_key = Some("tek".to_string());
        cfg.server.max_command_bytes = 128;

        let selection = cfg.instrument.selection();
        let options = cfg.server.relay_options();

        assert_eq!(selection.search_key.as_deref(), Some("tek"));
        assert_eq!(selection.max_response_bytes, 2048);
        assert_eq!(options.max_command_bytes, 128);
    }
}
