//! Raw SCPI-over-TCP transport.
//!
//! Most LAN instruments accept SCPI on a plain TCP port (5025 by
//! convention) in addition to VXI-11/HiSLIP.  This backend speaks that
//! socket protocol with blocking `std::net` streams, which suits the
//! dedicated session thread that owns the handle.
//!
//! Resources are named with the usual socket descriptor form
//! `TCPIP0::<host>::<port>::SOCKET`.  Enumeration has no bus to scan, so it
//! returns one descriptor per configured endpoint regardless of pattern;
//! unreachable endpoints simply fail identification later.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, warn};

use visa_relay_core::{InstrumentIo, ResourceDescriptor, ResourceManager, TransportError};

const READ_CHUNK: usize = 512;

/// Resource manager over a fixed list of `host:port` endpoints.
#[derive(Debug, Clone)]
pub struct SocketResourceManager {
    endpoints: Vec<ResourceDescriptor>,
    timeout: Duration,
}

impl SocketResourceManager {
    /// Builds a manager from `host:port` endpoint strings.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::OpenFailed`] naming the first endpoint that
    /// is not of the form `host:port`.
    pub fn new<I, S>(endpoints: I, timeout: Duration) -> Result<Self, TransportError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = endpoints
            .into_iter()
            .map(|e| endpoint_descriptor(e.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { endpoints, timeout })
    }
}

impl ResourceManager for SocketResourceManager {
    fn find_resources(&mut self, pattern: &str) -> Result<Vec<ResourceDescriptor>, TransportError> {
        debug!(
            "socket transport lists {} configured endpoints (pattern {pattern:?} not applicable)",
            self.endpoints.len()
        );
        Ok(self.endpoints.clone())
    }

    fn open(
        &mut self,
        descriptor: &ResourceDescriptor,
    ) -> Result<Box<dyn InstrumentIo>, TransportError> {
        let (host, port) = parse_socket_descriptor(descriptor)
            .ok_or_else(|| TransportError::ResourceNotFound(descriptor.to_string()))?;

        let open_failed = |status: String| TransportError::OpenFailed {
            resource: descriptor.to_string(),
            status,
        };

        let addr = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| open_failed(e.to_string()))?
            .next()
            .ok_or_else(|| open_failed(format!("{host} did not resolve")))?;

        let stream =
            TcpStream::connect_timeout(&addr, self.timeout).map_err(|e| open_failed(e.to_string()))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.timeout)))
            .map_err(|e| open_failed(e.to_string()))?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("{descriptor}: could not disable Nagle: {e}");
        }

        debug!("connected to {descriptor} at {addr}");
        Ok(Box::new(SocketInstrument {
            stream: Some(stream),
            timeout_ms: duration_ms(self.timeout),
        }))
    }
}

/// One connected instrument socket.
#[derive(Debug)]
pub struct SocketInstrument {
    stream: Option<TcpStream>,
    timeout_ms: u64,
}

impl SocketInstrument {
    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::Closed)
    }
}

impl InstrumentIo for SocketInstrument {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let timeout_ms = self.timeout_ms;
        let stream = self.stream()?;
        stream
            .write_all(data)
            .and_then(|()| stream.flush())
            .map_err(|e| map_io_error(e, timeout_ms))?;
        Ok(data.len())
    }

    /// Reads until a `\n` arrives, `max_len` bytes are collected, or the
    /// timeout expires.  A timeout after some bytes arrived returns them.
    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        let timeout_ms = self.timeout_ms;
        let stream = self.stream()?;
        let mut response = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        while response.len() < max_len {
            let want = READ_CHUNK.min(max_len - response.len());
            match stream.read(&mut chunk[..want]) {
                Ok(0) if response.is_empty() => {
                    return Err(TransportError::Io("connection closed by instrument".to_string()))
                }
                Ok(0) => break,
                Ok(n) => {
                    response.extend_from_slice(&chunk[..n]);
                    if chunk[..n].contains(&b'\n') {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) && !response.is_empty() => break,
                Err(e) => return Err(map_io_error(e, timeout_ms)),
            }
        }
        Ok(response)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let stream = self.stream.take().ok_or(TransportError::Closed)?;
        match stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != ErrorKind::NotConnected => Err(TransportError::Io(e.to_string())),
            _ => Ok(()),
        }
    }
}

/// Splits `TCPIP<n>::<host>::<port>::SOCKET` into host and port.
///
/// The interface is taken from the front and the port and class from the
/// back, so a bracketed IPv6 host such as `[::1]` survives intact.  The
/// brackets are removed from the returned host.
///
/// Returns `None` for any other resource class.
pub fn parse_socket_descriptor(descriptor: &ResourceDescriptor) -> Option<(String, u16)> {
    let (interface, rest) = descriptor.as_str().split_once("::")?;
    let (rest, class) = rest.rsplit_once("::")?;
    let (host, port) = rest.rsplit_once("::")?;
    if !interface.to_ascii_uppercase().starts_with("TCPIP")
        || !class.eq_ignore_ascii_case("SOCKET")
    {
        return None;
    }
    let host = match host.strip_prefix('[') {
        Some(inner) => inner.strip_suffix(']')?,
        None if host.contains(':') => return None,
        None => host,
    };
    if host.is_empty() {
        return None;
    }
    let port = port.parse().ok()?;
    Some((host.to_string(), port))
}

fn endpoint_descriptor(endpoint: &str) -> Result<ResourceDescriptor, TransportError> {
    let invalid = || TransportError::OpenFailed {
        resource: endpoint.to_string(),
        status: "expected host:port or [ipv6]:port".to_string(),
    };
    let (host, port) = endpoint.trim().rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    // IPv6 literals must be bracketed, otherwise host and port are ambiguous.
    let bracketed = host.starts_with('[') && host.ends_with(']') && host.len() > 2;
    if host.is_empty() || ((host.contains(':') || host.starts_with('[')) && !bracketed) {
        return Err(invalid());
    }
    Ok(ResourceDescriptor::new(format!("TCPIP0::{host}::{port}::SOCKET")))
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn map_io_error(e: std::io::Error, timeout_ms: u64) -> TransportError {
    if is_timeout(&e) {
        TransportError::Timeout(timeout_ms)
    } else {
        TransportError::Io(e.to_string())
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
