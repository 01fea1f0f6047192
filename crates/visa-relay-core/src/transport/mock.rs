//! In-memory instrument backend.
//!
//! Used by unit and integration tests to script instrument behaviour, and by
//! the server's `simulated` transport kind to run the relay with no hardware
//! attached.
//!
//! Every operation is recorded in a shared [`MockJournal`] so tests can
//! assert exactly what reached the "bus" even after the manager itself has
//! been moved into a session worker.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::{InstrumentIo, ResourceManager, TransportError};
use crate::domain::ResourceDescriptor;

/// Timeout reported when a read finds no pending output.
const MOCK_TIMEOUT_MS: u64 = 2000;

/// Scripted behaviour of one simulated instrument.
#[derive(Debug, Clone, Default)]
pub struct MockInstrument {
    identification: Option<String>,
    responses: HashMap<String, Vec<u8>>,
    echo_unknown_queries: bool,
    fail_open: bool,
    fail_write: bool,
    fail_read: bool,
    fail_close: bool,
}

impl MockInstrument {
    /// An instrument that answers `*IDN?` with `identification`.
    pub fn new(identification: impl Into<String>) -> Self {
        Self {
            identification: Some(identification.into()),
            ..Self::default()
        }
    }

    /// An instrument that never answers `*IDN?` (the read times out).
    pub fn silent() -> Self {
        Self::default()
    }

    /// Scripts the raw bytes returned after `query` is written.
    pub fn with_response(mut self, query: impl Into<String>, response: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(query.into(), response.into());
        self
    }

    /// Unscripted queries are answered with their own text plus `\n`.
    pub fn echo_unknown_queries(mut self) -> Self {
        self.echo_unknown_queries = true;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_write(mut self) -> Self {
        self.fail_write = true;
        self
    }

    pub fn failing_read(mut self) -> Self {
        self.fail_read = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    fn response_for(&self, command: &str) -> Option<Vec<u8>> {
        if let Some(bytes) = self.responses.get(command) {
            return Some(bytes.clone());
        }
        if command.eq_ignore_ascii_case("*IDN?") {
            return self
                .identification
                .as_ref()
                .map(|idn| format!("{idn}\n").into_bytes());
        }
        if self.echo_unknown_queries {
            return Some(format!("{command}\n").into_bytes());
        }
        None
    }
}

/// Record of everything the backend was asked to do.
#[derive(Debug, Default)]
struct JournalState {
    patterns: Vec<String>,
    opened: Vec<ResourceDescriptor>,
    closed: Vec<ResourceDescriptor>,
    writes: Vec<(ResourceDescriptor, Vec<u8>)>,
    reads: Vec<(ResourceDescriptor, usize)>,
    released: bool,
}

/// Shared, cloneable view of the backend's activity.
#[derive(Debug, Clone, Default)]
pub struct MockJournal {
    inner: Arc<Mutex<JournalState>>,
}

impl MockJournal {
    fn with<R>(&self, f: impl FnOnce(&mut JournalState) -> R) -> R {
        let mut guard = self.inner.lock().expect("lock poisoned");
        f(&mut guard)
    }

    /// Discovery patterns passed to `find_resources`, in call order.
    pub fn patterns(&self) -> Vec<String> {
        self.with(|s| s.patterns.clone())
    }

    /// Descriptors successfully opened, in call order.
    pub fn opened(&self) -> Vec<ResourceDescriptor> {
        self.with(|s| s.opened.clone())
    }

    /// Descriptors whose handles were closed, in call order.
    pub fn closed(&self) -> Vec<ResourceDescriptor> {
        self.with(|s| s.closed.clone())
    }

    /// Every write that reached an instrument, raw bytes included.
    pub fn writes(&self) -> Vec<(ResourceDescriptor, Vec<u8>)> {
        self.with(|s| s.writes.clone())
    }

    /// Every read attempt with its byte bound.
    pub fn reads(&self) -> Vec<(ResourceDescriptor, usize)> {
        self.with(|s| s.reads.clone())
    }

    /// Writes addressed to `descriptor`, decoded lossily as text.
    pub fn writes_to(&self, descriptor: &ResourceDescriptor) -> Vec<String> {
        self.with(|s| {
            s.writes
                .iter()
                .filter(|(d, _)| d == descriptor)
                .map(|(_, bytes)| String::from_utf8_lossy(bytes).into_owned())
                .collect()
        })
    }

    /// `true` once the resource manager has been dropped.
    pub fn manager_released(&self) -> bool {
        self.with(|s| s.released)
    }
}

/// In-memory [`ResourceManager`] holding an ordered list of instruments.
#[derive(Debug, Default)]
pub struct MockResourceManager {
    instruments: Vec<(ResourceDescriptor, MockInstrument)>,
    fail_find: bool,
    journal: MockJournal,
}

impl MockResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an instrument.  Enumeration returns instruments in the order
    /// they were attached.
    pub fn with_instrument(
        mut self,
        descriptor: impl Into<ResourceDescriptor>,
        instrument: MockInstrument,
    ) -> Self {
        self.instruments.push((descriptor.into(), instrument));
        self
    }

    /// Makes `find_resources` fail with a transport error.
    pub fn failing_find(mut self) -> Self {
        self.fail_find = true;
        self
    }

    /// Returns a handle onto the shared activity journal.
    pub fn journal(&self) -> MockJournal {
        self.journal.clone()
    }
}

impl ResourceManager for MockResourceManager {
    fn find_resources(&mut self, pattern: &str) -> Result<Vec<ResourceDescriptor>, TransportError> {
        self.journal.with(|s| s.patterns.push(pattern.to_string()));
        if self.fail_find {
            return Err(TransportError::Io("simulated enumeration failure".to_string()));
        }
        Ok(self.instruments.iter().map(|(d, _)| d.clone()).collect())
    }

    fn open(
        &mut self,
        descriptor: &ResourceDescriptor,
    ) -> Result<Box<dyn InstrumentIo>, TransportError> {
        let (_, script) = self
            .instruments
            .iter()
            .find(|(d, _)| d == descriptor)
            .ok_or_else(|| TransportError::ResourceNotFound(descriptor.to_string()))?;

        if script.fail_open {
            return Err(TransportError::OpenFailed {
                resource: descriptor.to_string(),
                status: "simulated open failure".to_string(),
            });
        }

        self.journal.with(|s| s.opened.push(descriptor.clone()));
        Ok(Box::new(MockHandle {
            descriptor: descriptor.clone(),
            script: script.clone(),
            pending: VecDeque::new(),
            open: true,
            journal: self.journal.clone(),
        }))
    }
}

impl Drop for MockResourceManager {
    fn drop(&mut self) {
        self.journal.with(|s| s.released = true);
    }
}

/// An open handle onto a [`MockInstrument`].
///
/// Responses queue in an output buffer exactly like a real instrument's:
/// a bounded read takes what fits and leaves the rest for the next read.
struct MockHandle {
    descriptor: ResourceDescriptor,
    script: MockInstrument,
    pending: VecDeque<u8>,
    open: bool,
    journal: MockJournal,
}

impl InstrumentIo for MockHandle {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        if self.script.fail_write {
            return Err(TransportError::Io("simulated write failure".to_string()));
        }
        self.journal
            .with(|s| s.writes.push((self.descriptor.clone(), data.to_vec())));

        let text = String::from_utf8_lossy(data);
        let command = text.trim_end_matches(['\r', '\n']);
        if command.ends_with('?') {
            if let Some(response) = self.script.response_for(command) {
                self.pending.extend(response);
            }
        }
        Ok(data.len())
    }

    fn read(&mut self, max_len: usize) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.journal
            .with(|s| s.reads.push((self.descriptor.clone(), max_len)));
        if self.script.fail_read {
            return Err(TransportError::Io("simulated read failure".to_string()));
        }
        if self.pending.is_empty() {
            return Err(TransportError::Timeout(MOCK_TIMEOUT_MS));
        }
        let n = max_len.min(self.pending.len());
        Ok(self.pending.drain(..n).collect())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.open = false;
        self.journal.with(|s| s.closed.push(self.descriptor.clone()));
        if self.script.fail_close {
            return Err(TransportError::Io("simulated close failure".to_string()));
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
