//! End-to-end tests for the relay: real TCP clients against a running
//! accept loop, a session worker thread and the in-memory instrument
//! backend.
//!
//! Every test builds the same pipeline `main` builds:
//!
//! ```text
//! MockResourceManager ─ open_selected_instrument ─ spawn_session_worker
//!                                                      │ SessionHandle
//! TcpStream (test client) ── run_server ── handle_connection
//! ```
//!
//! The backend's journal records every byte written to the instrument and
//! every read attempt, so the tests can assert what reached the "bus", not
//! just what came back over the socket.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use visa_relay_core::transport::mock::{MockInstrument, MockJournal, MockResourceManager};
use visa_relay_core::{ReplyFormat, ResourceDescriptor};
use visa_relay_server::application::open_instrument::{open_selected_instrument, InstrumentSelection};
use visa_relay_server::application::relay::RelayOptions;
use visa_relay_server::infrastructure::{
    bind_listener, run_server, spawn_session_worker, ServerOptions, SessionWorker,
};

const SCOPE: &str = "USB0::0x0699::0x0522::C012345::INSTR";
const PSU: &str = "USB0::0x2A8D::0x1202::MY5900::INSTR";

// ── Harness ───────────────────────────────────────────────────────────────────

struct Relay {
    addr: SocketAddr,
    running: Arc<AtomicBool>,
    server: JoinHandle<anyhow::Result<()>>,
    worker: SessionWorker,
    journal: MockJournal,
    /// Writes made during discovery, before any client connected.
    startup_writes: usize,
}

impl Relay {
    async fn start(rm: MockResourceManager, key: &str, options: ServerOptions) -> Relay {
        let mut rm = rm;
        let journal = rm.journal();
        let selection = InstrumentSelection {
            search_key: Some(key.to_string()),
            ..InstrumentSelection::default()
        };
        let session = open_selected_instrument(&mut rm, &selection).expect("startup");
        let startup_writes = journal.writes().len();
        let (handle, worker) = spawn_session_worker(session, rm).expect("worker");

        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).await.expect("bind");
        let addr = listener.local_addr().unwrap();
        let running = Arc::new(AtomicBool::new(true));
        let server = tokio::spawn(run_server(
            listener,
            Arc::new(handle),
            options,
            Arc::clone(&running),
        ));

        Relay {
            addr,
            running,
            server,
            worker,
            journal,
            startup_writes,
        }
    }

    /// Sends `request`, then reads until the relay closes the connection.
    async fn exchange(&self, request: &[u8]) -> Vec<u8> {
        let mut client = TcpStream::connect(self.addr).await.expect("connect");
        client.write_all(request).await.expect("send");
        let mut reply = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut reply))
            .await
            .expect("relay must close the connection")
            .expect("read");
        reply
    }

    /// Instrument writes made on behalf of clients, as text.
    fn relayed_writes(&self) -> Vec<String> {
        self.journal
            .writes()
            .into_iter()
            .skip(self.startup_writes)
            .map(|(_, bytes)| String::from_utf8_lossy(&bytes).into_owned())
            .collect()
    }

    /// Read bounds used on behalf of clients.
    fn relayed_reads(&self) -> Vec<usize> {
        // Discovery does one identification read per identification write.
        self.journal
            .reads()
            .into_iter()
            .skip(self.startup_writes)
            .map(|(_, max)| max)
            .collect()
    }

    async fn stop(self) -> MockJournal {
        self.running.store(false, Ordering::Relaxed);
        self.server.await.expect("server task").expect("server result");
        let worker = self.worker;
        tokio::task::spawn_blocking(move || worker.join()).await.expect("join");
        self.journal
    }
}

fn bench() -> MockResourceManager {
    MockResourceManager::new()
        .with_instrument(
            SCOPE,
            MockInstrument::new("TEKTRONIX,MSO24,C012345,CF:91.1CT FV:2.0.3").echo_unknown_queries(),
        )
        .with_instrument(PSU, MockInstrument::new("Keysight Technologies,E36313A,MY5900,2.1.0"))
}

// ── Query / directive branches ────────────────────────────────────────────────

#[tokio::test]
async fn test_idn_query_is_relayed_with_one_extra_newline() {
    // Arrange
    let relay = Relay::start(bench(), "tektronix", ServerOptions::default()).await;

    // Act
    let reply = relay.exchange(b"*IDN?\n").await;

    // Assert
    assert_eq!(reply, b"TEKTRONIX,MSO24,C012345,CF:91.1CT FV:2.0.3\n\n");
    assert_eq!(relay.relayed_writes(), vec!["*IDN?\n"]);
    assert_eq!(relay.relayed_reads(), vec![2048]);
    relay.stop().await;
}

#[tokio::test]
async fn test_directive_is_acknowledged_without_a_read() {
    let relay = Relay::start(bench(), "tektronix", ServerOptions::default()).await;

    let reply = relay.exchange(b"OUTPUT ON\n").await;

    assert_eq!(reply, b"Command sent\n");
    assert_eq!(relay.relayed_writes(), vec!["OUTPUT ON\n"]);
    assert!(relay.relayed_reads().is_empty());
    relay.stop().await;
}

#[tokio::test]
async fn test_crlf_terminated_command_is_normalised() {
    let relay = Relay::start(bench(), "tektronix", ServerOptions::default()).await;

    let reply = relay.exchange(b"CH1:SCALE?\r\n").await;

    assert_eq!(reply, b"CH1:SCALE?\n\n");
    assert_eq!(relay.relayed_writes(), vec!["CH1:SCALE?\n"]);
    relay.stop().await;
}

#[tokio::test]
async fn test_oversized_response_is_truncated_to_2048_bytes() {
    // Arrange
    let rm = MockResourceManager::new().with_instrument(
        SCOPE,
        MockInstrument::new("TEKTRONIX,MSO24").with_response("CURV?", vec![b'5'; 5000]),
    );
    let relay = Relay::start(rm, "tektronix", ServerOptions::default()).await;

    // Act
    let reply = relay.exchange(b"CURV?\n").await;

    // Assert
    assert_eq!(reply.len(), 2048 + 1);
    assert_eq!(reply.last(), Some(&b'\n'));
    relay.stop().await;
}

// ── Edge cases ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_then_disconnect_never_touches_instrument() {
    // Arrange
    let relay = Relay::start(bench(), "tektronix", ServerOptions::default()).await;

    // Act
    drop(TcpStream::connect(relay.addr).await.unwrap());
    // A following client proves the relay kept serving.
    let reply = relay.exchange(b"*CLS\n").await;

    // Assert
    assert_eq!(reply, b"Command sent\n");
    assert_eq!(relay.relayed_writes(), vec!["*CLS\n"]);
    relay.stop().await;
}

#[tokio::test]
async fn test_blank_line_gets_no_reply_and_no_write() {
    let relay = Relay::start(bench(), "tektronix", ServerOptions::default()).await;

    let reply = relay.exchange(b"  \r\n").await;

    assert!(reply.is_empty());
    assert!(relay.relayed_writes().is_empty());
    relay.stop().await;
}

#[tokio::test]
async fn test_second_command_on_same_connection_is_ignored() {
    let relay = Relay::start(bench(), "tektronix", ServerOptions::default()).await;

    let reply = relay.exchange(b"*RST\n*IDN?\n").await;

    assert_eq!(reply, b"Command sent\n");
    assert_eq!(relay.relayed_writes(), vec!["*RST\n"]);
    relay.stop().await;
}

#[tokio::test]
async fn test_non_utf8_command_bytes_reach_instrument_verbatim() {
    // Arrange
    let relay = Relay::start(bench(), "tektronix", ServerOptions::default()).await;
    let raw = b"DISP:TEXT \"5\xB5V\"\n";

    // Act
    let reply = relay.exchange(raw).await;

    // Assert
    let sent: Vec<Vec<u8>> = relay
        .journal
        .writes()
        .into_iter()
        .skip(relay.startup_writes)
        .map(|(_, bytes)| bytes)
        .collect();
    assert_eq!(reply, b"Command sent\n");
    assert_eq!(sent, vec![raw.to_vec()]);
    relay.stop().await;
}

#[tokio::test]
async fn test_overlong_command_is_rejected_before_instrument() {
    let options = ServerOptions {
        relay: RelayOptions {
            max_command_bytes: 64,
            ..RelayOptions::default()
        },
        ..ServerOptions::default()
    };
    let relay = Relay::start(bench(), "tektronix", options).await;

    let mut request = vec![b'A'; 100];
    request.push(b'\n');
    let reply = relay.exchange(&request).await;

    assert_eq!(reply, b"Error: command too long\n");
    assert!(relay.relayed_writes().is_empty());
    relay.stop().await;
}

// ── Session lifetime ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_session_is_reused_across_connections() {
    // Arrange
    let relay = Relay::start(bench(), "keysight", ServerOptions::default()).await;
    let opened_at_startup = relay.journal.opened().len();

    // Act
    let first = relay.exchange(b"VOLT 5\n").await;
    let second = relay.exchange(b"*IDN?\n").await;

    // Assert
    assert_eq!(first, b"Command sent\n");
    assert_eq!(second, b"Keysight Technologies,E36313A,MY5900,2.1.0\n\n");
    assert_eq!(relay.journal.opened().len(), opened_at_startup, "no reopen per client");
    let psu = ResourceDescriptor::from(PSU);
    assert!(relay.journal.writes_to(&psu).ends_with(&["VOLT 5\n".to_string(), "*IDN?\n".to_string()]));
    relay.stop().await;
}

#[tokio::test]
async fn test_read_failure_is_reported_and_session_survives() {
    // Arrange: the scope answers *IDN? but has nothing queued for MEAS?.
    let rm = MockResourceManager::new().with_instrument(SCOPE, MockInstrument::new("TEKTRONIX,MSO24"));
    let relay = Relay::start(rm, "tek", ServerOptions::default()).await;

    // Act
    let failed = relay.exchange(b"MEAS:VOLT?\n").await;
    let next = relay.exchange(b"*IDN?\n").await;

    // Assert
    assert_eq!(failed, b"Error reading response\n");
    assert_eq!(next, b"TEKTRONIX,MSO24\n\n");
    relay.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_session_then_releases_manager() {
    // Arrange
    let relay = Relay::start(bench(), "tektronix", ServerOptions::default()).await;
    relay.exchange(b"*CLS\n").await;
    let closed_during_discovery = relay.journal.closed().len();

    // Act
    let journal = relay.stop().await;

    // Assert
    let closed = journal.closed();
    assert_eq!(closed.len(), closed_during_discovery + 1);
    assert_eq!(closed.last(), Some(&ResourceDescriptor::from(SCOPE)));
    assert!(journal.manager_released());
}

// ── Reply format and concurrency ──────────────────────────────────────────────

#[tokio::test]
async fn test_json_reply_envelope() {
    let options = ServerOptions {
        relay: RelayOptions {
            reply_format: ReplyFormat::Json,
            ..RelayOptions::default()
        },
        ..ServerOptions::default()
    };
    let relay = Relay::start(bench(), "tektronix", options).await;

    let reply = relay.exchange(b"*OPC\n").await;

    let text = String::from_utf8(reply).unwrap();
    assert!(text.ends_with('\n'));
    let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(value["status"], "ok");
    assert_eq!(value["payload"], "Command sent");
    relay.stop().await;
}

#[tokio::test]
async fn test_concurrent_clients_each_get_their_own_reply() {
    // Arrange
    let options = ServerOptions {
        concurrent_clients: true,
        ..ServerOptions::default()
    };
    let relay = Arc::new(Relay::start(bench(), "tektronix", options).await);

    // Act
    let mut tasks = Vec::new();
    for i in 0..10 {
        let relay = Arc::clone(&relay);
        tasks.push(tokio::spawn(async move {
            let query = format!("CH{i}:SCALE?\n");
            (query.clone(), relay.exchange(query.as_bytes()).await)
        }));
    }
    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    // Assert: echoed responses prove no reply was crossed between clients.
    for (query, reply) in &results {
        assert_eq!(reply, format!("{query}\n").as_bytes());
    }
    let relay = Arc::try_unwrap(relay).ok().expect("all client tasks finished");
    assert_eq!(relay.relayed_writes().len(), 10);
    relay.stop().await;
}
