//! TCP acceptor: accept loop and per-connection dispatch.
//!
//! By default connections are served one after another on the accept task,
//! which reproduces the classic single-threaded relay: a second client waits
//! in the listen backlog until the first one's reply has been sent.  With
//! `concurrent_clients` each connection gets its own Tokio task; instrument
//! traffic is still serialised by the session worker behind the executor.
//!
//! Shutdown is cooperative.  Clearing `running` stops the accept loop within
//! one accept timeout, and any connection still in progress is dropped.  An
//! instrument transaction already handed to the session worker completes
//! there; only its reply is discarded.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::application::relay::{handle_connection, CommandExecutor, ConnectionOutcome, RelayOptions};

/// How often the accept loop and idle connections re-check `running`.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Acceptor settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerOptions {
    pub concurrent_clients: bool,
    pub relay: RelayOptions,
}

/// Binds the relay's listening socket.
///
/// # Errors
///
/// Returns an error if the address is in use or the process lacks
/// permission to bind it.
pub async fn bind_listener(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {addr}"))?;
    info!("relay listening on {}", listener.local_addr().unwrap_or(addr));
    Ok(listener)
}

/// Runs the accept loop until `running` is set to `false`.
///
/// Accept errors are logged and the loop continues.  Per-connection
/// failures never reach this function.
pub async fn run_server<E>(
    listener: TcpListener,
    executor: Arc<E>,
    options: ServerOptions,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()>
where
    E: CommandExecutor + 'static,
{
    let mut clients = JoinSet::new();

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        while let Some(finished) = clients.try_join_next() {
            if let Err(e) = finished {
                error!("client task failed: {e}");
            }
        }

        match timeout(SHUTDOWN_POLL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                info!("client connected from {peer}");
                if options.concurrent_clients {
                    let executor = Arc::clone(&executor);
                    let running = Arc::clone(&running);
                    clients.spawn(async move {
                        serve_client(stream, peer, executor.as_ref(), &options.relay, &running).await;
                    });
                } else {
                    serve_client(stream, peer, executor.as_ref(), &options.relay, &running).await;
                }
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    if !clients.is_empty() {
        info!("dropping {} client connection(s) still in progress", clients.len());
    }
    clients.shutdown().await;
    Ok(())
}

async fn serve_client<E>(
    mut stream: TcpStream,
    peer: SocketAddr,
    executor: &E,
    options: &RelayOptions,
    running: &AtomicBool,
) where
    E: CommandExecutor + ?Sized,
{
    tokio::select! {
        outcome = handle_connection(&mut stream, executor, options) => {
            match outcome {
                ConnectionOutcome::Replied(reply) => debug!("{peer}: replied {reply:?}"),
                ConnectionOutcome::Aborted => warn!("{peer}: exchange aborted"),
                other => debug!("{peer}: {other:?}"),
            }
        }
        () = shutdown_requested(running) => {
            info!("{peer}: connection dropped for shutdown");
        }
    }

    if let Err(e) = stream.shutdown().await {
        debug!("{peer}: shutdown: {e}");
    }
    info!("client {peer} disconnected");
}

async fn shutdown_requested(running: &AtomicBool) {
    while running.load(Ordering::Relaxed) {
        sleep(SHUTDOWN_POLL).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
