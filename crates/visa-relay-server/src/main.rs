//! VISA-Relay server entry point.
//!
//! Exposes one bench instrument as a line-oriented TCP relay: each client
//! connection carries one SCPI command, and queries get the instrument's
//! answer back on the same connection.
//!
//! # Usage
//!
//! ```text
//! visa-relay [OPTIONS]
//!
//! Options:
//!   --config       <PATH>     TOML configuration file
//!   --port         <PORT>     Relay listener port [default: 12345]
//!   --bind         <ADDR>     Relay listener address [default: 0.0.0.0]
//!   --search-key   <TEXT>     Substring of the wanted *IDN? reply
//!   --resource     <DESC>     Explicit resource descriptor (skips discovery)
//!   --transport    <KIND>     socket | simulated [default: socket]
//!   --endpoint     <HOST:PORT> SCPI socket endpoint (repeatable)
//!   --reply-format <FORMAT>   text | json [default: text]
//!   --concurrent              Serve clients on separate tasks
//! ```
//!
//! Command-line values override the configuration file.  Each flag can also
//! be set through the environment:
//!
//! | Variable                    | Flag             |
//! |-----------------------------|------------------|
//! | `VISA_RELAY_CONFIG`         | `--config`       |
//! | `VISA_RELAY_PORT`           | `--port`         |
//! | `VISA_RELAY_BIND`           | `--bind`         |
//! | `VISA_RELAY_SEARCH_KEY`     | `--search-key`   |
//! | `VISA_RELAY_RESOURCE`       | `--resource`     |
//! | `VISA_RELAY_TRANSPORT`      | `--transport`    |
//! | `VISA_RELAY_ENDPOINTS`      | `--endpoint` (comma separated) |
//! | `VISA_RELAY_REPLY_FORMAT`   | `--reply-format` |
//! | `VISA_RELAY_CONCURRENT`     | `--concurrent`   |
//!
//! Log verbosity comes from `RUST_LOG`, falling back to `log_level` in the
//! configuration file.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use visa_relay_core::ReplyFormat;
use visa_relay_server::application::open_instrument::open_selected_instrument;
use visa_relay_server::infrastructure::config::{load_config, RelayConfig, TransportKind};
use visa_relay_server::infrastructure::{
    bind_listener, open_resource_manager, run_server, spawn_session_worker, SessionHandle,
    ServerOptions,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Network relay for a single SCPI instrument.
#[derive(Debug, Parser)]
#[command(
    name = "visa-relay",
    about = "Line-oriented TCP relay for one VISA/SCPI instrument",
    version
)]
struct Cli {
    /// TOML configuration file.  Without it, built-in defaults apply.
    #[arg(long, env = "VISA_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port for the relay listener.
    #[arg(long, env = "VISA_RELAY_PORT")]
    port: Option<u16>,

    /// IP address to bind the relay listener to.
    #[arg(long, env = "VISA_RELAY_BIND")]
    bind: Option<String>,

    /// Case-insensitive substring of the instrument's identification.
    #[arg(long, env = "VISA_RELAY_SEARCH_KEY")]
    search_key: Option<String>,

    /// Resource descriptor to open directly, skipping discovery.
    #[arg(long, env = "VISA_RELAY_RESOURCE")]
    resource: Option<String>,

    /// Instrument transport backend.
    #[arg(long, env = "VISA_RELAY_TRANSPORT")]
    transport: Option<TransportKind>,

    /// `host:port` of a raw SCPI socket instrument.
    #[arg(
        long = "endpoint",
        env = "VISA_RELAY_ENDPOINTS",
        value_delimiter = ','
    )]
    endpoints: Vec<String>,

    /// Reply encoding sent back to clients.
    #[arg(long, env = "VISA_RELAY_REPLY_FORMAT")]
    reply_format: Option<ReplyFormat>,

    /// Handle client connections concurrently.
    #[arg(long, env = "VISA_RELAY_CONCURRENT")]
    concurrent: bool,
}

impl Cli {
    /// Loads the configuration file (if any) and applies command-line
    /// overrides on top of it.
    ///
    /// # Errors
    ///
    /// Returns an error if `--config` names a file that cannot be read or
    /// parsed.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => RelayConfig::default(),
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(format) = self.reply_format {
            config.server.reply_format = format;
        }
        if self.concurrent {
            config.server.concurrent_clients = true;
        }
        if self.search_key.is_some() {
            config.instrument.search_key = self.search_key;
        }
        if self.resource.is_some() {
            config.instrument.resource = self.resource;
        }
        if let Some(kind) = self.transport {
            config.transport.kind = kind;
        }
        if !self.endpoints.is_empty() {
            config.transport.endpoints = self.endpoints;
        }

        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// Startup order: configuration, logging, transport, instrument selection,
/// session worker, listener.  Shutdown runs in reverse: the accept loop
/// stops, the last session handle is dropped, and the worker closes the
/// session before releasing the resource manager.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_relay_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    config.validate().context("invalid configuration")?;
    info!(
        "VISA-Relay starting: transport={}, listen={}:{}",
        config.transport.kind, config.server.bind_address, config.server.port
    );

    let mut manager =
        open_resource_manager(&config.transport).context("failed to open resource manager")?;

    // On failure the manager is dropped (released) before the error surfaces.
    let session = open_selected_instrument(manager.as_mut(), &config.instrument.selection())
        .context("instrument startup failed")?;

    let (handle, worker) =
        spawn_session_worker(session, manager).context("failed to start session worker")?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let served = serve(&config, Arc::new(handle), running).await;

    // The executor Arc is gone now, so the worker drains and exits.
    tokio::task::spawn_blocking(move || worker.join())
        .await
        .context("session worker join failed")?;

    served?;
    info!("VISA-Relay stopped");
    Ok(())
}

async fn serve(
    config: &RelayConfig,
    executor: Arc<SessionHandle>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = bind_listener(config.server.bind_addr()?).await?;
    let options = ServerOptions {
        concurrent_clients: config.server.concurrent_clients,
        relay: config.server.relay_options(),
    };
    run_server(listener, executor, options, running).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
