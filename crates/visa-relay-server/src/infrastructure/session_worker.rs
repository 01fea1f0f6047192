//! Dedicated thread that owns the instrument session.
//!
//! Instrument transports are blocking, and most of them are not safe to
//! drive from two threads at once.  The session and the resource manager are
//! therefore moved onto one OS thread for the rest of the process.  Async
//! connection handlers reach it through a [`SessionHandle`], which sends a
//! request over a channel and awaits the reply on a oneshot.
//!
//! The worker processes requests strictly one at a time, so a query's write
//! and read are never interleaved with another client's traffic even when
//! connections are handled concurrently.
//!
//! When every handle has been dropped the worker closes the session, then
//! releases the resource manager, then exits.

use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use visa_relay_core::{Command, CommandKind, InstrumentSession, ResourceManager, SessionError};

use crate::application::relay::CommandExecutor;

const REQUEST_QUEUE_DEPTH: usize = 32;

struct Request {
    command: Command,
    kind: CommandKind,
    reply: oneshot::Sender<Result<Option<Vec<u8>>, SessionError>>,
}

/// Cloneable async front end to the session thread.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Request>,
}

#[async_trait]
impl CommandExecutor for SessionHandle {
    async fn execute(
        &self,
        command: Command,
        kind: CommandKind,
    ) -> Result<Option<Vec<u8>>, SessionError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(Request {
                command,
                kind,
                reply,
            })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        response.await.map_err(|_| SessionError::Unavailable)?
    }
}

/// Join handle for the session thread.
#[derive(Debug)]
pub struct SessionWorker {
    thread: JoinHandle<()>,
}

impl SessionWorker {
    /// Blocks until the worker has closed the session and released the
    /// manager.  Returns only after every [`SessionHandle`] is dropped.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("instrument session worker panicked");
        }
    }
}

/// Moves `session` and `manager` onto a new thread.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be spawned.
pub fn spawn_session_worker<M>(
    session: InstrumentSession,
    manager: M,
) -> std::io::Result<(SessionHandle, SessionWorker)>
where
    M: ResourceManager + 'static,
{
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let thread = thread::Builder::new()
        .name("instrument-session".to_string())
        .spawn(move || serve(session, manager, rx))?;
    Ok((SessionHandle { tx }, SessionWorker { thread }))
}

fn serve<M: ResourceManager>(
    mut session: InstrumentSession,
    manager: M,
    mut rx: mpsc::Receiver<Request>,
) {
    info!("session worker serving {}", session.descriptor());

    while let Some(request) = rx.blocking_recv() {
        let result = session.transact(&request.command, request.kind);
        if let Err(e) = &result {
            warn!("{:?} on {}: {e}", request.command.to_string(), session.descriptor());
        }
        if request.reply.send(result).is_err() {
            debug!("client went away before its reply was ready");
        }
    }

    let descriptor = session.descriptor().clone();
    if let Err(e) = session.close() {
        warn!("closing session on {descriptor}: {e}");
    }
    drop(manager);
    info!("resource manager released");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
