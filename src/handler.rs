//! Per-connection lifecycle
//!
//! Owns one connection from registration to teardown:
//! `Connecting → Online → {Offline, Evicted}`. A read loop feeds lines to
//! the command router and doubles as the liveness timer (every read races
//! the idle window); a dedicated writer task is the only thing that ever
//! writes to the socket, draining the session mailbox.
//!
//! Generic over the byte stream so tests can drive it with in-memory
//! duplex pipes instead of real sockets.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::command::{broadcast_line, Router};
use crate::error::ChatError;
use crate::registry::Registry;
use crate::session::{Session, MAILBOX_CAPACITY};

/// Maximum accepted line length in bytes. An oversized line is a
/// connection error for that session, not a server failure.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Notice sent to a session just before it is evicted for inactivity
pub const EVICTION_NOTICE: &str = "you have been evicted for inactivity\n";

/// How long teardown waits for the writer task to flush before closing
/// the socket out from under it. A peer that stopped reading can wedge
/// the writer indefinitely; teardown must not wait for that.
const FLUSH_GRACE: Duration = Duration::from_secs(5);

/// Wait briefly for the writer task to drain, then force the socket shut
async fn flush_writer(mut writer: JoinHandle<()>) {
    if timeout(FLUSH_GRACE, &mut writer).await.is_err() {
        debug!("writer task did not drain in time, closing the socket");
        writer.abort();
    }
}

/// Drive one connection through its whole lifecycle
///
/// Registers a session under its remote address, announces the join,
/// routes every received line, and evicts the session if nothing arrives
/// within `idle_timeout`. Eviction and normal disconnect share the single
/// teardown path at the end of this function, so teardown runs exactly
/// once per session.
pub async fn handle_connection<S>(
    stream: S,
    addr: String,
    registry: Arc<Registry>,
    bus: Bus,
    idle_timeout: Duration,
) -> Result<(), ChatError>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut lines = FramedRead::new(
        read_half,
        LinesCodec::new_with_max_length(MAX_LINE_LENGTH),
    );

    let (mailbox_tx, mut mailbox_rx) = mpsc::channel::<String>(MAILBOX_CAPACITY);
    let session = Arc::new(Session::new(addr.clone(), mailbox_tx));

    // Writer task: sole owner of the write half. Drains the mailbox until
    // every sender handle is gone, then flushes and closes the socket.
    let writer = tokio::spawn(async move {
        while let Some(msg) = mailbox_rx.recv().await {
            if let Err(e) = write_half.write_all(msg.as_bytes()).await {
                debug!("socket write failed, ending writer task: {}", e);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    // Connecting → Online: the session becomes visible to everyone.
    if let Err(e) = registry.insert(&addr, session.clone()) {
        // Cannot happen for address-derived names, but the reply keeps the
        // operation total: notify and hang up.
        let _ = session.send(format!("{}\n", e)).await;
        drop(session);
        flush_writer(writer).await;
        return Err(e);
    }

    info!("'{}' is online", addr);
    if let Err(e) = bus.publish(broadcast_line(&addr, &addr, "has joined")).await {
        // Bus gone means the server is shutting down; undo the insert so
        // the registry never holds a session nobody is handling.
        registry.remove(&addr);
        drop(session);
        flush_writer(writer).await;
        return Err(e);
    }

    let router = Router::new(registry.clone(), bus.clone());

    // Online: every successful read re-arms the idle window.
    let mut evicted = false;
    loop {
        match timeout(idle_timeout, lines.next()).await {
            // Online → Evicted: nothing read for the whole window
            Err(_) => {
                evicted = true;
                break;
            }
            // Online → Offline: peer closed the connection
            Ok(None) => break,
            Ok(Some(Ok(line))) => {
                if let Err(e) = router.dispatch(&session, &line).await {
                    // Our own mailbox or the bus is gone; nothing left to do
                    debug!("dispatch failed for '{}': {}", session.name(), e);
                    break;
                }
            }
            // Online → Offline: non-recoverable read error
            Ok(Some(Err(e))) => {
                warn!("read error from '{}': {}", session.name(), e);
                break;
            }
        }
    }

    // Shared teardown for both terminal states.
    let name = session.name();
    if evicted {
        info!("evicting '{}' after {:?} of inactivity", name, idle_timeout);
        // Best effort only: a full mailbox means the peer stopped reading,
        // and teardown must not wait on it.
        if session.try_send(EVICTION_NOTICE.to_string()).is_err() {
            debug!("eviction notice for '{}' not deliverable", name);
        }
    } else {
        info!("'{}' is offline", name);
    }

    registry.remove(&name);
    if let Err(e) = bus.publish(broadcast_line(&addr, &name, "has left")).await {
        debug!("leave broadcast not published, bus closed: {}", e);
    }

    // Closing the mailbox lets the writer flush any final notices and
    // shut the socket down.
    drop(session);
    flush_writer(writer).await;

    Ok(())
}
