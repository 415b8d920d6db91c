//! Server assembly and accept loop
//!
//! Wires the registry, broadcast dispatcher and listener together and
//! spawns one connection handler per accepted socket. Ctrl-C triggers a
//! graceful shutdown: stop accepting, notify every session, and clear the
//! registry so each writer task flushes and closes its socket.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::bus::{Bus, Dispatcher};
use crate::config::Config;
use crate::error::ChatError;
use crate::handler::handle_connection;
use crate::registry::Registry;

/// The chat server: shared state plus the accept loop
#[derive(Debug)]
pub struct Server {
    config: Config,
    registry: Arc<Registry>,
    bus: Bus,
    dispatcher: Dispatcher,
}

impl Server {
    /// Assemble a server from its configuration
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(Registry::new());
        let (bus, dispatcher) = Bus::new(registry.clone());
        Self {
            config,
            registry,
            bus,
            dispatcher,
        }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self) -> Result<(), ChatError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("chat server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve on an already-bound listener
    ///
    /// Split from [`run`](Self::run) so tests can bind an ephemeral port
    /// themselves.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ChatError> {
        let Server {
            config,
            registry,
            bus,
            dispatcher,
        } = self;

        tokio::spawn(dispatcher.run());

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        info!("new connection from {}", peer_addr);
                        let registry = registry.clone();
                        let bus = bus.clone();
                        let idle_timeout = config.idle_timeout;
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(
                                stream,
                                peer_addr.to_string(),
                                registry,
                                bus,
                                idle_timeout,
                            )
                            .await
                            {
                                error!("connection handler error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {}", e);
                    }
                },
                _ = signal::ctrl_c() => {
                    info!("shutdown requested, closing {} sessions", registry.len());
                    for session in registry.snapshot() {
                        let _ = session.try_send("server shutting down\n".to_string());
                    }
                    // Dropping every session closes its mailbox; writer
                    // tasks flush the notice and shut their sockets down.
                    registry.clear();
                    return Ok(());
                }
            }
        }
    }
}
