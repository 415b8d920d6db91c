//! Broadcast bus
//!
//! A single ordered channel of preformatted wire strings with exactly one
//! consumer, the dispatcher task, which fans each message out to every
//! session in a registry snapshot.
//!
//! Backpressure policy: the bus itself is bounded, so publishers wait when
//! the dispatcher lags. Per-recipient delivery uses `try_send`; a session
//! whose mailbox is full loses that message (logged) rather than stalling
//! the dispatcher for everyone else.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::registry::Registry;

/// Capacity of the bus channel; publishers block once it fills
pub const BUS_CAPACITY: usize = 256;

/// Publisher handle for the broadcast bus
///
/// Cheap to clone; every connection handler holds one.
#[derive(Debug, Clone)]
pub struct Bus {
    tx: mpsc::Sender<String>,
}

impl Bus {
    /// Create a bus and the dispatcher that will drain it
    pub fn new(registry: Arc<Registry>) -> (Self, Dispatcher) {
        let (tx, rx) = mpsc::channel(BUS_CAPACITY);
        (Self { tx }, Dispatcher { rx, registry })
    }

    /// Enqueue a preformatted message for delivery to all online sessions
    ///
    /// Waits for bus capacity but never for individual recipients.
    pub async fn publish(&self, msg: String) -> Result<(), ChatError> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| ChatError::ChannelClosed)
    }
}

/// The singleton bus consumer
///
/// Runs until every `Bus` handle is dropped. Dispatch across messages is
/// FIFO; delivery order across recipients of one message is unspecified.
#[derive(Debug)]
pub struct Dispatcher {
    rx: mpsc::Receiver<String>,
    registry: Arc<Registry>,
}

impl Dispatcher {
    /// Run the fan-out loop
    pub async fn run(mut self) {
        info!("broadcast dispatcher started");

        while let Some(msg) = self.rx.recv().await {
            // Deliver to the sessions registered right now; the lock is
            // released before any delivery happens.
            for session in self.registry.snapshot() {
                match session.try_send(msg.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("mailbox full for '{}', dropping broadcast", session.name());
                    }
                    Err(TrySendError::Closed(_)) => {
                        // Session is mid-teardown; it will leave the
                        // registry on its own.
                        debug!("mailbox closed for '{}'", session.name());
                    }
                }
            }
        }

        info!("broadcast dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Session, MAILBOX_CAPACITY};
    use tokio::sync::mpsc;

    fn register(registry: &Registry, name: &str, capacity: usize) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(capacity);
        let session = Arc::new(Session::new(format!("addr:{}", name), tx));
        session.set_name(name);
        registry.insert(name, session).unwrap();
        rx
    }

    #[tokio::test]
    async fn test_publish_fans_out_to_all_registered() {
        let registry = Arc::new(Registry::new());
        let (bus, dispatcher) = Bus::new(registry.clone());
        tokio::spawn(dispatcher.run());

        let mut alice_rx = register(&registry, "alice", MAILBOX_CAPACITY);
        let mut bob_rx = register(&registry, "bob", MAILBOX_CAPACITY);

        bus.publish("hello everyone\n".to_string()).await.unwrap();

        assert_eq!(alice_rx.recv().await.unwrap(), "hello everyone\n");
        assert_eq!(bob_rx.recv().await.unwrap(), "hello everyone\n");
    }

    #[tokio::test]
    async fn test_unregistered_session_receives_nothing() {
        let registry = Arc::new(Registry::new());
        let (bus, dispatcher) = Bus::new(registry.clone());

        let mut alice_rx = register(&registry, "alice", MAILBOX_CAPACITY);
        let mut bob_rx = register(&registry, "bob", MAILBOX_CAPACITY);
        registry.remove("bob");

        tokio::spawn(dispatcher.run());
        bus.publish("hello\n".to_string()).await.unwrap();

        assert_eq!(alice_rx.recv().await.unwrap(), "hello\n");
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_mailbox_does_not_stall_other_recipients() {
        let registry = Arc::new(Registry::new());
        let (bus, dispatcher) = Bus::new(registry.clone());
        tokio::spawn(dispatcher.run());

        // Slow consumer with room for a single message, never drained.
        let mut slow_rx = register(&registry, "slow", 1);
        let mut fast_rx = register(&registry, "fast", MAILBOX_CAPACITY);

        bus.publish("one\n".to_string()).await.unwrap();
        bus.publish("two\n".to_string()).await.unwrap();
        bus.publish("three\n".to_string()).await.unwrap();

        // The fast session sees everything despite the stalled peer.
        assert_eq!(fast_rx.recv().await.unwrap(), "one\n");
        assert_eq!(fast_rx.recv().await.unwrap(), "two\n");
        assert_eq!(fast_rx.recv().await.unwrap(), "three\n");

        // The slow session kept only what fit.
        assert_eq!(slow_rx.recv().await.unwrap(), "one\n");
        assert!(slow_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_order_is_fifo() {
        let registry = Arc::new(Registry::new());
        let (bus, dispatcher) = Bus::new(registry.clone());
        tokio::spawn(dispatcher.run());

        let mut rx = register(&registry, "alice", MAILBOX_CAPACITY);

        for i in 0..5 {
            bus.publish(format!("msg {}\n", i)).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap(), format!("msg {}\n", i));
        }
    }
}
