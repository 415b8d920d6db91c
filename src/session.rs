//! Session struct definition
//!
//! Represents one connected user: their current name, remote address,
//! and the outbound mailbox drained by that connection's writer task.

use std::sync::RwLock;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::error::ChatError;

/// Capacity of a session's outbound mailbox. The broadcast dispatcher
/// drops messages for a session whose mailbox is full rather than stall.
pub const MAILBOX_CAPACITY: usize = 32;

/// One connected chat participant
///
/// The name is mutable (rename command); the remote address is fixed for
/// the session's life and doubles as the initial display name. Mailbox
/// entries are complete wire strings, terminators included.
#[derive(Debug)]
pub struct Session {
    /// Current display name, unique among online sessions
    name: RwLock<String>,
    /// Remote endpoint, used as the default name and in broadcast tags
    addr: String,
    /// Server → client mailbox; the paired receiver lives in the writer task
    mailbox: mpsc::Sender<String>,
}

impl Session {
    /// Create a session named after its remote address
    pub fn new(addr: impl Into<String>, mailbox: mpsc::Sender<String>) -> Self {
        let addr = addr.into();
        Self {
            name: RwLock::new(addr.clone()),
            addr,
            mailbox,
        }
    }

    /// Current display name
    pub fn name(&self) -> String {
        self.name.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Remote address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Replace the display name. Only the registry calls this, under its
    /// write lock, so the registry key and the session name cannot drift.
    pub(crate) fn set_name(&self, name: &str) {
        *self.name.write().unwrap_or_else(|e| e.into_inner()) = name.to_string();
    }

    /// Queue a wire string for this session, waiting for mailbox capacity
    ///
    /// Returns an error if the writer task is gone (session torn down).
    pub async fn send(&self, msg: String) -> Result<(), ChatError> {
        self.mailbox
            .send(msg)
            .await
            .map_err(|_| ChatError::ChannelClosed)
    }

    /// Queue a wire string without waiting
    ///
    /// Used by the broadcast dispatcher, which must never block on a single
    /// slow recipient.
    pub fn try_send(&self, msg: String) -> Result<(), TrySendError<String>> {
        self.mailbox.try_send(msg)
    }
}
