//! Command protocol
//!
//! Parses one line of client input into a command and executes it against
//! the registry and the broadcast bus. The grammar is pipe-delimited,
//! case-sensitive, with no field escaping:
//!
//! | Line                     | Action                                   |
//! |--------------------------|------------------------------------------|
//! | `who`                    | List online users, reply to sender only  |
//! | `rename\|<name>`         | Change the sender's registered name      |
//! | `to\|<name>\|<text>`     | Private message, target's mailbox only   |
//! | anything else, non-empty | Public broadcast                         |
//! | empty line               | No-op                                    |
//!
//! Command failures (taken name, unknown target, malformed private syntax)
//! are reported as a text line to the sender and are never fatal to the
//! connection.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bus::Bus;
use crate::error::ChatError;
use crate::registry::Registry;
use crate::session::Session;

/// A parsed client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `who` - list online users
    Who,
    /// `rename|<name>` - change the sender's name
    Rename(String),
    /// `to|<name>|<text>` - private message
    Private { target: String, text: String },
    /// Any other non-empty line - public broadcast
    Broadcast(String),
}

impl Command {
    /// Parse one delimiter-stripped line
    ///
    /// Returns `Ok(None)` for an empty line (a no-op, not an error) and
    /// `MalformedCommand` for private-message syntax missing its second
    /// pipe or a field left empty.
    pub fn parse(line: &str) -> Result<Option<Command>, ChatError> {
        if line.is_empty() {
            return Ok(None);
        }
        if line == "who" {
            return Ok(Some(Command::Who));
        }
        if let Some(name) = line.strip_prefix("rename|") {
            if name.is_empty() {
                return Err(ChatError::MalformedCommand(line.to_string()));
            }
            return Ok(Some(Command::Rename(name.to_string())));
        }
        if let Some(rest) = line.strip_prefix("to|") {
            let Some((target, text)) = rest.split_once('|') else {
                return Err(ChatError::MalformedCommand(line.to_string()));
            };
            if target.is_empty() {
                return Err(ChatError::MalformedCommand(line.to_string()));
            }
            return Ok(Some(Command::Private {
                target: target.to_string(),
                text: text.to_string(),
            }));
        }
        Ok(Some(Command::Broadcast(line.to_string())))
    }
}

/// Format a public broadcast: `[<address>]<name>: <text>` plus newline
pub fn broadcast_line(addr: &str, name: &str, text: &str) -> String {
    format!("[{}]{}: {}\n", addr, name, text)
}

/// Format a private delivery. The blank-line terminator (`\n\n`) is kept
/// for wire compatibility with existing clients.
pub fn private_line(sender: &str, text: &str) -> String {
    format!("{} says: {}\n\n", sender, text)
}

/// Format one entry of a `who` reply
pub fn who_line(addr: &str, name: &str) -> String {
    format!("[{}]{}: online\n", addr, name)
}

/// Executes parsed commands for one session
///
/// Holds the shared registry and bus handles; replies always go through
/// the sending session's own mailbox.
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<Registry>,
    bus: Bus,
}

impl Router {
    /// Create a router over the shared registry and bus
    pub fn new(registry: Arc<Registry>, bus: Bus) -> Self {
        Self { registry, bus }
    }

    /// Parse and execute one input line on behalf of `sender`
    ///
    /// Only returns an error when the sender itself is unreachable (its
    /// mailbox or the bus is gone), which ends the connection.
    pub async fn dispatch(&self, sender: &Arc<Session>, line: &str) -> Result<(), ChatError> {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(()),
            Err(e) => {
                debug!("malformed line from '{}': {:?}", sender.name(), line);
                return sender.send(format!("{}\n", e)).await;
            }
        };

        match command {
            Command::Who => self.who(sender).await,
            Command::Rename(new_name) => self.rename(sender, &new_name).await,
            Command::Private { target, text } => self.private(sender, &target, &text).await,
            Command::Broadcast(text) => {
                self.bus
                    .publish(broadcast_line(sender.addr(), &sender.name(), &text))
                    .await
            }
        }
    }

    /// Reply to the sender with every online user; no side effects
    async fn who(&self, sender: &Arc<Session>) -> Result<(), ChatError> {
        for session in self.registry.snapshot() {
            sender
                .send(who_line(session.addr(), &session.name()))
                .await?;
        }
        Ok(())
    }

    /// Rename the sender, rejecting taken names
    async fn rename(&self, sender: &Arc<Session>, new_name: &str) -> Result<(), ChatError> {
        match self.registry.rename(&sender.name(), new_name) {
            Ok(true) => {
                info!("'{}' renamed to '{}'", sender.addr(), new_name);
                sender
                    .send(format!("you are now known as {}\n", new_name))
                    .await
            }
            Ok(false) => {
                // The sender is no longer registered (teardown already ran);
                // nothing was renamed, so nothing is confirmed.
                debug!("rename from unregistered '{}' ignored", sender.name());
                Ok(())
            }
            Err(e @ ChatError::DuplicateName(_)) => sender.send(format!("{}\n", e)).await,
            Err(e) => Err(e),
        }
    }

    /// Deliver a private message to the target's mailbox only
    async fn private(
        &self,
        sender: &Arc<Session>,
        target: &str,
        text: &str,
    ) -> Result<(), ChatError> {
        let Some(recipient) = self.registry.get(target) else {
            let e = ChatError::TargetNotFound(target.to_string());
            return sender.send(format!("{}\n", e)).await;
        };

        // Delivery awaits mailbox capacity; a slow recipient only ever
        // stalls the sender's own handler, never the dispatcher.
        if recipient
            .send(private_line(&sender.name(), text))
            .await
            .is_err()
        {
            // Recipient vanished between lookup and delivery
            let e = ChatError::TargetNotFound(target.to_string());
            return sender.send(format!("{}\n", e)).await;
        }
        Ok(())
    }
}
