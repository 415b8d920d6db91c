//! Multi-client TCP Chat Server Library
//!
//! A small chat server speaking a newline-delimited text protocol over
//! plain TCP.
//!
//! # Features
//! - Public broadcasts to every online user
//! - Private messages (`to|<name>|<text>`)
//! - Renames (`rename|<name>`) with collision rejection
//! - Online-user listing (`who`)
//! - Idle eviction after a configurable inactivity window
//!
//! # Architecture
//! Shared state is the lock-guarded [`Registry`] of online sessions, the
//! single source of truth injected into every component. Public messages
//! flow through the [`Bus`], a bounded channel drained by one dispatcher
//! task that fans each message out to a registry snapshot. Each connection
//! runs two tasks: a read loop feeding the [`Router`] (which also arms the
//! liveness timer) and a writer task that alone drains the session mailbox
//! to the socket.
//!
//! # Example
//! ```ignore
//! use tinychat::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = Server::new(Config::default());
//!     server.run().await.unwrap();
//! }
//! ```

pub mod bus;
pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod registry;
pub mod server;
pub mod session;

// Re-export main types for convenience
pub use bus::{Bus, Dispatcher};
pub use command::{Command, Router};
pub use config::Config;
pub use error::ChatError;
pub use handler::handle_connection;
pub use registry::Registry;
pub use server::Server;
pub use session::Session;
