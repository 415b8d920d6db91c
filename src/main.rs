//! Multi-client TCP Chat Server - Entry Point
//!
//! Parses the bind address and idle timeout from the command line and
//! runs the server until Ctrl-C.

use std::env;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use tinychat::{Config, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=tinychat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tinychat=info")),
        )
        .init();

    // Usage: tinychat [bind-addr] [idle-timeout-seconds]
    let mut config = Config::default();
    if let Some(addr) = env::args().nth(1) {
        config.bind_addr = addr;
    }
    if let Some(secs) = env::args().nth(2) {
        config.idle_timeout = Duration::from_secs(secs.parse()?);
    }

    Server::new(config).run().await?;
    Ok(())
}
