//! Error types for the chat server
//!
//! Defines connection-level errors and the command failures that are
//! reported back to the offending sender. Uses thiserror for ergonomic
//! error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// protocol errors (send an error line back to the client).
#[derive(Debug, Error)]
pub enum ChatError {
    /// IO error (fatal for the affected connection only)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (oversized line or underlying IO failure)
    #[error("line codec error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    /// The requested name is already registered to another session
    #[error("name \"{0}\" is already taken")]
    DuplicateName(String),

    /// Private message target is not online
    #[error("no such user \"{0}\"")]
    TargetNotFound(String),

    /// Command line did not match the protocol grammar
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// Channel send failed - the receiving task is gone
    #[error("channel closed")]
    ChannelClosed,
}
