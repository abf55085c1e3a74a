//! Runtime errors.

use huddle_client::ClientError;
use thiserror::Error;

/// Fatal runtime errors. Domain failures (media, signaling, uploads,
/// dropped events) are reported to the user and never end the run.
#[derive(Debug, Error)]
pub enum RuntimeError<E: std::error::Error + 'static> {
    /// The driver failed to read input or render
    #[error("driver error: {0}")]
    Driver(#[source] E),

    /// The session refused to start
    #[error("session error: {0}")]
    Session(#[from] ClientError),
}
