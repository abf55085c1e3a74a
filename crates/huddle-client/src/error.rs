//! Client errors.

use huddle_proto::ProtocolError;
use thiserror::Error;

use crate::call::CallState;

/// Errors returned for invalid local operations.
///
/// Inbound anomalies (stale events, unknown rooms, malformed payloads) are
/// never errors; they are logged and discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Call operation not valid in the current call state
    #[error("invalid call operation: cannot {operation} in state {state:?}")]
    InvalidState {
        /// Call state when the operation was attempted
        state: CallState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// History requested with no room selected
    #[error("no active room")]
    NoActiveRoom,

    /// Pages are numbered from 1
    #[error("invalid page {page}")]
    InvalidPage {
        /// Requested page
        page: u32,
    },

    /// Channel lifecycle violation
    #[error("channel error: {0}")]
    Channel(#[from] huddle_core::ChannelError),

    /// Event could not be encoded or decoded
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = ClientError::InvalidState { state: CallState::Idle, operation: "accept" };
        assert_eq!(err.to_string(), "invalid call operation: cannot accept in state Idle");
        assert_eq!(ClientError::InvalidPage { page: 0 }.to_string(), "invalid page 0");
    }
}
