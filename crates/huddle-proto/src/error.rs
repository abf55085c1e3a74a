//! Protocol errors.

use thiserror::Error;

/// Errors raised while encoding or decoding channel events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Event could not be serialized to JSON.
    #[error("failed to encode event {event}: {reason}")]
    Encode {
        /// Event name being encoded.
        event: &'static str,
        /// Serializer error message.
        reason: String,
    },

    /// Incoming text is not a known event or its payload is malformed.
    #[error("failed to decode event: {reason}")]
    Decode {
        /// Deserializer error message.
        reason: String,
    },
}

impl ProtocolError {
    /// Returns true if the failure was caused by the remote side.
    ///
    /// Decode failures come from the peer and are skipped by callers; encode
    /// failures indicate a local bug.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_are_remote() {
        assert!(ProtocolError::Decode { reason: "eof".into() }.is_remote());
        assert!(
            !ProtocolError::Encode { event: "message:send", reason: "bad".into() }.is_remote()
        );
    }
}
