//! Error types for the Huddle core.
//!
//! Strongly-typed errors for the three external collaborators the client
//! depends on: the event channel, the local media devices, and the peer
//! negotiation primitive.

use std::{io, time::Duration};

use thiserror::Error;

use crate::channel::ChannelState;

/// Errors raised by the channel lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Emission attempted while the channel is not connected
    #[error("channel unavailable in state {state:?}")]
    Unavailable {
        /// State at the time of the attempt
        state: ChannelState,
    },

    /// Invalid state transition attempted
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// Current state when error occurred
        state: ChannelState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Connect did not complete within timeout
    #[error("connect timeout after {elapsed:?}")]
    ConnectTimeout {
        /// How long we waited
        elapsed: Duration,
    },

    /// Underlying transport error
    #[error("transport error: {0}")]
    Transport(String),
}

impl ChannelError {
    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// The channel never retries on its own; callers decide.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectTimeout { .. } | Self::Transport(_) | Self::Unavailable { .. })
    }
}

impl From<io::Error> for ChannelError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Local media acquisition failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// Camera or microphone held by another application
    #[error("media device is in use by another application")]
    DeviceBusy,

    /// No camera or microphone present
    #[error("no camera or microphone found")]
    DeviceNotFound,

    /// User or platform denied access
    #[error("permission to use camera and microphone was denied")]
    PermissionDenied,

    /// Anything else the platform reported
    #[error("media acquisition failed: {0}")]
    Unknown(String),
}

impl MediaError {
    /// Classify a platform error by its DOM exception name.
    ///
    /// Browser-style backends report `getUserMedia` failures as named
    /// exceptions; legacy names are accepted too.
    pub fn from_dom_name(name: &str, message: &str) -> Self {
        match name {
            "NotReadableError" | "TrackStartError" => Self::DeviceBusy,
            "NotFoundError" | "DevicesNotFoundError" => Self::DeviceNotFound,
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => {
                Self::PermissionDenied
            },
            _ => Self::Unknown(message.to_string()),
        }
    }
}

/// Failures of the peer negotiation primitive.
///
/// Any of these tears the call down; none is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    /// Peer connection could not be created or failed afterwards
    #[error("peer connection failed: {0}")]
    PeerConnection(String),

    /// Offer creation or local description failed
    #[error("failed to create offer: {0}")]
    CreateOffer(String),

    /// Answer creation or local description failed
    #[error("failed to create answer: {0}")]
    CreateAnswer(String),

    /// Remote description rejected
    #[error("failed to apply remote description: {0}")]
    SetRemoteDescription(String),

    /// Remote candidate rejected
    #[error("failed to add ice candidate: {0}")]
    AddCandidate(String),
}
