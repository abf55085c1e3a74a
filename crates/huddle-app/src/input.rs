//! Inputs the driver hands to the runtime.

use huddle_client::{Attempt, CallInput};
use huddle_core::{MediaHandle, SignalingError};
use huddle_proto::{IceCandidate, RoomId, UserId};

use crate::upload::OutgoingFile;

/// One unit of work for the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// User intent
    Command(Command),
    /// Raw event text received on the channel
    Inbound(String),
    /// Spontaneous peer connection event
    Peer(PeerSignal),
    /// Periodic maintenance
    Tick,
    /// Transport dropped the channel
    ChannelLost,
    /// Transport re-established the channel on its own
    ChannelRestored,
}

/// User intents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a room
    SelectRoom(RoomId),
    /// Load a history page of the active room
    LoadPage(u32),
    /// Post a text message
    SendMessage {
        /// Target room
        room_id: RoomId,
        /// Text
        content: String,
    },
    /// Upload a file and post it
    SendFile {
        /// Target room
        room_id: RoomId,
        /// File to upload
        file: OutgoingFile,
    },
    /// A key was pressed in a room's composer
    Keystroke(RoomId),
    /// The composer lost focus or was cleared
    StopTyping(RoomId),
    /// Open a private room with a user
    CreatePrivateRoom(UserId),
    /// Call the members of a room
    StartCall(RoomId),
    /// Accept the ringing call
    AcceptCall,
    /// Reject the ringing call
    RejectCall,
    /// Hang up
    EndCall,
    /// Shut down
    Quit,
}

/// Events raised by a peer connection outside of any request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSignal {
    /// A local candidate was gathered
    LocalCandidate {
        /// Attempt of the peer connection
        attempt: Attempt,
        /// Candidate to relay
        candidate: IceCandidate,
    },
    /// The remote stream arrived
    RemoteTrack {
        /// Attempt of the peer connection
        attempt: Attempt,
        /// Remote stream
        media: MediaHandle,
    },
    /// The connection failed on its own
    Failed {
        /// Attempt of the peer connection
        attempt: Attempt,
        /// Failure
        error: SignalingError,
    },
}

impl From<PeerSignal> for CallInput {
    fn from(signal: PeerSignal) -> Self {
        match signal {
            PeerSignal::LocalCandidate { attempt, candidate } => {
                Self::LocalCandidate { attempt, candidate }
            },
            PeerSignal::RemoteTrack { attempt, media } => Self::RemoteTrack { attempt, media },
            PeerSignal::Failed { attempt, error } => Self::PeerFailed { attempt, error },
        }
    }
}
