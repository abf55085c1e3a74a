//! Observable state snapshots for invariant checking.

use huddle_client::CallState;
use huddle_core::MediaHandle;
use huddle_proto::{CallId, Message, RoomId, UserId};

/// Snapshot of every client in a simulation.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-client snapshots.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// Snapshot with no clients.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot of a single client.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client] }
    }
}

/// Observable state of one client.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    /// Whose client this is.
    pub user_id: UserId,
    /// Call machine state.
    pub call_state: CallState,
    /// Current call ID.
    pub call_id: Option<CallId>,
    /// Local stream held by the call machine.
    pub local_media: Option<MediaHandle>,
    /// Remote stream held by the call machine.
    pub remote_media: Option<MediaHandle>,
    /// Streams the media backend has not had released.
    pub live_media: Vec<MediaHandle>,
    /// Peer connections the media backend holds open.
    pub open_peers: usize,
    /// Selected room.
    pub active_room: Option<RoomId>,
    /// Timeline of the selected room.
    pub timeline: Vec<Message>,
}

impl ClientSnapshot {
    /// Idle client with no rooms and no media.
    pub fn idle(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            call_state: CallState::Idle,
            call_id: None,
            local_media: None,
            remote_media: None,
            live_media: Vec::new(),
            open_peers: 0,
            active_room: None,
            timeline: Vec::new(),
        }
    }
}
