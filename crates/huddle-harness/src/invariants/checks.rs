//! Standard invariants.

use huddle_client::CallState;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// An idle client owns no streams and no peer connection.
///
/// Checked against both the call machine's fields and the media backend's
/// ledger, so a handle the machine forgot to release is caught too.
pub struct IdleCallHoldsNoMedia;

impl Invariant for IdleCallHoldsNoMedia {
    fn name(&self) -> &'static str {
        "idle_call_holds_no_media"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in state.clients.iter().filter(|c| c.call_state == CallState::Idle) {
            let leaked = client.local_media.is_some()
                || client.remote_media.is_some()
                || !client.live_media.is_empty()
                || client.open_peers > 0;
            if leaked {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{} is idle but holds local={:?} remote={:?} live={:?} peers={}",
                        client.user_id,
                        client.local_media,
                        client.remote_media,
                        client.live_media,
                        client.open_peers
                    ),
                });
            }
        }
        Ok(())
    }
}

/// A call ID exists exactly when the call machine is not idle.
pub struct CallIdMatchesState;

impl Invariant for CallIdMatchesState {
    fn name(&self) -> &'static str {
        "call_id_matches_state"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if (client.call_state == CallState::Idle) == client.call_id.is_some() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{} in {:?} with call id {:?}",
                        client.user_id, client.call_state, client.call_id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The timeline is non-decreasing by creation time.
pub struct TimelineSorted;

impl Invariant for TimelineSorted {
    fn name(&self) -> &'static str {
        "timeline_sorted"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            if let Some(pair) =
                client.timeline.windows(2).find(|pair| pair[0].created_at > pair[1].created_at)
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{}: {} ({}) before {} ({})",
                        client.user_id,
                        pair[0].id,
                        pair[0].created_at,
                        pair[1].id,
                        pair[1].created_at
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The timeline only holds messages of the selected room.
pub struct TimelineMatchesActiveRoom;

impl Invariant for TimelineMatchesActiveRoom {
    fn name(&self) -> &'static str {
        "timeline_matches_active_room"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let stray = client
                .timeline
                .iter()
                .find(|message| client.active_room.as_ref() != Some(&message.room_id));
            if let Some(message) = stray {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{}: message {} from {} while {:?} is active",
                        client.user_id, message.id, message.room_id, client.active_room
                    ),
                });
            }
        }
        Ok(())
    }
}
