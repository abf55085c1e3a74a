//! Call signaling state machine.
//!
//! Negotiates a direct media session with one remote peer through the
//! coordination service. The machine owns the call record and every media
//! handle; the caller executes the returned [`CallAction`]s against the media
//! backend and feeds completions back as [`CallInput`]s.
//!
//! # State Machine
//!
//! ```text
//!            initiate + media          call:accepted
//!  ┌──────┐ ─────────────────> ┌──────────┐ ─────────────> ┌────────────┐
//!  │ Idle │                    │ Outgoing │                │ Connecting │
//!  └──────┘ ─────────────────> └──────────┘                └────────────┘
//!     ^      call:incoming   ┌─────────────────┐  accept + media  ^   │
//!     │   ─────────────────> │ IncomingRinging │ ─────────────────┘   │ remote track
//!     │                      └─────────────────┘                      v
//!     │                                                         ┌────────┐
//!     └──────────── end / call:ended / reject / failure ─────── │ Active │
//!                                                               └────────┘
//! ```
//!
//! Every exit to `Idle` closes the peer connection and releases all media in
//! the same action batch, then reports [`CallNotice::Ended`].
//!
//! # Attempts
//!
//! Each asynchronous request (media acquisition, SDP steps, peer connection)
//! carries the [`Attempt`] of the call it was issued for. Completions for an
//! attempt that is no longer current are discarded; a media handle delivered
//! for an abandoned attempt is released immediately.

use std::{collections::VecDeque, fmt};

use huddle_core::{Environment, MediaError, MediaHandle, SignalingError};
use huddle_proto::{
    AnswerPayload, CallAccepted, CallEnded, CallId, CallIncoming, CallRejected, CandidatePayload,
    IceCandidate, IceServer, InboundEvent, OfferPayload, OutboundEvent, RoomId,
    SessionDescription, UserId,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::error::ClientError;

/// Prefix of call IDs generated locally before the service assigns one.
pub const PROVISIONAL_CALL_PREFIX: &str = "local-";

/// Ended or ignored call IDs remembered to recognize their late events.
const RETIRED_CALLS_KEPT: usize = 16;

/// Tag tying an asynchronous request to the call lifetime that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempt(u64);

impl Attempt {
    /// Raw attempt number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Observable call state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallState {
    /// No call. The call ID is `None`.
    Idle,
    /// Call requested, waiting for the callee to accept
    Outgoing,
    /// Remote user is calling, waiting for a local decision
    IncomingRinging,
    /// Accepted; offer/answer/candidate exchange in progress
    Connecting,
    /// Remote media is flowing
    Active,
}

/// Which side of the call this client is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallRole {
    /// Placed the call; creates the offer
    Caller,
    /// Received the call; creates the answer
    Callee,
}

/// Why a call returned to `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// Local hang-up
    Hangup,
    /// The remote side hung up
    RemoteHangup,
    /// The callee rejected our call
    Rejected,
    /// We rejected an incoming call
    Declined,
    /// Negotiation failed
    Failed(SignalingError),
}

/// Call configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CallConfig {
    /// STUN/TURN servers handed to every peer connection
    pub ice_servers: Vec<IceServer>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self { ice_servers: IceServer::defaults() }
    }
}

/// Inputs fed into the call machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallInput {
    /// User wants to call the members of a room
    Initiate {
        /// Room to call
        room_id: RoomId,
    },
    /// User accepts the ringing call
    Accept,
    /// User rejects the ringing call
    Reject,
    /// User hangs up
    End,
    /// Call signaling event from the service
    Signal(InboundEvent),
    /// Local media acquired
    MediaAcquired {
        /// Attempt the acquisition was requested for
        attempt: Attempt,
        /// Acquired stream
        media: MediaHandle,
    },
    /// Local media acquisition failed
    MediaFailed {
        /// Attempt the acquisition was requested for
        attempt: Attempt,
        /// Classified failure
        error: MediaError,
    },
    /// Offer created and set as local description
    OfferCreated {
        /// Attempt the offer was requested for
        attempt: Attempt,
        /// Created offer
        offer: SessionDescription,
    },
    /// Answer created and set as local description
    AnswerCreated {
        /// Attempt the answer was requested for
        attempt: Attempt,
        /// Created answer
        answer: SessionDescription,
    },
    /// Remote description applied to the peer connection
    RemoteDescriptionApplied {
        /// Attempt the description was applied for
        attempt: Attempt,
    },
    /// Peer connection gathered a local candidate
    LocalCandidate {
        /// Attempt of the peer connection
        attempt: Attempt,
        /// Gathered candidate
        candidate: IceCandidate,
    },
    /// Peer connection received the remote stream
    RemoteTrack {
        /// Attempt of the peer connection
        attempt: Attempt,
        /// Remote stream, now owned by the machine
        media: MediaHandle,
    },
    /// A peer connection primitive failed
    PeerFailed {
        /// Attempt of the peer connection
        attempt: Attempt,
        /// What failed
        error: SignalingError,
    },
}

/// Actions produced by the call machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallAction {
    /// Acquire camera and microphone; answer with `MediaAcquired` or
    /// `MediaFailed`
    AcquireMedia {
        /// Attempt to report back
        attempt: Attempt,
    },
    /// Stop and release a stream
    ReleaseMedia(MediaHandle),
    /// Create the peer connection and attach local tracks
    OpenPeer {
        /// Attempt to report back
        attempt: Attempt,
        /// ICE configuration
        ice_servers: Vec<IceServer>,
        /// Local stream to attach
        local_media: MediaHandle,
    },
    /// Destroy the peer connection
    ClosePeer {
        /// Attempt of the peer connection
        attempt: Attempt,
    },
    /// Create an offer and set it as local description
    CreateOffer {
        /// Attempt to report back
        attempt: Attempt,
    },
    /// Create an answer and set it as local description
    CreateAnswer {
        /// Attempt to report back
        attempt: Attempt,
    },
    /// Apply the remote description
    SetRemoteDescription {
        /// Attempt to report back
        attempt: Attempt,
        /// Remote offer or answer
        description: SessionDescription,
    },
    /// Apply a remote candidate
    AddIceCandidate {
        /// Attempt of the peer connection
        attempt: Attempt,
        /// Remote candidate
        candidate: IceCandidate,
    },
    /// Send an event to the service
    Emit(OutboundEvent),
    /// Surface something to the user
    Notify(CallNotice),
}

/// User-facing call notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallNotice {
    /// A remote user is calling
    Incoming {
        /// Server-assigned call ID
        call_id: CallId,
        /// Caller
        caller: UserId,
        /// Room the call was placed from, if known
        room_id: Option<RoomId>,
    },
    /// Remote media is flowing
    Active {
        /// Call ID
        call_id: CallId,
        /// Remote stream to render
        remote_media: MediaHandle,
    },
    /// The call was torn down and all its resources released
    Ended {
        /// Call that ended
        call_id: CallId,
        /// Why
        reason: EndReason,
    },
    /// Camera or microphone could not be acquired; the call did not advance
    MediaUnavailable(MediaError),
}

/// Offer/answer progress of the current call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Negotiation {
    NotStarted,
    CreatingOffer,
    AwaitingAnswer,
    ApplyingAnswer,
    ApplyingOffer,
    CreatingAnswer,
    Complete,
}

/// Outgoing call waiting for local media. No call ID exists yet.
#[derive(Debug, Clone)]
struct PendingInitiate {
    attempt: Attempt,
    room_id: RoomId,
}

#[derive(Debug, Clone)]
struct Call {
    id: CallId,
    /// ID generated locally, replaced on `call:accepted`
    provisional: bool,
    attempt: Attempt,
    state: CallState,
    role: CallRole,
    room_id: Option<RoomId>,
    remote_peer: Option<UserId>,
    local_media: Option<MediaHandle>,
    remote_media: Option<MediaHandle>,
    acquiring_media: bool,
    peer_opened: bool,
    negotiation: Negotiation,
    pending_candidates: Vec<IceCandidate>,
}

impl Call {
    fn new(id: CallId, attempt: Attempt, state: CallState, role: CallRole) -> Self {
        Self {
            id,
            provisional: false,
            attempt,
            state,
            role,
            room_id: None,
            remote_peer: None,
            local_media: None,
            remote_media: None,
            acquiring_media: false,
            peer_opened: false,
            negotiation: Negotiation::NotStarted,
            pending_candidates: Vec::new(),
        }
    }

    /// Whether an event naming `call_id` belongs to this call. Events without
    /// an ID are attributed to the current call. While the ID is provisional
    /// any ID not known to belong to another call is accepted.
    fn matches(&self, call_id: Option<&CallId>, retired: &VecDeque<CallId>) -> bool {
        match call_id {
            None => true,
            Some(id) => &self.id == id || (self.provisional && !retired.contains(id)),
        }
    }

    fn remote_description_set(&self) -> bool {
        matches!(self.negotiation, Negotiation::CreatingAnswer | Negotiation::Complete)
    }

    fn is_negotiating(&self) -> bool {
        matches!(
            self.negotiation,
            Negotiation::CreatingOffer
                | Negotiation::ApplyingAnswer
                | Negotiation::ApplyingOffer
                | Negotiation::CreatingAnswer
        )
    }

    fn flush_candidates(&mut self) -> impl Iterator<Item = CallAction> + '_ {
        let attempt = self.attempt;
        self.pending_candidates
            .drain(..)
            .map(move |candidate| CallAction::AddIceCandidate { attempt, candidate })
    }
}

/// Call signaling state machine.
///
/// Owns at most one call. Generic over the environment for provisional call
/// ID generation.
pub struct CallMachine<E: Environment> {
    env: E,
    config: CallConfig,
    call: Option<Call>,
    pending_initiate: Option<PendingInitiate>,
    next_attempt: u64,
    /// IDs of ended or ignored calls, oldest first
    retired: VecDeque<CallId>,
}

impl<E: Environment> CallMachine<E> {
    /// Create an idle call machine.
    pub fn new(env: E, config: CallConfig) -> Self {
        Self {
            env,
            config,
            call: None,
            pending_initiate: None,
            next_attempt: 1,
            retired: VecDeque::new(),
        }
    }

    /// Current call state.
    #[must_use]
    pub fn state(&self) -> CallState {
        self.call.as_ref().map_or(CallState::Idle, |call| call.state)
    }

    /// Current call ID. `None` iff `Idle`.
    #[must_use]
    pub fn call_id(&self) -> Option<&CallId> {
        self.call.as_ref().map(|call| &call.id)
    }

    /// Whether the current call ID was generated locally.
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.call.as_ref().is_some_and(|call| call.provisional)
    }

    /// Our role in the current call.
    #[must_use]
    pub fn role(&self) -> Option<CallRole> {
        self.call.as_ref().map(|call| call.role)
    }

    /// Remote participant, once known.
    #[must_use]
    pub fn remote_peer(&self) -> Option<&UserId> {
        self.call.as_ref().and_then(|call| call.remote_peer.as_ref())
    }

    /// Room the call belongs to, if known.
    #[must_use]
    pub fn room_id(&self) -> Option<&RoomId> {
        self.call.as_ref().and_then(|call| call.room_id.as_ref())
    }

    /// Local camera/microphone stream.
    #[must_use]
    pub fn local_media(&self) -> Option<MediaHandle> {
        self.call.as_ref().and_then(|call| call.local_media)
    }

    /// Remote stream.
    #[must_use]
    pub fn remote_media(&self) -> Option<MediaHandle> {
        self.call.as_ref().and_then(|call| call.remote_media)
    }

    /// Remote candidates waiting for a remote description, in arrival order.
    #[must_use]
    pub fn pending_candidates(&self) -> &[IceCandidate] {
        self.call.as_ref().map_or(&[], |call| call.pending_candidates.as_slice())
    }

    /// Whether media acquisition or an SDP step is outstanding.
    #[must_use]
    pub fn in_transition(&self) -> bool {
        self.pending_initiate.is_some()
            || self.call.as_ref().is_some_and(|call| call.acquiring_media || call.is_negotiating())
    }

    /// Process an input and return resulting actions.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidState` if `Accept` or `Reject` arrives while no
    ///   call is ringing
    pub fn handle(&mut self, input: CallInput) -> Result<Vec<CallAction>, ClientError> {
        let actions = match input {
            CallInput::Initiate { room_id } => self.initiate(room_id),
            CallInput::Accept => self.accept()?,
            CallInput::Reject => self.reject()?,
            CallInput::End => self.end(),
            CallInput::Signal(event) => self.handle_signal(event),
            CallInput::MediaAcquired { attempt, media } => self.media_acquired(attempt, media),
            CallInput::MediaFailed { attempt, error } => self.media_failed(attempt, error),
            CallInput::OfferCreated { attempt, offer } => self.offer_created(attempt, offer),
            CallInput::AnswerCreated { attempt, answer } => self.answer_created(attempt, answer),
            CallInput::RemoteDescriptionApplied { attempt } => {
                self.remote_description_applied(attempt)
            },
            CallInput::LocalCandidate { attempt, candidate } => {
                self.local_candidate(attempt, candidate)
            },
            CallInput::RemoteTrack { attempt, media } => self.remote_track(attempt, media),
            CallInput::PeerFailed { attempt, error } => self.peer_failed(attempt, error),
        };

        Ok(actions)
    }

    fn retire(&mut self, call_id: CallId) {
        if self.retired.contains(&call_id) {
            return;
        }
        if self.retired.len() == RETIRED_CALLS_KEPT {
            self.retired.pop_front();
        }
        self.retired.push_back(call_id);
    }

    fn next_attempt(&mut self) -> Attempt {
        let attempt = Attempt(self.next_attempt);
        self.next_attempt += 1;
        attempt
    }

    fn current(&mut self, attempt: Attempt) -> Option<&mut Call> {
        self.call.as_mut().filter(|call| call.attempt == attempt)
    }

    fn is_busy(&self) -> bool {
        self.call.is_some() || self.pending_initiate.is_some()
    }

    fn initiate(&mut self, room_id: RoomId) -> Vec<CallAction> {
        if self.is_busy() {
            debug!(%room_id, state = ?self.state(), "call in progress, ignoring initiate");
            return Vec::new();
        }

        let attempt = self.next_attempt();
        info!(%room_id, %attempt, "placing call");
        self.pending_initiate = Some(PendingInitiate { attempt, room_id });

        vec![CallAction::AcquireMedia { attempt }]
    }

    fn ringing_call(&mut self, operation: &'static str) -> Result<&mut Call, ClientError> {
        let state = self.state();
        match self.call.as_mut() {
            Some(call) if call.state == CallState::IncomingRinging => Ok(call),
            _ => Err(ClientError::InvalidState { state, operation }),
        }
    }

    fn accept(&mut self) -> Result<Vec<CallAction>, ClientError> {
        let call = self.ringing_call("accept")?;
        if call.acquiring_media {
            return Ok(Vec::new());
        }

        call.acquiring_media = true;
        info!(call_id = %call.id, "accepting call");

        Ok(vec![CallAction::AcquireMedia { attempt: call.attempt }])
    }

    fn reject(&mut self) -> Result<Vec<CallAction>, ClientError> {
        let call_id = self.ringing_call("reject")?.id.clone();

        let mut actions = vec![CallAction::Emit(OutboundEvent::CallReject { call_id })];
        actions.extend(self.teardown(EndReason::Declined, false));
        Ok(actions)
    }

    fn end(&mut self) -> Vec<CallAction> {
        if self.call.is_none() {
            if let Some(pending) = self.pending_initiate.take() {
                info!(
                    room_id = %pending.room_id,
                    attempt = %pending.attempt,
                    "call cancelled before media"
                );
            }
            return Vec::new();
        }

        self.teardown(EndReason::Hangup, true)
    }

    /// Move to `Idle`, closing the peer connection and releasing all media.
    fn teardown(&mut self, reason: EndReason, notify_remote: bool) -> Vec<CallAction> {
        let Some(call) = self.call.take() else {
            return Vec::new();
        };
        if !call.provisional {
            self.retire(call.id.clone());
        }

        let mut actions = Vec::new();
        if notify_remote {
            actions.push(CallAction::Emit(OutboundEvent::CallEnd {
                call_id: call.id.clone(),
                room_id: call.room_id.clone(),
                target: call.remote_peer.clone(),
            }));
        }
        if call.peer_opened {
            actions.push(CallAction::ClosePeer { attempt: call.attempt });
        }
        actions.extend(call.local_media.map(CallAction::ReleaseMedia));
        actions.extend(call.remote_media.map(CallAction::ReleaseMedia));

        info!(call_id = %call.id, state = ?call.state, ?reason, "call ended");
        actions.push(CallAction::Notify(CallNotice::Ended { call_id: call.id, reason }));
        actions
    }

    fn handle_signal(&mut self, event: InboundEvent) -> Vec<CallAction> {
        match event {
            InboundEvent::CallIncoming(incoming) => self.incoming(incoming),
            InboundEvent::CallAccepted(accepted) => self.accepted(accepted),
            InboundEvent::CallRejected(rejected) => self.rejected(&rejected),
            InboundEvent::CallEnded(ended) => self.remote_ended(&ended),
            InboundEvent::Offer(offer) => self.remote_offer(offer),
            InboundEvent::Answer(answer) => self.remote_answer(answer),
            InboundEvent::IceCandidate(candidate) => self.remote_candidate(candidate),
            other => {
                debug!(event = other.name(), "not a call signal");
                Vec::new()
            },
        }
    }

    fn incoming(&mut self, incoming: CallIncoming) -> Vec<CallAction> {
        if self.is_busy() {
            warn!(
                call_id = %incoming.call_id,
                caller = %incoming.caller.id,
                "busy, ignoring incoming call"
            );
            self.retire(incoming.call_id);
            return Vec::new();
        }

        let attempt = self.next_attempt();
        let mut call = Call::new(
            incoming.call_id.clone(),
            attempt,
            CallState::IncomingRinging,
            CallRole::Callee,
        );
        call.room_id.clone_from(&incoming.room_id);
        call.remote_peer = Some(incoming.caller.id.clone());
        self.call = Some(call);

        info!(call_id = %incoming.call_id, caller = %incoming.caller.id, "incoming call");
        vec![CallAction::Notify(CallNotice::Incoming {
            call_id: incoming.call_id,
            caller: incoming.caller.id,
            room_id: incoming.room_id,
        })]
    }

    fn accepted(&mut self, accepted: CallAccepted) -> Vec<CallAction> {
        let Some(call) = self.call.as_mut() else {
            debug!(call_id = %accepted.call_id, "call:accepted while idle");
            return Vec::new();
        };
        let ours = call.matches(Some(&accepted.call_id), &self.retired);
        if call.state != CallState::Outgoing || !ours {
            debug!(call_id = %accepted.call_id, state = ?call.state, "ignoring call:accepted");
            return Vec::new();
        }

        info!(
            provisional = %call.id,
            call_id = %accepted.call_id,
            target = %accepted.target,
            "call accepted"
        );
        call.id = accepted.call_id;
        call.provisional = false;
        call.remote_peer = Some(accepted.target);
        call.state = CallState::Connecting;
        call.negotiation = Negotiation::CreatingOffer;

        vec![CallAction::CreateOffer { attempt: call.attempt }]
    }

    fn rejected(&mut self, rejected: &CallRejected) -> Vec<CallAction> {
        let ours = self.call.as_ref().is_some_and(|call| {
            call.state == CallState::Outgoing
                && call.matches(rejected.call_id.as_ref(), &self.retired)
        });
        if !ours {
            debug!(state = ?self.state(), "ignoring call:rejected");
            return Vec::new();
        }

        self.teardown(EndReason::Rejected, false)
    }

    fn remote_ended(&mut self, ended: &CallEnded) -> Vec<CallAction> {
        let retired = &self.retired;
        let ours =
            self.call.as_ref().is_some_and(|call| call.matches(Some(&ended.call_id), retired));
        if !ours {
            debug!(call_id = %ended.call_id, "stale call:ended");
            return Vec::new();
        }

        self.teardown(EndReason::RemoteHangup, false)
    }

    fn remote_offer(&mut self, offer: OfferPayload) -> Vec<CallAction> {
        let Some(call) = self.call.as_mut() else {
            debug!("webrtc:offer while idle");
            return Vec::new();
        };
        if !call.matches(offer.call_id.as_ref(), &self.retired)
            || call.role != CallRole::Callee
            || call.state == CallState::IncomingRinging
            || call.negotiation != Negotiation::NotStarted
        {
            debug!(
                call_id = %call.id,
                state = ?call.state,
                negotiation = ?call.negotiation,
                "ignoring webrtc:offer"
            );
            return Vec::new();
        }

        if let Some(from) = offer.target {
            call.remote_peer = Some(from);
        }
        call.negotiation = Negotiation::ApplyingOffer;

        vec![CallAction::SetRemoteDescription { attempt: call.attempt, description: offer.offer }]
    }

    fn remote_answer(&mut self, answer: AnswerPayload) -> Vec<CallAction> {
        let Some(call) = self.call.as_mut() else {
            debug!("webrtc:answer while idle");
            return Vec::new();
        };
        if !call.matches(answer.call_id.as_ref(), &self.retired)
            || call.role != CallRole::Caller
            || call.negotiation != Negotiation::AwaitingAnswer
        {
            debug!(call_id = %call.id, negotiation = ?call.negotiation, "ignoring webrtc:answer");
            return Vec::new();
        }

        call.negotiation = Negotiation::ApplyingAnswer;

        vec![CallAction::SetRemoteDescription { attempt: call.attempt, description: answer.answer }]
    }

    fn remote_candidate(&mut self, payload: CandidatePayload) -> Vec<CallAction> {
        let Some(call) = self.call.as_mut() else {
            debug!("webrtc:ice-candidate while idle");
            return Vec::new();
        };
        if !call.matches(payload.call_id.as_ref(), &self.retired) {
            debug!(call_id = %call.id, "stale webrtc:ice-candidate");
            return Vec::new();
        }

        if call.remote_description_set() {
            let attempt = call.attempt;
            vec![CallAction::AddIceCandidate { attempt, candidate: payload.candidate }]
        } else {
            call.pending_candidates.push(payload.candidate);
            Vec::new()
        }
    }

    fn media_acquired(&mut self, attempt: Attempt, media: MediaHandle) -> Vec<CallAction> {
        if let Some(pending) = self.pending_initiate.take_if(|pending| pending.attempt == attempt) {
            let call_id =
                CallId::new(format!("{PROVISIONAL_CALL_PREFIX}{:016x}", self.env.random_u64()));
            let mut call =
                Call::new(call_id.clone(), attempt, CallState::Outgoing, CallRole::Caller);
            call.provisional = true;
            call.room_id = Some(pending.room_id.clone());
            call.local_media = Some(media);
            call.peer_opened = true;
            self.call = Some(call);

            info!(%call_id, room_id = %pending.room_id, "media ready, requesting call");
            return vec![
                CallAction::OpenPeer {
                    attempt,
                    ice_servers: self.config.ice_servers.clone(),
                    local_media: media,
                },
                CallAction::Emit(OutboundEvent::CallRequest { room_id: pending.room_id }),
            ];
        }

        match self.call.as_mut() {
            Some(call) if call.attempt == attempt && call.acquiring_media => {
                call.acquiring_media = false;
                call.local_media = Some(media);
                call.peer_opened = true;
                call.state = CallState::Connecting;

                info!(call_id = %call.id, "media ready, accepting call");
                vec![
                    CallAction::OpenPeer {
                        attempt,
                        ice_servers: self.config.ice_servers.clone(),
                        local_media: media,
                    },
                    CallAction::Emit(OutboundEvent::CallAccept { call_id: call.id.clone() }),
                ]
            },
            _ => {
                debug!(%attempt, %media, "media acquired for abandoned attempt, releasing");
                vec![CallAction::ReleaseMedia(media)]
            },
        }
    }

    fn media_failed(&mut self, attempt: Attempt, error: MediaError) -> Vec<CallAction> {
        if let Some(pending) = self.pending_initiate.take_if(|pending| pending.attempt == attempt) {
            warn!(room_id = %pending.room_id, %error, "cannot place call");
            return vec![CallAction::Notify(CallNotice::MediaUnavailable(error))];
        }

        match self.call.as_mut() {
            Some(call) if call.attempt == attempt && call.acquiring_media => {
                call.acquiring_media = false;
                warn!(call_id = %call.id, %error, "cannot accept call");
                vec![CallAction::Notify(CallNotice::MediaUnavailable(error))]
            },
            _ => {
                debug!(%attempt, %error, "media failure for abandoned attempt");
                Vec::new()
            },
        }
    }

    fn offer_created(&mut self, attempt: Attempt, offer: SessionDescription) -> Vec<CallAction> {
        let Some(call) = self.current(attempt) else {
            debug!(%attempt, "stale offer");
            return Vec::new();
        };
        if call.negotiation != Negotiation::CreatingOffer {
            debug!(call_id = %call.id, negotiation = ?call.negotiation, "unexpected offer");
            return Vec::new();
        }

        call.negotiation = Negotiation::AwaitingAnswer;

        vec![CallAction::Emit(OutboundEvent::Offer(OfferPayload {
            call_id: Some(call.id.clone()),
            offer,
            target: call.remote_peer.clone(),
        }))]
    }

    fn answer_created(&mut self, attempt: Attempt, answer: SessionDescription) -> Vec<CallAction> {
        let Some(call) = self.current(attempt) else {
            debug!(%attempt, "stale answer");
            return Vec::new();
        };
        if call.negotiation != Negotiation::CreatingAnswer {
            debug!(call_id = %call.id, negotiation = ?call.negotiation, "unexpected answer");
            return Vec::new();
        }

        call.negotiation = Negotiation::Complete;

        vec![CallAction::Emit(OutboundEvent::Answer(AnswerPayload {
            call_id: Some(call.id.clone()),
            answer,
            target: call.remote_peer.clone(),
        }))]
    }

    fn remote_description_applied(&mut self, attempt: Attempt) -> Vec<CallAction> {
        let Some(call) = self.current(attempt) else {
            debug!(%attempt, "stale remote description");
            return Vec::new();
        };

        match call.negotiation {
            Negotiation::ApplyingAnswer => {
                call.negotiation = Negotiation::Complete;
                call.flush_candidates().collect()
            },
            Negotiation::ApplyingOffer => {
                call.negotiation = Negotiation::CreatingAnswer;
                let mut actions: Vec<_> = call.flush_candidates().collect();
                actions.push(CallAction::CreateAnswer { attempt });
                actions
            },
            negotiation => {
                debug!(call_id = %call.id, ?negotiation, "unexpected remote description");
                Vec::new()
            },
        }
    }

    fn local_candidate(&mut self, attempt: Attempt, candidate: IceCandidate) -> Vec<CallAction> {
        let Some(call) = self.current(attempt) else {
            debug!(%attempt, "stale local candidate");
            return Vec::new();
        };
        let Some(target) = call.remote_peer.clone() else {
            debug!(call_id = %call.id, "no remote peer yet, dropping local candidate");
            return Vec::new();
        };

        vec![CallAction::Emit(OutboundEvent::IceCandidate(CandidatePayload {
            call_id: Some(call.id.clone()),
            candidate,
            target: Some(target),
        }))]
    }

    fn remote_track(&mut self, attempt: Attempt, media: MediaHandle) -> Vec<CallAction> {
        let Some(call) = self.current(attempt) else {
            debug!(%attempt, %media, "remote track for abandoned attempt, releasing");
            return vec![CallAction::ReleaseMedia(media)];
        };

        match call.remote_media {
            Some(existing) if existing == media => Vec::new(),
            Some(existing) => {
                debug!(call_id = %call.id, %existing, extra = %media, "second remote stream");
                vec![CallAction::ReleaseMedia(media)]
            },
            None => {
                call.remote_media = Some(media);
                if call.state != CallState::Connecting {
                    return Vec::new();
                }

                call.state = CallState::Active;
                info!(call_id = %call.id, "call active");
                vec![CallAction::Notify(CallNotice::Active {
                    call_id: call.id.clone(),
                    remote_media: media,
                })]
            },
        }
    }

    fn peer_failed(&mut self, attempt: Attempt, error: SignalingError) -> Vec<CallAction> {
        if self.current(attempt).is_none() {
            debug!(%attempt, %error, "failure for abandoned attempt");
            return Vec::new();
        }

        error!(%attempt, %error, "negotiation failed, tearing call down");
        self.teardown(EndReason::Failed(error), true)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use huddle_proto::{CallerRef, SdpKind};

    use super::*;

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        type Instant = Duration;

        fn now(&self) -> Duration {
            Duration::ZERO
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = i as u8;
            }
        }
    }

    fn machine() -> CallMachine<TestEnv> {
        CallMachine::new(TestEnv, CallConfig::default())
    }

    fn signal(event: InboundEvent) -> CallInput {
        CallInput::Signal(event)
    }

    fn incoming(call_id: &str, caller: &str) -> CallInput {
        signal(InboundEvent::CallIncoming(CallIncoming {
            call_id: call_id.into(),
            caller: CallerRef { id: caller.into() },
            room_id: Some("r1".into()),
        }))
    }

    fn candidate(n: u8) -> IceCandidate {
        IceCandidate::new(format!("candidate:{n} 1 udp 1 10.0.0.{n} 5000 typ host"))
    }

    fn find_attempt(actions: &[CallAction]) -> Attempt {
        actions
            .iter()
            .find_map(|a| match a {
                CallAction::AcquireMedia { attempt } => Some(*attempt),
                _ => None,
            })
            .expect("acquire media action")
    }

    fn initiate(m: &mut CallMachine<TestEnv>) -> Attempt {
        find_attempt(&m.handle(CallInput::Initiate { room_id: "r1".into() }).unwrap())
    }

    /// Drive a caller to `Connecting` with the offer sent.
    fn outgoing_connecting(m: &mut CallMachine<TestEnv>) -> Attempt {
        let actions = m.handle(CallInput::Initiate { room_id: "r1".into() }).unwrap();
        let attempt = find_attempt(&actions);
        m.handle(CallInput::MediaAcquired { attempt, media: MediaHandle::new(1) }).unwrap();
        m.handle(signal(InboundEvent::CallAccepted(CallAccepted {
            call_id: "c1".into(),
            target: "bob".into(),
        })))
        .unwrap();
        m.handle(CallInput::OfferCreated { attempt, offer: SessionDescription::offer("o") })
            .unwrap();
        attempt
    }

    #[test]
    fn initiate_waits_for_media_in_idle() {
        let mut m = machine();
        let actions = m.handle(CallInput::Initiate { room_id: "r1".into() }).unwrap();

        assert!(matches!(actions[..], [CallAction::AcquireMedia { .. }]));
        assert_eq!(m.state(), CallState::Idle);
        assert!(m.call_id().is_none());
        assert!(m.in_transition());

        // duplicate trigger while acquiring
        assert!(m.handle(CallInput::Initiate { room_id: "r1".into() }).unwrap().is_empty());
    }

    #[test]
    fn media_acquired_places_call() {
        let mut m = machine();
        let attempt = initiate(&mut m);

        let actions =
            m.handle(CallInput::MediaAcquired { attempt, media: MediaHandle::new(7) }).unwrap();

        assert_eq!(m.state(), CallState::Outgoing);
        assert!(m.is_provisional());
        assert!(m.call_id().unwrap().as_str().starts_with(PROVISIONAL_CALL_PREFIX));
        assert_eq!(m.local_media(), Some(MediaHandle::new(7)));
        assert!(matches!(
            actions[0],
            CallAction::OpenPeer { local_media, .. } if local_media == MediaHandle::new(7)
        ));
        assert_eq!(
            actions[1],
            CallAction::Emit(OutboundEvent::CallRequest { room_id: "r1".into() })
        );
    }

    #[test]
    fn media_failure_on_initiate_stays_idle() {
        let mut m = machine();
        let attempt = initiate(&mut m);

        let actions = m
            .handle(CallInput::MediaFailed { attempt, error: MediaError::DeviceBusy })
            .unwrap();

        assert_eq!(actions, vec![CallAction::Notify(CallNotice::MediaUnavailable(
            MediaError::DeviceBusy
        ))]);
        assert_eq!(m.state(), CallState::Idle);
        assert!(!m.in_transition());
    }

    #[test]
    fn end_before_media_releases_late_handle() {
        let mut m = machine();
        let attempt = initiate(&mut m);

        assert!(m.handle(CallInput::End).unwrap().is_empty());

        let actions =
            m.handle(CallInput::MediaAcquired { attempt, media: MediaHandle::new(3) }).unwrap();
        assert_eq!(actions, vec![CallAction::ReleaseMedia(MediaHandle::new(3))]);
        assert_eq!(m.state(), CallState::Idle);
    }

    #[test]
    fn accepted_replaces_provisional_id_and_creates_offer() {
        let mut m = machine();
        let attempt = initiate(&mut m);
        m.handle(CallInput::MediaAcquired { attempt, media: MediaHandle::new(1) }).unwrap();

        let actions = m
            .handle(signal(InboundEvent::CallAccepted(CallAccepted {
                call_id: "c1".into(),
                target: "bob".into(),
            })))
            .unwrap();

        assert_eq!(actions, vec![CallAction::CreateOffer { attempt }]);
        assert_eq!(m.state(), CallState::Connecting);
        assert_eq!(m.call_id(), Some(&CallId::new("c1")));
        assert!(!m.is_provisional());

        let actions = m
            .handle(CallInput::OfferCreated { attempt, offer: SessionDescription::offer("v=0") })
            .unwrap();
        let [CallAction::Emit(OutboundEvent::Offer(payload))] = &actions[..] else {
            panic!("expected offer emission, got {actions:?}");
        };
        assert_eq!(payload.call_id, Some(CallId::new("c1")));
        assert_eq!(payload.target, Some(UserId::new("bob")));
    }

    #[test]
    fn caller_buffers_candidates_until_answer_applied() {
        let mut m = machine();
        let attempt = outgoing_connecting(&mut m);

        for n in 1..=3 {
            let actions = m
                .handle(signal(InboundEvent::IceCandidate(CandidatePayload {
                    call_id: Some("c1".into()),
                    candidate: candidate(n),
                    target: None,
                })))
                .unwrap();
            assert!(actions.is_empty());
        }
        assert_eq!(m.pending_candidates().len(), 3);

        let actions = m
            .handle(signal(InboundEvent::Answer(AnswerPayload {
                call_id: Some("c1".into()),
                answer: SessionDescription::answer("a"),
                target: None,
            })))
            .unwrap();
        assert!(matches!(
            &actions[..],
            [CallAction::SetRemoteDescription { description, .. }]
                if description.kind == SdpKind::Answer
        ));

        let actions = m.handle(CallInput::RemoteDescriptionApplied { attempt }).unwrap();
        let applied: Vec<_> = actions
            .iter()
            .map(|a| match a {
                CallAction::AddIceCandidate { candidate, .. } => candidate.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(applied, vec![candidate(1), candidate(2), candidate(3)]);
        assert!(m.pending_candidates().is_empty());

        // later candidates apply directly
        let actions = m
            .handle(signal(InboundEvent::IceCandidate(CandidatePayload {
                call_id: None,
                candidate: candidate(4),
                target: None,
            })))
            .unwrap();
        assert_eq!(actions, vec![CallAction::AddIceCandidate { attempt, candidate: candidate(4) }]);
    }

    #[test]
    fn duplicate_answer_is_ignored() {
        let mut m = machine();
        let attempt = outgoing_connecting(&mut m);
        let answer = signal(InboundEvent::Answer(AnswerPayload {
            call_id: Some("c1".into()),
            answer: SessionDescription::answer("a"),
            target: None,
        }));

        assert_eq!(m.handle(answer.clone()).unwrap().len(), 1);
        assert!(m.handle(answer.clone()).unwrap().is_empty());
        m.handle(CallInput::RemoteDescriptionApplied { attempt }).unwrap();
        assert!(m.handle(answer).unwrap().is_empty());
    }

    #[test]
    fn callee_flow_reaches_active() {
        let mut m = machine();
        let actions = m.handle(incoming("c9", "alice")).unwrap();
        assert!(matches!(
            &actions[..],
            [CallAction::Notify(CallNotice::Incoming { caller, .. })] if caller.as_str() == "alice"
        ));
        assert_eq!(m.state(), CallState::IncomingRinging);

        let attempt = find_attempt(&m.handle(CallInput::Accept).unwrap());
        assert!(m.handle(CallInput::Accept).unwrap().is_empty());
        assert_eq!(m.state(), CallState::IncomingRinging);

        let actions =
            m.handle(CallInput::MediaAcquired { attempt, media: MediaHandle::new(5) }).unwrap();
        assert_eq!(m.state(), CallState::Connecting);
        let accept = OutboundEvent::CallAccept { call_id: "c9".into() };
        assert_eq!(actions[1], CallAction::Emit(accept));

        // candidate before the offer
        m.handle(signal(InboundEvent::IceCandidate(CandidatePayload {
            call_id: Some("c9".into()),
            candidate: candidate(1),
            target: None,
        })))
        .unwrap();

        let actions = m
            .handle(signal(InboundEvent::Offer(OfferPayload {
                call_id: Some("c9".into()),
                offer: SessionDescription::offer("o"),
                target: Some("alice".into()),
            })))
            .unwrap();
        assert!(matches!(&actions[..], [CallAction::SetRemoteDescription { .. }]));

        let actions = m.handle(CallInput::RemoteDescriptionApplied { attempt }).unwrap();
        assert_eq!(actions, vec![
            CallAction::AddIceCandidate { attempt, candidate: candidate(1) },
            CallAction::CreateAnswer { attempt },
        ]);

        // remote track can arrive before the answer is sent
        let actions =
            m.handle(CallInput::RemoteTrack { attempt, media: MediaHandle::new(6) }).unwrap();
        assert!(matches!(&actions[..], [CallAction::Notify(CallNotice::Active { .. })]));
        assert_eq!(m.state(), CallState::Active);

        let actions = m
            .handle(CallInput::AnswerCreated { attempt, answer: SessionDescription::answer("a") })
            .unwrap();
        let [CallAction::Emit(OutboundEvent::Answer(payload))] = &actions[..] else {
            panic!("expected answer emission, got {actions:?}");
        };
        assert_eq!(payload.target, Some(UserId::new("alice")));
    }

    #[test]
    fn reject_never_acquires_media() {
        let mut m = machine();
        m.handle(incoming("c2", "alice")).unwrap();

        let actions = m.handle(CallInput::Reject).unwrap();

        let reject = OutboundEvent::CallReject { call_id: "c2".into() };
        assert_eq!(actions[0], CallAction::Emit(reject));
        assert!(actions.iter().all(|a| !matches!(
            a,
            CallAction::AcquireMedia { .. }
                | CallAction::ReleaseMedia(_)
                | CallAction::ClosePeer { .. }
        )));
        assert!(matches!(
            actions.last(),
            Some(CallAction::Notify(CallNotice::Ended { reason: EndReason::Declined, .. }))
        ));
        assert_eq!(m.state(), CallState::Idle);
    }

    #[test]
    fn accept_and_reject_require_ringing() {
        let mut m = machine();
        assert_eq!(m.handle(CallInput::Accept).unwrap_err(), ClientError::InvalidState {
            state: CallState::Idle,
            operation: "accept",
        });
        assert!(m.handle(CallInput::Reject).is_err());
    }

    #[test]
    fn local_end_emits_then_releases_everything() {
        let mut m = machine();
        let attempt = outgoing_connecting(&mut m);
        m.handle(CallInput::RemoteTrack { attempt, media: MediaHandle::new(2) }).unwrap();

        let actions = m.handle(CallInput::End).unwrap();

        assert_eq!(actions, vec![
            CallAction::Emit(OutboundEvent::CallEnd {
                call_id: "c1".into(),
                room_id: Some("r1".into()),
                target: Some("bob".into()),
            }),
            CallAction::ClosePeer { attempt },
            CallAction::ReleaseMedia(MediaHandle::new(1)),
            CallAction::ReleaseMedia(MediaHandle::new(2)),
            CallAction::Notify(CallNotice::Ended {
                call_id: "c1".into(),
                reason: EndReason::Hangup
            }),
        ]);
        assert_eq!(m.state(), CallState::Idle);
        assert!(m.local_media().is_none() && m.remote_media().is_none());
    }

    #[test]
    fn remote_end_does_not_emit() {
        let mut m = machine();
        outgoing_connecting(&mut m);

        let actions =
            m.handle(signal(InboundEvent::CallEnded(CallEnded { call_id: "c1".into() }))).unwrap();
        assert!(actions.iter().all(|a| !matches!(a, CallAction::Emit(_))));
        assert_eq!(m.state(), CallState::Idle);
    }

    #[test]
    fn stale_call_ended_is_ignored() {
        let mut m = machine();
        outgoing_connecting(&mut m);

        let actions =
            m.handle(signal(InboundEvent::CallEnded(CallEnded { call_id: "old".into() }))).unwrap();
        assert!(actions.is_empty());
        assert_eq!(m.state(), CallState::Connecting);
    }

    #[test]
    fn late_end_of_previous_call_spares_new_outgoing() {
        let mut m = machine();
        outgoing_connecting(&mut m);
        m.handle(CallInput::End).unwrap();

        let attempt = initiate(&mut m);
        m.handle(CallInput::MediaAcquired { attempt, media: MediaHandle::new(9) }).unwrap();
        assert!(m.is_provisional());

        let late = signal(InboundEvent::CallEnded(CallEnded { call_id: "c1".into() }));
        assert!(m.handle(late).unwrap().is_empty());
        assert_eq!(m.state(), CallState::Outgoing);

        // the service's ID for the new call is not known yet
        let ended = signal(InboundEvent::CallEnded(CallEnded { call_id: "c2".into() }));
        let actions = m.handle(ended).unwrap();
        assert!(actions.contains(&CallAction::ReleaseMedia(MediaHandle::new(9))));
        assert_eq!(m.state(), CallState::Idle);
    }

    #[test]
    fn end_of_ignored_incoming_spares_outgoing() {
        let mut m = machine();
        let attempt = initiate(&mut m);
        m.handle(CallInput::MediaAcquired { attempt, media: MediaHandle::new(2) }).unwrap();
        assert!(m.handle(incoming("c9", "carol")).unwrap().is_empty());

        let ended = signal(InboundEvent::CallEnded(CallEnded { call_id: "c9".into() }));
        assert!(m.handle(ended).unwrap().is_empty());
        assert_eq!(m.state(), CallState::Outgoing);
    }

    #[test]
    fn rejected_outgoing_releases_media() {
        let mut m = machine();
        let attempt = initiate(&mut m);
        m.handle(CallInput::MediaAcquired { attempt, media: MediaHandle::new(4) }).unwrap();

        let actions =
            m.handle(signal(InboundEvent::CallRejected(CallRejected::default()))).unwrap();

        assert!(actions.contains(&CallAction::ReleaseMedia(MediaHandle::new(4))));
        assert!(actions.contains(&CallAction::ClosePeer { attempt }));
        assert!(!actions.iter().any(|a| matches!(a, CallAction::Emit(_))));
        assert_eq!(m.state(), CallState::Idle);
    }

    #[test]
    fn busy_ignores_second_incoming() {
        let mut m = machine();
        m.handle(incoming("c1", "alice")).unwrap();
        assert!(m.handle(incoming("c2", "carol")).unwrap().is_empty());
        assert_eq!(m.call_id(), Some(&CallId::new("c1")));
    }

    #[test]
    fn signaling_failure_tears_down() {
        let mut m = machine();
        let attempt = outgoing_connecting(&mut m);

        let actions = m
            .handle(CallInput::PeerFailed {
                attempt,
                error: SignalingError::SetRemoteDescription("bad sdp".into()),
            })
            .unwrap();

        assert!(matches!(actions[0], CallAction::Emit(OutboundEvent::CallEnd { .. })));
        assert!(matches!(
            actions.last(),
            Some(CallAction::Notify(CallNotice::Ended { reason: EndReason::Failed(_), .. }))
        ));
        assert_eq!(m.state(), CallState::Idle);

        // completions for the dead attempt are ignored or released
        assert!(m.handle(CallInput::RemoteDescriptionApplied { attempt }).unwrap().is_empty());
        assert_eq!(
            m.handle(CallInput::RemoteTrack { attempt, media: MediaHandle::new(9) }).unwrap(),
            vec![CallAction::ReleaseMedia(MediaHandle::new(9))]
        );
    }

    #[test]
    fn local_candidates_go_to_remote_peer() {
        let mut m = machine();
        let attempt = outgoing_connecting(&mut m);

        let actions =
            m.handle(CallInput::LocalCandidate { attempt, candidate: candidate(1) }).unwrap();
        let [CallAction::Emit(OutboundEvent::IceCandidate(payload))] = &actions[..] else {
            panic!("expected candidate emission, got {actions:?}");
        };
        assert_eq!(payload.target, Some(UserId::new("bob")));
    }

    #[test]
    fn config_defaults_to_public_stun() {
        assert_eq!(CallConfig::default().ice_servers.len(), 5);
    }
}
