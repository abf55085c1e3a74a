//! Named events exchanged over the channel.
//!
//! Both directions are adjacently tagged enums: the variant name lives in the
//! `event` field and the payload in `data`.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    ProtocolError,
    signal::{IceCandidate, SessionDescription},
    types::{AttachmentKind, CallId, FileAttachment, Message, Room, RoomId, User, UserId},
};

/// Reference to the user placing a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerRef {
    /// Caller's user ID.
    pub id: UserId,
}

/// `call:incoming`: another user is calling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIncoming {
    /// Server-assigned call ID.
    pub call_id: CallId,
    /// Who is calling.
    pub caller: CallerRef,
    /// Room the call was placed from, when the service includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

/// `call:accepted`: the callee accepted; `target` is the peer to offer to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAccepted {
    /// Server-assigned call ID.
    pub call_id: CallId,
    /// Callee's user ID.
    pub target: UserId,
}

/// `call:rejected`: the callee declined. The service sends an empty payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRejected {
    /// Call being rejected, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,
}

/// `call:ended`: the remote side hung up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnded {
    /// Call that ended.
    pub call_id: CallId,
}

/// `webrtc:offer` in either direction.
///
/// Outbound, `target` names the recipient. Relayed inbound, the service names
/// the sender as `from`; both spellings land in `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayload {
    /// Call the offer belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,
    /// Caller's session description.
    pub offer: SessionDescription,
    /// Remote peer.
    #[serde(default, alias = "from", skip_serializing_if = "Option::is_none")]
    pub target: Option<UserId>,
}

/// `webrtc:answer` in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    /// Call the answer belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,
    /// Callee's session description.
    pub answer: SessionDescription,
    /// Remote peer.
    #[serde(default, alias = "from", skip_serializing_if = "Option::is_none")]
    pub target: Option<UserId>,
}

/// `webrtc:ice-candidate` in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePayload {
    /// Call the candidate belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<CallId>,
    /// Gathered candidate.
    pub candidate: IceCandidate,
    /// Remote peer.
    #[serde(default, alias = "from", skip_serializing_if = "Option::is_none")]
    pub target: Option<UserId>,
}

/// `messages:list`: one page of room history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    /// Messages on this page, in whatever order the service sent them.
    pub messages: Vec<Message>,
    /// Total number of messages in the room.
    #[serde(default)]
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    /// Number of pages available.
    #[serde(default)]
    pub total_pages: u32,
    /// Room the page was requested for, when the service echoes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

/// `user:typing` as delivered to other room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    /// Room the user is typing in.
    pub room_id: RoomId,
    /// Typing user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Display name shown in the indicator.
    #[serde(default)]
    pub username: String,
}

/// `user:stop-typing` as delivered to other room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTypingNotice {
    /// Room the user stopped typing in.
    pub room_id: RoomId,
    /// User who stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
}

/// `message:send` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    /// Destination room.
    pub room_id: RoomId,
    /// Text, or the file name for attachments.
    pub content: String,
    /// Attachment type; absent for text.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<AttachmentKind>,
    /// Uploaded file descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<FileAttachment>,
}

impl SendMessage {
    /// Plain text message.
    pub fn text(room_id: RoomId, content: impl Into<String>) -> Self {
        Self { room_id, content: content.into(), kind: None, file: None }
    }

    /// Message announcing an uploaded file. The content is the file name.
    pub fn attachment(room_id: RoomId, file: FileAttachment) -> Self {
        let content =
            if file.name.is_empty() { "sent a file".to_string() } else { file.name.clone() };
        Self {
            room_id,
            content,
            kind: Some(AttachmentKind::for_mime(&file.mime_type)),
            file: Some(file),
        }
    }
}

/// Event delivered by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    /// Someone is calling this user.
    #[serde(rename = "call:incoming")]
    CallIncoming(CallIncoming),
    /// The callee accepted an outgoing call.
    #[serde(rename = "call:accepted")]
    CallAccepted(CallAccepted),
    /// The callee rejected an outgoing call.
    #[serde(rename = "call:rejected")]
    CallRejected(CallRejected),
    /// The remote side ended the call.
    #[serde(rename = "call:ended")]
    CallEnded(CallEnded),
    /// Relayed SDP offer.
    #[serde(rename = "webrtc:offer")]
    Offer(OfferPayload),
    /// Relayed SDP answer.
    #[serde(rename = "webrtc:answer")]
    Answer(AnswerPayload),
    /// Relayed ICE candidate.
    #[serde(rename = "webrtc:ice-candidate")]
    IceCandidate(CandidatePayload),
    /// Full room list for this user.
    #[serde(rename = "rooms:list")]
    RoomsList(Vec<Room>),
    /// A room this user belongs to was created.
    #[serde(rename = "room:created")]
    RoomCreated(Room),
    /// A room changed.
    #[serde(rename = "room:updated")]
    RoomUpdated(Room),
    /// A message was persisted.
    #[serde(rename = "message:new")]
    MessageNew(Message),
    /// Response to `messages:get`.
    #[serde(rename = "messages:list")]
    MessagesList(MessagePage),
    /// Another member is typing.
    #[serde(rename = "user:typing")]
    UserTyping(TypingNotice),
    /// Another member stopped typing.
    #[serde(rename = "user:stop-typing")]
    UserStopTyping(StopTypingNotice),
    /// Users currently connected.
    #[serde(rename = "users:online")]
    UsersOnline(Vec<User>),
}

impl InboundEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallIncoming(_) => "call:incoming",
            Self::CallAccepted(_) => "call:accepted",
            Self::CallRejected(_) => "call:rejected",
            Self::CallEnded(_) => "call:ended",
            Self::Offer(_) => "webrtc:offer",
            Self::Answer(_) => "webrtc:answer",
            Self::IceCandidate(_) => "webrtc:ice-candidate",
            Self::RoomsList(_) => "rooms:list",
            Self::RoomCreated(_) => "room:created",
            Self::RoomUpdated(_) => "room:updated",
            Self::MessageNew(_) => "message:new",
            Self::MessagesList(_) => "messages:list",
            Self::UserTyping(_) => "user:typing",
            Self::UserStopTyping(_) => "user:stop-typing",
            Self::UsersOnline(_) => "users:online",
        }
    }

    /// Returns true for events consumed by the call state machine.
    pub fn is_call_signal(&self) -> bool {
        matches!(
            self,
            Self::CallIncoming(_)
                | Self::CallAccepted(_)
                | Self::CallRejected(_)
                | Self::CallEnded(_)
                | Self::Offer(_)
                | Self::Answer(_)
                | Self::IceCandidate(_)
        )
    }
}

/// Event emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all_fields = "camelCase")]
pub enum OutboundEvent {
    /// Ring the other members of a room.
    #[serde(rename = "call:request")]
    CallRequest {
        /// Room to call.
        room_id: RoomId,
    },
    /// Accept an incoming call.
    #[serde(rename = "call:accept")]
    CallAccept {
        /// Call being accepted.
        call_id: CallId,
    },
    /// Decline an incoming call.
    #[serde(rename = "call:reject")]
    CallReject {
        /// Call being declined.
        call_id: CallId,
    },
    /// Hang up.
    #[serde(rename = "call:end")]
    CallEnd {
        /// Call being ended.
        call_id: CallId,
        /// Room the call was placed from.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        /// Remote peer to notify.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<UserId>,
    },
    /// SDP offer for the remote peer.
    #[serde(rename = "webrtc:offer")]
    Offer(OfferPayload),
    /// SDP answer for the remote peer.
    #[serde(rename = "webrtc:answer")]
    Answer(AnswerPayload),
    /// Locally gathered ICE candidate.
    #[serde(rename = "webrtc:ice-candidate")]
    IceCandidate(CandidatePayload),
    /// Post a message.
    #[serde(rename = "message:send")]
    SendMessage(SendMessage),
    /// Request a page of room history.
    #[serde(rename = "messages:get")]
    GetMessages {
        /// Room to page through.
        room_id: RoomId,
        /// 1-based page number.
        page: u32,
        /// Page size.
        limit: u32,
    },
    /// Local user started typing.
    #[serde(rename = "user:typing")]
    Typing {
        /// Room being typed in.
        room_id: RoomId,
    },
    /// Local user stopped typing.
    #[serde(rename = "user:stop-typing")]
    StopTyping {
        /// Room typing stopped in.
        room_id: RoomId,
    },
    /// Open a private room with another user.
    #[serde(rename = "room:create")]
    CreateRoom {
        /// The other participant.
        user_id: UserId,
    },
}

impl OutboundEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CallRequest { .. } => "call:request",
            Self::CallAccept { .. } => "call:accept",
            Self::CallReject { .. } => "call:reject",
            Self::CallEnd { .. } => "call:end",
            Self::Offer(_) => "webrtc:offer",
            Self::Answer(_) => "webrtc:answer",
            Self::IceCandidate(_) => "webrtc:ice-candidate",
            Self::SendMessage(_) => "message:send",
            Self::GetMessages { .. } => "messages:get",
            Self::Typing { .. } => "user:typing",
            Self::StopTyping { .. } => "user:stop-typing",
            Self::CreateRoom { .. } => "room:create",
        }
    }
}

/// An event that knows its wire name.
pub trait NamedEvent: Serialize {
    /// Event name as it appears on the wire.
    fn event_name(&self) -> &'static str;
}

impl NamedEvent for InboundEvent {
    fn event_name(&self) -> &'static str {
        self.name()
    }
}

impl NamedEvent for OutboundEvent {
    fn event_name(&self) -> &'static str {
        self.name()
    }
}

/// Encode an event as JSON envelope text.
///
/// # Errors
///
/// - `ProtocolError::Encode` if serialization fails
pub fn encode<E: NamedEvent>(event: &E) -> Result<String, ProtocolError> {
    serde_json::to_string(event)
        .map_err(|e| ProtocolError::Encode { event: event.event_name(), reason: e.to_string() })
}

/// Decode JSON envelope text into an event.
///
/// Events emitted without a payload (`call:rejected`) arrive with `data`
/// missing or `null`; those are treated as an empty object.
///
/// # Errors
///
/// - `ProtocolError::Decode` if the text is not JSON, the event name is
///   unknown, or the payload does not match the event
pub fn decode<E: DeserializeOwned>(text: &str) -> Result<E, ProtocolError> {
    let mut value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode { reason: e.to_string() })?;

    if let Some(envelope) = value.as_object_mut()
        && envelope.get("data").is_none_or(Value::is_null)
    {
        envelope.insert("data".to_string(), Value::Object(Map::new()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Decode { reason: e.to_string() })
}
