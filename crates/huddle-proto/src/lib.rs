//! Huddle wire protocol.
//!
//! The coordination service speaks a duplex, named-event protocol: every
//! message is a JSON object `{"event": "<name>", "data": <payload>}`. This
//! crate models both directions as strongly typed enums:
//!
//! - [`InboundEvent`]: events delivered by the service (call signaling relays,
//!   room and message updates, typing notices, presence)
//! - [`OutboundEvent`]: events emitted by the client
//!
//! The domain records carried inside events ([`Room`], [`Message`], [`User`])
//! and the peer negotiation primitives ([`SessionDescription`],
//! [`IceCandidate`]) live in [`types`] and [`signal`].
//!
//! # Compatibility
//!
//! The service stores records in a document database and leaks its field
//! names onto the wire (`_id`, `chatroom`, `participants`). Decoding accepts
//! both those names and the canonical camelCase names; encoding always uses
//! the names the service expects.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod event;
pub mod signal;
pub mod types;

pub use error::ProtocolError;
pub use event::{
    AnswerPayload, CallAccepted, CallEnded, CallIncoming, CallRejected, CandidatePayload,
    CallerRef, InboundEvent, MessagePage, NamedEvent, OfferPayload, OutboundEvent, SendMessage,
    StopTypingNotice, TypingNotice, decode, encode,
};
pub use signal::{DEFAULT_STUN_URLS, IceCandidate, IceServer, SdpKind, SessionDescription};
pub use types::{
    AttachmentKind, CallId, FileAttachment, LastMessage, Message, MessageId, MessageKind, Room,
    RoomId, RoomKind, User, UserId,
};
