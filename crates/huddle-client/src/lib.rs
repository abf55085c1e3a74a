//! Client
//!
//! Action-based state machines that keep a user's chat session and
//! peer-to-peer call synchronized with the coordination service.
//!
//! # Architecture
//!
//! Same Sans-IO pattern as [`huddle_core`]: components receive inputs, update
//! owned state, and return actions for the caller to execute. None of them
//! performs I/O or reads a clock.
//!
//! # Components
//!
//! - [`CallMachine`]: at most one call; offer/answer/candidate exchange and
//!   local media ownership
//! - [`ChatSync`]: rooms, the active room's timeline, pagination and typing
//!   indicators
//! - [`TypingDebouncer`]: turns keystrokes into typing start/stop emissions
//! - [`Session`]: composes the three with the channel lifecycle and routes
//!   inbound events

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod call;
mod chat;
mod error;
mod session;
mod typing;

pub use call::{
    Attempt, CallAction, CallConfig, CallInput, CallMachine, CallNotice, CallRole, CallState,
    EndReason, PROVISIONAL_CALL_PREFIX,
};
pub use chat::{
    ChatAction, ChatChange, ChatConfig, ChatSync, DEFAULT_PAGE_SIZE, DEFAULT_TYPING_EXPIRY,
    Pagination, TypingIndicator,
};
pub use error::ClientError;
pub use huddle_core::env::Environment;
pub use session::{Notice, Session, SessionAction, SessionConfig};
pub use typing::{DEFAULT_TYPING_IDLE, DEFAULT_TYPING_REFRESH, TypingDebouncer};
