//! Huddle core primitives.
//!
//! Building blocks shared by the client state machines and their drivers:
//!
//! - [`env::Environment`]: time and randomness, abstracted for simulation
//! - [`channel::Channel`]: lifecycle of the event channel to the service
//! - [`media::MediaHandle`]: opaque token for an acquired media stream
//! - [`error`]: channel, media and signaling error taxonomy
//!
//! Nothing in this crate performs I/O. State machines take the current time as
//! a parameter and return actions for a driver to execute.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub mod duration_ms;
pub mod env;
pub mod error;
pub mod media;

pub use channel::{Channel, ChannelAction, ChannelConfig, ChannelState};
pub use env::Environment;
pub use error::{ChannelError, MediaError, SignalingError};
pub use media::MediaHandle;
