//! Application layer for Huddle
//!
//! Generic async runtime that drives a [`huddle_client::Session`] against
//! platform I/O, so the same orchestration code runs in production and in
//! deterministic simulation.
//!
//! # Components
//!
//! - [`Driver`]: transport, user input and notification surface
//! - [`MediaBackend`]: camera/microphone and peer connection primitives
//! - [`FileUploader`]: out-of-band file upload
//! - [`Runtime`]: executes session actions against the three and feeds
//!   completions back
//! - [`SystemEnv`]: production [`huddle_core::Environment`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod error;
mod input;
mod media;
mod runtime;
mod system_env;
mod upload;

pub use driver::Driver;
pub use error::RuntimeError;
pub use input::{Command, Input, PeerSignal};
pub use media::MediaBackend;
pub use runtime::{Flow, Runtime};
pub use system_env::SystemEnv;
pub use upload::{FileUploader, OutgoingFile, UploadError};
