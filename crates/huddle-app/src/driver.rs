//! Driver trait for abstracting transport and user I/O.
//!
//! The [`Driver`] trait decouples the runtime from a concrete channel
//! transport and UI. Each frontend implements it, while the generic
//! [`crate::Runtime`] owns all orchestration.

use std::future::Future;

use huddle_client::Notice;
use huddle_proto::RoomId;

use crate::{input::Input, upload::UploadError};

/// Abstracts channel transport and user interaction for the runtime.
///
/// # Implementations
///
/// - **Production**: a WebSocket-style event channel plus the UI event loop
/// - **Simulation**: in-memory queues routed through a simulated relay
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Wait for the next input.
    ///
    /// Returns `None` when the input source is exhausted.
    fn next_input(&mut self) -> impl Future<Output = Result<Option<Input>, Self::Error>> + Send;

    /// Open the event channel. Credentials are the driver's concern.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be opened.
    fn connect(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Close the event channel.
    fn disconnect(&mut self, reason: &str) -> impl Future<Output = ()> + Send;

    /// Send one encoded event over the channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or the write fails.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Surface a notice to the user.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn notify(&mut self, notice: &Notice) -> Result<(), Self::Error>;

    /// Report a failed upload to the user.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn upload_failed(&mut self, room_id: &RoomId, error: &UploadError) -> Result<(), Self::Error>;
}
