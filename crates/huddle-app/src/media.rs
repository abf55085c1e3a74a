//! Media backend trait.
//!
//! Wraps the platform's camera/microphone access and its peer connection.
//! At most one peer connection exists at a time; every method names the
//! [`Attempt`] it belongs to so backends can ignore calls for a connection
//! they already closed.

use std::future::Future;

use huddle_client::Attempt;
use huddle_core::{MediaError, MediaHandle, SignalingError};
use huddle_proto::{IceCandidate, IceServer, SessionDescription};

/// Platform media and peer connection primitives.
///
/// Spontaneous peer events (gathered candidates, remote tracks, connection
/// failure) are not returned here; the platform delivers them through the
/// [`Driver`](crate::Driver) as [`PeerSignal`](crate::PeerSignal)s.
pub trait MediaBackend: Send {
    /// Acquire camera and microphone.
    ///
    /// # Errors
    ///
    /// Returns a classified [`MediaError`] when the devices are unavailable.
    fn acquire(&mut self) -> impl Future<Output = Result<MediaHandle, MediaError>> + Send;

    /// Stop every track of a stream. Completes once the devices are free.
    fn release(&mut self, media: MediaHandle) -> impl Future<Output = ()> + Send;

    /// Create the peer connection and attach the local tracks.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::PeerConnection`] if creation fails.
    fn open_peer(
        &mut self,
        attempt: Attempt,
        ice_servers: Vec<IceServer>,
        local_media: MediaHandle,
    ) -> impl Future<Output = Result<(), SignalingError>> + Send;

    /// Close the peer connection.
    fn close_peer(&mut self, attempt: Attempt) -> impl Future<Output = ()> + Send;

    /// Create an offer and set it as local description.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::CreateOffer`] on failure.
    fn create_offer(
        &mut self,
        attempt: Attempt,
    ) -> impl Future<Output = Result<SessionDescription, SignalingError>> + Send;

    /// Create an answer and set it as local description.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::CreateAnswer`] on failure.
    fn create_answer(
        &mut self,
        attempt: Attempt,
    ) -> impl Future<Output = Result<SessionDescription, SignalingError>> + Send;

    /// Apply the remote offer or answer.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::SetRemoteDescription`] on failure.
    fn set_remote_description(
        &mut self,
        attempt: Attempt,
        description: SessionDescription,
    ) -> impl Future<Output = Result<(), SignalingError>> + Send;

    /// Apply a remote candidate.
    ///
    /// # Errors
    ///
    /// Returns [`SignalingError::AddCandidate`] on failure.
    fn add_ice_candidate(
        &mut self,
        attempt: Attempt,
        candidate: IceCandidate,
    ) -> impl Future<Output = Result<(), SignalingError>> + Send;
}
