//! In-memory media backend.
//!
//! Hands out numbered [`MediaHandle`]s and tracks which are still live, so
//! tests can assert that nothing leaks. Peer connections "connect" as soon as
//! both descriptions are set: a local candidate is gathered when the local
//! description is set and the remote track arrives once both are, delivered
//! through the owning client's [`SimDriver`].

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use huddle_app::{Input, MediaBackend, PeerSignal};
use huddle_client::Attempt;
use huddle_core::{MediaError, MediaHandle, SignalingError};
use huddle_proto::{IceCandidate, IceServer, SessionDescription};

use crate::SimDriver;

/// Peer connection step to fail on its next use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerFault {
    /// `open_peer`
    Open,
    /// `create_offer`
    CreateOffer,
    /// `create_answer`
    CreateAnswer,
    /// `set_remote_description`
    SetRemote,
    /// `add_ice_candidate`
    AddCandidate,
}

#[derive(Debug, Default)]
struct SimPeer {
    local_set: bool,
    remote_set: bool,
    track_sent: bool,
    candidates: Vec<IceCandidate>,
}

#[derive(Default)]
struct MediaState {
    next_handle: u64,
    live: BTreeSet<MediaHandle>,
    released: Vec<MediaHandle>,
    peers: BTreeMap<Attempt, SimPeer>,
    last_peer: Option<Attempt>,
    acquire_failure: Option<MediaError>,
    peer_fault: Option<PeerFault>,
    acquisitions: usize,
}

impl MediaState {
    fn allocate(&mut self) -> MediaHandle {
        self.next_handle += 1;
        let handle = MediaHandle::new(self.next_handle);
        self.live.insert(handle);
        handle
    }

    fn fault(&mut self, step: PeerFault) -> bool {
        self.peer_fault.take_if(|fault| *fault == step).is_some()
    }
}

/// Simulated camera, microphone and peer connection.
#[derive(Clone)]
pub struct SimMedia {
    state: Arc<Mutex<MediaState>>,
    driver: SimDriver,
}

impl SimMedia {
    /// Create a backend whose peer events are delivered through `driver`.
    pub fn new(driver: SimDriver) -> Self {
        Self { state: Arc::new(Mutex::new(MediaState::default())), driver }
    }

    fn lock(&self) -> MutexGuard<'_, MediaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handles acquired or received and not yet released.
    pub fn live(&self) -> Vec<MediaHandle> {
        self.lock().live.iter().copied().collect()
    }

    /// Handles released so far, in order.
    pub fn released(&self) -> Vec<MediaHandle> {
        self.lock().released.clone()
    }

    /// Open peer connections.
    pub fn open_peers(&self) -> usize {
        self.lock().peers.len()
    }

    /// Attempt of the most recently opened peer connection, open or not.
    pub fn last_peer(&self) -> Option<Attempt> {
        self.lock().last_peer
    }

    /// Remote candidates applied to the peer of `attempt`, in order.
    pub fn applied_candidates(&self, attempt: Attempt) -> Vec<IceCandidate> {
        self.lock().peers.get(&attempt).map(|peer| peer.candidates.clone()).unwrap_or_default()
    }

    /// Number of device acquisitions attempted.
    pub fn acquisitions(&self) -> usize {
        self.lock().acquisitions
    }

    /// Make the next acquisition fail.
    pub fn fail_next_acquire(&self, error: MediaError) {
        self.lock().acquire_failure = Some(error);
    }

    /// Make the next use of a peer connection step fail.
    pub fn fail_next(&self, fault: PeerFault) {
        self.lock().peer_fault = Some(fault);
    }

    /// Raise a spontaneous connection failure on the current peer.
    pub fn break_peer(&self) {
        let attempts: Vec<Attempt> = self.lock().peers.keys().copied().collect();
        for attempt in attempts {
            self.driver.inject(Input::Peer(PeerSignal::Failed {
                attempt,
                error: SignalingError::PeerConnection("ice failed".to_string()),
            }));
        }
    }

    fn local_description_set(&self, attempt: Attempt) {
        let candidate = IceCandidate::new(format!(
            "candidate:{} 1 udp 2122260223 10.0.0.{} 5000 typ host",
            attempt.get(),
            attempt.get() % 250 + 1
        ));
        self.driver.inject(Input::Peer(PeerSignal::LocalCandidate { attempt, candidate }));

        let mut state = self.lock();
        if let Some(peer) = state.peers.get_mut(&attempt) {
            peer.local_set = true;
        }
        drop(state);
        self.maybe_connect(attempt);
    }

    fn maybe_connect(&self, attempt: Attempt) {
        let mut state = self.lock();
        let ready = state.peers.get_mut(&attempt).is_some_and(|peer| {
            let ready = peer.local_set && peer.remote_set && !peer.track_sent;
            peer.track_sent |= ready;
            ready
        });
        if !ready {
            return;
        }

        let media = state.allocate();
        drop(state);
        self.driver.inject(Input::Peer(PeerSignal::RemoteTrack { attempt, media }));
    }
}

impl MediaBackend for SimMedia {
    async fn acquire(&mut self) -> Result<MediaHandle, MediaError> {
        let mut state = self.lock();
        state.acquisitions += 1;
        match state.acquire_failure.take() {
            Some(error) => Err(error),
            None => Ok(state.allocate()),
        }
    }

    async fn release(&mut self, media: MediaHandle) {
        let mut state = self.lock();
        state.live.remove(&media);
        state.released.push(media);
    }

    async fn open_peer(
        &mut self,
        attempt: Attempt,
        _ice_servers: Vec<IceServer>,
        local_media: MediaHandle,
    ) -> Result<(), SignalingError> {
        let mut state = self.lock();
        if state.fault(PeerFault::Open) {
            return Err(SignalingError::PeerConnection("simulated failure".to_string()));
        }
        if !state.live.contains(&local_media) {
            return Err(SignalingError::PeerConnection(format!("{local_media} is not live")));
        }
        state.peers.insert(attempt, SimPeer::default());
        state.last_peer = Some(attempt);
        Ok(())
    }

    async fn close_peer(&mut self, attempt: Attempt) {
        self.lock().peers.remove(&attempt);
    }

    async fn create_offer(
        &mut self,
        attempt: Attempt,
    ) -> Result<SessionDescription, SignalingError> {
        if self.lock().fault(PeerFault::CreateOffer) {
            return Err(SignalingError::CreateOffer("simulated failure".to_string()));
        }
        self.local_description_set(attempt);
        Ok(SessionDescription::offer(format!("v=0 sim-offer {}", attempt.get())))
    }

    async fn create_answer(
        &mut self,
        attempt: Attempt,
    ) -> Result<SessionDescription, SignalingError> {
        if self.lock().fault(PeerFault::CreateAnswer) {
            return Err(SignalingError::CreateAnswer("simulated failure".to_string()));
        }
        self.local_description_set(attempt);
        Ok(SessionDescription::answer(format!("v=0 sim-answer {}", attempt.get())))
    }

    async fn set_remote_description(
        &mut self,
        attempt: Attempt,
        _description: SessionDescription,
    ) -> Result<(), SignalingError> {
        let mut state = self.lock();
        if state.fault(PeerFault::SetRemote) {
            return Err(SignalingError::SetRemoteDescription("simulated failure".to_string()));
        }
        let Some(peer) = state.peers.get_mut(&attempt) else {
            return Err(SignalingError::SetRemoteDescription("no peer connection".to_string()));
        };
        peer.remote_set = true;
        drop(state);
        self.maybe_connect(attempt);
        Ok(())
    }

    async fn add_ice_candidate(
        &mut self,
        attempt: Attempt,
        candidate: IceCandidate,
    ) -> Result<(), SignalingError> {
        let mut state = self.lock();
        if state.fault(PeerFault::AddCandidate) {
            return Err(SignalingError::AddCandidate("simulated failure".to_string()));
        }
        match state.peers.get_mut(&attempt) {
            Some(peer) if peer.remote_set => {
                peer.candidates.push(candidate);
                Ok(())
            },
            Some(_) => Err(SignalingError::AddCandidate("remote description not set".to_string())),
            None => Err(SignalingError::AddCandidate("no peer connection".to_string())),
        }
    }
}
