//! Simulation driver implementing the [`Driver`] trait.
//!
//! `SimDriver` replaces the real channel transport and UI with in-memory
//! queues, so the same [`huddle_app::Runtime`] orchestration runs in tests.
//! Clones share state: the test keeps one to inject inputs and inspect what
//! the runtime sent, the runtime owns another.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use huddle_app::{Command, Driver, Input, UploadError};
use huddle_client::Notice;
use huddle_proto::{OutboundEvent, RoomId, decode};

/// Error type for the simulation driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDriverError(pub String);

impl std::fmt::Display for SimDriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sim driver: {}", self.0)
    }
}

impl std::error::Error for SimDriverError {}

#[derive(Default)]
struct SharedState {
    inputs: VecDeque<Input>,
    sent: Vec<String>,
    failed_sends: usize,
    notices: Vec<Notice>,
    upload_failures: Vec<(RoomId, UploadError)>,
    connected: bool,
    refuse_connect: bool,
    connects: usize,
}

/// Simulation driver for deterministic testing.
#[derive(Clone, Default)]
pub struct SimDriver {
    state: Arc<Mutex<SharedState>>,
}

impl SimDriver {
    /// Create a driver with no queued input.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an input.
    pub fn inject(&self, input: Input) {
        self.lock().inputs.push_back(input);
    }

    /// Queue a user command.
    pub fn command(&self, command: Command) {
        self.inject(Input::Command(command));
    }

    /// Queue raw event text as if received on the channel.
    pub fn receive(&self, text: impl Into<String>) {
        self.inject(Input::Inbound(text.into()));
    }

    /// Whether inputs are waiting.
    pub fn has_pending(&self) -> bool {
        !self.lock().inputs.is_empty()
    }

    /// Take every event text sent since the last call.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().sent)
    }

    /// Take and decode every event sent since the last call.
    pub fn take_sent_events(&self) -> Vec<OutboundEvent> {
        self.take_sent().iter().filter_map(|text| decode(text).ok()).collect()
    }

    /// Take every notice surfaced since the last call.
    pub fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut self.lock().notices)
    }

    /// Upload failures reported so far.
    pub fn upload_failures(&self) -> Vec<(RoomId, UploadError)> {
        self.lock().upload_failures.clone()
    }

    /// Whether the channel is open.
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Sends attempted while the channel was down.
    pub fn failed_sends(&self) -> usize {
        self.lock().failed_sends
    }

    /// Number of successful connects.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Make the next connect attempt fail.
    pub fn refuse_next_connect(&self) {
        self.lock().refuse_connect = true;
    }

    /// Drop the channel from the transport side and tell the runtime.
    pub fn drop_channel(&self) {
        let mut state = self.lock();
        state.connected = false;
        state.inputs.push_back(Input::ChannelLost);
    }

    /// Re-establish the channel from the transport side and tell the runtime.
    pub fn restore_channel(&self) {
        let mut state = self.lock();
        state.connected = true;
        state.inputs.push_back(Input::ChannelRestored);
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    async fn next_input(&mut self) -> Result<Option<Input>, Self::Error> {
        Ok(self.lock().inputs.pop_front())
    }

    async fn connect(&mut self) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if std::mem::take(&mut state.refuse_connect) {
            return Err(SimDriverError("connection refused".to_string()));
        }
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    async fn disconnect(&mut self, _reason: &str) {
        self.lock().connected = false;
    }

    async fn send_text(&mut self, text: String) -> Result<(), Self::Error> {
        let mut state = self.lock();
        if !state.connected {
            state.failed_sends += 1;
            return Err(SimDriverError("channel closed".to_string()));
        }
        state.sent.push(text);
        Ok(())
    }

    fn notify(&mut self, notice: &Notice) -> Result<(), Self::Error> {
        self.lock().notices.push(notice.clone());
        Ok(())
    }

    fn upload_failed(&mut self, room_id: &RoomId, error: &UploadError) -> Result<(), Self::Error> {
        self.lock().upload_failures.push((room_id.clone(), error.clone()));
        Ok(())
    }
}
