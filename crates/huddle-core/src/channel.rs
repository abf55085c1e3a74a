//! Event channel lifecycle state machine.
//!
//! Tracks whether the duplex channel to the coordination service is usable and
//! gates outbound emission on it. The transport itself (and its authentication
//! handshake) is external; the driver reports its progress here and executes
//! the returned actions.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect ┌────────────┐ opened ┌───────────┐
//! │ Disconnected │────────>│ Connecting │───────>│ Connected │
//! └──────────────┘         └────────────┘        └───────────┘
//!        ^   ^                   │ timeout/lost        │
//!        │   └───────────────────┘                     │ lost
//!        └─────────────────────────────────────────────┘
//!
//!              close (any state) ──> Closed (terminal)
//! ```
//!
//! There is no implicit retry. A lost channel stays `Disconnected` until the
//! driver reports it open again.

use std::{
    ops::Sub,
    time::{Duration, Instant},
};

use serde::Deserialize;

use crate::error::ChannelError;

/// Time allowed for the transport to report the channel open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Actions returned by the channel state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    /// Ask the transport to connect
    Open,

    /// Tear the transport down
    Close {
        /// Reason for closing the channel
        reason: String,
    },
}

/// Channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No transport; emission is a silent no-op
    Disconnected,
    /// Transport asked to connect, not yet confirmed
    Connecting,
    /// Transport connected and authenticated
    Connected,
    /// Shut down for good
    Closed,
}

/// Channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Timeout for the transport to report the channel open
    #[serde(with = "crate::duration_ms")]
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { connect_timeout: DEFAULT_CONNECT_TIMEOUT }
    }
}

/// Channel state machine
///
/// Pure state machine: time is passed as parameters to methods that need it.
/// Generic over `Instant` so simulation can drive it with virtual time.
#[derive(Debug, Clone)]
pub struct Channel<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    state: ChannelState,
    config: ChannelConfig,
    /// When the current connect attempt started
    connect_started: Option<I>,
}

impl<I> Channel<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a new channel in [`ChannelState::Disconnected`] state
    pub fn new(config: ChannelConfig) -> Self {
        Self { state: ChannelState::Disconnected, config, connect_started: None }
    }

    /// Current channel state
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Returns true if events can be emitted
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    /// Start connecting.
    ///
    /// # Errors
    ///
    /// - `ChannelError::InvalidState` if not `Disconnected`
    pub fn connect(&mut self, now: I) -> Result<Vec<ChannelAction>, ChannelError> {
        if self.state != ChannelState::Disconnected {
            return Err(ChannelError::InvalidState { state: self.state, operation: "connect" });
        }

        self.state = ChannelState::Connecting;
        self.connect_started = Some(now);

        Ok(vec![ChannelAction::Open])
    }

    /// Transport reports the channel open.
    ///
    /// Accepted from `Disconnected` as well, for transports that reconnect on
    /// their own.
    ///
    /// # Errors
    ///
    /// - `ChannelError::InvalidState` if `Connected` or `Closed`
    pub fn opened(&mut self) -> Result<(), ChannelError> {
        match self.state {
            ChannelState::Connecting | ChannelState::Disconnected => {
                self.state = ChannelState::Connected;
                self.connect_started = None;
                Ok(())
            },
            state => Err(ChannelError::InvalidState { state, operation: "open" }),
        }
    }

    /// Transport reports the channel lost. No-op once closed.
    pub fn lost(&mut self) {
        if self.state != ChannelState::Closed {
            self.state = ChannelState::Disconnected;
            self.connect_started = None;
        }
    }

    /// Shut the channel down. Returns a `Close` action unless the transport is
    /// already gone.
    pub fn close(&mut self, reason: impl Into<String>) -> Vec<ChannelAction> {
        let previous = self.state;
        self.state = ChannelState::Closed;
        self.connect_started = None;

        match previous {
            ChannelState::Connecting | ChannelState::Connected => {
                vec![ChannelAction::Close { reason: reason.into() }]
            },
            ChannelState::Disconnected | ChannelState::Closed => Vec::new(),
        }
    }

    /// Check that an event may be emitted now.
    ///
    /// # Errors
    ///
    /// - `ChannelError::Unavailable` unless `Connected`
    pub fn ensure_writable(&self) -> Result<(), ChannelError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ChannelError::Unavailable { state: self.state })
        }
    }

    /// Elapsed time since connect started, if the timeout was exceeded.
    #[must_use]
    pub fn check_timeout(&self, now: I) -> Option<Duration> {
        let started = self.connect_started?;
        let elapsed = now - started;

        if self.state == ChannelState::Connecting && elapsed > self.config.connect_timeout {
            Some(elapsed)
        } else {
            None
        }
    }

    /// Process periodic maintenance.
    ///
    /// A connect attempt that exceeded its timeout is abandoned: the channel
    /// returns to `Disconnected` and the transport is closed.
    pub fn tick(&mut self, now: I) -> Vec<ChannelAction> {
        match self.check_timeout(now) {
            Some(elapsed) => {
                self.state = ChannelState::Disconnected;
                self.connect_started = None;
                let reason = ChannelError::ConnectTimeout { elapsed }.to_string();
                vec![ChannelAction::Close { reason }]
            },
            None => Vec::new(),
        }
    }
}
