//! Multi-client simulation.
//!
//! Wires one real [`Runtime`] per user to a shared [`SimRelay`]. Each pump
//! round routes everything the clients sent through the relay, then lets
//! every client drain its queued inputs, checking invariants after each one.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use huddle_app::{Command, Input, Runtime};
use huddle_client::SessionConfig;
use huddle_proto::{Room, RoomId, User, UserId};

use crate::{
    ClientSnapshot, FakeUploader, InvariantRegistry, SimDriver, SimEnv, SimMedia, SimRelay,
    SystemSnapshot,
};

/// Runtime type used by simulated clients.
pub type SimRuntime = Runtime<SimDriver, SimMedia, FakeUploader, SimEnv>;

/// Upper bound on pump rounds before the cluster is declared livelocked.
const MAX_ROUNDS: usize = 1_000;

/// One simulated user.
pub struct SimClient {
    /// Who this is
    pub user: User,
    /// The runtime under test
    pub runtime: SimRuntime,
    /// Shared handle to the runtime's driver
    pub driver: SimDriver,
    /// Shared handle to the runtime's media backend
    pub media: SimMedia,
    /// Shared handle to the runtime's uploader
    pub uploader: FakeUploader,
}

impl SimClient {
    /// Observable state.
    pub fn snapshot(&self) -> ClientSnapshot {
        let session = self.runtime.session();
        let call = session.call();
        let chat = session.chat();

        ClientSnapshot {
            user_id: self.user.id.clone(),
            call_state: call.state(),
            call_id: call.call_id().cloned(),
            local_media: call.local_media(),
            remote_media: call.remote_media(),
            live_media: self.media.live(),
            open_peers: self.media.open_peers(),
            active_room: chat.active_room().cloned(),
            timeline: chat.timeline().to_vec(),
        }
    }
}

/// Simulated users sharing one relay and one virtual clock.
pub struct SimCluster {
    env: SimEnv,
    /// The coordination service model
    pub relay: SimRelay,
    clients: Vec<SimClient>,
    invariants: InvariantRegistry,
}

impl SimCluster {
    /// Create a cluster with one client per `(id, username)`.
    pub fn new(seed: u64, users: &[(&str, &str)]) -> Self {
        Self::with_config(seed, users, &SessionConfig::default())
    }

    /// Create a cluster whose clients share `config`.
    pub fn with_config(seed: u64, users: &[(&str, &str)], config: &SessionConfig) -> Self {
        let env = SimEnv::with_seed(seed);
        let start: DateTime<Utc> = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();
        let mut relay = SimRelay::new(start);

        let clients = users
            .iter()
            .map(|&(id, username)| {
                let user = User::new(id, username);
                relay.add_user(user.clone());

                let driver = SimDriver::new();
                let media = SimMedia::new(driver.clone());
                let uploader = FakeUploader::new();
                let runtime = Runtime::new(
                    driver.clone(),
                    media.clone(),
                    uploader.clone(),
                    env.clone(),
                    config.clone(),
                );
                SimClient { user, runtime, driver, media, uploader }
            })
            .collect();

        Self { env, relay, clients, invariants: InvariantRegistry::standard() }
    }

    /// Replace the invariants checked after every input.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = registry;
        self
    }

    /// Register a room with the given members.
    pub fn add_room(&mut self, room_id: &str, name: &str, members: &[&str]) {
        let mut room = Room::new(room_id, huddle_proto::RoomKind::Group, name);
        for member in members {
            if let Some(client) = self.clients.iter().find(|c| c.user.id.as_str() == *member) {
                room.add_member(client.user.clone());
            }
        }
        self.relay.add_room(room);
    }

    /// The shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// A client by user ID.
    pub fn client(&self, user_id: &str) -> Option<&SimClient> {
        self.clients.iter().find(|c| c.user.id.as_str() == user_id)
    }

    /// Queue a command for a client. Unknown users are ignored.
    pub fn command(&self, user_id: &str, command: Command) {
        if let Some(client) = self.client(user_id) {
            client.driver.command(command);
        }
    }

    /// Connect every client and deliver its initial state.
    ///
    /// # Errors
    ///
    /// Returns a description of the first failure.
    pub async fn start(&mut self) -> Result<(), String> {
        for client in &mut self.clients {
            client.runtime.start().await.map_err(|e| format!("{}: {e}", client.user.id))?;
        }
        for client in &self.clients {
            for (to, text) in self.relay.connected(&client.user.id) {
                self.deliver(&to, text);
            }
        }
        self.pump().await
    }

    /// Move the clock and tick every client.
    pub fn advance(&self, duration: Duration) {
        self.env.advance(duration);
        for client in &self.clients {
            client.driver.inject(Input::Tick);
        }
    }

    /// Run until no client has input and nothing is in flight.
    ///
    /// # Errors
    ///
    /// Returns the first invariant violation or driver failure, or an error
    /// if the cluster does not settle.
    pub async fn pump(&mut self) -> Result<(), String> {
        for _ in 0..MAX_ROUNDS {
            let routed = self.route();
            let mut processed = false;

            for index in 0..self.clients.len() {
                while self.clients[index].driver.has_pending() {
                    let client = &mut self.clients[index];
                    client.runtime.step().await.map_err(|e| format!("{}: {e}", client.user.id))?;
                    processed = true;
                    self.check(&format!("after input to {}", self.clients[index].user.id))?;
                }
            }

            if !routed && !processed {
                return Ok(());
            }
        }
        Err(format!("cluster did not settle within {MAX_ROUNDS} rounds"))
    }

    /// Process one queued input of one client without routing anything.
    ///
    /// Returns `false` if the client had no input.
    ///
    /// # Errors
    ///
    /// Returns an invariant violation or driver failure.
    pub async fn step(&mut self, user_id: &str) -> Result<bool, String> {
        let Some(client) = self.clients.iter_mut().find(|c| c.user.id.as_str() == user_id) else {
            return Err(format!("no client {user_id}"));
        };
        if !client.driver.has_pending() {
            return Ok(false);
        }
        client.runtime.step().await.map_err(|e| format!("{user_id}: {e}"))?;
        self.check(&format!("after step of {user_id}"))?;
        Ok(true)
    }

    /// Snapshot every client.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot { clients: self.clients.iter().map(SimClient::snapshot).collect() }
    }

    /// Check invariants now.
    ///
    /// # Errors
    ///
    /// Returns all violations joined into one message.
    pub fn check(&self, context: &str) -> Result<(), String> {
        self.invariants.check_all(&self.snapshot()).map_err(|violations| {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            format!("invariant violation {context}:\n  {}", messages.join("\n  "))
        })
    }

    /// Hand relay output to its recipient; unknown recipients are offline.
    fn deliver(&self, to: &UserId, text: String) {
        if let Some(client) = self.clients.iter().find(|c| &c.user.id == to)
            && client.driver.is_connected()
        {
            client.driver.receive(text);
        }
    }

    fn route(&mut self) -> bool {
        let mut routed = false;
        for index in 0..self.clients.len() {
            let from = self.clients[index].user.id.clone();
            for text in self.clients[index].driver.take_sent() {
                routed = true;
                for (to, delivery) in self.relay.handle(&from, &text) {
                    self.deliver(&to, delivery);
                }
            }
        }
        routed
    }

    /// Timeline of a client as message contents.
    pub fn timeline(&self, user_id: &str) -> Vec<String> {
        self.client(user_id)
            .map(|client| {
                let timeline = client.runtime.session().chat().timeline();
                timeline.iter().map(|m| m.content.clone()).collect()
            })
            .unwrap_or_default()
    }

    /// Active room of a client.
    pub fn active_room(&self, user_id: &str) -> Option<RoomId> {
        self.client(user_id)?.runtime.session().chat().active_room().cloned()
    }
}
