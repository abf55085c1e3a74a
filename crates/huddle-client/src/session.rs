//! Session: channel lifecycle, call machine and chat engine behind one facade.
//!
//! The session routes inbound events (call signaling to the [`CallMachine`],
//! everything else to the [`ChatSync`]) and gates every outbound event on the
//! channel. While the channel is not connected, emission is a silent no-op:
//! the event is dropped and never retried.

use huddle_core::{Channel, ChannelAction, ChannelConfig, ChannelState, Environment};
use huddle_proto::{FileAttachment, InboundEvent, OutboundEvent, RoomId, UserId, decode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    call::{CallAction, CallConfig, CallInput, CallMachine, CallNotice},
    chat::{ChatAction, ChatChange, ChatConfig, ChatSync},
    error::ClientError,
};

/// Aggregated configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Channel lifecycle
    pub channel: ChannelConfig,
    /// Call signaling
    pub call: CallConfig,
    /// Chat sync and typing
    pub chat: ChatConfig,
}

/// User-facing notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Call state changed
    Call(CallNotice),
    /// Chat view changed
    Chat(ChatChange),
    /// Channel connected or disconnected
    Channel(ChannelState),
}

/// Actions produced by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Send an event over the channel (only produced while connected)
    Send(OutboundEvent),
    /// Media or peer connection work for the media backend
    Call(CallAction),
    /// Transport lifecycle work
    Channel(ChannelAction),
    /// Surface something to the user
    Notify(Notice),
}

/// Client session.
pub struct Session<E: Environment> {
    env: E,
    channel: Channel<E::Instant>,
    call: CallMachine<E>,
    chat: ChatSync<E::Instant>,
}

impl<E: Environment> Session<E> {
    /// Create a disconnected session.
    pub fn new(env: E, config: SessionConfig) -> Self {
        Self {
            channel: Channel::new(config.channel),
            call: CallMachine::new(env.clone(), config.call),
            chat: ChatSync::new(config.chat),
            env,
        }
    }

    /// Call state machine (read-only).
    pub fn call(&self) -> &CallMachine<E> {
        &self.call
    }

    /// Chat view (read-only).
    pub fn chat(&self) -> &ChatSync<E::Instant> {
        &self.chat
    }

    /// Channel state.
    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    /// Start connecting the channel.
    ///
    /// # Errors
    ///
    /// - `ClientError::Channel` if the channel is not disconnected
    pub fn connect(&mut self) -> Result<Vec<SessionAction>, ClientError> {
        let actions = self.channel.connect(self.env.now())?;
        Ok(actions.into_iter().map(SessionAction::Channel).collect())
    }

    /// Transport reports the channel open.
    ///
    /// # Errors
    ///
    /// - `ClientError::Channel` if already connected or closed
    pub fn channel_opened(&mut self) -> Result<Vec<SessionAction>, ClientError> {
        self.channel.opened()?;
        info!("channel connected");
        Ok(vec![SessionAction::Notify(Notice::Channel(ChannelState::Connected))])
    }

    /// Transport reports the channel lost. Nothing is retried.
    pub fn channel_lost(&mut self) -> Vec<SessionAction> {
        if self.channel.state() == ChannelState::Closed {
            return Vec::new();
        }
        self.channel.lost();
        self.chat.abandon_requests();
        warn!("channel lost");
        vec![SessionAction::Notify(Notice::Channel(ChannelState::Disconnected))]
    }

    /// Decode and apply an inbound event. Malformed or unknown events are
    /// logged and skipped.
    pub fn handle_inbound_text(&mut self, text: &str) -> Vec<SessionAction> {
        match decode::<InboundEvent>(text) {
            Ok(event) => self.handle_inbound(event),
            Err(error) => {
                warn!(%error, "skipping undecodable event");
                Vec::new()
            },
        }
    }

    /// Apply an inbound event, in delivery order.
    pub fn handle_inbound(&mut self, event: InboundEvent) -> Vec<SessionAction> {
        debug!(event = event.name(), "inbound");

        if event.is_call_signal() {
            match self.call.handle(CallInput::Signal(event)) {
                Ok(actions) => self.from_call(actions),
                Err(error) => {
                    warn!(%error, "call signal rejected");
                    Vec::new()
                },
            }
        } else {
            let now = self.env.now();
            let actions = self.chat.handle_event(event, now);
            self.from_chat(actions)
        }
    }

    /// Feed a call input (local intent or a completion from the media
    /// backend).
    ///
    /// Placing or accepting a call needs the channel; while disconnected both
    /// are no-ops.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidState` if accepting or rejecting while no call
    ///   is ringing
    pub fn handle_call(&mut self, input: CallInput) -> Result<Vec<SessionAction>, ClientError> {
        if matches!(input, CallInput::Initiate { .. } | CallInput::Accept)
            && !self.channel.is_connected()
        {
            debug!(state = ?self.channel.state(), ?input, "channel unavailable, ignoring call");
            return Ok(Vec::new());
        }

        let actions = self.call.handle(input)?;
        Ok(self.from_call(actions))
    }

    /// Select a room and request its first page.
    pub fn select_room(&mut self, room_id: RoomId) -> Vec<SessionAction> {
        let actions = self.chat.select_room(room_id);
        self.from_chat(actions)
    }

    /// Request a history page of the active room.
    ///
    /// # Errors
    ///
    /// - `ClientError::NoActiveRoom` if no room is selected
    /// - `ClientError::InvalidPage` if `page` is 0
    pub fn load_page(&mut self, page: u32) -> Result<Vec<SessionAction>, ClientError> {
        let actions = self.chat.load_page(page)?;
        Ok(self.from_chat(actions))
    }

    /// Post a text message.
    pub fn send_message(&mut self, room_id: RoomId, content: String) -> Vec<SessionAction> {
        let actions = self.chat.send_message(room_id, content);
        self.from_chat(actions)
    }

    /// Post a message for an uploaded file.
    pub fn send_attachment(&mut self, room_id: RoomId, file: FileAttachment) -> Vec<SessionAction> {
        let actions = self.chat.send_attachment(room_id, file);
        self.from_chat(actions)
    }

    /// Local keystroke in a room.
    pub fn keystroke(&mut self, room_id: &RoomId) -> Vec<SessionAction> {
        let now = self.env.now();
        let actions = self.chat.emit_typing(room_id, now);
        self.from_chat(actions)
    }

    /// Local user stopped typing.
    pub fn stop_typing(&mut self, room_id: RoomId) -> Vec<SessionAction> {
        let actions = self.chat.emit_stop_typing(room_id);
        self.from_chat(actions)
    }

    /// Open a private room with another user.
    pub fn create_private_room(&mut self, user_id: UserId) -> Vec<SessionAction> {
        let actions = self.chat.create_private_room(user_id);
        self.from_chat(actions)
    }

    /// Periodic maintenance: connect timeout, typing expiry.
    pub fn tick(&mut self) -> Vec<SessionAction> {
        let now = self.env.now();
        let mut actions = Vec::new();

        let channel_actions = self.channel.tick(now);
        if !channel_actions.is_empty() {
            warn!(state = ?self.channel.state(), "channel connect timed out");
            actions.extend(channel_actions.into_iter().map(SessionAction::Channel));
            actions.push(SessionAction::Notify(Notice::Channel(self.channel.state())));
        }

        let chat_actions = self.chat.tick(now);
        actions.extend(self.from_chat(chat_actions));
        actions
    }

    /// Tear everything down: hang up, stop typing, close the channel.
    pub fn shutdown(&mut self) -> Vec<SessionAction> {
        info!("session shutdown");
        let mut actions = Vec::new();

        match self.call.handle(CallInput::End) {
            Ok(call_actions) => actions.extend(self.from_call(call_actions)),
            Err(error) => warn!(%error, "hang-up on shutdown failed"),
        }

        let typing = self.chat.stop_all_typing();
        actions.extend(self.from_chat(typing));

        actions.extend(self.channel.close("shutdown").into_iter().map(SessionAction::Channel));
        actions
    }

    fn emit(&self, event: OutboundEvent) -> Option<SessionAction> {
        match self.channel.ensure_writable() {
            Ok(()) => Some(SessionAction::Send(event)),
            Err(error) => {
                debug!(event = event.name(), %error, "dropping outbound event");
                None
            },
        }
    }

    fn from_call(&self, actions: Vec<CallAction>) -> Vec<SessionAction> {
        actions
            .into_iter()
            .filter_map(|action| match action {
                CallAction::Emit(event) => self.emit(event),
                CallAction::Notify(notice) => Some(SessionAction::Notify(Notice::Call(notice))),
                other => Some(SessionAction::Call(other)),
            })
            .collect()
    }

    fn from_chat(&mut self, actions: Vec<ChatAction>) -> Vec<SessionAction> {
        let mut out = Vec::with_capacity(actions.len());
        for action in actions {
            match action {
                ChatAction::Emit(event) => {
                    let request = match &event {
                        OutboundEvent::GetMessages { room_id, .. } => Some(room_id.clone()),
                        _ => None,
                    };
                    match (self.emit(event), request) {
                        (Some(send), _) => out.push(send),
                        (None, Some(room_id)) => self.chat.request_dropped(&room_id),
                        (None, None) => {},
                    }
                },
                ChatAction::Changed(change) => {
                    out.push(SessionAction::Notify(Notice::Chat(change)));
                },
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use huddle_core::MediaHandle;
    use huddle_proto::{CallIncoming, CallerRef, Message, MessageKind, MessagePage, User};

    use super::*;
    use crate::call::CallState;

    #[derive(Clone)]
    struct TestEnv;

    impl Environment for TestEnv {
        type Instant = Duration;

        fn now(&self) -> Duration {
            Duration::ZERO
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(7);
        }
    }

    fn connected() -> Session<TestEnv> {
        let mut session = Session::new(TestEnv, SessionConfig::default());
        session.connect().unwrap();
        session.channel_opened().unwrap();
        session
    }

    fn sends(actions: &[SessionAction]) -> Vec<&OutboundEvent> {
        actions
            .iter()
            .filter_map(|a| match a {
                SessionAction::Send(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn emission_dropped_while_disconnected() {
        let mut session = Session::new(TestEnv, SessionConfig::default());

        let actions = session.send_message("r1".into(), "hi".into());
        assert!(sends(&actions).is_empty());

        session.connect().unwrap();
        session.channel_opened().unwrap();
        let actions = session.send_message("r1".into(), "hi".into());
        assert_eq!(sends(&actions).len(), 1);

        session.channel_lost();
        let actions = session.select_room("r1".into());
        assert!(sends(&actions).is_empty());
    }

    fn page_for(room: &str) -> InboundEvent {
        let message = Message {
            id: "m1".into(),
            room_id: room.into(),
            sender: User::new("u2", "bo"),
            content: "hello".into(),
            kind: MessageKind::Text,
            file: None,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        };
        // the service does not echo the room of the request
        InboundEvent::MessagesList(MessagePage {
            messages: vec![message],
            total: 1,
            page: 1,
            total_pages: 1,
            room_id: None,
        })
    }

    #[test]
    fn dropped_history_request_is_not_awaited() {
        let mut session = Session::new(TestEnv, SessionConfig::default());
        session.select_room("r1".into());
        assert_eq!(session.chat().pending_requests(), 0);

        session.connect().unwrap();
        session.channel_opened().unwrap();
        let actions = session.select_room("r2".into());
        assert_eq!(sends(&actions).len(), 1);

        session.handle_inbound(page_for("r2"));
        assert_eq!(session.chat().timeline().len(), 1);
        assert_eq!(session.chat().pending_requests(), 0);
    }

    #[test]
    fn lost_channel_abandons_history_requests() {
        let mut session = connected();
        session.select_room("r1".into());
        assert_eq!(session.chat().pending_requests(), 1);

        session.channel_lost();
        assert_eq!(session.chat().pending_requests(), 0);

        session.connect().unwrap();
        session.channel_opened().unwrap();
        session.select_room("r2".into());
        session.handle_inbound(page_for("r2"));
        assert_eq!(session.chat().timeline().len(), 1);
    }

    #[test]
    fn initiate_is_noop_while_disconnected() {
        let mut session = Session::new(TestEnv, SessionConfig::default());
        let actions = session.handle_call(CallInput::Initiate { room_id: "r1".into() }).unwrap();
        assert!(actions.is_empty());
        assert!(!session.call().in_transition());
    }

    #[test]
    fn routes_call_signals_to_call_machine() {
        let mut session = connected();
        let actions = session.handle_inbound(InboundEvent::CallIncoming(CallIncoming {
            call_id: "c1".into(),
            caller: CallerRef { id: "u2".into() },
            room_id: None,
        }));

        assert!(matches!(
            &actions[..],
            [SessionAction::Notify(Notice::Call(CallNotice::Incoming { .. }))]
        ));
        assert_eq!(session.call().state(), CallState::IncomingRinging);
    }

    #[test]
    fn undecodable_text_is_skipped() {
        let mut session = connected();
        assert!(session.handle_inbound_text("{\"event\":\"nope\"}").is_empty());
        assert!(session.handle_inbound_text("garbage").is_empty());

        let actions = session.handle_inbound_text(r#"{"event":"users:online","data":[]}"#);
        assert_eq!(actions, vec![SessionAction::Notify(Notice::Chat(ChatChange::OnlineUsers))]);
    }

    #[test]
    fn shutdown_hangs_up_and_closes() {
        let mut session = connected();
        let actions = session.handle_call(CallInput::Initiate { room_id: "r1".into() }).unwrap();
        let [SessionAction::Call(CallAction::AcquireMedia { attempt })] = actions[..] else {
            panic!("expected media acquisition, got {actions:?}");
        };
        session
            .handle_call(CallInput::MediaAcquired { attempt, media: MediaHandle::new(1) })
            .unwrap();
        session.keystroke(&"r1".into());

        let actions = session.shutdown();

        let release = SessionAction::Call(CallAction::ReleaseMedia(MediaHandle::new(1)));
        let stop = SessionAction::Send(OutboundEvent::StopTyping { room_id: "r1".into() });
        assert!(actions.contains(&release));
        assert!(actions.contains(&stop));
        assert!(
            actions.iter().any(|a| matches!(a, SessionAction::Send(OutboundEvent::CallEnd { .. })))
        );
        let close = actions.last();
        assert!(matches!(close, Some(SessionAction::Channel(ChannelAction::Close { .. }))));
        assert_eq!(session.channel_state(), ChannelState::Closed);
    }
}
