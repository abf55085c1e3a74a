//! Chat synchronization engine.
//!
//! Reconciles the service's event stream into an in-memory view: the room
//! list, the active room's timeline with its pagination cursor, remote typing
//! indicators and the online-user list. The server echo is the only source of
//! truth; sending a message never touches the timeline.
//!
//! History responses are attributed to requests in FIFO order (the channel
//! delivers in order) unless the response names its room. A response for a
//! room that is no longer active is discarded.

use std::{
    collections::{BTreeMap, HashSet, VecDeque},
    ops::Sub,
    time::Duration,
};

use huddle_proto::{
    FileAttachment, InboundEvent, LastMessage, Message, MessagePage, OutboundEvent, Room, RoomId,
    SendMessage, StopTypingNotice, TypingNotice, User, UserId,
};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::{error::ClientError, typing::TypingDebouncer};

/// Messages per history page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// How long a remote typing indicator stays visible without a refresh.
pub const DEFAULT_TYPING_EXPIRY: Duration = Duration::from_secs(3);

/// Chat configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatConfig {
    /// Messages per history page
    pub page_size: u32,
    /// Lifetime of a remote typing indicator
    #[serde(with = "huddle_core::duration_ms")]
    pub typing_expiry: Duration,
    /// Local quiet period before `user:stop-typing` is emitted
    #[serde(with = "huddle_core::duration_ms")]
    pub typing_idle: Duration,
    /// Minimum spacing of repeated `user:typing` while the user keeps typing
    #[serde(with = "huddle_core::duration_ms")]
    pub typing_refresh: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            typing_expiry: DEFAULT_TYPING_EXPIRY,
            typing_idle: crate::typing::DEFAULT_TYPING_IDLE,
            typing_refresh: crate::typing::DEFAULT_TYPING_REFRESH,
        }
    }
}

/// Pagination cursor of the active timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Page currently shown (1-based)
    pub page: u32,
    /// Pages available
    pub total_pages: u32,
    /// Messages in the room
    pub total: u64,
}

/// A remote user typing in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingIndicator<I> {
    /// Display name
    pub username: String,
    /// User ID, when the service sent it
    pub user_id: Option<UserId>,
    /// When the indicator was last refreshed
    pub refreshed_at: I,
}

/// What part of the view changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatChange {
    /// Room list or a room's summary
    Rooms,
    /// Active timeline or its pagination
    Timeline {
        /// Room whose timeline changed
        room_id: RoomId,
    },
    /// Typing indicator of a room
    Typing {
        /// Room whose indicator changed
        room_id: RoomId,
    },
    /// Online-user list
    OnlineUsers,
}

/// Actions produced by the chat engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    /// Send an event to the service
    Emit(OutboundEvent),
    /// View changed; re-render
    Changed(ChatChange),
}

/// Chat synchronization engine.
///
/// Generic over `I` (Instant type) for typing expiry; time is passed in.
#[derive(Debug, Clone)]
pub struct ChatSync<I> {
    config: ChatConfig,
    rooms: Vec<Room>,
    active_room: Option<RoomId>,
    timeline: Vec<Message>,
    pagination: Option<Pagination>,
    /// Rooms of outstanding `messages:get` requests, oldest first
    pending_pages: VecDeque<RoomId>,
    typing: BTreeMap<RoomId, TypingIndicator<I>>,
    online_users: Vec<User>,
    loading: bool,
    debouncer: TypingDebouncer<I>,
}

impl<I> ChatSync<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create an empty engine. `is_loading` is true until the room list
    /// arrives.
    pub fn new(config: ChatConfig) -> Self {
        let debouncer =
            TypingDebouncer::new(config.typing_idle).with_refresh(config.typing_refresh);
        Self {
            config,
            rooms: Vec::new(),
            active_room: None,
            timeline: Vec::new(),
            pagination: None,
            pending_pages: VecDeque::new(),
            typing: BTreeMap::new(),
            online_users: Vec::new(),
            loading: true,
            debouncer,
        }
    }

    /// Rooms in the order the service listed them.
    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// Room by ID.
    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.iter().find(|room| &room.id == room_id)
    }

    /// Currently selected room.
    pub fn active_room(&self) -> Option<&RoomId> {
        self.active_room.as_ref()
    }

    /// Active room's messages, ascending by creation time.
    pub fn timeline(&self) -> &[Message] {
        &self.timeline
    }

    /// Pagination of the active timeline, once a page arrived.
    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    /// Who is typing in a room.
    pub fn typing(&self, room_id: &RoomId) -> Option<&TypingIndicator<I>> {
        self.typing.get(room_id)
    }

    /// Users currently online.
    pub fn online_users(&self) -> &[User] {
        &self.online_users
    }

    /// True until the first room list arrives.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Number of `messages:get` requests without a response.
    pub fn pending_requests(&self) -> usize {
        self.pending_pages.len()
    }

    /// Whether a local typing timer runs for a room.
    pub fn is_typing_locally(&self, room_id: &RoomId) -> bool {
        self.debouncer.is_typing(room_id)
    }

    /// Make `room_id` the active room and request its first page.
    ///
    /// The timeline is empty until the page arrives. Typing indicators of the
    /// previous room are dropped.
    pub fn select_room(&mut self, room_id: RoomId) -> Vec<ChatAction> {
        debug!(%room_id, "selecting room");
        self.active_room = Some(room_id.clone());
        self.timeline.clear();
        self.pagination = None;
        self.typing.clear();

        let changed = ChatAction::Changed(ChatChange::Timeline { room_id: room_id.clone() });
        vec![changed, self.request_page(room_id, 1)]
    }

    /// Request an arbitrary history page of the active room. The response
    /// replaces the timeline.
    ///
    /// # Errors
    ///
    /// - `ClientError::NoActiveRoom` if no room is selected
    /// - `ClientError::InvalidPage` if `page` is 0
    pub fn load_page(&mut self, page: u32) -> Result<Vec<ChatAction>, ClientError> {
        if page == 0 {
            return Err(ClientError::InvalidPage { page });
        }
        let room_id = self.active_room.clone().ok_or(ClientError::NoActiveRoom)?;

        Ok(vec![self.request_page(room_id, page)])
    }

    /// Forget a `messages:get` for `room_id` that never reached the service.
    pub fn request_dropped(&mut self, room_id: &RoomId) {
        if let Some(at) = self.pending_pages.iter().rposition(|pending| pending == room_id) {
            self.pending_pages.remove(at);
        }
    }

    /// Forget every outstanding `messages:get`; their responses will not
    /// arrive on a new channel.
    pub fn abandon_requests(&mut self) {
        if !self.pending_pages.is_empty() {
            debug!(pending = self.pending_pages.len(), "abandoning history requests");
            self.pending_pages.clear();
        }
    }

    fn request_page(&mut self, room_id: RoomId, page: u32) -> ChatAction {
        self.pending_pages.push_back(room_id.clone());
        ChatAction::Emit(OutboundEvent::GetMessages { room_id, page, limit: self.config.page_size })
    }

    /// Post a text message. The timeline changes only when the service
    /// echoes it back as `message:new`.
    pub fn send_message(&mut self, room_id: RoomId, content: impl Into<String>) -> Vec<ChatAction> {
        let stop = self.debouncer.message_sent(&room_id);
        let mut actions =
            vec![ChatAction::Emit(OutboundEvent::SendMessage(SendMessage::text(room_id, content)))];
        actions.extend(stop.map(ChatAction::Emit));
        actions
    }

    /// Post a message announcing an uploaded file.
    pub fn send_attachment(&mut self, room_id: RoomId, file: FileAttachment) -> Vec<ChatAction> {
        let stop = self.debouncer.message_sent(&room_id);
        let mut actions = vec![ChatAction::Emit(OutboundEvent::SendMessage(
            SendMessage::attachment(room_id, file),
        ))];
        actions.extend(stop.map(ChatAction::Emit));
        actions
    }

    /// Local keystroke in a room; throttled to one `user:typing` per refresh
    /// interval.
    pub fn emit_typing(&mut self, room_id: &RoomId, now: I) -> Vec<ChatAction> {
        self.debouncer.keystroke(room_id, now).map(ChatAction::Emit).into_iter().collect()
    }

    /// Explicit stop (input cleared or left). Always emits.
    pub fn emit_stop_typing(&mut self, room_id: RoomId) -> Vec<ChatAction> {
        self.debouncer.cancel(&room_id);
        vec![ChatAction::Emit(OutboundEvent::StopTyping { room_id })]
    }

    /// Ask the service for a private room with `user_id`. The room appears
    /// through `room:created`.
    pub fn create_private_room(&mut self, user_id: UserId) -> Vec<ChatAction> {
        vec![ChatAction::Emit(OutboundEvent::CreateRoom { user_id })]
    }

    /// Expire remote typing indicators and local typing timers.
    pub fn tick(&mut self, now: I) -> Vec<ChatAction> {
        let expiry = self.config.typing_expiry;
        let mut actions = Vec::new();

        self.typing.retain(|room_id, indicator| {
            let since = indicator.refreshed_at;
            let age = if now > since { now - since } else { Duration::ZERO };
            if age >= expiry {
                actions.push(ChatAction::Changed(ChatChange::Typing { room_id: room_id.clone() }));
                false
            } else {
                true
            }
        });

        actions.extend(self.debouncer.tick(now).into_iter().map(ChatAction::Emit));
        actions
    }

    /// Stop every local typing timer (session shutdown).
    pub fn stop_all_typing(&mut self) -> Vec<ChatAction> {
        self.debouncer.drain().into_iter().map(ChatAction::Emit).collect()
    }

    /// Apply an inbound chat event. Call signaling events are ignored.
    pub fn handle_event(&mut self, event: InboundEvent, now: I) -> Vec<ChatAction> {
        match event {
            InboundEvent::RoomsList(rooms) => self.rooms_list(rooms),
            InboundEvent::RoomCreated(room) => self.room_created(room),
            InboundEvent::RoomUpdated(room) => self.room_updated(room),
            InboundEvent::MessageNew(message) => self.message_new(message),
            InboundEvent::MessagesList(page) => self.messages_list(page),
            InboundEvent::UserTyping(notice) => self.user_typing(notice, now),
            InboundEvent::UserStopTyping(notice) => self.user_stop_typing(&notice),
            InboundEvent::UsersOnline(users) => {
                self.online_users = users;
                vec![ChatAction::Changed(ChatChange::OnlineUsers)]
            },
            other => {
                trace!(event = other.name(), "not a chat event");
                Vec::new()
            },
        }
    }

    fn rooms_list(&mut self, rooms: Vec<Room>) -> Vec<ChatAction> {
        let mut seen = HashSet::new();
        self.rooms = rooms.into_iter().filter(|room| seen.insert(room.id.clone())).collect();
        self.loading = false;

        vec![ChatAction::Changed(ChatChange::Rooms)]
    }

    fn room_created(&mut self, room: Room) -> Vec<ChatAction> {
        if self.room(&room.id).is_some() {
            debug!(room_id = %room.id, "room:created for known room");
            return Vec::new();
        }

        self.rooms.push(room);
        vec![ChatAction::Changed(ChatChange::Rooms)]
    }

    fn room_updated(&mut self, room: Room) -> Vec<ChatAction> {
        let Some(slot) = self.rooms.iter_mut().find(|r| r.id == room.id) else {
            debug!(room_id = %room.id, "room:updated for unknown room");
            return Vec::new();
        };

        *slot = room;
        vec![ChatAction::Changed(ChatChange::Rooms)]
    }

    fn message_new(&mut self, message: Message) -> Vec<ChatAction> {
        let mut actions = Vec::new();

        if let Some(room) = self.rooms.iter_mut().find(|r| r.id == message.room_id) {
            room.last_message = Some(LastMessage::of(&message));
            actions.push(ChatAction::Changed(ChatChange::Rooms));
        }

        if self.active_room.as_ref() != Some(&message.room_id) {
            return actions;
        }
        if self.timeline.iter().any(|m| m.id == message.id) {
            debug!(message_id = %message.id, "duplicate message:new");
            return actions;
        }

        let room_id = message.room_id.clone();
        let at = self.timeline.partition_point(|m| m.created_at <= message.created_at);
        self.timeline.insert(at, message);
        actions.push(ChatAction::Changed(ChatChange::Timeline { room_id }));
        actions
    }

    fn messages_list(&mut self, page: MessagePage) -> Vec<ChatAction> {
        let requested = self.pending_pages.pop_front();
        let Some(room_id) = page.room_id.or(requested) else {
            debug!(page = page.page, "messages:list without outstanding request");
            return Vec::new();
        };
        if self.active_room.as_ref() != Some(&room_id) {
            debug!(%room_id, page = page.page, "messages:list for inactive room, discarding");
            return Vec::new();
        }

        let mut seen = HashSet::new();
        let mut messages: Vec<Message> = page
            .messages
            .into_iter()
            .filter(|m| m.room_id == room_id && seen.insert(m.id.clone()))
            .collect();
        messages.sort_by_key(|m| m.created_at);

        self.timeline = messages;
        self.pagination =
            Some(Pagination { page: page.page, total_pages: page.total_pages, total: page.total });

        vec![ChatAction::Changed(ChatChange::Timeline { room_id })]
    }

    fn user_typing(&mut self, notice: TypingNotice, now: I) -> Vec<ChatAction> {
        if self.active_room.as_ref() != Some(&notice.room_id) {
            return Vec::new();
        }

        let room_id = notice.room_id;
        self.typing.insert(room_id.clone(), TypingIndicator {
            username: notice.username,
            user_id: notice.user_id,
            refreshed_at: now,
        });
        vec![ChatAction::Changed(ChatChange::Typing { room_id })]
    }

    fn user_stop_typing(&mut self, notice: &StopTypingNotice) -> Vec<ChatAction> {
        match self.typing.remove(&notice.room_id) {
            Some(_) => {
                vec![ChatAction::Changed(ChatChange::Typing { room_id: notice.room_id.clone() })]
            },
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use huddle_proto::{MessageKind, RoomKind};

    use super::*;

    type Chat = ChatSync<Duration>;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    fn message(id: &str, room: &str, secs: i64) -> Message {
        Message {
            id: id.into(),
            room_id: room.into(),
            sender: User::new("u1", "ana"),
            content: format!("msg {id}"),
            kind: MessageKind::Text,
            file: None,
            created_at: at(secs),
        }
    }

    fn page(messages: Vec<Message>, page: u32) -> InboundEvent {
        InboundEvent::MessagesList(MessagePage {
            total: messages.len() as u64,
            messages,
            page,
            total_pages: 3,
            room_id: None,
        })
    }

    fn ids(chat: &Chat) -> Vec<&str> {
        chat.timeline().iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn select_room_requests_first_page() {
        let mut chat = Chat::new(ChatConfig::default());
        let actions = chat.select_room("r1".into());

        assert!(actions.contains(&ChatAction::Emit(OutboundEvent::GetMessages {
            room_id: "r1".into(),
            page: 1,
            limit: 20,
        })));
        assert_eq!(chat.active_room(), Some(&RoomId::new("r1")));
        assert_eq!(chat.pending_requests(), 1);
    }

    #[test]
    fn page_replaces_timeline_sorted() {
        let mut chat = Chat::new(ChatConfig::default());
        chat.select_room("r1".into());

        chat.handle_event(
            page(vec![message("c", "r1", 30), message("a", "r1", 10), message("b", "r1", 20)], 1),
            Duration::ZERO,
        );

        assert_eq!(ids(&chat), ["a", "b", "c"]);
        assert_eq!(chat.pagination(), Some(Pagination { page: 1, total_pages: 3, total: 3 }));
        assert_eq!(chat.pending_requests(), 0);
    }

    #[test]
    fn late_page_for_previous_room_is_discarded() {
        let mut chat = Chat::new(ChatConfig::default());
        chat.select_room("r2".into());
        chat.select_room("r1".into());

        // response to the r2 request arrives after switching
        let actions = chat.handle_event(page(vec![message("x", "r2", 1)], 1), Duration::ZERO);
        assert!(actions.is_empty());
        assert!(chat.timeline().is_empty());

        chat.handle_event(page(vec![message("y", "r1", 1)], 1), Duration::ZERO);
        assert_eq!(ids(&chat), ["y"]);
    }

    #[test]
    fn explicit_room_id_wins() {
        let mut chat = Chat::new(ChatConfig::default());
        chat.select_room("r1".into());

        let event = InboundEvent::MessagesList(MessagePage {
            messages: vec![message("x", "r9", 1)],
            total: 1,
            page: 1,
            total_pages: 1,
            room_id: Some("r9".into()),
        });
        assert!(chat.handle_event(event, Duration::ZERO).is_empty());
        assert!(chat.timeline().is_empty());
    }

    #[test]
    fn message_new_inserts_stably() {
        let mut chat = Chat::new(ChatConfig::default());
        chat.select_room("r1".into());
        let first = page(vec![message("a", "r1", 10), message("c", "r1", 30)], 1);
        chat.handle_event(first, Duration::ZERO);

        chat.handle_event(InboundEvent::MessageNew(message("b", "r1", 20)), Duration::ZERO);
        chat.handle_event(InboundEvent::MessageNew(message("b2", "r1", 20)), Duration::ZERO);
        chat.handle_event(InboundEvent::MessageNew(message("d", "r1", 40)), Duration::ZERO);

        assert_eq!(ids(&chat), ["a", "b", "b2", "c", "d"]);
    }

    #[test]
    fn duplicate_message_new_is_ignored() {
        let mut chat = Chat::new(ChatConfig::default());
        chat.select_room("r1".into());
        chat.handle_event(InboundEvent::MessageNew(message("a", "r1", 1)), Duration::ZERO);
        chat.handle_event(InboundEvent::MessageNew(message("a", "r1", 1)), Duration::ZERO);
        assert_eq!(chat.timeline().len(), 1);
    }

    #[test]
    fn message_for_other_room_updates_summary_only() {
        let mut chat = Chat::new(ChatConfig::default());
        chat.handle_event(
            InboundEvent::RoomsList(vec![
                Room::new("r1", RoomKind::Group, "one"),
                Room::new("r2", RoomKind::Private, "two"),
            ]),
            Duration::ZERO,
        );
        chat.select_room("r1".into());

        let actions =
            chat.handle_event(InboundEvent::MessageNew(message("z", "r2", 5)), Duration::ZERO);

        assert_eq!(actions, vec![ChatAction::Changed(ChatChange::Rooms)]);
        assert!(chat.timeline().is_empty());
        let last = chat.room(&"r2".into()).unwrap().last_message.as_ref().unwrap();
        assert_eq!(last.content, "msg z");
        assert!(chat.room(&"r1".into()).unwrap().last_message.is_none());
    }

    #[test]
    fn send_message_does_not_touch_timeline() {
        let mut chat = Chat::new(ChatConfig::default());
        chat.select_room("r1".into());

        let actions = chat.send_message("r1".into(), "hi");
        assert_eq!(actions, vec![ChatAction::Emit(OutboundEvent::SendMessage(SendMessage::text(
            "r1".into(),
            "hi"
        )))]);
        assert!(chat.timeline().is_empty());
    }

    #[test]
    fn send_stops_local_typing() {
        let mut chat = Chat::new(ChatConfig::default());
        let room = RoomId::new("r1");
        assert_eq!(chat.emit_typing(&room, Duration::ZERO).len(), 1);
        assert!(chat.emit_typing(&room, Duration::from_millis(100)).is_empty());

        let actions = chat.send_message(room.clone(), "hi");
        assert_eq!(actions.last(), Some(&ChatAction::Emit(OutboundEvent::StopTyping {
            room_id: room.clone()
        })));
        assert!(!chat.is_typing_locally(&room));
    }

    #[test]
    fn room_lifecycle_events() {
        let mut chat = Chat::new(ChatConfig::default());
        assert!(chat.is_loading());

        chat.handle_event(
            InboundEvent::RoomsList(vec![Room::new("r1", RoomKind::Group, "one")]),
            Duration::ZERO,
        );
        assert!(!chat.is_loading());

        // unknown update is a no-op
        let unknown = InboundEvent::RoomUpdated(Room::new("r5", RoomKind::Group, "x"));
        assert!(chat.handle_event(unknown, Duration::ZERO).is_empty());

        let created = InboundEvent::RoomCreated(Room::new("r2", RoomKind::Private, "dm"));
        chat.handle_event(created.clone(), Duration::ZERO);
        assert!(chat.handle_event(created, Duration::ZERO).is_empty());
        assert_eq!(chat.rooms().len(), 2);

        let renamed = InboundEvent::RoomUpdated(Room::new("r1", RoomKind::Group, "renamed"));
        chat.handle_event(renamed, Duration::ZERO);
        assert_eq!(chat.room(&"r1".into()).unwrap().name, "renamed");
    }

    #[test]
    fn remote_typing_expires() {
        let mut chat = Chat::new(ChatConfig::default());
        chat.select_room("r1".into());
        let typing = |room: &str| {
            InboundEvent::UserTyping(TypingNotice {
                room_id: room.into(),
                user_id: Some("u2".into()),
                username: "bo".into(),
            })
        };

        chat.handle_event(typing("r1"), Duration::from_secs(0));
        chat.handle_event(typing("r1"), Duration::from_secs(2));
        assert!(chat.tick(Duration::from_secs(4)).is_empty());
        assert_eq!(chat.typing(&"r1".into()).unwrap().username, "bo");

        let actions = chat.tick(Duration::from_secs(5));
        assert_eq!(actions, vec![ChatAction::Changed(ChatChange::Typing { room_id: "r1".into() })]);
        assert!(chat.typing(&"r1".into()).is_none());

        // not the active room
        assert!(chat.handle_event(typing("r2"), Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn stop_typing_removes_indicator() {
        let mut chat = Chat::new(ChatConfig::default());
        chat.select_room("r1".into());
        chat.handle_event(
            InboundEvent::UserTyping(TypingNotice {
                room_id: "r1".into(),
                user_id: None,
                username: "bo".into(),
            }),
            Duration::ZERO,
        );

        let stop =
            InboundEvent::UserStopTyping(StopTypingNotice { room_id: "r1".into(), user_id: None });
        assert_eq!(chat.handle_event(stop.clone(), Duration::ZERO).len(), 1);
        assert!(chat.handle_event(stop, Duration::ZERO).is_empty());
    }

    #[test]
    fn switching_rooms_drops_indicators() {
        let mut chat = Chat::new(ChatConfig::default());
        chat.select_room("r1".into());
        let notice = TypingNotice { room_id: "r1".into(), user_id: None, username: "bo".into() };
        chat.handle_event(InboundEvent::UserTyping(notice), Duration::ZERO);

        chat.select_room("r2".into());
        chat.select_room("r1".into());

        assert!(chat.typing(&"r1".into()).is_none());
    }

    #[test]
    fn load_page_requires_active_room() {
        let mut chat = Chat::new(ChatConfig::default());
        assert_eq!(chat.load_page(2).unwrap_err(), ClientError::NoActiveRoom);

        chat.select_room("r1".into());
        assert_eq!(chat.load_page(0).unwrap_err(), ClientError::InvalidPage { page: 0 });
        let actions = chat.load_page(2).unwrap();
        assert_eq!(actions, vec![ChatAction::Emit(OutboundEvent::GetMessages {
            room_id: "r1".into(),
            page: 2,
            limit: 20,
        })]);
    }

    #[test]
    fn online_users_replaced() {
        let mut chat = Chat::new(ChatConfig::default());
        chat.handle_event(InboundEvent::UsersOnline(vec![User::new("u1", "ana")]), Duration::ZERO);
        chat.handle_event(InboundEvent::UsersOnline(vec![User::new("u2", "bo")]), Duration::ZERO);
        assert_eq!(chat.online_users(), [User::new("u2", "bo")]);
    }
}
