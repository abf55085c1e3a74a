//! Model of the coordination service.
//!
//! Routes call signaling between users, stamps and fans out chat messages,
//! pages history and relays typing. Every event goes in as the text a client
//! sent and comes out as `(recipient, text)` deliveries, so the wire format
//! is exercised on every hop.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use huddle_proto::{
    AnswerPayload, CallAccepted, CallEnded, CallId, CallIncoming, CallRejected, CallerRef,
    CandidatePayload, InboundEvent, LastMessage, Message, MessageId, MessageKind, MessagePage,
    OfferPayload, OutboundEvent, Room, RoomId, RoomKind, SendMessage, StopTypingNotice,
    TypingNotice, User, UserId, decode, encode,
};
use tracing::{debug, warn};

/// Deliveries produced by one relay step.
pub type Deliveries = Vec<(UserId, String)>;

#[derive(Debug, Clone)]
struct RelayCall {
    caller: UserId,
    callee: Option<UserId>,
    room_id: RoomId,
}

impl RelayCall {
    fn other(&self, user: &UserId) -> Option<&UserId> {
        if &self.caller == user { self.callee.as_ref() } else { Some(&self.caller) }
    }
}

/// In-memory coordination service.
#[derive(Debug)]
pub struct SimRelay {
    users: BTreeMap<UserId, User>,
    rooms: BTreeMap<RoomId, Room>,
    history: BTreeMap<RoomId, Vec<Message>>,
    calls: BTreeMap<CallId, RelayCall>,
    clock: DateTime<Utc>,
    next_id: u64,
}

impl SimRelay {
    /// Create an empty relay whose message clock starts at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            users: BTreeMap::new(),
            rooms: BTreeMap::new(),
            history: BTreeMap::new(),
            calls: BTreeMap::new(),
            clock: start,
            next_id: 0,
        }
    }

    /// Register a user.
    pub fn add_user(&mut self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    /// Register a room.
    pub fn add_room(&mut self, room: Room) {
        self.rooms.insert(room.id.clone(), room);
    }

    /// A room as the relay sees it.
    pub fn room(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Stored history of a room, oldest first.
    pub fn history(&self, room_id: &RoomId) -> &[Message] {
        self.history.get(room_id).map_or(&[], Vec::as_slice)
    }

    /// Calls currently routed.
    pub fn active_calls(&self) -> usize {
        self.calls.len()
    }

    /// Initial state pushed to a user on connect: their rooms and who is
    /// online.
    pub fn connected(&self, user_id: &UserId) -> Deliveries {
        let rooms: Vec<Room> =
            self.rooms.values().filter(|room| room.has_member(user_id)).cloned().collect();
        let online: Vec<User> = self.users.values().cloned().collect();

        let mut out = Vec::new();
        push(&mut out, user_id, &InboundEvent::RoomsList(rooms));
        push(&mut out, user_id, &InboundEvent::UsersOnline(online));
        out
    }

    /// Store a message with an explicit timestamp and fan it out.
    pub fn post(
        &mut self,
        room_id: &RoomId,
        sender: &UserId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Deliveries {
        let Some(user) = self.users.get(sender).cloned() else {
            warn!(%sender, "message from unknown user");
            return Vec::new();
        };

        let message = Message {
            id: MessageId::new(format!("m{}", self.next_id())),
            room_id: room_id.clone(),
            sender: user,
            content: content.to_string(),
            kind: MessageKind::Text,
            file: None,
            created_at,
        };
        self.store(message)
    }

    /// Handle one event sent by `from`.
    pub fn handle(&mut self, from: &UserId, text: &str) -> Deliveries {
        let event = match decode::<OutboundEvent>(text) {
            Ok(event) => event,
            Err(error) => {
                warn!(%from, %error, "relay dropping undecodable event");
                return Vec::new();
            },
        };
        debug!(%from, event = event.name(), "relay");

        let mut out = Vec::new();
        match event {
            OutboundEvent::CallRequest { room_id } => self.call_request(from, room_id, &mut out),
            OutboundEvent::CallAccept { call_id } => {
                if let Some(call) = self.calls.get_mut(&call_id) {
                    call.callee = Some(from.clone());
                    let caller = call.caller.clone();
                    let accepted = CallAccepted { call_id, target: from.clone() };
                    push(&mut out, &caller, &InboundEvent::CallAccepted(accepted));
                }
            },
            OutboundEvent::CallReject { call_id } => {
                if let Some(call) = self.calls.remove(&call_id) {
                    let rejected = CallRejected { call_id: Some(call_id) };
                    push(&mut out, &call.caller, &InboundEvent::CallRejected(rejected));
                }
            },
            OutboundEvent::CallEnd { call_id, room_id, .. } => {
                self.call_end(from, call_id, room_id.as_ref(), &mut out);
            },
            OutboundEvent::Offer(offer) => {
                if let Some(target) = offer.target.clone() {
                    let relayed = OfferPayload { target: Some(from.clone()), ..offer };
                    push(&mut out, &target, &InboundEvent::Offer(relayed));
                }
            },
            OutboundEvent::Answer(answer) => {
                if let Some(target) = answer.target.clone() {
                    let relayed = AnswerPayload { target: Some(from.clone()), ..answer };
                    push(&mut out, &target, &InboundEvent::Answer(relayed));
                }
            },
            OutboundEvent::IceCandidate(candidate) => {
                if let Some(target) = candidate.target.clone() {
                    let relayed = CandidatePayload { target: Some(from.clone()), ..candidate };
                    push(&mut out, &target, &InboundEvent::IceCandidate(relayed));
                }
            },
            OutboundEvent::SendMessage(message) => out = self.send_message(from, message),
            OutboundEvent::GetMessages { room_id, page, limit } => {
                let listed = self.page(&room_id, page, limit);
                push(&mut out, from, &InboundEvent::MessagesList(listed));
            },
            OutboundEvent::Typing { room_id } => {
                let username =
                    self.users.get(from).map(|user| user.username.clone()).unwrap_or_default();
                let event = InboundEvent::UserTyping(TypingNotice {
                    room_id: room_id.clone(),
                    user_id: Some(from.clone()),
                    username,
                });
                self.fan_out_others(&room_id, from, &event, &mut out);
            },
            OutboundEvent::StopTyping { room_id } => {
                let event = InboundEvent::UserStopTyping(StopTypingNotice {
                    room_id: room_id.clone(),
                    user_id: Some(from.clone()),
                });
                self.fan_out_others(&room_id, from, &event, &mut out);
            },
            OutboundEvent::CreateRoom { user_id } => self.create_room(from, &user_id, &mut out),
        }
        out
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn call_request(&mut self, from: &UserId, room_id: RoomId, out: &mut Deliveries) {
        let Some(room) = self.rooms.get(&room_id) else {
            warn!(%room_id, "call request for unknown room");
            return;
        };

        let callees: Vec<UserId> =
            room.members().iter().map(|m| m.id.clone()).filter(|id| id != from).collect();
        let call_id = CallId::new(format!("call-{}", self.next_id()));

        for callee in &callees {
            let incoming = CallIncoming {
                call_id: call_id.clone(),
                caller: CallerRef { id: from.clone() },
                room_id: Some(room_id.clone()),
            };
            push(out, callee, &InboundEvent::CallIncoming(incoming));
        }
        self.calls.insert(call_id, RelayCall { caller: from.clone(), callee: None, room_id });
    }

    fn call_end(
        &mut self,
        from: &UserId,
        call_id: CallId,
        room_id: Option<&RoomId>,
        out: &mut Deliveries,
    ) {
        // provisional IDs never reached the relay; match the caller's open call instead
        let key = if self.calls.contains_key(&call_id) {
            Some(call_id)
        } else {
            self.calls
                .iter()
                .find(|(_, call)| {
                    &call.caller == from && room_id.is_none_or(|room| room == &call.room_id)
                })
                .map(|(id, _)| id.clone())
        };
        let Some((call_id, call)) =
            key.and_then(|id| self.calls.remove(&id).map(|call| (id, call)))
        else {
            debug!(%from, "call:end for unknown call");
            return;
        };

        match call.other(from) {
            Some(other) => {
                push(out, other, &InboundEvent::CallEnded(CallEnded { call_id }));
            },
            None => {
                // never answered: every ringing member hears the end
                let members: Vec<UserId> = self
                    .rooms
                    .get(&call.room_id)
                    .map(|room| room.members().iter().map(|m| m.id.clone()).collect())
                    .unwrap_or_default();
                for member in members.iter().filter(|id| *id != from) {
                    let ended = CallEnded { call_id: call_id.clone() };
                    push(out, member, &InboundEvent::CallEnded(ended));
                }
            },
        }
    }

    fn send_message(&mut self, from: &UserId, request: SendMessage) -> Deliveries {
        let Some(user) = self.users.get(from).cloned() else {
            return Vec::new();
        };
        if !self.rooms.get(&request.room_id).is_some_and(|room| room.has_member(from)) {
            warn!(%from, room_id = %request.room_id, "sender is not a member");
            return Vec::new();
        }

        self.clock += TimeDelta::seconds(1);
        let message = Message {
            id: MessageId::new(format!("m{}", self.next_id())),
            room_id: request.room_id,
            sender: user,
            content: request.content,
            kind: request.kind.map(MessageKind::from).unwrap_or_default(),
            file: request.file,
            created_at: self.clock,
        };
        self.store(message)
    }

    fn store(&mut self, message: Message) -> Deliveries {
        let room_id = message.room_id.clone();
        if let Some(room) = self.rooms.get_mut(&room_id) {
            room.last_message = Some(LastMessage::of(&message));
        }

        let history = self.history.entry(room_id.clone()).or_default();
        let at = history.partition_point(|m| m.created_at <= message.created_at);
        history.insert(at, message.clone());

        let mut out = Vec::new();
        let event = InboundEvent::MessageNew(message);
        for member in self.members(&room_id) {
            push(&mut out, &member, &event);
        }
        out
    }

    /// Page 1 holds the newest `limit` messages; each page is oldest first.
    /// Like the real service, the page does not name its room.
    fn page(&self, room_id: &RoomId, page: u32, limit: u32) -> MessagePage {
        let history = self.history(room_id);
        let total = history.len();
        let limit = (limit.max(1)) as usize;
        let total_pages = total.div_ceil(limit) as u32;

        let end = total.saturating_sub((page.max(1) as usize - 1) * limit);
        let start = end.saturating_sub(limit);

        MessagePage {
            messages: history[start..end].to_vec(),
            total: total as u64,
            page,
            total_pages,
            room_id: None,
        }
    }

    fn create_room(&mut self, from: &UserId, with: &UserId, out: &mut Deliveries) {
        let (Some(me), Some(them)) = (self.users.get(from), self.users.get(with)) else {
            warn!(%from, %with, "private room with unknown user");
            return;
        };

        let (me, them) = (me.clone(), them.clone());
        let room = Room::new(format!("dm-{}", self.next_id()), RoomKind::Private, &them.username)
            .with_member(me)
            .with_member(them);

        for member in [from, with] {
            push(out, member, &InboundEvent::RoomCreated(room.clone()));
        }
        self.rooms.insert(room.id.clone(), room);
    }

    fn members(&self, room_id: &RoomId) -> Vec<UserId> {
        self.rooms
            .get(room_id)
            .map(|room| room.members().iter().map(|m| m.id.clone()).collect())
            .unwrap_or_default()
    }

    fn fan_out_others(
        &self,
        room_id: &RoomId,
        from: &UserId,
        event: &InboundEvent,
        out: &mut Deliveries,
    ) {
        for member in self.members(room_id).iter().filter(|id| *id != from) {
            push(out, member, event);
        }
    }
}

fn push(out: &mut Deliveries, to: &UserId, event: &InboundEvent) {
    match encode(event) {
        Ok(text) => out.push((to.clone(), text)),
        Err(error) => warn!(%error, "relay cannot encode event"),
    }
}
