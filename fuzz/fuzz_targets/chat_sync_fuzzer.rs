//! Fuzz target for chat synchronization
//!
//! Interleaves room switches, history pages (including late pages for rooms
//! no longer shown), live messages and typing notices.
//!
//! # Invariants
//!
//! - The timeline is sorted by creation time and free of duplicate IDs
//! - Every timeline message belongs to the active room
//! - Typing indicators only exist for the active room

#![no_main]

use std::{collections::BTreeSet, time::Duration};

use arbitrary::Arbitrary;
use chrono::{DateTime, TimeZone, Utc};
use huddle_client::{ChatConfig, ChatSync};
use huddle_proto::{
    InboundEvent, Message, MessageId, MessageKind, MessagePage, RoomId, StopTypingNotice,
    TypingNotice, User,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum ChatOp {
    Select { room: u8 },
    LoadPage { page: u8 },
    Page { room: Option<u8>, messages: Vec<(u8, u8, u16)> },
    New { room: u8, id: u8, at: u16 },
    Typing { room: u8 },
    StopTyping { room: u8 },
    Advance { millis: u16 },
}

fn room(n: u8) -> RoomId {
    RoomId::new(format!("r{}", n % 3))
}

fn message(room_n: u8, id: u8, at: u16) -> Message {
    Message {
        id: MessageId::new(format!("m{id}")),
        room_id: room(room_n),
        sender: User::new("bob", "Bob"),
        content: String::new(),
        kind: MessageKind::Text,
        file: None,
        created_at: at_seconds(at),
    }
}

fn at_seconds(at: u16) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + i64::from(at), 0).single().unwrap_or_default()
}

fuzz_target!(|ops: Vec<ChatOp>| {
    let mut chat: ChatSync<Duration> = ChatSync::new(ChatConfig::default());
    let mut now = Duration::ZERO;

    for op in ops {
        match op {
            ChatOp::Select { room: n } => {
                chat.select_room(room(n));
            },
            ChatOp::LoadPage { page } => {
                let _ = chat.load_page(u32::from(page));
            },
            ChatOp::Page { room: n, messages } => {
                let messages: Vec<_> =
                    messages.into_iter().map(|(r, id, at)| message(r, id, at)).collect();
                let page = MessagePage {
                    total: messages.len() as u64,
                    messages,
                    page: 1,
                    total_pages: 1,
                    room_id: n.map(room),
                };
                chat.handle_event(InboundEvent::MessagesList(page), now);
            },
            ChatOp::New { room: n, id, at } => {
                chat.handle_event(InboundEvent::MessageNew(message(n, id, at)), now);
            },
            ChatOp::Typing { room: n } => {
                let notice =
                    TypingNotice { room_id: room(n), username: "Bob".into(), user_id: None };
                chat.handle_event(InboundEvent::UserTyping(notice), now);
            },
            ChatOp::StopTyping { room: n } => {
                let notice = StopTypingNotice { room_id: room(n), user_id: None };
                chat.handle_event(InboundEvent::UserStopTyping(notice), now);
            },
            ChatOp::Advance { millis } => {
                now += Duration::from_millis(u64::from(millis));
                chat.tick(now);
            },
        }

        let timeline = chat.timeline();
        assert!(timeline.windows(2).all(|w| w[0].created_at <= w[1].created_at));
        let ids: BTreeSet<_> = timeline.iter().map(|m| &m.id).collect();
        assert_eq!(ids.len(), timeline.len(), "duplicate message in timeline");

        match chat.active_room() {
            Some(active) => {
                assert!(timeline.iter().all(|m| &m.room_id == active));
                for n in 0..3 {
                    if &room(n) != active {
                        assert!(chat.typing(&room(n)).is_none());
                    }
                }
            },
            None => assert!(timeline.is_empty()),
        }
    }
});
