//! Local typing debouncer.
//!
//! Converts keystrokes into discrete `user:typing` / `user:stop-typing`
//! emissions. A keystroke emits `user:typing` immediately unless one already
//! went out for the room within the refresh interval, so a peer's indicator
//! never expires while the user keeps typing. When the quiet period passes
//! without input, `user:stop-typing` is emitted exactly once.

use std::{collections::BTreeMap, ops::Sub, time::Duration};

use huddle_proto::{OutboundEvent, RoomId};

/// Quiet period after the last keystroke before typing is considered stopped.
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_secs(2);

/// Minimum spacing of `user:typing` emissions within one burst. Must stay below
/// the receiving side's indicator expiry.
pub const DEFAULT_TYPING_REFRESH: Duration = Duration::from_millis(1_500);

#[derive(Debug, Clone, Copy)]
struct Burst<I> {
    last_keystroke: I,
    last_sent: I,
}

/// Per-room typing timers. At most one timer exists per room.
#[derive(Debug, Clone)]
pub struct TypingDebouncer<I> {
    idle: Duration,
    refresh: Duration,
    bursts: BTreeMap<RoomId, Burst<I>>,
}

impl<I> TypingDebouncer<I>
where
    I: Copy + Ord + Sub<Output = Duration>,
{
    /// Create a debouncer with the given quiet period and the default refresh
    /// interval.
    pub fn new(idle: Duration) -> Self {
        Self { idle, refresh: DEFAULT_TYPING_REFRESH, bursts: BTreeMap::new() }
    }

    /// Override the refresh interval.
    #[must_use]
    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    /// Whether a timer is running for `room_id`.
    #[must_use]
    pub fn is_typing(&self, room_id: &RoomId) -> bool {
        self.bursts.contains_key(room_id)
    }

    /// Record a keystroke and restart the quiet period. Returns `user:typing`
    /// for the first keystroke of a burst and whenever the last one sent is
    /// at least a refresh interval old.
    pub fn keystroke(&mut self, room_id: &RoomId, now: I) -> Option<OutboundEvent> {
        let typing = Some(OutboundEvent::Typing { room_id: room_id.clone() });
        let Some(burst) = self.bursts.get_mut(room_id) else {
            self.bursts.insert(room_id.clone(), Burst { last_keystroke: now, last_sent: now });
            return typing;
        };

        burst.last_keystroke = now;
        if elapsed(now, burst.last_sent) < self.refresh {
            return None;
        }
        burst.last_sent = now;
        typing
    }

    /// Cancel the timer because a message was sent. Returns
    /// `user:stop-typing` if a timer was running.
    pub fn message_sent(&mut self, room_id: &RoomId) -> Option<OutboundEvent> {
        self.bursts.remove(room_id).map(|_| OutboundEvent::StopTyping { room_id: room_id.clone() })
    }

    /// Cancel the timer without emitting.
    pub fn cancel(&mut self, room_id: &RoomId) {
        self.bursts.remove(room_id);
    }

    /// Expire timers whose quiet period elapsed.
    pub fn tick(&mut self, now: I) -> Vec<OutboundEvent> {
        let idle = self.idle;
        let mut expired = Vec::new();

        self.bursts.retain(|room_id, burst| {
            if elapsed(now, burst.last_keystroke) >= idle {
                expired.push(OutboundEvent::StopTyping { room_id: room_id.clone() });
                false
            } else {
                true
            }
        });

        expired
    }

    /// Stop every running timer, returning one `user:stop-typing` per room.
    pub fn drain(&mut self) -> Vec<OutboundEvent> {
        std::mem::take(&mut self.bursts)
            .into_keys()
            .map(|room_id| OutboundEvent::StopTyping { room_id })
            .collect()
    }
}

fn elapsed<I: Copy + Ord + Sub<Output = Duration>>(now: I, since: I) -> Duration {
    if now > since { now - since } else { Duration::ZERO }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn burst_emits_once_each_way() {
        let room = RoomId::new("r1");
        let mut debouncer = TypingDebouncer::new(DEFAULT_TYPING_IDLE);

        assert_eq!(debouncer.keystroke(&room, ms(0)), Some(OutboundEvent::Typing {
            room_id: room.clone()
        }));
        assert_eq!(debouncer.keystroke(&room, ms(500)), None);
        assert_eq!(debouncer.keystroke(&room, ms(1400)), None);

        // deadline was pushed out to 3.4s
        assert!(debouncer.tick(ms(3000)).is_empty());
        assert_eq!(debouncer.tick(ms(3400)), vec![OutboundEvent::StopTyping {
            room_id: room.clone()
        }]);
        assert!(debouncer.tick(ms(10_000)).is_empty());
        assert!(!debouncer.is_typing(&room));
    }

    #[test]
    fn long_burst_refreshes_typing() {
        let room = RoomId::new("r1");
        let mut debouncer = TypingDebouncer::new(DEFAULT_TYPING_IDLE);

        let sent: Vec<u64> = (0..=6_000)
            .step_by(1_000)
            .filter(|&t| debouncer.keystroke(&room, ms(t)).is_some())
            .collect();
        assert_eq!(sent, [0, 2_000, 4_000, 6_000]);
        assert!(debouncer.tick(ms(7900)).is_empty());
        assert_eq!(debouncer.tick(ms(8000)).len(), 1);
    }

    #[test]
    fn send_cancels_timer() {
        let room = RoomId::new("r1");
        let mut debouncer = TypingDebouncer::new(DEFAULT_TYPING_IDLE);
        debouncer.keystroke(&room, ms(0));

        assert!(debouncer.message_sent(&room).is_some());
        assert!(debouncer.message_sent(&room).is_none());
        assert!(debouncer.tick(ms(5000)).is_empty());
    }

    #[test]
    fn rooms_are_independent() {
        let (a, b) = (RoomId::new("a"), RoomId::new("b"));
        let mut debouncer = TypingDebouncer::new(DEFAULT_TYPING_IDLE);
        assert!(debouncer.keystroke(&a, ms(0)).is_some());
        assert!(debouncer.keystroke(&b, ms(1000)).is_some());

        assert_eq!(debouncer.tick(ms(2500)), vec![OutboundEvent::StopTyping { room_id: a }]);
        assert_eq!(debouncer.drain(), vec![OutboundEvent::StopTyping { room_id: b }]);
    }
}
