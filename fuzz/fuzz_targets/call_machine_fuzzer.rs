//! Fuzz target for the call state machine
//!
//! Feeds user intents, service signals and backend completions in any order,
//! including completions for attempts that were already abandoned.
//!
//! # Invariants
//!
//! - Every media handle given to the machine is released exactly once, or
//!   is still held as the current local or remote stream
//! - `Idle` holds no media and no call ID
//! - Actions only ever name attempts the machine issued

#![no_main]

use std::collections::BTreeSet;

use arbitrary::Arbitrary;
use huddle_client::{Attempt, CallAction, CallConfig, CallInput, CallMachine, CallState};
use huddle_core::{MediaError, MediaHandle, SignalingError};
use huddle_harness::SimEnv;
use huddle_proto::{
    AnswerPayload, CallAccepted, CallEnded, CallId, CallIncoming, CallRejected, CallerRef,
    CandidatePayload, IceCandidate, InboundEvent, OfferPayload, SessionDescription,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
enum CallOp {
    Initiate,
    Accept,
    Reject,
    End,
    Incoming { call: u8 },
    Accepted { current: bool },
    Rejected { current: bool },
    Ended { current: bool },
    Offer { current: bool },
    Answer { current: bool },
    Candidate { current: bool, n: u8 },
    Acquired { attempt: u8 },
    AcquireFailed { attempt: u8 },
    OfferCreated { attempt: u8 },
    AnswerCreated { attempt: u8 },
    RemoteApplied { attempt: u8 },
    LocalCandidate { attempt: u8 },
    RemoteTrack { attempt: u8 },
    PeerFailed { attempt: u8 },
}

struct Model {
    machine: CallMachine<SimEnv>,
    attempts: Vec<Attempt>,
    issued: BTreeSet<Attempt>,
    live: BTreeSet<MediaHandle>,
    next_handle: u64,
}

impl Model {
    fn call_id(&self, current: bool) -> CallId {
        match self.machine.call_id() {
            Some(id) if current => id.clone(),
            _ => CallId::new("other"),
        }
    }

    fn attempt(&self, pick: u8) -> Option<Attempt> {
        (!self.attempts.is_empty()).then(|| self.attempts[pick as usize % self.attempts.len()])
    }

    fn media(&mut self) -> MediaHandle {
        let handle = MediaHandle::new(self.next_handle);
        self.next_handle += 1;
        self.live.insert(handle);
        handle
    }

    fn input(&mut self, op: CallOp) -> Option<CallInput> {
        let signal = |event| Some(CallInput::Signal(event));
        match op {
            CallOp::Initiate => Some(CallInput::Initiate { room_id: "r1".into() }),
            CallOp::Accept => Some(CallInput::Accept),
            CallOp::Reject => Some(CallInput::Reject),
            CallOp::End => Some(CallInput::End),
            CallOp::Incoming { call } => signal(InboundEvent::CallIncoming(CallIncoming {
                call_id: CallId::new(format!("c{call}")),
                caller: CallerRef { id: "bob".into() },
                room_id: Some("r1".into()),
            })),
            CallOp::Accepted { current } => signal(InboundEvent::CallAccepted(CallAccepted {
                call_id: self.call_id(current),
                target: "bob".into(),
            })),
            CallOp::Rejected { current } => signal(InboundEvent::CallRejected(CallRejected {
                call_id: current.then(|| self.call_id(true)),
            })),
            CallOp::Ended { current } => {
                signal(InboundEvent::CallEnded(CallEnded { call_id: self.call_id(current) }))
            },
            CallOp::Offer { current } => signal(InboundEvent::Offer(OfferPayload {
                call_id: Some(self.call_id(current)),
                offer: SessionDescription::offer("v=0"),
                target: Some("bob".into()),
            })),
            CallOp::Answer { current } => signal(InboundEvent::Answer(AnswerPayload {
                call_id: Some(self.call_id(current)),
                answer: SessionDescription::answer("v=0"),
                target: Some("bob".into()),
            })),
            CallOp::Candidate { current, n } => {
                signal(InboundEvent::IceCandidate(CandidatePayload {
                    call_id: Some(self.call_id(current)),
                    candidate: IceCandidate::new(format!("candidate:{n}")),
                    target: Some("bob".into()),
                }))
            },
            CallOp::Acquired { attempt } => {
                let attempt = self.attempt(attempt)?;
                Some(CallInput::MediaAcquired { attempt, media: self.media() })
            },
            CallOp::AcquireFailed { attempt } => Some(CallInput::MediaFailed {
                attempt: self.attempt(attempt)?,
                error: MediaError::PermissionDenied,
            }),
            CallOp::OfferCreated { attempt } => Some(CallInput::OfferCreated {
                attempt: self.attempt(attempt)?,
                offer: SessionDescription::offer("v=0"),
            }),
            CallOp::AnswerCreated { attempt } => Some(CallInput::AnswerCreated {
                attempt: self.attempt(attempt)?,
                answer: SessionDescription::answer("v=0"),
            }),
            CallOp::RemoteApplied { attempt } => {
                Some(CallInput::RemoteDescriptionApplied { attempt: self.attempt(attempt)? })
            },
            CallOp::LocalCandidate { attempt } => Some(CallInput::LocalCandidate {
                attempt: self.attempt(attempt)?,
                candidate: IceCandidate::new("candidate:local"),
            }),
            CallOp::RemoteTrack { attempt } => {
                let attempt = self.attempt(attempt)?;
                Some(CallInput::RemoteTrack { attempt, media: self.media() })
            },
            CallOp::PeerFailed { attempt } => Some(CallInput::PeerFailed {
                attempt: self.attempt(attempt)?,
                error: SignalingError::PeerConnection("fuzz".into()),
            }),
        }
    }

    fn record(&mut self, actions: &[CallAction]) {
        for action in actions {
            let attempt = match action {
                CallAction::AcquireMedia { attempt }
                | CallAction::OpenPeer { attempt, .. }
                | CallAction::ClosePeer { attempt }
                | CallAction::CreateOffer { attempt }
                | CallAction::CreateAnswer { attempt }
                | CallAction::SetRemoteDescription { attempt, .. }
                | CallAction::AddIceCandidate { attempt, .. } => Some(*attempt),
                CallAction::ReleaseMedia(handle) => {
                    assert!(self.live.remove(handle), "{handle} released twice or never given");
                    None
                },
                CallAction::Emit(_) | CallAction::Notify(_) => None,
            };

            if let Some(attempt) = attempt {
                if matches!(action, CallAction::AcquireMedia { .. }) && self.issued.insert(attempt)
                {
                    self.attempts.push(attempt);
                }
                assert!(self.issued.contains(&attempt), "action names unknown {attempt}");
            }
        }
    }

    fn check(&self) {
        let held: BTreeSet<_> =
            self.machine.local_media().into_iter().chain(self.machine.remote_media()).collect();
        assert_eq!(held, self.live, "media leak in {:?}", self.machine.state());

        if self.machine.state() == CallState::Idle {
            assert!(self.machine.call_id().is_none());
            assert!(held.is_empty());
        }
    }
}

fuzz_target!(|ops: Vec<CallOp>| {
    let mut model = Model {
        machine: CallMachine::new(SimEnv::with_seed(0), CallConfig::default()),
        attempts: Vec::new(),
        issued: BTreeSet::new(),
        live: BTreeSet::new(),
        next_handle: 1,
    };

    for op in ops {
        let Some(input) = model.input(op) else {
            continue;
        };
        if let Ok(actions) = model.machine.handle(input) {
            model.record(&actions);
        }
        model.check();
    }

    if let Ok(actions) = model.machine.handle(CallInput::End) {
        model.record(&actions);
    }
    assert_eq!(model.machine.state(), CallState::Idle);
    assert!(model.live.is_empty());
});
