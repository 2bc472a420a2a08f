use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use log::debug;
use std::sync::{Arc, Mutex, PoisonError};

use crate::game::clock::ClockSnapshot;
use crate::game::codec::DecodeFailure;
use crate::models::{CommittedMove, MachineState, Outcome, SessionId};
use chess::Color;

/// Something observers may want to relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StateChanged(MachineState),
    MoveCommitted(CommittedMove),
    ClockTick(ClockSnapshot),
    RetryPrompted {
        color: Color,
        attempts_left: u32,
        failure: DecodeFailure,
    },
    /// A fatal internal error; always followed by `GameEnded`.
    Diagnostic(String),
    GameEnded {
        outcome: Outcome,
        clocks: ClockSnapshot,
    },
}

/// An event tagged with its session and per-session sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session_id: SessionId,
    pub seq: u64,
    pub event: Event,
}

/// Fan-out of session events to any number of subscribers.
///
/// Publishing is synchronous, so a single publisher's events reach every
/// subscriber in the order they were published.
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    subscribers: Arc<Mutex<Vec<UnboundedSender<SessionEvent>>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn publish(&self, event: SessionEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Dropped receivers are pruned on the next publish
        subscribers.retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Per-session publishing handle that stamps sequence numbers.
#[derive(Debug)]
pub struct EventEmitter {
    session_id: SessionId,
    next_seq: u64,
    broadcaster: Broadcaster,
}

impl EventEmitter {
    pub fn new(session_id: SessionId, broadcaster: Broadcaster) -> Self {
        Self {
            session_id,
            next_seq: 0,
            broadcaster,
        }
    }

    pub fn emit(&mut self, event: Event) {
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!("session {} event #{}: {:?}", self.session_id, seq, event);
        self.broadcaster.publish(SessionEvent {
            session_id: self.session_id,
            seq,
            event,
        });
    }
}
