#![allow(dead_code)]

use chess_referee::game::engine::{Applied, ChessEngine, EngineError, Position, PositionEngine};
use chess_referee::game::machine::{Control, TurnMachine};
use chess_referee::gateway::{AgentGateway, AgentRequest, GatewayFailure, SeatGateways};
use chess_referee::models::{AgentIdentity, SessionConfig, Seats};
use chess_referee::session::{Broadcaster, SessionEvent};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::future::{self, BoxFuture};
use futures::{FutureExt, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub type Reply = (Duration, Result<String, GatewayFailure>);

pub fn after(ms: u64, text: &str) -> Reply {
    (Duration::from_millis(ms), Ok(text.to_string()))
}

pub fn fail_after(ms: u64, failure: GatewayFailure) -> Reply {
    (Duration::from_millis(ms), Err(failure))
}

/// Agent that answers from a fixed script and then never answers again.
pub struct ScriptedAgent {
    identity: AgentIdentity,
    script: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new(name: &str, script: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            identity: AgentIdentity::new("scripted", name),
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl AgentGateway for ScriptedAgent {
    fn identity(&self) -> AgentIdentity {
        self.identity.clone()
    }

    fn request(&self, request: AgentRequest) -> BoxFuture<'static, Result<String, GatewayFailure>> {
        self.requests.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some((delay, reply)) => async move {
                tokio::time::sleep(delay).await;
                reply
            }
            .boxed(),
            None => future::pending().boxed(),
        }
    }
}

/// Counts every position the engine is asked to produce.
#[derive(Default)]
pub struct CountingEngine {
    calls: AtomicUsize,
}

impl CountingEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PositionEngine for CountingEngine {
    fn apply(&self, position: &Position, move_text: &str) -> Result<Applied, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ChessEngine.apply(position, move_text)
    }

    fn pass(&self, position: &Position) -> Result<Applied, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ChessEngine.pass(position)
    }

    fn legal_moves(&self, position: &Position) -> Vec<String> {
        ChessEngine.legal_moves(position)
    }
}

/// Lists legal moves but refuses to apply any of them.
pub struct FaultyEngine;

impl PositionEngine for FaultyEngine {
    fn apply(&self, position: &Position, move_text: &str) -> Result<Applied, EngineError> {
        Err(EngineError::IllegalMove {
            text: move_text.to_string(),
            fen: position.fen(),
        })
    }

    fn pass(&self, position: &Position) -> Result<Applied, EngineError> {
        ChessEngine.pass(position)
    }

    fn legal_moves(&self, position: &Position) -> Vec<String> {
        ChessEngine.legal_moves(position)
    }
}

pub fn seats() -> Seats {
    Seats {
        white: AgentIdentity::new("scripted", "white"),
        black: AgentIdentity::new("scripted", "black"),
    }
}

pub fn session(retry_budget: u32, clock_secs: u64, max_plies: Option<u32>) -> SessionConfig {
    let mut config = SessionConfig::new(seats());
    config.retry_budget = retry_budget;
    config.initial_clock = Duration::from_secs(clock_secs);
    config.policy.max_plies = max_plies;
    config
}

pub struct Game {
    pub machine: TurnMachine,
    pub control: UnboundedSender<Control>,
    pub events: UnboundedReceiver<SessionEvent>,
}

pub fn game(
    config: SessionConfig,
    engine: Arc<dyn PositionEngine>,
    white: &Arc<ScriptedAgent>,
    black: &Arc<ScriptedAgent>,
) -> Game {
    let broadcaster = Broadcaster::new();
    let events = broadcaster.subscribe();
    let (control, control_rx) = mpsc::unbounded();
    let gateways = SeatGateways::new(white.clone(), black.clone());
    let machine = TurnMachine::new(Uuid::nil(), config, engine, gateways, control_rx, broadcaster);
    Game {
        machine,
        control,
        events,
    }
}

/// Every event published so far.
pub fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Wait for the first event matching `pred`.
pub async fn wait_for<F>(events: &mut UnboundedReceiver<SessionEvent>, pred: F) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    while let Some(event) = events.next().await {
        if pred(&event) {
            return event;
        }
    }
    panic!("event stream closed before the expected event");
}
