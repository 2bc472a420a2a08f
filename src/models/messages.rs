use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{Config, MAX_CLOCK_SECS};
use crate::game::clock::ClockSnapshot;
use crate::game::machine::SessionView;
use crate::game::utils::color_to_string;
use crate::models::{AgentIdentity, CommittedMove, MachineState, SessionConfig, Seats};
use crate::session::{Event, SessionEvent};

/// Parameters for a new game. Missing fields come from the config file.
///
/// Clock values are capped at [`MAX_CLOCK_SECS`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StartRequest {
    pub white: Option<AgentIdentity>,
    pub black: Option<AgentIdentity>,
    pub retry_budget: Option<u32>,
    pub initial_clock_secs: Option<u64>,
    pub increment_secs: Option<u64>,
}

impl StartRequest {
    pub fn session_config(&self, config: &Config) -> SessionConfig {
        let defaults = config.default_seats();
        let seats = Seats {
            white: self.white.clone().unwrap_or(defaults.white),
            black: self.black.clone().unwrap_or(defaults.black),
        };
        let mut session = config.session_config(seats);
        if let Some(retry_budget) = self.retry_budget {
            session.retry_budget = retry_budget;
        }
        if let Some(secs) = self.initial_clock_secs.filter(|secs| *secs > 0) {
            session.initial_clock = Duration::from_secs(secs.min(MAX_CLOCK_SECS));
        }
        if let Some(secs) = self.increment_secs {
            session.increment = Duration::from_secs(secs.min(MAX_CLOCK_SECS));
        }
        session
    }
}

/// Message sent from client to server
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientMessage {
    pub message_type: String,
    pub session_id: Option<String>,
    /// Whether to relay clock ticks; unchanged when absent.
    pub ticks: Option<bool>,
    #[serde(flatten)]
    pub start: StartRequest,
}

/// Message sent from server to client
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ServerMessage {
    pub message_type: String,
    pub session_id: Option<String>,
    pub seq: Option<u64>,
    pub state: Option<String>,
    pub color: Option<String>,
    pub fen: Option<String>,
    pub white_agent: Option<String>,
    pub black_agent: Option<String>,
    pub last_move: Option<LastMove>,
    pub moves: Option<Vec<LastMove>>,
    pub pending_draw: Option<String>,
    pub white_time_ms: Option<u64>,
    pub black_time_ms: Option<u64>,
    pub system_time_ms: Option<u64>,
    pub running_clock: Option<String>,
    pub attempts_left: Option<u32>,
    pub offending: Option<String>,
    pub error: Option<String>,
    pub game_status: Option<String>,
    pub outcome: Option<String>,
    pub winner: Option<String>,
}

/// Committed ply as shown to clients
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LastMove {
    pub ply: u32,
    pub color: String,
    pub raw: String,
    pub intent: String,
    pub player_elapsed_ms: u64,
    pub retries: u32,
}

impl From<&CommittedMove> for LastMove {
    fn from(committed: &CommittedMove) -> Self {
        Self {
            ply: committed.ply,
            color: color_to_string(committed.color),
            raw: committed.raw.clone(),
            intent: committed.intent.to_string(),
            player_elapsed_ms: committed.player_elapsed.as_millis() as u64,
            retries: committed.retries,
        }
    }
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message_type: "error".to_string(),
            error: Some(message.into()),
            ..Self::default()
        }
    }

    fn with_clocks(mut self, clocks: &ClockSnapshot) -> Self {
        self.white_time_ms = Some(clocks.white.as_millis() as u64);
        self.black_time_ms = Some(clocks.black.as_millis() as u64);
        self.system_time_ms = Some(clocks.system.as_millis() as u64);
        self.running_clock = clocks.running.map(|timer| timer.to_string());
        self
    }

    fn with_state(mut self, state: &MachineState) -> Self {
        self.state = Some(state.name().to_string());
        self.color = state.color().map(color_to_string);
        if let MachineState::AwaitingRetry { attempts_left, .. } = state {
            self.attempts_left = Some(*attempts_left);
        }
        if let MachineState::Terminal(outcome) = state {
            self.game_status = Some(outcome.result_name().to_string());
            self.outcome = Some(outcome.to_string());
            self.winner = outcome.winner().map(color_to_string);
        }
        self
    }

    /// Relay form of an orchestrator event.
    pub fn from_event(event: &SessionEvent) -> Self {
        let base = Self {
            session_id: Some(event.session_id.to_string()),
            seq: Some(event.seq),
            ..Self::default()
        };
        match &event.event {
            Event::StateChanged(state) => Self {
                message_type: "state_changed".to_string(),
                ..base
            }
            .with_state(state),
            Event::MoveCommitted(committed) => Self {
                message_type: "move_committed".to_string(),
                color: Some(color_to_string(committed.color)),
                fen: Some(committed.position.fen()),
                last_move: Some(LastMove::from(committed)),
                ..base
            },
            Event::ClockTick(clocks) => Self {
                message_type: "clock_tick".to_string(),
                ..base
            }
            .with_clocks(clocks),
            Event::RetryPrompted {
                color,
                attempts_left,
                failure,
            } => Self {
                message_type: "retry_prompted".to_string(),
                color: Some(color_to_string(*color)),
                attempts_left: Some(*attempts_left),
                offending: failure.text.clone(),
                error: Some(failure.reason.to_string()),
                ..base
            },
            Event::Diagnostic(message) => Self {
                message_type: "diagnostic".to_string(),
                error: Some(message.clone()),
                ..base
            },
            Event::GameEnded { outcome, clocks } => Self {
                message_type: "game_ended".to_string(),
                game_status: Some(outcome.result_name().to_string()),
                outcome: Some(outcome.to_string()),
                winner: outcome.winner().map(color_to_string),
                ..base
            }
            .with_clocks(clocks),
        }
    }

    /// Full state of one session.
    pub fn snapshot(view: &SessionView) -> Self {
        let record = &view.record;
        Self {
            message_type: "session".to_string(),
            session_id: Some(record.id.to_string()),
            fen: Some(record.position.fen()),
            white_agent: Some(record.seats.white.to_string()),
            black_agent: Some(record.seats.black.to_string()),
            last_move: record.last_move().map(LastMove::from),
            moves: Some(record.moves.iter().map(LastMove::from).collect()),
            pending_draw: record.pending_draw.map(color_to_string),
            ..Self::default()
        }
        .with_state(&view.state)
        .with_clocks(&record.clocks)
    }
}
