use chess::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::game::clock::ClockSnapshot;
use crate::game::codec::Intent;
use crate::game::engine::{DrawRule, Position, TerminalFlag};
use crate::game::utils::color_to_string;

pub type SessionId = Uuid;

/// The agent bound to a seat, e.g. `openai/gpt-4o` or `mock/mock`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub provider: String,
    pub model: String,
}

impl AgentIdentity {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    pub fn mock() -> Self {
        Self::new("mock", "mock")
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Seat assignment for one game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seats {
    pub white: AgentIdentity,
    pub black: AgentIdentity,
}

impl Seats {
    pub fn get(&self, color: Color) -> &AgentIdentity {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }
}

/// Why a seat lost on time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutCause {
    ClockExhausted,
    /// Every retry attempt produced an unusable response.
    RetryBudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    Cancelled,
    PlyLimit,
    EngineInvariant(String),
    ClockInvariant(String),
}

/// Final result of a game. Set once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Checkmate { winner: Color },
    Stalemate,
    DrawAgreed,
    Resignation { loser: Color },
    Timeout { loser: Color, cause: TimeoutCause },
    DrawByRule(DrawRule),
    Aborted(AbortReason),
}

impl Outcome {
    pub fn winner(&self) -> Option<Color> {
        match self {
            Outcome::Checkmate { winner } => Some(*winner),
            Outcome::Resignation { loser } | Outcome::Timeout { loser, .. } => Some(!*loser),
            _ => None,
        }
    }

    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            Outcome::Stalemate | Outcome::DrawAgreed | Outcome::DrawByRule(_)
        )
    }

    /// Short machine-readable result name.
    pub fn result_name(&self) -> &'static str {
        match self {
            Outcome::Checkmate { .. } => "checkmate",
            Outcome::Stalemate => "stalemate",
            Outcome::DrawAgreed => "draw_agreed",
            Outcome::Resignation { .. } => "resignation",
            Outcome::Timeout {
                cause: TimeoutCause::ClockExhausted,
                ..
            } => "timeout",
            Outcome::Timeout {
                cause: TimeoutCause::RetryBudgetExhausted,
                ..
            } => "retry_budget_exhausted",
            Outcome::DrawByRule(rule) => rule.as_str(),
            Outcome::Aborted(_) => "aborted",
        }
    }
}

impl From<TerminalFlag> for Outcome {
    fn from(flag: TerminalFlag) -> Self {
        match flag {
            TerminalFlag::Checkmate { winner } => Outcome::Checkmate { winner },
            TerminalFlag::Stalemate => Outcome::Stalemate,
            TerminalFlag::DrawByRule(rule) => Outcome::DrawByRule(rule),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Checkmate { winner } => {
                write!(f, "{} wins by checkmate", color_to_string(*winner))
            }
            Outcome::Resignation { loser } => {
                write!(f, "{} resigns", color_to_string(*loser))
            }
            Outcome::Timeout { loser, cause } => match cause {
                TimeoutCause::ClockExhausted => {
                    write!(f, "{} lost on time", color_to_string(*loser))
                }
                TimeoutCause::RetryBudgetExhausted => write!(
                    f,
                    "{} forfeits after exhausting its retries",
                    color_to_string(*loser)
                ),
            },
            Outcome::Aborted(AbortReason::Cancelled) => f.write_str("aborted: cancelled"),
            Outcome::Aborted(AbortReason::PlyLimit) => f.write_str("aborted: ply limit reached"),
            Outcome::Aborted(AbortReason::EngineInvariant(msg))
            | Outcome::Aborted(AbortReason::ClockInvariant(msg)) => write!(f, "aborted: {msg}"),
            other => write!(f, "draw ({})", other.result_name()),
        }
    }
}

/// One ply as it entered the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedMove {
    pub color: Color,
    /// 1-based ply index.
    pub ply: u32,
    pub raw: String,
    pub intent: Intent,
    pub position: Arc<Position>,
    pub player_elapsed: Duration,
    /// Retry attempts consumed before this response was accepted.
    pub retries: u32,
}

/// States of the turn machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachineState {
    Init,
    ToMove(Color),
    Validating(Color),
    AwaitingRetry { color: Color, attempts_left: u32 },
    Paused,
    Terminal(Outcome),
}

impl MachineState {
    pub fn name(&self) -> &'static str {
        match self {
            MachineState::Init => "init",
            MachineState::ToMove(_) => "to_move",
            MachineState::Validating(_) => "validating",
            MachineState::AwaitingRetry { .. } => "awaiting_retry",
            MachineState::Paused => "paused",
            MachineState::Terminal(_) => "terminal",
        }
    }

    pub fn color(&self) -> Option<Color> {
        match self {
            MachineState::ToMove(color)
            | MachineState::Validating(color)
            | MachineState::AwaitingRetry { color, .. } => Some(*color),
            _ => None,
        }
    }
}

/// Everything known about one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    pub id: SessionId,
    pub seats: Seats,
    pub moves: Vec<CommittedMove>,
    pub position: Arc<Position>,
    pub outcome: Option<Outcome>,
    pub clocks: ClockSnapshot,
    /// Color whose draw offer awaits an answer.
    pub pending_draw: Option<Color>,
}

impl GameRecord {
    pub fn new(id: SessionId, seats: Seats, position: Position, clocks: ClockSnapshot) -> Self {
        Self {
            id,
            seats,
            moves: Vec::new(),
            position: Arc::new(position),
            outcome: None,
            clocks,
            pending_draw: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn last_move(&self) -> Option<&CommittedMove> {
        self.moves.last()
    }

    /// Total time each seat spent on accepted responses.
    pub fn player_time(&self, color: Color) -> Duration {
        self.moves
            .iter()
            .filter(|committed| committed.color == color)
            .map(|committed| committed.player_elapsed)
            .sum()
    }
}
