//! Move protocol codec.
//!
//! Agents answer in free text. The codec turns that text into a closed
//! [`Intent`] or a [`DecodeFailure`], and renders the prompts sent back to
//! agents. Legality is never decided here: candidate moves are handed to the
//! [`PositionEngine`].

use chess::Color;
use std::fmt;

use crate::game::engine::{is_uci_syntax, Applied, EngineError, Position, PositionEngine};
use crate::game::utils::color_to_string;

pub const REQUEST_DRAW: &str = "REQUEST_DRAW";
pub const RESIGN: &str = "RESIGN";
pub const DRAW_ACCEPTED: &str = "DRAW_ACCEPTED";
pub const DRAW_REFUSED: &str = "DRAW_REFUSED";

/// Standing instructions sent with every request.
pub const SYSTEM_PROMPT: &str = "You are a chess grandmaster playing a game of chess. \
You will receive the current board position in FEN notation and a list of legal moves. \
Your task is to choose the best move from the legal moves provided.

Respond with ONLY one of the following:
1. A move in UCI format (e.g., \"e2e4\", \"g1f3\", \"e7e8q\")
2. \"REQUEST_DRAW\" if you want to offer a draw
3. \"RESIGN\" if you want to resign
4. \"DRAW_ACCEPTED\" if the opponent offered a draw and you accept
5. \"DRAW_REFUSED\" if the opponent offered a draw and you refuse

Examples of valid responses: \"e2e4\", \"g1f3\", \"REQUEST_DRAW\", \"RESIGN\"";

/// Decoded meaning of an agent response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// A syntactically valid UCI move, not yet checked for legality.
    Move(String),
    RequestDraw,
    Resign,
    DrawAccepted,
    DrawRefused,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Move(uci) => f.write_str(uci),
            Intent::RequestDraw => f.write_str(REQUEST_DRAW),
            Intent::Resign => f.write_str(RESIGN),
            Intent::DrawAccepted => f.write_str(DRAW_ACCEPTED),
            Intent::DrawRefused => f.write_str(DRAW_REFUSED),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Empty,
    Unrecognized,
    /// Draw answer without an offer addressed to this color.
    NoPendingOffer,
    /// New offer while the opponent's offer is still unanswered.
    OfferAlreadyPending,
    IllegalMove,
    /// Draw offer while in check; the turn cannot be passed.
    CannotPass,
    /// The agent transport failed; there is no text.
    Gateway(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Empty => f.write_str("the response was empty"),
            FailureReason::Unrecognized => {
                f.write_str("the response is neither a UCI move nor a known command")
            }
            FailureReason::NoPendingOffer => {
                f.write_str("there is no draw offer from your opponent to answer")
            }
            FailureReason::OfferAlreadyPending => f.write_str(
                "your opponent's draw offer is pending; answer it or make a move",
            ),
            FailureReason::IllegalMove => f.write_str("the move is not legal in this position"),
            FailureReason::CannotPass => {
                f.write_str("you cannot offer a draw while your king is in check")
            }
            FailureReason::Gateway(detail) => write!(f, "no response was received ({detail})"),
        }
    }
}

/// A response that could not be turned into a usable intent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("protocol violation: {reason}")]
pub struct DecodeFailure {
    /// The offending text; `None` when the gateway produced nothing.
    pub text: Option<String>,
    pub reason: FailureReason,
}

impl DecodeFailure {
    pub fn new(text: impl Into<String>, reason: FailureReason) -> Self {
        Self {
            text: Some(text.into()),
            reason,
        }
    }

    pub fn gateway(detail: impl Into<String>) -> Self {
        Self {
            text: None,
            reason: FailureReason::Gateway(detail.into()),
        }
    }
}

/// Outcome of handing a candidate move to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveRejection {
    /// The agent proposed an illegal move. Recoverable.
    Illegal(DecodeFailure),
    /// The engine refused a move it lists as legal. Fatal.
    InvariantViolation(String),
}

/// Everything an agent is told about the position it must answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub fen: String,
    pub color: Color,
    pub legal_moves: Vec<String>,
    pub opponent_last: Option<Intent>,
    /// Color that offered a draw still waiting for an answer.
    pub pending_offer: Option<Color>,
}

impl PromptContext {
    pub fn new(
        engine: &dyn PositionEngine,
        position: &Position,
        color: Color,
        opponent_last: Option<Intent>,
        pending_offer: Option<Color>,
    ) -> Self {
        Self {
            fen: position.fen(),
            color,
            legal_moves: engine.legal_moves(position),
            opponent_last,
            pending_offer,
        }
    }

    /// Whether this color is the recipient of an outstanding draw offer.
    pub fn offer_to_answer(&self) -> bool {
        self.pending_offer == Some(!self.color)
    }
}

/// Decode raw agent text in context.
///
/// Only the first whitespace-separated token counts; quotes and trailing
/// punctuation around it are ignored.
pub fn decode(raw: &str, ctx: &PromptContext) -> Result<Intent, DecodeFailure> {
    let token = match raw.split_whitespace().next() {
        Some(token) => {
            token.trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '.' | ',' | '!'))
        }
        None => return Err(DecodeFailure::new(raw, FailureReason::Empty)),
    };
    if token.is_empty() {
        return Err(DecodeFailure::new(raw, FailureReason::Empty));
    }

    let intent = match token.to_ascii_uppercase().as_str() {
        REQUEST_DRAW => Intent::RequestDraw,
        RESIGN => Intent::Resign,
        DRAW_ACCEPTED => Intent::DrawAccepted,
        DRAW_REFUSED => Intent::DrawRefused,
        _ => {
            let candidate = token.to_ascii_lowercase();
            if !is_uci_syntax(&candidate) {
                return Err(DecodeFailure::new(raw, FailureReason::Unrecognized));
            }
            Intent::Move(candidate)
        }
    };

    match intent {
        Intent::DrawAccepted | Intent::DrawRefused if !ctx.offer_to_answer() => {
            Err(DecodeFailure::new(raw, FailureReason::NoPendingOffer))
        }
        Intent::RequestDraw if ctx.offer_to_answer() => {
            Err(DecodeFailure::new(raw, FailureReason::OfferAlreadyPending))
        }
        intent => Ok(intent),
    }
}

/// Apply a decoded move through the engine.
///
/// A rejected move the engine itself lists as legal means the engine is
/// inconsistent, which is reported separately from an agent mistake.
pub fn resolve_move(
    engine: &dyn PositionEngine,
    position: &Position,
    raw: &str,
    candidate: &str,
) -> Result<Applied, MoveRejection> {
    match engine.apply(position, candidate) {
        Ok(applied) => Ok(applied),
        Err(err) => {
            if engine
                .legal_moves(position)
                .iter()
                .any(|legal| legal == candidate)
            {
                return Err(MoveRejection::InvariantViolation(format!(
                    "engine rejected listed move {candidate}: {err}"
                )));
            }
            let reason = match err {
                EngineError::PassInCheck => FailureReason::CannotPass,
                EngineError::Unparseable { .. } => FailureReason::Unrecognized,
                EngineError::IllegalMove { .. } => FailureReason::IllegalMove,
            };
            Err(MoveRejection::Illegal(DecodeFailure::new(raw, reason)))
        }
    }
}

fn describe_position(ctx: &PromptContext) -> String {
    let mut prompt = format!(
        "Current board position (FEN): {}\nYou are playing as: {}\nLegal moves: {}",
        ctx.fen,
        color_to_string(ctx.color).to_uppercase(),
        ctx.legal_moves.join(", ")
    );
    if let Some(last) = &ctx.opponent_last {
        prompt.push_str(&format!("\nOpponent's last move: {last}"));
    }
    prompt
}

/// The standard "your turn" prompt.
pub fn render_turn_prompt(ctx: &PromptContext) -> String {
    let mut prompt = describe_position(ctx);
    if ctx.offer_to_answer() {
        prompt.push_str(&format!(
            "\n\nYour opponent has offered a draw. You can respond with '{DRAW_ACCEPTED}' or \
             '{DRAW_REFUSED}', or make a regular move to refuse."
        ));
    }
    prompt.push_str(&format!(
        "\n\nRespond with your move in UCI format or one of the special commands \
         ({REQUEST_DRAW}, {RESIGN}, {DRAW_ACCEPTED}, {DRAW_REFUSED})."
    ));
    prompt
}

/// The corrective prompt sent after a [`DecodeFailure`]. Pure.
pub fn render_retry_prompt(failure: &DecodeFailure, ctx: &PromptContext) -> String {
    let mut prompt = match &failure.text {
        Some(text) => format!(
            "Your previous response was invalid: \"{}\" ({}).\n\n",
            text.trim(),
            failure.reason
        ),
        None => format!("Your previous request failed: {}.\n\n", failure.reason),
    };
    prompt.push_str(&describe_position(ctx));

    let commands = if ctx.offer_to_answer() {
        format!("{RESIGN}, {DRAW_ACCEPTED}, {DRAW_REFUSED}")
    } else {
        format!("{REQUEST_DRAW}, {RESIGN}")
    };
    prompt.push_str(&format!(
        "\n\nPlease provide a valid move in UCI format or one of: {commands}"
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::engine::ChessEngine;

    fn ctx(color: Color, pending_offer: Option<Color>) -> PromptContext {
        PromptContext::new(&ChessEngine, &Position::default(), color, None, pending_offer)
    }

    #[test]
    fn decodes_moves_and_commands() {
        let white = ctx(Color::White, None);
        assert_eq!(decode("e2e4", &white), Ok(Intent::Move("e2e4".into())));
        assert_eq!(decode("  E2E4\n", &white), Ok(Intent::Move("e2e4".into())));
        assert_eq!(decode("\"g1f3\".", &white), Ok(Intent::Move("g1f3".into())));
        assert_eq!(decode("e7e8Q", &white), Ok(Intent::Move("e7e8q".into())));
        assert_eq!(decode("resign", &white), Ok(Intent::Resign));
        assert_eq!(decode("REQUEST_DRAW please", &white), Ok(Intent::RequestDraw));
    }

    #[test]
    fn rejects_garbage_without_guessing() {
        let white = ctx(Color::White, None);
        let failure = decode("garbage123", &white).unwrap_err();
        assert_eq!(failure.reason, FailureReason::Unrecognized);
        assert_eq!(failure.text.as_deref(), Some("garbage123"));

        assert_eq!(decode("   ", &white).unwrap_err().reason, FailureReason::Empty);
        // trailing prose does not rescue a bad first token
        assert_eq!(
            decode("I play e2e4", &white).unwrap_err().reason,
            FailureReason::Unrecognized
        );
    }

    #[test]
    fn draw_answers_need_an_offer_from_the_opponent() {
        let no_offer = ctx(Color::Black, None);
        assert_eq!(
            decode("DRAW_ACCEPTED", &no_offer).unwrap_err().reason,
            FailureReason::NoPendingOffer
        );
        assert_eq!(
            decode("DRAW_REFUSED", &no_offer).unwrap_err().reason,
            FailureReason::NoPendingOffer
        );

        // the offerer cannot answer its own offer
        let own_offer = ctx(Color::White, Some(Color::White));
        assert_eq!(
            decode("DRAW_ACCEPTED", &own_offer).unwrap_err().reason,
            FailureReason::NoPendingOffer
        );

        let recipient = ctx(Color::Black, Some(Color::White));
        assert_eq!(decode("DRAW_ACCEPTED", &recipient), Ok(Intent::DrawAccepted));
        assert_eq!(decode("draw_refused", &recipient), Ok(Intent::DrawRefused));
        assert_eq!(
            decode("REQUEST_DRAW", &recipient).unwrap_err().reason,
            FailureReason::OfferAlreadyPending
        );
    }

    #[test]
    fn illegal_moves_become_decode_failures() {
        let position = Position::default();
        match resolve_move(&ChessEngine, &position, "e2e5", "e2e5") {
            Err(MoveRejection::Illegal(failure)) => {
                assert_eq!(failure.reason, FailureReason::IllegalMove);
                assert_eq!(failure.text.as_deref(), Some("e2e5"));
            }
            other => panic!("expected illegal move, got {other:?}"),
        }
        assert!(resolve_move(&ChessEngine, &position, "e2e4", "e2e4").is_ok());
    }

    #[test]
    fn turn_prompt_lists_position_and_offer() {
        // white offered a draw, passing the turn
        let position = ChessEngine.pass(&Position::default()).expect("pass").position;
        let context = PromptContext::new(
            &ChessEngine,
            &position,
            Color::Black,
            Some(Intent::RequestDraw),
            Some(Color::White),
        );
        let prompt = render_turn_prompt(&context);
        assert!(prompt.contains("You are playing as: BLACK"));
        assert!(prompt.contains("Legal moves: "));
        assert!(prompt.contains("e7e5"));
        assert!(!prompt.contains("e2e4"));
        assert!(prompt.contains("Opponent's last move: REQUEST_DRAW"));
        assert!(prompt.contains("Your opponent has offered a draw"));
    }

    #[test]
    fn retry_prompt_is_deterministic_and_quotes_the_offender() {
        let context = ctx(Color::Black, None);
        let failure = DecodeFailure::new("garbage123", FailureReason::Unrecognized);
        let first = render_retry_prompt(&failure, &context);
        let second = render_retry_prompt(&failure, &context);
        assert_eq!(first, second);
        assert!(first.starts_with("Your previous response was invalid: \"garbage123\""));
        assert!(first.ends_with("one of: REQUEST_DRAW, RESIGN"));

        let transport = render_retry_prompt(&DecodeFailure::gateway("timed out"), &context);
        assert!(transport
            .starts_with("Your previous request failed: no response was received (timed out)."));
    }
}
