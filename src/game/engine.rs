//! Position engine: the single source of truth for chess legality.
//!
//! The referee never decides legality on its own. Every candidate move goes
//! through a [`PositionEngine`], which returns the next [`Position`] together
//! with any terminal condition the move produced.

use chess::{Board, BoardStatus, ChessMove, Color, MoveGen, Piece};
use std::fmt;
use std::str::FromStr;

use crate::game::utils::has_insufficient_material;

/// Halfmoves without a capture or pawn move after which the game is drawn.
const SEVENTY_FIVE_MOVE_LIMIT: u32 = 150;
/// Occurrences of the same position after which the game is drawn.
const REPETITION_LIMIT: usize = 5;

/// Automatic draw rules detected by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawRule {
    InsufficientMaterial,
    SeventyFiveMoves,
    FivefoldRepetition,
}

impl DrawRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrawRule::InsufficientMaterial => "insufficient_material",
            DrawRule::SeventyFiveMoves => "seventyfive_moves",
            DrawRule::FivefoldRepetition => "fivefold_repetition",
        }
    }
}

/// Whether `text` is shaped like a UCI move (`e2e4`, `e7e8q`).
///
/// Says nothing about legality.
pub fn is_uci_syntax(text: &str) -> bool {
    let bytes = text.as_bytes();
    let square =
        |file: u8, rank: u8| (b'a'..=b'h').contains(&file) && (b'1'..=b'8').contains(&rank);

    match bytes.len() {
        4 => square(bytes[0], bytes[1]) && square(bytes[2], bytes[3]),
        5 => {
            square(bytes[0], bytes[1])
                && square(bytes[2], bytes[3])
                && matches!(bytes[4], b'q' | b'r' | b'b' | b'n')
        }
        _ => false,
    }
}

/// Terminal flags reported alongside a new position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalFlag {
    /// The side that just moved delivered mate.
    Checkmate { winner: Color },
    Stalemate,
    DrawByRule(DrawRule),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("not a move: {text:?}")]
    Unparseable { text: String },

    #[error("illegal move {text:?} in {fen}")]
    IllegalMove { text: String, fen: String },

    #[error("cannot pass the turn while in check")]
    PassInCheck,
}

/// An immutable chess position with the counters the draw rules need.
///
/// Positions are replaced on every committed ply, never edited in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    board: Board,
    halfmove_clock: u32,
    fullmove_number: u32,
    /// Hashes since the last irreversible move, current position last.
    history: Vec<u64>,
}

impl Default for Position {
    fn default() -> Self {
        Self::from_board(Board::default())
    }
}

impl Position {
    pub fn from_board(board: Board) -> Self {
        Self {
            board,
            halfmove_clock: 0,
            fullmove_number: 1,
            history: vec![board.get_hash()],
        }
    }

    /// Build a position from a full FEN string, keeping its move counters.
    pub fn from_fen(fen: &str) -> Result<Self, EngineError> {
        let board = Board::from_str(fen).map_err(|_| EngineError::Unparseable {
            text: fen.to_string(),
        })?;
        let fields: Vec<&str> = fen.split_whitespace().collect();
        let halfmove_clock = fields.get(4).and_then(|f| f.parse().ok()).unwrap_or(0);
        let fullmove_number = fields.get(5).and_then(|f| f.parse().ok()).unwrap_or(1);

        Ok(Self {
            board,
            halfmove_clock,
            fullmove_number,
            history: vec![board.get_hash()],
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.halfmove_clock
    }

    pub fn fullmove_number(&self) -> u32 {
        self.fullmove_number
    }

    /// FEN of this position, including the real move counters.
    pub fn fen(&self) -> String {
        let board_fen = self.board.to_string();
        let fields: Vec<&str> = board_fen.split_whitespace().take(4).collect();
        format!(
            "{} {} {}",
            fields.join(" "),
            self.halfmove_clock,
            self.fullmove_number
        )
    }

    fn advance(&self, board: Board, irreversible: bool) -> Position {
        let fullmove_number = if self.side_to_move() == Color::Black {
            self.fullmove_number + 1
        } else {
            self.fullmove_number
        };
        let (halfmove_clock, mut history) = if irreversible {
            (0, Vec::new())
        } else {
            (self.halfmove_clock + 1, self.history.clone())
        };
        history.push(board.get_hash());

        Position {
            board,
            halfmove_clock,
            fullmove_number,
            history,
        }
    }

    fn repetitions(&self) -> usize {
        let current = self.board.get_hash();
        self.history.iter().filter(|hash| **hash == current).count()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fen())
    }
}

/// A position produced by the engine plus its terminal condition, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub position: Position,
    pub terminal: Option<TerminalFlag>,
}

/// Legality and terminal-state oracle.
pub trait PositionEngine: Send + Sync {
    /// Apply a UCI move to `position`.
    fn apply(&self, position: &Position, move_text: &str) -> Result<Applied, EngineError>;

    /// Hand the turn to the opponent without moving a piece.
    fn pass(&self, position: &Position) -> Result<Applied, EngineError>;

    /// Every legal move in `position`, in UCI notation.
    fn legal_moves(&self, position: &Position) -> Vec<String>;
}

/// [`PositionEngine`] backed by the `chess` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChessEngine;

impl ChessEngine {
    fn terminal(position: &Position, mover: Color) -> Option<TerminalFlag> {
        match position.board.status() {
            BoardStatus::Checkmate => return Some(TerminalFlag::Checkmate { winner: mover }),
            BoardStatus::Stalemate => return Some(TerminalFlag::Stalemate),
            BoardStatus::Ongoing => {}
        }
        if has_insufficient_material(&position.board) {
            Some(TerminalFlag::DrawByRule(DrawRule::InsufficientMaterial))
        } else if position.halfmove_clock >= SEVENTY_FIVE_MOVE_LIMIT {
            Some(TerminalFlag::DrawByRule(DrawRule::SeventyFiveMoves))
        } else if position.repetitions() >= REPETITION_LIMIT {
            Some(TerminalFlag::DrawByRule(DrawRule::FivefoldRepetition))
        } else {
            None
        }
    }
}

impl PositionEngine for ChessEngine {
    fn apply(&self, position: &Position, move_text: &str) -> Result<Applied, EngineError> {
        let unparseable = || EngineError::Unparseable {
            text: move_text.to_string(),
        };
        if !is_uci_syntax(move_text.trim()) {
            return Err(unparseable());
        }
        let chess_move = ChessMove::from_str(move_text.trim()).map_err(|_| unparseable())?;

        let board = position.board;
        if !board.legal(chess_move) {
            return Err(EngineError::IllegalMove {
                text: move_text.to_string(),
                fen: position.fen(),
            });
        }

        let irreversible = board.piece_on(chess_move.get_source()) == Some(Piece::Pawn)
            || board.piece_on(chess_move.get_dest()).is_some();
        let next = position.advance(board.make_move_new(chess_move), irreversible);
        let terminal = Self::terminal(&next, position.side_to_move());

        Ok(Applied {
            position: next,
            terminal,
        })
    }

    fn pass(&self, position: &Position) -> Result<Applied, EngineError> {
        let board = position.board.null_move().ok_or(EngineError::PassInCheck)?;
        let next = position.advance(board, false);
        let terminal = Self::terminal(&next, position.side_to_move());

        Ok(Applied {
            position: next,
            terminal,
        })
    }

    fn legal_moves(&self, position: &Position) -> Vec<String> {
        MoveGen::new_legal(&position.board)
            .map(|chess_move| chess_move.to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_position_has_twenty_moves() {
        let moves = ChessEngine.legal_moves(&Position::default());
        assert_eq!(moves.len(), 20);
        assert!(moves.contains(&"e2e4".to_string()));
    }

    #[test]
    fn apply_replaces_position_and_updates_counters() {
        let start = Position::default();
        let applied = ChessEngine.apply(&start, "g1f3").expect("legal");
        assert_eq!(applied.position.side_to_move(), Color::Black);
        assert_eq!(applied.position.halfmove_clock(), 1);
        assert_eq!(applied.position.fullmove_number(), 1);
        assert!(applied.terminal.is_none());
        // the input position is untouched
        assert_eq!(start, Position::default());

        let applied = ChessEngine.apply(&applied.position, "e7e5").expect("legal");
        assert_eq!(applied.position.halfmove_clock(), 0);
        assert_eq!(applied.position.fullmove_number(), 2);
        assert!(applied.position.fen().ends_with(" 0 2"));
    }

    #[test]
    fn rejects_illegal_and_unparseable_moves() {
        let start = Position::default();
        assert!(matches!(
            ChessEngine.apply(&start, "e2e5"),
            Err(EngineError::IllegalMove { .. })
        ));
        assert!(matches!(
            ChessEngine.apply(&start, "garbage"),
            Err(EngineError::Unparseable { .. })
        ));
    }

    #[test]
    fn detects_fools_mate() {
        let mut position = Position::default();
        let mut last = None;
        for uci in ["f2f3", "e7e5", "g2g4", "d8h4"] {
            let applied = ChessEngine.apply(&position, uci).expect("legal");
            position = applied.position;
            last = applied.terminal;
        }
        assert_eq!(
            last,
            Some(TerminalFlag::Checkmate {
                winner: Color::Black
            })
        );
    }

    #[test]
    fn uci_syntax_only_checks_shape() {
        assert!(is_uci_syntax("e2e4"));
        assert!(is_uci_syntax("e7e8q"));
        assert!(is_uci_syntax("a1h8"));
        assert!(!is_uci_syntax("e2e9"));
        assert!(!is_uci_syntax("e7e8k"));
        assert!(!is_uci_syntax("E2E4"));
        assert!(!is_uci_syntax("garbage123"));
        assert!(!is_uci_syntax("é2e4"));
    }

    #[test]
    fn pass_hands_over_the_turn() {
        let applied = ChessEngine.pass(&Position::default()).expect("pass");
        assert_eq!(applied.position.side_to_move(), Color::Black);
        assert!(applied.terminal.is_none());
    }

    #[test]
    fn pass_is_refused_in_check() {
        let position =
            Position::from_fen("4k3/8/8/8/8/8/4r3/4K3 w - - 0 1").expect("valid fen");
        assert_eq!(ChessEngine.pass(&position), Err(EngineError::PassInCheck));
    }

    #[test]
    fn capture_into_bare_kings_is_a_draw() {
        let position =
            Position::from_fen("8/8/4k3/8/8/3K4/4r3/8 w - - 0 1").expect("valid fen");
        let applied = ChessEngine.apply(&position, "d3e2").expect("legal");
        assert_eq!(
            applied.terminal,
            Some(TerminalFlag::DrawByRule(DrawRule::InsufficientMaterial))
        );
    }

    #[test]
    fn knight_shuffle_reaches_fivefold_repetition() {
        let mut position = Position::default();
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        let mut terminal = None;
        for uci in shuffle.iter().cycle().take(16) {
            let applied = ChessEngine.apply(&position, uci).expect("legal");
            position = applied.position;
            terminal = applied.terminal;
            if terminal.is_some() {
                break;
            }
        }
        assert_eq!(
            terminal,
            Some(TerminalFlag::DrawByRule(DrawRule::FivefoldRepetition))
        );
    }
}
