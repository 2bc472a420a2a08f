use chess::{Board, Color, Piece, ALL_SQUARES};

/// Convert a chess color to a string
pub fn color_to_string(color: Color) -> String {
    match color {
        Color::White => "white".to_string(),
        Color::Black => "black".to_string(),
    }
}

/// Check if the board has insufficient material for checkmate
pub fn has_insufficient_material(board: &Board) -> bool {
    let mut minors = [0u32; 2];
    let mut bishops_on_light = [false; 2];
    let mut bishops_on_dark = [false; 2];

    for square in ALL_SQUARES {
        let (piece, color) = match (board.piece_on(square), board.color_on(square)) {
            (Some(piece), Some(color)) => (piece, color),
            _ => continue,
        };
        let side = color.to_index();

        match piece {
            Piece::King => {}
            // Any pawn, rook or queen can still force mate
            Piece::Pawn | Piece::Rook | Piece::Queen => return false,
            Piece::Knight => minors[side] += 1,
            Piece::Bishop => {
                minors[side] += 1;
                if (square.get_rank().to_index() + square.get_file().to_index()) % 2 == 0 {
                    bishops_on_dark[side] = true;
                } else {
                    bishops_on_light[side] = true;
                }
            }
        }
    }

    match (minors[0], minors[1]) {
        // King vs King, King and minor piece vs King
        (0, 0) | (1, 0) | (0, 1) => true,
        // King and Bishop vs King and Bishop (bishops on same color)
        (1, 1) => {
            let white_bishop = bishops_on_light[0] || bishops_on_dark[0];
            let black_bishop = bishops_on_light[1] || bishops_on_dark[1];
            white_bishop
                && black_bishop
                && ((bishops_on_light[0] && bishops_on_light[1])
                    || (bishops_on_dark[0] && bishops_on_dark[1]))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn board(fen: &str) -> Board {
        Board::from_str(fen).expect("valid fen")
    }

    #[test]
    fn bare_kings_are_insufficient() {
        assert!(has_insufficient_material(&board("8/8/4k3/8/8/3K4/8/8 w - - 0 1")));
    }

    #[test]
    fn single_minor_is_insufficient() {
        assert!(has_insufficient_material(&board("8/8/4k3/8/8/3KN3/8/8 w - - 0 1")));
        assert!(has_insufficient_material(&board("8/8/4k3/8/8/3KB3/8/8 w - - 0 1")));
    }

    #[test]
    fn rook_or_pawn_is_sufficient() {
        assert!(!has_insufficient_material(&board("8/8/4k3/8/8/R2K4/8/8 w - - 0 1")));
        assert!(!has_insufficient_material(&board("8/8/4k3/8/8/3K4/4P3/8 w - - 0 1")));
        assert!(!has_insufficient_material(&Board::default()));
    }

    #[test]
    fn same_colored_bishops_are_insufficient() {
        // c1 and f8 are both dark squares
        assert!(has_insufficient_material(&board("5b2/8/4k3/8/8/3K4/8/2B5 w - - 0 1")));
        // c1 dark, c8 light
        assert!(!has_insufficient_material(&board("2b5/8/4k3/8/8/3K4/8/2B5 w - - 0 1")));
    }

    #[test]
    fn wire_color_names() {
        assert_eq!(color_to_string(Color::White), "white");
        assert_eq!(color_to_string(Color::Black), "black");
    }
}
