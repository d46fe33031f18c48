//! FEN-style position strings: ten `/`-separated ranks from Black's edge
//! down to White's, digits for runs of empty squares, then the side to move.

use std::str::FromStr;

use crate::board::Board;
use crate::color::Color;
use crate::error::FenError;
use crate::piece::Piece;
use crate::square::Square;

/// Render a board as a FEN string.
pub fn to_fen(board: &Board) -> String {
    let mut out = String::new();
    for rank in 0..10u8 {
        if rank > 0 {
            out.push('/');
        }
        let mut empties = 0;
        for file in 0..9u8 {
            match board.piece_on(Square::new(file, rank)) {
                Some(piece) => {
                    if empties > 0 {
                        out.push_str(&empties.to_string());
                        empties = 0;
                    }
                    out.push(piece.fen_char());
                }
                None => empties += 1,
            }
        }
        if empties > 0 {
            out.push_str(&empties.to_string());
        }
    }
    out.push(' ');
    out.push(match board.side_to_move() {
        Color::White => 'w',
        Color::Black => 'b',
    });
    out
}

/// Parse a FEN string. Move counters after the side field are ignored.
pub fn from_fen(fen: &str) -> Result<Board, FenError> {
    let mut fields = fen.split_whitespace();
    let placement = fields.next().ok_or(FenError::MissingField)?;
    let side = fields.next().ok_or(FenError::MissingField)?;

    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 10 {
        return Err(FenError::WrongRankCount { found: ranks.len() });
    }

    let mut board = Board::empty();
    for (rank, text) in ranks.iter().enumerate() {
        let mut file = 0u8;
        for ch in text.chars() {
            if let Some(run) = ch.to_digit(10) {
                file += run as u8;
            } else {
                let piece =
                    Piece::from_fen_char(ch).ok_or(FenError::InvalidPieceChar { character: ch })?;
                if file >= 9 {
                    return Err(FenError::BadRankLength {
                        rank,
                        length: file as usize + 1,
                    });
                }
                board.set(Square::new(file, rank as u8), piece);
                file += 1;
            }
        }
        if file != 9 {
            return Err(FenError::BadRankLength {
                rank,
                length: file as usize,
            });
        }
    }

    board.set_side_to_move(match side {
        "w" => Color::White,
        "b" => Color::Black,
        other => {
            return Err(FenError::InvalidSide {
                found: other.to_string(),
            });
        }
    });

    board.validate()?;
    Ok(board)
}

impl FromStr for Board {
    type Err = FenError;

    fn from_str(s: &str) -> Result<Board, FenError> {
        from_fen(s)
    }
}

#[cfg(test)]
mod tests {
    use super::{from_fen, to_fen};
    use crate::board::Board;
    use crate::color::Color;

    #[test]
    fn round_trip() {
        let fen = "3k5/9/9/9/9/9/9/2R1K4/9/9 w";
        let board: Board = fen.parse().unwrap();
        assert_eq!(to_fen(&board), fen);
        assert_eq!(board.side_to_move(), Color::White);
        assert_eq!(board.material_name(), "krk");
    }

    #[test]
    fn rejects_bad_rank_count() {
        assert!(from_fen("9/9 w").is_err());
    }

    #[test]
    fn rejects_missing_side() {
        assert!(from_fen("3k5/9/9/9/9/9/9/5R3/4K4/9").is_err());
    }

    #[test]
    fn rejects_out_of_zone_piece() {
        // A rook on file i lies outside the endgame zone.
        assert!(from_fen("3k4R/9/9/9/9/9/4K4/9/9/9 w").is_err());
    }
}
