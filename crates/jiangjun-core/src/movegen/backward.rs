//! Retrograde move generation: quiet un-moves for the side that just moved.
//!
//! A retro move carries a piece of `side` from its current square to an
//! empty predecessor square such that the forward move (predecessor to
//! current square) is pseudo-legal. Captures are never retracted here —
//! capture predecessors live in a larger material table.

use crate::board::{Board, DIAG_STEPS, HORSE_STEPS, KING_STEPS, ORTHO_STEPS, zone_step};
use crate::color::Color;
use crate::moves::{Move, MoveList};
use crate::piece::PieceKind;
use crate::square::Square;
use crate::zone;

/// Generate all quiet un-moves for `side`.
pub fn generate_retro_moves(board: &Board, side: Color, out: &mut MoveList) {
    for (from, piece) in board.pieces() {
        if piece.color() != side {
            continue;
        }
        match piece.kind() {
            PieceKind::King => retro_steps(board, from, &KING_STEPS, out),
            PieceKind::Advisor => retro_steps(board, from, &DIAG_STEPS, out),
            PieceKind::Elephant => retro_elephant(board, from, out),
            // Quiet rook and cannon moves coincide and are self-inverse.
            PieceKind::Rook | PieceKind::Cannon => retro_slider(board, from, out),
            PieceKind::Horse => retro_horse(board, from, out),
            PieceKind::Pawn => retro_pawn(board, side, from, out),
        }
    }
}

fn retro_steps(board: &Board, from: Square, steps: &[(i8, i8)], out: &mut MoveList) {
    for &(df, dr) in steps {
        if let Some(prev) = zone_step(from, df, dr) {
            if board.is_empty_square(prev) {
                out.push(Move::new(from, prev));
            }
        }
    }
}

fn retro_elephant(board: &Board, from: Square, out: &mut MoveList) {
    for (df, dr) in DIAG_STEPS {
        let (Some(eye), Some(prev)) = (zone_step(from, df, dr), zone_step(from, 2 * df, 2 * dr))
        else {
            continue;
        };
        if board.is_empty_square(eye) && board.is_empty_square(prev) {
            out.push(Move::new(from, prev));
        }
    }
}

fn retro_slider(board: &Board, from: Square, out: &mut MoveList) {
    for (df, dr) in ORTHO_STEPS {
        let mut sq = from;
        while let Some(prev) = zone_step(sq, df, dr) {
            if !board.is_empty_square(prev) {
                break;
            }
            out.push(Move::new(from, prev));
            sq = prev;
        }
    }
}

fn retro_horse(board: &Board, from: Square, out: &mut MoveList) {
    for (df, dr) in HORSE_STEPS {
        let Some(prev) = zone_step(from, df, dr) else {
            continue;
        };
        if !board.is_empty_square(prev) {
            continue;
        }
        // The forward jump runs prev -> from; its leg sits next to prev.
        let leg = if df.abs() == 2 {
            zone_step(prev, -df / 2, 0)
        } else {
            zone_step(prev, 0, -dr / 2)
        };
        if leg.is_some_and(|sq| board.is_empty_square(sq)) {
            out.push(Move::new(from, prev));
        }
    }
}

fn retro_pawn(board: &Board, side: Color, from: Square, out: &mut MoveList) {
    // Un-advance: one step back toward home, staying on pawn rows.
    let back = -zone::pawn_forward(side);
    if let Some(prev) = zone_step(from, 0, back) {
        if (1..=6).contains(&prev.rank()) && board.is_empty_square(prev) {
            out.push(Move::new(from, prev));
        }
    }
    // Un-sidestep: sideways moves exist only after the river, and they do
    // not change the row, so the crossing test is the same on both ends.
    if zone::pawn_has_crossed(side, from.rank()) {
        for df in [-1, 1] {
            if let Some(prev) = zone_step(from, df, 0) {
                if board.is_empty_square(prev) {
                    out.push(Move::new(from, prev));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::Piece;

    fn board_with(pieces: &[(u8, u8, PieceKind, Color)]) -> Board {
        let mut board = Board::empty();
        for &(file, rank, kind, color) in pieces {
            board.set(Square::new(file, rank), Piece::new(kind, color));
        }
        board
    }

    fn retro_from(board: &Board, side: Color, file: u8, rank: u8) -> Vec<Square> {
        let mut list = MoveList::new();
        generate_retro_moves(board, side, &mut list);
        list.iter()
            .filter(|mv| mv.from() == Square::new(file, rank))
            .map(|mv| mv.dest())
            .collect()
    }

    #[test]
    fn uncrossed_pawn_has_one_predecessor() {
        let board = board_with(&[
            (0, 7, PieceKind::King, Color::White),
            (7, 0, PieceKind::King, Color::Black),
            (3, 4, PieceKind::Pawn, Color::White),
        ]);
        // Not yet crossed: only the un-advance toward home.
        assert_eq!(retro_from(&board, Color::White, 3, 4), vec![Square::new(3, 5)]);
    }

    #[test]
    fn pawn_near_home_row_cannot_unadvance_off_zone() {
        let board = board_with(&[
            (0, 7, PieceKind::King, Color::White),
            (7, 0, PieceKind::King, Color::Black),
            (3, 6, PieceKind::Pawn, Color::White),
        ]);
        // Row 7 is outside the pawn zone, so no predecessor exists.
        assert!(retro_from(&board, Color::White, 3, 6).is_empty());
    }

    #[test]
    fn cannon_retro_is_quiet_slide() {
        let board = board_with(&[
            (0, 7, PieceKind::King, Color::White),
            (7, 0, PieceKind::King, Color::Black),
            (3, 3, PieceKind::Cannon, Color::White),
            (3, 1, PieceKind::Pawn, Color::Black),
        ]);
        let dests = retro_from(&board, Color::White, 3, 3);
        assert!(dests.contains(&Square::new(3, 2)));
        assert!(!dests.contains(&Square::new(3, 1)));
        assert!(!dests.contains(&Square::new(3, 0)));
    }
}
