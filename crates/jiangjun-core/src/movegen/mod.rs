//! Forward and backward (retrograde) move generation.

mod backward;
mod forward;

pub use backward::generate_retro_moves;
pub use forward::generate_moves;

use crate::board::Board;
use crate::color::Color;
use crate::moves::MoveList;

/// Generate fully legal moves for `side`: pseudo-legal moves filtered by
/// the own-king-safe rule (which includes the flying-general constraint).
pub fn generate_legal_moves(board: &mut Board, side: Color) -> MoveList {
    let mut pseudo = MoveList::new();
    generate_moves(board, side, &mut pseudo);

    let mut legal = MoveList::new();
    for mv in pseudo.iter() {
        let undo = board.make(mv);
        if !board.in_check(side) {
            legal.push(mv);
        }
        board.unmake(mv, undo);
    }
    legal
}

/// Whether `side` has at least one legal move.
pub fn has_legal_move(board: &mut Board, side: Color) -> bool {
    let mut pseudo = MoveList::new();
    generate_moves(board, side, &mut pseudo);
    for mv in pseudo.iter() {
        let undo = board.make(mv);
        let safe = !board.in_check(side);
        board.unmake(mv, undo);
        if safe {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::MoveList;
    use crate::piece::{Piece, PieceKind};
    use crate::square::Square;

    fn board_with(pieces: &[(u8, u8, PieceKind, Color)]) -> Board {
        let mut board = Board::empty();
        for &(file, rank, kind, color) in pieces {
            board.set(Square::new(file, rank), Piece::new(kind, color));
        }
        board
    }

    #[test]
    fn stalemate_has_no_legal_moves() {
        // Black king in the corner, every flight square covered by a rook
        // ray, the king square itself attacked by nothing.
        let mut board = board_with(&[
            (0, 0, PieceKind::King, Color::Black),
            (5, 5, PieceKind::King, Color::White),
            (1, 5, PieceKind::Rook, Color::White),
            (5, 1, PieceKind::Rook, Color::White),
        ]);
        assert!(!board.in_check(Color::Black));
        assert!(!has_legal_move(&mut board, Color::Black));
        assert!(has_legal_move(&mut board, Color::White));
    }

    #[test]
    fn every_retro_move_reverses_a_forward_move() {
        let mut board = board_with(&[
            (2, 5, PieceKind::King, Color::White),
            (5, 1, PieceKind::King, Color::Black),
            (4, 4, PieceKind::Rook, Color::White),
            (3, 3, PieceKind::Cannon, Color::White),
            (6, 4, PieceKind::Horse, Color::Black),
            (2, 3, PieceKind::Pawn, Color::White),
            (5, 5, PieceKind::Pawn, Color::Black),
        ]);

        for side in Color::ALL {
            let mut retro = MoveList::new();
            generate_retro_moves(&board, side, &mut retro);
            assert!(!retro.is_empty());
            for un in retro.iter() {
                let undo = board.make(un);
                // From the predecessor, the forward move must exist.
                let mut forward = MoveList::new();
                generate_moves(&board, side, &mut forward);
                assert!(
                    forward
                        .iter()
                        .any(|mv| mv.from() == un.dest() && mv.dest() == un.from()),
                    "retro move {un} is not reversible for {side}"
                );
                board.unmake(un, undo);
            }
        }
    }
}
