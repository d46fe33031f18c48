//! Pseudo-legal forward move generation. Own-capture is excluded; king
//! safety (including flying general) is the caller's filter.

use crate::board::{Board, DIAG_STEPS, HORSE_STEPS, KING_STEPS, ORTHO_STEPS, zone_step};
use crate::color::Color;
use crate::moves::{Move, MoveList};
use crate::piece::PieceKind;
use crate::square::Square;
use crate::zone;

/// Generate pseudo-legal moves for all pieces of `side`.
pub fn generate_moves(board: &Board, side: Color, out: &mut MoveList) {
    for (from, piece) in board.pieces() {
        if piece.color() != side {
            continue;
        }
        match piece.kind() {
            PieceKind::King => gen_steps(board, side, from, &KING_STEPS, out),
            PieceKind::Advisor => gen_steps(board, side, from, &DIAG_STEPS, out),
            PieceKind::Elephant => gen_elephant(board, side, from, out),
            PieceKind::Rook => gen_rook(board, side, from, out),
            PieceKind::Cannon => gen_cannon(board, side, from, out),
            PieceKind::Horse => gen_horse(board, side, from, out),
            PieceKind::Pawn => gen_pawn(board, side, from, out),
        }
    }
}

fn push_if_not_own(board: &Board, side: Color, from: Square, dest: Square, out: &mut MoveList) {
    match board.piece_on(dest) {
        Some(piece) if piece.color() == side => {}
        _ => out.push(Move::new(from, dest)),
    }
}

fn gen_steps(board: &Board, side: Color, from: Square, steps: &[(i8, i8)], out: &mut MoveList) {
    for &(df, dr) in steps {
        if let Some(dest) = zone_step(from, df, dr) {
            push_if_not_own(board, side, from, dest, out);
        }
    }
}

fn gen_elephant(board: &Board, side: Color, from: Square, out: &mut MoveList) {
    for (df, dr) in DIAG_STEPS {
        let (Some(eye), Some(dest)) = (zone_step(from, df, dr), zone_step(from, 2 * df, 2 * dr))
        else {
            continue;
        };
        if board.is_empty_square(eye) {
            push_if_not_own(board, side, from, dest, out);
        }
    }
}

fn gen_rook(board: &Board, side: Color, from: Square, out: &mut MoveList) {
    for (df, dr) in ORTHO_STEPS {
        let mut sq = from;
        while let Some(dest) = zone_step(sq, df, dr) {
            sq = dest;
            if board.is_empty_square(dest) {
                out.push(Move::new(from, dest));
            } else {
                push_if_not_own(board, side, from, dest, out);
                break;
            }
        }
    }
}

fn gen_cannon(board: &Board, side: Color, from: Square, out: &mut MoveList) {
    for (df, dr) in ORTHO_STEPS {
        let mut sq = from;
        let mut jumped = false;
        while let Some(dest) = zone_step(sq, df, dr) {
            sq = dest;
            match (jumped, board.is_empty_square(dest)) {
                (false, true) => out.push(Move::new(from, dest)),
                (false, false) => jumped = true,
                (true, true) => {}
                (true, false) => {
                    push_if_not_own(board, side, from, dest, out);
                    break;
                }
            }
        }
    }
}

fn gen_horse(board: &Board, side: Color, from: Square, out: &mut MoveList) {
    for (df, dr) in HORSE_STEPS {
        let Some(dest) = zone_step(from, df, dr) else {
            continue;
        };
        // The blocking leg sits next to the horse in the long direction.
        let leg = if df.abs() == 2 {
            zone_step(from, df / 2, 0)
        } else {
            zone_step(from, 0, dr / 2)
        };
        if leg.is_some_and(|sq| board.is_empty_square(sq)) {
            push_if_not_own(board, side, from, dest, out);
        }
    }
}

fn gen_pawn(board: &Board, side: Color, from: Square, out: &mut MoveList) {
    let forward = zone::pawn_forward(side);
    if let Some(dest) = zone_step(from, 0, forward) {
        // A pawn never steps onto the zone edge rows.
        if (1..=6).contains(&dest.rank()) {
            push_if_not_own(board, side, from, dest, out);
        }
    }
    if zone::pawn_has_crossed(side, from.rank()) {
        for df in [-1, 1] {
            if let Some(dest) = zone_step(from, df, 0) {
                push_if_not_own(board, side, from, dest, out);
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

    fn moves_from(board: &Board, side: Color, file: u8, rank: u8) -> Vec<Square> {
        let mut list = MoveList::new();
        generate_moves(board, side, &mut list);
        list.iter()
            .filter(|mv| mv.from() == Square::new(file, rank))
            .map(|mv| mv.dest())
            .collect()
    }

    #[test]
    fn king_in_open_center_has_eight_steps() {
        let board = board_with(&[
            (3, 3, PieceKind::King, Color::White),
            (7, 7, PieceKind::King, Color::Black),
        ]);
        assert_eq!(moves_from(&board, Color::White, 3, 3).len(), 8);
    }

    #[test]
    fn rook_stops_at_blockers_and_captures() {
        let board = board_with(&[
            (0, 7, PieceKind::King, Color::White),
            (7, 0, PieceKind::King, Color::Black),
            (3, 3, PieceKind::Rook, Color::White),
            (3, 1, PieceKind::Pawn, Color::Black),
            (5, 3, PieceKind::Pawn, Color::White),
        ]);
        let dests = moves_from(&board, Color::White, 3, 3);
        // Up: 3,2 then capture on 3,1. Down: 3,4..3,7 minus nothing.
        assert!(dests.contains(&Square::new(3, 2)));
        assert!(dests.contains(&Square::new(3, 1)));
        assert!(!dests.contains(&Square::new(3, 0)));
        // Right: blocked by the own pawn on 5,3.
        assert!(dests.contains(&Square::new(4, 3)));
        assert!(!dests.contains(&Square::new(5, 3)));
    }

    #[test]
    fn cannon_needs_a_screen_to_capture() {
        let board = board_with(&[
            (0, 7, PieceKind::King, Color::White),
            (7, 0, PieceKind::King, Color::Black),
            (2, 4, PieceKind::Cannon, Color::White),
            (4, 4, PieceKind::Pawn, Color::White),
            (6, 4, PieceKind::Horse, Color::Black),
        ]);
        let dests = moves_from(&board, Color::White, 2, 4);
        // Quiet up to the screen, then the jump capture behind it.
        assert!(dests.contains(&Square::new(3, 4)));
        assert!(!dests.contains(&Square::new(4, 4)));
        assert!(!dests.contains(&Square::new(5, 4)));
        assert!(dests.contains(&Square::new(6, 4)));
    }

    #[test]
    fn horse_leg_blocks() {
        let open = board_with(&[
            (0, 7, PieceKind::King, Color::White),
            (7, 0, PieceKind::King, Color::Black),
            (3, 3, PieceKind::Horse, Color::White),
        ]);
        assert_eq!(moves_from(&open, Color::White, 3, 3).len(), 8);

        let blocked = board_with(&[
            (0, 7, PieceKind::King, Color::White),
            (7, 0, PieceKind::King, Color::Black),
            (3, 3, PieceKind::Horse, Color::White),
            (3, 2, PieceKind::Pawn, Color::Black),
        ]);
        // The pawn on 3,2 blocks both upward jumps.
        let dests = moves_from(&blocked, Color::White, 3, 3);
        assert_eq!(dests.len(), 6);
        assert!(!dests.contains(&Square::new(2, 1)));
        assert!(!dests.contains(&Square::new(4, 1)));
    }

    #[test]
    fn pawn_gains_sideways_after_crossing() {
        let before = board_with(&[
            (0, 7, PieceKind::King, Color::White),
            (7, 0, PieceKind::King, Color::Black),
            (3, 5, PieceKind::Pawn, Color::White),
        ]);
        assert_eq!(moves_from(&before, Color::White, 3, 5), vec![Square::new(3, 4)]);

        let after = board_with(&[
            (0, 7, PieceKind::King, Color::White),
            (7, 0, PieceKind::King, Color::Black),
            (3, 3, PieceKind::Pawn, Color::White),
        ]);
        let dests = moves_from(&after, Color::White, 3, 3);
        assert_eq!(dests.len(), 3);
        assert!(dests.contains(&Square::new(3, 2)));
        assert!(dests.contains(&Square::new(2, 3)));
        assert!(dests.contains(&Square::new(4, 3)));
    }

    #[test]
    fn pawn_on_last_row_only_moves_sideways() {
        let board = board_with(&[
            (0, 7, PieceKind::King, Color::White),
            (7, 7, PieceKind::King, Color::Black),
            (3, 1, PieceKind::Pawn, Color::White),
        ]);
        let dests = moves_from(&board, Color::White, 3, 1);
        assert_eq!(dests.len(), 2);
        assert!(dests.contains(&Square::new(2, 1)));
        assert!(dests.contains(&Square::new(4, 1)));
    }
}
