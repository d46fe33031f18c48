//! The board: piece placement, side to move, attack detection.

use std::fmt;

use crate::color::Color;
use crate::error::BoardError;
use crate::moves::{Move, Undo};
use crate::piece::{Piece, PieceKind};
use crate::square::Square;
use crate::zone::{self, Transform};

pub(crate) const ORTHO_STEPS: [(i8, i8); 4] = [(0, -1), (0, 1), (-1, 0), (1, 0)];
pub(crate) const DIAG_STEPS: [(i8, i8); 4] = [(-1, -1), (1, -1), (-1, 1), (1, 1)];
pub(crate) const KING_STEPS: [(i8, i8); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];
pub(crate) const HORSE_STEPS: [(i8, i8); 8] = [
    (-2, -1),
    (-2, 1),
    (2, -1),
    (2, 1),
    (-1, -2),
    (1, -2),
    (-1, 2),
    (1, 2),
];

/// Step from a square inside the zone, returning `None` when the step
/// leaves the zone.
#[inline]
pub(crate) fn zone_step(sq: Square, df: i8, dr: i8) -> Option<Square> {
    let file = sq.file() as i8 + df;
    let rank = sq.rank() as i8 + dr;
    if (0..8).contains(&file) && (0..8).contains(&rank) {
        Some(Square::new(file as u8, rank as u8))
    } else {
        None
    }
}

/// Complete position state: 90-square placement plus side to move.
#[derive(Clone, PartialEq, Eq)]
pub struct Board {
    squares: [Option<Piece>; 90],
    side_to_move: Color,
}

impl Board {
    /// An empty board with White to move.
    pub fn empty() -> Board {
        Board {
            squares: [None; 90],
            side_to_move: Color::White,
        }
    }

    /// The piece on a square, if any.
    #[inline]
    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.squares[sq.index()]
    }

    /// Whether a square is empty.
    #[inline]
    pub fn is_empty_square(&self, sq: Square) -> bool {
        self.squares[sq.index()].is_none()
    }

    /// Put a piece on a square, replacing whatever was there.
    #[inline]
    pub fn set(&mut self, sq: Square, piece: Piece) {
        self.squares[sq.index()] = Some(piece);
    }

    /// Remove the piece from a square.
    #[inline]
    pub fn clear(&mut self, sq: Square) {
        self.squares[sq.index()] = None;
    }

    /// The side to move.
    #[inline]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    /// Set the side to move.
    #[inline]
    pub fn set_side_to_move(&mut self, color: Color) {
        self.side_to_move = color;
    }

    /// Iterate over all occupied squares.
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        self.squares
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|piece| (Square::from_index(i as u8).unwrap(), piece)))
    }

    /// Count pieces of one kind and color.
    pub fn count(&self, color: Color, kind: PieceKind) -> usize {
        self.pieces()
            .filter(|(_, p)| p.color() == color && p.kind() == kind)
            .count()
    }

    /// Number of attacker pieces (rook/cannon/horse/pawn) for one side.
    pub fn attacker_count(&self, color: Color) -> usize {
        self.pieces()
            .filter(|(_, p)| p.color() == color && p.kind().is_attacker())
            .count()
    }

    /// The king square of a side.
    ///
    /// # Panics
    ///
    /// Panics if the side has no king (structurally invalid board).
    pub fn king_square(&self, color: Color) -> Square {
        self.pieces()
            .find(|(_, p)| p.color() == color && p.kind() == PieceKind::King)
            .map(|(sq, _)| sq)
            .expect("board must have a king for each side")
    }

    /// Play a move. The side to move flips; the returned [`Undo`] restores
    /// the position through [`Board::unmake`].
    #[inline]
    pub fn make(&mut self, mv: Move) -> Undo {
        let captured = self.squares[mv.dest().index()];
        self.squares[mv.dest().index()] = self.squares[mv.from().index()];
        self.squares[mv.from().index()] = None;
        self.side_to_move = self.side_to_move.opponent();
        Undo { captured }
    }

    /// Take a move back.
    #[inline]
    pub fn unmake(&mut self, mv: Move, undo: Undo) {
        self.squares[mv.from().index()] = self.squares[mv.dest().index()];
        self.squares[mv.dest().index()] = undo.captured;
        self.side_to_move = self.side_to_move.opponent();
    }

    /// Whether `by` attacks `target`. Covers rook rays, cannon jumps,
    /// horse legs, elephant eyes, advisor steps, pawn pushes and both king
    /// rules (touch and flying general).
    pub fn is_square_attacked(&self, target: Square, by: Color) -> bool {
        let (tf, tr) = (target.file() as i8, target.rank() as i8);

        // Enemy king: touch, or an open file between (flying general).
        let ksq = self.king_square(by);
        let (kf, kr) = (ksq.file() as i8, ksq.rank() as i8);
        if (kf - tf).abs() <= 1 && (kr - tr).abs() <= 1 && ksq != target {
            return true;
        }
        if kf == tf && ksq != target {
            let (lo, hi) = if kr < tr { (kr, tr) } else { (tr, kr) };
            if ((lo + 1)..hi).all(|r| self.is_empty_square(Square::new(tf as u8, r as u8))) {
                return true;
            }
        }

        // Rook on the first piece of a ray, cannon on the second.
        for (df, dr) in ORTHO_STEPS {
            let mut sq = target;
            let mut screens = 0;
            while let Some(next) = zone_step(sq, df, dr) {
                sq = next;
                if let Some(piece) = self.piece_on(sq) {
                    if piece.color() == by {
                        match (screens, piece.kind()) {
                            (0, PieceKind::Rook) | (1, PieceKind::Cannon) => return true,
                            _ => {}
                        }
                    }
                    screens += 1;
                    if screens == 2 {
                        break;
                    }
                }
            }
        }

        // Horse, checked from the horse's side so the leg is next to it.
        for (df, dr) in HORSE_STEPS {
            let Some(hsq) = zone_step(target, df, dr) else {
                continue;
            };
            let Some(piece) = self.piece_on(hsq) else {
                continue;
            };
            if piece.color() != by || piece.kind() != PieceKind::Horse {
                continue;
            }
            let leg = if df.abs() == 2 {
                zone_step(hsq, -df / 2, 0)
            } else {
                zone_step(hsq, 0, -dr / 2)
            };
            if leg.is_some_and(|sq| self.is_empty_square(sq)) {
                return true;
            }
        }

        // Elephant two-step with an open eye; advisor one diagonal step.
        for (df, dr) in DIAG_STEPS {
            if let (Some(esq), Some(eye)) =
                (zone_step(target, 2 * df, 2 * dr), zone_step(target, df, dr))
            {
                if self.is_empty_square(eye)
                    && self.piece_on(esq)
                        == Some(Piece::new(PieceKind::Elephant, by))
                {
                    return true;
                }
            }
            if let Some(asq) = zone_step(target, df, dr) {
                if self.piece_on(asq) == Some(Piece::new(PieceKind::Advisor, by)) {
                    return true;
                }
            }
        }

        // Pawn push from ahead, or a crossed pawn from the side.
        let back = -zone::pawn_forward(by);
        if let Some(psq) = zone_step(target, 0, back) {
            let can_push = match by {
                Color::White => psq.rank() >= 2,
                Color::Black => psq.rank() <= 5,
            };
            if can_push && self.piece_on(psq) == Some(Piece::new(PieceKind::Pawn, by)) {
                return true;
            }
        }
        for df in [-1, 1] {
            if let Some(psq) = zone_step(target, df, 0) {
                if zone::pawn_has_crossed(by, psq.rank())
                    && self.piece_on(psq) == Some(Piece::new(PieceKind::Pawn, by))
                {
                    return true;
                }
            }
        }

        false
    }

    /// Whether `color`'s king is attacked.
    #[inline]
    pub fn in_check(&self, color: Color) -> bool {
        self.is_square_attacked(self.king_square(color), color.opponent())
    }

    /// Validate structural integrity: one king per side, per-kind count
    /// limits, every piece inside the zone, pawns inside the pawn zone.
    pub fn validate(&self) -> Result<(), BoardError> {
        let mut counts = [[0usize; PieceKind::COUNT]; Color::COUNT];
        for (sq, piece) in self.pieces() {
            let Some(z) = zone::board_to_zone(sq) else {
                return Err(BoardError::PieceOutsideZone {
                    square: sq.to_string(),
                });
            };
            if piece.kind() == PieceKind::Pawn && zone::pawn_zone_index(z).is_none() {
                return Err(BoardError::PawnOutsideZone {
                    square: sq.to_string(),
                });
            }
            counts[piece.color().index()][piece.kind().index()] += 1;
        }

        for color in Color::ALL {
            let color_name = match color {
                Color::Black => "black",
                Color::White => "white",
            };
            let kings = counts[color.index()][PieceKind::King.index()];
            if kings != 1 {
                return Err(BoardError::InvalidKingCount {
                    color: color_name,
                    count: kings,
                });
            }
            for kind in PieceKind::ALL {
                let limit = match kind {
                    PieceKind::King => 1,
                    PieceKind::Pawn => 4,
                    _ => 2,
                };
                let count = counts[color.index()][kind.index()];
                if count > limit {
                    return Err(BoardError::TooManyPieces {
                        kind: kind.letter(),
                        color: color_name,
                        count,
                    });
                }
            }
        }
        Ok(())
    }

    /// Material name of the position: White's pieces then Black's, each in
    /// `k a e r c h p` order. This is the table lookup key.
    pub fn material_name(&self) -> String {
        let mut name = String::new();
        for color in [Color::White, Color::Black] {
            for kind in PieceKind::ALL {
                for _ in 0..self.count(color, kind) {
                    name.push(kind.letter());
                }
            }
        }
        name
    }

    /// The board with a zone symmetry applied to every piece. Colors and
    /// side to move are unchanged.
    pub fn transformed(&self, t: Transform) -> Board {
        let mut out = Board::empty();
        out.side_to_move = self.side_to_move;
        for (sq, piece) in self.pieces() {
            if let Some(z) = zone::board_to_zone(sq) {
                out.set(zone::zone_to_board(t.apply(z)), piece);
            }
        }
        out
    }

    /// The color-reversed equivalent: ranks mirrored, colors and side to
    /// move swapped. Scores are invariant under this map.
    pub fn color_flipped(&self) -> Board {
        let mut out = Board::empty();
        out.side_to_move = self.side_to_move.opponent();
        for (sq, piece) in self.pieces() {
            if let Some(z) = zone::board_to_zone(sq) {
                let m = Transform::MIRROR_RANK.apply(z);
                out.set(
                    zone::zone_to_board(m),
                    Piece::new(piece.kind(), piece.color().opponent()),
                );
            }
        }
        out
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Board(\"{}\")", crate::fen::to_fen(self))
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in 0..10u8 {
            write!(f, "{rank}  ")?;
            for file in 0..9u8 {
                let c = match self.piece_on(Square::new(file, rank)) {
                    Some(piece) => piece.fen_char(),
                    None => '.',
                };
                write!(f, "{c} ")?;
            }
            writeln!(f)?;
        }
        write!(f, "   a b c d e f g h i   {} to move", self.side_to_move)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(board: &mut Board, file: u8, rank: u8, kind: PieceKind, color: Color) {
        board.set(Square::new(file, rank), Piece::new(kind, color));
    }

    fn kings(wf: u8, wr: u8, bf: u8, br: u8) -> Board {
        let mut board = Board::empty();
        put(&mut board, wf, wr, PieceKind::King, Color::White);
        put(&mut board, bf, br, PieceKind::King, Color::Black);
        board
    }

    #[test]
    fn make_unmake_round_trip() {
        let mut board = kings(4, 7, 3, 0);
        put(&mut board, 5, 3, PieceKind::Rook, Color::White);
        let before = board.clone();
        let mv = Move::new(Square::new(5, 3), Square::new(5, 0));
        let undo = board.make(mv);
        assert_eq!(board.side_to_move(), Color::Black);
        board.unmake(mv, undo);
        assert_eq!(board, before);
    }

    #[test]
    fn flying_general_is_check() {
        let board = kings(4, 6, 4, 1);
        assert!(board.in_check(Color::White));
        assert!(board.in_check(Color::Black));

        let mut blocked = kings(4, 6, 4, 1);
        put(&mut blocked, 4, 3, PieceKind::Advisor, Color::Black);
        assert!(!blocked.in_check(Color::Black));
        assert!(!blocked.in_check(Color::White));
    }

    #[test]
    fn touching_kings_attack_each_other() {
        let board = kings(3, 3, 4, 4);
        assert!(board.in_check(Color::White));
        assert!(board.in_check(Color::Black));
    }

    #[test]
    fn rook_check_blocked_by_screen() {
        let mut board = kings(0, 7, 4, 0);
        put(&mut board, 4, 5, PieceKind::Rook, Color::White);
        assert!(board.in_check(Color::Black));
        put(&mut board, 4, 3, PieceKind::Advisor, Color::Black);
        assert!(!board.in_check(Color::Black));
    }

    #[test]
    fn cannon_checks_over_exactly_one_screen() {
        let mut board = kings(0, 7, 4, 0);
        put(&mut board, 4, 6, PieceKind::Cannon, Color::White);
        // No screen: no check.
        assert!(!board.in_check(Color::Black));
        put(&mut board, 4, 3, PieceKind::Advisor, Color::Black);
        assert!(board.in_check(Color::Black));
        put(&mut board, 4, 4, PieceKind::Elephant, Color::Black);
        // Two screens: no check.
        assert!(!board.in_check(Color::Black));
    }

    #[test]
    fn horse_check_blocked_at_leg() {
        let mut board = kings(0, 7, 4, 0);
        put(&mut board, 5, 2, PieceKind::Horse, Color::White);
        assert!(board.in_check(Color::Black));
        // The leg sits next to the horse toward the king.
        put(&mut board, 5, 1, PieceKind::Advisor, Color::Black);
        assert!(!board.in_check(Color::Black));
    }

    #[test]
    fn pawn_checks() {
        let mut board = kings(0, 7, 4, 0);
        put(&mut board, 4, 1, PieceKind::Pawn, Color::White);
        // A pawn on its last playable row cannot push further.
        assert!(!board.in_check(Color::Black));

        let mut side = kings(0, 7, 4, 2);
        put(&mut side, 3, 2, PieceKind::Pawn, Color::White);
        assert!(side.in_check(Color::Black));
        let mut front = kings(0, 7, 4, 2);
        put(&mut front, 4, 3, PieceKind::Pawn, Color::White);
        assert!(front.in_check(Color::Black));
    }

    #[test]
    fn validate_rejects_out_of_zone() {
        let mut board = kings(4, 7, 3, 0);
        put(&mut board, 8, 0, PieceKind::Rook, Color::White);
        assert!(board.validate().is_err());
    }

    #[test]
    fn material_name_orders_white_first() {
        let mut board = kings(4, 7, 3, 0);
        put(&mut board, 5, 3, PieceKind::Rook, Color::White);
        put(&mut board, 2, 2, PieceKind::Pawn, Color::Black);
        assert_eq!(board.material_name(), "krkp");
    }

    #[test]
    fn color_flip_is_involution() {
        let mut board = kings(4, 7, 3, 0);
        put(&mut board, 5, 3, PieceKind::Rook, Color::White);
        assert_eq!(board.color_flipped().color_flipped(), board);
    }
}
