//! The positional index: a bijection between canonical piece placements
//! and dense row indices, per material signature.
//!
//! A signature decomposes into a joint king-pair group followed by one
//! combinadic group per same-kind piece run. The row index is the mixed-
//! radix combination of the group sub-keys, optionally re-ordered by the
//! header's permutation word.

mod combinadic;
mod kings;

pub use combinadic::{choose, group_size, rank as combinadic_rank, unrank as combinadic_unrank};
pub use kings::{KK_HALF_PAIRS, KK_OCTANT_PAIRS, KingScheme};

use jiangjun_core::zone::{self, PAWN_ZONE_SIZE, Transform, ZONE_SIZE};
use jiangjun_core::{Board, Color, MaterialSignature, Piece, PieceKind};

use crate::error::EgtbError;

/// Maximum non-king groups a signature can produce (six kinds per side).
const MAX_GROUPS: usize = 12;

/// Canonicalisation result: the row index plus whether the caller must
/// swap the side to move (the canonical representative is color-flipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRec {
    /// Row index, `0 <= key < size`.
    pub key: u64,
    /// Swap side-to-move before reading the cell.
    pub flip_side: bool,
}

/// Why a board cannot be indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    /// The board's material does not match the signature (either way
    /// around).
    WrongMaterial,
    /// The king pair has no cell: the kings touch.
    IllegalKings,
}

#[derive(Debug, Clone, Copy)]
struct PieceGroup {
    color: Color,
    kind: PieceKind,
    count: u8,
}

/// The per-signature index codec.
pub struct IndexCodec {
    sig: MaterialSignature,
    scheme: KingScheme,
    groups: Vec<PieceGroup>,
    /// `(color, kind)` to position in `groups`, -1 when absent.
    group_of: [[i8; PieceKind::COUNT]; Color::COUNT],
    /// Cardinality per unit; unit 0 is the king pair.
    cards: Vec<u64>,
    /// Multiplier per unit under the active permutation.
    mults: Vec<u64>,
    order: u32,
    size: u64,
}

impl IndexCodec {
    /// Build the codec for a signature and permutation order.
    pub fn new(sig: &MaterialSignature, order: u32) -> Result<IndexCodec, EgtbError> {
        let scheme = if sig.has_pawns() {
            KingScheme::Half
        } else {
            KingScheme::Octant
        };

        let mut groups = Vec::new();
        let mut group_of = [[-1i8; PieceKind::COUNT]; Color::COUNT];
        for (color, kind, count) in sig.groups() {
            group_of[color.index()][kind.index()] = groups.len() as i8;
            groups.push(PieceGroup { color, kind, count });
        }

        let units = 1 + groups.len();
        let mut cards = Vec::with_capacity(units);
        cards.push(scheme.pair_count() as u64);
        for group in &groups {
            let squares = if group.kind == PieceKind::Pawn {
                PAWN_ZONE_SIZE
            } else {
                ZONE_SIZE
            };
            cards.push(group_size(squares, group.count as usize));
        }

        let slots = decode_order(order, units)?;
        let mut slot_card = vec![0u64; units];
        for (unit, &slot) in slots.iter().enumerate() {
            slot_card[slot] = cards[unit];
        }
        let mut slot_mult = vec![1u64; units];
        for s in (0..units.saturating_sub(1)).rev() {
            slot_mult[s] = slot_mult[s + 1] * slot_card[s + 1];
        }
        let mults: Vec<u64> = slots.iter().map(|&s| slot_mult[s]).collect();
        let size = cards.iter().product();

        Ok(IndexCodec {
            sig: sig.clone(),
            scheme,
            groups,
            group_of,
            cards,
            mults,
            order,
            size,
        })
    }

    /// Number of rows in the table.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The signature this codec indexes.
    #[inline]
    pub fn signature(&self) -> &MaterialSignature {
        &self.sig
    }

    /// The active permutation order word.
    #[inline]
    pub fn order(&self) -> u32 {
        self.order
    }

    /// The king folding scheme.
    #[inline]
    pub fn scheme(&self) -> KingScheme {
        self.scheme
    }

    /// Number of index units (king pair plus piece groups).
    #[inline]
    pub fn unit_count(&self) -> usize {
        1 + self.groups.len()
    }

    /// The transforms admissible for this signature.
    fn transforms(&self) -> &'static [Transform] {
        if self.sig.has_pawns() {
            &Transform::PAWN
        } else {
            &Transform::ALL
        }
    }

    /// Canonical key of a board: the smallest admissible representative.
    pub fn index_of(&self, board: &Board) -> Result<KeyRec, IndexError> {
        let name = board.material_name();
        let direct = name == self.sig.name();
        let reversed = name == self.sig.reversed_name();
        if !direct && !reversed {
            return Err(IndexError::WrongMaterial);
        }

        let mut best: Option<KeyRec> = None;
        for flip_side in [false, true] {
            if (!flip_side && !direct) || (flip_side && !reversed) {
                continue;
            }
            let Some(placement) = self.collect(board, flip_side) else {
                continue;
            };
            for &t in self.transforms() {
                if let Some(key) = self.key_for(&placement, t) {
                    let rec = KeyRec { key, flip_side };
                    let better = match best {
                        None => true,
                        Some(b) => (key, flip_side) < (b.key, b.flip_side),
                    };
                    if better {
                        best = Some(rec);
                    }
                }
            }
        }
        best.ok_or(IndexError::IllegalKings)
    }

    /// Every distinct row holding a spatial image of the board under the
    /// identity orientation. The generator writes them all so boundary-
    /// symmetric duplicates stay coherent.
    pub fn all_keys(&self, board: &Board, out: &mut Vec<u64>) -> Result<(), IndexError> {
        out.clear();
        if board.material_name() != self.sig.name() {
            return Err(IndexError::WrongMaterial);
        }
        let placement = self.collect(board, false).ok_or(IndexError::WrongMaterial)?;
        for &t in self.transforms() {
            if let Some(key) = self.key_for(&placement, t) {
                if !out.contains(&key) {
                    out.push(key);
                }
            }
        }
        if out.is_empty() {
            return Err(IndexError::IllegalKings);
        }
        Ok(())
    }

    fn collect(&self, board: &Board, flipped: bool) -> Option<Placement> {
        let mut placement = Placement {
            white_king: 0,
            black_king: 0,
            squares: [[0u8; 4]; MAX_GROUPS],
            lens: [0u8; MAX_GROUPS],
        };
        for (sq, piece) in board.pieces() {
            let mut z = zone::board_to_zone(sq)?;
            let mut color = piece.color();
            if flipped {
                z = Transform::MIRROR_RANK.apply(z);
                color = color.opponent();
            }
            if piece.kind() == PieceKind::King {
                match color {
                    Color::White => placement.white_king = z,
                    Color::Black => placement.black_king = z,
                }
                continue;
            }
            let g = self.group_of[color.index()][piece.kind().index()];
            if g < 0 {
                return None;
            }
            let g = g as usize;
            let len = placement.lens[g] as usize;
            if len >= self.groups[g].count as usize {
                return None;
            }
            placement.squares[g][len] = z;
            placement.lens[g] += 1;
        }
        Some(placement)
    }

    fn key_for(&self, placement: &Placement, t: Transform) -> Option<u64> {
        let white = t.apply(placement.white_king);
        if !self.scheme.contains(white) {
            return None;
        }
        let kk = self.scheme.pair_rank(white, t.apply(placement.black_king))?;
        let mut key = kk as u64 * self.mults[0];

        for (g, group) in self.groups.iter().enumerate() {
            let n = group.count as usize;
            let mut squares = [0u8; 4];
            for i in 0..n {
                let z = t.apply(placement.squares[g][i]);
                squares[i] = if group.kind == PieceKind::Pawn {
                    zone::pawn_zone_index(z)?
                } else {
                    z
                };
            }
            squares[..n].sort_unstable();
            key += combinadic_rank(&squares[..n]) * self.mults[1 + g];
        }
        Some(key)
    }

    /// Decompose a row index into per-unit sub-keys.
    pub fn decompose(&self, idx: u64) -> Vec<u64> {
        self.cards
            .iter()
            .zip(&self.mults)
            .map(|(&card, &mult)| (idx / mult) % card)
            .collect()
    }

    /// Recompose per-unit sub-keys into a row index.
    pub fn compose(&self, subs: &[u64]) -> u64 {
        subs.iter().zip(&self.mults).map(|(&s, &m)| s * m).sum()
    }

    /// Rebuild the board of a row, identity orientation, White first.
    /// `None` when the decoded squares collide: such rows are illegal.
    pub fn setup(&self, idx: u64) -> Option<Board> {
        if idx >= self.size {
            return None;
        }
        let subs = self.decompose(idx);

        let mut occupied = [false; ZONE_SIZE];
        let mut board = Board::empty();
        board.set_side_to_move(Color::White);

        let (white, black) = self.scheme.pair(subs[0] as u32)?;
        occupied[white as usize] = true;
        occupied[black as usize] = true;
        board.set(
            zone::zone_to_board(white),
            Piece::new(PieceKind::King, Color::White),
        );
        board.set(
            zone::zone_to_board(black),
            Piece::new(PieceKind::King, Color::Black),
        );

        for (g, group) in self.groups.iter().enumerate() {
            let n = group.count as usize;
            let squares = if group.kind == PieceKind::Pawn {
                PAWN_ZONE_SIZE
            } else {
                ZONE_SIZE
            };
            let mut buf = [0u8; 4];
            combinadic_unrank(subs[1 + g], squares, n, &mut buf[..n])?;
            for &raw in &buf[..n] {
                let z = if group.kind == PieceKind::Pawn {
                    zone::pawn_zone_square(raw)
                } else {
                    raw
                };
                if occupied[z as usize] {
                    return None;
                }
                occupied[z as usize] = true;
                board.set(
                    zone::zone_to_board(z),
                    Piece::new(group.kind, group.color),
                );
            }
        }
        Some(board)
    }

    /// The general inverse: rebuild a row's board under a zone symmetry
    /// and with either side as the first half. Pawn signatures only admit
    /// pawn-safe transforms.
    pub fn setup_with(&self, idx: u64, t: Transform, first_side: Color) -> Option<Board> {
        let board = self.setup(idx)?.transformed(t);
        match first_side {
            Color::White => Some(board),
            Color::Black => Some(board.color_flipped()),
        }
    }
}

struct Placement {
    white_king: u8,
    black_king: u8,
    squares: [[u8; 4]; MAX_GROUPS],
    lens: [u8; MAX_GROUPS],
}

/// Decode the 18-bit permutation word into unit-to-slot assignments.
fn decode_order(order: u32, units: usize) -> Result<Vec<usize>, EgtbError> {
    if order == 0 {
        return Ok((0..units).collect());
    }
    if units > 6 {
        return Err(EgtbError::BadPermutationOrder { order });
    }
    let mut slots = Vec::with_capacity(units);
    let mut seen = [false; 6];
    for unit in 0..units {
        let slot = ((order >> (3 * unit)) & 0x7) as usize;
        if slot >= units || seen[slot] {
            return Err(EgtbError::BadPermutationOrder { order });
        }
        seen[slot] = true;
        slots.push(slot);
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(name: &str, order: u32) -> IndexCodec {
        let sig = MaterialSignature::parse_canonical(name).unwrap();
        IndexCodec::new(&sig, order).unwrap()
    }

    #[test]
    fn sizes() {
        assert_eq!(codec("krk", 0).size(), 564 * 64);
        assert_eq!(codec("krrk", 0).size(), 564 * 2016);
        assert_eq!(codec("kpk", 0).size(), 1806 * 48);
        assert_eq!(codec("krkaa", 0).size(), 564 * 64 * 2016);
    }

    #[test]
    fn setup_index_round_trip_krk() {
        let codec = codec("krk", 0);
        let mut legal = 0u64;
        for idx in 0..codec.size() {
            let Some(board) = codec.setup(idx) else {
                continue;
            };
            legal += 1;
            let mut keys = Vec::new();
            codec.all_keys(&board, &mut keys).unwrap();
            assert!(
                keys.contains(&idx),
                "row {idx} not among its own keys {keys:?}"
            );
            // The canonical key decodes back to an equivalent image.
            let rec = codec.index_of(&board).unwrap();
            let again = codec.setup(rec.key).unwrap();
            assert_eq!(again.material_name(), board.material_name());
        }
        assert!(legal > 0);
    }

    #[test]
    fn pawn_signature_round_trip_sample() {
        let codec = codec("kpk", 0);
        for idx in (0..codec.size()).step_by(13) {
            let Some(board) = codec.setup(idx) else {
                continue;
            };
            let mut keys = Vec::new();
            codec.all_keys(&board, &mut keys).unwrap();
            assert!(keys.contains(&idx));
        }
    }

    fn first_legal(codec: &IndexCodec, from: u64) -> Board {
        (from..codec.size())
            .find_map(|idx| codec.setup(idx))
            .expect("no legal row found")
    }

    #[test]
    fn mirrored_boards_share_their_canonical_key() {
        let codec = codec("krk", 0);
        let board = first_legal(&codec, codec.size() / 2 + 17);
        let mirrored = board.transformed(Transform::MIRROR_FILE);
        let a = codec.index_of(&board).unwrap();
        let b = codec.index_of(&mirrored).unwrap();
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn reversed_material_flips_side() {
        let codec = codec("krk", 0);
        let board = first_legal(&codec, 1234);
        let flipped = board.color_flipped();
        let rec = codec.index_of(&flipped).unwrap();
        assert!(rec.flip_side);
    }

    #[test]
    fn wrong_material_is_rejected() {
        let rook = codec("krk", 0);
        let cannon = codec("kck", 0);
        let board = first_legal(&rook, 1234);
        assert_eq!(cannon.index_of(&board), Err(IndexError::WrongMaterial));
    }

    #[test]
    fn permuted_codec_is_a_bijection() {
        // Swap the two units of krk: order word puts unit 0 in slot 1.
        let plain = codec("krk", 0);
        let permuted = codec("krk", 1 | (0 << 3));
        assert_eq!(plain.size(), permuted.size());
        let mut seen = vec![false; plain.size() as usize];
        for idx in 0..plain.size() {
            let subs = plain.decompose(idx);
            let idx2 = permuted.compose(&subs);
            assert!(!seen[idx2 as usize]);
            seen[idx2 as usize] = true;
        }
    }

    #[test]
    fn bad_orders_are_rejected() {
        let sig = MaterialSignature::parse_canonical("krk").unwrap();
        // Slot out of range and duplicate slot.
        assert!(IndexCodec::new(&sig, 2 | (2 << 3)).is_err());
        assert!(IndexCodec::new(&sig, 7).is_err());
    }
}
