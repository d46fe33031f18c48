//! The 8x8 endgame zone and its symmetry transforms.
//!
//! Tablebase indexing works on zone squares `z = row * 8 + file` (row 0 at
//! Black's edge, row 7 at White's). Free pieces range over all 64 zone
//! squares, pawns over rows 1..=6 (48 squares), and the white king is folded
//! into either the 32-square left half (pawn endgames) or the 10-square
//! octant triangle (pawnless endgames).

use crate::color::Color;
use crate::square::Square;

/// Zone squares.
pub const ZONE_SIZE: usize = 64;
/// Pawn zone squares (rows 1..=6).
pub const PAWN_ZONE_SIZE: usize = 48;
/// Left-half king squares (files 0..=3), used with pawns on the board.
pub const KING_HALF_SIZE: usize = 32;
/// Octant triangle king squares, used for pawnless material.
pub const KING_OCTANT_SIZE: usize = 10;

/// File of a zone square.
#[inline]
pub const fn zone_file(z: u8) -> u8 {
    z % 8
}

/// Row of a zone square.
#[inline]
pub const fn zone_row(z: u8) -> u8 {
    z / 8
}

/// Build a zone square from file and row.
#[inline]
pub const fn zone_square(file: u8, row: u8) -> u8 {
    row * 8 + file
}

/// Map a zone square to its board-frame square.
#[inline]
pub const fn zone_to_board(z: u8) -> Square {
    Square::new(zone_file(z), zone_row(z))
}

/// Map a board-frame square into the zone, if it lies inside.
#[inline]
pub const fn board_to_zone(sq: Square) -> Option<u8> {
    let (file, rank) = (sq.file(), sq.rank());
    if file < 8 && rank < 8 {
        Some(zone_square(file, rank))
    } else {
        None
    }
}

/// Pawn-zone index of a zone square (rows 1..=6 only).
#[inline]
pub const fn pawn_zone_index(z: u8) -> Option<u8> {
    let row = zone_row(z);
    if row >= 1 && row <= 6 {
        Some((row - 1) * 8 + zone_file(z))
    } else {
        None
    }
}

/// Zone square of a pawn-zone index.
#[inline]
pub const fn pawn_zone_square(pz: u8) -> u8 {
    zone_square(pz % 8, pz / 8 + 1)
}

/// Whether a zone square lies in the left-half king region.
#[inline]
pub const fn in_king_half(z: u8) -> bool {
    zone_file(z) <= 3
}

/// Whether a zone square lies in the octant triangle (White's corner,
/// below the diagonal).
#[inline]
pub const fn in_king_octant(z: u8) -> bool {
    let file = zone_file(z);
    let depth = 7 - zone_row(z);
    depth <= file && file <= 3
}

/// Whether a pawn of `color` on `row` has crossed the river (rows 3/4 gap).
#[inline]
pub const fn pawn_has_crossed(color: Color, row: u8) -> bool {
    match color {
        Color::White => row <= 3,
        Color::Black => row >= 4,
    }
}

/// Forward direction of a pawn: White advances toward row 0.
#[inline]
pub const fn pawn_forward(color: Color) -> i8 {
    match color {
        Color::White => -1,
        Color::Black => 1,
    }
}

/// A symmetry of the zone: an element of the dihedral group of the 8x8
/// square, expressed in (file, depth) coordinates where `depth = 7 - row`
/// measures distance from White's edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transform {
    swap: bool,
    flip_file: bool,
    flip_depth: bool,
}

impl Transform {
    /// The identity transform.
    pub const IDENT: Transform = Transform {
        swap: false,
        flip_file: false,
        flip_depth: false,
    };

    /// Left-right mirror (the only non-trivial pawn-safe symmetry).
    pub const MIRROR_FILE: Transform = Transform {
        swap: false,
        flip_file: true,
        flip_depth: false,
    };

    /// Top-bottom mirror; combined with a color swap it maps a position to
    /// its color-reversed equivalent.
    pub const MIRROR_RANK: Transform = Transform {
        swap: false,
        flip_file: false,
        flip_depth: true,
    };

    /// All eight symmetries, admissible for pawnless material.
    pub const ALL: [Transform; 8] = {
        let mut all = [Transform::IDENT; 8];
        let mut i = 0;
        while i < 8 {
            all[i] = Transform {
                swap: i & 1 != 0,
                flip_file: i & 2 != 0,
                flip_depth: i & 4 != 0,
            };
            i += 1;
        }
        all
    };

    /// The two symmetries that keep pawn direction intact.
    pub const PAWN: [Transform; 2] = [Transform::IDENT, Transform::MIRROR_FILE];

    /// Whether this transform preserves pawn direction and the pawn zone.
    #[inline]
    pub const fn is_pawn_safe(self) -> bool {
        !self.swap && !self.flip_depth
    }

    /// Apply the transform to a zone square.
    #[inline]
    pub const fn apply(self, z: u8) -> u8 {
        let mut file = zone_file(z);
        let mut depth = 7 - zone_row(z);
        if self.swap {
            let t = file;
            file = depth;
            depth = t;
        }
        if self.flip_file {
            file = 7 - file;
        }
        if self.flip_depth {
            depth = 7 - depth;
        }
        zone_square(file, 7 - depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_sizes() {
        let octant = (0u8..64).filter(|&z| in_king_octant(z)).count();
        let half = (0u8..64).filter(|&z| in_king_half(z)).count();
        let pawn = (0u8..64).filter(|&z| pawn_zone_index(z).is_some()).count();
        assert_eq!(octant, KING_OCTANT_SIZE);
        assert_eq!(half, KING_HALF_SIZE);
        assert_eq!(pawn, PAWN_ZONE_SIZE);
    }

    #[test]
    fn pawn_zone_round_trip() {
        for pz in 0..PAWN_ZONE_SIZE as u8 {
            let z = pawn_zone_square(pz);
            assert_eq!(pawn_zone_index(z), Some(pz));
        }
    }

    #[test]
    fn board_zone_round_trip() {
        for z in 0..ZONE_SIZE as u8 {
            assert_eq!(board_to_zone(zone_to_board(z)), Some(z));
        }
        assert_eq!(board_to_zone(Square::new(8, 0)), None);
        assert_eq!(board_to_zone(Square::new(0, 9)), None);
    }

    #[test]
    fn transforms_are_permutations() {
        for t in Transform::ALL {
            let mut seen = [false; 64];
            for z in 0..64u8 {
                let m = t.apply(z);
                assert!(!seen[m as usize]);
                seen[m as usize] = true;
            }
        }
    }

    #[test]
    fn every_zone_square_folds_into_octant() {
        for z in 0..64u8 {
            assert!(
                Transform::ALL.iter().any(|t| in_king_octant(t.apply(z))),
                "square {z} has no octant image"
            );
        }
    }

    #[test]
    fn mirrors_are_involutions() {
        for t in [Transform::MIRROR_FILE, Transform::MIRROR_RANK] {
            for z in 0..64u8 {
                assert_eq!(t.apply(t.apply(z)), z);
            }
        }
    }

    #[test]
    fn pawn_transforms_preserve_pawn_zone() {
        for t in Transform::PAWN {
            assert!(t.is_pawn_safe());
            for pz in 0..PAWN_ZONE_SIZE as u8 {
                let z = pawn_zone_square(pz);
                assert!(pawn_zone_index(t.apply(z)).is_some());
            }
        }
    }
}
