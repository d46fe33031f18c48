//! Joint two-king ranking tables.
//!
//! The white king is folded into the octant triangle (pawnless) or the
//! left half (pawn endgames); the black king ranges over the whole zone.
//! Pairs where the kings touch are excluded, which gives the classic
//! table sizes of 564 and 1806 entries.

use std::sync::OnceLock;

use jiangjun_core::zone::{self, ZONE_SIZE};

/// Which folding the signature uses for its king pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KingScheme {
    /// Octant triangle, pawnless material.
    Octant,
    /// Left half, material with pawns.
    Half,
}

impl KingScheme {
    /// Whether a zone square is inside the scheme's white-king region.
    #[inline]
    pub fn contains(self, z: u8) -> bool {
        match self {
            KingScheme::Octant => zone::in_king_octant(z),
            KingScheme::Half => zone::in_king_half(z),
        }
    }

    /// Number of legal king pairs under this scheme.
    pub fn pair_count(self) -> usize {
        match self {
            KingScheme::Octant => tables().octant.pairs.len(),
            KingScheme::Half => tables().half.pairs.len(),
        }
    }

    /// Rank of a `(white, black)` zone-square pair, `None` when the white
    /// king is outside the region or the kings touch.
    #[inline]
    pub fn pair_rank(self, white: u8, black: u8) -> Option<u32> {
        let table = match self {
            KingScheme::Octant => &tables().octant,
            KingScheme::Half => &tables().half,
        };
        let r = table.rank[white as usize * ZONE_SIZE + black as usize];
        if r < 0 { None } else { Some(r as u32) }
    }

    /// The pair for a rank. `None` past the table end.
    #[inline]
    pub fn pair(self, rank: u32) -> Option<(u8, u8)> {
        let table = match self {
            KingScheme::Octant => &tables().octant,
            KingScheme::Half => &tables().half,
        };
        table.pairs.get(rank as usize).copied()
    }
}

struct PairTable {
    pairs: Vec<(u8, u8)>,
    rank: Vec<i32>,
}

struct KingTables {
    octant: PairTable,
    half: PairTable,
}

fn kings_touch(a: u8, b: u8) -> bool {
    let df = (zone::zone_file(a) as i8 - zone::zone_file(b) as i8).abs();
    let dr = (zone::zone_row(a) as i8 - zone::zone_row(b) as i8).abs();
    df <= 1 && dr <= 1
}

fn build(region: impl Fn(u8) -> bool) -> PairTable {
    let mut pairs = Vec::new();
    let mut rank = vec![-1i32; ZONE_SIZE * ZONE_SIZE];
    for white in 0..ZONE_SIZE as u8 {
        if !region(white) {
            continue;
        }
        for black in 0..ZONE_SIZE as u8 {
            if kings_touch(white, black) {
                continue;
            }
            rank[white as usize * ZONE_SIZE + black as usize] = pairs.len() as i32;
            pairs.push((white, black));
        }
    }
    PairTable { pairs, rank }
}

fn tables() -> &'static KingTables {
    static TABLES: OnceLock<KingTables> = OnceLock::new();
    TABLES.get_or_init(|| KingTables {
        octant: build(zone::in_king_octant),
        half: build(zone::in_king_half),
    })
}

/// Expected pair counts, used by the load-time sanity check.
pub const KK_OCTANT_PAIRS: usize = 564;
/// Expected pair counts, used by the load-time sanity check.
pub const KK_HALF_PAIRS: usize = 1806;
