//! The score model and its two serialised forms.
//!
//! Scores live as a tagged union in memory and cross the table-file
//! boundary either as one-byte cells or as raw little-endian `i16`.

/// Distance-to-mate base: a win in `n` plies scores `MATE - n`.
pub const MATE: i16 = 1000;
/// External sentinel: winning but DTM undetermined.
pub const RAW_WINNING: i16 = 1003;
/// External sentinel: illegal position.
pub const RAW_ILLEGAL: i16 = 1004;
/// External sentinel: result unknown.
pub const RAW_UNKNOWN: i16 = 1005;
/// External sentinel: required table not loaded.
pub const RAW_MISSING: i16 = 1006;
/// External sentinel: cell not yet decided by the generator.
pub const RAW_UNSET: i16 = 1007;
/// External tag: the side to move is being checked forever (it wins).
pub const RAW_PERPETUAL_CHECKED: i16 = 1008;
/// External tag: both perpetual classes apply.
pub const RAW_PERPETUAL_CHECKED_EVASION: i16 = 1009;
/// External tag: the side to move evades forever (the checker loses).
pub const RAW_PERPETUAL_EVASION: i16 = 1010;
/// Numerised perpetual scores use `PERPETUAL_MATE` the way DTM uses
/// [`MATE`]; their magnitudes stay inside `[PERPETUAL_MATE, PERPETUAL_END)`.
pub const PERPETUAL_MATE: i16 = 1500;
/// Exclusive upper magnitude bound of numerised perpetual scores.
pub const PERPETUAL_END: i16 = 2500;

/// One-byte cell values.
pub const CELL_ILLEGAL: u8 = 0;
pub const CELL_UNSET: u8 = 1;
pub const CELL_MISSING: u8 = 2;
pub const CELL_WINNING: u8 = 3;
pub const CELL_UNKNOWN: u8 = 4;
pub const CELL_DRAW: u8 = 5;
/// First mating cell; cell `6 + m` means mate in `2m + 1` plies.
pub const CELL_MATING_START: u8 = 6;
/// First losing cell; cell `130 + m` means mated in `2m` plies.
pub const CELL_LOSING_START: u8 = 130;
pub const CELL_PERPETUAL_CHECKED: u8 = 253;
pub const CELL_PERPETUAL_CHECKED_EVASION: u8 = 254;
pub const CELL_PERPETUAL_EVASION: u8 = 255;

/// A perfect-play score for one position and side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Score {
    /// Regular distance-to-mate: positive wins, negative loses,
    /// magnitude `MATE - plies`.
    Dtm(i16),
    /// Numerised perpetual distance, magnitude in
    /// `[PERPETUAL_MATE, PERPETUAL_END)`.
    PerpetualDtm(i16),
    Draw,
    Winning,
    Unknown,
    Illegal,
    Missing,
    Unset,
    PerpetualChecked,
    PerpetualCheckedEvasion,
    PerpetualEvasion,
}

impl Score {
    /// The external signed-integer encoding.
    pub fn to_raw(self) -> i16 {
        match self {
            Score::Dtm(v) => v,
            Score::PerpetualDtm(v) => v,
            Score::Draw => 0,
            Score::Winning => RAW_WINNING,
            Score::Unknown => RAW_UNKNOWN,
            Score::Illegal => RAW_ILLEGAL,
            Score::Missing => RAW_MISSING,
            Score::Unset => RAW_UNSET,
            Score::PerpetualChecked => RAW_PERPETUAL_CHECKED,
            Score::PerpetualCheckedEvasion => RAW_PERPETUAL_CHECKED_EVASION,
            Score::PerpetualEvasion => RAW_PERPETUAL_EVASION,
        }
    }

    /// Decode the external encoding. Unrecognised values decode as
    /// [`Score::Unset`].
    pub fn from_raw(raw: i16) -> Score {
        match raw {
            0 => Score::Draw,
            RAW_WINNING => Score::Winning,
            RAW_UNKNOWN => Score::Unknown,
            RAW_ILLEGAL => Score::Illegal,
            RAW_MISSING => Score::Missing,
            RAW_UNSET => Score::Unset,
            RAW_PERPETUAL_CHECKED => Score::PerpetualChecked,
            RAW_PERPETUAL_CHECKED_EVASION => Score::PerpetualCheckedEvasion,
            RAW_PERPETUAL_EVASION => Score::PerpetualEvasion,
            v if v != 0 && v.abs() <= MATE => Score::Dtm(v),
            v if v.abs() >= PERPETUAL_MATE && v.abs() < PERPETUAL_END => Score::PerpetualDtm(v),
            _ => Score::Unset,
        }
    }

    /// Whether this is a settled game-theoretic value (DTM or draw).
    #[inline]
    pub fn is_decided(self) -> bool {
        matches!(self, Score::Dtm(_) | Score::Draw)
    }

    /// Whether this is one of the three perpetual class tags.
    #[inline]
    pub fn is_perpetual_tag(self) -> bool {
        matches!(
            self,
            Score::PerpetualChecked | Score::PerpetualCheckedEvasion | Score::PerpetualEvasion
        )
    }

    /// Plies to mate for a regular DTM score.
    pub fn mate_plies(self) -> Option<i16> {
        match self {
            Score::Dtm(v) => Some(MATE - v.abs()),
            _ => None,
        }
    }

    /// The score of the parent of a position scoring `self` for the mover:
    /// negate and step one ply away from the mate. Draw stays draw;
    /// anything undecided has no parent score.
    pub fn parent(self) -> Option<Score> {
        match self {
            Score::Draw => Some(Score::Draw),
            Score::Dtm(v) => {
                let mut p = -v;
                if p > 0 {
                    p -= 1;
                } else {
                    p += 1;
                }
                Some(Score::Dtm(p))
            }
            Score::PerpetualDtm(v) => {
                let mut p = -v;
                if p > 0 {
                    p -= 1;
                } else {
                    p += 1;
                }
                Some(Score::PerpetualDtm(p))
            }
            _ => None,
        }
    }
}

/// Encode a score as a one-byte cell. `None` when the score only fits the
/// two-byte form (deep mates, numerised perpetual distances).
pub fn score_to_cell(score: Score) -> Option<u8> {
    Some(match score {
        Score::Illegal => CELL_ILLEGAL,
        Score::Unset => CELL_UNSET,
        Score::Missing => CELL_MISSING,
        Score::Winning => CELL_WINNING,
        Score::Unknown => CELL_UNKNOWN,
        Score::Draw => CELL_DRAW,
        Score::PerpetualChecked => CELL_PERPETUAL_CHECKED,
        Score::PerpetualCheckedEvasion => CELL_PERPETUAL_CHECKED_EVASION,
        Score::PerpetualEvasion => CELL_PERPETUAL_EVASION,
        Score::PerpetualDtm(_) => return None,
        Score::Dtm(v) if v > 0 => {
            let m = (MATE - v) / 2;
            let cell = CELL_MATING_START as i16 + m;
            if cell >= CELL_LOSING_START as i16 {
                return None;
            }
            cell as u8
        }
        Score::Dtm(v) => {
            let m = (MATE + v) / 2;
            let cell = CELL_LOSING_START as i16 + m;
            if cell > CELL_PERPETUAL_CHECKED as i16 - 1 {
                return None;
            }
            cell as u8
        }
    })
}

/// Decode a one-byte cell.
pub fn cell_to_score(cell: u8) -> Score {
    match cell {
        CELL_ILLEGAL => Score::Illegal,
        CELL_UNSET => Score::Unset,
        CELL_MISSING => Score::Missing,
        CELL_WINNING => Score::Winning,
        CELL_UNKNOWN => Score::Unknown,
        CELL_DRAW => Score::Draw,
        CELL_PERPETUAL_CHECKED => Score::PerpetualChecked,
        CELL_PERPETUAL_CHECKED_EVASION => Score::PerpetualCheckedEvasion,
        CELL_PERPETUAL_EVASION => Score::PerpetualEvasion,
        c if c < CELL_LOSING_START => {
            let plies = 2 * (c - CELL_MATING_START) as i16 + 1;
            Score::Dtm(MATE - plies)
        }
        c => {
            let plies = 2 * (c - CELL_LOSING_START) as i16;
            Score::Dtm(-(MATE - plies))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trip() {
        let scores = [
            Score::Draw,
            Score::Dtm(999),
            Score::Dtm(-1000),
            Score::Dtm(-756),
            Score::PerpetualDtm(1500),
            Score::PerpetualDtm(-2499),
            Score::Winning,
            Score::Unknown,
            Score::Illegal,
            Score::Missing,
            Score::Unset,
            Score::PerpetualChecked,
            Score::PerpetualCheckedEvasion,
            Score::PerpetualEvasion,
        ];
        for score in scores {
            assert_eq!(Score::from_raw(score.to_raw()), score);
        }
    }

    #[test]
    fn cell_round_trip() {
        for cell in 0u8..=255 {
            let score = cell_to_score(cell);
            assert_eq!(score_to_cell(score), Some(cell), "cell {cell}");
        }
    }

    #[test]
    fn dtm_parity_in_cells() {
        // Mating cells are odd plies, losing cells even plies.
        for cell in CELL_MATING_START..CELL_LOSING_START {
            let plies = cell_to_score(cell).mate_plies().unwrap();
            assert_eq!(plies % 2, 1);
        }
        for cell in CELL_LOSING_START..CELL_PERPETUAL_CHECKED {
            let plies = cell_to_score(cell).mate_plies().unwrap();
            assert_eq!(plies % 2, 0);
        }
    }

    #[test]
    fn deep_mates_need_two_bytes() {
        // 249 plies to mate does not fit the one-byte mating range.
        assert_eq!(score_to_cell(Score::Dtm(MATE - 249)), None);
        assert_eq!(score_to_cell(Score::Dtm(-(MATE - 246))), None);
        assert_eq!(score_to_cell(Score::PerpetualDtm(1500)), None);
    }

    #[test]
    fn parent_steps_away_from_mate() {
        assert_eq!(Score::Dtm(-1000).parent(), Some(Score::Dtm(999)));
        assert_eq!(Score::Dtm(999).parent(), Some(Score::Dtm(-998)));
        assert_eq!(Score::Draw.parent(), Some(Score::Draw));
        assert_eq!(Score::Unset.parent(), None);
    }
}
