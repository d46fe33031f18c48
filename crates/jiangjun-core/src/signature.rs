//! Material signatures: the canonical lowercase name identifying one
//! endgame table, e.g. `krk`, `krkaa`, `kcpkch`.
//!
//! A signature lists White's pieces then Black's, each side opened by its
//! king. The canonical form puts the attacker-heavy side first (White);
//! ties break on attacker kinds, then defenders.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::board::Board;
use crate::color::Color;
use crate::error::SignatureError;
use crate::piece::PieceKind;

/// A parsed and validated material signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MaterialSignature {
    name: String,
    counts: [[u8; PieceKind::COUNT]; Color::COUNT],
}

impl MaterialSignature {
    /// Parse a signature without canonical-order validation. Used for
    /// lookups where the reversed form is acceptable.
    pub fn parse(name: &str) -> Result<MaterialSignature, SignatureError> {
        let name = name.to_ascii_lowercase();
        let mut counts = [[0u8; PieceKind::COUNT]; Color::COUNT];
        let mut side = Color::White;

        let mut chars = name.chars();
        match chars.next() {
            Some('k') => counts[Color::White.index()][PieceKind::King.index()] = 1,
            Some(_) | None => return Err(SignatureError::MissingLeadingKing),
        }
        for ch in chars {
            let kind = PieceKind::from_letter(ch)
                .ok_or(SignatureError::InvalidLetter { character: ch })?;
            if kind == PieceKind::King {
                if side == Color::Black {
                    return Err(SignatureError::BadKingCount);
                }
                side = Color::Black;
            }
            counts[side.index()][kind.index()] += 1;
        }
        if counts[Color::Black.index()][PieceKind::King.index()] != 1 {
            return Err(SignatureError::BadKingCount);
        }

        for color in Color::ALL {
            for kind in PieceKind::ALL {
                let limit = match kind {
                    PieceKind::King => 1,
                    PieceKind::Pawn => 4,
                    _ => 2,
                };
                if counts[color.index()][kind.index()] > limit {
                    return Err(SignatureError::TooManyPieces {
                        kind: kind.letter(),
                    });
                }
            }
        }

        Ok(MaterialSignature { name, counts })
    }

    /// Parse a signature and require the canonical attacker-first order.
    /// This is the documented precondition for every table operation.
    pub fn parse_canonical(name: &str) -> Result<MaterialSignature, SignatureError> {
        let sig = MaterialSignature::parse(name)?;
        sig.check_canonical()?;
        Ok(sig)
    }

    /// The signature of a board's material, in board orientation (White's
    /// pieces first). Not necessarily canonical.
    pub fn of_board(board: &Board) -> Result<MaterialSignature, SignatureError> {
        MaterialSignature::parse(&board.material_name())
    }

    fn check_canonical(&self) -> Result<(), SignatureError> {
        let w = self.attacker_count(Color::White);
        let b = self.attacker_count(Color::Black);
        if w == 0 {
            return Err(SignatureError::NoAttacker);
        }
        if w < b {
            return Err(SignatureError::NotCanonical);
        }

        // Equal attacker totals: the first differing attacker kind must
        // favor White, then defender totals, then defender kinds.
        let mut same_attackers = w == b;
        if same_attackers {
            for kind in [
                PieceKind::Rook,
                PieceKind::Cannon,
                PieceKind::Horse,
                PieceKind::Pawn,
            ] {
                let (cw, cb) = (self.count(Color::White, kind), self.count(Color::Black, kind));
                if cw != cb {
                    if cw < cb {
                        return Err(SignatureError::NotCanonical);
                    }
                    same_attackers = false;
                    break;
                }
            }
        }
        if same_attackers {
            let (dw, db) = (
                self.defender_count(Color::White),
                self.defender_count(Color::Black),
            );
            if dw < db {
                return Err(SignatureError::NotCanonical);
            }
            if dw == db {
                for kind in [PieceKind::Advisor, PieceKind::Elephant] {
                    let (cw, cb) =
                        (self.count(Color::White, kind), self.count(Color::Black, kind));
                    if cw != cb {
                        if cw < cb {
                            return Err(SignatureError::NotCanonical);
                        }
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// The lowercase name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Piece count for one side and kind.
    #[inline]
    pub fn count(&self, color: Color, kind: PieceKind) -> usize {
        self.counts[color.index()][kind.index()] as usize
    }

    /// Number of attacker pieces for one side.
    pub fn attacker_count(&self, color: Color) -> usize {
        PieceKind::ALL
            .into_iter()
            .filter(|k| k.is_attacker())
            .map(|k| self.count(color, k))
            .sum()
    }

    /// Number of defender pieces (advisors and elephants) for one side.
    pub fn defender_count(&self, color: Color) -> usize {
        self.count(color, PieceKind::Advisor) + self.count(color, PieceKind::Elephant)
    }

    /// Whether any side has a pawn. Decides the king-folding scheme.
    pub fn has_pawns(&self) -> bool {
        self.count(Color::White, PieceKind::Pawn) + self.count(Color::Black, PieceKind::Pawn) > 0
    }

    /// Whether both sides carry at least one attacker. Perpetual-check
    /// resolution only applies to both-armed material.
    pub fn is_both_armed(&self) -> bool {
        self.attacker_count(Color::White) > 0 && self.attacker_count(Color::Black) > 0
    }

    /// The name with the two halves swapped (`krkc` -> `kckr`).
    pub fn reversed_name(&self) -> String {
        let split = self.black_king_offset();
        format!("{}{}", &self.name[split..], &self.name[..split])
    }

    /// Whether the signature reads the same from both sides.
    pub fn is_symmetric(&self) -> bool {
        self.name == self.reversed_name()
    }

    /// Byte offset of the second king, i.e. where Black's half starts.
    fn black_king_offset(&self) -> usize {
        self.name[1..]
            .find('k')
            .map(|i| i + 1)
            .unwrap_or(self.name.len())
    }

    /// The non-king piece groups in index order: White's then Black's,
    /// each as `(color, kind, count)` runs in `a e r c h p` order.
    pub fn groups(&self) -> Vec<(Color, PieceKind, u8)> {
        let mut groups = Vec::new();
        for color in [Color::White, Color::Black] {
            for kind in PieceKind::ALL {
                if kind == PieceKind::King {
                    continue;
                }
                let count = self.counts[color.index()][kind.index()];
                if count > 0 {
                    groups.push((color, kind, count));
                }
            }
        }
        groups
    }

    /// Generation order: smaller endgames must be generated first. Ported
    /// comparison: attacker totals, attacker kinds, defender totals,
    /// defender kinds, White side weighted first.
    pub fn generation_cmp(&self, other: &MaterialSignature) -> Ordering {
        for color in [Color::White, Color::Black] {
            let ord = self.attacker_count(color).cmp(&other.attacker_count(color));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        for color in [Color::White, Color::Black] {
            for kind in [
                PieceKind::Rook,
                PieceKind::Cannon,
                PieceKind::Horse,
                PieceKind::Pawn,
            ] {
                let ord = self.count(color, kind).cmp(&other.count(color, kind));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
        for color in [Color::White, Color::Black] {
            let ord = self.defender_count(color).cmp(&other.defender_count(color));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        for color in [Color::White, Color::Black] {
            for kind in [PieceKind::Advisor, PieceKind::Elephant] {
                let ord = self.count(color, kind).cmp(&other.count(color, kind));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
        self.name.cmp(&other.name)
    }
}

impl FromStr for MaterialSignature {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<MaterialSignature, SignatureError> {
        MaterialSignature::parse_canonical(s)
    }
}

impl fmt::Display for MaterialSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::MaterialSignature;
    use crate::color::Color;
    use crate::piece::PieceKind;

    #[test]
    fn parse_and_counts() {
        let sig = MaterialSignature::parse_canonical("krpkaa").unwrap();
        assert_eq!(sig.count(Color::White, PieceKind::Rook), 1);
        assert_eq!(sig.count(Color::White, PieceKind::Pawn), 1);
        assert_eq!(sig.count(Color::Black, PieceKind::Advisor), 2);
        assert!(sig.has_pawns());
        assert!(!sig.is_both_armed());
    }

    #[test]
    fn canonical_requires_attacker_heavy_first() {
        assert!(MaterialSignature::parse_canonical("kkr").is_err());
        assert!(MaterialSignature::parse_canonical("krkrr").is_err());
        assert!(MaterialSignature::parse_canonical("kck").is_ok());
        // Equal attackers, the kind order breaks the tie: rook before cannon.
        assert!(MaterialSignature::parse_canonical("krkc").is_ok());
        assert!(MaterialSignature::parse_canonical("kckr").is_err());
    }

    #[test]
    fn bare_kings_are_rejected() {
        assert!(MaterialSignature::parse_canonical("kk").is_err());
    }

    #[test]
    fn reversed_name() {
        let sig = MaterialSignature::parse_canonical("krkaa").unwrap();
        assert_eq!(sig.reversed_name(), "kaakr");
        let sym = MaterialSignature::parse_canonical("krkr").unwrap();
        assert!(sym.is_symmetric());
    }

    #[test]
    fn groups_follow_signature_order() {
        let sig = MaterialSignature::parse_canonical("krpkaa").unwrap();
        let groups = sig.groups();
        assert_eq!(
            groups,
            vec![
                (Color::White, PieceKind::Rook, 1),
                (Color::White, PieceKind::Pawn, 1),
                (Color::Black, PieceKind::Advisor, 2),
            ]
        );
    }

    #[test]
    fn generation_order_puts_subgames_first() {
        let krk: MaterialSignature = "krk".parse().unwrap();
        let krkr: MaterialSignature = "krkr".parse().unwrap();
        assert!(krk.generation_cmp(&krkr).is_lt());
    }

    #[test]
    fn too_many_pieces() {
        assert!(MaterialSignature::parse("krrrk").is_err());
        assert!(MaterialSignature::parse("kppppk").is_ok());
        assert!(MaterialSignature::parse("kpppppk").is_err());
    }
}
