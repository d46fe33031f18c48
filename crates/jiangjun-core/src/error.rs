//! Error types for board validation, FEN parsing and material signatures.

/// Errors from structural board validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// A side does not have exactly one king.
    #[error("{color} must have exactly one king, found {count}")]
    InvalidKingCount {
        /// Side name.
        color: &'static str,
        /// Number of kings found.
        count: usize,
    },

    /// A side carries more pieces of one kind than the rules allow.
    #[error("too many '{kind}' pieces for {color}: {count}")]
    TooManyPieces {
        /// Signature letter of the kind.
        kind: char,
        /// Side name.
        color: &'static str,
        /// Number found.
        count: usize,
    },

    /// A piece stands outside the playable zone.
    #[error("piece on {square} is outside the endgame zone")]
    PieceOutsideZone {
        /// Offending square, printed in coordinate form.
        square: String,
    },

    /// A pawn stands on a row pawns can never reach.
    #[error("pawn on {square} is outside the pawn zone")]
    PawnOutsideZone {
        /// Offending square, printed in coordinate form.
        square: String,
    },
}

/// Errors from FEN parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FenError {
    /// The FEN does not have a placement field and a side field.
    #[error("FEN must have piece placement and side to move")]
    MissingField,

    /// The placement field does not describe exactly 10 ranks.
    #[error("expected 10 ranks, found {found}")]
    WrongRankCount {
        /// Number of ranks found.
        found: usize,
    },

    /// A rank describes more or fewer than 9 files.
    #[error("rank {rank} describes {length} files")]
    BadRankLength {
        /// Zero-based rank index.
        rank: usize,
        /// Number of files described.
        length: usize,
    },

    /// An unrecognized character in the placement field.
    #[error("invalid piece character '{character}'")]
    InvalidPieceChar {
        /// The invalid character.
        character: char,
    },

    /// The side field is not `w` or `b`.
    #[error("invalid side to move: {found}")]
    InvalidSide {
        /// The invalid side string.
        found: String,
    },

    /// The parsed board fails structural validation.
    #[error("invalid board: {source}")]
    InvalidBoard {
        /// The underlying validation error.
        #[from]
        source: BoardError,
    },
}

/// Errors from material-signature parsing and validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// A character is not one of `k a e r c h p`.
    #[error("invalid piece letter '{character}' in signature")]
    InvalidLetter {
        /// The invalid character.
        character: char,
    },

    /// The signature does not contain exactly one king per side.
    #[error("signature must contain exactly one king per side")]
    BadKingCount,

    /// The signature must open with the first side's king.
    #[error("signature must start with 'k'")]
    MissingLeadingKing,

    /// A side carries more pieces of one kind than the index supports.
    #[error("too many '{kind}' pieces in signature")]
    TooManyPieces {
        /// Signature letter of the kind.
        kind: char,
    },

    /// The first half must be the attacker-heavy side.
    #[error("signature is not in canonical attacker-first order")]
    NotCanonical,

    /// The attacker side has no attacking piece at all.
    #[error("signature has no attacking piece")]
    NoAttacker,
}
