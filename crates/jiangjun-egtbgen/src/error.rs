//! Generator-side errors. These abort the current endgame build; the
//! driver exits nonzero and leaves checkpoints on disk for a retry.

use jiangjun_core::SignatureError;
use jiangjun_egtb::EgtbError;

/// Errors raised while generating, verifying or fixing a table.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    /// A sub-endgame needed during generation is not on disk.
    #[error("missing sub-endgame table '{name}'")]
    MissingSubEndgame {
        /// The signature that could not be resolved.
        name: String,
    },

    /// A sub-endgame still carries unresolved perpetual classes; it must
    /// be fixed before its parents can be numerised.
    #[error("sub-endgame '{name}' has unresolved perpetual classes")]
    SubEndgameNotFixed {
        /// The offending signature.
        name: String,
    },

    /// A score does not fit the one-byte cell range.
    #[error("score {score} overflows one-byte cells; regenerate with two-byte cells")]
    ScoreOverflow {
        /// The raw score value.
        score: i16,
    },

    /// The verify pass found a cell that disagrees with its children.
    #[error("verify failed for {name} at row {idx} side {side}: {detail}")]
    VerifyFailed {
        /// Signature name.
        name: String,
        /// Row index.
        idx: u64,
        /// Side index (0 black, 1 white).
        side: usize,
        /// What disagreed.
        detail: String,
    },

    /// A table-file layer error.
    #[error(transparent)]
    Egtb(#[from] EgtbError),

    /// A signature error.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// An I/O error.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying error.
        #[from]
        source: std::io::Error,
    },
}
