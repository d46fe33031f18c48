//! Table-file and database errors.
//!
//! Query-path failures never travel through these types: lookups report
//! through [`crate::Score`] sentinels. These errors cover loading,
//! parsing and writing table files.

use jiangjun_core::SignatureError;

/// Errors raised while loading, reading or writing table files.
#[derive(Debug, thiserror::Error)]
pub enum EgtbError {
    /// The file does not start with a known signature magic.
    #[error("unsupported table format: magic {magic}")]
    UnsupportedFormat {
        /// The magic value found at offset 0.
        magic: u16,
    },

    /// Header, block table or payload is inconsistent.
    #[error("corrupt table file: {detail}")]
    CorruptFile {
        /// What failed.
        detail: String,
    },

    /// The LZMA codec failed.
    #[error("compression error: {detail}")]
    Compression {
        /// The underlying codec message.
        detail: String,
    },

    /// The permutation order word does not describe a permutation of the
    /// signature's groups.
    #[error("invalid permutation order {order:#x}")]
    BadPermutationOrder {
        /// The offending order word.
        order: u32,
    },

    /// The material signature is unusable.
    #[error("invalid signature: {source}")]
    Signature {
        /// The underlying signature error.
        #[from]
        source: SignatureError,
    },

    /// An I/O error.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl From<xz2::stream::Error> for EgtbError {
    fn from(err: xz2::stream::Error) -> EgtbError {
        EgtbError::Compression {
            detail: err.to_string(),
        }
    }
}
