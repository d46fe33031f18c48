//! Query side of the tablebase: score model, positional index, LZMA
//! block compression, the on-disk table format, and the database with
//! its probing surface.

mod compress;
mod database;
mod error;
mod filename;
mod header;
pub mod index;
mod score;
mod table_file;

pub use compress::{BLOCK_CELLS, BlockTable, LZMA_PROPS, compress_block, decompress_block};
pub use database::Database;
pub use error::EgtbError;
pub use filename::{
    EXT_DTM, EXT_DTM_COMPRESSED, EXT_LOOKUP, EXT_LOOKUP_COMPRESSED, is_lookup_path, is_table_path,
    parse_table_path, subfolders, table_file_name, table_path,
};
pub use header::{COPYRIGHT, HEADER_SIZE, MAGIC_DTM, TableHeader, prop, rotating_checksum};
pub use index::{IndexCodec, IndexError, KeyRec, KingScheme};
pub use score::{
    CELL_DRAW, CELL_ILLEGAL, CELL_LOSING_START, CELL_MATING_START, CELL_MISSING,
    CELL_PERPETUAL_CHECKED, CELL_PERPETUAL_CHECKED_EVASION, CELL_PERPETUAL_EVASION, CELL_UNKNOWN,
    CELL_UNSET, CELL_WINNING, MATE, PERPETUAL_END, PERPETUAL_MATE, RAW_ILLEGAL, RAW_MISSING,
    RAW_PERPETUAL_CHECKED, RAW_PERPETUAL_CHECKED_EVASION, RAW_PERPETUAL_EVASION, RAW_UNKNOWN,
    RAW_UNSET, RAW_WINNING, Score, cell_to_score, score_to_cell,
};
pub use table_file::{LoadMode, MemMode, TableFile};
