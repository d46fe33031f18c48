//! The tablebase generator: retrograde and forward DTM solvers, the
//! perpetual check/chase resolution pass, checkpointing, verification
//! and write-out.

mod buffer;
mod error;
mod gen_table;
mod generator;
mod names;
mod perpetual;
mod verify;

pub use buffer::{FlagBuf, ScoreBuf};
pub use error::GenError;
pub use gen_table::{CompressMode, GenTable};
pub use generator::{GenOptions, Generator};
pub use names::expand_with_subs;
pub use perpetual::resolve as resolve_perpetual;
pub use verify::{verify_file, verify_keys};
