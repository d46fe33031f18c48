//! Core board types for the tablebase: the 9x10 board frame, the 8x8
//! endgame zone and its symmetries, forward and retrograde move
//! generation, and material signatures.

mod board;
mod color;
mod error;
mod fen;
mod moves;
mod movegen;
mod piece;
mod signature;
mod square;
pub mod zone;

pub use board::Board;
pub use color::Color;
pub use error::{BoardError, FenError, SignatureError};
pub use fen::{from_fen, to_fen};
pub use moves::{Move, MoveList, Undo};
pub use movegen::{generate_legal_moves, generate_moves, generate_retro_moves, has_legal_move};
pub use piece::{Piece, PieceKind};
pub use signature::MaterialSignature;
pub use square::Square;
pub use zone::Transform;
