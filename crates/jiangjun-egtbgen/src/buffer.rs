//! Shared generation buffers.
//!
//! Worker threads share the two per-side score slabs and the flag bitmap
//! read-write. All accesses are relaxed atomics: within a phase each row
//! is written either by its owning slice or through an idempotent
//! monotone improvement, and the fork-join barrier between phases
//! publishes everything.

use std::sync::atomic::{AtomicI16, AtomicU8, Ordering};

use jiangjun_egtb::{Score, cell_to_score, score_to_cell};

use crate::error::GenError;

/// One side's score slab, one or two bytes per cell.
pub enum ScoreBuf {
    One(Vec<AtomicU8>),
    Two(Vec<AtomicI16>),
}

impl ScoreBuf {
    /// A slab of `size` cells, all [`Score::Unset`].
    pub fn new(size: usize, two_bytes: bool) -> ScoreBuf {
        if two_bytes {
            ScoreBuf::Two(
                (0..size)
                    .map(|_| AtomicI16::new(Score::Unset.to_raw()))
                    .collect(),
            )
        } else {
            ScoreBuf::One(
                (0..size)
                    .map(|_| AtomicU8::new(score_to_cell(Score::Unset).unwrap_or(1)))
                    .collect(),
            )
        }
    }

    /// Whether cells are two bytes.
    #[inline]
    pub fn two_bytes(&self) -> bool {
        matches!(self, ScoreBuf::Two(_))
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        match self {
            ScoreBuf::One(v) => v.len(),
            ScoreBuf::Two(v) => v.len(),
        }
    }

    /// Whether the slab is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one cell.
    #[inline]
    pub fn get(&self, idx: u64) -> Score {
        match self {
            ScoreBuf::One(v) => cell_to_score(v[idx as usize].load(Ordering::Relaxed)),
            ScoreBuf::Two(v) => Score::from_raw(v[idx as usize].load(Ordering::Relaxed)),
        }
    }

    /// Write one cell. In one-byte mode a score outside the cell range
    /// aborts the build with [`GenError::ScoreOverflow`].
    #[inline]
    pub fn set(&self, idx: u64, score: Score) -> Result<(), GenError> {
        match self {
            ScoreBuf::One(v) => {
                let cell = score_to_cell(score).ok_or(GenError::ScoreOverflow {
                    score: score.to_raw(),
                })?;
                v[idx as usize].store(cell, Ordering::Relaxed);
            }
            ScoreBuf::Two(v) => v[idx as usize].store(score.to_raw(), Ordering::Relaxed),
        }
        Ok(())
    }

    /// Snapshot the slab as raw little-endian bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ScoreBuf::One(v) => v.iter().map(|c| c.load(Ordering::Relaxed)).collect(),
            ScoreBuf::Two(v) => v
                .iter()
                .flat_map(|c| c.load(Ordering::Relaxed).to_le_bytes())
                .collect(),
        }
    }

    /// Restore the slab from raw bytes (checkpoint resume).
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<(), GenError> {
        let want = self.len() * if self.two_bytes() { 2 } else { 1 };
        if bytes.len() != want {
            return Err(GenError::Egtb(jiangjun_egtb::EgtbError::CorruptFile {
                detail: format!("checkpoint payload is {} bytes, expected {want}", bytes.len()),
            }));
        }
        match self {
            ScoreBuf::One(v) => {
                for (cell, &byte) in v.iter().zip(bytes) {
                    cell.store(byte, Ordering::Relaxed);
                }
            }
            ScoreBuf::Two(v) => {
                for (cell, pair) in v.iter().zip(bytes.chunks_exact(2)) {
                    cell.store(i16::from_le_bytes([pair[0], pair[1]]), Ordering::Relaxed);
                }
            }
        }
        Ok(())
    }
}

/// The flag bitmap: two bits per (row, side) — a per-side work flag and a
/// has-capture flag — packed two rows per byte.
pub struct FlagBuf {
    bytes: Vec<AtomicU8>,
}

impl FlagBuf {
    /// Bitmap for `size` rows.
    pub fn new(size: u64) -> FlagBuf {
        FlagBuf {
            bytes: (0..size.div_ceil(2) + 8).map(|_| AtomicU8::new(0)).collect(),
        }
    }

    /// Serialized length in bytes for `size` rows.
    pub fn byte_len(size: u64) -> usize {
        (size as usize + 1) / 2
    }

    #[inline]
    fn side_bit(idx: u64, sd: usize) -> u8 {
        1 << (sd + if idx & 1 != 0 { 4 } else { 0 })
    }

    #[inline]
    fn cap_bit(idx: u64, sd: usize) -> u8 {
        1 << (sd + 2 + if idx & 1 != 0 { 4 } else { 0 })
    }

    /// Set the per-side work flag.
    #[inline]
    pub fn set_side(&self, idx: u64, sd: usize) {
        self.bytes[(idx >> 1) as usize].fetch_or(Self::side_bit(idx, sd), Ordering::Relaxed);
    }

    /// Clear the per-side work flag.
    #[inline]
    pub fn clear_side(&self, idx: u64, sd: usize) {
        self.bytes[(idx >> 1) as usize].fetch_and(!Self::side_bit(idx, sd), Ordering::Relaxed);
    }

    /// Read the per-side work flag.
    #[inline]
    pub fn is_side(&self, idx: u64, sd: usize) -> bool {
        self.bytes[(idx >> 1) as usize].load(Ordering::Relaxed) & Self::side_bit(idx, sd) != 0
    }

    /// Set the has-capture flag.
    #[inline]
    pub fn set_cap(&self, idx: u64, sd: usize) {
        self.bytes[(idx >> 1) as usize].fetch_or(Self::cap_bit(idx, sd), Ordering::Relaxed);
    }

    /// Clear the has-capture flag.
    #[inline]
    pub fn clear_cap(&self, idx: u64, sd: usize) {
        self.bytes[(idx >> 1) as usize].fetch_and(!Self::cap_bit(idx, sd), Ordering::Relaxed);
    }

    /// Read the has-capture flag.
    #[inline]
    pub fn is_cap(&self, idx: u64, sd: usize) -> bool {
        self.bytes[(idx >> 1) as usize].load(Ordering::Relaxed) & Self::cap_bit(idx, sd) != 0
    }

    /// Clear every flag.
    pub fn clear_all(&self) {
        for byte in &self.bytes {
            byte.store(0, Ordering::Relaxed);
        }
    }

    /// Clear only the per-side work flags, keeping the capture flags.
    pub fn clear_side_flags(&self) {
        for byte in &self.bytes {
            byte.fetch_and(!0b0011_0011, Ordering::Relaxed);
        }
    }

    /// Snapshot the bitmap for a checkpoint of `size` rows.
    pub fn to_bytes(&self, size: u64) -> Vec<u8> {
        self.bytes[..Self::byte_len(size)]
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    /// Restore the bitmap from checkpoint bytes.
    pub fn load_bytes(&self, bytes: &[u8]) {
        for (slot, &byte) in self.bytes.iter().zip(bytes) {
            slot.store(byte, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_buf_round_trip() {
        for two in [false, true] {
            let buf = ScoreBuf::new(16, two);
            assert_eq!(buf.get(3), Score::Unset);
            buf.set(3, Score::Dtm(995)).unwrap();
            buf.set(4, Score::Draw).unwrap();
            assert_eq!(buf.get(3), Score::Dtm(995));
            assert_eq!(buf.get(4), Score::Draw);

            let bytes = buf.to_bytes();
            let other = ScoreBuf::new(16, two);
            other.load_bytes(&bytes).unwrap();
            assert_eq!(other.get(3), Score::Dtm(995));
        }
    }

    #[test]
    fn one_byte_overflow_is_an_error() {
        let buf = ScoreBuf::new(4, false);
        assert!(buf.set(0, Score::PerpetualDtm(1600)).is_err());
        let wide = ScoreBuf::new(4, true);
        assert!(wide.set(0, Score::PerpetualDtm(1600)).is_ok());
    }

    #[test]
    fn flags_are_independent_per_row_and_side() {
        let flags = FlagBuf::new(10);
        flags.set_side(4, 0);
        flags.set_cap(4, 1);
        flags.set_side(5, 1);
        assert!(flags.is_side(4, 0));
        assert!(!flags.is_side(4, 1));
        assert!(flags.is_cap(4, 1));
        assert!(!flags.is_cap(4, 0));
        assert!(flags.is_side(5, 1));

        flags.clear_side_flags();
        assert!(!flags.is_side(4, 0));
        assert!(!flags.is_side(5, 1));
        assert!(flags.is_cap(4, 1));

        flags.clear_all();
        assert!(!flags.is_cap(4, 1));
    }
}
