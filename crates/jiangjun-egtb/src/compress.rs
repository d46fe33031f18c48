//! LZMA block compression and the block offset table.
//!
//! Every 4096 cells form one block, compressed independently as an LZMA
//! stream with fixed five-byte props `5D 00 00 00 01` (lc=3, lp=0, pb=2,
//! 16 MiB dictionary). Blocks that fail to shrink are stored raw and
//! flagged with the table entry's top bit. Table entries hold the running
//! end offset of each block's payload, 4 bytes each, widened to 5 bytes
//! when the final offset outgrows 31 bits.

use std::io::Write;

use xz2::stream::{LzmaOptions, Stream};

use crate::error::EgtbError;

/// Logical cells per compressed block.
pub const BLOCK_CELLS: usize = 4096;

/// The fixed LZMA properties every block starts with.
pub const LZMA_PROPS: [u8; 5] = [0x5D, 0x00, 0x00, 0x00, 0x01];

const DICT_SIZE: u32 = 1 << 24;
const NARROW_FLAG: u64 = 1 << 31;
const WIDE_FLAG: u64 = 1 << 39;

fn lzma_options() -> Result<LzmaOptions, EgtbError> {
    let mut opts = LzmaOptions::new_preset(6)?;
    opts.dict_size(DICT_SIZE);
    opts.literal_context_bits(3);
    opts.literal_position_bits(0);
    opts.position_bits(2);
    Ok(opts)
}

/// Compress one block. The output is a complete LZMA stream beginning
/// with [`LZMA_PROPS`].
pub fn compress_block(raw: &[u8]) -> Result<Vec<u8>, EgtbError> {
    let stream = Stream::new_lzma_encoder(&lzma_options()?)?;
    let mut encoder = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
    encoder.write_all(raw)?;
    let out = encoder.finish()?;
    if out.len() < LZMA_PROPS.len() || out[..LZMA_PROPS.len()] != LZMA_PROPS {
        return Err(EgtbError::Compression {
            detail: "encoder produced unexpected props".to_string(),
        });
    }
    Ok(out)
}

/// Decompress one block into exactly `out_len` bytes.
pub fn decompress_block(comp: &[u8], out_len: usize) -> Result<Vec<u8>, EgtbError> {
    if comp.len() < LZMA_PROPS.len() || comp[..LZMA_PROPS.len()] != LZMA_PROPS {
        return Err(EgtbError::CorruptFile {
            detail: "compressed block has unexpected props".to_string(),
        });
    }
    let stream = Stream::new_lzma_decoder(u64::MAX)?;
    let mut decoder = xz2::write::XzDecoder::new_stream(Vec::with_capacity(out_len), stream);
    decoder.write_all(comp)?;
    let out = decoder.finish()?;
    if out.len() != out_len {
        return Err(EgtbError::CorruptFile {
            detail: format!("block decompressed to {} bytes, expected {out_len}", out.len()),
        });
    }
    Ok(out)
}

/// The per-side block offset table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTable {
    /// End offset per block, with the raw-stored flag folded in.
    entries: Vec<u64>,
    wide: bool,
}

impl BlockTable {
    /// Bytes covered by one block for the given cell width.
    #[inline]
    pub fn block_bytes(cell_bytes: usize) -> usize {
        BLOCK_CELLS * cell_bytes
    }

    /// Number of blocks covering `size` cells.
    #[inline]
    pub fn block_count(size: u64) -> usize {
        size.div_ceil(BLOCK_CELLS as u64) as usize
    }

    /// Whether entries are 5 bytes wide.
    #[inline]
    pub fn is_wide(&self) -> bool {
        self.wide
    }

    /// Number of blocks.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialized size in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.entries.len() * if self.wide { 5 } else { 4 }
    }

    /// `(start, len, stored_raw)` of one block's payload.
    pub fn span(&self, block: usize) -> (u64, u64, bool) {
        let flag = if self.wide { WIDE_FLAG } else { NARROW_FLAG };
        let end = self.entries[block] & !flag;
        let start = if block == 0 {
            0
        } else {
            self.entries[block - 1] & !flag
        };
        (start, end - start, self.entries[block] & flag != 0)
    }

    /// Total payload size.
    pub fn payload_len(&self) -> u64 {
        let flag = if self.wide { WIDE_FLAG } else { NARROW_FLAG };
        self.entries.last().map_or(0, |&e| e & !flag)
    }

    /// Compress a full payload block by block.
    pub fn compress_payload(
        payload: &[u8],
        cell_bytes: usize,
    ) -> Result<(BlockTable, Vec<u8>), EgtbError> {
        let block_bytes = BlockTable::block_bytes(cell_bytes);
        let mut raw_flags = Vec::new();
        let mut out = Vec::new();
        let mut ends = Vec::new();
        for chunk in payload.chunks(block_bytes) {
            let comp = compress_block(chunk)?;
            if comp.len() < chunk.len() {
                out.extend_from_slice(&comp);
                raw_flags.push(false);
            } else {
                out.extend_from_slice(chunk);
                raw_flags.push(true);
            }
            ends.push(out.len() as u64);
        }

        let wide = ends.last().is_some_and(|&e| e >= NARROW_FLAG);
        let flag = if wide { WIDE_FLAG } else { NARROW_FLAG };
        let entries = ends
            .into_iter()
            .zip(raw_flags)
            .map(|(end, raw)| if raw { end | flag } else { end })
            .collect();
        Ok((BlockTable { entries, wide }, out))
    }

    /// Decompress a full payload.
    pub fn decompress_payload(
        &self,
        src: &[u8],
        total_len: usize,
        cell_bytes: usize,
    ) -> Result<Vec<u8>, EgtbError> {
        let block_bytes = BlockTable::block_bytes(cell_bytes);
        let mut out = Vec::with_capacity(total_len);
        for block in 0..self.entries.len() {
            let (start, len, raw) = self.span(block);
            let chunk = src
                .get(start as usize..(start + len) as usize)
                .ok_or_else(|| EgtbError::CorruptFile {
                    detail: "block offset table exceeds payload".to_string(),
                })?;
            if raw {
                out.extend_from_slice(chunk);
            } else {
                let want = (total_len - out.len()).min(block_bytes);
                out.extend_from_slice(&decompress_block(chunk, want)?);
            }
        }
        if out.len() != total_len {
            return Err(EgtbError::CorruptFile {
                detail: format!("payload decompressed to {} bytes, expected {total_len}", out.len()),
            });
        }
        Ok(out)
    }

    /// Serialize the table.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for &entry in &self.entries {
            let bytes = entry.to_le_bytes();
            out.extend_from_slice(&bytes[..if self.wide { 5 } else { 4 }]);
        }
    }

    /// Parse a table of `blocks` entries.
    pub fn parse(bytes: &[u8], blocks: usize, wide: bool) -> Result<BlockTable, EgtbError> {
        let width = if wide { 5 } else { 4 };
        if bytes.len() < blocks * width {
            return Err(EgtbError::CorruptFile {
                detail: "short block offset table".to_string(),
            });
        }
        let mut entries = Vec::with_capacity(blocks);
        for i in 0..blocks {
            let mut buf = [0u8; 8];
            buf[..width].copy_from_slice(&bytes[i * width..(i + 1) * width]);
            entries.push(u64::from_le_bytes(buf));
        }
        Ok(BlockTable { entries, wide })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_round_trip() {
        let raw: Vec<u8> = (0..4096u32).map(|i| (i / 97) as u8).collect();
        let comp = compress_block(&raw).unwrap();
        assert_eq!(&comp[..5], &LZMA_PROPS);
        let back = decompress_block(&comp, raw.len()).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn payload_round_trip() {
        // Three and a half blocks of mixed content.
        let mut payload = vec![5u8; BLOCK_CELLS * 3 + 1000];
        for (i, byte) in payload.iter_mut().enumerate() {
            if i % 511 == 0 {
                *byte = (i % 251) as u8;
            }
        }
        let (table, comp) = BlockTable::compress_payload(&payload, 1).unwrap();
        assert_eq!(table.len(), 4);
        let back = table.decompress_payload(&comp, payload.len(), 1).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn incompressible_blocks_are_stored_raw() {
        // A pseudo-random block should not shrink.
        let mut state = 0x9E3779B97F4A7C15u64;
        let payload: Vec<u8> = (0..BLOCK_CELLS)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) as u8
            })
            .collect();
        let (table, comp) = BlockTable::compress_payload(&payload, 1).unwrap();
        let (_, len, raw) = table.span(0);
        if raw {
            assert_eq!(len as usize, payload.len());
            assert_eq!(comp, payload);
        }
        let back = table.decompress_payload(&comp, payload.len(), 1).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn table_serialization_round_trip() {
        let payload = vec![0u8; BLOCK_CELLS * 2];
        let (table, _) = BlockTable::compress_payload(&payload, 1).unwrap();
        let mut bytes = Vec::new();
        table.write_to(&mut bytes);
        let parsed = BlockTable::parse(&bytes, table.len(), table.is_wide()).unwrap();
        assert_eq!(parsed, table);
    }
}
