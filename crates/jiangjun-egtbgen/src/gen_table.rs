//! The in-memory table a generation job works on: two score slabs, the
//! flag bitmap, checkpointing, and final write-out.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use jiangjun_core::{Color, MaterialSignature};
use jiangjun_egtb::{
    BlockTable, IndexCodec, MATE, Score, TableFile, TableHeader, prop, rotating_checksum,
    score_to_cell, table_file_name,
};

use crate::buffer::{FlagBuf, ScoreBuf};
use crate::error::GenError;

/// How the final file is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressMode {
    /// Raw cells (`.xtb`).
    None,
    /// LZMA block compression (`.ztb`).
    Compress,
    /// LZMA with the illegal-run rewrite applied first.
    CompressOptimized,
}

const TMP_HEADER_SIZE: usize = 16;
const TMP_MAGIC_PLAIN: i16 = 2345;
const TMP_MAGIC_FLAGS: i16 = 2346;

/// One endgame under generation.
pub struct GenTable {
    sig: MaterialSignature,
    codec: IndexCodec,
    bufs: [ScoreBuf; 2],
    flags: FlagBuf,
    max_dtm: u8,
}

impl GenTable {
    /// Allocate the buffers for a signature.
    pub fn new(sig: &MaterialSignature, order: u32, two_bytes: bool) -> Result<GenTable, GenError> {
        let codec = IndexCodec::new(sig, order)?;
        let size = codec.size();
        Ok(GenTable {
            sig: sig.clone(),
            codec,
            bufs: [
                ScoreBuf::new(size as usize, two_bytes),
                ScoreBuf::new(size as usize, two_bytes),
            ],
            flags: FlagBuf::new(size),
            max_dtm: 0,
        })
    }

    /// Rebuild a generation table from a finished file (used by the
    /// perpetual fixing pass).
    pub fn from_table_file(file: &TableFile) -> Result<GenTable, GenError> {
        let sig = MaterialSignature::parse_canonical(file.name())?;
        if !file.ensure_loaded() {
            return Err(GenError::MissingSubEndgame {
                name: sig.name().to_string(),
            });
        }
        let order = file.codec().map(|c| c.order()).unwrap_or(0);
        let table = GenTable::new(&sig, order, true)?;
        for side in Color::ALL {
            for idx in 0..table.size() {
                let score = file.score_at(idx, side);
                if score == Score::Missing {
                    return Err(GenError::MissingSubEndgame {
                        name: sig.name().to_string(),
                    });
                }
                table.set_score(idx, side, score)?;
            }
        }
        Ok(table)
    }

    /// The signature.
    #[inline]
    pub fn signature(&self) -> &MaterialSignature {
        &self.sig
    }

    /// The index codec.
    #[inline]
    pub fn codec(&self) -> &IndexCodec {
        &self.codec
    }

    /// Rows per side.
    #[inline]
    pub fn size(&self) -> u64 {
        self.codec.size()
    }

    /// Whether cells are two bytes wide.
    #[inline]
    pub fn two_bytes(&self) -> bool {
        self.bufs[0].two_bytes()
    }

    /// The flag bitmap.
    #[inline]
    pub fn flags(&self) -> &FlagBuf {
        &self.flags
    }

    /// Read a cell.
    #[inline]
    pub fn score(&self, idx: u64, side: Color) -> Score {
        self.bufs[side.index()].get(idx)
    }

    /// Write a cell.
    #[inline]
    pub fn set_score(&self, idx: u64, side: Color, score: Score) -> Result<(), GenError> {
        self.bufs[side.index()].set(idx, score)
    }

    /// Informational maximum DTM, set by the finishing pass.
    #[inline]
    pub fn max_dtm(&self) -> u8 {
        self.max_dtm
    }

    /// Record the maximum DTM.
    pub fn set_max_dtm(&mut self, plies: u16) {
        self.max_dtm = plies.min(255) as u8;
    }

    /// Widen to two-byte cells (needed before numerising perpetual
    /// distances).
    pub fn widen_to_two_bytes(&mut self) -> Result<(), GenError> {
        if self.two_bytes() {
            return Ok(());
        }
        let size = self.size() as usize;
        for sd in 0..2 {
            let wide = ScoreBuf::new(size, true);
            for idx in 0..size as u64 {
                wide.set(idx, self.bufs[sd].get(idx))?;
            }
            self.bufs[sd] = wide;
        }
        debug!(name = %self.sig, "widened to two-byte cells");
        Ok(())
    }

    /// Narrow two-byte cells back to one byte when every score fits and
    /// no perpetual class is present. Returns whether the table narrowed.
    pub fn narrow_if_possible(&mut self) -> Result<bool, GenError> {
        if !self.two_bytes() {
            return Ok(false);
        }
        for sd in 0..2 {
            for idx in 0..self.size() {
                let score = self.bufs[sd].get(idx);
                let wide_only = matches!(score, Score::PerpetualDtm(_))
                    || score.is_perpetual_tag()
                    || score_to_cell(score).is_none();
                if wide_only {
                    debug!(name = %self.sig, "two-byte cells confirmed");
                    return Ok(false);
                }
            }
        }
        let size = self.size() as usize;
        for sd in 0..2 {
            let narrow = ScoreBuf::new(size, false);
            for idx in 0..size as u64 {
                narrow.set(idx, self.bufs[sd].get(idx))?;
            }
            self.bufs[sd] = narrow;
        }
        info!(name = %self.sig, "narrowed to one-byte cells");
        Ok(true)
    }

    // ── Checkpoints ──────────────────────────────────────────────────────

    fn tmp_path(&self, folder: &Path, side: Color) -> PathBuf {
        folder.join(format!("{}{}.tmt", self.sig.name(), side.side_char()))
    }

    fn flag_tmp_path(&self, folder: &Path) -> PathBuf {
        folder.join(format!("{}f.tmt", self.sig.name()))
    }

    /// Write the checkpoint trio: one file per side plus the flag bitmap.
    pub fn write_checkpoint(&self, folder: &Path, ply: i16, m_ply: i16) -> Result<(), GenError> {
        for (side, ply) in [(Color::Black, ply), (Color::White, m_ply)] {
            let payload = self.bufs[side.index()].to_bytes();
            write_tmp_file(&self.tmp_path(folder, side), TMP_MAGIC_FLAGS, ply, &payload)?;
        }
        let flag_payload = self.flags.to_bytes(self.size());
        write_tmp_file(&self.flag_tmp_path(folder), TMP_MAGIC_FLAGS, 0, &flag_payload)?;
        debug!(name = %self.sig, ply, "checkpoint written");
        Ok(())
    }

    /// Read the checkpoint trio back. `None` when any part is absent or
    /// fails its checksum — a corrupt checkpoint is logged and ignored.
    /// Side files with the plain magic come from a flag-less (forward)
    /// run and restore without a flag bitmap.
    pub fn read_checkpoint(&self, folder: &Path) -> Option<(i16, i16)> {
        let mut plies = [0i16; 2];
        let mut with_flags = true;
        for side in Color::ALL {
            let path = self.tmp_path(folder, side);
            let (magic, ply, payload) = match read_tmp_file(&path) {
                Ok(found) => found?,
                Err(err) => {
                    warn!(path = %path.display(), %err, "checkpoint discarded");
                    return None;
                }
            };
            if self.bufs[side.index()].load_bytes(&payload).is_err() {
                warn!(path = %path.display(), "checkpoint payload size mismatch, discarded");
                return None;
            }
            with_flags &= magic == TMP_MAGIC_FLAGS;
            plies[side.index()] = ply;
        }
        if !with_flags {
            self.flags.clear_all();
            return Some((plies[0], plies[1]));
        }
        let path = self.flag_tmp_path(folder);
        match read_tmp_file(&path) {
            Ok(Some((TMP_MAGIC_FLAGS, _, payload)))
                if payload.len() == FlagBuf::byte_len(self.size()) =>
            {
                self.flags.load_bytes(&payload);
            }
            Ok(_) => return None,
            Err(err) => {
                warn!(path = %path.display(), %err, "flag checkpoint discarded");
                return None;
            }
        }
        Some((plies[0], plies[1]))
    }

    /// Delete the checkpoint trio after a successful build.
    pub fn remove_checkpoint(&self, folder: &Path) {
        for side in Color::ALL {
            let _ = fs::remove_file(self.tmp_path(folder, side));
        }
        let _ = fs::remove_file(self.flag_tmp_path(folder));
    }

    // ── Write-out ────────────────────────────────────────────────────────

    /// Save one side to `folder`, returning the written path.
    pub fn save_side(
        &self,
        folder: &Path,
        side: Color,
        mode: CompressMode,
    ) -> Result<PathBuf, GenError> {
        let compressed = mode != CompressMode::None;
        let path = folder.join(table_file_name(self.sig.name(), side, compressed));

        let payload = if mode == CompressMode::CompressOptimized {
            self.optimized_payload(side)?
        } else {
            self.bufs[side.index()].to_bytes()
        };

        let mut header = TableHeader::new(self.sig.name());
        header.order = self.codec.order();
        header.max_dtm = self.max_dtm;
        header.set_only_side(side);
        if self.two_bytes() {
            header.property |= prop::TWO_BYTES;
        }
        if mode == CompressMode::CompressOptimized {
            header.property |= prop::COMPRESS_OPTIMIZED;
        }
        header.checksum = rotating_checksum(&payload) as u64;

        let mut out = File::create(&path)?;
        if compressed {
            header.property |= prop::COMPRESSED;
            let cell_bytes = if self.two_bytes() { 2 } else { 1 };
            let (table, comp) = BlockTable::compress_payload(&payload, cell_bytes)?;
            header.set_large_block_table(side, table.is_wide());
            out.write_all(&header.to_bytes())?;
            let mut table_bytes = Vec::with_capacity(table.byte_len());
            table.write_to(&mut table_bytes);
            out.write_all(&table_bytes)?;
            out.write_all(&comp)?;
        } else {
            out.write_all(&header.to_bytes())?;
            out.write_all(&payload)?;
        }
        info!(name = %self.sig, side = %side, path = %path.display(), "table side saved");
        Ok(path)
    }

    /// The payload with runs of `Illegal` cells rewritten to neighbouring
    /// scores so LZMA sees longer runs. The rewrite changes no answers:
    /// the index codec reports such rows as illegal before any lookup.
    fn optimized_payload(&self, side: Color) -> Result<Vec<u8>, GenError> {
        let size = self.size();
        let scratch = ScoreBuf::new(size as usize, self.two_bytes());
        let mut same_last = false;
        let mut last = Score::Draw;
        for idx in 0..size {
            let mut score = self.score(idx, side);
            if score == Score::Illegal {
                let mut keep = true;
                if !same_last && idx + 1 < size {
                    let next = self.score(idx + 1, side);
                    if next != Score::Illegal {
                        score = next;
                        keep = false;
                    }
                }
                if keep {
                    same_last = true;
                    score = last;
                }
            } else {
                same_last = last == score;
            }
            scratch.set(idx, score)?;
            last = score;
        }
        Ok(scratch.to_bytes())
    }

    // ── Permutations ─────────────────────────────────────────────────────

    /// Fill this table from a standard-order table by remapping each
    /// row's sub-keys through this codec's permutation.
    pub fn convert_permutations_from(&self, standard: &GenTable) -> Result<(), GenError> {
        debug_assert_eq!(standard.codec.order(), 0);
        debug_assert_eq!(self.size(), standard.size());
        for side in Color::ALL {
            for idx in 0..standard.size() {
                let subs = standard.codec.decompose(idx);
                let here = self.codec.compose(&subs);
                self.set_score(here, side, standard.score(idx, side))?;
            }
        }
        Ok(())
    }

    /// Compressed size of a representative slice, used to pick the best
    /// permutation order. Covers up to 100 blocks of both sides.
    pub fn sample_compressed_len(&self) -> Result<usize, GenError> {
        let cell_bytes = if self.two_bytes() { 2 } else { 1 };
        let sample_cells = (self.size() as usize).min(jiangjun_egtb::BLOCK_CELLS * 100);
        let mut total = 0;
        for sd in 0..2 {
            let payload = self.bufs[sd].to_bytes();
            let (_, comp) =
                BlockTable::compress_payload(&payload[..sample_cells * cell_bytes], cell_bytes)?;
            total += comp.len();
        }
        Ok(total)
    }

    // ── Stats ────────────────────────────────────────────────────────────

    /// Human-readable statistics written next to the table files.
    pub fn stats_string(&self) -> String {
        let mut valid = [0u64; 2];
        let mut wdl = [[0u64; 3]; 2];
        let mut smallest = MATE;
        for side in Color::ALL {
            for idx in 0..self.size() {
                match self.score(idx, side) {
                    Score::Illegal => {}
                    Score::Draw => {
                        valid[side.index()] += 1;
                        wdl[side.index()][1] += 1;
                    }
                    Score::Dtm(v) => {
                        valid[side.index()] += 1;
                        wdl[side.index()][if v > 0 { 0 } else { 2 }] += 1;
                        smallest = smallest.min(v.abs());
                    }
                    Score::PerpetualDtm(v) => {
                        valid[side.index()] += 1;
                        wdl[side.index()][if v > 0 { 0 } else { 2 }] += 1;
                    }
                    Score::PerpetualChecked => {
                        valid[side.index()] += 1;
                        wdl[side.index()][0] += 1;
                    }
                    Score::PerpetualEvasion => {
                        valid[side.index()] += 1;
                        wdl[side.index()][2] += 1;
                    }
                    Score::PerpetualCheckedEvasion => {
                        valid[side.index()] += 1;
                        wdl[side.index()][0] += 1;
                        wdl[side.index()][2] += 1;
                    }
                    _ => {
                        valid[side.index()] += 1;
                    }
                }
            }
        }
        let mut out = String::new();
        out.push_str(&format!("Name:\t\t\t{}\n", self.sig.name()));
        out.push_str(&format!("Total positions:\t{}\n", self.size()));
        let total = valid[0] + valid[1];
        out.push_str(&format!(
            "Legal positions:\t{} ({}%) (2 sides)\n",
            total,
            total * 50 / self.size().max(1)
        ));
        for side in [Color::White, Color::Black] {
            let v = valid[side.index()].max(1);
            let w = &wdl[side.index()];
            out.push_str(&format!(
                "{} to move,\twin: {}%, draw: {}%, loss: {}%\n",
                side,
                w[0] * 100 / v,
                w[1] * 100 / v,
                w[2] * 100 / v
            ));
        }
        out.push_str(&format!("Max distance to mate:\t{}\n", MATE - smallest));
        out
    }

    /// Write the stats file `<name>.txt` into `folder`.
    pub fn write_stats(&self, folder: &Path) -> Result<(), GenError> {
        let path = folder.join(format!("{}.txt", self.sig.name()));
        fs::write(path, self.stats_string())?;
        Ok(())
    }
}

fn write_tmp_file(path: &Path, magic: i16, ply: i16, payload: &[u8]) -> Result<(), GenError> {
    let mut header = [0u8; TMP_HEADER_SIZE];
    header[0..2].copy_from_slice(&magic.to_le_bytes());
    header[2..4].copy_from_slice(&ply.to_le_bytes());
    header[4..8].copy_from_slice(&rotating_checksum(payload).to_le_bytes());
    let mut file = File::create(path)?;
    file.write_all(&header)?;
    file.write_all(payload)?;
    Ok(())
}

/// Read one checkpoint file: `Ok(None)` when absent or stale, `Err` only
/// for I/O trouble worth logging.
fn read_tmp_file(path: &Path) -> Result<Option<(i16, i16, Vec<u8>)>, GenError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return Ok(None),
    };
    let mut header = [0u8; TMP_HEADER_SIZE];
    if file.read_exact(&mut header).is_err() {
        return Ok(None);
    }
    let magic = i16::from_le_bytes([header[0], header[1]]);
    let ply = i16::from_le_bytes([header[2], header[3]]);
    let checksum = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    if (magic != TMP_MAGIC_PLAIN && magic != TMP_MAGIC_FLAGS) || ply < 0 {
        return Ok(None);
    }
    let mut payload = Vec::new();
    file.read_to_end(&mut payload)?;
    if rotating_checksum(&payload) != checksum {
        warn!(path = %path.display(), "checkpoint checksum mismatch, ignored");
        return Ok(None);
    }
    Ok(Some((magic, ply, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, two: bool) -> GenTable {
        let sig = MaterialSignature::parse_canonical(name).unwrap();
        GenTable::new(&sig, 0, two).unwrap()
    }

    #[test]
    fn checkpoint_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let t = table("krk", false);
        t.set_score(10, Color::White, Score::Dtm(995)).unwrap();
        t.flags().set_cap(10, 1);
        t.write_checkpoint(dir.path(), 7, 9).unwrap();

        let back = table("krk", false);
        let plies = back.read_checkpoint(dir.path()).unwrap();
        assert_eq!(plies, (7, 9));
        assert_eq!(back.score(10, Color::White), Score::Dtm(995));
        assert!(back.flags().is_cap(10, 1));
    }

    #[test]
    fn corrupt_checkpoint_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let t = table("krk", false);
        t.write_checkpoint(dir.path(), 3, 3).unwrap();

        // Flip one payload byte of the white file.
        let path = dir.path().join("krkw.tmt");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let back = table("krk", false);
        assert!(back.read_checkpoint(dir.path()).is_none());
    }

    #[test]
    fn narrow_keeps_perpetual_tables_wide() {
        let mut t = table("krk", true);
        for idx in 0..t.size() {
            t.set_score(idx, Color::White, Score::Draw).unwrap();
            t.set_score(idx, Color::Black, Score::Draw).unwrap();
        }
        t.set_score(5, Color::White, Score::PerpetualChecked).unwrap();
        assert!(!t.narrow_if_possible().unwrap());

        t.set_score(5, Color::White, Score::Dtm(901)).unwrap();
        assert!(t.narrow_if_possible().unwrap());
        assert!(!t.two_bytes());
        assert_eq!(t.score(5, Color::White), Score::Dtm(901));
    }

    #[test]
    fn optimized_payload_rewrites_illegal_runs() {
        let t = table("krk", false);
        for idx in 0..t.size() {
            for side in Color::ALL {
                t.set_score(idx, side, Score::Illegal).unwrap();
            }
        }
        t.set_score(3, Color::White, Score::Dtm(999)).unwrap();
        let payload = t.optimized_payload(Color::White).unwrap();
        // Leading illegal cells collapse into one run; after the real
        // cell the run repeats its value.
        assert_eq!(cell_to_score_at(&payload, 2), Score::Draw);
        assert_eq!(cell_to_score_at(&payload, 3), Score::Dtm(999));
        assert_eq!(cell_to_score_at(&payload, 4), Score::Dtm(999));
        assert_eq!(cell_to_score_at(&payload, 5), Score::Dtm(999));
    }

    fn cell_to_score_at(payload: &[u8], idx: usize) -> Score {
        jiangjun_egtb::cell_to_score(payload[idx])
    }
}
