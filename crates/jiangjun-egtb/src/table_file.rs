//! One endgame's two per-side tables, backed by up to two physical files.
//!
//! A table file is addressed by signature name; the black-to-move and
//! white-to-move payloads live in separate files discovered in any order
//! and merged into one logical table. Payloads are either materialised in
//! RAM (`All`) or decompressed one block at a time (`Tiny`), serialised by
//! one mutex per (file, side).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::{debug, warn};

use jiangjun_core::{Board, Color, MaterialSignature};

use crate::compress::{BLOCK_CELLS, BlockTable};
use crate::error::EgtbError;
use crate::filename;
use crate::header::{HEADER_SIZE, TableHeader, rotating_checksum};
use crate::index::{IndexCodec, IndexError, KeyRec};
use crate::score::{Score, cell_to_score};

/// How much of a table to keep in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemMode {
    /// Header and block table only; one block decompressed per query.
    Tiny,
    /// Whole payload decompressed at load time.
    All,
    /// `All` below 10 MiB, `Tiny` above.
    Smart,
}

/// When to read the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Read header and (per mem mode) payload immediately.
    LoadNow,
    /// Defer reading until the first query.
    OnRequest,
}

const SMART_THRESHOLD: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadStatus {
    None,
    Loaded,
    Error,
}

struct LoadedMeta {
    header: TableHeader,
    codec: IndexCodec,
}

struct SideData {
    path: Option<PathBuf>,
    block_table: Option<BlockTable>,
    checksum: u64,
    buf: Vec<u8>,
    start_cell: u64,
    end_cell: u64,
}

impl SideData {
    fn new() -> SideData {
        SideData {
            path: None,
            block_table: None,
            checksum: 0,
            buf: Vec::new(),
            start_cell: 0,
            end_cell: 0,
        }
    }
}

/// One signature's table, possibly covering both sides.
pub struct TableFile {
    name: String,
    size: u64,
    mem_mode: MemMode,
    loaded: OnceLock<LoadedMeta>,
    load_lock: Mutex<LoadStatus>,
    sides: [Mutex<SideData>; 2],
}

impl TableFile {
    /// Register a physical file. With [`LoadMode::OnRequest`] only the
    /// name is parsed; the file is opened on the first query.
    pub fn preload(path: &Path, mem_mode: MemMode, load_mode: LoadMode) -> Result<TableFile, EgtbError> {
        let (name, side) = filename::parse_table_path(path).ok_or_else(|| EgtbError::CorruptFile {
            detail: format!("unrecognised table file name: {}", path.display()),
        })?;
        let sig = MaterialSignature::parse_canonical(&name)?;
        let size = IndexCodec::new(&sig, 0)?.size();

        let mem_mode = match mem_mode {
            MemMode::Smart if size < SMART_THRESHOLD => MemMode::All,
            MemMode::Smart => MemMode::Tiny,
            other => other,
        };

        let file = TableFile {
            name,
            size,
            mem_mode,
            loaded: OnceLock::new(),
            load_lock: Mutex::new(LoadStatus::None),
            sides: [Mutex::new(SideData::new()), Mutex::new(SideData::new())],
        };
        file.sides[side.index()]
            .lock()
            .expect("fresh lock")
            .path = Some(path.to_path_buf());

        if load_mode == LoadMode::LoadNow && !file.ensure_loaded() {
            return Err(EgtbError::CorruptFile {
                detail: format!("cannot load {}", path.display()),
            });
        }
        Ok(file)
    }

    /// The signature name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows per side.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether a payload for `side` is known.
    pub fn has_side(&self, side: Color) -> bool {
        self.sides[side.index()]
            .lock()
            .expect("side lock")
            .path
            .is_some()
    }

    /// Adopt the partner file for a side discovered later.
    pub fn merge(&mut self, mut other: TableFile) {
        for sd in 0..2 {
            let theirs = other.sides[sd].get_mut().expect("side lock");
            let ours = self.sides[sd].get_mut().expect("side lock");
            if ours.path.is_none() && theirs.path.is_some() {
                *ours = std::mem::replace(theirs, SideData::new());
            }
        }
    }

    /// Canonical key of a board, once the header is available.
    pub fn key_of(&self, board: &Board) -> Result<KeyRec, IndexError> {
        if !self.ensure_loaded() {
            return Err(IndexError::WrongMaterial);
        }
        let meta = self.loaded.get().expect("loaded after ensure_loaded");
        meta.codec.index_of(board)
    }

    /// The codec, once loaded.
    pub fn codec(&self) -> Option<&IndexCodec> {
        self.loaded.get().map(|meta| &meta.codec)
    }

    /// Lazy load of header, block tables and (in `All` mode) payloads.
    /// Returns whether the table is usable.
    pub fn ensure_loaded(&self) -> bool {
        let mut status = self.load_lock.lock().expect("load lock");
        match *status {
            LoadStatus::Loaded => return true,
            LoadStatus::Error => return false,
            LoadStatus::None => {}
        }

        let mut ok = true;
        for side in Color::ALL {
            let path = self.sides[side.index()]
                .lock()
                .expect("side lock")
                .path
                .clone();
            if let Some(path) = path {
                if let Err(err) = self.load_side(side, &path) {
                    warn!(name = %self.name, side = %side, %err, "cannot load table file");
                    ok = false;
                }
            }
        }
        *status = if ok { LoadStatus::Loaded } else { LoadStatus::Error };
        ok
    }

    fn load_side(&self, side: Color, path: &Path) -> Result<(), EgtbError> {
        let mut file = File::open(path)?;
        let mut header_bytes = [0u8; HEADER_SIZE];
        file.read_exact(&mut header_bytes)?;
        let header = TableHeader::parse(&header_bytes)?;
        if header.name != self.name {
            return Err(EgtbError::CorruptFile {
                detail: format!(
                    "header name '{}' does not match file name '{}'",
                    header.name, self.name
                ),
            });
        }

        if self.loaded.get().is_none() {
            let sig = MaterialSignature::parse_canonical(&self.name)?;
            let codec = IndexCodec::new(&sig, header.order)?;
            let _ = self.loaded.set(LoadedMeta {
                header: header.clone(),
                codec,
            });
        }
        let meta = self.loaded.get().expect("meta just set");

        let mut data = self.sides[side.index()].lock().expect("side lock");
        data.checksum = header.checksum;

        let block_table = if header.is_compressed() {
            let blocks = BlockTable::block_count(self.size);
            let wide = header.large_block_table(side);
            let width = if wide { 5 } else { 4 };
            let mut bytes = vec![0u8; blocks * width];
            file.read_exact(&mut bytes)?;
            Some(BlockTable::parse(&bytes, blocks, wide)?)
        } else {
            None
        };

        if self.mem_mode == MemMode::All {
            let payload_len = self.size as usize * meta.header.cell_bytes();
            let payload = match &block_table {
                Some(table) => {
                    let mut comp = vec![0u8; table.payload_len() as usize];
                    file.read_exact(&mut comp)?;
                    table.decompress_payload(&comp, payload_len, meta.header.cell_bytes())?
                }
                None => {
                    let mut raw = vec![0u8; payload_len];
                    file.read_exact(&mut raw)?;
                    raw
                }
            };
            let sum = rotating_checksum(&payload) as u64;
            if sum != data.checksum {
                return Err(EgtbError::CorruptFile {
                    detail: format!(
                        "payload checksum mismatch for side {side}: {sum:#x} != {:#x}",
                        data.checksum
                    ),
                });
            }
            data.buf = payload;
            data.start_cell = 0;
            data.end_cell = self.size;
            data.block_table = None;
        } else {
            data.block_table = block_table;
            data.buf.clear();
            data.start_cell = 0;
            data.end_cell = 0;
        }

        debug!(name = %self.name, side = %side, size = self.size, "table side loaded");
        Ok(())
    }

    /// Score of a row for one side to move. I/O failures surface as
    /// [`Score::Missing`], never as panics or errors.
    pub fn score_at(&self, idx: u64, side: Color) -> Score {
        if !self.ensure_loaded() {
            return Score::Missing;
        }
        if idx >= self.size {
            return Score::Missing;
        }
        let meta = self.loaded.get().expect("loaded");
        let cell_bytes = meta.header.cell_bytes();

        let mut data = self.sides[side.index()].lock().expect("side lock");
        if data.path.is_none() {
            return Score::Missing;
        }
        if !(data.start_cell..data.end_cell).contains(&idx) {
            if let Err(err) = self.read_window(&mut data, idx, meta) {
                warn!(name = %self.name, side = %side, idx, %err, "table read failed");
                return Score::Missing;
            }
        }
        let offset = (idx - data.start_cell) as usize * cell_bytes;
        if cell_bytes == 2 {
            let raw = i16::from_le_bytes([data.buf[offset], data.buf[offset + 1]]);
            Score::from_raw(raw)
        } else {
            cell_to_score(data.buf[offset])
        }
    }

    fn read_window(&self, data: &mut SideData, idx: u64, meta: &LoadedMeta) -> Result<(), EgtbError> {
        let path = data.path.clone().ok_or_else(|| EgtbError::CorruptFile {
            detail: "no path for side".to_string(),
        })?;
        let cell_bytes = meta.header.cell_bytes();
        let mut file = File::open(&path)?;

        let block = (idx / BLOCK_CELLS as u64) as usize;
        let first_cell = block as u64 * BLOCK_CELLS as u64;
        let cells = (self.size - first_cell).min(BLOCK_CELLS as u64);

        if let Some(span) = data.block_table.as_ref().map(|t| (t.span(block), t.byte_len())) {
            let ((start, len, raw), table_bytes) = span;
            file.seek(SeekFrom::Start(
                HEADER_SIZE as u64 + table_bytes as u64 + start,
            ))?;
            let mut comp = vec![0u8; len as usize];
            file.read_exact(&mut comp)?;
            data.buf = if raw {
                comp
            } else {
                crate::compress::decompress_block(&comp, cells as usize * cell_bytes)?
            };
        } else {
            file.seek(SeekFrom::Start(
                HEADER_SIZE as u64 + first_cell * cell_bytes as u64,
            ))?;
            let mut raw = vec![0u8; cells as usize * cell_bytes];
            file.read_exact(&mut raw)?;
            data.buf = raw;
        }
        data.start_cell = first_cell;
        data.end_cell = first_cell + cells;
        Ok(())
    }

    /// Drop payload buffers and block tables, keeping paths. The next
    /// query reloads from disk.
    pub fn release_buffers(&self) {
        for side in Color::ALL {
            let mut data = self.sides[side.index()].lock().expect("side lock");
            data.buf = Vec::new();
            data.block_table = None;
            data.start_cell = 0;
            data.end_cell = 0;
        }
        *self.load_lock.lock().expect("load lock") = LoadStatus::None;
    }
}
