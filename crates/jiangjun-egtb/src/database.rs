//! The table registry and the query surface: score lookup with the
//! one-ply fallback, and best-line probing.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use jiangjun_core::{Board, Color, Move, MoveList, generate_moves};

use crate::error::EgtbError;
use crate::filename;
use crate::index::IndexError;
use crate::score::{MATE, Score};
use crate::table_file::{LoadMode, MemMode, TableFile};

/// Name-keyed registry of table files, with reversed-name aliases so
/// color-swapped queries resolve to the same file.
pub struct Database {
    files: Vec<Arc<TableFile>>,
    by_name: HashMap<String, Arc<TableFile>>,
    mem_mode: MemMode,
}

impl Database {
    /// An empty database.
    pub fn new(mem_mode: MemMode) -> Database {
        Database {
            files: Vec::new(),
            by_name: HashMap::new(),
            mem_mode,
        }
    }

    /// Scan folders recursively and register every table file found.
    /// Sides of the same signature merge regardless of discovery order.
    pub fn load(&mut self, paths: &[PathBuf], load_mode: LoadMode) -> Result<(), EgtbError> {
        let mut discovered: HashMap<String, TableFile> = HashMap::new();
        for root in paths {
            let mut files = Vec::new();
            scan_folder(root, &mut files)?;
            for path in files {
                match TableFile::preload(&path, self.mem_mode, load_mode) {
                    Ok(file) => match discovered.entry(file.name().to_string()) {
                        Entry::Occupied(mut existing) => existing.get_mut().merge(file),
                        Entry::Vacant(slot) => {
                            slot.insert(file);
                        }
                    },
                    Err(err) => {
                        warn!(path = %path.display(), %err, "skipping table file");
                    }
                }
            }
        }

        for (_, file) in discovered {
            self.add(file);
        }
        debug!(tables = self.files.len(), "database loaded");
        Ok(())
    }

    /// Register the physical files of one signature (both sides merged).
    /// Used by the generator right after writing a table out.
    pub fn add_files(&mut self, paths: &[PathBuf], load_mode: LoadMode) -> Result<(), EgtbError> {
        let mut merged: Option<TableFile> = None;
        for path in paths {
            let file = TableFile::preload(path, self.mem_mode, load_mode)?;
            match &mut merged {
                Some(existing) => existing.merge(file),
                None => merged = Some(file),
            }
        }
        if let Some(file) = merged {
            self.add(file);
        }
        Ok(())
    }

    /// Drop a table (both name aliases), e.g. before re-registering a
    /// rewritten file.
    pub fn close_name(&mut self, name: &str) {
        if let Some(file) = self.by_name.remove(name) {
            self.by_name.remove(&reversed_name(name));
            self.files.retain(|f| !Arc::ptr_eq(f, &file));
        }
    }

    /// Register one table, aliasing its reversed name.
    pub fn add(&mut self, file: TableFile) {
        let file = Arc::new(file);
        let name = file.name().to_string();
        let reversed = reversed_name(&name);
        self.by_name.insert(name, Arc::clone(&file));
        self.by_name.insert(reversed, Arc::clone(&file));
        self.files.push(file);
    }

    /// Look a table up by signature name (either orientation).
    pub fn get(&self, name: &str) -> Option<&Arc<TableFile>> {
        self.by_name.get(name)
    }

    /// Number of registered tables.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the database is empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Release all payload buffers and registrations.
    pub fn close(&mut self) {
        for file in &self.files {
            file.release_buffers();
        }
        self.files.clear();
        self.by_name.clear();
    }

    /// Perfect-play score of a position for its side to move. Failures
    /// surface as sentinel scores, never as errors.
    pub fn score(&self, board: &Board) -> Score {
        self.score_for(board, board.side_to_move())
    }

    /// Perfect-play score for an explicit side to move.
    pub fn score_for(&self, board: &Board, side: Color) -> Score {
        let name = board.material_name();
        let Some(file) = self.by_name.get(&name) else {
            return Score::Missing;
        };
        let rec = match file.key_of(board) {
            Ok(rec) => rec,
            Err(IndexError::IllegalKings) => return Score::Illegal,
            Err(IndexError::WrongMaterial) => return Score::Missing,
        };
        let query_side = if rec.flip_side { side.opponent() } else { side };
        if file.has_side(query_side) {
            return file.score_at(rec.key, query_side);
        }
        // Only one physical side on disk: answer through the children.
        self.score_one_ply(board, side)
    }

    /// One-ply fallback: combine `max(-child)` over the legal moves, with
    /// the DTM stepped one ply away from the mate. A missing sub-endgame
    /// surfaces as [`Score::Missing`], never as a wrong score.
    fn score_one_ply(&self, board: &Board, side: Color) -> Score {
        let mut work = board.clone();
        let mut moves = MoveList::new();
        generate_moves(&work, side, &mut moves);

        let mut best = -MATE;
        let mut legal = 0;
        for mv in moves.iter() {
            let undo = work.make(mv);
            if !work.in_check(side) {
                legal += 1;
                let mut child = self.score_for(&work, side.opponent());
                if child == Score::Missing {
                    if undo.captured.is_some()
                        && work.attacker_count(Color::White) + work.attacker_count(Color::Black)
                            == 0
                    {
                        child = Score::Draw;
                    } else {
                        work.unmake(mv, undo);
                        return Score::Missing;
                    }
                }
                let raw = child.to_raw();
                if raw.abs() <= MATE {
                    best = best.max(-raw);
                }
            }
            work.unmake(mv, undo);
        }

        if legal == 0 {
            // No move at all loses, mated or stalemated alike.
            return Score::Dtm(-MATE);
        }
        if best != 0 {
            best += if best > 0 { -1 } else { 1 };
        }
        Score::from_raw(best)
    }

    /// Best-line reconstruction: pick the maximising move at every step
    /// and follow it until mate or draw. A missing sub-endgame surfaces
    /// as [`Score::Missing`], never as a wrong score.
    pub fn probe(&self, board: &Board) -> (Score, Vec<Move>) {
        let mut line = Vec::new();
        let mut work = board.clone();
        let score = self.probe_into(&mut work, &mut line);
        (score, line)
    }

    fn probe_into(&self, board: &mut Board, line: &mut Vec<Move>) -> Score {
        let side = board.side_to_move();
        let mut moves = MoveList::new();
        generate_moves(board, side, &mut moves);

        let mut best = -MATE;
        let mut best_move: Option<Move> = None;
        let mut legal = 0;
        for mv in moves.iter() {
            let undo = board.make(mv);
            if !board.in_check(side) {
                legal += 1;
                let mut child = self.score_for(board, side.opponent());
                if child == Score::Missing {
                    if undo.captured.is_some()
                        && board.attacker_count(Color::White) + board.attacker_count(Color::Black)
                            == 0
                    {
                        child = Score::Draw;
                    } else {
                        board.unmake(mv, undo);
                        return Score::Missing;
                    }
                }
                let raw = child.to_raw();
                if raw.abs() <= MATE {
                    let value = -raw;
                    if best_move.is_none() || value > best {
                        best = value;
                        best_move = Some(mv);
                        if value == MATE {
                            board.unmake(mv, undo);
                            break;
                        }
                    }
                }
            }
            board.unmake(mv, undo);
        }

        if legal == 0 {
            // No move at all loses, mated or stalemated alike.
            return Score::Dtm(-MATE);
        }
        let Some(mv) = best_move else {
            // Every reply sits in a perpetual class: no DTM line exists.
            return Score::Unknown;
        };

        if best != 0 {
            best += if best > 0 { -1 } else { 1 };
        }
        line.push(mv);
        if best != 0 && best.abs() != MATE {
            let undo = board.make(mv);
            self.probe_into(board, line);
            board.unmake(mv, undo);
        }
        Score::from_raw(best)
    }
}

fn reversed_name(name: &str) -> String {
    let split = name[1..].find('k').map(|i| i + 1).unwrap_or(name.len());
    format!("{}{}", &name[split..], &name[..split])
}

fn scan_folder(root: &Path, out: &mut Vec<PathBuf>) -> Result<(), EgtbError> {
    if !root.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            scan_folder(&path, out)?;
        } else if filename::is_table_path(&path) {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_names() {
        assert_eq!(reversed_name("krkaa"), "kaakr");
        assert_eq!(reversed_name("krk"), "kkr");
    }

    #[test]
    fn missing_signature_scores_missing() {
        let db = Database::new(MemMode::All);
        let board: Board = "3k5/9/9/9/9/9/9/2R1K4/9/9 w".parse().unwrap();
        assert_eq!(db.score(&board), Score::Missing);
    }
}
