//! The DTM generators: shared initialisation, the backward retrograde
//! solver (preferred) and the forward fixed-point solver, plus the
//! finishing pass that verifies, narrows and writes the table out.
//!
//! Work is data-parallel over contiguous row ranges with a hard join
//! barrier between phases; see the buffer module for the sharing rules.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use jiangjun_core::{
    Board, Color, MaterialSignature, MoveList, generate_moves, generate_retro_moves,
};
use jiangjun_egtb::{Database, LoadMode, MATE, RAW_UNSET, Score};

use crate::error::GenError;
use crate::gen_table::{CompressMode, GenTable};
use crate::names;
use crate::perpetual;
use crate::verify;

/// Build options, threaded explicitly instead of process globals.
#[derive(Debug, Clone)]
pub struct GenOptions {
    /// Extra worker threads beyond the coordinating one.
    pub extra_threads: usize,
    /// Generate with two-byte cells from the start.
    pub two_bytes: bool,
    /// Use the backward retrograde solver (the forward solver otherwise).
    pub backward: bool,
    /// How the final files are written.
    pub compress: CompressMode,
    /// Checkpoint after every eighth ply and resume from checkpoints.
    pub use_checkpoints: bool,
    /// Search group permutations for the best-compressing order.
    pub optimize_order: bool,
    /// Run the perpetual-check resolution pass after the base build.
    pub fix_perpetual: bool,
}

impl Default for GenOptions {
    fn default() -> GenOptions {
        GenOptions {
            extra_threads: 0,
            two_bytes: false,
            backward: true,
            compress: CompressMode::Compress,
            use_checkpoints: true,
            optimize_order: false,
            fix_perpetual: false,
        }
    }
}

/// A generation job over one database and output folder.
pub struct Generator<'a> {
    db: &'a mut Database,
    root: PathBuf,
    opts: GenOptions,
}

/// Shared per-build state handed to the worker passes.
pub(crate) struct GenContext<'a> {
    pub table: &'a GenTable,
    pub db: &'a Database,
    pub workers: usize,
}

impl<'a> Generator<'a> {
    /// Create a generator writing under `root`. Already-present tables in
    /// `db` are reused as sub-endgames.
    pub fn new(db: &'a mut Database, root: &Path, opts: GenOptions) -> Generator<'a> {
        Generator {
            db,
            root: root.to_path_buf(),
            opts,
        }
    }

    /// Generate the named endgame and every missing sub-endgame,
    /// smallest first. Returns the names actually generated.
    pub fn generate(&mut self, name: &str) -> Result<Vec<String>, GenError> {
        // Surface bad names as signature errors, not as an empty plan.
        MaterialSignature::parse_canonical(name)?;
        let mut done = Vec::new();
        for sig in names::expand_with_subs(name) {
            if self.db.get(sig.name()).is_some() {
                continue;
            }
            self.generate_single(&sig)?;
            done.push(sig.name().to_string());
        }
        Ok(done)
    }

    /// Generate one endgame; all its sub-endgames must be loaded.
    pub fn generate_single(&mut self, sig: &MaterialSignature) -> Result<(), GenError> {
        let (top, sub) = jiangjun_egtb::subfolders(sig);
        std::fs::create_dir_all(self.root.join(&top))?;
        let folder = self.root.join(&sub);
        std::fs::create_dir_all(&folder)?;

        let mut table = GenTable::new(sig, 0, self.opts.two_bytes)?;
        info!(
            name = %sig,
            size = table.size(),
            backward = self.opts.backward,
            "generating endgame"
        );

        {
            let ctx = GenContext {
                table: &table,
                db: self.db,
                workers: 1 + self.opts.extra_threads,
            };
            if self.opts.backward {
                backward_main(&ctx, &folder, self.opts.use_checkpoints)?;
            } else {
                forward_main(&ctx, &folder, self.opts.use_checkpoints)?;
            }
        }

        self.finish(&mut table, &folder)?;

        if self.opts.fix_perpetual && sig.is_both_armed() {
            let workers = 1 + self.opts.extra_threads;
            if perpetual::resolve(&mut table, self.db, workers)? {
                // Classes were found: verify again and rewrite the files.
                let ctx = GenContext {
                    table: &table,
                    db: self.db,
                    workers,
                };
                verify::verify_table(&ctx)?;
                self.write_out(&mut table, &folder)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self, table: &mut GenTable, folder: &Path) -> Result<(), GenError> {
        resolve_leftovers(table)?;

        if self.opts.optimize_order {
            if let Some(better) = search_permutation(table)? {
                info!(name = %table.signature(), order = better.codec().order(), "better permutation found");
                *table = better;
            }
        }

        {
            let ctx = GenContext {
                table,
                db: self.db,
                workers: 1 + self.opts.extra_threads,
            };
            verify::verify_table(&ctx)?;
        }

        table.narrow_if_possible()?;
        self.write_out(table, folder)?;
        table.remove_checkpoint(folder);
        Ok(())
    }

    fn write_out(&mut self, table: &mut GenTable, folder: &Path) -> Result<(), GenError> {
        let mut paths = Vec::new();
        for side in Color::ALL {
            paths.push(table.save_side(folder, side, self.opts.compress)?);
        }
        table.write_stats(folder)?;
        self.db.close_name(table.signature().name());
        self.db.add_files(&paths, LoadMode::LoadNow)?;
        Ok(())
    }
}

/// Split `[0, size)` into `workers` contiguous ranges.
fn ranges(size: u64, workers: usize) -> Vec<(u64, u64)> {
    let workers = workers.max(1).min(size.max(1) as usize);
    let step = size / workers as u64;
    let mut out = Vec::with_capacity(workers);
    let mut from = 0;
    for i in 0..workers {
        let to = if i + 1 == workers { size } else { from + step };
        out.push((from, to));
        from = to;
    }
    out
}

/// Fork-join a pass over the whole table; returns the summed change
/// counters. The join is the phase barrier of the concurrency model.
pub(crate) fn run_parallel<F>(ctx: &GenContext<'_>, pass: F) -> Result<u64, GenError>
where
    F: Fn(u64, u64) -> Result<u64, GenError> + Sync,
{
    let parts = ranges(ctx.table.size(), ctx.workers);
    if parts.len() == 1 {
        return pass(parts[0].0, parts[0].1);
    }
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(parts.len() - 1);
        for &(from, to) in &parts[1..] {
            let pass = &pass;
            handles.push(scope.spawn(move || pass(from, to)));
        }
        let mut changes = pass(parts[0].0, parts[0].1)?;
        for handle in handles {
            changes += handle.join().expect("generation worker panicked")?;
        }
        Ok(changes)
    })
}

/// Canonical same-signature child lookup: row key plus the side to read,
/// adjusted when the canonical representative is color-flipped.
pub(crate) fn same_sig_child(
    table: &GenTable,
    board: &Board,
    xside: Color,
) -> Option<(u64, Color)> {
    match table.codec().index_of(board) {
        Ok(rec) => {
            let side = if rec.flip_side { xside.opponent() } else { xside };
            Some((rec.key, side))
        }
        Err(_) => None,
    }
}

/// Score of a capture child through the sub-endgame database. A capture
/// into bare kings is a dead draw; a missing table aborts the build.
pub(crate) fn capture_child_score(db: &Database, board: &Board, xside: Color) -> Result<Score, GenError> {
    if board.attacker_count(Color::White) + board.attacker_count(Color::Black) == 0 {
        return Ok(Score::Draw);
    }
    let score = db.score_for(board, xside);
    if score == Score::Missing {
        // Report the canonical sub-endgame name, whichever way around
        // the board's material reads.
        let name = board.material_name();
        let name = match MaterialSignature::parse(&name) {
            Ok(sig) if MaterialSignature::parse_canonical(&name).is_err() => sig.reversed_name(),
            _ => name,
        };
        return Err(GenError::MissingSubEndgame { name });
    }
    Ok(score)
}

// ── Initialisation (both solvers) ─────────────────────────────────────────

/// Classify every row: illegal, mated, or open; with `seed_captures` also
/// record the best capture-into-sub-endgame score and the capture flag.
fn init_pass(
    ctx: &GenContext<'_>,
    seed_captures: bool,
    from: u64,
    to: u64,
) -> Result<u64, GenError> {
    let table = ctx.table;
    for idx in from..to {
        let Some(mut board) = table.codec().setup(idx) else {
            table.set_score(idx, Color::Black, Score::Illegal)?;
            table.set_score(idx, Color::White, Score::Illegal)?;
            continue;
        };

        let in_checks = [board.in_check(Color::Black), board.in_check(Color::White)];
        for side in Color::ALL {
            let sd = side.index();
            if in_checks[side.opponent().index()] {
                table.set_score(idx, side, Score::Illegal)?;
                continue;
            }

            let mut moves = MoveList::new();
            generate_moves(&board, side, &mut moves);
            let mut legal = 0;
            let mut best_cap: Option<i16> = None;
            for mv in moves.iter() {
                let undo = board.make(mv);
                if !board.in_check(side) {
                    legal += 1;
                    if seed_captures && undo.captured.is_some() {
                        let child = capture_child_score(ctx.db, &board, side.opponent());
                        let child = match child {
                            Ok(score) => score,
                            Err(err) => {
                                board.unmake(mv, undo);
                                return Err(err);
                            }
                        };
                        if let Some(folded) = child.parent() {
                            let raw = folded.to_raw();
                            best_cap = Some(best_cap.map_or(raw, |b| b.max(raw)));
                        }
                    }
                }
                board.unmake(mv, undo);
            }

            if legal == 0 {
                table.set_score(idx, side, Score::Dtm(-MATE))?;
            } else if let Some(raw) = best_cap {
                table.set_score(idx, side, Score::from_raw(raw))?;
                table.flags().set_cap(idx, sd);
            } else {
                table.set_score(idx, side, Score::Unset)?;
            }
        }
    }
    Ok(0)
}

// ── Backward retrograde solver ────────────────────────────────────────────

fn backward_main(ctx: &GenContext<'_>, folder: &Path, checkpoints: bool) -> Result<(), GenError> {
    let table = ctx.table;
    let mut ply: i16;
    let mut m_ply: i16;

    match checkpoints.then(|| table.read_checkpoint(folder)).flatten() {
        Some((p, mp)) => {
            ply = p;
            m_ply = mp.max(p);
            info!(name = %table.signature(), ply, "resumed from checkpoint");
        }
        None => {
            run_parallel(ctx, |from, to| init_pass(ctx, true, from, to))?;

            // First and last mate distances seeded so far bound the plies.
            let mut min_abs: i16 = MATE;
            let mut max_abs: i16 = 0;
            for side in Color::ALL {
                for idx in 0..table.size() {
                    if let Score::Dtm(v) = table.score(idx, side) {
                        min_abs = min_abs.min(v.abs());
                        max_abs = max_abs.max(v.abs());
                    }
                }
            }
            ply = if max_abs == 0 { 0 } else { MATE - max_abs };
            m_ply = if max_abs == 0 { 0 } else { MATE - min_abs };
            debug!(name = %table.signature(), ply, m_ply, "backward initialised");
        }
    }

    let mut try_cnt = 2;
    while try_cnt > 0 {
        table.flags().clear_side_flags();

        let mut round_changes = 0;
        for task in 0..2 {
            for side in Color::ALL {
                round_changes += run_parallel(ctx, |from, to| {
                    backward_pass(ctx, side, ply, task, from, to)
                })?;
            }
        }

        if round_changes == 0 {
            if ply > m_ply {
                try_cnt -= 1;
            }
        } else {
            try_cnt = 2;
            if checkpoints && ply > 0 && ply % 8 == 0 {
                table.write_checkpoint(folder, ply, ply.max(m_ply))?;
            }
        }
        ply += 1;
    }

    // Capture seeds that never confirmed stay open.
    for idx in 0..table.size() {
        for side in Color::ALL {
            if table.flags().is_cap(idx, side.index()) {
                table.set_score(idx, side, Score::Unset)?;
                table.flags().clear_cap(idx, side.index());
            }
        }
    }

    // Final checkpoint: a failed verify or write-out can retry from here.
    if checkpoints {
        table.write_checkpoint(folder, ply, ply.max(m_ply))?;
    }
    Ok(())
}

/// One backward round for one side at one ply.
///
/// Task 0 confirms capture seeds whose distance matches this ply and
/// propagates wins to predecessors through backward moves (losing-side
/// retractions only mark the side flag). Task 1 re-probes the marked
/// rows forward and settles those whose replies are all decided.
fn backward_pass(
    ctx: &GenContext<'_>,
    side: Color,
    ply: i16,
    task: u8,
    from: u64,
    to: u64,
) -> Result<u64, GenError> {
    let table = ctx.table;
    let flags = table.flags();
    let sd = side.index();
    let xside = side.opponent();
    let xsd = xside.index();

    let mut cur_mate = MATE - ply;
    if ply % 2 == 0 {
        cur_mate = -cur_mate;
    }
    let fill = -cur_mate + if cur_mate > 0 { 1 } else { -1 };

    let mut changes = 0;
    let mut keys = Vec::new();
    for idx in from..to {
        if task == 1 {
            if !flags.is_side(idx, sd) {
                continue;
            }
            if let Some(best) = probe_backward(ctx, idx, side)? {
                table.set_score(idx, side, best)?;
                flags.clear_cap(idx, sd);
                changes += 1;
            }
            continue;
        }

        let o = table.score(idx, side).to_raw();
        if flags.is_cap(idx, sd) {
            if fill == o {
                if fill > 0 {
                    table.set_score(idx, side, Score::Dtm(fill))?;
                    flags.clear_cap(idx, sd);
                } else {
                    flags.set_side(idx, sd);
                }
            } else if cur_mate == o && cur_mate > 0 {
                table.set_score(idx, side, Score::Dtm(cur_mate))?;
                flags.clear_cap(idx, sd);
            } else {
                continue;
            }
        }
        if o != cur_mate {
            continue;
        }

        let Some(mut board) = table.codec().setup(idx) else {
            continue;
        };
        let mut retro = MoveList::new();
        generate_retro_moves(&board, xside, &mut retro);
        for un in retro.iter() {
            let undo = board.make(un);
            if !board.in_check(side) && table.codec().all_keys(&board, &mut keys).is_ok() {
                if fill > 0 {
                    for &key in &keys {
                        let before = table.score(key, xside).to_raw();
                        if before > MATE || before <= fill {
                            table.set_score(key, xside, Score::Dtm(fill))?;
                            flags.clear_cap(key, xsd);
                            changes += 1;
                        }
                    }
                } else {
                    for &key in &keys {
                        flags.set_side(key, xsd);
                    }
                }
            }
            board.unmake(un, undo);
        }
    }
    Ok(changes)
}

/// Forward re-probe of a marked row during the backward solve. Same-
/// signature children still carrying a capture flag count as undecided;
/// capture children fold through the row's own seeded capture score.
fn probe_backward(ctx: &GenContext<'_>, idx: u64, side: Color) -> Result<Option<Score>, GenError> {
    let table = ctx.table;
    let sd = side.index();
    let xside = side.opponent();

    let Some(mut board) = table.codec().setup(idx) else {
        return Ok(None);
    };

    let cap_raw: i16 = if table.flags().is_cap(idx, sd) {
        let mut v = table.score(idx, side).to_raw();
        if v > 0 {
            v += 1;
        } else if v < 0 {
            v -= 1;
        }
        -v
    } else {
        RAW_UNSET
    };

    let mut moves = MoveList::new();
    generate_moves(&board, side, &mut moves);
    let mut legal = 0;
    let mut unset = 0;
    let mut best: Option<i16> = None;
    for mv in moves.iter() {
        let undo = board.make(mv);
        if !board.in_check(side) {
            legal += 1;
            let child_raw = if undo.captured.is_none() {
                match same_sig_child(table, &board, xside) {
                    Some((key, query)) if !table.flags().is_cap(key, query.index()) => {
                        table.score(key, query).to_raw()
                    }
                    _ => RAW_UNSET,
                }
            } else {
                cap_raw
            };

            if child_raw.abs() <= MATE {
                let mut value = -child_raw;
                if value > 0 {
                    value -= 1;
                } else if value < 0 {
                    value += 1;
                }
                best = Some(best.map_or(value, |b| b.max(value)));
            } else {
                unset += 1;
            }
        }
        board.unmake(mv, undo);
    }

    if legal == 0 {
        return Ok(Some(Score::Dtm(-MATE)));
    }
    if unset == 0 {
        Ok(best.map(Score::from_raw))
    } else {
        Ok(None)
    }
}

// ── Forward solver ────────────────────────────────────────────────────────

fn forward_main(ctx: &GenContext<'_>, folder: &Path, checkpoints: bool) -> Result<(), GenError> {
    let table = ctx.table;
    run_parallel(ctx, |from, to| init_pass(ctx, false, from, to))?;

    let mut ply: i16 = 0;
    let mut side = Color::White;
    let mut try_cnt = 2;
    while try_cnt > 0 {
        let changes = run_parallel(ctx, |from, to| forward_pass(ctx, side, ply, from, to))?;
        if changes == 0 {
            try_cnt -= 1;
        } else {
            try_cnt = 2;
            if checkpoints && ply > 0 && ply % 8 == 0 {
                table.write_checkpoint(folder, ply, ply)?;
            }
        }
        ply += 1;
        side = side.opponent();
    }
    Ok(())
}

fn forward_pass(
    ctx: &GenContext<'_>,
    side: Color,
    ply: i16,
    from: u64,
    to: u64,
) -> Result<u64, GenError> {
    let table = ctx.table;
    let mut changes = 0;
    for idx in from..to {
        let o = table.score(idx, side).to_raw();
        if o.abs() >= MATE - 1 - ply && o < RAW_UNSET {
            continue;
        }
        if let Some(best) = probe_forward(ctx, idx, side)? {
            if best.to_raw() != o {
                table.set_score(idx, side, best)?;
                changes += 1;
            }
        }
    }
    Ok(changes)
}

/// Full forward probe of one open row.
fn probe_forward(ctx: &GenContext<'_>, idx: u64, side: Color) -> Result<Option<Score>, GenError> {
    let table = ctx.table;
    let xside = side.opponent();
    let Some(mut board) = table.codec().setup(idx) else {
        return Ok(None);
    };

    let mut moves = MoveList::new();
    generate_moves(&board, side, &mut moves);
    let mut unset = 0;
    let mut best: Option<i16> = None;
    for mv in moves.iter() {
        let undo = board.make(mv);
        if !board.in_check(side) {
            let child_raw = if undo.captured.is_none() {
                match same_sig_child(table, &board, xside) {
                    Some((key, query)) => table.score(key, query).to_raw(),
                    None => RAW_UNSET,
                }
            } else {
                let child = capture_child_score(ctx.db, &board, xside);
                match child {
                    Ok(score) => score.to_raw(),
                    Err(err) => {
                        board.unmake(mv, undo);
                        return Err(err);
                    }
                }
            };

            if child_raw.abs() <= MATE {
                let mut value = -child_raw;
                if value > 0 {
                    value -= 1;
                } else if value < 0 {
                    value += 1;
                }
                best = Some(best.map_or(value, |b| b.max(value)));
            } else {
                unset += 1;
            }
        }
        board.unmake(mv, undo);
    }

    let Some(best) = best else {
        return Ok(None);
    };
    let settle = unset == 0
        || best > 0
        || (best == 0 && side == Color::Black && !table.signature().is_both_armed());
    Ok(settle.then(|| Score::from_raw(best)))
}

// ── Finishing helpers ─────────────────────────────────────────────────────

/// Turn remaining open rows into draws and record the maximum DTM.
pub(crate) fn resolve_leftovers(table: &mut GenTable) -> Result<(), GenError> {
    let mut max_plies: u16 = 0;
    for side in Color::ALL {
        for idx in 0..table.size() {
            match table.score(idx, side) {
                Score::Unset => table.set_score(idx, side, Score::Draw)?,
                Score::Dtm(v) => max_plies = max_plies.max((MATE - v.abs()) as u16),
                _ => {}
            }
        }
    }
    table.set_max_dtm(max_plies);
    Ok(())
}

/// Try every group permutation on a compressed sample, returning the
/// converted table when a strictly better order exists.
fn search_permutation(table: &GenTable) -> Result<Option<GenTable>, GenError> {
    let units = table.codec().unit_count();
    if !(2..=4).contains(&units) {
        return Ok(None);
    }
    let mut best_len = table.sample_compressed_len()?;
    let mut best: Option<GenTable> = None;
    for order in permutation_orders(units) {
        let candidate = GenTable::new(table.signature(), order, table.two_bytes())?;
        candidate.convert_permutations_from(table)?;
        let len = candidate.sample_compressed_len()?;
        debug!(order, len, "permutation sample");
        if len < best_len {
            best_len = len;
            best = Some(candidate);
        }
    }
    if let Some(better) = &mut best {
        better.set_max_dtm(table.max_dtm() as u16);
    }
    Ok(best)
}

/// All non-identity permutations of `n` units, encoded as 3-bit fields.
fn permutation_orders(n: usize) -> Vec<u32> {
    let mut slots: Vec<usize> = (0..n).collect();
    let mut out = Vec::new();
    permute(&mut slots, 0, &mut out);
    out.retain(|&o| {
        let identity: u32 = (0..n as u32).map(|i| i << (3 * i)).sum();
        o != identity
    });
    out
}

fn permute(slots: &mut Vec<usize>, at: usize, out: &mut Vec<u32>) {
    if at == slots.len() {
        out.push(
            slots
                .iter()
                .enumerate()
                .map(|(unit, &slot)| (slot as u32) << (3 * unit))
                .sum(),
        );
        return;
    }
    for i in at..slots.len() {
        slots.swap(at, i);
        permute(slots, at + 1, out);
        slots.swap(at, i);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_cover_everything() {
        let parts = ranges(100, 3);
        assert_eq!(parts.first().unwrap().0, 0);
        assert_eq!(parts.last().unwrap().1, 100);
        let mut covered = 0;
        for (from, to) in parts {
            covered += to - from;
        }
        assert_eq!(covered, 100);
    }

    #[test]
    fn permutation_orders_for_two_units() {
        let orders = permutation_orders(2);
        // Only the swap remains once the identity is dropped.
        assert_eq!(orders, vec![1]);
    }
}
