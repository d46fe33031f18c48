//! Perpetual check/chase resolution.
//!
//! Runs on a finished DTM table of both-armed material. Otherwise-drawn
//! rows where one side can check forever (a loss for the checking side
//! under Xiangqi rules) or evade forever are classified into the three
//! perpetual classes, verified, propagated, and finally numerised into
//! DTM-like distances on the perpetual scale.
//!
//! The provisional state is a pair of reachability bits per row, held in
//! the flag bitmap and mirrored into an odd in-range score so that a
//! checkpointed table stays self-describing.

use tracing::{debug, info};

use jiangjun_core::{Color, MoveList, generate_moves, generate_retro_moves};
use jiangjun_egtb::{Database, MATE, PERPETUAL_MATE, Score};

use crate::error::GenError;
use crate::gen_table::GenTable;
use crate::generator::{
    GenContext, capture_child_score, resolve_leftovers, run_parallel, same_sig_child,
};

/// Reachability bit: the side to move is in check and can stay checked.
const FLAG_CHECKED0: i16 = 1 << 1;
/// Reachability bit: the row is reachable as a check-evasion target.
const FLAG_ESC0: i16 = 1 << 2;

fn provisional(flag: i16) -> Score {
    Score::Dtm(MATE - 1 - flag)
}

fn provisional_flag(score: Score) -> i16 {
    MATE - 1 - score.to_raw()
}

/// Classify and numerise perpetual positions. Returns whether any class
/// was found; on `false` the table's draws are restored untouched.
pub fn resolve(table: &mut GenTable, db: &Database, workers: usize) -> Result<bool, GenError> {
    if !table.signature().is_both_armed() {
        return Ok(false);
    }
    info!(name = %table.signature(), "perpetual resolution started");

    // Reopen draws and any stale perpetual cells.
    for side in Color::ALL {
        for idx in 0..table.size() {
            let s = table.score(idx, side);
            if s == Score::Draw || s.is_perpetual_tag() {
                table.set_score(idx, side, Score::Unset)?;
            }
        }
    }
    table.flags().clear_all();

    let found = {
        let ctx = GenContext {
            table,
            db,
            workers,
        };
        run_parallel(&ctx, |from, to| init_checked(&ctx, from, to))?;
        let mut marked = seed_sweep(&ctx)?;
        debug!(name = %ctx.table.signature(), marked, "perpetual seeds marked");

        // Reachability fixed point over alternating parities. Stability
        // needs a quiet round of each parity.
        let mut ply: i16 = 1;
        let mut stable = 0;
        while stable < 2 && marked > 0 {
            for side in Color::ALL {
                run_parallel(&ctx, |from, to| reachable_pass(&ctx, side, ply, from, to))?;
            }
            let now = strip_sweep(&ctx, ply)?;
            if now == marked {
                stable += 1;
            } else {
                stable = 0;
                marked = now;
            }
            ply += 1;
        }

        if marked < 2 {
            // Give any surviving provisional rows back to the draw pool.
            for idx in 0..ctx.table.size() {
                for side in Color::ALL {
                    if ctx.table.flags().is_side(idx, side.index()) {
                        ctx.table.set_score(idx, side, Score::Unset)?;
                        ctx.table.flags().clear_side(idx, side.index());
                    }
                }
            }
            false
        } else {
            classify(&ctx)?;
            ctx.table.flags().clear_all();
            verify_classes(&ctx)?;

            run_parallel(&ctx, |from, to| propagate_captures(&ctx, from, to))?;
            ctx.table.flags().clear_all();
            loop {
                run_parallel(&ctx, |from, to| mark_predecessors(&ctx, from, to))?;
                let changes =
                    run_parallel(&ctx, |from, to| resolve_marked(&ctx, from, to))?;
                if changes == 0 {
                    break;
                }
            }
            true
        }
    };

    if !found {
        info!(name = %table.signature(), "no perpetual positions");
        // Put the reopened draws back.
        for side in Color::ALL {
            for idx in 0..table.size() {
                if table.score(idx, side) == Score::Unset {
                    table.set_score(idx, side, Score::Draw)?;
                }
            }
        }
        return Ok(false);
    }

    numerise(table, db, workers)?;
    resolve_leftovers(table)?;
    info!(name = %table.signature(), "perpetual resolution finished");
    Ok(true)
}

// ── Phase A: seed in-check rows that can stay inside the unset set ───────

fn init_checked(ctx: &GenContext<'_>, from: u64, to: u64) -> Result<u64, GenError> {
    let table = ctx.table;
    let mut changes = 0;
    let mut keys = Vec::new();
    for idx in from..to {
        let scores = [
            table.score(idx, Color::Black),
            table.score(idx, Color::White),
        ];
        if scores[0] != Score::Unset && scores[1] != Score::Unset {
            continue;
        }
        let Some(mut board) = table.codec().setup(idx) else {
            continue;
        };
        for side in Color::ALL {
            if scores[side.index()] != Score::Unset || !board.in_check(side) {
                continue;
            }
            let mut moves = MoveList::new();
            generate_moves(&board, side, &mut moves);
            let mut reach = 0;
            for mv in moves.iter() {
                if board.piece_on(mv.dest()).is_some() {
                    continue;
                }
                let undo = board.make(mv);
                if !board.in_check(side) {
                    if let Some((key, query)) = same_sig_child(table, &board, side.opponent()) {
                        if table.score(key, query) == Score::Unset
                            && table.codec().all_keys(&board, &mut keys).is_ok()
                        {
                            for &k in &keys {
                                table.flags().set_cap(k, side.opponent().index());
                            }
                            reach += 1;
                        }
                    }
                }
                board.unmake(mv, undo);
            }
            if reach > 0 {
                table.flags().set_side(idx, side.index());
                table.set_score(idx, side, provisional(FLAG_CHECKED0))?;
                changes += 1;
            }
        }
    }
    Ok(changes)
}

/// Fold the capture marks of phase A into the provisional bit encoding.
fn seed_sweep(ctx: &GenContext<'_>) -> Result<u64, GenError> {
    let table = ctx.table;
    let mut marked = 0;
    for idx in 0..table.size() {
        for side in Color::ALL {
            let sd = side.index();
            if table.flags().is_cap(idx, sd) {
                table.flags().clear_cap(idx, sd);
                let mut flag = FLAG_ESC0;
                if table.flags().is_side(idx, sd) {
                    flag |= FLAG_CHECKED0;
                } else {
                    table.flags().set_side(idx, sd);
                }
                table.set_score(idx, side, provisional(flag))?;
            }
            if table.flags().is_side(idx, sd) {
                marked += 1;
            }
        }
    }
    Ok(marked)
}

// ── Phase B: reachability fixed point ────────────────────────────────────

fn reachable_pass(
    ctx: &GenContext<'_>,
    side: Color,
    ply: i16,
    from: u64,
    to: u64,
) -> Result<u64, GenError> {
    let mut changes = 0;
    for idx in from..to {
        if ctx.table.flags().is_side(idx, side.index()) && reachable(ctx, idx, side, ply)? {
            changes += 1;
        }
    }
    Ok(changes)
}

/// Re-test whether a marked row can still reach the class required by
/// this ply's parity; failing rows get their bit stripped in the sweep.
fn reachable(ctx: &GenContext<'_>, idx: u64, side: Color, ply: i16) -> Result<bool, GenError> {
    let table = ctx.table;
    let sd = side.index();
    let is_even = ply % 2 == 0;
    let oflag = provisional_flag(table.score(idx, side));
    let iflag = if is_even { FLAG_CHECKED0 } else { FLAG_ESC0 };
    if oflag & iflag == 0 {
        return Ok(false);
    }

    let Some(mut board) = table.codec().setup(idx) else {
        return Ok(false);
    };
    let need = if is_even { FLAG_ESC0 } else { FLAG_CHECKED0 };
    let xside = side.opponent();

    let mut moves = MoveList::new();
    generate_moves(&board, side, &mut moves);
    let mut reached = false;
    'moves: for mv in moves.iter() {
        let quiet = board.piece_on(mv.dest()).is_none();
        if !is_even && !quiet {
            continue;
        }
        let undo = board.make(mv);
        if !board.in_check(side) {
            if quiet {
                if let Some((key, query)) = same_sig_child(table, &board, xside) {
                    if table.flags().is_side(key, query.index()) {
                        let the_flag = provisional_flag(table.score(key, query));
                        if !is_even && the_flag & FLAG_ESC0 != 0 {
                            // The opponent itself escapes forever: no
                            // perpetual check through this row.
                            reached = false;
                            board.unmake(mv, undo);
                            break 'moves;
                        }
                        if the_flag & need != 0 {
                            reached = true;
                        }
                    } else if is_even && table.score(key, query).to_raw() <= 0 {
                        reached = false;
                        board.unmake(mv, undo);
                        break 'moves;
                    }
                }
            } else {
                let child = capture_child_score(ctx.db, &board, xside)?;
                if child.to_raw() <= 0 {
                    reached = false;
                    board.unmake(mv, undo);
                    break 'moves;
                }
            }
        }
        board.unmake(mv, undo);
        if reached && !is_even {
            return Ok(true);
        }
    }

    if reached {
        return Ok(true);
    }
    table.flags().set_cap(idx, sd);
    Ok(false)
}

/// Strip this parity's bit from every row that failed the re-test.
fn strip_sweep(ctx: &GenContext<'_>, ply: i16) -> Result<u64, GenError> {
    let table = ctx.table;
    let iflag = if ply % 2 == 0 { FLAG_CHECKED0 } else { FLAG_ESC0 };
    let mut marked = 0;
    for idx in 0..table.size() {
        for side in Color::ALL {
            let sd = side.index();
            if table.flags().is_cap(idx, sd) {
                table.flags().clear_cap(idx, sd);
                let mut flag = provisional_flag(table.score(idx, side));
                flag &= !iflag;
                if flag == 0 {
                    table.flags().clear_side(idx, sd);
                    table.set_score(idx, side, Score::Unset)?;
                } else {
                    table.set_score(idx, side, provisional(flag))?;
                }
            }
            if table.flags().is_side(idx, sd) {
                marked += 1;
            }
        }
    }
    Ok(marked)
}

// ── Phase C: classification ──────────────────────────────────────────────

fn classify(ctx: &GenContext<'_>) -> Result<(), GenError> {
    let table = ctx.table;
    for idx in 0..table.size() {
        for side in Color::ALL {
            if !table.flags().is_side(idx, side.index()) {
                continue;
            }
            let flag = provisional_flag(table.score(idx, side));
            let class = if flag & FLAG_CHECKED0 != 0 {
                if flag & FLAG_ESC0 != 0 {
                    Score::PerpetualCheckedEvasion
                } else {
                    Score::PerpetualChecked
                }
            } else if flag & FLAG_ESC0 != 0 {
                Score::PerpetualEvasion
            } else {
                Score::Draw
            };
            table.set_score(idx, side, class)?;
        }
    }
    Ok(())
}

// ── Phase E: class verification ──────────────────────────────────────────

fn verify_classes(ctx: &GenContext<'_>) -> Result<(), GenError> {
    loop {
        let changes = run_parallel(ctx, |from, to| verify_classes_pass(ctx, from, to))?;
        debug!(name = %ctx.table.signature(), changes, "perpetual class verification round");
        if changes == 0 {
            return Ok(());
        }
    }
}

fn verify_classes_pass(ctx: &GenContext<'_>, from: u64, to: u64) -> Result<u64, GenError> {
    let table = ctx.table;
    let mut changes = 0;
    for idx in from..to {
        for side in Color::ALL {
            let mut s = table.score(idx, side);
            if matches!(s, Score::PerpetualEvasion | Score::PerpetualCheckedEvasion)
                && !evasion_witnessed(ctx, idx, side)?
            {
                s = if s == Score::PerpetualEvasion {
                    Score::Unset
                } else {
                    Score::PerpetualChecked
                };
                table.set_score(idx, side, s)?;
                changes += 1;
            }
            if matches!(s, Score::PerpetualChecked | Score::PerpetualCheckedEvasion)
                && !check_witnessed(ctx, idx, side)?
            {
                s = if s == Score::PerpetualChecked {
                    Score::Unset
                } else {
                    Score::PerpetualEvasion
                };
                table.set_score(idx, side, s)?;
                changes += 1;
            }
        }
    }
    Ok(changes)
}

/// An evasion class needs every reply to stay off losing-or-drawn and
/// settled-open cells.
fn evasion_witnessed(ctx: &GenContext<'_>, idx: u64, side: Color) -> Result<bool, GenError> {
    let table = ctx.table;
    let Some(mut board) = table.codec().setup(idx) else {
        return Ok(false);
    };
    let xside = side.opponent();
    let mut moves = MoveList::new();
    generate_moves(&board, side, &mut moves);
    let mut ok = true;
    for mv in moves.iter() {
        let undo = board.make(mv);
        if !board.in_check(side) {
            let child = if undo.captured.is_none() {
                match same_sig_child(table, &board, xside) {
                    Some((key, query)) => table.score(key, query),
                    None => Score::Unset,
                }
            } else {
                capture_child_score(ctx.db, &board, xside)?
            };
            let raw = child.to_raw();
            if child == Score::Unset || (-MATE..=0).contains(&raw) {
                ok = false;
            }
        }
        board.unmake(mv, undo);
        if !ok {
            break;
        }
    }
    Ok(ok)
}

/// A checked class needs a quiet reply into a perpetual-evasion row.
fn check_witnessed(ctx: &GenContext<'_>, idx: u64, side: Color) -> Result<bool, GenError> {
    let table = ctx.table;
    let Some(mut board) = table.codec().setup(idx) else {
        return Ok(false);
    };
    let xside = side.opponent();
    let mut moves = MoveList::new();
    generate_moves(&board, side, &mut moves);
    let mut ok = false;
    for mv in moves.iter() {
        if board.piece_on(mv.dest()).is_some() {
            continue;
        }
        let undo = board.make(mv);
        if !board.in_check(side) {
            if let Some((key, query)) = same_sig_child(table, &board, xside) {
                if table.score(key, query) == Score::PerpetualEvasion {
                    ok = true;
                }
            }
        }
        board.unmake(mv, undo);
        if ok {
            break;
        }
    }
    Ok(ok)
}

// ── Phase D: propagation ─────────────────────────────────────────────────

/// Pull perpetual classes across captures into sub-endgames.
fn propagate_captures(ctx: &GenContext<'_>, from: u64, to: u64) -> Result<u64, GenError> {
    let table = ctx.table;
    let mut changes = 0;
    for idx in from..to {
        let scores = [
            table.score(idx, Color::Black),
            table.score(idx, Color::White),
        ];
        if scores[0] != Score::Unset && scores[1] != Score::Unset {
            continue;
        }
        let Some(mut board) = table.codec().setup(idx) else {
            continue;
        };
        for side in Color::ALL {
            if scores[side.index()] != Score::Unset {
                continue;
            }
            let mut moves = MoveList::new();
            generate_moves(&board, side, &mut moves);
            let mut checked_cnt = 0;
            let mut esc_cnt = 0;
            for mv in moves.iter() {
                if board.piece_on(mv.dest()).is_none() {
                    continue;
                }
                let undo = board.make(mv);
                let both_armed = board.attacker_count(Color::White) > 0
                    && board.attacker_count(Color::Black) > 0;
                if both_armed && !board.in_check(side) {
                    match ctx.db.score_for(&board, side.opponent()) {
                        Score::PerpetualChecked => checked_cnt += 1,
                        Score::PerpetualCheckedEvasion | Score::PerpetualEvasion => esc_cnt += 1,
                        _ => {}
                    }
                }
                board.unmake(mv, undo);
                if esc_cnt > 0 {
                    break;
                }
            }
            if checked_cnt + esc_cnt > 0 {
                let class = if esc_cnt > 0 {
                    Score::PerpetualChecked
                } else {
                    Score::PerpetualEvasion
                };
                table.set_score(idx, side, class)?;
                changes += 1;
            }
        }
    }
    Ok(changes)
}

/// Mark quiet predecessors of tagged rows for the forward re-probe.
fn mark_predecessors(ctx: &GenContext<'_>, from: u64, to: u64) -> Result<u64, GenError> {
    let table = ctx.table;
    let mut keys = Vec::new();
    for idx in from..to {
        let mut board = None;
        for side in Color::ALL {
            let sd = side.index();
            if table.flags().is_side(idx, sd) {
                continue;
            }
            let o = table.score(idx, side);
            if o != Score::Draw && o != Score::Unset {
                table.flags().set_side(idx, sd);
            }
            if !o.is_perpetual_tag() {
                continue;
            }
            if board.is_none() {
                board = table.codec().setup(idx);
            }
            let Some(board) = board.as_mut() else {
                continue;
            };
            let xside = side.opponent();
            let mut retro = MoveList::new();
            generate_retro_moves(board, xside, &mut retro);
            for un in retro.iter() {
                let undo = board.make(un);
                if !board.in_check(side) && table.codec().all_keys(board, &mut keys).is_ok() {
                    for &key in &keys {
                        let xscore = table.score(key, xside);
                        if xscore == Score::Unset
                            || (xscore == Score::Draw && o == Score::PerpetualChecked)
                        {
                            table.flags().set_cap(key, xside.index());
                        }
                    }
                }
                board.unmake(un, undo);
            }
        }
    }
    Ok(0)
}

/// Forward re-probe of marked rows: settle those whose replies force a
/// perpetual class.
fn resolve_marked(ctx: &GenContext<'_>, from: u64, to: u64) -> Result<u64, GenError> {
    let table = ctx.table;
    let mut changes = 0;
    for idx in from..to {
        let mut cached = None;
        for side in Color::ALL {
            let sd = side.index();
            if !table.flags().is_cap(idx, sd) {
                continue;
            }
            if cached.is_none() {
                cached = table.codec().setup(idx);
            }
            let Some(board) = cached.as_mut() else {
                continue;
            };
            let xside = side.opponent();
            let mut moves = MoveList::new();
            generate_moves(board, side, &mut moves);
            let mut draw_cnt = 0;
            let mut e_cnt = 0;
            let mut c_cnt = 0;
            let mut u_cnt = 0;
            for mv in moves.iter() {
                let undo = board.make(mv);
                if !board.in_check(side) {
                    let child = if undo.captured.is_none() {
                        match same_sig_child(table, board, xside) {
                            Some((key, query)) => table.score(key, query),
                            None => Score::Unset,
                        }
                    } else {
                        match capture_child_score(ctx.db, board, xside) {
                            Ok(score) => score,
                            Err(err) => {
                                board.unmake(mv, undo);
                                return Err(err);
                            }
                        }
                    };
                    match child {
                        Score::Draw => draw_cnt += 1,
                        Score::PerpetualEvasion => e_cnt += 1,
                        Score::PerpetualChecked => c_cnt += 1,
                        Score::PerpetualCheckedEvasion => {
                            e_cnt += 1;
                            c_cnt += 1;
                        }
                        Score::Unset => {
                            if u_cnt > 0 || !board.in_check(xside) {
                                u_cnt += 1;
                            }
                        }
                        _ => {}
                    }
                }
                board.unmake(mv, undo);
                if e_cnt > 0 {
                    break;
                }
            }

            let class = if e_cnt > 0 {
                Score::PerpetualChecked
            } else if c_cnt > 0 && draw_cnt + u_cnt == 0 {
                Score::PerpetualEvasion
            } else {
                Score::Unset
            };
            if class != Score::Unset {
                table.set_score(idx, side, class)?;
                table.flags().clear_cap(idx, sd);
                changes += 1;
            }
        }
    }
    Ok(changes)
}

// ── Phase F: numerisation ────────────────────────────────────────────────

fn numerise(table: &mut GenTable, db: &Database, workers: usize) -> Result<(), GenError> {
    let any_tag = Color::ALL.iter().any(|&side| {
        (0..table.size()).any(|idx| table.score(idx, side).is_perpetual_tag())
    });
    if !any_tag {
        return Ok(());
    }
    table.widen_to_two_bytes()?;

    let ctx = GenContext {
        table,
        db,
        workers,
    };
    loop {
        let changes = run_parallel(&ctx, |from, to| numerise_pass(&ctx, from, to))?;
        debug!(name = %ctx.table.signature(), changes, "numerisation round");
        if changes == 0 {
            return Ok(());
        }
    }
}

fn numerise_pass(ctx: &GenContext<'_>, from: u64, to: u64) -> Result<u64, GenError> {
    let table = ctx.table;
    let mut changes = 0;
    for idx in from..to {
        let mut cached = None;
        for side in Color::ALL {
            let o = table.score(idx, side);
            if !o.is_perpetual_tag() {
                continue;
            }
            if cached.is_none() {
                cached = table.codec().setup(idx);
            }
            let Some(board) = cached.as_mut() else {
                continue;
            };
            let xside = side.opponent();
            let mut moves = MoveList::new();
            generate_moves(board, side, &mut moves);
            let mut best: i16 = -MATE;
            let mut best_perp: Option<i16> = None;
            let mut postponed = false;
            for mv in moves.iter() {
                let undo = board.make(mv);
                if !board.in_check(side) {
                    let child = if undo.captured.is_none() {
                        match same_sig_child(table, board, xside) {
                            Some((key, query)) => table.score(key, query),
                            None => Score::Unset,
                        }
                    } else {
                        let child = match capture_child_score(ctx.db, board, xside) {
                            Ok(score) => score,
                            Err(err) => {
                                board.unmake(mv, undo);
                                return Err(err);
                            }
                        };
                        if child.is_perpetual_tag() {
                            let name = board.material_name();
                            board.unmake(mv, undo);
                            return Err(GenError::SubEndgameNotFixed { name });
                        }
                        child
                    };
                    match child {
                        _ if child.is_perpetual_tag() => postponed = true,
                        Score::PerpetualDtm(v) => {
                            best_perp = Some(best_perp.map_or(-v, |b: i16| b.max(-v)));
                        }
                        _ if child.to_raw() < MATE => best = best.max(-child.to_raw()),
                        _ => {}
                    }
                }
                board.unmake(mv, undo);
                if postponed {
                    break;
                }
            }
            if postponed {
                continue;
            }

            let mut raw = match o {
                Score::PerpetualChecked | Score::PerpetualCheckedEvasion => match best_perp {
                    Some(v) if v > 0 => v,
                    // Children not numerised yet: try again next round.
                    _ => continue,
                },
                Score::PerpetualEvasion => match best_perp {
                    Some(v) if v < 0 => v,
                    Some(_) => continue,
                    None => -PERPETUAL_MATE - best - MATE,
                },
                _ => continue,
            };
            if raw > 0 {
                raw = (raw - 1).max(PERPETUAL_MATE);
            } else {
                raw = (raw + 1).min(-PERPETUAL_MATE);
            }
            table.set_score(idx, side, Score::PerpetualDtm(raw))?;
            changes += 1;
        }
    }
    Ok(changes)
}
