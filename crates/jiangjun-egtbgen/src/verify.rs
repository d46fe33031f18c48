//! The verify pass: every cell re-derived from its children before
//! write-out. A mismatch aborts the build — the table is wrong.

use jiangjun_core::{Color, MaterialSignature, MoveList, generate_moves};
use jiangjun_egtb::{IndexCodec, MATE, RAW_ILLEGAL, RAW_PERPETUAL_CHECKED, Score};

use crate::error::GenError;
use crate::generator::{GenContext, capture_child_score, run_parallel, same_sig_child};

/// Re-derive every cell of the table and compare. Errors on the first
/// mismatch.
pub(crate) fn verify_table(ctx: &GenContext<'_>) -> Result<(), GenError> {
    run_parallel(ctx, |from, to| {
        verify_pass(ctx, from, to)?;
        Ok(0)
    })?;
    Ok(())
}

fn fail(ctx: &GenContext<'_>, idx: u64, sd: usize, detail: String) -> GenError {
    GenError::VerifyFailed {
        name: ctx.table.signature().name().to_string(),
        idx,
        side: sd,
        detail,
    }
}

fn verify_pass(ctx: &GenContext<'_>, from: u64, to: u64) -> Result<(), GenError> {
    let table = ctx.table;
    for idx in from..to {
        let cur = [
            table.score(idx, Color::Black),
            table.score(idx, Color::White),
        ];
        let Some(mut board) = table.codec().setup(idx) else {
            if cur[0] != Score::Illegal || cur[1] != Score::Illegal {
                return Err(fail(
                    ctx,
                    idx,
                    0,
                    format!("row does not decode but scores are {cur:?}"),
                ));
            }
            continue;
        };

        for side in Color::ALL {
            let sd = side.index();
            let xside = side.opponent();
            let cur_raw = cur[sd].to_raw();

            if board.in_check(xside) {
                if cur[sd] != Score::Illegal {
                    return Err(fail(ctx, idx, sd, format!("expected illegal, found {cur_raw}")));
                }
                continue;
            }
            if cur[sd] == Score::Illegal {
                return Err(fail(ctx, idx, sd, "illegal score on a legal row".to_string()));
            }

            // No sentinel may survive into a finished table.
            if cur_raw > MATE && cur_raw != RAW_ILLEGAL && cur_raw < RAW_PERPETUAL_CHECKED {
                return Err(fail(ctx, idx, sd, format!("sentinel {cur_raw} left in table")));
            }
            // DTM parity: wins are odd plies, losses even.
            if let Score::Dtm(v) = cur[sd] {
                let plies = MATE - v.abs();
                if (v > 0 && plies % 2 == 0) || (v < 0 && plies % 2 == 1) {
                    return Err(fail(ctx, idx, sd, format!("parity violation: {v}")));
                }
            }

            let mut moves = MoveList::new();
            generate_moves(&board, side, &mut moves);
            let mut legal = 0u32;
            let mut best: Option<i16> = None;
            let mut no_loss = 0u32;
            let mut checked_cnt = 0u32;
            let mut evasion_cnt = 0u32;
            for mv in moves.iter() {
                let undo = board.make(mv);
                if !board.in_check(side) {
                    legal += 1;
                    let child = if undo.captured.is_none() {
                        match same_sig_child(table, &board, xside) {
                            Some((key, query)) => table.score(key, query),
                            None => Score::Unset,
                        }
                    } else {
                        match capture_child_score(ctx.db, &board, xside) {
                            Ok(score) => score,
                            Err(err) => {
                                board.unmake(mv, undo);
                                return Err(err);
                            }
                        }
                    };
                    match child {
                        Score::Dtm(_) | Score::Draw => {
                            let value = -child.to_raw();
                            best = Some(best.map_or(value, |b| b.max(value)));
                            if value >= 0 {
                                no_loss += 1;
                            }
                        }
                        Score::PerpetualChecked => checked_cnt += 1,
                        Score::PerpetualEvasion => evasion_cnt += 1,
                        Score::PerpetualCheckedEvasion => {
                            checked_cnt += 1;
                            evasion_cnt += 1;
                        }
                        Score::PerpetualDtm(_) => {}
                        _ => {}
                    }
                }
                board.unmake(mv, undo);
            }

            let ok = if legal == 0 {
                cur_raw == -MATE
            } else if matches!(cur[sd], Score::PerpetualDtm(_)) {
                // Numerised distances were fixed by their own pass.
                true
            } else if cur[sd].is_perpetual_tag() {
                match cur[sd] {
                    Score::PerpetualCheckedEvasion => checked_cnt > 0 || evasion_cnt > 0,
                    Score::PerpetualEvasion => checked_cnt > 0,
                    Score::PerpetualChecked => evasion_cnt > 0,
                    _ => unreachable!("tag match is exhaustive"),
                }
            } else {
                let mut expected = best.unwrap_or(-MATE);
                if expected != 0 {
                    expected += if expected > 0 { -1 } else { 1 };
                }
                let mut ok = cur_raw == expected;
                if !ok {
                    // Perpetual children legitimately displace the plain
                    // minimax value.
                    ok = if checked_cnt > 0 {
                        cur_raw >= 0
                    } else {
                        evasion_cnt > 0
                    };
                }
                ok
            };
            if !ok {
                return Err(fail(
                    ctx,
                    idx,
                    sd,
                    format!(
                        "cell {cur_raw} disagrees with children (best {best:?}, \
                         checked {checked_cnt}, evasion {evasion_cnt}, no-loss {no_loss})"
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Verify a loaded table against its children and sub-endgames.
pub fn verify_file(
    table: &crate::gen_table::GenTable,
    db: &jiangjun_egtb::Database,
    workers: usize,
) -> Result<(), GenError> {
    let ctx = GenContext { table, db, workers };
    verify_table(&ctx)
}

/// Index bijectivity check: every decodable row must rank back to itself
/// among its admissible keys.
pub fn verify_keys(sig: &MaterialSignature) -> Result<(), GenError> {
    let codec = IndexCodec::new(sig, 0)?;
    let mut keys = Vec::new();
    for idx in 0..codec.size() {
        let Some(board) = codec.setup(idx) else {
            continue;
        };
        if codec.all_keys(&board, &mut keys).is_err() || !keys.contains(&idx) {
            return Err(GenError::VerifyFailed {
                name: sig.name().to_string(),
                idx,
                side: 0,
                detail: format!("row decodes but does not rank back: keys {keys:?}"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::verify_keys;
    use jiangjun_core::MaterialSignature;

    #[test]
    fn krk_keys_verify() {
        let sig: MaterialSignature = "krk".parse().unwrap();
        verify_keys(&sig).unwrap();
    }

    #[test]
    fn kpk_keys_verify() {
        let sig: MaterialSignature = "kpk".parse().unwrap();
        verify_keys(&sig).unwrap();
    }
}
