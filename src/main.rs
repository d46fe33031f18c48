use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use jiangjun_core::{Board, MaterialSignature};
use jiangjun_egtb::{Database, LoadMode, MATE, MemMode, Score};
use jiangjun_egtbgen::{CompressMode, GenOptions, GenTable, Generator};

/// Xiangqi endgame tablebase generator and prober.
#[derive(Parser)]
#[command(name = "jiangjun", version, about)]
struct Cli {
    /// Tablebase data folder.
    #[arg(short = 'd', long, default_value = "db", global = true)]
    dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an endgame and every missing sub-endgame.
    Gen {
        /// Endgame name, e.g. `krk` or `krkaa`.
        #[arg(short, long)]
        name: String,
        /// Extra worker threads.
        #[arg(long, default_value_t = 0)]
        cores: usize,
        /// Two-byte cells from the start (needed for very deep mates).
        #[arg(long)]
        two_bytes: bool,
        /// Use the forward solver instead of the backward one.
        #[arg(long)]
        forward: bool,
        /// Write raw `.xtb` files instead of compressed `.ztb`.
        #[arg(long)]
        raw: bool,
        /// Rewrite illegal runs before compressing.
        #[arg(long)]
        optimized: bool,
        /// Disable checkpoint temp files.
        #[arg(long)]
        no_temp_files: bool,
        /// Search group permutations for the best-compressing order.
        #[arg(long)]
        optimize_order: bool,
        /// Resolve perpetual check/chase classes after the base build.
        #[arg(long)]
        fix_perpetual: bool,
    },

    /// Probe a position and print the score and best line.
    Probe {
        /// FEN of the position.
        #[arg(long)]
        fen: String,
    },

    /// Re-derive every cell of a generated endgame from its children.
    Verify {
        /// Endgame name.
        #[arg(short, long)]
        name: String,
        /// Extra worker threads.
        #[arg(long, default_value_t = 0)]
        cores: usize,
    },

    /// Check the board/index bijection of an endgame.
    VerifyKeys {
        /// Endgame name.
        #[arg(short, long)]
        name: String,
    },

    /// Resolve perpetual check/chase classes on a generated endgame.
    Fixcc {
        /// Endgame name.
        #[arg(short, long)]
        name: String,
        /// Extra worker threads.
        #[arg(long, default_value_t = 0)]
        cores: usize,
    },

    /// List every sub-endgame a generation run would need.
    Subinfo {
        /// Endgame name.
        #[arg(short, long)]
        name: String,
    },

    /// List the endgames found under the data folder.
    Info,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Gen {
            name,
            cores,
            two_bytes,
            forward,
            raw,
            optimized,
            no_temp_files,
            optimize_order,
            fix_perpetual,
        } => {
            let mut db = Database::new(MemMode::All);
            db.load(&[cli.dir.clone()], LoadMode::OnRequest)?;
            let opts = GenOptions {
                extra_threads: cores,
                two_bytes,
                backward: !forward,
                compress: if raw {
                    CompressMode::None
                } else if optimized {
                    CompressMode::CompressOptimized
                } else {
                    CompressMode::Compress
                },
                use_checkpoints: !no_temp_files,
                optimize_order,
                fix_perpetual,
            };
            let mut generator = Generator::new(&mut db, &cli.dir, opts);
            let done = generator.generate(&name)?;
            if done.is_empty() {
                info!("nothing to do: {name} and all sub-endgames already present");
            } else {
                info!("generated: {}", done.join(", "));
            }
        }

        Command::Probe { fen } => {
            let mut db = Database::new(MemMode::Smart);
            db.load(&[cli.dir.clone()], LoadMode::OnRequest)?;
            let board: Board = fen
                .parse()
                .map_err(|e| anyhow::anyhow!("bad FEN: {e}"))?;
            let (score, line) = db.probe(&board);
            println!("{board}");
            println!("score: {}", explain_score(score));
            if !line.is_empty() {
                let moves: Vec<String> = line.iter().map(|m| m.to_string()).collect();
                println!("line:  {}", moves.join(" "));
            }
        }

        Command::Verify { name, cores } => {
            let mut db = Database::new(MemMode::All);
            db.load(&[cli.dir.clone()], LoadMode::OnRequest)?;
            let file = db
                .get(&name)
                .with_context(|| format!("endgame '{name}' not found under {}", cli.dir.display()))?;
            let table = GenTable::from_table_file(file)?;
            jiangjun_egtbgen::verify_file(&table, &db, 1 + cores)?;
            println!("{name} passed");
        }

        Command::VerifyKeys { name } => {
            let sig = MaterialSignature::parse_canonical(&name)?;
            jiangjun_egtbgen::verify_keys(&sig)?;
            println!("{name} keys passed");
        }

        Command::Fixcc { name, cores } => {
            let mut db = Database::new(MemMode::All);
            db.load(&[cli.dir.clone()], LoadMode::OnRequest)?;
            let sig = MaterialSignature::parse_canonical(&name)?;
            if !sig.is_both_armed() {
                bail!("'{name}' is not both-armed; nothing to fix");
            }
            let file = db
                .get(&name)
                .with_context(|| format!("endgame '{name}' not found under {}", cli.dir.display()))?;
            let mut table = GenTable::from_table_file(file)?;
            let found = jiangjun_egtbgen::resolve_perpetual(&mut table, &db, 1 + cores)?;
            if !found {
                println!("no perpetual positions in {name}");
            } else {
                jiangjun_egtbgen::verify_file(&table, &db, 1 + cores)?;
                let (_, sub) = jiangjun_egtb::subfolders(&sig);
                let folder = cli.dir.join(sub);
                for side in jiangjun_core::Color::ALL {
                    table.save_side(&folder, side, CompressMode::Compress)?;
                }
                table.write_stats(&folder)?;
                println!("{name} fixed and rewritten");
            }
        }

        Command::Subinfo { name } => {
            MaterialSignature::parse_canonical(&name)?;
            let mut total = 0u64;
            let list = jiangjun_egtbgen::expand_with_subs(&name);
            for (i, sig) in list.iter().enumerate() {
                let size = jiangjun_egtb::IndexCodec::new(sig, 0)?.size();
                total += size;
                println!("{:3}) {:16} {size:>15}", i + 1, sig.name());
            }
            println!("total files: {}, total size: {total}", list.len());
        }

        Command::Info => {
            let mut db = Database::new(MemMode::Tiny);
            db.load(&[cli.dir.clone()], LoadMode::OnRequest)?;
            println!("{} endgames under {}", db.len(), cli.dir.display());
        }
    }
    Ok(())
}

fn explain_score(score: Score) -> String {
    match score {
        Score::Draw => "draw".to_string(),
        Score::Dtm(v) => {
            let plies = MATE - v.abs();
            let moves = (plies + 1) / 2;
            if v > 0 {
                format!("mate in {moves} ({plies} plies)")
            } else {
                format!("mated in {moves} ({plies} plies)")
            }
        }
        Score::PerpetualDtm(v) => format!("perpetual, numerised {v}"),
        Score::Winning => "winning (distance undetermined)".to_string(),
        Score::Unknown => "unknown".to_string(),
        Score::Illegal => "illegal position".to_string(),
        Score::Missing => "missing (endgame tables not loaded)".to_string(),
        Score::Unset => "unset".to_string(),
        Score::PerpetualChecked => {
            "perpetually checked: the opponent must check forever and loses".to_string()
        }
        Score::PerpetualEvasion => {
            "perpetual evasion: the side to move checks forever and loses".to_string()
        }
        Score::PerpetualCheckedEvasion => "perpetual check and evasion".to_string(),
    }
}
