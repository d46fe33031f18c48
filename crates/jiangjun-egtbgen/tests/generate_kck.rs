//! End-to-end kck generation: cannon movement and cannon checks must be
//! mutually consistent through the solver and its verify pass.

use std::path::PathBuf;
use std::sync::OnceLock;

use tempfile::TempDir;

use jiangjun_core::{Board, Color};
use jiangjun_egtb::{Database, LoadMode, MemMode, Score};
use jiangjun_egtbgen::{GenOptions, Generator};

fn built() -> &'static (TempDir, PathBuf) {
    static BUILT: OnceLock<(TempDir, PathBuf)> = OnceLock::new();
    BUILT.get_or_init(|| {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        let mut db = Database::new(MemMode::All);
        let mut generator = Generator::new(&mut db, &root, GenOptions::default());
        let done = generator.generate("kck").expect("kck generates");
        assert_eq!(done, vec!["kck".to_string()]);
        (dir, root)
    })
}

fn open_db() -> Database {
    let (_, root) = built();
    let mut db = Database::new(MemMode::All);
    db.load(std::slice::from_ref(root), LoadMode::OnRequest)
        .expect("load");
    db
}

#[test]
fn table_is_fully_classified() {
    let db = open_db();
    let file = db.get("kck").unwrap().clone();
    // Every cell decodes to a final score: no sentinel survives a build.
    for idx in (0..file.size()).step_by(101) {
        for side in Color::ALL {
            let score = file.score_at(idx, side);
            assert!(
                !matches!(score, Score::Unset | Score::Missing | Score::Unknown),
                "row {idx} side {side} holds {score:?}"
            );
        }
    }
}

#[test]
fn defender_capturing_the_cannon_secures_the_draw() {
    let db = open_db();
    // Black king beside the undefended cannon, black to move.
    let board: Board = "9/9/9/3kC4/9/9/9/1K7/9/9 b".parse().unwrap();
    let raw = db.score(&board).to_raw();
    assert!(raw >= 0, "defender should not be losing: {raw}");
}

#[test]
fn cannon_check_positions_agree_with_their_mirror() {
    let db = open_db();
    // A cornered defender against king and cannon.
    let board: Board = "k8/9/2K2C3/9/9/9/9/9/9/9 b".parse().unwrap();
    let mirrored = board.transformed(jiangjun_core::Transform::MIRROR_FILE);
    assert_eq!(db.score(&board), db.score(&mirrored));
}
