//! End-to-end kpk generation: the pawn-zone index, the half-board king
//! folding and pawn move rules through a full build.

use std::path::PathBuf;
use std::sync::OnceLock;

use tempfile::TempDir;

use jiangjun_core::Board;
use jiangjun_egtb::{Database, KingScheme, LoadMode, MemMode};
use jiangjun_egtbgen::{GenOptions, Generator};

fn built() -> &'static (TempDir, PathBuf) {
    static BUILT: OnceLock<(TempDir, PathBuf)> = OnceLock::new();
    BUILT.get_or_init(|| {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        let mut db = Database::new(MemMode::All);
        let mut generator = Generator::new(&mut db, &root, GenOptions::default());
        let done = generator.generate("kpk").expect("kpk generates");
        assert_eq!(done, vec!["kpk".to_string()]);
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
fn pawn_signature_uses_half_board_kings() {
    let db = open_db();
    let file = db.get("kpk").unwrap().clone();
    assert!(file.ensure_loaded());
    let codec = file.codec().unwrap();
    assert_eq!(codec.scheme(), KingScheme::Half);
    assert_eq!(codec.size(), 1806 * 48);
}

#[test]
fn defender_never_loses_with_a_capturable_pawn() {
    let db = open_db();
    // The black king stands next to the undefended pawn; taking it
    // leaves bare kings, so Black secures at least the draw.
    let board: Board = "9/9/9/9/4k4/4P4/9/1K7/9/9 b".parse().unwrap();
    let raw = db.score(&board).to_raw();
    assert!(
        raw >= 0 && raw.abs() <= jiangjun_egtb::MATE,
        "defender should not be losing: {raw}"
    );
}

#[test]
fn scores_are_mirror_symmetric() {
    let db = open_db();
    let board: Board = "9/9/9/2k6/9/2P6/2K6/9/9/9 w".parse().unwrap();
    let mirrored = board.transformed(jiangjun_core::Transform::MIRROR_FILE);
    assert_eq!(db.score(&board), db.score(&mirrored));
}
