//! Table file naming and the on-disk folder layout.
//!
//! One file per (signature, side): `<signature><b|w>.<ext>` with `.xtb`
//! for raw and `.ztb` for compressed DTM tables. The `.ltb`/`.zlt` lookup
//! sidecar extensions are recognised by the scanner but not produced.
//! Files sit two folders deep, named by attacker counts and attacker
//! letters, e.g. `1-1/r-h/krkhb.ztb`.

use std::path::{Path, PathBuf};

use jiangjun_core::{Color, MaterialSignature, PieceKind};

/// Raw DTM table extension.
pub const EXT_DTM: &str = ".xtb";
/// Compressed DTM table extension.
pub const EXT_DTM_COMPRESSED: &str = ".ztb";
/// Lookup sidecar extensions (recognised, not produced).
pub const EXT_LOOKUP: &str = ".ltb";
/// Compressed lookup sidecar extension.
pub const EXT_LOOKUP_COMPRESSED: &str = ".zlt";

/// File name for one side of a signature.
pub fn table_file_name(name: &str, side: Color, compressed: bool) -> String {
    let ext = if compressed { EXT_DTM_COMPRESSED } else { EXT_DTM };
    format!("{}{}{ext}", name.to_ascii_lowercase(), side.side_char())
}

/// Whether a path carries a DTM table extension.
pub fn is_table_path(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("xtb") | Some("ztb"))
}

/// Whether a path carries a lookup sidecar extension.
pub fn is_lookup_path(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("ltb") | Some("zlt"))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Split a table file path into `(signature_name, side)`.
pub fn parse_table_path(path: &Path) -> Option<(String, Color)> {
    let stem = path.file_stem()?.to_str()?.to_ascii_lowercase();
    let side = match stem.chars().last()? {
        'b' => Color::Black,
        'w' => Color::White,
        _ => return None,
    };
    let name = stem[..stem.len() - 1].to_string();
    if name.len() < 2 {
        return None;
    }
    Some((name, side))
}

/// The two nested subfolders a signature's files live in:
/// attacker counts (`2` or `1-1`), then attacker letters (`rh` or `r-h`).
pub fn subfolders(sig: &MaterialSignature) -> (PathBuf, PathBuf) {
    let counts = [
        sig.attacker_count(Color::White),
        sig.attacker_count(Color::Black),
    ];
    let top = if counts[0] == 0 || counts[1] == 0 {
        format!("{}", counts[0] + counts[1])
    } else {
        format!("{}-{}", counts[0], counts[1])
    };

    let mut letters = [String::new(), String::new()];
    for (i, color) in [Color::White, Color::Black].into_iter().enumerate() {
        for kind in [
            PieceKind::Rook,
            PieceKind::Cannon,
            PieceKind::Horse,
            PieceKind::Pawn,
        ] {
            for _ in 0..sig.count(color, kind) {
                letters[i].push(kind.letter());
            }
        }
    }
    let second = if counts[0] == 0 {
        letters[1].clone()
    } else if counts[1] == 0 {
        letters[0].clone()
    } else {
        format!("{}-{}", letters[0], letters[1])
    };

    let top_path = PathBuf::from(top);
    let second_path = top_path.join(second);
    (top_path, second_path)
}

/// Full path of one side's file under a root folder.
pub fn table_path(root: &Path, sig: &MaterialSignature, side: Color, compressed: bool) -> PathBuf {
    let (_, sub) = subfolders(sig);
    root.join(sub).join(table_file_name(sig.name(), side, compressed))
}
