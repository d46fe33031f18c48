//! Sub-endgame name expansion: every signature reachable by captures,
//! canonicalised and ordered smaller-first so generation runs bottom-up.

use std::collections::BTreeMap;

use jiangjun_core::MaterialSignature;

/// The target signature plus every capture-reachable sub-signature, in
/// generation order (smallest first, target last).
pub fn expand_with_subs(name: &str) -> Vec<MaterialSignature> {
    let mut found: BTreeMap<String, MaterialSignature> = BTreeMap::new();
    collect(name, &mut found);
    let mut list: Vec<MaterialSignature> = found.into_values().collect();
    list.sort_by(|a, b| a.generation_cmp(b));
    list
}

fn collect(name: &str, found: &mut BTreeMap<String, MaterialSignature>) {
    if found.contains_key(name) {
        return;
    }
    let Ok(sig) = MaterialSignature::parse_canonical(name) else {
        return;
    };
    found.insert(name.to_string(), sig.clone());

    let split = name[1..].find('k').map(|i| i + 1).unwrap_or(name.len());
    let halves = [&name[..split], &name[split..]];
    for (own, other) in [(halves[0], halves[1]), (halves[1], halves[0])] {
        // Drop each non-king piece once: a capture into the sub-endgame.
        for i in 1..own.len() {
            let shrunk = format!("{}{}", &own[..i], &own[i + 1..]);
            collect(&format!("{shrunk}{other}"), found);
            collect(&format!("{other}{shrunk}"), found);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::expand_with_subs;

    #[test]
    fn krk_has_no_subs() {
        let list = expand_with_subs("krk");
        let names: Vec<&str> = list.iter().map(|s| s.name()).collect();
        // Dropping the rook leaves bare kings, which is not a table.
        assert_eq!(names, vec!["krk"]);
    }

    #[test]
    fn krkr_expands_to_krk() {
        let list = expand_with_subs("krkr");
        let names: Vec<&str> = list.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["krk", "krkr"]);
    }

    #[test]
    fn defenders_expand_too() {
        let list = expand_with_subs("krkaa");
        let names: Vec<&str> = list.iter().map(|s| s.name()).collect();
        assert!(names.contains(&"krk"));
        assert!(names.contains(&"krka"));
        assert!(names.contains(&"krkaa"));
        // Smallest first, target last.
        assert_eq!(names.first(), Some(&"krk"));
        assert_eq!(names.last(), Some(&"krkaa"));
    }

    #[test]
    fn reversed_subs_are_canonicalised() {
        // Capturing White's rook in krkc leaves Black's cannon: the
        // sub-endgame is stored as kck, not kkc.
        let list = expand_with_subs("krkc");
        let names: Vec<&str> = list.iter().map(|s| s.name()).collect();
        assert!(names.contains(&"kck"));
        assert!(names.contains(&"krk"));
    }
}
