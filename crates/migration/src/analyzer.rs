//! Unit-of-measure conflict detection.

use catbridge_catalog::{RemoteUnit, names_match, normalize_name};

use crate::state::UomConflict;

/// Local unit spellings that mean "one item".
pub const UNIT_SYNONYMS: &[&str] = &["piece", "pieces", "pc", "pcs", "unit", "units", "each", "ea"];

/// Remote unit whose name equals `local` case-insensitively.
pub fn exact_unit<'a>(local: &str, remote_units: &'a [RemoteUnit]) -> Option<&'a RemoteUnit> {
    remote_units.iter().find(|u| names_match(&u.name, local))
}

/// Remote "unit"-like unit for a local synonym of "one item".
pub fn heuristic_unit<'a>(local: &str, remote_units: &'a [RemoteUnit]) -> Option<&'a RemoteUnit> {
    let local = normalize_name(local);
    if !UNIT_SYNONYMS.contains(&local.as_str()) {
        return None;
    }
    remote_units
        .iter()
        .find(|u| normalize_name(&u.name).contains("unit"))
}

/// Conflicts for every distinct, non-blank local unit with no remote match.
///
/// Output follows first appearance in `local_uoms`.
pub fn analyze<S: AsRef<str>>(local_uoms: &[S], remote_units: &[RemoteUnit]) -> Vec<UomConflict> {
    let mut conflicts: Vec<UomConflict> = Vec::new();

    for uom in local_uoms {
        let uom = uom.as_ref().trim();
        if uom.is_empty() || conflicts.iter().any(|c| names_match(&c.local_uom, uom)) {
            continue;
        }
        if exact_unit(uom, remote_units).is_some() || heuristic_unit(uom, remote_units).is_some() {
            continue;
        }
        conflicts.push(UomConflict::unresolved(uom));
    }

    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(names: &[&str]) -> Vec<RemoteUnit> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| RemoteUnit {
                id: i as i64 + 1,
                name: n.to_string(),
            })
            .collect()
    }

    #[test]
    fn exact_case_insensitive_match_is_not_a_conflict() {
        let remote = units(&["m", "kg", "Units"]);
        assert!(analyze(&["M", "KG"], &remote).is_empty());
    }

    #[test]
    fn piece_resolves_to_units() {
        let remote = units(&["m", "Units"]);
        assert!(analyze(&["piece"], &remote).is_empty());
        assert_eq!(heuristic_unit("PCS", &remote).map(|u| u.id), Some(2));
    }

    #[test]
    fn synonym_without_unit_like_remote_is_a_conflict() {
        let remote = units(&["m"]);
        let conflicts = analyze(&["each"], &remote);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].local_uom, "each");
    }

    #[test]
    fn unknown_unit_is_one_unresolved_conflict() {
        let remote = units(&["m", "Units"]);
        let conflicts = analyze(&["furlong", "Furlong", "m"], &remote);

        assert_eq!(conflicts, vec![UomConflict::unresolved("furlong")]);
    }

    #[test]
    fn blank_units_are_ignored() {
        let remote = units(&["m"]);
        assert!(analyze(&["", "   "], &remote).is_empty());
    }

    #[test]
    fn conflicts_keep_first_appearance_order() {
        let remote = units(&["m"]);
        let conflicts = analyze(&["rolls", "m", "sheets", "ROLLS"], &remote);
        let names: Vec<&str> = conflicts.iter().map(|c| c.local_uom.as_str()).collect();
        assert_eq!(names, vec!["rolls", "sheets"]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: a catalog using only remote unit names (any casing) has no conflicts.
            #[test]
            fn remote_names_never_conflict(
                picks in proptest::collection::vec((0usize..4, any::<bool>()), 0..20)
            ) {
                let remote = units(&["m", "kg", "Rolls", "Sheets"]);
                let local: Vec<String> = picks
                    .iter()
                    .map(|(i, upper)| {
                        let name = remote[*i].name.clone();
                        if *upper { name.to_uppercase() } else { name.to_lowercase() }
                    })
                    .collect();

                prop_assert!(analyze(&local, &remote).is_empty());
            }

            /// Property: conflicts are distinct and never mark a resolution.
            #[test]
            fn conflicts_are_distinct_and_unresolved(
                local in proptest::collection::vec("[a-d]{1,3}", 0..20)
            ) {
                let remote = units(&["aa"]);
                let conflicts = analyze(&local, &remote);

                let distinct: std::collections::HashSet<String> =
                    conflicts.iter().map(|c| normalize_name(&c.local_uom)).collect();
                prop_assert_eq!(distinct.len(), conflicts.len());
                prop_assert!(conflicts.iter().all(|c| c.resolved_remote_id.is_none()));
                prop_assert!(!distinct.contains("aa"));
            }
        }
    }
}
