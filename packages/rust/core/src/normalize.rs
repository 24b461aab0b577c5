//! Candidate normalization: name cleanup and first-occurrence-wins dedup.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use docsetgen_shared::{Candidate, Entry, EntryKind};

/// The canonical entry list and what was dropped to get there.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Canonical entries in first-seen order.
    pub entries: Vec<Entry>,
    /// Candidates discarded because an earlier one had the same name and kind.
    pub duplicates_dropped: usize,
    /// Candidates discarded because their name was blank.
    pub empty_dropped: usize,
}

/// Collapse whitespace runs to a single space and trim.
pub fn clean_name(raw: &str) -> String {
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
    WS_RE.replace_all(raw.trim(), " ").into_owned()
}

/// Turn the full candidate sequence into the canonical entry list.
///
/// Candidates must arrive in walk order, then document order. Output order
/// is first-seen order; nothing is re-sorted.
pub fn normalize(candidates: impl IntoIterator<Item = Candidate>) -> Normalized {
    let mut seen: HashSet<(String, EntryKind)> = HashSet::new();
    let mut out = Normalized::default();

    for candidate in candidates {
        let name = clean_name(&candidate.name);
        if name.is_empty() {
            debug!(path = %candidate.path, kind = %candidate.kind, "dropping candidate with empty name");
            out.empty_dropped += 1;
            continue;
        }

        if !seen.insert((name.clone(), candidate.kind)) {
            debug!(name = %name, kind = %candidate.kind, path = %candidate.path, "dropping duplicate");
            out.duplicates_dropped += 1;
            continue;
        }

        out.entries.push(Entry {
            name,
            kind: candidate.kind,
            path: candidate.path,
        });
    }

    info!(
        entries = out.entries.len(),
        duplicates_dropped = out.duplicates_dropped,
        empty_dropped = out.empty_dropped,
        "normalization complete"
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(name: &str, kind: EntryKind, path: &str) -> Candidate {
        Candidate {
            name: name.into(),
            kind,
            path: path.into(),
        }
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(clean_name("  Obtaining \n\t NixOS  "), "Obtaining NixOS");
        assert_eq!(clean_name("services.nginx.enable"), "services.nginx.enable");
        assert_eq!(clean_name(" \u{a0}\n "), "");
    }

    #[test]
    fn first_occurrence_wins() {
        let result = normalize([
            cand("services.nginx.enable", EntryKind::Option, "options.html#opt-services.nginx.enable"),
            cand(
                "services.nginx.enable",
                EntryKind::Option,
                "options-legacy.html#opt-services.nginx.enable",
            ),
        ]);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].path, "options.html#opt-services.nginx.enable");
        assert_eq!(result.duplicates_dropped, 1);
        assert_eq!(result.empty_dropped, 0);
    }

    #[test]
    fn same_name_different_kind_is_kept() {
        let result = normalize([
            cand("nginx", EntryKind::Package, "a.html#pkg-nginx"),
            cand("nginx", EntryKind::Section, "b.html#sec-nginx"),
        ]);
        assert_eq!(result.entries.len(), 2);
        assert_eq!(result.duplicates_dropped, 0);
    }

    #[test]
    fn duplicates_compare_cleaned_names() {
        let result = normalize([
            cand("Getting  started", EntryKind::Section, "a.html#x"),
            cand(" Getting started\n", EntryKind::Section, "b.html#y"),
        ]);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].name, "Getting started");
        assert_eq!(result.duplicates_dropped, 1);
    }

    #[test]
    fn empty_names_are_counted() {
        let result = normalize([
            cand("   ", EntryKind::Section, "a.html#blank"),
            cand("Real", EntryKind::Section, "a.html#real"),
        ]);
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.empty_dropped, 1);
    }

    #[test]
    fn order_is_preserved() {
        let result = normalize([
            cand("zeta", EntryKind::Function, "a.html#z"),
            cand("alpha", EntryKind::Function, "a.html#a"),
            cand("mu", EntryKind::Function, "b.html#m"),
        ]);
        let names: Vec<&str> = result.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mu"]);
    }

    #[test]
    fn empty_input() {
        let result = normalize(Vec::new());
        assert!(result.entries.is_empty());
        assert_eq!(result.duplicates_dropped, 0);
        assert_eq!(result.empty_dropped, 0);
    }
}
