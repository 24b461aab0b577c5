//! Core domain types for docset entries and revision bundles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DocsetError, Result};

/// Current schema version for the `meta.json` bundle descriptor.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// EntryKind
// ---------------------------------------------------------------------------

/// The fixed taxonomy of entry kinds.
///
/// The `Display` spelling is the Dash entry type stored in the `type` column
/// of the search index, which is what documentation browsers use to pick an
/// icon and a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryKind {
    Option,
    Package,
    Function,
    Variable,
    Command,
    Environment,
    Section,
}

impl EntryKind {
    /// Every kind, in declaration order.
    pub const ALL: [EntryKind; 7] = [
        EntryKind::Option,
        EntryKind::Package,
        EntryKind::Function,
        EntryKind::Variable,
        EntryKind::Command,
        EntryKind::Environment,
        EntryKind::Section,
    ];

    /// The Dash entry type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Option => "Option",
            EntryKind::Package => "Package",
            EntryKind::Function => "Function",
            EntryKind::Variable => "Variable",
            EntryKind::Command => "Command",
            EntryKind::Environment => "Environment",
            EntryKind::Section => "Section",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    /// Case-insensitive parse of a Dash entry type name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EntryKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown entry kind {s:?}"))
    }
}

/// Structural shape of a documentation unit (the element an anchor belongs to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitShape {
    /// A definition term (`<dt>`).
    Term,
    /// A heading (`<h1>`..`<h6>`).
    Heading,
    /// Either of the above.
    Any,
}

// ---------------------------------------------------------------------------
// Candidate / Entry
// ---------------------------------------------------------------------------

/// A raw entry as found by the extractor, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Label or visible text, untrimmed.
    pub name: String,
    pub kind: EntryKind,
    /// `<file-relative-path>#<identifier>`.
    pub path: String,
}

/// One canonical, indexable documentation unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    /// Searchable term (option path, function name, section title, ...).
    pub name: String,
    /// Category in the documentation browser.
    pub kind: EntryKind,
    /// `file#anchor`, relative to the bundle's content root.
    pub path: String,
}

impl Entry {
    /// The file component of `path` (everything before the first `#`).
    pub fn file(&self) -> &str {
        split_path(&self.path).0
    }

    /// The anchor component of `path`, if any.
    pub fn anchor(&self) -> Option<&str> {
        split_path(&self.path).1
    }
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('#') {
        Some((file, anchor)) => (file, Some(anchor)),
        None => (path, None),
    }
}

// ---------------------------------------------------------------------------
// Revisions
// ---------------------------------------------------------------------------

/// Normalize a revision identifier for use in paths and bundle identifiers.
///
/// `/` and `:` are replaced by `-`, so `release/25.05` becomes `release-25.05`.
pub fn normalize_revision(revision: &str) -> String {
    revision.replace(['/', ':'], "-")
}

/// Normalized revision as a single directory name under the output directory.
///
/// Fails for ids that would not name a child directory: empty, `.`, `..`, or
/// containing `\` or NUL.
pub fn revision_dir(revision: &str) -> Result<String> {
    let dir = normalize_revision(revision.trim());
    if dir.is_empty() || dir == "." || dir == ".." || dir.contains(['\\', '\0']) {
        return Err(DocsetError::validation(format!(
            "revision '{revision}' cannot be used as an output directory name"
        )));
    }
    Ok(dir)
}

/// Static metadata describing a bundle family, shared by every revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Docset directory name and archive stem (`<name>.docset.tgz`).
    pub name: String,
    /// Reverse-DNS-ish identifier; the revision is appended per bundle.
    pub bundle_id: String,
    /// Human-readable title shown in the documentation browser.
    pub title: String,
    /// Platform/family tag (`DocSetPlatformFamily`), used as the search keyword.
    pub platform_family: String,
    /// Landing page inside the content tree.
    pub index_page: String,
}

/// The `meta.json` descriptor stored at the root of each docset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleDescriptor {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    pub name: String,
    pub title: String,
    /// Revision as requested (before normalization).
    pub revision: String,
    /// Tool version that produced the bundle.
    pub tool_version: String,
    pub entry_count: usize,
    /// Relative location of the index inside the docset.
    pub index_path: String,
    /// Relative location of the content tree inside the docset.
    pub content_root: String,
}
