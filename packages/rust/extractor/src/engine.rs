//! Tree walker and concurrent page scanner.
//!
//! Pages are discovered in a deterministic walk order, parsed concurrently on
//! the blocking pool, and merged back in walk order so the candidate sequence
//! does not depend on scheduling.

use std::cmp::Ordering;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use docsetgen_shared::{Candidate, DocsetError, Result};

use crate::page::extract_page;
use crate::rules::RuleSet;

// ---------------------------------------------------------------------------
// Options / results
// ---------------------------------------------------------------------------

/// Runtime extraction options.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Maximum pages parsed at once.
    pub parse_concurrency: usize,
    /// Follow symlinks while walking.
    pub follow_symlinks: bool,
    /// See [`extract_page`].
    pub max_markup_errors: Option<usize>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            parse_concurrency: 4,
            follow_symlinks: true,
            max_markup_errors: None,
        }
    }
}

/// Output of a full tree scan.
#[derive(Debug)]
pub struct Extraction {
    /// Pages visited, including those that failed.
    pub pages_scanned: usize,
    /// Per-file failures; every element is a [`DocsetError::Parse`].
    pub failures: Vec<DocsetError>,
    /// Candidates per successfully parsed page, in walk order.
    pages: Vec<Vec<Candidate>>,
}

impl Extraction {
    /// Total candidates across all pages.
    pub fn candidate_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    /// Consume the scan as one candidate sequence: walk order, then document order.
    pub fn into_candidates(self) -> impl Iterator<Item = Candidate> {
        self.pages.into_iter().flatten()
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Scans a rendered documentation tree for entry candidates.
pub struct Extractor {
    rules: Arc<RuleSet>,
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(rules: RuleSet, options: ExtractOptions) -> Self {
        Self {
            rules: Arc::new(rules),
            options,
        }
    }

    /// Scan every page under `root`.
    #[instrument(skip_all, fields(root = %root.display()))]
    pub async fn extract(&self, root: &Path) -> Result<Extraction> {
        let (pages, mut failures) = walk_pages(root, self.options.follow_symlinks)?;
        let pages_scanned = pages.len() + failures.len();

        info!(
            pages = pages.len(),
            concurrency = self.options.parse_concurrency,
            "scanning pages"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.parse_concurrency.max(1)));
        let mut handles = Vec::with_capacity(pages.len());

        for rel in pages {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| DocsetError::validation(format!("scan semaphore closed: {e}")))?;
            let abs = root.join(&rel);
            let rel_str = rel_to_string(&rel);
            let rules = self.rules.clone();
            let limit = self.options.max_markup_errors;
            let task_rel = rel_str.clone();

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                scan_file(&abs, &task_rel, &rules, limit)
            });
            handles.push((rel_str, handle));
        }

        // Fan-in in walk order.
        let mut scanned = Vec::with_capacity(handles.len());
        for (rel, handle) in handles {
            match handle.await {
                Ok(Ok(candidates)) => {
                    debug!(page = %rel, candidates = candidates.len(), "page scanned");
                    scanned.push(candidates);
                }
                Ok(Err(e)) => {
                    warn!(page = %rel, error = %e, "skipping unparseable page");
                    failures.push(e);
                }
                Err(e) => {
                    warn!(page = %rel, error = %e, "page scan task failed");
                    failures.push(DocsetError::parse(rel, e.to_string()));
                }
            }
        }

        let extraction = Extraction {
            pages_scanned,
            failures,
            pages: scanned,
        };

        info!(
            pages_scanned = extraction.pages_scanned,
            candidates = extraction.candidate_count(),
            failures = extraction.failures.len(),
            "extraction complete"
        );

        Ok(extraction)
    }
}

/// Read, decode, and extract one page.
fn scan_file(
    abs: &Path,
    rel: &str,
    rules: &RuleSet,
    max_markup_errors: Option<usize>,
) -> Result<Vec<Candidate>> {
    let bytes = std::fs::read(abs).map_err(|e| DocsetError::parse(rel, e.to_string()))?;
    let html = String::from_utf8(bytes).map_err(|e| {
        DocsetError::parse(
            rel,
            format!("invalid UTF-8 at byte {}", e.utf8_error().valid_up_to()),
        )
    })?;
    extract_page(rel, &html, rules, max_markup_errors)
}

// ---------------------------------------------------------------------------
// Walking
// ---------------------------------------------------------------------------

/// List page files under `root` (relative paths, walk order).
///
/// Unreadable pages are returned as failures rather than aborting the walk.
/// Other unreadable entries are logged and skipped.
pub fn walk_pages(root: &Path, follow_symlinks: bool) -> Result<(Vec<PathBuf>, Vec<DocsetError>)> {
    if !root.is_dir() {
        return Err(DocsetError::validation(format!(
            "documentation root {} is not a directory",
            root.display()
        )));
    }

    let mut pages = Vec::new();
    let mut failures = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(follow_symlinks)
        .sort_by(walk_order);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e
                    .path()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(rel_to_string)
                    .unwrap_or_default();
                warn!(path = %path, error = %e, "unreadable entry in documentation tree");
                // Only pages count as scanned; unreadable assets are skipped.
                if e.path().is_some_and(is_page) {
                    failures.push(DocsetError::parse(path, e.to_string()));
                }
                continue;
            }
        };

        if !entry.file_type().is_file() || !is_page(entry.path()) {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        pages.push(rel);
    }

    Ok((pages, failures))
}

/// Sibling order: by file stem, then by extension, so `options.html` sorts
/// before `options-legacy.html`.
fn walk_order(a: &DirEntry, b: &DirEntry) -> Ordering {
    let (a, b) = (a.path(), b.path());
    a.file_stem()
        .cmp(&b.file_stem())
        .then_with(|| a.extension().cmp(&b.extension()))
}

/// Whether a file is an HTML page (as opposed to a stylesheet, image, ...).
fn is_page(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
}

/// Render a relative path with `/` separators.
pub fn rel_to_string(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod engine_tests {
    use super::*;
    use uuid::Uuid;

    fn temp_tree(files: &[(&str, &[u8])]) -> PathBuf {
        let root = std::env::temp_dir().join(format!("dg-extract-test-{}", Uuid::now_v7()));
        for (rel, content) in files {
            let path = root.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        root
    }

    #[test]
    fn walk_skips_assets_and_orders_by_stem() {
        let root = temp_tree(&[
            ("options-legacy.html", b"<h1 id=a>A</h1>"),
            ("options.html", b"<h1 id=b>B</h1>"),
            ("style.css", b"body {}"),
            ("images/logo.png", b"\x89PNG"),
            ("guide/intro.HTM", b"<h1 id=c>C</h1>"),
        ]);

        let (pages, failures) = walk_pages(&root, true).unwrap();
        assert!(failures.is_empty());
        let rels: Vec<String> = pages.iter().map(|p| rel_to_string(p)).collect();
        assert_eq!(
            rels,
            vec!["guide/intro.HTM", "options.html", "options-legacy.html"]
        );

        let _ = std::fs::remove_dir_all(&root);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn broken_symlinks_are_skipped() {
        let root = temp_tree(&[
            ("index.html", b"<h1 id=a>A</h1>"),
            ("options.html", b"<dl><dt id=opt-b>b</dt></dl>"),
        ]);
        std::os::unix::fs::symlink(root.join("missing-logo.png"), root.join("logo.png")).unwrap();
        std::os::unix::fs::symlink(root.join("missing.html"), root.join("gone.html")).unwrap();

        let extractor = Extractor::new(RuleSet::builtin(), ExtractOptions::default());
        let extraction = extractor.extract(&root).await.unwrap();

        assert_eq!(extraction.pages_scanned, 3);
        assert_eq!(extraction.failures.len(), 1);
        assert!(extraction.failures[0].to_string().contains("gone.html"));
        assert_eq!(extraction.candidate_count(), 2);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn walk_rejects_missing_root() {
        let missing = std::env::temp_dir().join(format!("dg-missing-{}", Uuid::now_v7()));
        assert!(walk_pages(&missing, true).is_err());
    }

    #[tokio::test]
    async fn unparseable_page_is_reported_not_fatal() {
        let mut files: Vec<(String, Vec<u8>)> = (0..9)
            .map(|i| {
                (
                    format!("page{i}.html"),
                    format!("<h2 id=\"sec-{i}\">Section {i}</h2>").into_bytes(),
                )
            })
            .collect();
        files.push(("broken.html".into(), b"<h2 id=\"x\">\xff\xfe bad</h2>".to_vec()));
        let borrowed: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_slice()))
            .collect();
        let root = temp_tree(&borrowed);

        let extractor = Extractor::new(RuleSet::builtin(), ExtractOptions::default());
        let extraction = extractor.extract(&root).await.unwrap();

        assert_eq!(extraction.pages_scanned, 10);
        assert_eq!(extraction.failures.len(), 1);
        assert!(extraction.failures[0].to_string().contains("broken.html"));
        assert!(extraction.failures[0].to_string().contains("invalid UTF-8"));
        assert_eq!(extraction.candidate_count(), 9);

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn merge_preserves_walk_order_under_concurrency() {
        let files: Vec<(String, Vec<u8>)> = (0..20)
            .map(|i| {
                (
                    format!("p{i:02}.html"),
                    format!("<h2 id=\"a\">First {i}</h2><h2 id=\"b\">Second {i}</h2>")
                        .into_bytes(),
                )
            })
            .collect();
        let borrowed: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_slice()))
            .collect();
        let root = temp_tree(&borrowed);

        let options = ExtractOptions {
            parse_concurrency: 8,
            ..ExtractOptions::default()
        };
        let extractor = Extractor::new(RuleSet::builtin(), options);
        let paths: Vec<String> = extractor
            .extract(&root)
            .await
            .unwrap()
            .into_candidates()
            .map(|c| c.path)
            .collect();

        let expected: Vec<String> = (0..20)
            .flat_map(|i| [format!("p{i:02}.html#a"), format!("p{i:02}.html#b")])
            .collect();
        assert_eq!(paths, expected);

        let _ = std::fs::remove_dir_all(&root);
    }
}
