//! Docset bundle assembler.
//!
//! Stages the `.docset` directory for one revision, checks that every entry
//! resolves, writes the descriptors, and packs the result into a gzip'd
//! tarball.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use docsetgen_shared::{
    BundleDescriptor, BundleMetadata, CURRENT_SCHEMA_VERSION, DocsetError, Entry, Result,
    normalize_revision,
};

/// Index location inside a docset.
pub const INDEX_PATH: &str = "Contents/Resources/docSet.dsidx";
/// Content tree location inside a docset.
pub const DOCUMENTS_PATH: &str = "Contents/Resources/Documents";
/// Property list location inside a docset.
pub const PLIST_PATH: &str = "Contents/Info.plist";
/// Machine-readable descriptor at the docset root.
pub const META_FILE: &str = "meta.json";

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// A `<name>.docset` directory being built in a working directory.
#[derive(Debug, Clone)]
pub struct StagedDocset {
    root: PathBuf,
}

impl StagedDocset {
    /// The `<name>.docset` directory itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.root.join(DOCUMENTS_PATH)
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_PATH)
    }

    pub fn plist_path(&self) -> PathBuf {
        self.root.join(PLIST_PATH)
    }

    pub fn meta_path(&self) -> PathBuf {
        self.root.join(META_FILE)
    }
}

/// Create `<work_dir>/<name>.docset` and copy the HTML tree into its
/// `Documents` directory.
///
/// Creates the following layout:
/// ```text
/// <name>.docset/
/// ├── Contents/
/// │   ├── Info.plist            (written by `assemble`)
/// │   └── Resources/
/// │       ├── docSet.dsidx      (written by the index store)
/// │       └── Documents/        (copy of `html_root`)
/// └── meta.json                 (written by `assemble`)
/// ```
#[instrument(skip_all, fields(name = %name, html_root = %html_root.display()))]
pub fn stage_docset(
    work_dir: &Path,
    name: &str,
    html_root: &Path,
    follow_symlinks: bool,
) -> Result<StagedDocset> {
    let staged = StagedDocset {
        root: work_dir.join(format!("{name}.docset")),
    };
    let documents = staged.documents_dir();
    std::fs::create_dir_all(&documents).map_err(|e| DocsetError::io(&documents, e))?;

    let copied = copy_tree(html_root, &documents, follow_symlinks)?;
    debug!(files = copied, path = %staged.root.display(), "content tree staged");

    Ok(staged)
}

/// Copy every regular file under `src` into `dest`, preserving layout.
///
/// Unreadable entries below `src`, such as dangling symlinks, are logged and
/// skipped.
fn copy_tree(src: &Path, dest: &Path, follow_symlinks: bool) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src).follow_links(follow_symlinks).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                let path = e.path().unwrap_or(src);
                warn!(path = %path.display(), error = %e, "not copying unreadable entry");
                continue;
            }
            Err(e) => {
                return Err(DocsetError::write(
                    src,
                    format!("cannot copy content tree: {e}"),
                ));
            }
        };
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| DocsetError::io(&target, e))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target).map_err(|e| DocsetError::io(&target, e))?;
            copied += 1;
        } else {
            debug!(path = %entry.path().display(), "not copying symlink");
        }
    }
    Ok(copied)
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Configuration for one bundle's assembly.
#[derive(Debug, Clone)]
pub struct AssembleConfig {
    pub bundle: BundleMetadata,
    /// Revision as requested.
    pub revision: String,
    /// Tool version string.
    pub tool_version: String,
    /// Final `.docset.tgz` location.
    pub archive_path: PathBuf,
}

/// Output from a successful bundle assembly.
#[derive(Debug, Clone)]
pub struct AssembleResult {
    pub archive_path: PathBuf,
    /// Hex SHA-256 of the archive.
    pub sha256: String,
    pub size_bytes: u64,
    /// The descriptor written to `meta.json`.
    pub descriptor: BundleDescriptor,
}

/// Finish a staged docset and publish its archive.
///
/// The staged index must already be written. Fails with
/// [`DocsetError::DanglingPaths`] if any entry's file is missing from the
/// content tree, in which case nothing is written to `archive_path`.
#[instrument(skip_all, fields(revision = %config.revision, entries = entries.len()))]
pub fn assemble(
    config: &AssembleConfig,
    staged: &StagedDocset,
    entries: &[Entry],
) -> Result<AssembleResult> {
    let dangling = find_dangling(&staged.documents_dir(), entries);
    if !dangling.is_empty() {
        return Err(DocsetError::DanglingPaths {
            revision: config.revision.clone(),
            paths: dangling,
        });
    }

    let plist_path = staged.plist_path();
    let plist = info_plist(&config.bundle, &config.revision);
    std::fs::write(&plist_path, plist).map_err(|e| DocsetError::io(&plist_path, e))?;

    let descriptor = BundleDescriptor {
        schema_version: CURRENT_SCHEMA_VERSION,
        name: config.bundle.name.clone(),
        title: config.bundle.title.clone(),
        revision: config.revision.clone(),
        tool_version: config.tool_version.clone(),
        entry_count: entries.len(),
        index_path: INDEX_PATH.into(),
        content_root: DOCUMENTS_PATH.into(),
    };
    write_json(&staged.meta_path(), &descriptor)?;

    validate_docset(staged.root())?;

    let (sha256, size_bytes) = write_archive(staged.root(), &config.archive_path)?;

    info!(
        archive = %config.archive_path.display(),
        size_bytes,
        sha256 = %sha256,
        "bundle assembled"
    );

    Ok(AssembleResult {
        archive_path: config.archive_path.clone(),
        sha256,
        size_bytes,
        descriptor,
    })
}

/// Entry paths whose file component is missing under `documents`.
pub fn find_dangling(documents: &Path, entries: &[Entry]) -> Vec<String> {
    entries
        .iter()
        .filter(|entry| !documents.join(entry.file()).is_file())
        .map(|entry| entry.path.clone())
        .collect()
}

/// Verify that a staged docset is well-formed.
pub fn validate_docset(root: &Path) -> Result<()> {
    for required in [PLIST_PATH, INDEX_PATH, META_FILE] {
        if !root.join(required).is_file() {
            return Err(DocsetError::validation(format!("missing {required}")));
        }
    }
    if !root.join(DOCUMENTS_PATH).is_dir() {
        return Err(DocsetError::validation(format!("missing {DOCUMENTS_PATH}/")));
    }

    let meta_path = root.join(META_FILE);
    let content = std::fs::read_to_string(&meta_path).map_err(|e| DocsetError::io(&meta_path, e))?;
    let descriptor: BundleDescriptor = serde_json::from_str(&content)
        .map_err(|e| DocsetError::validation(format!("invalid meta.json: {e}")))?;

    if descriptor.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(DocsetError::validation(format!(
            "unsupported schema_version: {} (expected {})",
            descriptor.schema_version, CURRENT_SCHEMA_VERSION
        )));
    }

    Ok(())
}

/// Render `Info.plist` for one revision.
pub fn info_plist(bundle: &BundleMetadata, revision: &str) -> String {
    use quick_xml::escape::escape;

    let identifier = format!("{}-{}", bundle.bundle_id, normalize_revision(revision));
    let display_name = format!("{} ({revision})", bundle.title);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>CFBundleIdentifier</key>
	<string>{}</string>
	<key>CFBundleName</key>
	<string>{}</string>
	<key>DocSetPlatformFamily</key>
	<string>{}</string>
	<key>isDashDocset</key>
	<true/>
	<key>dashIndexFilePath</key>
	<string>{}</string>
	<key>isJavaScriptEnabled</key>
	<true/>
</dict>
</plist>
"#,
        escape(identifier.as_str()),
        escape(display_name.as_str()),
        escape(bundle.platform_family.as_str()),
        escape(bundle.index_page.as_str()),
    )
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

/// Pack `docset_dir` into a `.tgz` at `archive_path`, atomically.
///
/// The archive is written to a temporary file in the destination directory
/// and renamed into place only when complete. Entries are added in sorted
/// order with zeroed timestamps. Returns the hex SHA-256 and the size.
pub fn write_archive(docset_dir: &Path, archive_path: &Path) -> Result<(String, u64)> {
    let parent = archive_path
        .parent()
        .ok_or_else(|| DocsetError::write(archive_path, "archive path has no parent directory"))?;
    std::fs::create_dir_all(parent).map_err(|e| DocsetError::io(parent, e))?;

    let base = docset_dir
        .file_name()
        .ok_or_else(|| DocsetError::validation("docset directory has no name"))?;

    let tmp = tempfile::Builder::new()
        .prefix(".docset-")
        .suffix(".tgz.tmp")
        .tempfile_in(parent)
        .map_err(|e| DocsetError::write(parent, e.to_string()))?;

    {
        let file = tmp
            .reopen()
            .map_err(|e| DocsetError::write(tmp.path(), e.to_string()))?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for entry in WalkDir::new(docset_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| DocsetError::write(archive_path, e.to_string()))?;
            let rel = entry.path().strip_prefix(docset_dir).unwrap_or(entry.path());
            let name = Path::new(base).join(rel);
            append_entry(&mut builder, entry.path(), &name, entry.file_type().is_dir())
                .map_err(|e| DocsetError::write(archive_path, e.to_string()))?;
        }

        let encoder = builder
            .into_inner()
            .map_err(|e| DocsetError::write(archive_path, e.to_string()))?;
        let mut writer = encoder
            .finish()
            .map_err(|e| DocsetError::write(archive_path, e.to_string()))?;
        writer
            .flush()
            .map_err(|e| DocsetError::write(archive_path, e.to_string()))?;
    }

    let (sha256, size) = hash_file(tmp.path())?;

    tmp.persist(archive_path)
        .map_err(|e| DocsetError::write(archive_path, e.error.to_string()))?;

    debug!(path = %archive_path.display(), size, "archive written");
    Ok((sha256, size))
}

fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    src: &Path,
    name: &Path,
    is_dir: bool,
) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);

    if is_dir {
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        builder.append_data(&mut header, name, io::empty())
    } else {
        let file = File::open(src)?;
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(file.metadata()?.len());
        builder.append_data(&mut header, name, file)
    }
}

/// Hex SHA-256 and size of a file.
fn hash_file(path: &Path) -> Result<(String, u64)> {
    let mut file = File::open(path).map_err(|e| DocsetError::io(path, e))?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher).map_err(|e| DocsetError::io(path, e))?;
    Ok((format!("{:x}", hasher.finalize()), size))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write a JSON file (pretty-printed).
fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| DocsetError::validation(format!("JSON serialization failed: {e}")))?;
    std::fs::write(path, json).map_err(|e| DocsetError::io(path, e))?;
    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use docsetgen_shared::EntryKind;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("dg-assembler-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn html_tree(root: &Path) {
        std::fs::create_dir_all(root.join("release")).unwrap();
        std::fs::write(root.join("index.html"), "<h1 id=top>Top</h1>").unwrap();
        std::fs::write(root.join("options.html"), "<dl><dt id=opt-a>a</dt></dl>").unwrap();
        std::fs::write(root.join("release/notes.html"), "<h2 id=r>R</h2>").unwrap();
    }

    fn bundle() -> BundleMetadata {
        BundleMetadata {
            name: "nixpkgs".into(),
            bundle_id: "nixpkgs".into(),
            title: "Nixpkgs".into(),
            platform_family: "nixpkgs".into(),
            index_page: "index.html".into(),
        }
    }

    fn entry(path: &str) -> Entry {
        Entry {
            name: path.into(),
            kind: EntryKind::Section,
            path: path.into(),
        }
    }

    /// Stage a docset and drop a placeholder index into it.
    fn staged(tmp: &Path) -> StagedDocset {
        let html = tmp.join("html");
        html_tree(&html);
        let staged = stage_docset(&tmp.join("work"), "nixpkgs", &html, true).unwrap();
        std::fs::write(staged.index_path(), b"index").unwrap();
        staged
    }

    fn config(tmp: &Path) -> AssembleConfig {
        AssembleConfig {
            bundle: bundle(),
            revision: "release/25.05".into(),
            tool_version: "0.1.0-test".into(),
            archive_path: tmp.join("out/release-25.05/nixpkgs.docset.tgz"),
        }
    }

    #[test]
    fn staging_copies_content_tree() {
        let tmp = temp_dir();
        let staged = staged(&tmp);
        assert!(staged.root().ends_with("nixpkgs.docset"));
        assert!(staged.documents_dir().join("index.html").is_file());
        assert!(staged.documents_dir().join("release/notes.html").is_file());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[cfg(unix)]
    #[test]
    fn staging_skips_dangling_symlinks() {
        let tmp = temp_dir();
        let html = tmp.join("html");
        html_tree(&html);
        std::os::unix::fs::symlink(html.join("missing-logo.png"), html.join("logo.png")).unwrap();

        let staged = stage_docset(&tmp.join("work"), "nixpkgs", &html, true).unwrap();
        assert!(staged.documents_dir().join("index.html").is_file());
        assert!(!staged.documents_dir().join("logo.png").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn staging_requires_content_root() {
        let tmp = temp_dir();
        let err = stage_docset(&tmp.join("work"), "nixpkgs", &tmp.join("missing"), true)
            .unwrap_err();
        assert!(matches!(err, DocsetError::Write { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn dangling_entries_are_listed() {
        let tmp = temp_dir();
        let staged = staged(&tmp);
        let entries = vec![
            entry("index.html#top"),
            entry("gone.html#a"),
            entry("release/notes.html#r"),
            entry("release/gone.html#b"),
        ];
        assert_eq!(
            find_dangling(&staged.documents_dir(), &entries),
            vec!["gone.html#a", "release/gone.html#b"]
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn assemble_refuses_dangling_paths() {
        let tmp = temp_dir();
        let staged = staged(&tmp);
        let config = config(&tmp);

        let err = assemble(&config, &staged, &[entry("index.html#top"), entry("gone.html#a")])
            .unwrap_err();
        match err {
            DocsetError::DanglingPaths { revision, paths } => {
                assert_eq!(revision, "release/25.05");
                assert_eq!(paths, vec!["gone.html#a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!config.archive_path.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn assemble_writes_descriptors_and_archive() {
        let tmp = temp_dir();
        let staged = staged(&tmp);
        let config = config(&tmp);

        let result = assemble(
            &config,
            &staged,
            &[entry("index.html#top"), entry("options.html#opt-a")],
        )
        .unwrap();

        assert!(result.archive_path.is_file());
        assert_eq!(result.sha256.len(), 64);
        assert_eq!(
            result.size_bytes,
            std::fs::metadata(&result.archive_path).unwrap().len()
        );
        assert_eq!(result.descriptor.entry_count, 2);
        assert_eq!(result.descriptor.revision, "release/25.05");
        validate_docset(staged.root()).unwrap();

        // No temp files left beside the archive.
        let siblings: Vec<_> = std::fs::read_dir(result.archive_path.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(siblings.len(), 1);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn archive_is_reproducible() {
        let tmp = temp_dir();
        let staged = staged(&tmp);
        std::fs::write(staged.plist_path(), info_plist(&bundle(), "master")).unwrap();

        let (a, _) = write_archive(staged.root(), &tmp.join("a/nixpkgs.docset.tgz")).unwrap();
        let (b, _) = write_archive(staged.root(), &tmp.join("b/nixpkgs.docset.tgz")).unwrap();
        assert_eq!(a, b);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn plist_keys_and_escaping() {
        let mut meta = bundle();
        meta.title = "Nix & Friends <docs>".into();
        let plist = info_plist(&meta, "release/25.05");

        assert!(plist.contains("<string>nixpkgs-release-25.05</string>"));
        assert!(plist.contains("<string>Nix &amp; Friends &lt;docs&gt; (release/25.05)</string>"));
        assert!(plist.contains("<key>isDashDocset</key>\n\t<true/>"));
        assert!(plist.contains("<key>dashIndexFilePath</key>\n\t<string>index.html</string>"));
        assert!(plist.contains("<key>DocSetPlatformFamily</key>\n\t<string>nixpkgs</string>"));
        assert!(plist.contains("<key>isJavaScriptEnabled</key>"));
    }

    #[test]
    fn validate_rejects_incomplete_docset() {
        let tmp = temp_dir();
        let staged = staged(&tmp);
        let err = validate_docset(staged.root()).unwrap_err();
        assert!(err.to_string().contains("Info.plist"));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
