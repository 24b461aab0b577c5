//! End-to-end `build` pipeline: HTML tree → extract → normalize → index → bundle.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{Instrument, info, info_span, instrument, warn};

use docsetgen_extractor::{ExtractOptions, Extractor, RuleSet};
use docsetgen_shared::{
    BuildConfig, DocsetError, Result, RevisionsConfig, normalize_revision, revision_dir,
};

use crate::assembler::{self, AssembleConfig};
use crate::normalize::normalize;

/// One revision to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRequest {
    /// Revision id as given (branch, tag, or hash).
    pub revision: String,
    /// Root of the rendered HTML tree for this revision.
    pub html_root: PathBuf,
}

impl RevisionRequest {
    pub fn new(revision: impl Into<String>, html_root: impl Into<PathBuf>) -> Self {
        Self {
            revision: revision.into(),
            html_root: html_root.into(),
        }
    }
}

/// Result of building one revision.
#[derive(Debug, Clone, Serialize)]
pub struct RevisionReport {
    pub revision: String,
    pub archive_path: PathBuf,
    /// Hex SHA-256 of the archive.
    pub sha256: String,
    pub size_bytes: u64,
    pub pages_scanned: usize,
    pub candidates: usize,
    pub entries: usize,
    pub duplicates_dropped: usize,
    pub empty_dropped: usize,
    /// One message per page that could not be parsed.
    pub parse_failures: Vec<String>,
    pub elapsed_ms: u64,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a revision starts building.
    fn revision_started(&self, revision: &str);
    /// Called when a revision enters a new stage.
    fn stage(&self, revision: &str, name: &str);
    /// Called when a revision finishes, successfully or not.
    fn revision_finished(&self, revision: &str, outcome: &Result<RevisionReport>);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn revision_started(&self, _revision: &str) {}
    fn stage(&self, _revision: &str, _name: &str) {}
    fn revision_finished(&self, _revision: &str, _outcome: &Result<RevisionReport>) {}
}

/// Archive location for a revision: `<out>/<normalized revision>/<name>.docset.tgz`.
///
/// Fails for revision ids that would not land in a child of `output_dir`.
pub fn archive_path(output_dir: &Path, bundle_name: &str, revision: &str) -> Result<PathBuf> {
    Ok(output_dir
        .join(revision_dir(revision)?)
        .join(format!("{bundle_name}.docset.tgz")))
}

/// Resolve aliases and drop repeated revisions, keeping the first occurrence.
///
/// Two requests are the same revision when their normalized ids match, since
/// they would publish to the same archive.
pub fn resolve_revisions(
    requests: Vec<RevisionRequest>,
    revisions: &RevisionsConfig,
) -> Vec<RevisionRequest> {
    let mut seen = HashSet::new();
    requests
        .into_iter()
        .filter_map(|request| {
            let resolved = revisions.resolve(&request.revision).to_string();
            if resolved != request.revision {
                info!(alias = %request.revision, revision = %resolved, "resolved revision alias");
            }
            if !seen.insert(normalize_revision(&resolved)) {
                warn!(revision = %resolved, "revision requested more than once, building it once");
                return None;
            }
            Some(RevisionRequest {
                revision: resolved,
                html_root: request.html_root,
            })
        })
        .collect()
}

/// Build one revision's bundle.
///
/// 1. Extract candidates from the HTML tree
/// 2. Normalize into canonical entries
/// 3. Stage the docset and copy the content tree
/// 4. Write the search index
/// 5. Assemble and publish the archive
///
/// All intermediate files live in a private working directory inside the
/// output directory, removed when this function returns.
#[instrument(skip_all, fields(revision = %request.revision))]
pub async fn build_revision(
    request: &RevisionRequest,
    config: &BuildConfig,
    progress: &dyn ProgressReporter,
) -> Result<RevisionReport> {
    let start = Instant::now();
    let revision = request.revision.as_str();

    info!(html_root = %request.html_root.display(), "building revision");
    let archive = archive_path(&config.output_dir, &config.bundle.name, revision)?;

    std::fs::create_dir_all(&config.output_dir)
        .map_err(|e| DocsetError::io(&config.output_dir, e))?;
    let work_dir = tempfile::Builder::new()
        .prefix(".docsetgen-")
        .tempdir_in(&config.output_dir)
        .map_err(|e| DocsetError::io(&config.output_dir, e))?;

    // --- Phase 1: Extract ---
    progress.stage(revision, "extracting entries");
    let rules = RuleSet::with_extra(&config.extra_rules)?;
    let extractor = Extractor::new(
        rules,
        ExtractOptions {
            parse_concurrency: config.parse_concurrency,
            follow_symlinks: config.follow_symlinks,
            max_markup_errors: config.max_markup_errors,
        },
    );
    let extraction = extractor.extract(&request.html_root).await?;
    let pages_scanned = extraction.pages_scanned;
    let candidates = extraction.candidate_count();
    let parse_failures: Vec<String> = extraction.failures.iter().map(|e| e.to_string()).collect();

    // --- Phase 2: Normalize ---
    progress.stage(revision, "normalizing");
    let normalized = normalize(extraction.into_candidates());

    // --- Phase 3: Stage ---
    progress.stage(revision, "staging content");
    let staged = assembler::stage_docset(
        work_dir.path(),
        &config.bundle.name,
        &request.html_root,
        config.follow_symlinks,
    )?;

    // --- Phase 4: Index ---
    progress.stage(revision, "writing index");
    docsetgen_storage::write_index(&normalized.entries, &staged.index_path()).await?;

    // --- Phase 5: Assemble ---
    progress.stage(revision, "packaging");
    let assemble_config = AssembleConfig {
        bundle: config.bundle.clone(),
        revision: revision.to_string(),
        tool_version: config.tool_version.clone(),
        archive_path: archive,
    };
    let assembled = assembler::assemble(&assemble_config, &staged, &normalized.entries)?;

    let report = RevisionReport {
        revision: revision.to_string(),
        archive_path: assembled.archive_path,
        sha256: assembled.sha256,
        size_bytes: assembled.size_bytes,
        pages_scanned,
        candidates,
        entries: normalized.entries.len(),
        duplicates_dropped: normalized.duplicates_dropped,
        empty_dropped: normalized.empty_dropped,
        parse_failures,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        pages_scanned = report.pages_scanned,
        candidates = report.candidates,
        entries = report.entries,
        duplicates_dropped = report.duplicates_dropped,
        empty_dropped = report.empty_dropped,
        parse_failures = report.parse_failures.len(),
        elapsed_ms = report.elapsed_ms,
        "revision complete"
    );

    Ok(report)
}

/// Build every revision as an independent task.
///
/// At most `config.revision_concurrency` revisions run at once. A failed
/// revision does not stop the others; results come back in request order.
pub async fn build_all(
    requests: Vec<RevisionRequest>,
    config: &BuildConfig,
    progress: Arc<dyn ProgressReporter>,
) -> Vec<(String, Result<RevisionReport>)> {
    let semaphore = Arc::new(Semaphore::new(config.revision_concurrency.max(1)));
    let config = Arc::new(config.clone());

    info!(
        revisions = requests.len(),
        concurrency = config.revision_concurrency,
        "starting build"
    );

    let mut handles = Vec::with_capacity(requests.len());
    for request in requests {
        let semaphore = semaphore.clone();
        let config = config.clone();
        let progress = progress.clone();
        let revision = request.revision.clone();
        let span = info_span!("revision_task", revision = %revision);

        let handle = tokio::spawn(
            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return Err(DocsetError::validation(format!(
                            "build semaphore closed: {e}"
                        )));
                    }
                };
                progress.revision_started(&request.revision);
                let outcome = build_revision(&request, &config, progress.as_ref()).await;
                if let Err(e) = &outcome {
                    warn!(error = %e, "revision failed");
                }
                progress.revision_finished(&request.revision, &outcome);
                outcome
            }
            .instrument(span),
        );
        handles.push((revision, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (revision, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(DocsetError::validation(format!(
                "build task for {revision} aborted: {e}"
            ))),
        };
        results.push((revision, outcome));
    }

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    info!(
        succeeded = results.len() - failed,
        failed, "build finished"
    );

    results
}
