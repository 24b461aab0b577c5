//! CLI command definitions, routing, and tracing setup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use docsetgen_core::pipeline::{ProgressReporter, RevisionReport, RevisionRequest};
use docsetgen_shared::{
    AppConfig, BuildConfig, EntryKind, init_config, load_config, revision_dir,
};
use docsetgen_storage::SearchIndex;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docsetgen: build offline docsets from rendered Nix documentation.
#[derive(Parser)]
#[command(
    name = "docsetgen",
    version,
    about = "Build searchable Dash/Zeal docsets from rendered NixOS and nixpkgs manuals.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build one docset archive per revision.
    Build {
        /// Revisions to build, as REV=HTML_DIR (e.g. master=./result/share/doc/nixos).
        #[arg(required = true, value_parser = parse_revision_arg)]
        revisions: Vec<RevisionRequest>,

        /// Output directory (defaults to `defaults.output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Bundle title shown in the documentation browser.
        #[arg(short, long)]
        title: Option<String>,

        /// Bundle name (docset directory and archive stem).
        #[arg(short, long)]
        name: Option<String>,

        /// Write a JSON run report to this file.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Look up entries in a built search index.
    Query {
        /// Path to a `docSet.dsidx` file.
        index: PathBuf,

        /// Entry name, or name prefix with --prefix.
        term: String,

        /// Restrict to one entry kind (Option, Package, Function, ...).
        #[arg(short, long)]
        kind: Option<EntryKind>,

        /// Match every entry whose name starts with TERM.
        #[arg(long)]
        prefix: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

/// Parse a `REV=HTML_DIR` argument.
fn parse_revision_arg(arg: &str) -> std::result::Result<RevisionRequest, String> {
    let (revision, dir) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected REV=HTML_DIR, got '{arg}'"))?;
    if revision.trim().is_empty() {
        return Err(format!("missing revision in '{arg}'"));
    }
    if dir.trim().is_empty() {
        return Err(format!("missing HTML directory in '{arg}'"));
    }
    revision_dir(revision).map_err(|e| e.to_string())?;
    Ok(RevisionRequest::new(revision.trim(), dir))
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docsetgen=info",
        1 => "docsetgen=debug",
        _ => "docsetgen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build {
            revisions,
            out,
            title,
            name,
            report,
        } => cmd_build(revisions, out, title, name, report.as_deref()).await,
        Command::Query {
            index,
            term,
            kind,
            prefix,
        } => cmd_query(&index, &term, kind, prefix).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

async fn cmd_build(
    revisions: Vec<RevisionRequest>,
    out: Option<PathBuf>,
    title: Option<String>,
    name: Option<String>,
    report_path: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;

    let mut build_config = BuildConfig::from(&config);
    build_config.tool_version = env!("CARGO_PKG_VERSION").to_string();
    if let Some(out) = out {
        build_config.output_dir = out;
    }
    if let Some(title) = title {
        build_config.bundle.title = title;
    }
    if let Some(name) = name {
        build_config.bundle.name = name;
    }

    let requests = docsetgen_core::resolve_revisions(revisions, &config.revisions);

    info!(
        revisions = requests.len(),
        output_dir = %build_config.output_dir.display(),
        bundle = %build_config.bundle.name,
        "building docsets"
    );

    let reporter = Arc::new(CliProgress::new());
    let results = docsetgen_core::build_all(requests, &build_config, reporter).await;

    // Print summary
    println!();
    for (revision, outcome) in &results {
        match outcome {
            Ok(report) => {
                println!("  ✓ {revision}");
                println!("      Archive:  {}", report.archive_path.display());
                println!("      SHA-256:  {}", report.sha256);
                println!(
                    "      Entries:  {} ({} duplicates, {} empty dropped)",
                    report.entries, report.duplicates_dropped, report.empty_dropped
                );
                println!(
                    "      Pages:    {} scanned, {} unparseable",
                    report.pages_scanned,
                    report.parse_failures.len()
                );
                println!("      Time:     {:.1}s", report.elapsed_ms as f64 / 1000.0);
            }
            Err(e) => {
                println!("  ✗ {revision}");
                println!("      Error:    {e}");
            }
        }
    }
    println!();

    if let Some(path) = report_path {
        write_run_report(path, &results)?;
        println!("  Report written to {}", path.display());
    }

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    if failed > 0 {
        return Err(eyre!("{failed} of {} revisions failed", results.len()));
    }

    Ok(())
}

/// JSON run report written by `build --report`.
#[derive(Serialize)]
struct RunReport<'a> {
    generated_at: DateTime<Utc>,
    tool_version: &'static str,
    revisions: Vec<RevisionOutcome<'a>>,
}

#[derive(Serialize)]
struct RevisionOutcome<'a> {
    revision: &'a str,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a RevisionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn write_run_report(
    path: &Path,
    results: &[(String, docsetgen_shared::Result<RevisionReport>)],
) -> Result<()> {
    let report = RunReport {
        generated_at: Utc::now(),
        tool_version: env!("CARGO_PKG_VERSION"),
        revisions: results
            .iter()
            .map(|(revision, outcome)| RevisionOutcome {
                revision,
                ok: outcome.is_ok(),
                report: outcome.as_ref().ok(),
                error: outcome.as_ref().err().map(|e| e.to_string()),
            })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(path, json).map_err(|e| eyre!("cannot write report to {}: {e}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter: one indicatif spinner per running revision.
struct CliProgress {
    multi: MultiProgress,
    spinners: Mutex<HashMap<String, ProgressBar>>,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            spinners: Mutex::new(HashMap::new()),
        }
    }

    fn spinner(&self, revision: &str) -> ProgressBar {
        let mut spinners = self.spinners.lock().unwrap_or_else(|e| e.into_inner());
        spinners
            .entry(revision.to_string())
            .or_insert_with(|| {
                let spinner = self.multi.add(ProgressBar::new_spinner());
                spinner.set_style(
                    ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner())
                        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
                );
                spinner.set_prefix(revision.to_string());
                spinner.enable_steady_tick(std::time::Duration::from_millis(80));
                spinner
            })
            .clone()
    }
}

impl ProgressReporter for CliProgress {
    fn revision_started(&self, revision: &str) {
        self.spinner(revision).set_message("starting");
    }

    fn stage(&self, revision: &str, name: &str) {
        self.spinner(revision).set_message(name.to_string());
    }

    fn revision_finished(&self, revision: &str, outcome: &docsetgen_shared::Result<RevisionReport>) {
        let spinner = self.spinner(revision);
        match outcome {
            Ok(report) => spinner.finish_with_message(format!("done, {} entries", report.entries)),
            Err(_) => spinner.finish_with_message("failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// query
// ---------------------------------------------------------------------------

async fn cmd_query(index_path: &Path, term: &str, kind: Option<EntryKind>, prefix: bool) -> Result<()> {
    let index = SearchIndex::open_readonly(index_path).await?;

    let matches = if prefix {
        index.prefix(term, kind).await?
    } else {
        let kinds: Vec<EntryKind> = match kind {
            Some(kind) => vec![kind],
            None => EntryKind::ALL.to_vec(),
        };
        let mut found = Vec::new();
        for kind in kinds {
            if let Some(entry) = index.exact(term, kind).await? {
                found.push(entry);
            }
        }
        found
    };

    info!(term, prefix, matches = matches.len(), "query complete");

    if matches.is_empty() {
        return Err(eyre!("no entry matches '{term}'"));
    }
    for entry in &matches {
        println!("{}\t{}\t{}", entry.kind, entry.name, entry.path);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsetgen_shared::DocsetError;

    #[test]
    fn revision_args() {
        let request = parse_revision_arg("release/25.05=./html").unwrap();
        assert_eq!(request.revision, "release/25.05");
        assert_eq!(request.html_root, PathBuf::from("./html"));

        assert!(parse_revision_arg("master").is_err());
        assert!(parse_revision_arg("=./html").is_err());
        assert!(parse_revision_arg("master=").is_err());
        assert!(parse_revision_arg("..=./html").is_err());
        assert!(parse_revision_arg(".=./html").is_err());
    }

    #[test]
    fn run_report_lists_each_revision_once() {
        let path = std::env::temp_dir().join(format!("dg-run-report-{}.json", std::process::id()));
        let report = RevisionReport {
            revision: "master".into(),
            archive_path: PathBuf::from("dist/master/nixpkgs.docset.tgz"),
            sha256: "ab".repeat(32),
            size_bytes: 1024,
            pages_scanned: 4,
            candidates: 14,
            entries: 13,
            duplicates_dropped: 1,
            empty_dropped: 0,
            parse_failures: Vec::new(),
            elapsed_ms: 12,
        };
        let results = vec![
            ("master".to_string(), Ok(report)),
            (
                "broken".to_string(),
                Err(DocsetError::validation("documentation root missing")),
            ),
        ];

        write_run_report(&path, &results).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(raw.matches("\"revision\"").count(), 3);
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let revisions = json["revisions"].as_array().unwrap();
        assert_eq!(revisions.len(), 2);

        assert_eq!(revisions[0]["revision"], "master");
        assert_eq!(revisions[0]["ok"], true);
        assert_eq!(revisions[0]["report"]["entries"], 13);
        assert!(revisions[0].get("error").is_none());

        assert_eq!(revisions[1]["revision"], "broken");
        assert_eq!(revisions[1]["ok"], false);
        assert!(revisions[1].get("report").is_none());
        assert!(
            revisions[1]["error"]
                .as_str()
                .unwrap()
                .contains("documentation root missing")
        );
    }

    #[test]
    fn build_command_parses() {
        let cli = Cli::try_parse_from([
            "docsetgen",
            "-v",
            "build",
            "master=html/a",
            "stable=html/b",
            "--out",
            "dist",
            "--title",
            "NixOS",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        match cli.command {
            Command::Build {
                revisions, out, title, ..
            } => {
                assert_eq!(revisions.len(), 2);
                assert_eq!(out, Some(PathBuf::from("dist")));
                assert_eq!(title.as_deref(), Some("NixOS"));
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn query_kind_is_case_insensitive() {
        let cli = Cli::try_parse_from([
            "docsetgen",
            "query",
            "docSet.dsidx",
            "services.nginx",
            "--kind",
            "option",
            "--prefix",
        ])
        .unwrap();
        match cli.command {
            Command::Query { kind, prefix, .. } => {
                assert_eq!(kind, Some(EntryKind::Option));
                assert!(prefix);
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn build_requires_a_revision() {
        assert!(Cli::try_parse_from(["docsetgen", "build"]).is_err());
    }
}
