//! Application configuration for docsetgen.
//!
//! User config lives at `~/.docsetgen/docsetgen.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DocsetError, Result};
use crate::types::{BundleMetadata, EntryKind, UnitShape};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docsetgen.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docsetgen";

// ---------------------------------------------------------------------------
// Config structs (matching docsetgen.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Bundle naming and metadata.
    #[serde(default)]
    pub bundle: BundleConfig,

    /// Revision aliases.
    #[serde(default)]
    pub revisions: RevisionsConfig,

    /// Entry extraction settings.
    #[serde(default)]
    pub extract: ExtractConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory receiving `<revision>/<name>.docset.tgz`.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Pages parsed concurrently within one revision.
    #[serde(default = "default_parse_concurrency")]
    pub parse_concurrency: u32,

    /// Revisions built concurrently.
    #[serde(default = "default_revision_concurrency")]
    pub revision_concurrency: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            parse_concurrency: default_parse_concurrency(),
            revision_concurrency: default_revision_concurrency(),
        }
    }
}

fn default_output_dir() -> String {
    "target".into()
}
fn default_parse_concurrency() -> u32 {
    4
}
fn default_revision_concurrency() -> u32 {
    2
}

/// `[bundle]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    #[serde(default = "default_bundle_name")]
    pub name: String,

    #[serde(default = "default_bundle_name")]
    pub bundle_id: String,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_bundle_name")]
    pub platform_family: String,

    /// Page opened when the docset is selected.
    #[serde(default = "default_index_page")]
    pub index_page: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            name: default_bundle_name(),
            bundle_id: default_bundle_name(),
            title: default_title(),
            platform_family: default_bundle_name(),
            index_page: default_index_page(),
        }
    }
}

fn default_bundle_name() -> String {
    "nixpkgs".into()
}
fn default_title() -> String {
    "Nixpkgs".into()
}
fn default_index_page() -> String {
    "index.html".into()
}

impl From<&BundleConfig> for BundleMetadata {
    fn from(config: &BundleConfig) -> Self {
        Self {
            name: config.name.clone(),
            bundle_id: config.bundle_id.clone(),
            title: config.title.clone(),
            platform_family: config.platform_family.clone(),
            index_page: config.index_page.clone(),
        }
    }
}

/// `[revisions]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionsConfig {
    /// Symbolic names mapped to concrete revisions (`stable = "nixos-25.05"`).
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,
}

impl Default for RevisionsConfig {
    fn default() -> Self {
        Self {
            aliases: default_aliases(),
        }
    }
}

fn default_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([("stable".to_string(), "nixos-25.05".to_string())])
}

impl RevisionsConfig {
    /// Resolve a single revision through the alias table.
    pub fn resolve<'a>(&'a self, revision: &'a str) -> &'a str {
        self.aliases
            .get(revision)
            .map(String::as_str)
            .unwrap_or(revision)
    }
}

/// `[extract]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Follow symlinks while walking the HTML tree.
    #[serde(default = "default_true")]
    pub follow_symlinks: bool,

    /// Treat a page as unparseable once html5ever reports more errors than this.
    /// Unset means markup errors are tolerated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_markup_errors: Option<usize>,

    /// Extra classification rules, evaluated after the built-in table.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: true,
            max_markup_errors: None,
            rules: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// `[[extract.rules]]` entry, one row of the classification table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub kind: EntryKind,

    #[serde(default = "default_shape")]
    pub shape: UnitShape,

    /// Identifier prefixes that classify the unit.
    #[serde(default)]
    pub id_prefixes: Vec<String>,

    /// CSS selectors that classify the unit when they match inside it.
    #[serde(default)]
    pub markers: Vec<String>,

    /// Page file-stem prefixes that classify the unit.
    #[serde(default)]
    pub pages: Vec<String>,

    /// CSS selector for the structured label inside the unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn default_shape() -> UnitShape {
    UnitShape::Any
}

// ---------------------------------------------------------------------------
// Build config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime build configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Root of the per-revision output directories.
    pub output_dir: PathBuf,
    pub parse_concurrency: usize,
    pub revision_concurrency: usize,
    pub bundle: BundleMetadata,
    pub follow_symlinks: bool,
    pub max_markup_errors: Option<usize>,
    pub extra_rules: Vec<RuleConfig>,
    /// Tool version recorded in `meta.json`.
    pub tool_version: String,
}

impl From<&AppConfig> for BuildConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.defaults.output_dir),
            parse_concurrency: config.defaults.parse_concurrency.max(1) as usize,
            revision_concurrency: config.defaults.revision_concurrency.max(1) as usize,
            bundle: BundleMetadata::from(&config.bundle),
            follow_symlinks: config.extract.follow_symlinks,
            max_markup_errors: config.extract.max_markup_errors,
            extra_rules: config.extract.rules.clone(),
            tool_version: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docsetgen/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| DocsetError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docsetgen/docsetgen.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocsetError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DocsetError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocsetError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocsetError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocsetError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
