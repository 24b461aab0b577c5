//! Shared types, error model, and configuration for docsetgen.
//!
//! This crate is the foundation depended on by all other docsetgen crates.
//! It provides:
//! - [`DocsetError`]: the unified error type
//! - Domain types ([`Entry`], [`Candidate`], [`EntryKind`], [`BundleMetadata`])
//! - Configuration ([`AppConfig`], [`BuildConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildConfig, BundleConfig, DefaultsConfig, ExtractConfig, RevisionsConfig,
    RuleConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{DocsetError, Result};
pub use types::{
    BundleDescriptor, BundleMetadata, CURRENT_SCHEMA_VERSION, Candidate, Entry, EntryKind,
    UnitShape, normalize_revision, revision_dir,
};
