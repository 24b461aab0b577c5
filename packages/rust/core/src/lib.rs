//! Core pipeline orchestration and domain logic for docsetgen.
//!
//! This crate ties together extraction, normalization, indexing, and bundle
//! assembly into the per-revision `build` workflow.

pub mod assembler;
pub mod normalize;
pub mod pipeline;

pub use assembler::{AssembleConfig, AssembleResult, StagedDocset};
pub use normalize::{Normalized, normalize};
pub use pipeline::{
    ProgressReporter, RevisionReport, RevisionRequest, SilentProgress, archive_path, build_all,
    build_revision, resolve_revisions,
};
