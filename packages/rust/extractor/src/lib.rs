//! Entry extraction from rendered HTML documentation trees.
//!
//! This crate provides:
//! - [`rules`]: The classification table mapping units to entry kinds
//! - [`page`]: Candidate extraction from a single page
//! - [`engine`]: Deterministic tree walk and concurrent page scanning

pub mod engine;
pub mod page;
pub mod rules;

pub use engine::{ExtractOptions, Extraction, Extractor, rel_to_string, walk_pages};
pub use page::extract_page;
pub use rules::{Rule, RuleSet, Signal, UnitContext};
