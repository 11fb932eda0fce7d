//! Core data structures for Provender.
//!
//! This module contains the foundational types used throughout Provender:
//! - Source records, the sealed unit of the generated manifest
//! - Package keys for deduplicating ecosystem entries
//! - The recipe (input) and the manifest (output)

pub mod manifest;
pub mod package_key;
pub mod recipe;
pub mod source_record;

pub use manifest::{Manifest, ModuleDescriptor};
pub use package_key::PackageKey;
pub use recipe::Recipe;
pub use source_record::{Integrity, SourceKind, SourceRecord};
