//! High-level operations.
//!
//! This module contains the implementation of Provender commands.

pub mod assemble;
pub mod generate;

pub use assemble::{assemble, fetch_base, BaseApp, ResolvedModule};
pub use generate::{generate, generate_manifest, GenerateOptions, GenerateResult};
