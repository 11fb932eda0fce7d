//! Provender - offline-build source manifest resolver
//!
//! This crate resolves every third-party source an offline, sandboxed build
//! needs (lockfile entries, tagged repositories, package-index files,
//! release archives, Go import graphs) into one deterministic,
//! integrity-sealed flatpak-builder manifest.

pub mod core;
pub mod ops;
pub mod resolver;
pub mod sources;
pub mod util;

/// Test utilities and mocks for Provender unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides mock implementations of the HTTP fetcher,
/// the git cloner and the dependency lister.
#[cfg(test)]
pub mod test_support;

pub use core::{Manifest, Recipe, SourceRecord};
pub use resolver::{ResolveError, Resolver, SourceRequest};
pub use util::context::GlobalContext;
