//! Fetching from the outside world.
//!
//! HTTP downloads with digest sealing, and shallow git checkouts.

pub mod git;
pub mod http;
pub mod seal;

pub use git::GitCloner;
pub use http::{HttpClient, HttpFetch, HttpOptions};
pub use seal::{seal, verify, Sealed};
