//! Resolves configured file keys to the download URL of the newest release
//! asset of an upstream project, caching outcomes and collapsing concurrent
//! lookups for the same project into a single upstream call.

pub mod cache;
pub mod config;
pub mod metrics_defs;
pub mod redirects;
pub mod types;
pub mod upstream;

#[cfg(test)]
mod testutils;
