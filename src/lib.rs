//! # jarscope
//!
//! Indexes the classes inside Java archives (JAR and WAR files, including JARs
//! nested inside them) into a persistent catalog and answers case-insensitive
//! class name lookups against it.
//!
//! ## Architecture
//!
//! - **archive**: random-access reader over one zip container (mmap or in-memory)
//! - **nested**: depth-first expansion of nested archives with `outer.war->inner.jar` logical paths
//! - **extract**: entry name → dotted class name
//! - **fingerprint**: change detection (mtime + size, optionally SHA-256)
//! - **store**: LMDB-backed class index with atomic per-archive replacement
//! - **scan**: `.jar`/`.war` discovery under a root directory
//! - **index**: incremental indexing runs and their summary
//! - **progress**: progress callbacks and the terminal progress bar
//! - **search**: interactive search session state
//! - **config**: database location resolution
//! - **error**: error taxonomy

pub mod archive;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod fingerprint;
pub mod index;
pub mod nested;
pub mod progress;
pub mod scan;
pub mod search;
pub mod store;

#[cfg(test)]
mod testutil;

pub use error::{IndexError, Result};
pub use index::{IndexOptions, IndexRunSummary, Indexer, index};
pub use store::{ClassHit, IndexStore};
