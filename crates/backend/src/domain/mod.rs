//! Domain types - core entities
//!
//! Canonical types shared by every stage of the pipeline, independent of
//! persistence or the filesystem event source.

pub mod candidate;
pub mod config;
pub mod fingerprint;
