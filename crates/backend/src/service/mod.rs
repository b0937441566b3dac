//! Stateless building blocks of the copy pipeline.
//!
//! Everything here operates on paths and plain values. Ordering, concurrency
//! and persistence live in [`crate::actor`].

pub mod copy;
pub mod dedup;
pub mod error;
pub mod filter;
pub mod snapshot;
pub mod stability;
pub mod webhook;

pub use error::PipelineError;
