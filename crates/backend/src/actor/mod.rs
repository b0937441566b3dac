//! Actor-based concurrency primitives
//!
//! Components are long-lived tasks that talk over channels instead of sharing
//! `Arc<Mutex<...>>` state.
//!
//! # Architecture
//!
//! ```text
//! EventIngest ──FsEvent──► Debouncer ──Candidate──► WorkerPool ──► Pipeline
//!  (notify)      bounded                 bounded     single-flight   stability → dedup → copy
//!                    │                                                  │
//!                    └──────────── StateHandle ◄────────────────────────┘
//!                                      │
//!                                  StateActor ◄──── StateJanitor
//!                          (snapshot + hash cache)
//! ```
//!
//! - [`state::StateActor`] is the only writer of persisted state; everyone
//!   else holds a [`handle::StateHandle`]
//! - [`pool::WorkerPool`] bounds concurrent pipelines and never runs two for
//!   the same source path
//! - [`scheduler::StateJanitor`] prunes the hash cache on its own timer

pub mod debouncer;
pub mod handle;
pub mod message;
pub mod pipeline;
pub mod pool;
pub mod scheduler;
pub mod state;
pub mod watcher;

#[cfg(test)]
mod __tests__;

pub use debouncer::{CandidateRouter, DebounceConfig, Debouncer};
pub use pipeline::{Pipeline, PipelineSettings, PipelineStats};
pub use pool::{Admission, CandidateRunner, WorkerPool};
pub use scheduler::{JanitorConfig, StateJanitor};
pub use state::StateActor;
pub use watcher::{EventIngest, FsEvent, WatcherError};
