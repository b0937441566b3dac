//! Per-candidate pipeline failures.
//!
//! None of these escape a worker: each maps to a terminal [`Outcome`] that is
//! logged and dropped.

use std::{path::PathBuf, time::Duration};

use crate::{actor::handle::SendError, domain::candidate::Outcome};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  /// Hashing or copy I/O failed
  #[error("I/O error on {path}: {source}")]
  TransientIo {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("{path} did not settle within {timeout:?}")]
  StabilityTimeout { path: PathBuf, timeout: Duration },

  #[error("{path} disappeared before it could be copied")]
  VanishedSource { path: PathBuf },

  /// The candidate cannot be processed as configured
  #[error("{0}")]
  Configuration(String),

  #[error("State store unavailable: {0}")]
  State(#[from] SendError),
}

impl PipelineError {
  /// Wrap an I/O error, treating a missing file as a vanished source.
  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    let path = path.into();
    if source.kind() == std::io::ErrorKind::NotFound {
      Self::VanishedSource { path }
    } else {
      Self::TransientIo { path, source }
    }
  }

  pub fn configuration(msg: impl Into<String>) -> Self {
    Self::Configuration(msg.into())
  }

  /// Terminal outcome for this failure
  pub fn outcome(&self) -> Outcome {
    match self {
      Self::StabilityTimeout { .. } => Outcome::TimedOut,
      Self::VanishedSource { .. } => Outcome::Vanished,
      other => Outcome::Failed(other.to_string()),
    }
  }
}
