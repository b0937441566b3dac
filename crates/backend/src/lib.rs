pub mod actor;
pub mod service;
pub mod state;

mod domain;
pub use domain::{candidate, config, fingerprint};

pub mod dirs;

mod daemon;
pub use daemon::{Daemon, DaemonError, shutdown_signal};
