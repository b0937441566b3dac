//! CLI command implementations

mod admin;
mod watch;

pub use admin::{cmd_config_show, cmd_state_prune, cmd_state_show};
pub use watch::cmd_watch;
