//! Configuration and offline state commands

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dropcopy::{
  config::{Config, retention_from_days},
  dirs,
  state::{StateStore, epoch_now},
};

fn load_config(path: Option<&Path>) -> Result<Config> {
  Config::load(path).context("Failed to load configuration")
}

fn format_epoch(secs: f64) -> String {
  if secs <= 0.0 {
    return "never".to_string();
  }
  DateTime::<Utc>::from_timestamp(secs as i64, 0)
    .map(|t| t.to_rfc3339())
    .unwrap_or_else(|| format!("{:.0}", secs))
}

/// Print the effective configuration
pub fn cmd_config_show(path: Option<&Path>) -> Result<()> {
  let config = load_config(path)?;

  match path {
    Some(path) => println!("Using config file: {}", path.display()),
    None => {
      let user = dirs::user_config_path();
      if user.exists() {
        println!("Using user config: {}", user.display());
      } else {
        println!("Using default configuration (no config file found)");
      }
    }
  }
  println!("Environment overrides applied.");
  println!();
  println!("{}", config.to_toml()?);

  Ok(())
}

/// Summarize the persisted snapshot and hash cache
pub fn cmd_state_show(path: Option<&Path>, json: bool) -> Result<()> {
  let config = load_config(path)?;
  let store = StateStore::load(&config.state_dir);
  let snapshot = store.snapshot();
  let cache = store.cache();

  if json {
    let summary = serde_json::json!({
      "state_dir": store.dir(),
      "snapshot": {
        "path": store.snapshot_path(),
        "timestamp": snapshot.timestamp,
        "entries": snapshot.data.len(),
      },
      "hash_cache": {
        "path": store.cache_path(),
        "timestamp": cache.timestamp,
        "entries": cache.len(),
        "oldest_last_seen": cache.oldest_last_seen(),
      },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    return Ok(());
  }

  println!("State directory: {}", store.dir().display());
  println!();
  println!("--- Snapshot ---");
  println!("Updated:        {}", format_epoch(snapshot.timestamp));
  println!("Entries:        {}", snapshot.data.len());
  println!();
  println!("--- Hash cache ---");
  println!("Updated:        {}", format_epoch(cache.timestamp));
  println!("Entries:        {}", cache.len());
  if let Some(oldest) = cache.oldest_last_seen() {
    println!("Oldest seen:    {}", format_epoch(oldest));
  }

  Ok(())
}

/// Run one janitor pass against the persisted hash cache.
///
/// Operates on the files directly; do not run while a watcher owns the
/// same state directory.
pub fn cmd_state_prune(path: Option<&Path>, retention_days: Option<u64>) -> Result<()> {
  let config = load_config(path)?;
  let days = retention_days.unwrap_or(config.state.retention_days);

  if days == 0 {
    println!("Retention disabled (0 days), nothing pruned");
    return Ok(());
  }

  let mut store = StateStore::load(&config.state_dir);
  let retention = retention_from_days(days);
  let removed = store.cache_mut().prune(retention, epoch_now());

  if removed > 0 {
    store.save_cache().context("Failed to save hash cache")?;
  }
  println!(
    "Pruned {} hash cache entr{} older than {} days ({} remain)",
    removed,
    if removed == 1 { "y" } else { "ies" },
    days,
    store.cache().len()
  );

  Ok(())
}
