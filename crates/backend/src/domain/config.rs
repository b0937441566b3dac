//! Configuration system for dropcopy.
//!
//! Config priority: environment variables > explicit config file > user config
//! (`~/.config/dropcopy/config.toml`) > defaults.
//!
//! The environment variable names are the ones container deployments already
//! use (`SOURCE`, `DEST`, `DEBOUNCE_SECONDS`, ...), so a bare `docker run -e`
//! keeps working without any config file.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::dirs;

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to parse config file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("Invalid value for {var}: {value:?} ({reason})")]
  InvalidEnv {
    var: &'static str,
    value: String,
    reason: String,
  },

  #[error("Configuration validation failed with {} error(s): {}", .0.len(), .0.join("; "))]
  Invalid(Vec<String>),

  #[error("Failed to render config: {0}")]
  Render(#[from] toml::ser::Error),
}

// ============================================================================
// Watch Configuration
// ============================================================================

/// Event ingest and debounce settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
  /// Watch source roots recursively (default: true)
  pub recursive: bool,

  /// Quiet period after the last event for a path before it is processed,
  /// in seconds (default: 1.0)
  pub debounce_secs: f64,

  /// Use a polling watcher instead of native notifications (default: false)
  /// Useful on network mounts and some container bind mounts.
  pub use_polling: bool,

  /// Poll interval for the polling watcher in seconds (default: 2.0)
  pub poll_interval_secs: f64,

  /// Buffered raw events between the OS watcher and the debouncer (default: 4096)
  pub event_buffer: usize,
}

impl Default for WatchConfig {
  fn default() -> Self {
    Self {
      recursive: true,
      debounce_secs: 1.0,
      use_polling: false,
      poll_interval_secs: 2.0,
      event_buffer: 4096,
    }
  }
}

impl WatchConfig {
  pub fn poll_interval(&self) -> Duration {
    secs_f64(self.poll_interval_secs)
  }
}

// ============================================================================
// Stability Configuration
// ============================================================================

/// File stability detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
  /// Seconds between size polls (default: 0.5)
  pub interval_secs: f64,

  /// Consecutive unchanged polls required (default: 2)
  pub stable_rounds: u32,

  /// Hard ceiling on the stability wait in seconds (default: 60)
  pub copy_timeout_secs: u64,
}

impl Default for StabilityConfig {
  fn default() -> Self {
    Self {
      interval_secs: 0.5,
      stable_rounds: 2,
      copy_timeout_secs: 60,
    }
  }
}

// ============================================================================
// Copy Configuration
// ============================================================================

/// Destination layout and copy behavior
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
  /// Mirror the source tree under the destination instead of copying flat
  pub preserve_dirs: bool,

  /// Materialize empty source directories at the destination
  pub copy_empty_dirs: bool,

  /// Gzip files on the way to the destination (`<name>.gz`)
  pub compress: bool,

  /// Log what would be copied without touching the destination
  pub dry_run: bool,

  /// Remove the source file after a successful copy
  pub delete_source: bool,
}

// ============================================================================
// Filter Configuration
// ============================================================================

/// File name filtering
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
  /// Glob patterns a file name must match (empty = everything)
  pub include: Vec<String>,

  /// Glob patterns that exclude a file name (checked first)
  pub exclude: Vec<String>,

  /// Maximum file size in MiB (0 = unlimited)
  pub max_file_size_mb: u64,
}

impl FilterConfig {
  /// Size limit in bytes, `None` when unlimited
  pub fn max_size(&self) -> Option<u64> {
    (self.max_file_size_mb > 0).then(|| self.max_file_size_mb.saturating_mul(1024 * 1024))
  }
}

// ============================================================================
// Worker Configuration
// ============================================================================

/// Worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Maximum simultaneously running pipelines (default: 4)
  pub max_workers: usize,

  /// Seconds to let in-flight pipelines finish on shutdown (default: 30)
  pub shutdown_grace_secs: u64,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      max_workers: 4,
      shutdown_grace_secs: 30,
    }
  }
}

// ============================================================================
// State Configuration
// ============================================================================

/// Persistent state retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
  /// Hash cache retention in days (0 = keep forever, default: 30)
  pub retention_days: u64,

  /// How often the janitor prunes, in seconds (default: 3600)
  pub janitor_interval_secs: u64,
}

impl Default for StateConfig {
  fn default() -> Self {
    Self {
      retention_days: 30,
      janitor_interval_secs: 3600,
    }
  }
}

/// Upper bound accepted for `retention_days`
pub const MAX_RETENTION_DAYS: u64 = 36_500;

/// Retention window for a day count; saturates instead of overflowing
pub fn retention_from_days(days: u64) -> Duration {
  Duration::from_secs(days.saturating_mul(24 * 3600))
}

// ============================================================================
// Daemon Configuration
// ============================================================================

/// Process-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "info"
  pub log_level: String,

  /// Write logs to rolling files in this directory instead of stdout
  #[serde(skip_serializing_if = "Option::is_none")]
  pub log_dir: Option<PathBuf>,

  /// Log file rotation: "daily", "hourly", "never"
  /// Default: "daily"
  pub log_rotation: String,

  /// File rewritten with the current epoch seconds for container health checks
  #[serde(skip_serializing_if = "Option::is_none")]
  pub health_file: Option<PathBuf>,

  /// Health file refresh interval in seconds (default: 30)
  pub health_interval_secs: u64,

  /// How often pipeline statistics are logged, in seconds (default: 300)
  pub stats_interval_secs: u64,
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      log_level: "info".to_string(),
      log_dir: None,
      log_rotation: "daily".to_string(),
      health_file: None,
      health_interval_secs: 30,
      stats_interval_secs: 300,
    }
  }
}

// ============================================================================
// Webhook Configuration
// ============================================================================

/// Copy notification webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
  /// Endpoint receiving a JSON POST after every successful copy
  #[serde(skip_serializing_if = "Option::is_none")]
  pub url: Option<String>,

  /// Request timeout in seconds (default: 5)
  pub timeout_secs: u64,
}

impl Default for WebhookConfig {
  fn default() -> Self {
    Self {
      url: None,
      timeout_secs: 5,
    }
  }
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Full dropcopy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Watched source roots
  pub sources: Vec<PathBuf>,

  /// Destination root
  pub dest: PathBuf,

  /// Directory holding the snapshot and hash cache files
  pub state_dir: PathBuf,

  pub watch: WatchConfig,
  pub stability: StabilityConfig,
  pub copy: CopyConfig,
  pub filter: FilterConfig,
  pub workers: WorkerConfig,
  pub state: StateConfig,
  pub daemon: DaemonConfig,
  pub webhook: WebhookConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      sources: vec![PathBuf::from("/source")],
      dest: PathBuf::from("/consume"),
      state_dir: dirs::default_state_dir(),
      watch: WatchConfig::default(),
      stability: StabilityConfig::default(),
      copy: CopyConfig::default(),
      filter: FilterConfig::default(),
      workers: WorkerConfig::default(),
      state: StateConfig::default(),
      daemon: DaemonConfig::default(),
      webhook: WebhookConfig::default(),
    }
  }
}

const LOG_LEVELS: &[&str] = &["off", "error", "warn", "warning", "info", "debug", "trace"];

impl Config {
  /// Load configuration: explicit file (must parse) or user config, then
  /// environment overrides.
  pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = match explicit {
      Some(path) => Self::from_file(path)?,
      None => {
        let user = dirs::user_config_path();
        if user.exists() {
          Self::from_file(&user)?
        } else {
          Self::default()
        }
      }
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
  }

  /// Parse a TOML config file.
  pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Apply environment overrides using `lookup` to read variables.
  pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string());

    if let Some(v) = get("SOURCE").filter(|v| !v.is_empty()) {
      self.sources = std::env::split_paths(&v).filter(|p| !p.as_os_str().is_empty()).collect();
    }
    if let Some(v) = get("DEST").filter(|v| !v.is_empty()) {
      self.dest = PathBuf::from(v);
    }
    if let Some(v) = get("STATE_DIR").filter(|v| !v.is_empty()) {
      self.state_dir = PathBuf::from(v);
    }

    if let Some(v) = get("RECURSIVE") {
      self.watch.recursive = parse_bool(&v);
    }
    if let Some(v) = get("DEBOUNCE_SECONDS") {
      self.watch.debounce_secs = parse_num("DEBOUNCE_SECONDS", &v)?;
    }
    if let Some(v) = get("USE_POLLING") {
      self.watch.use_polling = parse_bool(&v);
    }

    if let Some(v) = get("STABILITY_INTERVAL") {
      self.stability.interval_secs = parse_num("STABILITY_INTERVAL", &v)?;
    }
    if let Some(v) = get("STABILITY_STABLE_ROUNDS") {
      self.stability.stable_rounds = parse_num("STABILITY_STABLE_ROUNDS", &v)?;
    }
    if let Some(v) = get("COPY_TIMEOUT") {
      self.stability.copy_timeout_secs = parse_num("COPY_TIMEOUT", &v)?;
    }

    if let Some(v) = get("PRESERVE_DIRS") {
      self.copy.preserve_dirs = parse_bool(&v);
    }
    if let Some(v) = get("COPY_EMPTY_DIRS") {
      debug!(raw = %v, "COPY_EMPTY_DIRS override");
      self.copy.copy_empty_dirs = parse_bool(&v);
    }
    if let Some(v) = get("COMPRESS_FILES") {
      self.copy.compress = parse_bool(&v);
    }
    if let Some(v) = get("DRY_RUN") {
      self.copy.dry_run = parse_bool(&v);
    }
    if let Some(v) = get("DELETE_SOURCE") {
      self.copy.delete_source = parse_bool(&v);
    }

    if let Some(v) = get("FILE_INCLUDE_PATTERNS") {
      self.filter.include = parse_patterns(&v);
    }
    if let Some(v) = get("FILE_EXCLUDE_PATTERNS") {
      self.filter.exclude = parse_patterns(&v);
    }
    if let Some(v) = get("MAX_FILE_SIZE_MB") {
      self.filter.max_file_size_mb = parse_num("MAX_FILE_SIZE_MB", &v)?;
    }

    if let Some(v) = get("MAX_WORKERS") {
      self.workers.max_workers = parse_num("MAX_WORKERS", &v)?;
    }
    if let Some(v) = get("SHUTDOWN_GRACE_SECONDS") {
      self.workers.shutdown_grace_secs = parse_num("SHUTDOWN_GRACE_SECONDS", &v)?;
    }

    if let Some(v) = get("STATE_CLEANUP_DAYS") {
      self.state.retention_days = parse_num("STATE_CLEANUP_DAYS", &v)?;
    }
    if let Some(v) = get("JANITOR_INTERVAL_SECONDS") {
      self.state.janitor_interval_secs = parse_num("JANITOR_INTERVAL_SECONDS", &v)?;
    }

    if let Some(v) = get("LOG_LEVEL").filter(|v| !v.is_empty()) {
      self.daemon.log_level = v.to_lowercase();
    }
    if let Some(v) = get("LOG_DIR").filter(|v| !v.is_empty()) {
      self.daemon.log_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = get("HEALTH_FILE").filter(|v| !v.is_empty()) {
      self.daemon.health_file = Some(PathBuf::from(v));
    }

    if let Some(v) = get("WEBHOOK_URL") {
      self.webhook.url = Some(v).filter(|v| !v.is_empty());
    }

    Ok(())
  }

  /// Validate settings and prepare directories.
  ///
  /// Source roots are canonicalized in place; destination and state
  /// directories are created when missing and probed for writability.
  pub fn validate(&mut self) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if self.sources.is_empty() {
      errors.push("No source directory configured".to_string());
    }

    let mut canonical = Vec::with_capacity(self.sources.len());
    for source in &self.sources {
      if !source.exists() {
        errors.push(format!("Source directory does not exist: {}", source.display()));
      } else if !source.is_dir() {
        errors.push(format!("Source path is not a directory: {}", source.display()));
      } else if let Err(e) = std::fs::read_dir(source) {
        errors.push(format!("Source directory is not readable: {} ({})", source.display(), e));
      } else {
        match source.canonicalize() {
          Ok(path) => canonical.push(path),
          Err(e) => errors.push(format!("Cannot resolve source {}: {}", source.display(), e)),
        }
      }
    }

    match prepare_writable_dir(&self.dest) {
      Ok(path) => self.dest = path,
      Err(e) => errors.push(format!("Destination directory {}: {}", self.dest.display(), e)),
    }
    match prepare_writable_dir(&self.state_dir) {
      Ok(path) => self.state_dir = path,
      Err(e) => errors.push(format!("State directory {}: {}", self.state_dir.display(), e)),
    }

    for source in &canonical {
      if self.dest.starts_with(source) {
        errors.push(format!(
          "Destination {} is inside watched source {}",
          self.dest.display(),
          source.display()
        ));
      }
      if self.state_dir.starts_with(source) {
        errors.push(format!(
          "State directory {} is inside watched source {}",
          self.state_dir.display(),
          source.display()
        ));
      }
    }
    self.sources = canonical;

    if !(self.watch.debounce_secs.is_finite() && self.watch.debounce_secs >= 0.0) {
      errors.push(format!("Debounce must be >= 0 seconds, got {}", self.watch.debounce_secs));
    }
    if !(self.watch.poll_interval_secs.is_finite() && self.watch.poll_interval_secs > 0.0) {
      errors.push(format!(
        "Poll interval must be > 0 seconds, got {}",
        self.watch.poll_interval_secs
      ));
    }
    if !(self.stability.interval_secs.is_finite() && self.stability.interval_secs > 0.0) {
      errors.push(format!(
        "Stability interval must be > 0 seconds, got {}",
        self.stability.interval_secs
      ));
    }
    if self.stability.stable_rounds == 0 {
      errors.push("Stable rounds must be at least 1".to_string());
    }
    if self.stability.copy_timeout_secs == 0 {
      errors.push("Copy timeout must be at least 1 second".to_string());
    }
    if self.workers.max_workers == 0 {
      errors.push("Max workers must be at least 1".to_string());
    }
    if self.state.retention_days > MAX_RETENTION_DAYS {
      errors.push(format!(
        "State retention must be at most {} days, got {}",
        MAX_RETENTION_DAYS, self.state.retention_days
      ));
    }
    if self.watch.event_buffer == 0 {
      errors.push("Event buffer must be at least 1".to_string());
    }
    if !LOG_LEVELS.contains(&self.daemon.log_level.to_lowercase().as_str()) {
      errors.push(format!(
        "Invalid log level: {} (expected one of {})",
        self.daemon.log_level,
        LOG_LEVELS.join(", ")
      ));
    }
    for pattern in self.filter.include.iter().chain(&self.filter.exclude) {
      if let Err(e) = glob::Pattern::new(pattern) {
        errors.push(format!("Invalid file pattern {:?}: {}", pattern, e));
      }
    }

    if errors.is_empty() {
      return Ok(());
    }

    for e in &errors {
      error!("Configuration error: {}", e);
    }
    Err(ConfigError::Invalid(errors))
  }

  /// Render the effective configuration as TOML
  pub fn to_toml(&self) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(self)?)
  }

  pub fn debounce(&self) -> Duration {
    secs_f64(self.watch.debounce_secs)
  }

  pub fn stability_interval(&self) -> Duration {
    secs_f64(self.stability.interval_secs)
  }

  pub fn copy_timeout(&self) -> Duration {
    Duration::from_secs(self.stability.copy_timeout_secs)
  }

  /// Hash cache retention; zero disables pruning
  pub fn retention(&self) -> Duration {
    retention_from_days(self.state.retention_days)
  }

  pub fn janitor_interval(&self) -> Duration {
    Duration::from_secs(self.state.janitor_interval_secs.max(1))
  }

  pub fn shutdown_grace(&self) -> Duration {
    Duration::from_secs(self.workers.shutdown_grace_secs)
  }
}

fn secs_f64(secs: f64) -> Duration {
  Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

/// `1`, `true`, `yes` (any case) are true; everything else is false
pub fn parse_bool(value: &str) -> bool {
  matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

/// Comma-separated pattern list with empty items dropped
pub fn parse_patterns(value: &str) -> Vec<String> {
  value
    .split(',')
    .map(str::trim)
    .filter(|p| !p.is_empty())
    .map(String::from)
    .collect()
}

fn parse_num<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
  T: std::str::FromStr,
  T::Err: std::fmt::Display,
{
  value.parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
    var,
    value: value.to_string(),
    reason: e.to_string(),
  })
}

/// Create `dir` if needed, verify it accepts writes, return its canonical form.
fn prepare_writable_dir(dir: &Path) -> std::io::Result<PathBuf> {
  std::fs::create_dir_all(dir)?;
  let probe = dir.join(".dropcopy-write-test");
  std::fs::write(&probe, b"test")?;
  std::fs::remove_file(&probe)?;
  dir.canonicalize()
}
