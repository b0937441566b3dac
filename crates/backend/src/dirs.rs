/// Get the default state directory
///
/// Respects the following environment variables (in order of precedence):
/// 1. DATA_DIR - explicit data directory override
/// 2. XDG_DATA_HOME - standard XDG data home directory
/// 3. dirs::data_local_dir() - platform default
pub fn default_state_dir() -> std::path::PathBuf {
  // Check explicit override first
  if let Ok(dir) = std::env::var("DATA_DIR") {
    return std::path::PathBuf::from(dir).join("state");
  }

  if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
    return std::path::PathBuf::from(xdg_data).join("dropcopy").join("state");
  }

  dirs::data_local_dir()
    .unwrap_or_else(|| std::path::PathBuf::from("."))
    .join("dropcopy")
    .join("state")
}

/// Get the default config directory
///
/// Respects the following environment variables (in order of precedence):
/// 1. CONFIG_DIR - explicit config directory override
/// 2. XDG_CONFIG_HOME - standard XDG config home directory
/// 3. dirs::config_dir() - platform default
pub fn default_config_dir() -> std::path::PathBuf {
  if let Ok(dir) = std::env::var("CONFIG_DIR") {
    return std::path::PathBuf::from(dir);
  }

  if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
    return std::path::PathBuf::from(xdg_config).join("dropcopy");
  }

  dirs::config_dir()
    .unwrap_or_else(|| std::path::PathBuf::from("."))
    .join("dropcopy")
}

/// Path of the user-level config file
pub fn user_config_path() -> std::path::PathBuf {
  default_config_dir().join("config.toml")
}
