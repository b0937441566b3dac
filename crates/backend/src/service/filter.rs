//! Include/exclude name patterns and the size ceiling.

use std::path::Path;

use glob::Pattern;

use crate::domain::{candidate::SkipReason, config::FilterConfig};

#[derive(Debug, Clone, Default)]
pub struct FileFilter {
  include: Vec<Pattern>,
  exclude: Vec<Pattern>,
  max_size: Option<u64>,
}

impl FileFilter {
  pub fn from_config(config: &FilterConfig) -> Result<Self, glob::PatternError> {
    let compile = |patterns: &[String]| patterns.iter().map(|p| Pattern::new(p)).collect::<Result<Vec<_>, _>>();

    Ok(Self {
      include: compile(&config.include)?,
      exclude: compile(&config.exclude)?,
      max_size: config.max_size(),
    })
  }

  /// Whether the file name passes the patterns. Exclusion wins over inclusion.
  pub fn accepts_name(&self, path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
      return false;
    };

    if self.exclude.iter().any(|p| p.matches(&name)) {
      return false;
    }
    self.include.is_empty() || self.include.iter().any(|p| p.matches(&name))
  }

  /// Size check for a settled file
  pub fn check_size(&self, size: u64) -> Option<SkipReason> {
    match self.max_size {
      Some(max) if size > max => Some(SkipReason::TooLarge),
      _ => None,
    }
  }

  pub fn check_name(&self, path: &Path) -> Option<SkipReason> {
    (!self.accepts_name(path)).then_some(SkipReason::Filtered)
  }
}
