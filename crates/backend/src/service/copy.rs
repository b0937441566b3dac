//! Atomic copy into the destination tree.
//!
//! Content is written to a uniquely named temp file in the destination
//! directory, synced, then renamed onto the final name. A consumer scanning the
//! destination either sees nothing at the final name or the complete file.

use std::{
  fs::File,
  io::{self, Write},
  path::{Component, Path, PathBuf},
  time::{Duration, Instant},
};

use flate2::{Compression, write::GzEncoder};

use super::error::PipelineError;

/// Maps source paths to destination paths.
#[derive(Debug, Clone)]
pub struct DestinationLayout {
  root: PathBuf,
  preserve_dirs: bool,
  compress: bool,
}

impl DestinationLayout {
  pub fn new(root: impl Into<PathBuf>, preserve_dirs: bool, compress: bool) -> Self {
    Self {
      root: root.into(),
      preserve_dirs,
      compress,
    }
  }

  /// Destination of a regular file.
  ///
  /// With `preserve_dirs` the path relative to `source_root` is mirrored,
  /// otherwise the file lands flat in the destination root and a name
  /// collision overwrites the earlier copy. Compressed copies get a `.gz`
  /// suffix.
  pub fn resolve(&self, source: &Path, source_root: &Path) -> Result<PathBuf, PipelineError> {
    let relative = if self.preserve_dirs {
      relative_to(source, source_root)?
    } else {
      source
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| PipelineError::configuration(format!("{} has no file name", source.display())))?
    };

    let mut destination = self.contained(&relative)?;
    if self.compress {
      let mut name = destination.file_name().map(|n| n.to_os_string()).unwrap_or_default();
      name.push(".gz");
      destination.set_file_name(name);
    }
    Ok(destination)
  }

  /// Destination of an empty directory. Flat layouts map every directory onto
  /// the destination root.
  pub fn resolve_dir(&self, dir: &Path, source_root: &Path) -> Result<PathBuf, PipelineError> {
    if !self.preserve_dirs {
      return Ok(self.root.clone());
    }
    self.contained(&relative_to(dir, source_root)?)
  }

  fn contained(&self, relative: &Path) -> Result<PathBuf, PipelineError> {
    let escapes = relative.components().any(|c| !matches!(c, Component::Normal(_)));
    let destination = self.root.join(relative);
    if escapes || !destination.starts_with(&self.root) {
      return Err(PipelineError::configuration(format!(
        "Refusing to write outside destination root: {}",
        destination.display()
      )));
    }
    Ok(destination)
  }
}

fn relative_to(path: &Path, root: &Path) -> Result<PathBuf, PipelineError> {
  path.strip_prefix(root).map(Path::to_path_buf).map_err(|_| {
    PipelineError::configuration(format!("{} is not under source root {}", path.display(), root.display()))
  })
}

/// Result of a completed copy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CopyResult {
  /// Bytes now at the destination
  pub bytes: u64,
  pub elapsed: Duration,
}

/// Copy `source` onto `destination` through a temp file and rename.
///
/// Missing parent directories are created. Permissions and modification time
/// follow the source. With `compress` the content is gzipped on the way.
pub fn atomic_copy(source: &Path, destination: &Path, compress: bool) -> io::Result<CopyResult> {
  let start = Instant::now();
  let parent = destination
    .parent()
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "destination has no parent"))?;
  std::fs::create_dir_all(parent)?;

  let mut input = File::open(source)?;
  let source_meta = input.metadata()?;

  let name = destination.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
  let mut tmp = tempfile::Builder::new()
    .prefix(&format!(".{}.", name))
    .suffix(".part")
    .tempfile_in(parent)?;

  if compress {
    let mut encoder = GzEncoder::new(tmp.as_file_mut(), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;
  } else {
    io::copy(&mut input, tmp.as_file_mut())?;
  }

  let file = tmp.as_file();
  file.set_permissions(source_meta.permissions())?;
  if let Ok(modified) = source_meta.modified() {
    file.set_modified(modified)?;
  }
  file.sync_all()?;
  let bytes = file.metadata()?.len();

  tmp.persist(destination).map_err(|e| e.error)?;
  sync_dir(parent);

  Ok(CopyResult {
    bytes,
    elapsed: start.elapsed(),
  })
}

/// Create an empty directory at the destination. Directories have no partial
/// state, so there is no temp step.
pub fn create_empty_dir(destination: &Path) -> io::Result<()> {
  std::fs::create_dir_all(destination)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
  if let Ok(handle) = File::open(dir) {
    let _ = handle.sync_all();
  }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
