// Copyright 2018-2025 the Deno authors. MIT license.

//! The logical working directory used by commands that don't set one.
//!
//! This is process wide state. Changing it while other threads launch
//! commands relying on it is a race, so serialize those changes or give
//! the commands an explicit working directory.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use parking_lot::Mutex;
use parking_lot::const_mutex;
use path_dedot::ParseDot;

/// Set to anything other than `false` to keep temp directories around
/// for inspection instead of deleting them.
pub const KEEP_TMPDIR_ENV_VAR: &str = "PROCPUMP_KEEP_TMPDIR";

static LOGICAL_CWD: Mutex<Option<PathBuf>> = const_mutex(None);
static TEMP_DIRS: Mutex<Vec<PathBuf>> = const_mutex(Vec::new());

/// The logical working directory, or the OS working directory of this
/// process when no scope has been entered.
pub fn current_dir() -> std::io::Result<PathBuf> {
  match LOGICAL_CWD.lock().as_ref() {
    Some(dir) => Ok(dir.clone()),
    None => std::env::current_dir(),
  }
}

/// Makes a directory the logical working directory until dropped.
#[derive(Debug)]
#[must_use = "the previous working directory is restored when this is dropped"]
pub struct CwdScope {
  dir: PathBuf,
  previous: Option<PathBuf>,
}

impl CwdScope {
  /// Enters `path`, resolved against the current logical working
  /// directory. The directory is created if it doesn't exist.
  pub fn enter(path: impl AsRef<Path>) -> Result<Self> {
    let base = current_dir().context("Failed resolving working directory.")?;
    let dir = resolve_path(&base, path.as_ref());
    std::fs::create_dir_all(&dir)
      .with_context(|| format!("Failed creating {}", dir.display()))?;
    let previous = LOGICAL_CWD.lock().replace(dir.clone());
    tracing::debug!(dir = %dir.display(), "entered working directory");
    Ok(Self { dir, previous })
  }

  /// Enters a new, uniquely named temp directory. It is deleted by
  /// [`cleanup_temp_dirs`] or [`CwdScope::clear`].
  pub fn temp() -> Result<Self> {
    let dir = create_unique_temp_dir()?;
    Self::enter(dir)
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Restores the previous working directory.
  pub fn close(self) {}

  /// Restores the previous working directory and deletes this one.
  pub fn clear(self) -> Result<()> {
    let dir = self.dir.clone();
    drop(self);
    TEMP_DIRS.lock().retain(|temp_dir| temp_dir != &dir);
    if keep_temp_dirs() {
      return Ok(());
    }
    remove_dir(&dir)
  }
}

impl Drop for CwdScope {
  fn drop(&mut self) {
    *LOGICAL_CWD.lock() = self.previous.take();
  }
}

/// Deletes every temp directory created by [`CwdScope::temp`].
///
/// Meant to be called once when the program is exiting.
pub fn cleanup_temp_dirs() -> Result<()> {
  let dirs = std::mem::take(&mut *TEMP_DIRS.lock());
  if keep_temp_dirs() {
    return Ok(());
  }
  let mut first_error = None;
  for dir in dirs {
    if let Err(err) = remove_dir(&dir) {
      tracing::warn!(
        dir = %dir.display(),
        error = %err,
        "failed removing temp dir"
      );
      if first_error.is_none() {
        first_error = Some(err);
      }
    }
  }
  match first_error {
    Some(err) => Err(err),
    None => Ok(()),
  }
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
  let joined = base.join(path);
  match joined.parse_dot() {
    Ok(path) => path.to_path_buf(),
    Err(_) => joined,
  }
}

fn create_unique_temp_dir() -> Result<PathBuf> {
  // tempfile retries with a new name when one is already taken
  let dir = tempfile::Builder::new()
    .prefix("procpump-")
    .tempdir()
    .context("Failed creating temp dir.")?
    .keep();
  let dir = dir.canonicalize().unwrap_or(dir);
  TEMP_DIRS.lock().push(dir.clone());
  Ok(dir)
}

fn remove_dir(dir: &Path) -> Result<()> {
  match std::fs::remove_dir_all(dir) {
    Ok(()) => Ok(()),
    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(err) => {
      Err(err).with_context(|| format!("Failed removing {}", dir.display()))
    }
  }
}

fn keep_temp_dirs() -> bool {
  std::env::var_os(KEEP_TMPDIR_ENV_VAR)
    .is_some_and(|value| !value.is_empty() && value != "false")
}
