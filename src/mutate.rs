// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Per-file mutation of the installation tree.
//!
//! Executes the operations the reconciler planned: backup-then-write for
//! overwrites, plain removal for deletions. One call mutates one file.
//!
//! # Safety Properties
//!
//! Anything that exists at a destination gets copied to a timestamped
//! sibling (`<name>.backup-<YYYYMMDD_HHMMSS>`) before it is overwritten.
//! Backups are never pruned here; retention is the user's business. Writes
//! go through a temporary file in the destination directory followed by a
//! rename, so on success there is no observable partially-written state, and
//! on failure the original remains recoverable from its backup. Agent
//! deletions carry no backup: by the time cleanup runs, the server-side
//! replacement for anything stale has already been installed.

use crate::manifest::{Category, VERSION_RECORD};

use std::{
    fs,
    path::{Path, PathBuf},
};
use time::{macros::format_description, OffsetDateTime};
use tracing::{debug, instrument, warn};

/// Filename suffixes that mark a component as an executable script.
pub const SCRIPT_EXTENSIONS: [&str; 2] = [".py", ".sh"];

/// Applies planned operations to one installation root.
#[derive(Clone, Debug)]
pub struct Mutator {
    install_dir: PathBuf,
}

/// What actually happened during a successful write.
#[derive(Clone, Debug, Default)]
pub struct Applied {
    /// Final destination of the new bytes.
    pub destination: PathBuf,

    /// Backup of the previous file content, when one existed.
    pub backup: Option<PathBuf>,

    /// Why the backup was skipped. A failed backup is surfaced but does not
    /// block the write.
    pub backup_failure: Option<String>,
}

impl Mutator {
    /// Construct a mutator rooted at `install_dir`.
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
        }
    }

    /// Resolve the destination path for a component.
    ///
    /// Hooks, commands, agents, and secrets land in their category
    /// subdirectory; docs and config land at the installation root. A file
    /// named like the version record always resolves to the root regardless
    /// of its category, so a manifest listing it under `config` cannot
    /// scatter stray copies around the tree.
    pub fn destination(&self, category: Category, filename: &str) -> PathBuf {
        if filename == VERSION_RECORD {
            return self.install_dir.join(filename);
        }

        match category.subdir() {
            Some(subdir) => self.install_dir.join(subdir).join(filename),
            None => self.install_dir.join(filename),
        }
    }

    /// Back up the destination if present, then write `bytes` in its place.
    ///
    /// Creates missing parent directories. Marks the result executable when
    /// the filename indicates a script.
    ///
    /// # Errors
    ///
    /// - Return [`MutateError::CreateDir`] if a parent directory cannot be
    ///   created.
    /// - Return [`MutateError::Write`] if the new content cannot be staged
    ///   or moved into place.
    #[instrument(skip(self, bytes), level = "debug")]
    pub fn apply(&self, category: Category, filename: &str, bytes: &[u8]) -> Result<Applied> {
        let destination = self.destination(category, filename);

        if let Some(parent) = destination.parent() {
            mkdirp::mkdirp(parent).map_err(|source| MutateError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut applied = Applied {
            destination: destination.clone(),
            ..Applied::default()
        };

        if destination.exists() {
            match backup_file(&destination) {
                Ok(backup) => {
                    debug!("backed up {} to {}", destination.display(), backup.display());
                    applied.backup = Some(backup);
                }
                Err(error) => {
                    warn!("cannot back up {}: {error}", destination.display());
                    applied.backup_failure = Some(error.to_string());
                }
            }
        }

        stage_and_rename(&destination, bytes).map_err(|source| MutateError::Write {
            path: destination.clone(),
            source,
        })?;

        if is_script(filename) {
            set_executable(&destination).map_err(|source| MutateError::Write {
                path: destination,
                source,
            })?;
        }

        Ok(applied)
    }

    /// Remove a component file, with no backup.
    ///
    /// # Errors
    ///
    /// - Return [`MutateError::Delete`] if removal fails.
    #[instrument(skip(self), level = "debug")]
    pub fn delete(&self, category: Category, filename: &str) -> Result<PathBuf> {
        let destination = self.destination(category, filename);
        fs::remove_file(&destination).map_err(|source| MutateError::Delete {
            path: destination.clone(),
            source,
        })?;

        Ok(destination)
    }
}

/// Copy `path` to a timestamped sibling, preserving content and permission
/// bits.
pub fn backup_file(path: &Path) -> Result<PathBuf> {
    let format = format_description!("[year][month][day]_[hour][minute][second]");
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let timestamp = now.format(&format)?;

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let backup = path.with_file_name(format!("{filename}.backup-{timestamp}"));

    fs::copy(path, &backup).map_err(|source| MutateError::Backup {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(backup)
}

fn is_script(filename: &str) -> bool {
    SCRIPT_EXTENSIONS
        .iter()
        .any(|extension| filename.ends_with(extension))
}

/// Write through a temporary sibling and rename over the destination.
///
/// On success the destination holds the new bytes in full; a failed or
/// interrupted write leaves the previous content untouched.
pub(crate) fn stage_and_rename(destination: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let filename = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let staging = destination.with_file_name(format!(".{filename}.part"));

    fs::write(&staging, bytes)?;
    if let Err(error) = fs::rename(&staging, destination) {
        // INVARIANT: Never leave staging litter next to the destination.
        let _ = fs::remove_file(&staging);
        return Err(error);
    }

    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Mutation error types.
#[derive(Debug, thiserror::Error)]
pub enum MutateError {
    /// Parent directory cannot be created.
    #[error("cannot create directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// New content cannot be written into place.
    #[error("cannot write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Existing content cannot be copied aside.
    #[error("cannot back up {path}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File cannot be removed.
    #[error("cannot delete {path}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backup timestamp cannot be rendered.
    #[error(transparent)]
    Timestamp(#[from] time::error::Format),
}

impl MutateError {
    /// Path the failed operation was aimed at, for reporting.
    pub fn path(&self) -> Option<&Path> {
        match self {
            MutateError::CreateDir { path, .. }
            | MutateError::Write { path, .. }
            | MutateError::Backup { path, .. }
            | MutateError::Delete { path, .. } => Some(path),
            MutateError::Timestamp(_) => None,
        }
    }
}

/// Friendly result alias :3
type Result<T, E = MutateError> = std::result::Result<T, E>;
