// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevant path information for the installation root and the
//! updater's own settings file. Nothing here touches the file system; callers
//! decide what to create or read.

use std::path::PathBuf;

/// Directory name of a managed installation root.
pub const INSTALL_DIR_NAME: &str = ".cadenza";

/// Default project-local installation root, relative to the working directory.
pub fn project_install_dir() -> PathBuf {
    PathBuf::from(INSTALL_DIR_NAME)
}

/// Shared installation root in the user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn global_install_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|path| path.join(INSTALL_DIR_NAME))
        .ok_or(NoWayHome)
}

/// Default absolute path to the updater settings file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/cadenza/config.toml`. Does
/// not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if the configuration directory cannot be
///   determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn settings_file() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("cadenza").join("config.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
