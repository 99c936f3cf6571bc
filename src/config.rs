// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the optional settings file that the updater reads
//! to locate its distribution server and installation root, to simplify the
//! process of serialization and deserialization. File I/O is left to the
//! caller to figure out.
//!
//! # Precedence
//!
//! Nothing in the settings file is required. The caller resolves each value
//! as: command line flag, then `CADENZA_SERVER_URL` environment variable
//! (server URL only), then settings file, then built-in default.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Settings file layout.
///
/// Lives at `$XDG_CONFIG_HOME/cadenza/config.toml`. Every field is optional;
/// an empty file is a valid settings file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Base URL of the distribution server.
    pub server_url: Option<String>,

    /// Installation root to manage. Shell expansion applies, so values like
    /// `~/.cadenza` and `$HOME/.cadenza` work.
    pub install_dir: Option<PathBuf>,

    /// Per-request timeout in seconds for explicit check and install runs.
    pub timeout: Option<u64>,
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on install directory field.
        if let Some(install_dir) = settings.install_dir {
            settings.install_dir = Some(
                shellexpand::full(install_dir.to_string_lossy().as_ref())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned()
                    .into(),
            );
        }

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}
