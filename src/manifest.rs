// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manifest and version record layout.
//!
//! The distribution server describes everything it currently ships through a
//! single __manifest__: a versioned document that maps component categories
//! (hooks, commands, agents, docs, config, secrets) to the filenames that
//! belong to each category. The manifest is immutable once fetched; a new
//! manifest always supersedes the old one wholesale, it never patches it.
//!
//! # Version Record
//!
//! The last-installed manifest is persisted verbatim at the top of the
//! installation root as `version_manifest.json`. This file is the sole local
//! trust anchor for "are we up to date": its `system_version` field is
//! compared against the server's, and nothing else. Because the whole
//! manifest is stored, the record doubles as a cache of exactly what the
//! previous install shipped.
//!
//! The record is written in full after every successful reconciliation and
//! is read-only at all other times. A missing or corrupted record is never an
//! error; it simply reads as the sentinel version `"0.0.0"`, which makes the
//! next reconciliation a full reinstall. Availability over strictness.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::Path,
};
use tracing::{debug, warn};

/// Filename of the local version record at the installation root.
pub const VERSION_RECORD: &str = "version_manifest.json";

/// Version reported when no valid local record exists.
pub const SENTINEL_VERSION: &str = "0.0.0";

/// Component category recognized by the distribution.
///
/// Categories determine where a component lands relative to the installation
/// root, and the fixed order in which categories are installed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Hooks,
    Commands,
    Agents,
    Docs,
    Config,
    Secrets,
}

impl Category {
    /// Fixed installation order across categories.
    ///
    /// The order exists purely for deterministic, readable reporting. The one
    /// hard requirement layered on top of it is that agent cleanup must run
    /// strictly after agent install, which the installer enforces separately.
    pub const INSTALL_ORDER: [Category; 6] = [
        Category::Hooks,
        Category::Commands,
        Category::Agents,
        Category::Docs,
        Category::Config,
        Category::Secrets,
    ];

    /// Manifest key for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Hooks => "hooks",
            Category::Commands => "commands",
            Category::Agents => "agents",
            Category::Docs => "docs",
            Category::Config => "config",
            Category::Secrets => "secrets",
        }
    }

    /// Subdirectory of the installation root this category installs into.
    ///
    /// Docs and config files live directly at the installation root.
    pub fn subdir(&self) -> Option<&'static str> {
        match self {
            Category::Hooks => Some("hooks"),
            Category::Commands => Some("commands"),
            Category::Agents => Some("agents"),
            Category::Secrets => Some("secrets"),
            Category::Docs | Category::Config => None,
        }
    }
}

impl Display for Category {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Per-component metadata carried by the manifest.
///
/// Only the version string matters to the client. Anything else the server
/// chooses to ship alongside it is kept verbatim so the version record stays
/// a faithful copy of the manifest.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ComponentInfo {
    #[serde(default)]
    pub version: String,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Server-declared description of the current distributable file set.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Manifest {
    /// Version of the whole distribution. The only version that matters.
    pub system_version: String,

    #[serde(default)]
    pub release_name: String,

    #[serde(default)]
    pub release_date: String,

    /// Category name to filename to component metadata.
    ///
    /// Keyed by plain strings so that manifests from newer servers carrying
    /// categories this client does not know about still parse. Unknown
    /// categories are preserved in the version record but never installed.
    #[serde(default)]
    pub components: BTreeMap<String, BTreeMap<String, ComponentInfo>>,
}

impl Manifest {
    /// Iterate components of one category in filename order.
    ///
    /// Categories absent from the manifest yield nothing.
    pub fn components_of(
        &self,
        category: Category,
    ) -> impl Iterator<Item = (&str, &ComponentInfo)> {
        self.components
            .get(category.as_str())
            .into_iter()
            .flat_map(|entries| entries.iter().map(|(name, info)| (name.as_str(), info)))
    }

    /// Filenames of one category as a set-friendly iterator.
    pub fn filenames_of(&self, category: Category) -> impl Iterator<Item = &str> {
        self.components_of(category).map(|(name, _)| name)
    }

    /// Parse a manifest from raw JSON.
    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Persist this manifest verbatim as the version record.
    ///
    /// Overwrites any existing record in full. The write is staged through a
    /// temporary sibling and renamed into place, so a killed run leaves
    /// either the old record or the new one, never a truncated file.
    pub fn persist(&self, install_dir: &Path) -> Result<()> {
        let path = install_dir.join(VERSION_RECORD);
        let data = serde_json::to_string_pretty(self)?;
        crate::mutate::stage_and_rename(&path, data.as_bytes())?;
        debug!("persisted version record at {}", path.display());

        Ok(())
    }
}

/// Read the locally installed system version.
///
/// Returns the stored `system_version` if the version record exists and
/// parses. Any read or parse failure degrades to [`SENTINEL_VERSION`] so a
/// damaged installation triggers a full reinstall instead of blocking.
pub fn read_current_version(install_dir: &Path) -> String {
    let path = install_dir.join(VERSION_RECORD);
    let data = match fs::read_to_string(&path) {
        Ok(data) => data,
        Err(error) => {
            debug!("no readable version record at {}: {error}", path.display());
            return SENTINEL_VERSION.into();
        }
    };

    match serde_json::from_str::<Manifest>(&data) {
        Ok(manifest) if !manifest.system_version.is_empty() => manifest.system_version,
        Ok(_) => {
            warn!("version record at {} has no system_version", path.display());
            SENTINEL_VERSION.into()
        }
        Err(error) => {
            warn!("unparseable version record at {}: {error}", path.display());
            SENTINEL_VERSION.into()
        }
    }
}

/// Manifest handling error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Manifest or version record fails to serialize or deserialize.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Version record cannot be read or written.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
type Result<T, E = ManifestError> = std::result::Result<T, E>;
