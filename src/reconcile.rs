// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reconciliation planning.
//!
//! Given a fetched manifest and the local installation tree, decide what to
//! download, what to overwrite, and what to delete. This module only decides;
//! the [`mutate`](crate::mutate) module executes.
//!
//! # Whole-Package Strategy
//!
//! An update means "the server's system version differs from ours", so the
//! install set is every file of every category the manifest enumerates. There
//! is deliberately no per-file version diffing: comparing dozens of component
//! versions individually invites version-skew edge cases, while redownloading
//! the whole package is small and fast. An optional selective filter narrows
//! the install set for targeted re-fetching without a full reinstall.
//!
//! # Ownership Sniff
//!
//! Deletion is the one place per-file logic survives, and it applies only to
//! agents. Agent files on disk that the manifest no longer lists are either
//! stale leftovers from an earlier release or files the user wrote
//! themselves. There is no authoritative per-file ownership record, so
//! ownership is inferred by content: a distributed agent carries the product
//! signature somewhere in its first hundred lines. The tie-break policy is
//! absolute: a read error or a missing marker always resolves to preserve,
//! never delete. We must never delete a file we did not create.

use crate::manifest::{Category, Manifest, VERSION_RECORD};

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};
use tracing::{debug, instrument};

/// Marker distinguishing distributed files from user-authored ones.
///
/// Matched case-insensitively against the first [`SNIFF_LINE_LIMIT`] lines
/// of a file. Every agent descriptor the distribution ships mentions the
/// product by name; user files normally do not.
pub const SIGNATURE_MARKER: &str = "cadenza";

/// How many leading lines the ownership sniff inspects.
pub const SNIFF_LINE_LIMIT: usize = 100;

/// Extension of agent descriptor files subject to cleanup.
pub const AGENT_EXTENSION: &str = "md";

/// Per-file outcome of one reconciliation operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// File downloaded and written in place.
    Updated,

    /// Fetch or write failed; the rest of the run continues.
    Failed,

    /// Stale distributed file removed during agent cleanup.
    Deleted,

    /// File left untouched during agent cleanup.
    Preserved,
}

impl Display for Outcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Outcome::Updated => "updated",
            Outcome::Failed => "failed",
            Outcome::Deleted => "deleted",
            Outcome::Preserved => "preserved",
        };
        fmt.write_str(name)
    }
}

/// Record of one attempted operation.
#[derive(Clone, Debug)]
pub struct OperationResult {
    pub category: Category,
    pub filename: String,
    pub outcome: Outcome,

    /// Diagnostic for failures, backup notes for overwrites.
    pub detail: Option<String>,
}

/// Aggregated outcome of a whole reconciliation run.
///
/// `success_count` and `total_count` cover install operations (component
/// downloads plus the version record write). Cleanup is tallied separately
/// through `deleted_count` and `preserved_count`, mirroring how the run
/// reports: "N/M components updated, removed X stale agents, preserved Y".
#[derive(Clone, Debug, Default)]
pub struct Summary {
    pub results: Vec<OperationResult>,
    pub success_count: usize,
    pub total_count: usize,
    pub deleted_count: usize,
    pub preserved_count: usize,
}

impl Summary {
    /// Record the outcome of one install operation.
    pub fn record_install(&mut self, result: OperationResult) {
        self.total_count += 1;
        if result.outcome == Outcome::Updated {
            self.success_count += 1;
        }
        self.results.push(result);
    }

    /// Record the outcome of one agent-cleanup decision.
    pub fn record_cleanup(&mut self, result: OperationResult) {
        match result.outcome {
            Outcome::Deleted => self.deleted_count += 1,
            Outcome::Preserved => self.preserved_count += 1,
            _ => {}
        }
        self.results.push(result);
    }

    /// Whether every attempted install operation succeeded.
    pub fn is_full_success(&self) -> bool {
        self.success_count == self.total_count
    }
}

/// One component scheduled for download and overwrite.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedDownload {
    pub category: Category,
    pub filename: String,
}

/// Everything a reconciliation run intends to install.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstallPlan {
    /// Downloads in fixed category order, filename order within a category.
    pub downloads: Vec<PlannedDownload>,

    /// Whether the version record is rewritten at the end of the run.
    pub write_version_record: bool,
}

impl InstallPlan {
    /// Total install operations the plan will attempt.
    pub fn operation_count(&self) -> usize {
        self.downloads.len() + usize::from(self.write_version_record)
    }
}

/// Compute the install set for a manifest.
///
/// Without a selective filter the set is every file of every known category.
/// With one, it is the intersection with the filter; the version record is
/// part of the install set unless the filter excludes it.
pub fn plan_install(manifest: &Manifest, selective: Option<&BTreeSet<String>>) -> InstallPlan {
    let wanted = |filename: &str| selective.is_none_or(|filter| filter.contains(filename));

    let mut downloads = Vec::new();
    for category in Category::INSTALL_ORDER {
        for filename in manifest.filenames_of(category) {
            if wanted(filename) {
                downloads.push(PlannedDownload {
                    category,
                    filename: filename.to_string(),
                });
            }
        }
    }

    InstallPlan {
        downloads,
        write_version_record: wanted(VERSION_RECORD),
    }
}

/// Why an agent file is kept or removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentDisposition {
    /// Still part of the official distribution.
    Official,

    /// Distributed once, no longer official. Safe to remove.
    Stale,

    /// No signature marker found, or the file was unreadable. Hands off.
    UserAuthored,
}

/// Cleanup decisions for the agents directory, filename-sorted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupPlan {
    pub delete: Vec<String>,
    pub preserve: Vec<String>,
}

/// Decide which local agent files to delete after a full install.
///
/// Enumerates `*.md` files in the agents directory and classifies each one
/// against the manifest's official agent set via [`classify_agent`]. A
/// missing agents directory yields an empty plan.
#[instrument(skip(manifest, install_dir), level = "debug")]
pub fn plan_agent_cleanup(manifest: &Manifest, install_dir: &Path) -> CleanupPlan {
    let agents_dir = match Category::Agents.subdir() {
        Some(subdir) => install_dir.join(subdir),
        None => return CleanupPlan::default(),
    };

    let entries = match agents_dir.read_dir() {
        Ok(entries) => entries,
        Err(_) => return CleanupPlan::default(),
    };

    let official: BTreeSet<&str> = manifest.filenames_of(Category::Agents).collect();

    let mut plan = CleanupPlan::default();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_none_or(|ext| ext != AGENT_EXTENSION) || !path.is_file() {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };

        match classify_agent(&path, filename, &official) {
            AgentDisposition::Stale => plan.delete.push(filename.to_string()),
            AgentDisposition::Official | AgentDisposition::UserAuthored => {
                plan.preserve.push(filename.to_string())
            }
        }
    }

    plan.delete.sort();
    plan.preserve.sort();
    plan
}

/// Classify one local agent file against the official set.
pub fn classify_agent(
    path: &Path,
    filename: &str,
    official: &BTreeSet<&str>,
) -> AgentDisposition {
    if official.contains(filename) {
        return AgentDisposition::Official;
    }

    if carries_signature(path) {
        debug!("{filename} carries the distribution signature and is not official");
        AgentDisposition::Stale
    } else {
        AgentDisposition::UserAuthored
    }
}

/// Content sniff for distribution ownership.
///
/// Reads up to [`SNIFF_LINE_LIMIT`] lines and tests case-insensitively for
/// [`SIGNATURE_MARKER`]. Any read error means `false`: an unreadable file is
/// treated as user-owned and preserved.
pub fn carries_signature(path: &Path) -> bool {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return false,
    };

    let reader = BufReader::new(file);
    for line in reader.lines().take(SNIFF_LINE_LIMIT) {
        match line {
            Ok(line) if line.to_lowercase().contains(SIGNATURE_MARKER) => return true,
            Ok(_) => continue,
            // INVARIANT: Ambiguity resolves to preserve, never delete.
            Err(_) => return false,
        }
    }

    false
}
