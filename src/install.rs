// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reconciliation orchestration.
//!
//! Drives one complete update attempt: check the version gate, fetch the
//! manifest, compute the install and deletion sets, apply every planned
//! operation, persist the new version record, and report. The flow is
//! strictly linear and single-pass; each invocation is one reconciliation
//! attempt, with no retry loop and no background scheduling.
//!
//! # Failure Policy
//!
//! A manifest fetch failure aborts before any mutation. After that point
//! every planned operation is attempted no matter how many of its siblings
//! fail; one broken remote asset must not block fifty healthy ones. The run
//! ends with an aggregate summary, and overall success simply means every
//! attempted install operation succeeded.

use crate::{
    client::{RemoteSource, VersionComparison},
    manifest::{read_current_version, Category, Manifest, VERSION_RECORD},
    mutate::Mutator,
    reconcile::{
        plan_agent_cleanup, plan_install, CleanupPlan, Outcome, OperationResult, Summary,
    },
};

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Options controlling one install run.
#[derive(Clone, Debug, Default)]
pub struct InstallOptions {
    /// Skip the version gate and reinstall even when up to date.
    pub force: bool,

    /// Restrict the run to these filenames. `None` means the whole package.
    pub selective: Option<BTreeSet<String>>,

    /// Plan and report every operation without mutating anything.
    pub dry_run: bool,
}

/// Terminal state of one install run.
#[derive(Clone, Debug)]
pub enum InstallOutcome {
    /// Server and local versions already match; nothing was touched.
    UpToDate { version: String },

    /// The mutation phase ran (or was rehearsed, for dry runs).
    Installed {
        version: String,
        summary: Summary,
        dry_run: bool,
    },
}

/// Update notice produced by the silent startup check.
#[derive(Clone, Debug, serde::Serialize)]
pub struct UpdateNotice {
    pub current_version: String,
    pub server_version: String,
    pub release_name: String,
}

/// Result of an explicit check-only run.
#[derive(Clone, Debug)]
pub struct CheckReport {
    pub current_version: String,
    pub comparison: VersionComparison,
}

/// One-shot reconciliation driver for a single installation root.
#[derive(Debug)]
pub struct Installer<'a, S: RemoteSource> {
    source: &'a S,
    install_dir: PathBuf,
    mutator: Mutator,
}

impl<'a, S: RemoteSource> Installer<'a, S> {
    /// Construct an installer over `source`, managing `install_dir`.
    pub fn new(source: &'a S, install_dir: impl Into<PathBuf>) -> Self {
        let install_dir = install_dir.into();
        let mutator = Mutator::new(&install_dir);

        Self {
            source,
            install_dir,
            mutator,
        }
    }

    /// Installation root this installer manages.
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Ask the server whether the local installation is current.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::Client`] if the compare endpoint fails.
    pub fn check(&self) -> Result<CheckReport> {
        let current_version = read_current_version(&self.install_dir);
        let comparison = self.source.compare_version(&current_version)?;

        Ok(CheckReport {
            current_version,
            comparison,
        })
    }

    /// Quiet version gate for session-start hooks.
    ///
    /// Compares the manifest's system version against the local record by
    /// plain string equality. Never fails the caller: any error reads as "no
    /// update", because a broken network must not block session start.
    pub fn silent_check(&self) -> Option<UpdateNotice> {
        let current_version = read_current_version(&self.install_dir);
        let manifest = match self.source.fetch_manifest() {
            Ok(manifest) => manifest,
            Err(_) => return None,
        };

        if manifest.system_version == current_version {
            return None;
        }

        Some(UpdateNotice {
            current_version,
            server_version: manifest.system_version,
            release_name: manifest.release_name,
        })
    }

    /// Run one full reconciliation attempt.
    ///
    /// # Errors
    ///
    /// - Return [`InstallError::Client`] if the version gate or the manifest
    ///   fetch fails. Nothing has been mutated at that point.
    ///
    /// Per-component failures never surface here; they are recorded in the
    /// returned summary.
    #[instrument(skip(self, options), level = "debug")]
    pub fn install(&self, options: &InstallOptions) -> Result<InstallOutcome> {
        if !options.force {
            let report = self.check()?;
            if report.comparison.up_to_date {
                info!("already up to date at {}", report.current_version);
                return Ok(InstallOutcome::UpToDate {
                    version: report.current_version,
                });
            }
        }

        let manifest = self.source.fetch_manifest()?;
        info!(
            "installing version {} \"{}\"",
            manifest.system_version, manifest.release_name
        );

        let plan = plan_install(&manifest, options.selective.as_ref());
        let mut summary = Summary::default();

        if !options.dry_run {
            mkdirp::mkdirp(&self.install_dir).map_err(|source| InstallError::InstallDir {
                path: self.install_dir.clone(),
                source,
            })?;
        }

        for download in &plan.downloads {
            let result = if options.dry_run {
                OperationResult {
                    category: download.category,
                    filename: download.filename.clone(),
                    outcome: Outcome::Updated,
                    detail: Some("dry run, nothing written".into()),
                }
            } else {
                self.install_one(download.category, &download.filename)
            };
            summary.record_install(result);
        }

        if plan.write_version_record {
            summary.record_install(self.persist_record(&manifest, options.dry_run));
        }

        // INVARIANT: Cleanup runs strictly after agent install, and only for
        // whole-package runs, so the official set reflects this manifest.
        if options.selective.is_none() {
            self.cleanup_agents(&manifest, options.dry_run, &mut summary);
        }

        info!(
            "update complete: {}/{} components updated",
            summary.success_count, summary.total_count
        );

        Ok(InstallOutcome::Installed {
            version: manifest.system_version,
            summary,
            dry_run: options.dry_run,
        })
    }

    /// Download one component and write it into place.
    fn install_one(&self, category: Category, filename: &str) -> OperationResult {
        let bytes = match self.source.fetch_component(category, filename) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!("cannot fetch {category}/{filename}: {error}");
                return OperationResult {
                    category,
                    filename: filename.to_string(),
                    outcome: Outcome::Failed,
                    detail: Some(format!("fetch: {error}")),
                };
            }
        };

        match self.mutator.apply(category, filename, &bytes) {
            Ok(applied) => {
                info!("updated {category}/{filename}");
                let detail = applied
                    .backup
                    .as_ref()
                    .map(|backup| format!("backed up previous copy to {}", backup.display()))
                    .or(applied.backup_failure.map(|why| format!("backup skipped: {why}")));

                OperationResult {
                    category,
                    filename: filename.to_string(),
                    outcome: Outcome::Updated,
                    detail,
                }
            }
            Err(error) => {
                warn!("cannot write {category}/{filename}: {error}");
                OperationResult {
                    category,
                    filename: filename.to_string(),
                    outcome: Outcome::Failed,
                    detail: Some(format!("write: {error}")),
                }
            }
        }
    }

    /// Persist the fetched manifest as the new version record.
    ///
    /// Runs only after every file operation has been attempted. Failure is
    /// recorded like any other operation; the component updates that already
    /// landed stay landed.
    fn persist_record(&self, manifest: &Manifest, dry_run: bool) -> OperationResult {
        if dry_run {
            return OperationResult {
                category: Category::Config,
                filename: VERSION_RECORD.into(),
                outcome: Outcome::Updated,
                detail: Some("dry run, nothing written".into()),
            };
        }

        let backup_note = self
            .install_dir
            .join(VERSION_RECORD)
            .exists()
            .then(|| match crate::mutate::backup_file(&self.install_dir.join(VERSION_RECORD)) {
                Ok(backup) => format!("backed up previous copy to {}", backup.display()),
                Err(error) => {
                    warn!("cannot back up version record: {error}");
                    format!("backup skipped: {error}")
                }
            });

        match manifest.persist(&self.install_dir) {
            Ok(()) => OperationResult {
                category: Category::Config,
                filename: VERSION_RECORD.into(),
                outcome: Outcome::Updated,
                detail: backup_note,
            },
            Err(error) => {
                warn!("cannot persist version record: {error}");
                OperationResult {
                    category: Category::Config,
                    filename: VERSION_RECORD.into(),
                    outcome: Outcome::Failed,
                    detail: Some(format!("persist: {error}")),
                }
            }
        }
    }

    /// Remove stale distributed agents, preserving anything user-authored.
    fn cleanup_agents(&self, manifest: &Manifest, dry_run: bool, summary: &mut Summary) {
        let CleanupPlan { delete, preserve } = plan_agent_cleanup(manifest, &self.install_dir);

        if !delete.is_empty() {
            info!("cleaning up {} stale agents", delete.len());
        }

        for filename in delete {
            let result = if dry_run {
                OperationResult {
                    category: Category::Agents,
                    filename,
                    outcome: Outcome::Deleted,
                    detail: Some("dry run, nothing removed".into()),
                }
            } else {
                match self.mutator.delete(Category::Agents, &filename) {
                    Ok(_) => {
                        info!("deleted stale agent {filename}");
                        OperationResult {
                            category: Category::Agents,
                            filename,
                            outcome: Outcome::Deleted,
                            detail: None,
                        }
                    }
                    Err(error) => {
                        warn!("cannot delete stale agent {filename}: {error}");
                        OperationResult {
                            category: Category::Agents,
                            filename,
                            outcome: Outcome::Failed,
                            detail: Some(format!("delete: {error}")),
                        }
                    }
                }
            };
            summary.record_cleanup(result);
        }

        for filename in preserve {
            summary.record_cleanup(OperationResult {
                category: Category::Agents,
                filename,
                outcome: Outcome::Preserved,
                detail: None,
            });
        }
    }
}

/// Orchestration error types.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// Version gate or manifest fetch failed; nothing was mutated.
    #[error(transparent)]
    Client(#[from] crate::client::ClientError),

    /// Installation root cannot be created.
    #[error("cannot create installation root {path}")]
    InstallDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
type Result<T, E = InstallError> = std::result::Result<T, E>;
