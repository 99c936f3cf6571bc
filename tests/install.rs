// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! End-to-end reconciliation runs against an in-memory distribution server.

use cadenza::{
    client::{ClientError, RemoteSource, VersionComparison},
    install::{InstallOptions, InstallOutcome, Installer},
    manifest::{read_current_version, Category, ComponentInfo, Manifest, VERSION_RECORD},
    reconcile::Outcome,
};

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
};

/// In-memory stand-in for the distribution server.
struct FakeServer {
    manifest: Manifest,
    broken_components: BTreeSet<String>,
    manifest_unreachable: bool,
}

impl FakeServer {
    fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            broken_components: BTreeSet::new(),
            manifest_unreachable: false,
        }
    }

    fn component_bytes(category: Category, filename: &str) -> Vec<u8> {
        format!("cadenza distributed file {category}/{filename}\n").into_bytes()
    }
}

impl RemoteSource for FakeServer {
    fn fetch_manifest(&self) -> Result<Manifest, ClientError> {
        if self.manifest_unreachable {
            return Err(ClientError::BadResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                url: "fake://api/client/version".into(),
            });
        }

        Ok(self.manifest.clone())
    }

    fn fetch_component(&self, category: Category, filename: &str) -> Result<Vec<u8>, ClientError> {
        if self.broken_components.contains(filename) {
            return Err(ClientError::NotFound {
                category,
                filename: filename.to_string(),
            });
        }

        Ok(Self::component_bytes(category, filename))
    }

    fn compare_version(&self, client_version: &str) -> Result<VersionComparison, ClientError> {
        if self.manifest_unreachable {
            return Err(ClientError::BadResponse {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                url: "fake://api/client/version/compare".into(),
            });
        }

        Ok(VersionComparison {
            up_to_date: client_version == self.manifest.system_version,
            server_version: self.manifest.system_version.clone(),
            release_name: self.manifest.release_name.clone(),
            changelog: vec!["assorted fixes".into()],
        })
    }
}

fn component(version: &str) -> ComponentInfo {
    ComponentInfo {
        version: version.into(),
        extra: BTreeMap::new(),
    }
}

/// Three hooks, two commands, one agent. Six downloads, seven operations
/// once the version record write is counted.
fn release_manifest() -> Manifest {
    let mut components: BTreeMap<String, BTreeMap<String, ComponentInfo>> = BTreeMap::new();
    components.insert(
        "hooks".into(),
        ["on-session-start.py", "on-compact.py", "on-response.py"]
            .into_iter()
            .map(|name| (name.to_string(), component("2.1.3")))
            .collect(),
    );
    components.insert(
        "commands".into(),
        ["init.md", "digest.md"]
            .into_iter()
            .map(|name| (name.to_string(), component("2.1.3")))
            .collect(),
    );
    components.insert(
        "agents".into(),
        [("planner.md".to_string(), component("2.1.3"))]
            .into_iter()
            .collect(),
    );

    Manifest {
        system_version: "2.1.3".into(),
        release_name: "Fugue".into(),
        release_date: "2025-10-11".into(),
        components,
    }
}

fn backups_under(root: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, found: &mut Vec<PathBuf>) {
        let Ok(entries) = dir.read_dir() else { return };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, found);
            } else if path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.contains(".backup-"))
            {
                found.push(path);
            }
        }
    }

    let mut found = Vec::new();
    walk(root, &mut found);
    found.sort();
    found
}

#[test]
fn full_install_attempts_every_component_plus_version_record() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let server = FakeServer::new(release_manifest());
    let installer = Installer::new(&server, root.path());

    let outcome = installer.install(&InstallOptions::default())?;
    let InstallOutcome::Installed {
        version, summary, ..
    } = outcome
    else {
        panic!("fresh tree must install, not report up to date");
    };

    assert_eq!(version, "2.1.3");
    assert_eq!(summary.success_count, 7);
    assert_eq!(summary.total_count, 7);
    assert!(summary.is_full_success());

    assert!(root.path().join("hooks/on-session-start.py").exists());
    assert!(root.path().join("hooks/on-compact.py").exists());
    assert!(root.path().join("hooks/on-response.py").exists());
    assert!(root.path().join("commands/init.md").exists());
    assert!(root.path().join("commands/digest.md").exists());
    assert!(root.path().join("agents/planner.md").exists());
    assert_eq!(read_current_version(root.path()), "2.1.3");

    Ok(())
}

#[test]
fn second_run_hits_version_gate_and_mutates_nothing() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let server = FakeServer::new(release_manifest());
    let installer = Installer::new(&server, root.path());

    installer.install(&InstallOptions::default())?;
    let backups_after_first = backups_under(root.path());

    let outcome = installer.install(&InstallOptions::default())?;
    assert!(matches!(outcome, InstallOutcome::UpToDate { version } if version == "2.1.3"));
    assert_eq!(backups_under(root.path()), backups_after_first);

    Ok(())
}

#[test]
fn agent_cleanup_deletes_stale_and_preserves_official_and_user_files() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let agents = root.path().join("agents");
    fs::create_dir_all(&agents)?;
    fs::write(agents.join("planner.md"), "older cadenza planner\n")?;
    fs::write(agents.join("old-reviewer.md"), "Cadenza code reviewer, v1\n")?;
    fs::write(agents.join("my-notes.md"), "personal prompt stash\n")?;

    let server = FakeServer::new(release_manifest());
    let installer = Installer::new(&server, root.path());

    let InstallOutcome::Installed { summary, .. } =
        installer.install(&InstallOptions::default())?
    else {
        panic!("expected an install run");
    };

    assert_eq!(summary.deleted_count, 1);
    assert_eq!(summary.preserved_count, 2);
    assert!(!agents.join("old-reviewer.md").exists());
    assert!(agents.join("my-notes.md").exists());
    assert!(agents.join("planner.md").exists());

    Ok(())
}

#[test]
fn overwrites_back_up_the_previous_content() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let hooks = root.path().join("hooks");
    fs::create_dir_all(&hooks)?;
    fs::write(hooks.join("on-compact.py"), b"outdated hook body")?;

    let server = FakeServer::new(release_manifest());
    let installer = Installer::new(&server, root.path());
    installer.install(&InstallOptions::default())?;

    let backups = backups_under(&hooks);
    assert_eq!(backups.len(), 1);
    assert!(backups[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("on-compact.py.backup-"));
    assert_eq!(fs::read(&backups[0])?, b"outdated hook body");

    // The destination carries the fresh server bytes.
    assert_eq!(
        fs::read(hooks.join("on-compact.py"))?,
        FakeServer::component_bytes(Category::Hooks, "on-compact.py")
    );

    Ok(())
}

#[test]
fn selective_filter_touches_only_named_components() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let server = FakeServer::new(release_manifest());
    let installer = Installer::new(&server, root.path());

    let options = InstallOptions {
        force: true,
        selective: Some(["on-compact.py".to_string()].into_iter().collect()),
        ..InstallOptions::default()
    };
    let InstallOutcome::Installed { summary, .. } = installer.install(&options)? else {
        panic!("forced run must install");
    };

    assert_eq!(summary.total_count, 1);
    assert!(summary.is_full_success());

    assert!(root.path().join("hooks/on-compact.py").exists());
    assert!(!root.path().join("hooks/on-session-start.py").exists());
    assert!(!root.path().join("commands/init.md").exists());

    // The filter did not name the version record, so no record landed and
    // cleanup did not run either.
    assert!(!root.path().join(VERSION_RECORD).exists());
    assert_eq!(summary.deleted_count, 0);

    Ok(())
}

#[test]
fn manifest_fetch_failure_aborts_before_any_mutation() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let mut server = FakeServer::new(release_manifest());
    server.manifest_unreachable = true;

    let installer = Installer::new(&server, root.path());
    let options = InstallOptions {
        force: true,
        ..InstallOptions::default()
    };

    assert!(installer.install(&options).is_err());
    assert!(!root.path().join("hooks").exists());
    assert!(backups_under(root.path()).is_empty());

    Ok(())
}

#[test]
fn one_broken_component_does_not_abort_the_batch() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let mut server = FakeServer::new(release_manifest());
    server.broken_components.insert("on-compact.py".into());

    let installer = Installer::new(&server, root.path());
    let InstallOutcome::Installed { summary, .. } =
        installer.install(&InstallOptions::default())?
    else {
        panic!("expected an install run");
    };

    assert_eq!(summary.total_count, 7);
    assert_eq!(summary.success_count, 6);
    assert!(!summary.is_full_success());

    let failed: Vec<&str> = summary
        .results
        .iter()
        .filter(|result| result.outcome == Outcome::Failed)
        .map(|result| result.filename.as_str())
        .collect();
    assert_eq!(failed, vec!["on-compact.py"]);

    // Healthy siblings still landed, and the version record still persisted.
    assert!(root.path().join("hooks/on-session-start.py").exists());
    assert_eq!(read_current_version(root.path()), "2.1.3");

    Ok(())
}

#[test]
fn dry_run_reports_the_plan_without_mutating() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let agents = root.path().join("agents");
    fs::create_dir_all(&agents)?;
    fs::write(agents.join("old-reviewer.md"), "stale cadenza reviewer\n")?;

    let server = FakeServer::new(release_manifest());
    let installer = Installer::new(&server, root.path());

    let options = InstallOptions {
        dry_run: true,
        ..InstallOptions::default()
    };
    let InstallOutcome::Installed {
        summary, dry_run, ..
    } = installer.install(&options)?
    else {
        panic!("expected a rehearsed install run");
    };

    assert!(dry_run);
    assert_eq!(summary.total_count, 7);
    assert_eq!(summary.deleted_count, 1);

    assert!(!root.path().join("hooks").exists());
    assert!(!root.path().join(VERSION_RECORD).exists());
    assert!(agents.join("old-reviewer.md").exists());

    Ok(())
}

#[test]
fn silent_check_notices_version_drift_and_stays_quiet_when_current() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let server = FakeServer::new(release_manifest());
    let installer = Installer::new(&server, root.path());

    let notice = installer.silent_check().expect("fresh tree is behind");
    assert_eq!(notice.current_version, "0.0.0");
    assert_eq!(notice.server_version, "2.1.3");
    assert_eq!(notice.release_name, "Fugue");

    installer.install(&InstallOptions::default())?;
    assert!(installer.silent_check().is_none());

    Ok(())
}

#[test]
fn version_gate_is_plain_string_equality() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let server = FakeServer::new(release_manifest());
    let installer = Installer::new(&server, root.path());

    let report = installer.check()?;
    assert_eq!(report.current_version, "0.0.0");
    assert!(!report.comparison.up_to_date);

    installer.install(&InstallOptions::default())?;
    let report = installer.check()?;
    assert_eq!(report.current_version, "2.1.3");
    assert!(report.comparison.up_to_date);

    Ok(())
}
