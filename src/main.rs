// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use cadenza::{
    client::{CHECK_TIMEOUT, DEFAULT_SERVER_URL, SERVER_URL_ENV},
    config::Settings,
    path::{global_install_dir, project_install_dir, settings_file},
    HttpSource, InstallOptions, InstallOutcome, Installer, Outcome,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{collections::BTreeSet, env, fs, path::PathBuf, process::exit, time::Duration};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  cadenza [options] <cadenza-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Installation root to manage instead of the project-local default.
    #[arg(short, long, value_name = "path", global = true)]
    pub dir: Option<PathBuf>,

    /// Manage the shared installation root in the home directory.
    #[arg(short, long, global = true, conflicts_with = "dir")]
    pub global: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<i32> {
        let settings = load_settings()?;
        let install_dir = self.resolve_install_dir(&settings)?;
        let server_url = env::var(SERVER_URL_ENV)
            .ok()
            .or(settings.server_url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.into());
        let timeout = settings
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(cadenza::client::INSTALL_TIMEOUT);

        match self.command {
            Command::Check(opts) => run_check(&server_url, timeout, install_dir, opts),
            Command::Install(opts) => run_install(&server_url, timeout, install_dir, opts),
            Command::SilentCheck(opts) => run_silent_check(&server_url, install_dir, opts),
        }
    }

    fn resolve_install_dir(&self, settings: &Settings) -> Result<PathBuf> {
        if let Some(dir) = &self.dir {
            return Ok(dir.clone());
        }

        if self.global {
            return Ok(global_install_dir()?);
        }

        Ok(settings
            .install_dir
            .clone()
            .unwrap_or_else(project_install_dir))
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Check for updates without installing anything.
    #[command(override_usage = "cadenza check [options]")]
    Check(CheckOptions),

    /// Download and install the server's current distribution.
    #[command(override_usage = "cadenza install [options]")]
    Install(InstallCliOptions),

    /// Quiet update check for session-start hooks. Always exits 0 and only
    /// emits output when an update exists.
    #[command(override_usage = "cadenza silent-check [options]")]
    SilentCheck(SilentCheckOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CheckOptions {
    /// Print the server's verdict as JSON on stdout.
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct InstallCliOptions {
    /// Reinstall even when the server says the installation is current.
    #[arg(short, long)]
    pub force: bool,

    /// Restrict the run to the named components. Repeatable.
    #[arg(short, long, value_name = "filename")]
    pub component: Vec<String>,

    /// Plan and report every operation without touching the tree.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SilentCheckOptions {
    /// Emit the update notice as JSON on stdout.
    #[arg(short, long)]
    pub json: bool,
}

fn main() {
    let layer = fmt::layer().compact().with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry().with(layer).with(filter).init();

    match run() {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(2);
        }
    }
}

fn run() -> Result<i32> {
    Cli::parse().run()
}

fn run_check(
    server_url: &str,
    timeout: Duration,
    install_dir: PathBuf,
    opts: CheckOptions,
) -> Result<i32> {
    let source = HttpSource::new(server_url, timeout)?;
    let installer = Installer::new(&source, install_dir);
    let report = installer.check()?;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&report.comparison)?);
    }

    if report.comparison.up_to_date {
        info!("up to date at {}", report.current_version);
        return Ok(0);
    }

    info!(
        "update available: {} -> {} \"{}\"",
        report.current_version, report.comparison.server_version, report.comparison.release_name
    );
    for change in report.comparison.changelog.iter().take(5) {
        info!("  - {change}");
    }

    Ok(1)
}

fn run_install(
    server_url: &str,
    timeout: Duration,
    install_dir: PathBuf,
    opts: InstallCliOptions,
) -> Result<i32> {
    let source = HttpSource::new(server_url, timeout)?;
    let installer = Installer::new(&source, install_dir);

    let selective = (!opts.component.is_empty())
        .then(|| opts.component.iter().cloned().collect::<BTreeSet<_>>());
    let options = InstallOptions {
        force: opts.force,
        selective,
        dry_run: opts.dry_run,
    };

    match installer.install(&options)? {
        InstallOutcome::UpToDate { version } => {
            info!("already up to date at {version}, nothing to install");
            Ok(1)
        }
        InstallOutcome::Installed {
            version,
            summary,
            dry_run,
        } => {
            for result in &summary.results {
                match (&result.outcome, &result.detail) {
                    (Outcome::Failed, Some(detail)) => {
                        warn!("{} {}/{}: {detail}", result.outcome, result.category, result.filename)
                    }
                    _ => info!("{} {}/{}", result.outcome, result.category, result.filename),
                }
            }

            info!(
                "{}: {}/{} components updated, {} stale agents removed, {} preserved",
                if dry_run { "dry run" } else { "update complete" },
                summary.success_count,
                summary.total_count,
                summary.deleted_count,
                summary.preserved_count,
            );

            if summary.is_full_success() {
                info!("installation now at version {version}");
                Ok(0)
            } else {
                warn!(
                    "{} components failed to update",
                    summary.total_count - summary.success_count
                );
                Ok(2)
            }
        }
    }
}

fn run_silent_check(
    server_url: &str,
    install_dir: PathBuf,
    opts: SilentCheckOptions,
) -> Result<i32> {
    let source = HttpSource::new(server_url, CHECK_TIMEOUT)?;
    let installer = Installer::new(&source, install_dir);

    if let Some(notice) = installer.silent_check() {
        if opts.json {
            println!("{}", serde_json::to_string(&notice)?);
        } else {
            println!(
                "Cadenza update available: {} -> {} \"{}\"",
                notice.current_version, notice.server_version, notice.release_name
            );
            println!("Run `cadenza install` to update.");
        }
    }

    // Session start must never be blocked, whatever happened above.
    Ok(0)
}

fn load_settings() -> Result<Settings> {
    let path = match settings_file() {
        Ok(path) => path,
        Err(error) => {
            warn!("{error}; using default settings");
            return Ok(Settings::default());
        }
    };

    let data = match fs::read_to_string(&path) {
        Ok(data) => data,
        Err(_) => return Ok(Settings::default()),
    };

    data.parse()
        .with_context(|| format!("malformed settings file at {}", path.display()))
}
