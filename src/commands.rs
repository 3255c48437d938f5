// src/commands.rs

//! Command handlers: resolve settings, build the components a command needs,
//! run it and render the result for the operator.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::backup::BackupCoordinator;
use crate::backup::upgrade::DatabaseUpgrade;
use crate::cli::{BackupArgs, CliArgs, Command, ConfigAction};
use crate::config::{self, ToolConfig};
use crate::deploy::Orchestrator;
use crate::env::EnvStore;
use crate::errors::{OpsError, Result};
use crate::exec::{CommandRunner, Compose, SystemRunner};
use crate::health::{HealthReporter, HttpStatusProbe};
use crate::readiness::TokioClock;
use crate::release::{ReleaseClient, local_version};
use crate::types::{Mode, Settings};
use crate::units::{DockerObserver, UnitObserver, fetch_logs};

/// Entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = resolve_settings(args.root.as_deref(), args.dev)?;
    let config = config::load_or_default(&settings.root)?;
    let runner = SystemRunner::new(&settings.root);
    debug!(root = ?settings.root, mode = %settings.mode, "settings resolved");

    match args.command {
        Command::Version => {
            println!("ghostctl {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Update => update(&settings, &config).await,
        Command::Config { action } => configure(&settings, action),
        Command::Logs { container, lines } => {
            let observer = DockerObserver::new(&runner, &config.deployment);
            logs(&observer, &config.deployment.project, &container, lines).await
        }
        Command::Running => {
            let observer = DockerObserver::new(&runner, &config.deployment);
            running(&observer).await
        }
        Command::Health => health(&runner, &settings, &config).await,
        other => with_compose(&runner, &settings, &config, other).await,
    }
}

/// Installation root: explicit flag (or `GHOSTCTL_ROOT`), else the
/// directory holding the running executable.
pub fn resolve_settings(root: Option<&Path>, dev: bool) -> Result<Settings> {
    let root = match root {
        Some(root) => root.to_path_buf(),
        None => exe_dir()?,
    };
    if !root.is_dir() {
        return Err(OpsError::Precondition(format!(
            "installation directory {} does not exist",
            root.display()
        )));
    }
    Ok(Settings {
        root,
        mode: Mode::from_dev_flag(dev),
    })
}

fn exe_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("locating the ghostctl executable")?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        OpsError::Precondition(format!("{} has no parent directory", exe.display()))
    })
}

/// Commands that drive the compose tool.
async fn with_compose(
    runner: &dyn CommandRunner,
    settings: &Settings,
    config: &ToolConfig,
    command: Command,
) -> Result<()> {
    let compose = Compose::detect(runner, settings, &config.deployment).await?;
    let mut env = EnvStore::open(&settings.root)?;
    let observer = DockerObserver::new(runner, &config.deployment);
    let clock = TokioClock;
    let orchestrator = Orchestrator::new(runner, &compose, &observer, &clock, config);
    let backups = BackupCoordinator::new(runner, &compose, &config.deployment, &settings.root);

    if let Some(prompt) = confirmation_prompt(&command, settings.mode) {
        if !confirm(&prompt)? {
            println!("[-] Cancelled");
            return Ok(());
        }
    }
    if applies_mode_preset(&command) {
        env.apply_mode(settings.mode)?;
    }

    match command {
        Command::Install => {
            println!("[+] Starting {} environment installation", settings.mode);
            orchestrator.install(&env).await
        }
        Command::Build { skip_seed } => orchestrator.upgrade(skip_seed).await,
        Command::Start => orchestrator.start().await,
        Command::Stop => orchestrator.stop().await,
        Command::Restart => orchestrator.restart().await,
        Command::Up => orchestrator.up().await,
        Command::Down { volumes } => orchestrator.down(volumes).await,
        Command::Uninstall { .. } => orchestrator.uninstall().await,
        Command::Backup(BackupArgs { list, download }) => {
            if list {
                backups.list().await
            } else if download {
                backups.download().await.map(|_| ())
            } else {
                backups.backup().await.map(|_| ())
            }
        }
        Command::Restore { dump, media, .. } => backups.restore(&dump, media.as_deref()).await,
        Command::PgUpgrade { .. } => {
            DatabaseUpgrade::new(runner, &compose, &config.deployment, &clock, settings.mode)
                .run()
                .await
                .map(|_| ())
        }
        Command::TagCleanup { yes } => {
            orchestrator.deduplicate_tags().await?;
            if yes || confirm("Do you want to also remove orphaned tags?")? {
                orchestrator.remove_orphaned_tags().await
            } else {
                Ok(())
            }
        }
        Command::MigrateTotp { .. } => orchestrator.migrate_totp().await,
        Command::Test => orchestrator.run_tests(&mut env).await,
        Command::Version
        | Command::Update
        | Command::Config { .. }
        | Command::Logs { .. }
        | Command::Running
        | Command::Health => Err(OpsError::Precondition(
            "command does not use the compose tool".to_string(),
        )),
    }
}

/// Whether `command` rewrites the mode-dependent `.env` keys before running.
///
/// `stop` and `down` leave the file alone; the test suite sets its own
/// overrides.
pub fn applies_mode_preset(command: &Command) -> bool {
    matches!(
        command,
        Command::Install
            | Command::Build { .. }
            | Command::Start
            | Command::Restart
            | Command::Up
            | Command::Uninstall { .. }
            | Command::Backup(_)
            | Command::Restore { .. }
            | Command::PgUpgrade { .. }
            | Command::TagCleanup { .. }
            | Command::MigrateTotp { .. }
    )
}

/// Prompt for destructive commands, unless `--yes` was given.
pub fn confirmation_prompt(command: &Command, mode: Mode) -> Option<String> {
    match command {
        Command::Uninstall { yes: false } => Some(format!(
            "This removes every {mode} container, image and volume, including all data. Continue?"
        )),
        Command::Restore {
            dump,
            media,
            yes: false,
        } => Some(match media {
            Some(media) => format!(
                "This replaces the current database with `{dump}` and the media files with `{media}`. Continue?"
            ),
            None => format!("This replaces the current database with `{dump}`. Continue?"),
        }),
        Command::PgUpgrade { yes: false } => Some(
            "This rewrites the database volume; it is highly recommended that you make a backup first. Continue?"
                .to_string(),
        ),
        Command::MigrateTotp { yes: false } => Some(
            "This stops the containers and migrates TOTP secrets and migration codes from 1.x to 2.x. Continue?"
                .to_string(),
        ),
        _ => None,
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    let answer = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .context("reading confirmation")?;
    Ok(answer)
}

fn configure(settings: &Settings, action: Option<ConfigAction>) -> Result<()> {
    let mut env = EnvStore::open(&settings.root)?;

    match action {
        None => {
            println!("[+] Current configuration and available variables:");
            print_config(&env.all());
        }
        Some(ConfigAction::Get { keys }) => print_config(&env.get_many(keys.as_slice())?),
        Some(ConfigAction::Set { key, value }) => {
            env.set(&key, &value)?;
            println!("[+] Successfully updated configuration with {}", key.to_uppercase());
            println!("[+] You must rebuild the containers for the change to take effect");
        }
        Some(ConfigAction::AllowHost { host }) => {
            if env.allow_host(&host)? {
                println!("[+] Added `{host}` to the allowed hosts");
            } else {
                println!("[+] `{host}` is already an allowed host");
            }
        }
        Some(ConfigAction::DisallowHost { host }) => {
            let removed = env.disallow_host(&host)?;
            if removed > 0 {
                println!("[+] Removed `{host}` from the allowed hosts");
            } else {
                println!("[+] `{host}` was not an allowed host");
            }
        }
        Some(ConfigAction::TrustOrigin { origin }) => {
            if env.trust_origin(&origin)? {
                println!("[+] Added `{origin}` to the trusted origins");
            } else {
                println!("[+] `{origin}` is already a trusted origin");
            }
        }
        Some(ConfigAction::DistrustOrigin { origin }) => {
            let removed = env.distrust_origin(&origin)?;
            if removed > 0 {
                println!("[+] Removed `{origin}` from the trusted origins");
            } else {
                println!("[+] `{origin}` was not a trusted origin");
            }
        }
    }
    Ok(())
}

fn print_config(entries: &[crate::env::ConfigEntry]) {
    let rows = entries
        .iter()
        .map(|e| {
            let value = if e.value.is_empty() { "-" } else { e.value.as_str() };
            vec![e.key.clone(), value.to_string()]
        })
        .collect::<Vec<_>>();
    print!("{}", render_table(&["Setting", "Value"], &rows));
}

async fn logs(
    observer: &dyn UnitObserver,
    project: &str,
    target: &str,
    lines: usize,
) -> Result<()> {
    for entry in fetch_logs(observer, project, target, lines).await? {
        print!("{entry}");
        if !entry.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

async fn running(observer: &dyn UnitObserver) -> Result<()> {
    let units = observer.running_units().await?;
    if units.is_empty() {
        println!("[-] No containers are running");
        return Ok(());
    }

    println!("[+] Found {} running containers:", units.len());
    let rows = units
        .iter()
        .map(|u| {
            vec![
                u.name.clone(),
                u.id.chars().take(12).collect(),
                u.image.clone(),
                u.status.clone(),
                u.ports.clone(),
            ]
        })
        .collect::<Vec<_>>();
    print!(
        "{}",
        render_table(&["Name", "Container ID", "Image", "Status", "Ports"], &rows)
    );
    Ok(())
}

async fn health(
    runner: &dyn CommandRunner,
    settings: &Settings,
    config: &ToolConfig,
) -> Result<()> {
    let observer = DockerObserver::new(runner, &config.deployment);
    let probe = HttpStatusProbe::new(settings.mode.status_url())?;
    let required = config.deployment.required_images(settings.mode);
    let reporter = HealthReporter::new(&observer, &probe, required);

    println!("[+] Checking the {} environment...", settings.mode);
    let issues = reporter.check().await?;
    if issues.is_empty() {
        println!("[+] All containers and services are healthy");
        return Ok(());
    }

    println!("[-] Found {} issue(s):", issues.len());
    let rows = issues
        .iter()
        .map(|i| vec![i.kind.to_string(), i.subject.clone(), i.message.clone()])
        .collect::<Vec<_>>();
    print!("{}", render_table(&["Type", "Subject", "Message"], &rows));
    Ok(())
}

async fn update(settings: &Settings, config: &ToolConfig) -> Result<()> {
    println!("[+] Fetching latest version information:");
    let local = local_version(&settings.root, &config.release.repository)?;
    let client = ReleaseClient::new(&config.release)?;
    let latest = client.latest().await?;

    let rows = vec![
        vec!["Local Version".to_string(), local],
        vec!["Latest Release".to_string(), latest.summary],
        vec!["Latest Release URL".to_string(), latest.html_url],
    ];
    print!("{}", render_table(&["", ""], &rows));
    Ok(())
}

/// Left-aligned columns separated by two spaces, with a dashed rule under
/// the header. A header of empty strings is omitted.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(idx) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    if headers.iter().any(|h| !h.is_empty()) {
        push_row(&mut out, headers, &widths);
        let rules = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
        push_row(&mut out, &rules, &widths);
    }
    for row in rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{:<width$}", cell.as_ref()))
        .collect::<Vec<_>>()
        .join("  ");
    out.push(' ');
    out.push_str(line.trim_end());
    out.push('\n');
}
