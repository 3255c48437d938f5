// src/backup/mod.rs

//! Database and media backups.
//!
//! A backup is a pair of artifacts in the database unit's backup volume: a
//! compressed dump written by the database unit itself, and a gzip-tar of the
//! application's media directory staged through the installation root.
//!
//! The local staging directory must not exist when an operation starts; it
//! is created, filled and removed within the operation. A failed step stops
//! the sequence and leaves staging files in place for inspection.

pub mod archive;
pub mod upgrade;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::DeploymentLayout;
use crate::errors::{OpsError, Result};
use crate::exec::{CommandRunner, Compose};

/// Prefix of media archive names produced by [`BackupCoordinator::backup`].
pub const MEDIA_ARCHIVE_PREFIX: &str = "media_backup_";

/// `media_backup_<YYYY_MM_DDTHH_MM_SS>.tar.gz` for the given UTC time.
pub fn media_archive_name(at: DateTime<Utc>) -> String {
    format!(
        "{MEDIA_ARCHIVE_PREFIX}{}.tar.gz",
        at.format("%Y_%m_%dT%H_%M_%S")
    )
}

pub struct BackupCoordinator<'a> {
    runner: &'a dyn CommandRunner,
    compose: &'a Compose,
    layout: &'a DeploymentLayout,
    root: &'a Path,
}

impl<'a> BackupCoordinator<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        compose: &'a Compose,
        layout: &'a DeploymentLayout,
        root: &'a Path,
    ) -> Self {
        Self {
            runner,
            compose,
            layout,
            root,
        }
    }

    /// Local directory media files are staged in.
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(self.layout.media_dir_name())
    }

    /// Dump the database and archive the media directory into the backup
    /// volume. Returns the media archive's file name.
    pub async fn backup(&self) -> Result<String> {
        self.backup_at(Utc::now()).await
    }

    /// [`BackupCoordinator::backup`] with an explicit timestamp.
    pub async fn backup_at(&self, at: DateTime<Utc>) -> Result<String> {
        let db = self.layout.db_service.as_str();

        println!(
            "[+] Backing up the database with {}...",
            self.compose.descriptor()
        );
        self.compose.run(self.runner, &["run", "--rm", db, "backup"]).await?;

        let staging = self.staging_dir();
        self.ensure_no_staging(&staging)?;

        println!("[+] Copying media files locally...");
        let media_src = format!("{}:{}", self.layout.app_service, self.layout.media_path);
        self.compose
            .run(self.runner, &["cp", "--archive", &media_src, "."])
            .await?;
        if !staging.is_dir() {
            return Err(OpsError::MissingArtifact(staging));
        }

        println!("[+] Compressing the media files...");
        let name = media_archive_name(at);
        let archive_path = self.root.join(&name);
        archive::create_archive(&staging, &archive_path)
            .with_context(|| format!("compressing {} into {name}", staging.display()))?;

        println!("[+] Copying the media archive to the backups volume...");
        let volume = format!("{db}:{}", self.layout.backup_path);
        self.compose
            .run(self.runner, &["cp", &name, &volume])
            .await?;

        println!("[+] Removing the local copies of the media files...");
        remove_staging(&staging, &archive_path)?;

        info!(archive = %name, "backup complete");
        println!("[+] Done!");
        Ok(name)
    }

    /// Print the artifacts already stored in the backup volume.
    pub async fn list(&self) -> Result<()> {
        let db = self.layout.db_service.as_str();
        self.compose
            .run(self.runner, &["run", "--rm", db, "backups"])
            .await
    }

    /// Copy the whole backup volume into the installation root.
    pub async fn download(&self) -> Result<PathBuf> {
        println!("[+] Copying backup files locally...");
        let volume = format!("{}:{}", self.layout.db_service, self.layout.backup_path);
        self.compose.run(self.runner, &["cp", &volume, "."]).await?;

        let local = self.root.join(self.layout.backup_dir_name());
        if !local.is_dir() {
            return Err(OpsError::MissingArtifact(local));
        }
        println!("[+] Backups copied to {}", local.display());
        Ok(local)
    }

    /// Restore the database from `dump`, and the media tree from `media`
    /// when given.
    pub async fn restore(&self, dump: &str, media: Option<&str>) -> Result<()> {
        let db = self.layout.db_service.as_str();
        let staging = self.staging_dir();

        if let Some(media) = media {
            if media.contains('/') || media.contains('\\') || media == ".." {
                return Err(OpsError::Precondition(format!(
                    "`{media}` must be the file name of an archive in the backups volume"
                )));
            }
            if !media.starts_with(MEDIA_ARCHIVE_PREFIX) {
                warn!(media, "media archive name lacks the usual prefix");
                println!(
                    "[!] `{media}` does not start with `{MEDIA_ARCHIVE_PREFIX}`; make sure it is a media archive"
                );
            }
            println!("[+] Checking for a pre-existing staging directory that might be overwritten");
            self.ensure_no_staging(&staging)?;
        }

        println!("[+] Restoring the database backup file {dump}...");
        self.compose
            .run(self.runner, &["run", "--rm", db, "restore", dump])
            .await?;

        let Some(media) = media else {
            println!("[+] No media archive given; only the database was restored");
            return Ok(());
        };

        println!("[+] Copying media backup, {media}, locally...");
        let remote = format!(
            "{db}:{}/{media}",
            self.layout.backup_path.trim_end_matches('/')
        );
        self.compose.run(self.runner, &["cp", &remote, "."]).await?;

        let archive_path = self.root.join(media);
        if !archive_path.is_file() {
            return Err(OpsError::MissingArtifact(archive_path));
        }

        archive::extract_archive(&archive_path, &staging)
            .with_context(|| format!("extracting {media}"))?;

        println!("[+] Copying media files to the application unit...");
        let local = format!("./{}", self.layout.media_dir_name());
        let dest = format!("{}:{}", self.layout.app_service, self.layout.media_parent());
        self.compose.run(self.runner, &["cp", &local, &dest]).await?;

        println!("[+] Removing the local copies of the media files...");
        remove_staging(&staging, &archive_path)?;

        info!(dump, media, "restore complete");
        println!("[+] Done!");
        Ok(())
    }

    fn ensure_no_staging(&self, staging: &Path) -> Result<()> {
        if staging.exists() {
            return Err(OpsError::StagingCollision(staging.to_path_buf()));
        }
        Ok(())
    }
}

fn remove_staging(dir: &Path, archive: &Path) -> Result<()> {
    fs::remove_dir_all(dir).with_context(|| format!("removing {}", dir.display()))?;
    fs::remove_file(archive).with_context(|| format!("removing {}", archive.display()))?;
    Ok(())
}
