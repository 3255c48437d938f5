// src/backup/upgrade.rs

//! Major-version upgrade of the database data volume.
//!
//! A newer server cannot read data written by an older major version. The
//! data is dumped through a temporary server of the old version running on
//! the existing volume, the volume is recreated by the new server and the
//! dump is restored into it.

use std::time::Duration;

use serde_yaml::Value;
use tracing::{info, warn};

use crate::config::DeploymentLayout;
use crate::errors::{OpsError, Result};
use crate::exec::{CommandRunner, Compose};
use crate::readiness::Clock;
use crate::types::Mode;

const ENGINE: &str = "docker";

/// Name of the temporary old-version server.
pub const UPGRADE_UNIT: &str = "ghostwriter_postgres_upgrade";

/// Dump file written to, and restored from, the backups volume.
pub const UPGRADE_DUMP: &str = "_ghostwriter_postgres_upgrade.sql.gz";

const SERVER_START_GRACE: Duration = Duration::from_secs(10);
const VOLUME_RELEASE_GRACE: Duration = Duration::from_secs(2);

/// Dump the old server's database into the backups volume. Runs inside the
/// database service, which provides the credentials and backup path.
const DUMP_SCRIPT: &str = concat!(
    "source /usr/local/bin/_sourced/constants.sh; ",
    "PGPASSWORD=\"${POSTGRES_PASSWORD}\" pg_dump -h ghostwriter_postgres_upgrade ",
    "-U \"${POSTGRES_USER}\" \"${POSTGRES_DB}\" ",
    "| gzip > \"${BACKUP_DIR_PATH}/_ghostwriter_postgres_upgrade.sql.gz\""
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// Server and data already share a major version.
    UpToDate(u32),
    Upgraded { from: u32, to: u32 },
}

pub struct DatabaseUpgrade<'a> {
    runner: &'a dyn CommandRunner,
    compose: &'a Compose,
    layout: &'a DeploymentLayout,
    clock: &'a dyn Clock,
    mode: Mode,
}

impl<'a> DatabaseUpgrade<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        compose: &'a Compose,
        layout: &'a DeploymentLayout,
        clock: &'a dyn Clock,
        mode: Mode,
    ) -> Self {
        Self {
            runner,
            compose,
            layout,
            clock,
            mode,
        }
    }

    pub async fn run(&self) -> Result<UpgradeOutcome> {
        let db = self.layout.db_service.as_str();

        self.compose.run(self.runner, &["down"]).await?;

        let config = self.compose.capture(self.runner, &["config"]).await?;
        let (volume, network) =
            volume_and_network(&config.stdout, self.layout.data_volume(self.mode))?;
        info!(%volume, %network, "resolved database volume");

        println!("[+] Building the {db} container");
        self.compose.run(self.runner, &["build", db]).await?;

        println!("[+] Getting versions");
        let server = self.server_version().await?;
        let data = self.data_version().await?;
        if server == data {
            println!("[+] No database upgrade needed (version {server})");
            return Ok(UpgradeOutcome::UpToDate(server));
        }
        println!("[+] Upgrading database data from {data} to {server}");

        println!("[+] Starting the old database server");
        let mount = format!("{volume}:{}", self.layout.db_data_path);
        let image = format!("{}:{data}", self.layout.db_image);
        self.engine(&[
            "run", "-d", "--rm", "--name", UPGRADE_UNIT, "--volume", &mount, "--network",
            &network, &image,
        ])
        .await?;
        self.clock.sleep(SERVER_START_GRACE).await;

        println!("[+] Backing up data");
        let dumped = self
            .compose
            .run(
                self.runner,
                &["run", "-T", "--rm", db, "bash", "-o", "pipefail", "-euc", DUMP_SCRIPT],
            )
            .await;
        if let Err(e) = dumped {
            println!("[+] Stopping the old database server");
            if let Err(stop) = self.engine(&["stop", UPGRADE_UNIT]).await {
                warn!(error = %stop, "could not stop the old database server");
            }
            return Err(e);
        }

        println!("[+] Stopping the old database server");
        self.engine(&["stop", UPGRADE_UNIT]).await?;
        self.clock.sleep(VOLUME_RELEASE_GRACE).await;

        println!("[+] Removing the old database volume");
        self.engine(&["volume", "rm", &volume]).await?;

        println!("[+] Starting the new {db} container");
        self.compose.run(self.runner, &["up", "-d", db]).await?;
        self.clock.sleep(SERVER_START_GRACE).await;

        println!("[+] Restoring data");
        self.compose
            .run(self.runner, &["run", "-T", "--rm", db, "restore", UPGRADE_DUMP])
            .await?;

        println!("[+] All done");
        Ok(UpgradeOutcome::Upgraded {
            from: data,
            to: server,
        })
    }

    /// Major version of the freshly built server.
    async fn server_version(&self) -> Result<u32> {
        let db = self.layout.db_service.as_str();
        let out = self
            .compose
            .capture(
                self.runner,
                &["run", "-T", "--rm", "--entrypoint", "postgres", db, "--version"],
            )
            .await?;
        major_version(&out.stdout).ok_or_else(|| unparsable("server", &out.stdout))
    }

    /// Major version the data directory was initialised with.
    async fn data_version(&self) -> Result<u32> {
        let db = self.layout.db_service.as_str();
        let marker = format!("{}/PG_VERSION", self.layout.db_data_path.trim_end_matches('/'));
        let out = self
            .compose
            .capture(
                self.runner,
                &["run", "-T", "--rm", "--entrypoint", "cat", db, &marker],
            )
            .await?;
        major_version(&out.stdout).ok_or_else(|| unparsable("data", &out.stdout))
    }

    async fn engine(&self, args: &[&str]) -> Result<()> {
        let args = args.iter().map(|a| a.to_string()).collect::<Vec<_>>();
        self.runner.run(ENGINE, &args).await
    }
}

fn unparsable(what: &str, output: &str) -> OpsError {
    OpsError::Precondition(format!(
        "could not read the database {what} version from {:?}",
        output.trim()
    ))
}

/// First number in `output`, up to its first dot.
///
/// `postgres (PostgreSQL) 16.4 (Debian 16.4-1)` -> 16, `13\n` -> 13.
pub fn major_version(output: &str) -> Option<u32> {
    output
        .split_whitespace()
        .find(|token| token.starts_with(|c: char| c.is_ascii_digit()))
        .and_then(|token| {
            let digits = token
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>();
            digits.parse().ok()
        })
}

/// Engine-level volume and network names from the rendered compose
/// configuration (`volumes.<key>.name`, `networks.default.name`).
pub fn volume_and_network(config: &str, volume_key: &str) -> Result<(String, String)> {
    let doc: Value = serde_yaml::from_str(config)?;
    let volume = lookup(&doc, &["volumes", volume_key, "name"])?;
    let network = lookup(&doc, &["networks", "default", "name"])?;
    Ok((volume, network))
}

fn lookup(doc: &Value, path: &[&str]) -> Result<String> {
    path.iter()
        .try_fold(doc, |node, key| node.get(*key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            OpsError::Precondition(format!(
                "the compose configuration has no `{}`",
                path.join(".")
            ))
        })
}
