// src/deploy.rs

//! Lifecycle sequencing on top of the compose tool.
//!
//! Every step is one compose invocation through the [`CommandRunner`]. A
//! failed build/up/down aborts the rest of the sequence; nothing is rolled
//! back. Superuser creation and the metadata restart during install only
//! warn, since re-running install against an initialized deployment is
//! expected to trip over them.

use tracing::{info, warn};

use crate::config::{DeploymentLayout, ToolConfig};
use crate::env::EnvStore;
use crate::env::defaults::{ACTION_SECRET, SETTINGS_MODULE, SUPERUSER_NAME, SUPERUSER_PASSWORD};
use crate::errors::Result;
use crate::exec::{CommandRunner, Compose};
use crate::readiness::{Clock, ReadinessPlan, wait_until_ready};
use crate::units::UnitObserver;

/// Environment values the application test suite expects.
const TEST_OVERRIDES: &[(&str, &str)] = &[
    (ACTION_SECRET, "changeme"),
    (SETTINGS_MODULE, "config.settings.local"),
];

pub struct Orchestrator<'a> {
    runner: &'a dyn CommandRunner,
    compose: &'a Compose,
    observer: &'a dyn UnitObserver,
    clock: &'a dyn Clock,
    layout: &'a DeploymentLayout,
    readiness: ReadinessPlan,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        compose: &'a Compose,
        observer: &'a dyn UnitObserver,
        clock: &'a dyn Clock,
        config: &'a ToolConfig,
    ) -> Self {
        Self {
            runner,
            compose,
            observer,
            clock,
            layout: &config.deployment,
            readiness: ReadinessPlan::from_config(&config.deployment, &config.readiness),
        }
    }

    async fn compose(&self, action: &[&str]) -> Result<()> {
        info!(descriptor = %self.compose.descriptor(), ?action, "compose");
        self.compose.run(self.runner, action).await
    }

    /// First-time setup: build, start, wait, seed, create the admin user,
    /// refresh the metadata service and print the admin credentials.
    pub async fn install(&self, env: &EnvStore) -> Result<()> {
        self.compose(&["build"]).await?;
        self.compose(&["up", "-d"]).await?;
        self.wait_ready().await?;

        println!("[+] Proceeding with database setup...");
        self.seed().await?;

        println!("[+] Proceeding with superuser creation...");
        let app = self.layout.app_service.as_str();
        if let Err(e) = self
            .compose(&[
                "run",
                "--rm",
                app,
                "python",
                "manage.py",
                "createsuperuser",
                "--noinput",
                "--role",
                "admin",
            ])
            .await
        {
            warn!(error = %e, "superuser creation failed");
            println!("[!] Could not create a superuser: {e}");
            println!(
                "[!] This is expected if `install` ran before or a superuser was created manually"
            );
        }

        let metadata = self.layout.metadata_service.as_str();
        if let Err(e) = self.compose(&["restart", metadata]).await {
            warn!(error = %e, service = metadata, "metadata service restart failed");
            println!("[-] Error trying to restart the `{metadata}` service: {e}");
        }

        println!("[+] Ghostwriter is ready to go!");
        println!(
            "[+] You can login as `{}` with this password: {}",
            env.get_string(SUPERUSER_NAME)?,
            env.get_string(SUPERUSER_PASSWORD)?
        );
        println!("[+] You can get your admin password by running: ghostctl config get admin_password");
        Ok(())
    }

    /// Rebuild an existing installation and optionally re-seed it.
    pub async fn upgrade(&self, skip_seed: bool) -> Result<()> {
        println!(
            "[+] Running `{}` commands to build containers with {}...",
            self.compose.program(),
            self.compose.descriptor()
        );
        self.compose(&["down"]).await?;
        self.compose(&["build"]).await?;
        self.compose(&["up", "-d"]).await?;

        if skip_seed {
            println!("[+] The `--skip-seed` flag was set, so skipped database seeding...");
        } else {
            self.wait_ready().await?;
            println!("[+] Re-seeding database in case initial values were added or adjusted...");
            self.seed().await?;
        }

        println!("[+] All containers have been built!");
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.compose(&["start"]).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.compose(&["stop"]).await
    }

    pub async fn restart(&self) -> Result<()> {
        self.compose(&["restart"]).await
    }

    pub async fn up(&self) -> Result<()> {
        self.compose(&["up", "-d"]).await
    }

    /// Bring units down; `volumes` also deletes persisted data.
    pub async fn down(&self, volumes: bool) -> Result<()> {
        if volumes {
            self.compose(&["down", "--volumes"]).await
        } else {
            self.compose(&["down"]).await
        }
    }

    /// Remove units, images, volumes and orphans. Irreversible.
    pub async fn uninstall(&self) -> Result<()> {
        self.compose(&["down", "--rmi", "all", "--volumes", "--remove-orphans"])
            .await?;
        println!("[+] Ghostwriter has been uninstalled");
        Ok(())
    }

    /// Run the application's test suite against the development descriptor.
    ///
    /// The action secret and settings module are overridden for the run and
    /// restored afterwards, whether or not the suite passed.
    pub async fn run_tests(&self, env: &mut EnvStore) -> Result<()> {
        let dev = self.compose.with_descriptor(&self.layout.development_descriptor);
        let saved = env.override_values(TEST_OVERRIDES)?;

        let app = self.layout.app_service.as_str();
        let outcome = dev
            .run(self.runner, &["run", "--rm", app, "python", "manage.py", "test"])
            .await;

        env.restore_values(saved)?;
        outcome
    }

    /// Merge duplicate tags, keeping the oldest of each.
    pub async fn deduplicate_tags(&self) -> Result<()> {
        println!("[+] Deduplicating tags...");
        self.manage(&["deduplicate_tags"]).await
    }

    /// Delete tags nothing refers to anymore.
    pub async fn remove_orphaned_tags(&self) -> Result<()> {
        println!("[+] Removing orphaned tags...");
        self.manage(&["remove_orphaned_tags"]).await
    }

    /// Move two-factor secrets and recovery codes from the 1.x schema to the
    /// 2.x one, then bring the units back up.
    pub async fn migrate_totp(&self) -> Result<()> {
        self.compose(&["down"]).await?;
        println!("[+] Migrating TOTP secrets and migration codes");
        self.manage(&["makemigrations"]).await?;
        self.manage(&["migrate"]).await?;
        self.manage(&["migrate_totp_device"]).await?;
        println!("[+] TOTP secrets and migration codes migration complete");
        self.compose(&["up", "-d"]).await
    }

    /// `python manage.py <args>` in a throwaway application unit.
    async fn manage(&self, args: &[&str]) -> Result<()> {
        let app = self.layout.app_service.as_str();
        let mut action = vec!["run", "--rm", app, "python", "manage.py"];
        action.extend_from_slice(args);
        self.compose(&action).await
    }

    async fn seed(&self) -> Result<()> {
        let app = self.layout.app_service.as_str();
        self.compose(&["run", "--rm", app, "/seed_data"]).await
    }

    async fn wait_ready(&self) -> Result<()> {
        println!("[+] Waiting for the application to finish starting...");
        let state = wait_until_ready(&self.readiness, self.observer, self.clock).await?;
        self.readiness.into_result(state)?;
        Ok(())
    }
}
