// src/exec/compose.rs

use tracing::{debug, info};

use crate::config::DeploymentLayout;
use crate::errors::{OpsError, Result};
use crate::exec::runner::{CapturedOutput, CommandRunner};
use crate::types::{ComposeFlavor, Settings};

const ENGINE: &str = "docker";
const STANDALONE: &str = "docker-compose";

/// A compose front-end bound to one deployment descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compose {
    flavor: ComposeFlavor,
    descriptor: String,
}

impl Compose {
    pub fn new(flavor: ComposeFlavor, descriptor: impl Into<String>) -> Self {
        Self {
            flavor,
            descriptor: descriptor.into(),
        }
    }

    /// Preflight: find a working compose front-end and check both descriptor
    /// files are present in the installation root.
    ///
    /// The engine must be installed and its daemon reachable. The plugin form
    /// (`docker compose`) is preferred over the standalone binary.
    pub async fn detect(
        runner: &dyn CommandRunner,
        settings: &Settings,
        layout: &DeploymentLayout,
    ) -> Result<Self> {
        if runner.locate(ENGINE).is_none() {
            return Err(OpsError::MissingExecutable(ENGINE.to_string()));
        }

        if let Err(e) = runner.capture(ENGINE, &[String::from("info")]).await {
            debug!(error = %e, "engine info failed");
            return Err(OpsError::Precondition(format!(
                "`{ENGINE}` is installed, but the daemon is not running"
            )));
        }

        let plugin_version = ["compose".to_string(), "version".to_string()];
        let flavor = match runner.capture(ENGINE, &plugin_version).await {
            Ok(_) => ComposeFlavor::Plugin,
            Err(e) => {
                debug!(error = %e, "compose plugin unavailable; trying standalone binary");
                if runner.locate(STANDALONE).is_some() {
                    ComposeFlavor::Standalone
                } else {
                    return Err(OpsError::Precondition(format!(
                        "neither `{ENGINE} compose` nor `{STANDALONE}` is available"
                    )));
                }
            }
        };

        for descriptor in [
            &layout.production_descriptor,
            &layout.development_descriptor,
        ] {
            if !settings.root.join(descriptor).is_file() {
                return Err(OpsError::Precondition(format!(
                    "`{descriptor}` is missing from {}; run ghostctl from the installation directory or pass --root",
                    settings.root.display()
                )));
            }
        }

        let compose = Compose::new(flavor, layout.descriptor(settings.mode));
        info!(flavor = ?compose.flavor, descriptor = %compose.descriptor, "compose tool resolved");
        Ok(compose)
    }

    /// Same front-end, different descriptor.
    pub fn with_descriptor(&self, descriptor: impl Into<String>) -> Self {
        Self::new(self.flavor, descriptor)
    }

    pub fn flavor(&self) -> ComposeFlavor {
        self.flavor
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Executable to spawn.
    pub fn program(&self) -> &'static str {
        match self.flavor {
            ComposeFlavor::Plugin => ENGINE,
            ComposeFlavor::Standalone => STANDALONE,
        }
    }

    /// Full argument vector for `action`.
    pub fn args(&self, action: &[&str]) -> Vec<String> {
        let mut args = Vec::with_capacity(action.len() + 3);
        if self.flavor == ComposeFlavor::Plugin {
            args.push("compose".to_string());
        }
        args.push("-f".to_string());
        args.push(self.descriptor.clone());
        args.extend(action.iter().map(|a| a.to_string()));
        args
    }

    /// Run `action`, streaming output.
    pub async fn run(&self, runner: &dyn CommandRunner, action: &[&str]) -> Result<()> {
        let args = self.args(action);
        runner.run(self.program(), &args).await
    }

    /// Run `action`, capturing output.
    pub async fn capture(
        &self,
        runner: &dyn CommandRunner,
        action: &[&str],
    ) -> Result<CapturedOutput> {
        let args = self.args(action);
        runner.capture(self.program(), &args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_invocations_go_through_the_engine() {
        let compose = Compose::new(ComposeFlavor::Plugin, "production.yml");
        assert_eq!(compose.program(), "docker");
        assert_eq!(
            compose.args(&["up", "-d"]),
            vec!["compose", "-f", "production.yml", "up", "-d"]
        );
    }

    #[test]
    fn standalone_invocations_use_the_binary() {
        let compose = Compose::new(ComposeFlavor::Standalone, "local.yml");
        assert_eq!(compose.program(), "docker-compose");
        assert_eq!(compose.args(&["down"]), vec!["-f", "local.yml", "down"]);
    }

    #[test]
    fn with_descriptor_keeps_the_flavor() {
        let compose = Compose::new(ComposeFlavor::Standalone, "production.yml");
        let dev = compose.with_descriptor("local.yml");
        assert_eq!(dev.flavor(), ComposeFlavor::Standalone);
        assert_eq!(dev.descriptor(), "local.yml");
    }
}
