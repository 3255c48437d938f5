// src/units.rs

//! Snapshots of the running deployment units.
//!
//! Nothing here is cached: every query asks the engine again and hands the
//! caller a fresh `Vec<Unit>`.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::DeploymentLayout;
use crate::errors::Result;
use crate::exec::{BoxFuture, CommandRunner};

/// One running deployment unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub id: String,
    pub image: String,
    pub status: String,
    pub ports: String,
    /// Value of the unit's `name` label.
    pub name: String,
}

/// Source of unit state and unit logs.
///
/// [`DockerObserver`] asks the container engine; tests script both answers.
pub trait UnitObserver: Send + Sync {
    /// Units belonging to the deployment that are currently running.
    fn running_units(&self) -> BoxFuture<'_, Result<Vec<Unit>>>;

    /// The last `lines` lines of `unit`'s output (stdout and stderr).
    fn tail_logs<'a>(&'a self, unit: &'a Unit, lines: usize) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// Observer backed by the `docker` CLI.
pub struct DockerObserver<'a> {
    runner: &'a dyn CommandRunner,
    layout: &'a DeploymentLayout,
}

impl<'a> DockerObserver<'a> {
    pub fn new(runner: &'a dyn CommandRunner, layout: &'a DeploymentLayout) -> Self {
        Self { runner, layout }
    }

    async fn list(&self) -> Result<Vec<Unit>> {
        let args = vec![
            "ps".to_string(),
            "--no-trunc".to_string(),
            "--format".to_string(),
            "{{json .}}".to_string(),
        ];
        let out = self.runner.capture("docker", &args).await?;
        let units = parse_ps_lines(&out.stdout)?
            .into_iter()
            .filter(|unit| self.layout.is_known_image(&unit.image))
            .collect::<Vec<_>>();
        debug!(count = units.len(), "listed deployment units");
        Ok(units)
    }

    async fn logs(&self, unit: &Unit, lines: usize) -> Result<Vec<String>> {
        let args = vec![
            "logs".to_string(),
            "--tail".to_string(),
            lines.to_string(),
            unit.id.clone(),
        ];
        let out = self.runner.capture("docker", &args).await?;
        Ok(out.lines())
    }
}

impl UnitObserver for DockerObserver<'_> {
    fn running_units(&self) -> BoxFuture<'_, Result<Vec<Unit>>> {
        Box::pin(self.list())
    }

    fn tail_logs<'a>(&'a self, unit: &'a Unit, lines: usize) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(self.logs(unit, lines))
    }
}

#[derive(Debug, Deserialize)]
struct PsRecord {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Ports", default)]
    ports: String,
    #[serde(rename = "Labels", default)]
    labels: String,
    #[serde(rename = "Names", default)]
    names: String,
}

/// Parse the output of `docker ps --format '{{json .}}'` (one object per line).
pub fn parse_ps_lines(stdout: &str) -> Result<Vec<Unit>> {
    let mut units = Vec::new();
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let record: PsRecord = serde_json::from_str(line)?;
        let labels = parse_labels(&record.labels);
        let name = match labels.get("name") {
            Some(name) => name.to_string(),
            None => {
                warn!(id = %record.id, "unit has no `name` label; using its container name");
                record.names.clone()
            }
        };
        units.push(Unit {
            id: record.id,
            image: record.image,
            status: record.status,
            ports: record.ports,
            name,
        });
    }
    Ok(units)
}

/// `k1=v1,k2=v2` as printed by `docker ps`.
fn parse_labels(raw: &str) -> HashMap<&str, &str> {
    raw.split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}

/// Collect log output for the `logs` command.
///
/// `target` matches a unit whose `name` label equals it, equals
/// `<project>_<target>`, or every unit when it is `all`. Each matched unit
/// contributes a header entry followed by its output.
pub async fn fetch_logs(
    observer: &dyn UnitObserver,
    project: &str,
    target: &str,
    lines: usize,
) -> Result<Vec<String>> {
    let prefixed = format!("{project}_{target}");
    let mut entries = Vec::new();

    for unit in observer.running_units().await? {
        if target == "all" || unit.name == target || unit.name == prefixed {
            entries.push(format!("\n*** Logs for `{}` ***\n\n", unit.name));
            let output = observer.tail_logs(&unit, lines).await?;
            entries.push(output.join("\n"));
        }
    }

    if entries.is_empty() {
        entries.push(format!(
            "\n*** No logs found for requested container '{target}' ***\n"
        ));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PS_OUTPUT: &str = r#"{"Command":"\"/start\"","ID":"abc123","Image":"ghostwriter_production_django","Labels":"com.docker.compose.project=ghostwriter,name=ghostwriter_django","Names":"ghostwriter-django-1","Ports":"8000/tcp","Status":"Up 2 hours"}
{"ID":"def456","Image":"postgres:16","Labels":"","Names":"other-db","Ports":"","Status":"Up 1 day"}
"#;

    #[test]
    fn parses_ps_json_lines() -> Result<()> {
        let units = parse_ps_lines(PS_OUTPUT)?;
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].id, "abc123");
        assert_eq!(units[0].name, "ghostwriter_django");
        assert_eq!(units[0].status, "Up 2 hours");
        assert_eq!(units[1].name, "other-db");
        Ok(())
    }

    #[test]
    fn labels_without_values_are_skipped() {
        let labels = parse_labels("a=1,broken,name=x");
        assert_eq!(labels.get("a"), Some(&"1"));
        assert_eq!(labels.get("name"), Some(&"x"));
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(parse_ps_lines("not json").is_err());
    }
}
