// src/health.rs

//! Health reporting for a deployment.
//!
//! Container state is checked first. The application's status endpoint is
//! only probed when every required unit is running, since a missing unit
//! already explains whatever the endpoint would report.

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::{OpsError, Result};
use crate::exec::BoxFuture;
use crate::units::{Unit, UnitObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Container,
    Service,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::Container => f.write_str("Container"),
            IssueKind::Service => f.write_str("Service"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthIssue {
    pub kind: IssueKind,
    pub subject: String,
    pub message: String,
}

/// One issue per required image that has no running unit.
///
/// With nothing running at all a single `ALL` issue is returned instead.
pub fn container_issues(required: &[String], running: &[Unit]) -> Vec<HealthIssue> {
    if running.is_empty() {
        return vec![HealthIssue {
            kind: IssueKind::Container,
            subject: "ALL".to_string(),
            message: "No containers are running".to_string(),
        }];
    }

    required
        .iter()
        .filter(|image| !running.iter().any(|unit| &unit.image == *image))
        .map(|image| HealthIssue {
            kind: IssueKind::Container,
            subject: image_subject(image),
            message: "Container is not running".to_string(),
        })
        .collect()
}

/// `ghostwriter_production_django` -> `DJANGO`.
fn image_subject(image: &str) -> String {
    image
        .rsplit_once('_')
        .map_or(image, |(_, suffix)| suffix)
        .to_uppercase()
}

/// One issue per status entry that is not `"working"`.
pub fn service_issues(status: &Map<String, Value>) -> Vec<HealthIssue> {
    status
        .iter()
        .filter(|(_, value)| value.as_str() != Some("working"))
        .map(|(subsystem, value)| HealthIssue {
            kind: IssueKind::Service,
            subject: subsystem.clone(),
            message: match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
        .collect()
}

/// Source of the application's status document.
pub trait StatusProbe: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, Result<Map<String, Value>>>;
}

/// Probe that GETs the status endpoint over HTTP(S).
///
/// Self-signed certificates are accepted: the endpoint is on localhost and
/// production installs use generated certificates.
pub struct HttpStatusProbe {
    client: Client,
    url: String,
}

impl HttpStatusProbe {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(2))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn get(&self) -> Result<Map<String, Value>> {
        debug!(url = %self.url, "probing status endpoint");
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(OpsError::StatusEndpoint(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl StatusProbe for HttpStatusProbe {
    fn fetch(&self) -> BoxFuture<'_, Result<Map<String, Value>>> {
        Box::pin(self.get())
    }
}

pub struct HealthReporter<'a> {
    observer: &'a dyn UnitObserver,
    probe: &'a dyn StatusProbe,
    required: &'a [String],
}

impl<'a> HealthReporter<'a> {
    pub fn new(
        observer: &'a dyn UnitObserver,
        probe: &'a dyn StatusProbe,
        required: &'a [String],
    ) -> Self {
        Self {
            observer,
            probe,
            required,
        }
    }

    /// All current issues, sorted by subject.
    ///
    /// A non-200 status endpoint is an error, not an issue.
    pub async fn check(&self) -> Result<Vec<HealthIssue>> {
        let running = self.observer.running_units().await?;
        let mut issues = container_issues(self.required, &running);

        if issues.is_empty() {
            let status = self.probe.fetch().await?;
            issues = service_issues(&status);
        }

        issues.sort_by(|a, b| a.subject.cmp(&b.subject));
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subjects_are_uppercased_image_suffixes() {
        assert_eq!(image_subject("ghostwriter_production_django"), "DJANGO");
        assert_eq!(image_subject("nginx"), "NGINX");
    }

    #[test]
    fn working_entries_are_not_issues() {
        let status: Map<String, Value> = serde_json::from_str(
            r#"{"database":"working","cache":"Connection refused","queue":false}"#,
        )
        .unwrap();
        let issues = service_issues(&status);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.subject == "cache" && i.message == "Connection refused"));
        assert!(issues.iter().any(|i| i.subject == "queue" && i.message == "false"));
    }
}
