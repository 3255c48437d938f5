// src/release.rs

//! Version information: the installed application's `VERSION` file and the
//! latest published release.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use chrono::DateTime;
use reqwest::Client;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::config::ReleaseSection;
use crate::errors::{OpsError, Result};

pub const VERSION_FILE_NAME: &str = "VERSION";

/// Describe the installed version from `<root>/VERSION`.
///
/// The file holds the version on its first line and the release date on the
/// second. A missing file is not an error.
pub fn local_version(root: &Path, project: &str) -> Result<String> {
    let path = root.join(VERSION_FILE_NAME);
    if !path.is_file() {
        return Ok(format!("Could not read {project}'s `{VERSION_FILE_NAME}` file"));
    }

    let contents =
        fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let mut lines = contents.lines().map(str::trim);
    let version = lines.next().unwrap_or_default();
    Ok(match lines.next().filter(|l| !l.is_empty()) {
        Some(date) => format!("{project} {version} ({date})"),
        None => format!("{project} {version}"),
    })
}

/// Latest published release, ready for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatestRelease {
    /// `<repo> <tag> (DD Month YYYY)`, or `<repo> (published at: <raw>)`
    /// when the publication date is not RFC 3339.
    pub summary: String,
    pub html_url: String,
}

#[derive(Debug, Deserialize)]
struct ReleasePayload {
    tag_name: Option<String>,
    published_at: Option<String>,
    html_url: Option<String>,
}

/// Client for the code-hosting release API.
pub struct ReleaseClient {
    client: Client,
    api_base: String,
    owner: String,
    repository: String,
}

impl ReleaseClient {
    pub fn new(section: &ReleaseSection) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            api_base: section.api_base.trim_end_matches('/').to_string(),
            owner: section.owner.clone(),
            repository: section.repository.clone(),
        })
    }

    pub async fn latest(&self) -> Result<LatestRelease> {
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base, self.owner, self.repository
        );
        debug!(%url, "fetching latest release");

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("ghostctl/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OpsError::Release(format!(
                "unexpected HTTP status: {}",
                status.as_u16()
            )));
        }

        let body = response.text().await?;
        let payload: ReleasePayload = serde_json::from_str(&body)?;
        summarize(&self.repository, payload)
    }
}

fn summarize(repository: &str, payload: ReleasePayload) -> Result<LatestRelease> {
    let published_at = payload
        .published_at
        .ok_or_else(|| OpsError::Release("missing 'published_at' in response".to_string()))?;

    let summary = match DateTime::parse_from_rfc3339(&published_at) {
        Ok(date) => {
            let tag = payload
                .tag_name
                .ok_or_else(|| OpsError::Release("missing 'tag_name' in response".to_string()))?;
            format!("{repository} {tag} ({})", date.format("%d %B %Y"))
        }
        Err(e) => {
            debug!(error = %e, raw = %published_at, "publication date is not RFC 3339");
            format!("{repository} (published at: {published_at})")
        }
    };

    let html_url = payload
        .html_url
        .ok_or_else(|| OpsError::Release("missing 'html_url' in response".to_string()))?;

    Ok(LatestRelease { summary, html_url })
}
