// src/config/model.rs

use serde::Deserialize;

use crate::types::Mode;

/// Tool configuration as read from `ghostctl.toml` in the installation root.
///
/// Every section is optional; an absent file behaves like an empty one.
///
/// ```toml
/// [deployment]
/// app_service = "django"
/// media_path = "/app/ghostwriter/media"
///
/// [readiness]
/// max_iterations = 120
///
/// [release]
/// owner = "GhostManager"
/// repository = "Ghostwriter"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawToolConfig {
    #[serde(default)]
    pub deployment: DeploymentLayout,

    #[serde(default)]
    pub readiness: ReadinessSection,

    #[serde(default)]
    pub release: ReleaseSection,
}

/// Validated tool configuration. Construct via `TryFrom<RawToolConfig>`.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub deployment: DeploymentLayout,
    pub readiness: ReadinessSection,
    pub release: ReleaseSection,
}

impl ToolConfig {
    pub(crate) fn new_unchecked(raw: RawToolConfig) -> Self {
        Self {
            deployment: raw.deployment,
            readiness: raw.readiness,
            release: raw.release,
        }
    }
}

/// `[deployment]` section: names of services, units, images and paths of the
/// deployed application.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeploymentLayout {
    /// Project prefix of unit labels (`<project>_<service>`).
    pub project: String,
    /// Compose service running the web application.
    pub app_service: String,
    /// Compose service running the database (owns the backup volume).
    pub db_service: String,
    /// Compose service serving API metadata; restarted after install.
    pub metadata_service: String,
    /// `name` label of the application unit.
    pub app_unit: String,
    /// `name` label of the database unit.
    pub db_unit: String,
    /// Live media directory inside the application unit.
    pub media_path: String,
    /// Backup volume mount point inside the database unit.
    pub backup_path: String,
    /// Data directory inside the database unit.
    pub db_data_path: String,
    /// Image repository the database server runs from; tagged with the
    /// major version when an older server is started for an upgrade.
    pub db_image: String,
    /// Compose volume keys holding the database data, per mode.
    pub production_data_volume: String,
    pub development_data_volume: String,
    pub production_descriptor: String,
    pub development_descriptor: String,
    pub production_images: Vec<String>,
    pub development_images: Vec<String>,
}

impl Default for DeploymentLayout {
    fn default() -> Self {
        let images = |flavor: &str, services: &[&str]| {
            services
                .iter()
                .map(|svc| format!("ghostwriter_{flavor}_{svc}"))
                .collect::<Vec<_>>()
        };

        Self {
            project: "ghostwriter".to_string(),
            app_service: "django".to_string(),
            db_service: "postgres".to_string(),
            metadata_service: "graphql_engine".to_string(),
            app_unit: "ghostwriter_django".to_string(),
            db_unit: "ghostwriter_postgres".to_string(),
            media_path: "/app/ghostwriter/media".to_string(),
            backup_path: "/backups".to_string(),
            db_data_path: "/var/lib/postgresql/data/".to_string(),
            db_image: "postgres".to_string(),
            production_data_volume: "production_postgres_data".to_string(),
            development_data_volume: "local_postgres_data".to_string(),
            production_descriptor: "production.yml".to_string(),
            development_descriptor: "local.yml".to_string(),
            production_images: images(
                "production",
                &["django", "nginx", "redis", "postgres", "graphql", "queue"],
            ),
            development_images: images(
                "local",
                &["django", "redis", "postgres", "graphql", "queue"],
            ),
        }
    }
}

impl DeploymentLayout {
    pub fn descriptor(&self, mode: Mode) -> &str {
        match mode {
            Mode::Development => &self.development_descriptor,
            Mode::Production => &self.production_descriptor,
        }
    }

    /// Compose volume key of the database data for `mode`.
    pub fn data_volume(&self, mode: Mode) -> &str {
        match mode {
            Mode::Development => &self.development_data_volume,
            Mode::Production => &self.production_data_volume,
        }
    }

    /// Images that must be running for `mode` to be healthy.
    pub fn required_images(&self, mode: Mode) -> &[String] {
        match mode {
            Mode::Development => &self.development_images,
            Mode::Production => &self.production_images,
        }
    }

    /// Whether `image` belongs to either deployment profile.
    pub fn is_known_image(&self, image: &str) -> bool {
        self.production_images.iter().any(|i| i == image)
            || self.development_images.iter().any(|i| i == image)
    }

    /// Name of the directory the live media tree lands in when copied out.
    pub fn media_dir_name(&self) -> &str {
        self.media_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("media")
    }

    /// Parent of the live media directory inside the application unit.
    pub fn media_parent(&self) -> String {
        let trimmed = self.media_path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => format!("{}/", &trimmed[..idx]),
        }
    }

    /// Name of the directory the backup volume lands in when copied out.
    pub fn backup_dir_name(&self) -> &str {
        self.backup_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("backups")
    }
}

/// `[readiness]` section: how the installer decides the application finished
/// starting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadinessSection {
    pub success_marker: String,
    pub failure_marker: String,
    pub max_iterations: u32,
    pub interval_ms: u64,
    pub app_tail: usize,
    pub dependency_tail: usize,
    pub remediation_url: String,
}

impl Default for ReadinessSection {
    fn default() -> Self {
        Self {
            success_marker: "Application startup complete".to_string(),
            failure_marker: "Password does not match for user".to_string(),
            max_iterations: 120,
            interval_ms: 1000,
            app_tail: 500,
            dependency_tail: 100,
            remediation_url: "https://www.ghostwriter.wiki/getting-help/faq#ghostwriter-cli-reports-an-issue-with-postgresql".to_string(),
        }
    }
}

/// `[release]` section: where release metadata is looked up.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReleaseSection {
    pub api_base: String,
    pub owner: String,
    pub repository: String,
}

impl Default for ReleaseSection {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            owner: "GhostManager".to_string(),
            repository: "Ghostwriter".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_paths_split_into_parent_and_name() {
        let layout = DeploymentLayout::default();
        assert_eq!(layout.media_dir_name(), "media");
        assert_eq!(layout.media_parent(), "/app/ghostwriter/");
        assert_eq!(layout.backup_dir_name(), "backups");
    }

    #[test]
    fn default_image_sets_differ_per_mode() {
        let layout = DeploymentLayout::default();
        assert_eq!(layout.required_images(Mode::Production).len(), 6);
        assert_eq!(layout.required_images(Mode::Development).len(), 5);
        assert!(layout.is_known_image("ghostwriter_local_queue"));
        assert!(!layout.is_known_image("postgres:16"));
        assert_eq!(layout.descriptor(Mode::Development), "local.yml");
        assert_eq!(layout.data_volume(Mode::Production), "production_postgres_data");
        assert_eq!(layout.data_volume(Mode::Development), "local_postgres_data");
    }
}
