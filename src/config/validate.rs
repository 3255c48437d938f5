// src/config/validate.rs

use crate::config::model::{DeploymentLayout, RawToolConfig, ReadinessSection, ToolConfig};
use crate::errors::{OpsError, Result};

impl TryFrom<RawToolConfig> for ToolConfig {
    type Error = OpsError;

    fn try_from(raw: RawToolConfig) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ToolConfig::new_unchecked(raw))
    }
}

pub fn validate_config(cfg: &RawToolConfig) -> Result<()> {
    validate_deployment(&cfg.deployment)?;
    validate_readiness(&cfg.readiness)?;
    ensure_non_empty("release.owner", &cfg.release.owner)?;
    ensure_non_empty("release.repository", &cfg.release.repository)?;
    Ok(())
}

fn validate_deployment(layout: &DeploymentLayout) -> Result<()> {
    for (field, value) in [
        ("deployment.project", &layout.project),
        ("deployment.app_service", &layout.app_service),
        ("deployment.db_service", &layout.db_service),
        ("deployment.metadata_service", &layout.metadata_service),
        ("deployment.app_unit", &layout.app_unit),
        ("deployment.db_unit", &layout.db_unit),
        ("deployment.production_descriptor", &layout.production_descriptor),
        ("deployment.development_descriptor", &layout.development_descriptor),
        ("deployment.db_image", &layout.db_image),
        ("deployment.production_data_volume", &layout.production_data_volume),
        ("deployment.development_data_volume", &layout.development_data_volume),
    ] {
        ensure_non_empty(field, value)?;
    }

    for (field, value) in [
        ("deployment.media_path", &layout.media_path),
        ("deployment.backup_path", &layout.backup_path),
        ("deployment.db_data_path", &layout.db_data_path),
    ] {
        if !value.starts_with('/') || value.trim_end_matches('/').is_empty() {
            return Err(OpsError::ConfigError(format!(
                "[{field}] must be an absolute path below the unit's root (got {value:?})"
            )));
        }
    }

    if layout.production_images.is_empty() || layout.development_images.is_empty() {
        return Err(OpsError::ConfigError(
            "[deployment] image lists must contain at least one image per mode".to_string(),
        ));
    }

    Ok(())
}

fn validate_readiness(readiness: &ReadinessSection) -> Result<()> {
    ensure_non_empty("readiness.success_marker", &readiness.success_marker)?;
    ensure_non_empty("readiness.failure_marker", &readiness.failure_marker)?;

    if readiness.max_iterations == 0 {
        return Err(OpsError::ConfigError(
            "[readiness].max_iterations must be >= 1 (got 0)".to_string(),
        ));
    }
    if readiness.app_tail == 0 || readiness.dependency_tail == 0 {
        return Err(OpsError::ConfigError(
            "[readiness] tail sizes must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn ensure_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(OpsError::ConfigError(format!("[{field}] must not be empty")));
    }
    Ok(())
}
