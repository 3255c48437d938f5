// src/config/mod.rs

//! Tool configuration for ghostctl.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load `ghostctl.toml` from the installation root (`loader.rs`).
//! - Validate names, paths and readiness bounds (`validate.rs`).
//!
//! This is distinct from the deployed services' `.env` file, which lives in
//! [`crate::env`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_or_default};
pub use model::{DeploymentLayout, RawToolConfig, ReadinessSection, ReleaseSection, ToolConfig};
pub use validate::validate_config;
