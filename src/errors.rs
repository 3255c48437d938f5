// src/errors.rs

//! Crate-wide error type.
//!
//! Every component returns [`OpsError`] instead of exiting the process; the
//! binary's `main` is the only place that turns an error into an exit code.

use std::path::PathBuf;

use thiserror::Error;

use crate::readiness::ReadinessFailure;

#[derive(Error, Debug)]
pub enum OpsError {
    #[error("`{0}` is not installed or not available in the current PATH")]
    MissingExecutable(String),

    #[error("{0}")]
    Precondition(String),

    #[error("`{}` {}", command_line(.program, .args), exit_label(.code))]
    CommandFailed {
        program: String,
        args: Vec<String>,
        code: Option<i32>,
    },

    #[error(
        "`{}` already exists in the installation directory. Please remove it and try again",
        .0.display()
    )]
    StagingCollision(PathBuf),

    #[error("expected `{}` to exist after copying, but it does not", .0.display())]
    MissingArtifact(PathBuf),

    #[error(transparent)]
    Readiness(#[from] ReadinessFailure),

    #[error("Config variable `{0}` not found")]
    UnknownKey(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(
        "Non-OK HTTP status suggests an issue with the application or proxy services (code {0})"
    )]
    StatusEndpoint(u16),

    #[error("Release lookup failed: {0}")]
    Release(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, OpsError>;
