// src/types.rs

use std::fmt;
use std::path::PathBuf;

/// Deployment profile selected by the global `--dev` flag.
///
/// The mode picks the compose descriptor, the set of images that must be
/// running, the status endpoint, and the configuration preset written to the
/// environment store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Development,
    Production,
}

impl Mode {
    pub fn from_dev_flag(dev: bool) -> Self {
        if dev {
            Mode::Development
        } else {
            Mode::Production
        }
    }

    /// Local URL of the application's `/status/` endpoint for this mode.
    pub fn status_url(self) -> &'static str {
        match self {
            Mode::Development => "http://localhost:8000/status/",
            Mode::Production => "https://localhost:443/status/",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Process-wide settings resolved once from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Installation root: holds the descriptors, `.env` and staging paths.
    pub root: PathBuf,
    pub mode: Mode,
}

/// Which compose front-end is available on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeFlavor {
    /// `docker compose ...` (the engine plugin).
    Plugin,
    /// `docker-compose ...` (the legacy standalone binary).
    Standalone,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_flag_selects_development() {
        assert_eq!(Mode::from_dev_flag(true), Mode::Development);
        assert_eq!(Mode::from_dev_flag(false), Mode::Production);
    }
}
