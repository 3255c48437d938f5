#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::Path;

use ghostctl::types::{Mode, Settings};
use ghostctl::units::Unit;
use tempfile::TempDir;

/// A temporary installation root with both compose descriptors present,
/// plus a separate directory backing the fake units' filesystems.
pub struct InstallRoot {
    root: TempDir,
    units: TempDir,
}

impl InstallRoot {
    pub fn new() -> io::Result<Self> {
        let root = tempfile::tempdir()?;
        fs::write(root.path().join("production.yml"), "services: {}\n")?;
        fs::write(root.path().join("local.yml"), "services: {}\n")?;
        Ok(Self {
            root,
            units: tempfile::tempdir()?,
        })
    }

    /// Root without descriptor files.
    pub fn bare() -> io::Result<Self> {
        Ok(Self {
            root: tempfile::tempdir()?,
            units: tempfile::tempdir()?,
        })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn units_dir(&self) -> &Path {
        self.units.path()
    }

    pub fn settings(&self, mode: Mode) -> Settings {
        Settings {
            root: self.root.path().to_path_buf(),
            mode,
        }
    }
}

/// A running unit with a `name` label.
pub fn unit(name: &str, image: &str) -> Unit {
    Unit {
        id: format!("{name}-id"),
        image: image.to_string(),
        status: "Up 5 minutes".to_string(),
        ports: String::new(),
        name: name.to_string(),
    }
}
