// src/env/mod.rs

//! Environment store: the `.env` file that configures the deployed services.
//!
//! The store is write-through. Every mutation is persisted before the call
//! returns, so the file on disk always matches the in-memory view.
//!
//! File format: one `KEY='value'` line per key (or `KEY=` when empty), keys
//! uppercased, lines sorted by key. Keys are lowercase in memory.

pub mod defaults;
pub mod list;
pub mod passwords;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use crate::errors::{OpsError, Result};
use crate::types::Mode;

pub use list::SpaceList;

/// File name of the environment file inside the installation root.
pub const ENV_FILE_NAME: &str = ".env";

/// A stored configuration value.
///
/// Boolean-looking strings are kept as booleans; everything else is text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    Bool(bool),
    Text(String),
}

impl EnvValue {
    pub fn text(value: &str) -> Self {
        EnvValue::Text(value.to_string())
    }

    /// Coerce a raw string: `true`/`false` (any case) become booleans.
    pub fn coerce(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "true" => EnvValue::Bool(true),
            "false" => EnvValue::Bool(false),
            _ => EnvValue::Text(raw.to_string()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EnvValue::Bool(b) => Some(*b),
            EnvValue::Text(_) => None,
        }
    }
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::Bool(b) => write!(f, "{b}"),
            EnvValue::Text(s) => f.write_str(s),
        }
    }
}

/// One `(key, value)` pair as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
}

/// Previous values captured by [`EnvStore::override_values`].
#[derive(Debug)]
pub struct SavedValues(Vec<(String, Option<EnvValue>)>);

#[derive(Debug, Clone)]
pub struct EnvStore {
    path: PathBuf,
    values: BTreeMap<String, EnvValue>,
}

impl EnvStore {
    /// Open `<root>/.env`, creating it if needed.
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_path(root.join(ENV_FILE_NAME))
    }

    /// Load-or-initialize the store at `path`.
    ///
    /// Defaults are applied first, then overwritten by whatever the file
    /// contains; the merged result is written back immediately.
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.exists() {
            info!(path = ?path, "environment file missing; creating it");
            fs::write(&path, "")
                .with_context(|| format!("creating environment file {path:?}"))?;
        }

        let mut values: BTreeMap<String, EnvValue> = defaults::default_values()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading environment file {path:?}"))?;
        let persisted = parse_env(&contents)?;
        debug!(path = ?path, keys = persisted.len(), "loaded persisted environment");
        values.extend(persisted);

        let store = Self { path, values };
        store.persist()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Result<&EnvValue> {
        let key = normalize_key(key);
        self.values.get(&key).ok_or(OpsError::UnknownKey(key))
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key).map(ToString::to_string)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).ok().and_then(EnvValue::as_bool)
    }

    /// Look up several keys; entries are returned sorted by key.
    pub fn get_many<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<ConfigEntry>> {
        let mut entries = keys
            .iter()
            .map(|key| {
                let key = normalize_key(key.as_ref());
                self.get(&key).map(|value| ConfigEntry {
                    key: key.to_uppercase(),
                    value: value.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Every entry, uppercase keys, sorted.
    pub fn all(&self) -> Vec<ConfigEntry> {
        self.values
            .iter()
            .map(|(key, value)| ConfigEntry {
                key: key.to_uppercase(),
                value: value.to_string(),
            })
            .collect()
    }

    /// Set `key`, coercing boolean-looking values, and persist.
    ///
    /// Keys and values that the file format cannot carry are rejected before
    /// anything is written.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        check_entry(key, value)?;
        self.insert(key, EnvValue::coerce(value));
        self.persist()
    }

    /// Apply the preset for `mode` and persist.
    pub fn apply_mode(&mut self, mode: Mode) -> Result<()> {
        debug!(%mode, "applying mode preset");
        for (key, value) in defaults::mode_preset(mode) {
            self.insert(key, value);
        }
        self.persist()
    }

    pub fn allow_host(&mut self, host: &str) -> Result<bool> {
        self.append_to_list(defaults::ALLOWED_HOSTS, host)
    }

    pub fn disallow_host(&mut self, host: &str) -> Result<usize> {
        self.remove_from_list(defaults::ALLOWED_HOSTS, host)
    }

    pub fn trust_origin(&mut self, origin: &str) -> Result<bool> {
        self.append_to_list(defaults::TRUSTED_ORIGINS, origin)
    }

    pub fn distrust_origin(&mut self, origin: &str) -> Result<usize> {
        self.remove_from_list(defaults::TRUSTED_ORIGINS, origin)
    }

    /// Temporarily replace some values, persisting the change.
    ///
    /// Hand the returned [`SavedValues`] to [`EnvStore::restore_values`] to
    /// put the previous state back.
    pub fn override_values(&mut self, overrides: &[(&str, &str)]) -> Result<SavedValues> {
        for (key, value) in overrides {
            check_entry(key, value)?;
        }
        let mut saved = Vec::with_capacity(overrides.len());
        for (key, value) in overrides {
            let key = normalize_key(key);
            saved.push((key.clone(), self.values.get(&key).cloned()));
            self.values.insert(key, EnvValue::coerce(value));
        }
        self.persist()?;
        Ok(SavedValues(saved))
    }

    pub fn restore_values(&mut self, saved: SavedValues) -> Result<()> {
        for (key, previous) in saved.0.into_iter().rev() {
            match previous {
                Some(value) => self.values.insert(key, value),
                None => self.values.remove(&key),
            };
        }
        self.persist()
    }

    /// Serialize to the on-disk format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.values {
            let value = value.to_string();
            if value.is_empty() {
                out.push_str(&format!("{}=\n", key.to_uppercase()));
            } else {
                out.push_str(&format!("{}='{}'\n", key.to_uppercase(), value));
            }
        }
        out
    }

    pub fn persist(&self) -> Result<()> {
        fs::write(&self.path, self.render())
            .with_context(|| format!("writing environment file {:?}", self.path))?;
        Ok(())
    }

    fn insert(&mut self, key: &str, value: EnvValue) {
        self.values.insert(normalize_key(key), value);
    }

    fn list(&self, key: &str) -> SpaceList {
        self.values
            .get(key)
            .map(|v| SpaceList::parse(&v.to_string()))
            .unwrap_or_default()
    }

    fn append_to_list(&mut self, key: &str, item: &str) -> Result<bool> {
        check_value(key, item)?;
        let mut list = self.list(key);
        let changed = list.insert(item);
        if changed {
            self.insert(key, EnvValue::Text(list.to_string()));
        } else {
            info!(key, item, "item is already in the list");
        }
        self.persist()?;
        Ok(changed)
    }

    fn remove_from_list(&mut self, key: &str, item: &str) -> Result<usize> {
        let mut list = self.list(key);
        let removed = list.remove(item);
        self.insert(key, EnvValue::Text(list.to_string()));
        self.persist()?;
        Ok(removed)
    }
}

/// Lowercase a key and resolve aliases.
pub fn normalize_key(key: &str) -> String {
    let key = key.trim().to_lowercase();
    defaults::ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, target)| target.to_string())
        .unwrap_or(key)
}

/// A key must survive the `KEY='value'` line format: non-empty, no `=`,
/// no whitespace and no leading `#`.
fn check_entry(key: &str, value: &str) -> Result<()> {
    let normalized = normalize_key(key);
    if normalized.is_empty()
        || normalized.starts_with('#')
        || normalized.contains('=')
        || normalized.contains(char::is_whitespace)
    {
        return Err(OpsError::Precondition(format!(
            "`{}` is not a valid configuration key; keys may not be empty or contain `=` or whitespace",
            key.escape_debug()
        )));
    }
    check_value(&normalized, value)
}

/// Values are stored one per line.
fn check_value(key: &str, value: &str) -> Result<()> {
    if value.contains(['\n', '\r']) {
        return Err(OpsError::Precondition(format!(
            "the value for `{}` may not contain line breaks",
            key.to_uppercase()
        )));
    }
    Ok(())
}

/// Parse the contents of an environment file.
///
/// Blank lines and `#` comments are skipped. Values may be wrapped in single
/// or double quotes.
pub fn parse_env(contents: &str) -> Result<BTreeMap<String, EnvValue>> {
    let mut values = BTreeMap::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let (key, raw) = line.split_once('=').ok_or_else(|| {
            OpsError::ConfigError(format!(
                "line {} of the environment file is not KEY=value: {line:?}",
                idx + 1
            ))
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(OpsError::ConfigError(format!(
                "line {} of the environment file has an empty key",
                idx + 1
            )));
        }

        values.insert(key.to_lowercase(), EnvValue::coerce(unquote(raw.trim())));
    }

    Ok(values)
}

fn unquote(raw: &str) -> &str {
    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}
