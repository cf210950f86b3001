//! Persisted registry configuration (`config.json` in the base directory).
//!
//! Loading never fails because of the file's content: keys missing from an
//! older file are backfilled from the defaults, values of the wrong JSON type
//! are reset, and an unreadable file is replaced by the defaults. The file is
//! rewritten whenever anything had to be repaired.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, map::Entry};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

pub const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_REPO: &str = "https://api.idapkg.com";
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Environment variable overriding the base directory.
pub const HOME_ENV: &str = "EXTPM_HOME";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PathConfig {
    pub packages: PathBuf,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Repository base identifiers, queried in this order.
    pub repos: Vec<String>,
    pub path: PathConfig,
    /// Installed packages that are not loaded.
    pub ignored_packages: Vec<String>,
    /// Program used to run install and uninstall scripts.
    pub interpreter: String,

    /// Keys this version does not know about; written back unchanged.
    #[serde(flatten)]
    extra: Map<String, Value>,

    #[serde(skip)]
    file: PathBuf,
}

/// `$EXTPM_HOME`, or `~/.extpm`.
#[tracing::instrument(skip(runtime))]
pub fn default_base_dir<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    if let Ok(home) = runtime.env_var(HOME_ENV)
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }
    let home_dir = runtime
        .home_dir()
        .context("Could not find home directory")?;
    Ok(home_dir.join(".extpm"))
}

impl RegistryConfig {
    pub fn defaults(base: &Path) -> Self {
        Self {
            repos: vec![DEFAULT_REPO.to_string()],
            path: PathConfig {
                packages: base.join("packages"),
                extra: Map::new(),
            },
            ignored_packages: Vec::new(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
            extra: Map::new(),
            file: base.join(CONFIG_FILE),
        }
    }

    /// Loads `<base>/config.json`, repairing or creating it as needed.
    #[tracing::instrument(skip(runtime))]
    pub fn load_or_init<R: Runtime>(runtime: &R, base: &Path) -> Result<Self> {
        let defaults = Self::defaults(base);
        let default_value =
            serde_json::to_value(&defaults).context("Failed to serialize default config")?;

        let (mut value, mut changed) = match Self::read_value(runtime, &defaults.file) {
            Some(value) if value.is_object() => (value, false),
            Some(_) => {
                warn!("Config {:?} is not a JSON object, resetting it", defaults.file);
                (default_value.clone(), true)
            }
            None => (default_value.clone(), true),
        };

        changed |= backfill(&mut value, &default_value, "");

        let mut config: Self = match serde_json::from_value(value) {
            Ok(config) => config,
            Err(e) => {
                warn!("Config {:?} is invalid ({}), resetting it", defaults.file, e);
                changed = true;
                defaults.clone()
            }
        };
        config.file = defaults.file;

        if changed {
            runtime.create_dir_all(base)?;
            config.save(runtime)?;
        }
        Ok(config)
    }

    fn read_value<R: Runtime>(runtime: &R, file: &Path) -> Option<Value> {
        if !runtime.exists(file) {
            info!("Creating config at {:?}", file);
            return None;
        }
        let content = match runtime.read_to_string(file) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read config {:?}: {:#}", file, e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Failed to parse config {:?}: {}", file, e);
                None
            }
        }
    }

    #[tracing::instrument(skip(self, runtime))]
    pub fn save<R: Runtime>(&self, runtime: &R) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        runtime
            .write(&self.file, json.as_bytes())
            .with_context(|| format!("Failed to save config to {:?}", self.file))?;
        debug!("Saved config to {:?}", self.file);
        Ok(())
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn packages_root(&self) -> &Path {
        &self.path.packages
    }

    pub fn is_ignored(&self, id: &str) -> bool {
        self.ignored_packages.iter().any(|p| p == id)
    }

    /// Adds `id` to the ignore list. Returns false if it was already there.
    pub fn disable(&mut self, id: &str) -> bool {
        if self.is_ignored(id) {
            return false;
        }
        self.ignored_packages.push(id.to_string());
        true
    }

    /// Removes `id` from the ignore list. Returns false if it was not there.
    pub fn enable(&mut self, id: &str) -> bool {
        let before = self.ignored_packages.len();
        self.ignored_packages.retain(|p| p != id);
        before != self.ignored_packages.len()
    }
}

/// Copies keys missing from `current` out of `defaults`, recursing into
/// objects. Returns true when anything changed.
fn backfill(current: &mut Value, defaults: &Value, prefix: &str) -> bool {
    let (Value::Object(current), Value::Object(defaults)) = (current, defaults) else {
        return false;
    };

    let mut changed = false;
    for (key, default) in defaults {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        match current.entry(key.clone()) {
            Entry::Vacant(slot) => {
                debug!("Config key {} is missing, using default", name);
                slot.insert(default.clone());
                changed = true;
            }
            Entry::Occupied(mut slot) => {
                let value = slot.get_mut();
                if std::mem::discriminant(value) != std::mem::discriminant(default) {
                    warn!("Config key {} has the wrong type, resetting to default", name);
                    *value = default.clone();
                    changed = true;
                } else {
                    changed |= backfill(value, default, &name);
                }
            }
        }
    }
    changed
}
