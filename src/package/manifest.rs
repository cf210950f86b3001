use anyhow::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

use super::is_valid_package_id;
use super::version::{Version, VersionSpec};
use crate::error::PkgError;
use crate::runtime::Runtime;

/// File name of the manifest at the root of every package.
pub const MANIFEST_FILE: &str = "info.json";

/// Package manifest (`info.json`).
///
/// `dependencies` keeps the order of the JSON document; dependencies are
/// resolved in that order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Manifest {
    #[serde(alias = "_id")]
    pub id: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
    #[serde(default)]
    pub installers: Vec<String>,
    #[serde(default)]
    pub uninstallers: Vec<String>,
    #[serde(default)]
    pub restart_required: bool,
}

impl Manifest {
    /// Parses and validates manifest bytes. `origin` is only used in errors.
    pub fn from_slice(bytes: &[u8], origin: &Path) -> Result<Self, PkgError> {
        let manifest: Manifest =
            serde_json::from_slice(bytes).map_err(|e| corrupt(origin, e.to_string()))?;
        manifest.validate().map_err(|reason| corrupt(origin, reason))?;
        Ok(manifest)
    }

    /// Reads `<package_dir>/info.json`.
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, package_dir: &Path) -> Result<Self> {
        let path = package_dir.join(MANIFEST_FILE);
        let content = runtime
            .read_to_string(&path)
            .map_err(|e| corrupt(&path, format!("{:#}", e)))?;
        Ok(Self::from_slice(content.as_bytes(), &path)?)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Dependencies with their parsed ranges, in declaration order.
    pub fn dependency_specs(&self) -> Result<Vec<(String, VersionSpec)>> {
        self.dependencies
            .iter()
            .map(|(id, spec)| Ok((id.clone(), VersionSpec::parse(spec)?)))
            .collect()
    }

    fn validate(&self) -> Result<(), String> {
        if !is_valid_package_id(&self.id) {
            return Err(format!("invalid package id {:?}", self.id));
        }
        for (dep, spec) in &self.dependencies {
            if !is_valid_package_id(dep) {
                return Err(format!("invalid dependency id {:?}", dep));
            }
            VersionSpec::parse(spec)
                .map_err(|e| format!("dependency {}: {:#}", dep, e))?;
        }
        for script in self.installers.iter().chain(&self.uninstallers) {
            if !is_contained_script(script) {
                return Err(format!("script path {:?} escapes the package", script));
            }
        }
        Ok(())
    }
}

fn is_contained_script(script: &str) -> bool {
    let path = Path::new(script);
    !script.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

fn corrupt(path: &Path, reason: String) -> PkgError {
    PkgError::CorruptManifest {
        path: path.to_path_buf(),
        reason,
    }
}
