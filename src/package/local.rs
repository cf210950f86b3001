use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::registry::{LocalRegistry, REMOVED_MARKER};
use super::{Manifest, Version};
use crate::error::PkgError;
use crate::host::{Host, InterpreterScope, ModuleCategory};
use crate::runtime::Runtime;

/// A package extracted under the packages root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPackage {
    pub id: String,
    pub version: Version,
    pub path: PathBuf,
}

/// Which script failed and why.
struct ScriptFailure {
    script: String,
    source: anyhow::Error,
}

impl LocalPackage {
    pub fn new(id: impl Into<String>, version: Version, path: PathBuf) -> Self {
        Self {
            id: id.into(),
            version,
            path,
        }
    }

    pub fn manifest<R: Runtime>(&self, runtime: &R) -> Result<Manifest> {
        Manifest::load(runtime, &self.path)
    }

    /// Runs the manifest's install scripts in order, with the package
    /// directory as working directory.
    ///
    /// When a script fails and `remove_on_fail` is set, the package is
    /// removed before the error is returned.
    #[tracing::instrument(skip(self, registry), fields(id = %self.id))]
    pub fn install<R: Runtime>(
        &mut self,
        registry: &LocalRegistry<R>,
        remove_on_fail: bool,
    ) -> Result<()> {
        let manifest = self.manifest(registry.runtime())?;
        if manifest.installers.is_empty() {
            return Ok(());
        }

        let Err(failure) = self.run_scripts(registry.host(), &manifest.installers) else {
            return Ok(());
        };

        error!("Installer failed!");
        let err = PkgError::InstallScript {
            package: self.id.clone(),
            script: failure.script,
            reason: format!("{:#}", failure.source),
        };

        if remove_on_fail {
            info!("Removing {} after failed installation", self.id);
            if let Err(e) = self.remove(registry) {
                warn!("Failed to remove {}: {:#}", self.id, e);
            }
        }
        Err(err.into())
    }

    /// Unregisters and deletes the package.
    ///
    /// Uninstall scripts are best effort. If the directory cannot be deleted
    /// it is marked and renamed out of the way, and `path` is updated to the
    /// new location; only a failed rename is reported.
    #[tracing::instrument(skip(self, registry), fields(id = %self.id))]
    pub fn remove<R: Runtime>(&mut self, registry: &LocalRegistry<R>) -> Result<()> {
        let runtime = registry.runtime();
        let host = registry.host();

        if let Err(e) = host.unregister_loadable_directory(&self.path) {
            warn!("Failed to unregister {:?}: {:#}", self.path, e);
        }

        match self.manifest(runtime) {
            Ok(manifest) if !manifest.uninstallers.is_empty() => {
                if let Err(failure) = self.run_scripts(host, &manifest.uninstallers) {
                    warn!(
                        "Uninstaller {:?} of {} failed: {:#}",
                        failure.script, self.id, failure.source
                    );
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping uninstallers of {}: {:#}", self.id, e),
        }

        match runtime.remove_dir_all(&self.path) {
            Ok(()) => {
                debug!("Deleted {:?}", self.path);
                Ok(())
            }
            Err(e) => {
                let locked = PkgError::FilesystemLocked {
                    path: self.path.clone(),
                    reason: format!("{:#}", e),
                };
                warn!("{}", locked);
                warn!("Package directory is in use and will be removed after restart.");
                self.defer_removal(runtime)
            }
        }
    }

    fn defer_removal<R: Runtime>(&mut self, runtime: &R) -> Result<()> {
        if let Err(e) = runtime.write(&self.path.join(REMOVED_MARKER), b"") {
            warn!("Failed to mark {:?} as removed: {:#}", self.path, e);
        }

        let target = removed_path(runtime, &self.path);
        runtime
            .rename(&self.path, &target)
            .with_context(|| format!("Failed to move {:?} out of the way", self.path))?;

        info!("Moved {:?} to {:?}", self.path, target);
        self.path = target;
        Ok(())
    }

    /// Makes the package and its dependencies loadable and loads its modules.
    ///
    /// Does nothing if the host already knows the directory, unless `force`.
    #[tracing::instrument(skip(self, registry), fields(id = %self.id))]
    pub fn load<R: Runtime>(&self, registry: &LocalRegistry<R>, force: bool) -> Result<()> {
        self.activate(registry, force, true, &mut HashSet::new())
    }

    /// Registers the package directory (dependencies first) without loading
    /// any module.
    pub fn populate_env<R: Runtime>(&self, registry: &LocalRegistry<R>) -> Result<()> {
        self.activate(registry, false, false, &mut HashSet::new())
    }

    fn activate<R: Runtime>(
        &self,
        registry: &LocalRegistry<R>,
        force: bool,
        load_modules: bool,
        seen: &mut HashSet<String>,
    ) -> Result<()> {
        if !seen.insert(self.id.clone()) {
            return Ok(());
        }

        let host = registry.host();
        if !force && host.is_loadable_directory(&self.path) {
            debug!("{} is already loaded", self.id);
            return Ok(());
        }

        let manifest = self.manifest(registry.runtime())?;
        for dep in manifest.dependencies.keys() {
            match registry.by_name(dep)? {
                Some(package) => package.activate(registry, false, load_modules, seen)?,
                None => {
                    warn!(
                        "Dependency {} of {} is not installed, not loading {}",
                        dep, self.id, self.id
                    );
                    return Ok(());
                }
            }
        }

        host.register_loadable_directory(&self.path)?;
        if load_modules {
            for category in [ModuleCategory::Plugins, ModuleCategory::Procs] {
                let count = host.load_modules_under(&self.path, category)?;
                debug!("Loaded {} {} module(s) of {}", count, category.dir_name(), self.id);
            }
        }
        Ok(())
    }

    fn run_scripts(&self, host: &dyn Host, scripts: &[String]) -> Result<(), ScriptFailure> {
        let scope = InterpreterScope::enter(host).map_err(|source| ScriptFailure {
            script: String::new(),
            source,
        })?;

        for script in scripts {
            let path = self.path.join(script);
            info!("Executing installer path {:?}...", path);
            scope
                .run_script(&path, &self.path)
                .map_err(|source| ScriptFailure {
                    script: script.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

/// `<dir>-removed`, or `<dir>-removed-<hex>` if that is taken.
fn removed_path<R: Runtime>(runtime: &R, dir: &Path) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let candidate = dir.with_file_name(format!("{}-removed", name));
    if !runtime.exists(&candidate) {
        return candidate;
    }

    let mut salt = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    loop {
        let candidate = dir.with_file_name(format!("{}-removed-{:x}", name, salt));
        if !runtime.exists(&candidate) {
            return candidate;
        }
        salt = salt.wrapping_add(1);
    }
}
