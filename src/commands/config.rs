use anyhow::Result;
use log::debug;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{RegistryConfig, default_base_dir};
use crate::host::ProcessHost;
use crate::http::Fetcher;
use crate::package::LocalRegistry;
use crate::repository::{RepoHandle, from_base};
use crate::resolver::{Installer, PackageLocks};
use crate::runtime::Runtime;

/// Everything a command needs, built once from the base directory.
pub struct Config<R: Runtime> {
    pub runtime: Arc<R>,
    pub settings: RegistryConfig,
    pub fetcher: Fetcher,
}

impl<R: Runtime + 'static> Config<R> {
    /// Loads `<home>/config.json`; `home` defaults to `$EXTPM_HOME` or `~/.extpm`.
    pub fn load(runtime: R, home: Option<PathBuf>) -> Result<Self> {
        let base = match home {
            Some(path) => path,
            None => default_base_dir(&runtime)?,
        };
        debug!("Using base directory {:?}", base);

        let settings = RegistryConfig::load_or_init(&runtime, &base)?;
        Ok(Self {
            runtime: Arc::new(runtime),
            settings,
            fetcher: Fetcher::default(),
        })
    }

    /// Configured repositories, in order.
    pub fn repositories(&self) -> Result<Vec<RepoHandle>> {
        self.settings
            .repos
            .iter()
            .map(|base| from_base(base, self.fetcher.clone()))
            .collect()
    }

    pub fn repository(&self, base: &str) -> Result<RepoHandle> {
        from_base(base, self.fetcher.clone())
    }

    pub fn registry(&self) -> Result<Arc<LocalRegistry<R>>> {
        let host = Arc::new(ProcessHost::new(self.settings.interpreter.clone()));
        Ok(Arc::new(LocalRegistry::from_config(
            self.runtime.clone(),
            host,
            &self.settings,
        )?))
    }

    pub fn installer(&self, remove_on_fail: bool) -> Result<Installer<R>> {
        Ok(Installer::new(self.registry()?, PackageLocks::new()).with_remove_on_fail(remove_on_fail))
    }

    pub fn save(&self) -> Result<()> {
        self.settings.save(self.runtime.as_ref())
    }
}
