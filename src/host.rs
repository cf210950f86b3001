//! The narrow contract between the package manager and the host application.
//!
//! The package manager only needs to make a directory loadable, ask the host
//! to load the modules found under it, and run install scripts inside the
//! host's interpreter. [`ProcessHost`] is the stand-alone implementation used
//! by the command line: it tracks loadable directories in memory and runs
//! scripts with an external interpreter.

use anyhow::{Context, Result, bail};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Kinds of modules a package can ship, each in its own sub-directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleCategory {
    Plugins,
    Procs,
}

impl ModuleCategory {
    pub fn dir_name(&self) -> &'static str {
        match self {
            ModuleCategory::Plugins => "plugins",
            ModuleCategory::Procs => "procs",
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Host: Send + Sync {
    fn register_loadable_directory(&self, path: &Path) -> Result<()>;
    fn unregister_loadable_directory(&self, path: &Path) -> Result<()>;
    fn is_loadable_directory(&self, path: &Path) -> bool;

    /// Loads every module of `category` under `path`, returning how many were loaded.
    fn load_modules_under(&self, path: &Path, category: ModuleCategory) -> Result<usize>;

    fn enter_interpreter(&self) -> Result<()>;
    fn leave_interpreter(&self);

    /// Runs one script with `cwd` as its working directory.
    fn run_script(&self, script: &Path, cwd: &Path) -> Result<()>;
}

/// Keeps the host interpreter active for as long as the scope lives.
///
/// The interpreter is left on drop, so every early return and `?` in the
/// caller leaves it balanced.
pub struct InterpreterScope<'a> {
    host: &'a dyn Host,
}

impl<'a> InterpreterScope<'a> {
    pub fn enter(host: &'a dyn Host) -> Result<Self> {
        host.enter_interpreter()?;
        Ok(Self { host })
    }

    pub fn run_script(&self, script: &Path, cwd: &Path) -> Result<()> {
        self.host.run_script(script, cwd)
    }
}

impl Drop for InterpreterScope<'_> {
    fn drop(&mut self) {
        self.host.leave_interpreter();
    }
}

/// Host backed by the local process: scripts run as child processes of the
/// configured interpreter.
pub struct ProcessHost {
    interpreter: String,
    directories: Mutex<Vec<PathBuf>>,
    depth: AtomicUsize,
}

impl ProcessHost {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            directories: Mutex::new(Vec::new()),
            depth: AtomicUsize::new(0),
        }
    }

    pub fn loadable_directories(&self) -> Vec<PathBuf> {
        self.directories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Host for ProcessHost {
    fn register_loadable_directory(&self, path: &Path) -> Result<()> {
        let mut dirs = self.directories.lock().unwrap_or_else(|e| e.into_inner());
        if !dirs.iter().any(|d| d == path) {
            debug!("Registering loadable directory {:?}", path);
            dirs.push(path.to_path_buf());
        }
        Ok(())
    }

    fn unregister_loadable_directory(&self, path: &Path) -> Result<()> {
        let mut dirs = self.directories.lock().unwrap_or_else(|e| e.into_inner());
        dirs.retain(|d| d != path);
        Ok(())
    }

    fn is_loadable_directory(&self, path: &Path) -> bool {
        self.directories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|d| d == path)
    }

    #[tracing::instrument(skip(self))]
    fn load_modules_under(&self, path: &Path, category: ModuleCategory) -> Result<usize> {
        let base = path.join(category.dir_name());
        let pattern = format!(
            "{}/*",
            glob::Pattern::escape(&base.to_string_lossy())
        );

        let mut loaded = 0;
        for entry in glob::glob(&pattern).context("Invalid module search pattern")? {
            let module = entry.context("Failed to read module entry")?;
            if module.is_file() {
                info!("Loading {} module {:?}", category.dir_name(), module);
                loaded += 1;
            }
        }
        Ok(loaded)
    }

    fn enter_interpreter(&self) -> Result<()> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn leave_interpreter(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1));
    }

    #[tracing::instrument(skip(self))]
    fn run_script(&self, script: &Path, cwd: &Path) -> Result<()> {
        if self.depth.load(Ordering::SeqCst) == 0 {
            bail!("Interpreter is not active");
        }

        let status = Command::new(&self.interpreter)
            .arg(script)
            .current_dir(cwd)
            .status()
            .with_context(|| format!("Failed to launch {}", self.interpreter))?;

        if !status.success() {
            bail!("{:?} exited with {}", script, status);
        }
        Ok(())
    }
}
