//! Typed failures surfaced by the package pipeline.
//!
//! Functions return `anyhow::Result` and wrap one of these when a caller may
//! need to tell the failure kinds apart (`err.downcast_ref::<PkgError>()`).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PkgError {
    /// Transport failure or timeout that survived every retry.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// The repository does not know the package at all.
    #[error("Package {name:?} not found on repository {repo}")]
    NotFound { name: String, repo: String },

    /// The repository knows the package but no release satisfies the range.
    #[error("No release of {name:?} satisfying {spec:?} on repository {repo}")]
    NoMatchingRelease {
        name: String,
        spec: String,
        repo: String,
    },

    #[error("Invalid manifest {}: {reason}", .path.display())]
    CorruptManifest { path: PathBuf, reason: String },

    #[error("Cyclic dependency found when installing {name:?}")]
    CyclicDependency { name: String },

    #[error("Installer {script:?} of {package} failed: {reason}")]
    InstallScript {
        package: String,
        script: String,
        reason: String,
    },

    #[error("Directory {} is locked: {reason}", .path.display())]
    FilesystemLocked { path: PathBuf, reason: String },

    /// A repository handed out a storage coordinate that is not safe to use.
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    #[error("Package {0:?} is not installed")]
    NotInstalled(String),
}
