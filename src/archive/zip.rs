use anyhow::{Context, Result};
use bytes::Bytes;
use log::{debug, info, warn};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use super::single_folder_prefix;
use crate::error::PkgError;
use crate::package::{MANIFEST_FILE, Manifest};
use crate::runtime::Runtime;

/// A downloaded package archive held in memory.
pub struct PackageArchive {
    archive: ZipArchive<Cursor<Bytes>>,
    prefix: String,
}

impl PackageArchive {
    pub fn open(data: Bytes) -> Result<Self> {
        let archive =
            ZipArchive::new(Cursor::new(data)).context("Failed to parse ZIP archive")?;
        let prefix = single_folder_prefix(archive.file_names()).unwrap_or_default();
        if !prefix.is_empty() {
            debug!("Archive entries are wrapped in {:?}", prefix);
        }
        Ok(Self { archive, prefix })
    }

    /// The stripped top-level folder (`name/`), or an empty string.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Reads and validates `info.json` from the archive root.
    pub fn manifest(&mut self) -> Result<Manifest> {
        let name = format!("{}{}", self.prefix, MANIFEST_FILE);
        let origin = PathBuf::from(&name);

        let mut entry = self
            .archive
            .by_name(&name)
            .map_err(|e| PkgError::CorruptManifest {
                path: origin.clone(),
                reason: e.to_string(),
            })?;

        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .map_err(|e| PkgError::CorruptManifest {
                path: origin.clone(),
                reason: e.to_string(),
            })?;

        Ok(Manifest::from_slice(&content, &origin)?)
    }

    /// Extracts every entry below the prefix into `dest`.
    ///
    /// On failure the partially extracted `dest` is removed again.
    #[tracing::instrument(skip(self, runtime))]
    pub fn extract_to<R: Runtime>(&mut self, runtime: &R, dest: &Path) -> Result<()> {
        debug!("Extracting zip archive to {:?}...", dest);
        runtime.create_dir_all(dest)?;

        if let Err(e) = self.extract_entries(runtime, dest) {
            if let Err(cleanup) = runtime.remove_dir_all(dest) {
                warn!("Failed to clean up {:?}: {:#}", dest, cleanup);
            }
            return Err(e);
        }

        info!("Extraction complete.");
        Ok(())
    }

    fn extract_entries<R: Runtime>(&mut self, runtime: &R, dest: &Path) -> Result<()> {
        for i in 0..self.archive.len() {
            let mut entry = self
                .archive
                .by_index(i)
                .with_context(|| format!("Failed to read ZIP entry {}", i))?;

            let entry_path = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    debug!("Skipping entry with invalid path {:?}", entry.name());
                    continue;
                }
            };

            let relative = match entry_path.strip_prefix(&self.prefix) {
                Ok(relative) => relative,
                Err(_) => {
                    debug!("Skipping entry outside {:?}: {:?}", self.prefix, entry_path);
                    continue;
                }
            };
            if relative.as_os_str().is_empty() {
                continue;
            }

            let full_path = dest.join(relative);

            if entry.is_dir() {
                runtime.create_dir_all(&full_path)?;
            } else {
                if let Some(parent) = full_path.parent() {
                    runtime.create_dir_all(parent)?;
                }
                let mut dest_file = runtime.create_file(&full_path)?;
                std::io::copy(&mut entry, &mut dest_file)
                    .with_context(|| format!("Failed to extract file {:?}", full_path))?;

                #[cfg(unix)]
                if let Some(mode) = entry.unix_mode()
                    && let Err(e) = runtime.set_permissions(&full_path, mode)
                {
                    debug!("Failed to set permissions on {:?}: {}", full_path, e);
                }
            }
        }
        Ok(())
    }
}
