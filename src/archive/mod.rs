//! Package archives.
//!
//! Packages are distributed as zip files. Archives produced by source
//! hosting services wrap everything in a single top-level folder
//! (`project-<commit>/info.json`); that folder is stripped on extraction.

mod zip;

pub use zip::PackageArchive;

/// Returns the folder prefix (with trailing `/`) shared by every entry, if the
/// archive has no top-level files and exactly one top-level folder.
pub fn single_folder_prefix<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut folder: Option<&str> = None;

    for name in names {
        match name.split_once('/') {
            None => return None, // a top-level file
            Some((first, _)) => match folder {
                None => folder = Some(first),
                Some(existing) if existing == first => {}
                Some(_) => return None,
            },
        }
    }

    folder
        .filter(|f| !f.is_empty())
        .map(|f| format!("{}/", f))
}
