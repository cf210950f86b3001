//! Package model: manifests, versions, installed and remote packages.
//!
//! - `manifest` - the `info.json` document shipped in every archive
//! - `version` - semantic versions and range constraints
//! - `local` - a package materialized under the packages root
//! - `remote` - a package descriptor offered by a repository
//! - `registry` - the set of installed packages on disk

mod local;
mod manifest;
mod registry;
mod remote;
mod version;

use regex::Regex;
use std::sync::OnceLock;

pub use local::LocalPackage;
pub use manifest::{MANIFEST_FILE, Manifest};
pub use registry::{LocalRegistry, REMOVED_MARKER};
pub use remote::RemotePackage;
pub use version::{Version, VersionSpec};

/// Package ids double as directory names, so they are restricted to a
/// portable character set and may not be `.` or `..`.
pub fn is_valid_package_id(id: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid id pattern"));
    id != "." && id != ".." && pattern.is_match(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_package_id() {
        for id in ["x", "my-plugin", "keypatch_2", "ida.findcrypt", "A1"] {
            assert!(is_valid_package_id(id), "{} should be valid", id);
        }
        for id in ["", ".", "..", "a/b", "a\\b", "name with space", "héllo"] {
            assert!(!is_valid_package_id(id), "{} should be invalid", id);
        }
    }
}
