//! Package versions and version-range constraints.
//!
//! Versions are semantic versions. Manifests in the wild often carry a
//! leading `v` or a truncated `1.2`, so parsing pads missing components
//! before handing the string to `semver`.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(semver::Version);

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    pub fn parse(input: &str) -> Result<Self> {
        let coerced = coerce(input)?;
        let version = semver::Version::parse(&coerced)
            .with_context(|| format!("Invalid version {:?}", input))?;
        Ok(Self(version))
    }
}

/// Pads `1` / `1.2` to a full `major.minor.patch` and strips a leading `v`.
fn coerce(input: &str) -> Result<String> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if trimmed.is_empty() {
        bail!("Empty version string");
    }

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();

    let core = match parts.len() {
        1 => format!("{}.0.0", core),
        2 => format!("{}.0", core),
        _ => core.to_string(),
    };
    Ok(format!("{}{}", core, suffix))
}

impl FromStr for Version {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Version::parse(&raw).map_err(|e| serde::de::Error::custom(format!("{:#}", e)))
    }
}

/// A range constraint such as `>=1.2,<2.0,!=1.4.1`.
///
/// Accepted forms:
/// - `""` or `"*"`: any version
/// - comma separated comparators (`>=1.2, <2`, `~1.4`, `^2`)
/// - `==1.2.3` or a bare `1.2.3`: exactly that version
/// - `!=1.2.3`: anything but that version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    raw: String,
    req: semver::VersionReq,
    /// `semver` has no inequality operator, so `!=` comparators live here.
    excluded: Vec<Version>,
}

impl VersionSpec {
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            req: semver::VersionReq::STAR,
            excluded: Vec::new(),
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let raw = input.trim();
        if raw.is_empty() || raw == "*" {
            return Ok(Self::any());
        }

        let mut comparators = Vec::new();
        let mut excluded = Vec::new();
        for part in raw.split(',').map(str::trim) {
            if let Some(version) = part.strip_prefix("!=") {
                let version = Version::parse(version)
                    .with_context(|| format!("Invalid version spec {:?}", raw))?;
                excluded.push(version);
            } else {
                let comparator = normalize_comparator(part)
                    .with_context(|| format!("Invalid version spec {:?}", raw))?;
                comparators.push(comparator);
            }
        }

        let req = if comparators.is_empty() {
            semver::VersionReq::STAR
        } else {
            semver::VersionReq::parse(&comparators.join(", "))
                .with_context(|| format!("Invalid version spec {:?}", raw))?
        };

        Ok(Self {
            raw: raw.to_string(),
            req,
            excluded,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.req.matches(&version.0) && !self.excluded.contains(version)
    }

    pub fn is_any(&self) -> bool {
        self.req == semver::VersionReq::STAR && self.excluded.is_empty()
    }
}

fn normalize_comparator(part: &str) -> Result<String> {
    if part.is_empty() {
        bail!("Empty comparator");
    }
    if part == "*" {
        return Ok(part.to_string());
    }
    if let Some(rest) = part.strip_prefix("==") {
        return Ok(format!("={}", rest.trim()));
    }
    // semver treats a bare version as a caret requirement; here it means "exactly"
    let bare = part.strip_prefix('v').unwrap_or(part);
    if bare.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(format!("={}", bare));
    }
    Ok(part.to_string())
}

impl Default for VersionSpec {
    fn default() -> Self {
        Self::any()
    }
}

impl FromStr for VersionSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
