use anyhow::{Result, anyhow};
use std::str::FromStr;

use crate::package::{VersionSpec, is_valid_package_id};

/// `name` or `name<range>` as typed on the command line, e.g. `foo>=1.0,<2`
/// or `foo==1.2.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    pub name: String,
    pub spec: VersionSpec,
}

impl FromStr for PackageRequest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split = s.find(['=', '<', '>', '~', '^', '*', '!']).unwrap_or(s.len());
        let (name, range) = s.split_at(split);
        let name = name.trim();

        if !is_valid_package_id(name) {
            return Err(anyhow!("Invalid package name {:?}", name));
        }
        Ok(Self {
            name: name.to_string(),
            spec: VersionSpec::parse(range)?,
        })
    }
}
