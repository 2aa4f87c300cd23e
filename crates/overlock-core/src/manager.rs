//! The closed set of supported package managers.
//!
//! Each kind maps to exactly one lockfile filename under the project
//! directory. The kind is always supplied by the caller; the core never
//! guesses the manager from which files happen to be present.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SearchError;

/// A package manager whose lockfile format can be searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
}

impl PackageManager {
    /// All supported kinds, in stable order.
    pub const ALL: [Self; 3] = [Self::Npm, Self::Pnpm, Self::Yarn];

    /// Lockfile filename for this manager. Fixed, not configurable.
    #[must_use]
    pub fn lockfile_name(self) -> &'static str {
        match self {
            Self::Npm => "package-lock.json",
            Self::Pnpm => "pnpm-lock.yaml",
            Self::Yarn => "yarn.lock",
        }
    }

    /// Canonical lowercase name of this manager.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Yarn => "yarn",
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageManager {
    type Err = SearchError;

    /// Resolve a kind string. Rejection happens before any file I/O.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "npm" => Ok(Self::Npm),
            "pnpm" => Ok(Self::Pnpm),
            "yarn" => Ok(Self::Yarn),
            other => Err(SearchError::unsupported(other)),
        }
    }
}
