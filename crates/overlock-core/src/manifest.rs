//! package.json dependency extraction.
//!
//! The yarn and legacy-npm lockfile formats record no root dependency
//! section of their own, so the project manifest supplies the top-level
//! dependency names, ranges, and dev classification.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::error::SearchError;

/// Dependency sections of a project manifest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    /// Package name, when declared.
    #[serde(default)]
    pub name: Option<String>,
    /// Runtime dependencies (name -> declared range).
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    /// Development-only dependencies.
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,
    /// Optional dependencies.
    #[serde(default, rename = "optionalDependencies")]
    pub optional_dependencies: BTreeMap<String, String>,
}

impl Manifest {
    /// Read `package.json` from a project directory.
    ///
    /// # Errors
    ///
    /// `NotFound` when the file is missing, `Parse` when it is not valid
    /// JSON or a dependency section has a non-string range.
    pub fn read_from(project_dir: &Path) -> Result<Self, SearchError> {
        let path = project_dir.join("package.json");
        let content = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SearchError::not_found(&path)
            } else {
                SearchError::parse(&path, format!("Failed to read: {e}"))
            }
        })?;
        Self::from_json(&path, &content)
    }

    /// Parse manifest content, attributing errors to `path`.
    ///
    /// # Errors
    ///
    /// `Parse` with the offending line when the JSON is malformed.
    pub fn from_json(path: &Path, content: &str) -> Result<Self, SearchError> {
        serde_json::from_str(content)
            .map_err(|e| SearchError::parse_at(path, e.line(), e.to_string()))
    }

    /// True when `name` is declared only under `devDependencies`.
    #[must_use]
    pub fn is_dev_name(&self, name: &str) -> bool {
        self.dev_dependencies.contains_key(name) && !self.dependencies.contains_key(name)
    }
}
