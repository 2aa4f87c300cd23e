//! pnpm-lock.yaml reader and normalizer.
//!
//! pnpm stores one flat `packages` map keyed by "name@version" (v6+, with
//! an optional peer suffix in parentheses) or "/name/version" (v5), plus an
//! `importers` section listing each workspace project's direct
//! dependencies. The flat keying already deduplicates identical
//! name+version pairs, so normalization reconstructs each importer's tree
//! by resolving direct dependencies into the flat map and following their
//! declared dependencies, deduplicating on first reach and closing cycles
//! against occurrences already materialized for that importer.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::error::SearchError;
use crate::graph::{DependencyGraph, EdgeKind, GraphBuilder};

/// Parsed pnpm-lock.yaml.
#[derive(Debug, Default, Deserialize)]
pub struct PnpmLockfile {
    /// One entry per workspace project (v6+). Absent in v5 single-project
    /// lockfiles, which carry the dependency sections at the top level.
    #[serde(default)]
    importers: BTreeMap<String, PnpmImporter>,
    #[serde(default)]
    dependencies: BTreeMap<String, PnpmVersionRef>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, PnpmVersionRef>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: BTreeMap<String, PnpmVersionRef>,
    /// Flat map from composite key to the package's own dependencies.
    #[serde(default)]
    packages: BTreeMap<String, PnpmPackage>,
}

/// Direct dependencies of one workspace project.
#[derive(Debug, Default, Deserialize)]
pub struct PnpmImporter {
    #[serde(default)]
    dependencies: BTreeMap<String, PnpmVersionRef>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, PnpmVersionRef>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: BTreeMap<String, PnpmVersionRef>,
}

/// v5 records a bare version string; v6+ a `{ specifier, version }` map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PnpmVersionRef {
    Version(String),
    Spec { specifier: String, version: String },
}

impl PnpmVersionRef {
    fn version(&self) -> &str {
        match self {
            Self::Version(version) => version,
            Self::Spec { version, .. } => version,
        }
    }

    /// The declared constraint: the specifier when recorded, otherwise the
    /// resolved version itself.
    fn constraint(&self) -> &str {
        match self {
            Self::Version(version) => version,
            Self::Spec { specifier, .. } => specifier,
        }
    }
}

/// One entry of the flat `packages` map.
#[derive(Debug, Default, Deserialize)]
pub struct PnpmPackage {
    /// Explicit dev flag pnpm writes per package; advisory here, since
    /// dev classification follows the importer sections.
    #[serde(default)]
    #[allow(dead_code)]
    dev: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    peer_dependencies: BTreeMap<String, String>,
}

/// Parse pnpm-lock.yaml content.
///
/// # Errors
///
/// `Parse` with the offending line when the YAML is malformed.
pub fn parse(path: &Path, content: &str) -> Result<PnpmLockfile, SearchError> {
    serde_yaml_ng::from_str(content).map_err(|e| match e.location() {
        Some(location) => SearchError::parse_at(path, location.line(), e.to_string()),
        None => SearchError::parse(path, e.to_string()),
    })
}

/// Split a composite package key into (name, exact version).
///
/// Accepts `/name/1.0.0` (v5), `/name@1.0.0` (v6), `name@1.0.0` (v9), the
/// scoped forms of each, and peer suffixes in `(...)` (v6+) or after `_`
/// (v5), which are stripped.
#[must_use]
pub fn parse_package_key(key: &str) -> Option<(String, String)> {
    let key = key.strip_prefix('/').unwrap_or(key);
    let key = key.split('(').next().unwrap_or(key);
    let (name, version) = match key.rfind('@') {
        Some(at) if at > 0 => (&key[..at], &key[at + 1..]),
        _ => {
            let slash = key.rfind('/')?;
            (&key[..slash], &key[slash + 1..])
        }
    };
    let version = version.split('_').next().unwrap_or(version);
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_string(), version.to_string()))
}

/// Normalize a parsed lockfile into the unified graph.
#[must_use]
pub fn normalize(lockfile: &PnpmLockfile) -> DependencyGraph {
    let mut builder = GraphBuilder::new();

    let mut index: BTreeMap<(String, String), &PnpmPackage> = BTreeMap::new();
    for (key, package) in &lockfile.packages {
        if let Some(parsed) = parse_package_key(key) {
            index.insert(parsed, package);
        }
    }

    if lockfile.importers.is_empty() {
        walk_importer(
            &mut builder,
            &index,
            ".",
            &lockfile.dependencies,
            &lockfile.dev_dependencies,
            &lockfile.optional_dependencies,
        );
    } else {
        for (importer_name, importer) in &lockfile.importers {
            walk_importer(
                &mut builder,
                &index,
                importer_name,
                &importer.dependencies,
                &importer.dev_dependencies,
                &importer.optional_dependencies,
            );
        }
    }

    builder.finish()
}

fn walk_importer(
    builder: &mut GraphBuilder,
    index: &BTreeMap<(String, String), &PnpmPackage>,
    importer_name: &str,
    runtime: &BTreeMap<String, PnpmVersionRef>,
    dev: &BTreeMap<String, PnpmVersionRef>,
    optional: &BTreeMap<String, PnpmVersionRef>,
) {
    let prefix: Vec<String> = if importer_name == "." {
        Vec::new()
    } else {
        vec![importer_name.to_string()]
    };

    // Dedup scope is one importer: the first deterministic reach of a
    // (name, version) pair creates the occurrence, later reaches point
    // back at it.
    let mut seen: HashMap<(String, String), usize> = HashMap::new();

    let sections = [
        (runtime, EdgeKind::Runtime),
        (dev, EdgeKind::Dev),
        (optional, EdgeKind::Optional),
    ];
    for (section, kind) in sections {
        for (name, version_ref) in section {
            let to = descend(
                builder,
                index,
                &mut seen,
                name,
                version_ref.version(),
                &prefix,
            );
            builder.add_root_edge(name, version_ref.constraint(), kind, to);
        }
    }
}

fn descend(
    builder: &mut GraphBuilder,
    index: &BTreeMap<(String, String), &PnpmPackage>,
    seen: &mut HashMap<(String, String), usize>,
    declared_name: &str,
    value: &str,
    path: &[String],
) -> Option<usize> {
    let (name, version) = resolve_value(declared_name, value)?;
    let key = (name.clone(), version.clone());
    if let Some(&existing) = seen.get(&key) {
        return Some(existing);
    }
    let package = index.get(&key)?;

    let idx = builder.add_occurrence(&name, &version, path.to_vec());
    seen.insert(key, idx);

    let mut child_path = path.to_vec();
    child_path.push(name);

    let sections = [
        (&package.dependencies, EdgeKind::Runtime),
        (&package.optional_dependencies, EdgeKind::Optional),
        (&package.peer_dependencies, EdgeKind::Peer),
    ];
    for (section, kind) in sections {
        for (dep_name, dep_value) in section {
            let to = descend(builder, index, seen, dep_name, dep_value, &child_path);
            builder.add_edge(idx, dep_name, dep_value, kind, to);
        }
    }

    Some(idx)
}

/// Resolve a dependency value to a concrete (name, version) pair.
///
/// Values are plain versions ("1.0.0", possibly with a peer suffix),
/// alias references carrying their own package key ("/real-name/1.0.0" or
/// "real-name@1.0.0"), or local markers ("link:", "workspace:", "file:")
/// which never materialize a registry package.
fn resolve_value(declared_name: &str, value: &str) -> Option<(String, String)> {
    if value.starts_with("link:") || value.starts_with("workspace:") || value.starts_with("file:")
    {
        return None;
    }
    if value.starts_with('/') {
        return parse_package_key(value);
    }
    let stripped = value.split('(').next().unwrap_or(value);
    if stripped.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        // An exact version, possibly with a v5 peer suffix after '_'.
        let version = stripped.split('_').next().unwrap_or(stripped);
        return Some((declared_name.to_string(), version.to_string()));
    }
    if stripped.rfind('@').is_some_and(|at| at > 0) {
        // An embedded name marks an alias carrying its own package key.
        return parse_package_key(value);
    }
    None
}
