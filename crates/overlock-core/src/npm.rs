//! package-lock.json reader and normalizer.
//!
//! npm has shipped two lockfile shapes: a legacy tree whose nested
//! `dependencies` maps mirror the on-disk `node_modules` nesting, and the
//! modern flat `packages` map keyed by install path. When both are present
//! the `packages` map wins, since it is the more complete encoding.
//!
//! Occurrence paths reproduce the physical nesting recorded by the
//! lockfile; `requires`/`dependencies` edges resolve the way Node does,
//! by walking up the enclosing install directories to the nearest copy.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;

use crate::error::SearchError;
use crate::graph::{DependencyGraph, EdgeKind, GraphBuilder};
use crate::manifest::Manifest;

/// Parsed package-lock.json, shape-agnostic.
#[derive(Debug, Deserialize)]
pub struct NpmLockfile {
    /// Modern flat map keyed by install path; `""` is the root entry.
    #[serde(default)]
    packages: Option<BTreeMap<String, NpmPackageEntry>>,
    /// Legacy nested tree keyed by package name.
    #[serde(default)]
    dependencies: Option<BTreeMap<String, NpmLegacyDep>>,
}

/// One entry of the modern `packages` map.
#[derive(Debug, Default, Deserialize)]
pub struct NpmPackageEntry {
    /// Real package name when it differs from the install directory.
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    /// True for entries that merely alias a workspace directory.
    #[serde(default)]
    link: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "peerDependencies")]
    peer_dependencies: BTreeMap<String, String>,
}

/// One entry of the legacy nested tree.
#[derive(Debug, Default, Deserialize)]
pub struct NpmLegacyDep {
    #[serde(default)]
    version: Option<String>,
    /// Advisory dev flag written by older npm versions; dev classification
    /// comes from the manifest at normalization time.
    #[serde(default)]
    #[allow(dead_code)]
    dev: bool,
    /// Declared requirements (name -> range).
    #[serde(default)]
    requires: BTreeMap<String, String>,
    /// Packages physically hoisted below this one.
    #[serde(default)]
    dependencies: BTreeMap<String, NpmLegacyDep>,
}

impl NpmLockfile {
    /// True when normalization needs the project manifest to seed root
    /// dependencies: the legacy shape always does, the modern shape only
    /// when its `""` root entry is absent.
    #[must_use]
    pub fn needs_manifest(&self) -> bool {
        match &self.packages {
            Some(packages) => !packages.is_empty() && !packages.contains_key(""),
            None => self
                .dependencies
                .as_ref()
                .is_some_and(|deps| !deps.is_empty()),
        }
    }
}

/// Parse package-lock.json content.
///
/// # Errors
///
/// `Parse` with the offending line when the JSON is malformed.
pub fn parse(path: &Path, content: &str) -> Result<NpmLockfile, SearchError> {
    serde_json::from_str(content).map_err(|e| SearchError::parse_at(path, e.line(), e.to_string()))
}

/// Normalize a parsed lockfile into the unified graph.
///
/// # Errors
///
/// `Parse` when an entry is missing its required `version` field.
pub fn normalize(
    lockfile: &NpmLockfile,
    manifest: Option<&Manifest>,
    lock_path: &Path,
) -> Result<DependencyGraph, SearchError> {
    if let Some(packages) = &lockfile.packages {
        normalize_packages_map(packages, manifest, lock_path)
    } else if let Some(dependencies) = &lockfile.dependencies {
        normalize_legacy_tree(dependencies, manifest, lock_path)
    } else {
        Ok(GraphBuilder::new().finish())
    }
}

/// Split a `packages` key into its chain of install-directory names.
/// `node_modules/a/node_modules/@s/b` -> `["a", "@s/b"]`. Returns `None`
/// for keys not rooted in `node_modules` (workspace source directories).
fn install_chain(key: &str) -> Option<Vec<String>> {
    let rest = key.strip_prefix("node_modules/")?;
    Some(rest.split("/node_modules/").map(String::from).collect())
}

fn normalize_packages_map(
    packages: &BTreeMap<String, NpmPackageEntry>,
    manifest: Option<&Manifest>,
    lock_path: &Path,
) -> Result<DependencyGraph, SearchError> {
    let mut builder = GraphBuilder::new();
    let mut index: HashMap<(Vec<String>, String), usize> = HashMap::new();
    let mut placed: Vec<(usize, Vec<String>, &NpmPackageEntry)> = Vec::new();

    for (key, entry) in packages {
        if key.is_empty() || entry.link {
            continue;
        }
        let chain = match install_chain(key) {
            Some(chain) => chain,
            None => {
                // Workspace source directory: a top-level package rooted
                // outside node_modules.
                let basename = key.rsplit('/').next().unwrap_or(key).to_string();
                vec![entry.name.clone().unwrap_or(basename)]
            }
        };
        let Some(version) = &entry.version else {
            return Err(SearchError::parse(
                lock_path,
                format!("packages[\"{key}\"] is missing a version"),
            ));
        };
        let name = chain.last().cloned().unwrap_or_default();
        let path = chain[..chain.len() - 1].to_vec();
        let idx = builder.add_occurrence(name.clone(), version, path.clone());
        index.insert((path, name), idx);
        placed.push((idx, chain, entry));
    }

    // Root edges come from the lockfile's own "" entry when present,
    // otherwise from the manifest.
    if let Some(root) = packages.get("") {
        add_section_root_edges(&mut builder, &index, &root.dependencies, EdgeKind::Runtime);
        add_section_root_edges(&mut builder, &index, &root.dev_dependencies, EdgeKind::Dev);
        add_section_root_edges(
            &mut builder,
            &index,
            &root.optional_dependencies,
            EdgeKind::Optional,
        );
        add_section_root_edges(
            &mut builder,
            &index,
            &root.peer_dependencies,
            EdgeKind::Peer,
        );
    } else if let Some(manifest) = manifest {
        add_section_root_edges(&mut builder, &index, &manifest.dependencies, EdgeKind::Runtime);
        add_section_root_edges(
            &mut builder,
            &index,
            &manifest.dev_dependencies,
            EdgeKind::Dev,
        );
        add_section_root_edges(
            &mut builder,
            &index,
            &manifest.optional_dependencies,
            EdgeKind::Optional,
        );
    }

    for (idx, chain, entry) in placed {
        add_nested_edges(
            &mut builder,
            &index,
            idx,
            &chain,
            &entry.dependencies,
            EdgeKind::Runtime,
        );
        add_nested_edges(
            &mut builder,
            &index,
            idx,
            &chain,
            &entry.optional_dependencies,
            EdgeKind::Optional,
        );
        add_nested_edges(
            &mut builder,
            &index,
            idx,
            &chain,
            &entry.peer_dependencies,
            EdgeKind::Peer,
        );
    }

    Ok(builder.finish())
}

fn add_section_root_edges(
    builder: &mut GraphBuilder,
    index: &HashMap<(Vec<String>, String), usize>,
    section: &BTreeMap<String, String>,
    kind: EdgeKind,
) {
    for (name, range) in section {
        let to = index.get(&(Vec::new(), name.clone())).copied();
        builder.add_root_edge(name, range, kind, to);
    }
}

fn add_nested_edges(
    builder: &mut GraphBuilder,
    index: &HashMap<(Vec<String>, String), usize>,
    from: usize,
    chain: &[String],
    section: &BTreeMap<String, String>,
    kind: EdgeKind,
) {
    for (name, range) in section {
        let to = resolve_nearest(index, chain, name);
        builder.add_edge(from, name, range, kind, to);
    }
}

/// Resolve a dependency name the way Node does: nearest enclosing install
/// directory first, walking up toward the top level.
fn resolve_nearest(
    index: &HashMap<(Vec<String>, String), usize>,
    chain: &[String],
    name: &str,
) -> Option<usize> {
    for depth in (0..=chain.len()).rev() {
        let candidate = (chain[..depth].to_vec(), name.to_string());
        if let Some(&idx) = index.get(&candidate) {
            return Some(idx);
        }
    }
    None
}

fn normalize_legacy_tree(
    dependencies: &BTreeMap<String, NpmLegacyDep>,
    manifest: Option<&Manifest>,
    lock_path: &Path,
) -> Result<DependencyGraph, SearchError> {
    let mut builder = GraphBuilder::new();
    let mut index: HashMap<(Vec<String>, String), usize> = HashMap::new();
    let mut placed: Vec<(usize, Vec<String>, &NpmLegacyDep)> = Vec::new();

    walk_legacy(
        dependencies,
        &mut Vec::new(),
        &mut builder,
        &mut index,
        &mut placed,
        lock_path,
    )?;

    if let Some(manifest) = manifest {
        add_section_root_edges(&mut builder, &index, &manifest.dependencies, EdgeKind::Runtime);
        add_section_root_edges(
            &mut builder,
            &index,
            &manifest.dev_dependencies,
            EdgeKind::Dev,
        );
        add_section_root_edges(
            &mut builder,
            &index,
            &manifest.optional_dependencies,
            EdgeKind::Optional,
        );
    }

    for (idx, chain, dep) in placed {
        for (req_name, req_range) in &dep.requires {
            let to = resolve_nearest(&index, &chain, req_name);
            builder.add_edge(idx, req_name, req_range, EdgeKind::Runtime, to);
        }
    }

    Ok(builder.finish())
}

fn walk_legacy<'lock>(
    dependencies: &'lock BTreeMap<String, NpmLegacyDep>,
    path: &mut Vec<String>,
    builder: &mut GraphBuilder,
    index: &mut HashMap<(Vec<String>, String), usize>,
    placed: &mut Vec<(usize, Vec<String>, &'lock NpmLegacyDep)>,
    lock_path: &Path,
) -> Result<(), SearchError> {
    for (name, dep) in dependencies {
        let Some(version) = &dep.version else {
            let mut segments = vec!["dependencies".to_string()];
            for ancestor in path.iter() {
                segments.push(ancestor.clone());
                segments.push("dependencies".to_string());
            }
            segments.push(name.clone());
            return Err(SearchError::parse(
                lock_path,
                format!("entry '{}' is missing a version", segments.join(".")),
            ));
        };

        let idx = builder.add_occurrence(name.clone(), version, path.clone());
        index.insert((path.clone(), name.clone()), idx);

        path.push(name.clone());
        let chain = path.clone();
        walk_legacy(&dep.dependencies, path, builder, index, placed, lock_path)?;
        path.pop();

        placed.push((idx, chain, dep));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn lock_path() -> PathBuf {
        PathBuf::from("/fixture/package-lock.json")
    }

    fn parse_ok(content: &str) -> NpmLockfile {
        parse(&lock_path(), content).unwrap()
    }

    #[test]
    fn test_modern_single_top_level_package() {
        let content = serde_json::json!({
            "lockfileVersion": 3,
            "packages": {
                "": { "name": "fixture", "dependencies": { "a": "^1.0.0" } },
                "node_modules/a": { "version": "1.0.0" }
            }
        })
        .to_string();

        let lockfile = parse_ok(&content);
        assert!(!lockfile.needs_manifest());
        let graph = normalize(&lockfile, None, &lock_path()).unwrap();

        assert_eq!(graph.len(), 1);
        let occurrence = &graph.occurrences[0];
        assert_eq!(occurrence.name, "a");
        assert_eq!(occurrence.version, "1.0.0");
        assert!(occurrence.path.is_empty());
        assert_eq!(graph.roots, vec![0]);
    }

    #[test]
    fn test_modern_hoisted_duplicate_versions() {
        // a depends on b@2 (hoisted to the top level), x carries its own b@3.
        let content = serde_json::json!({
            "packages": {
                "": { "dependencies": { "a": "^1.0.0", "x": "^1.0.0" } },
                "node_modules/a": { "version": "1.0.0", "dependencies": { "b": "^2.0.0" } },
                "node_modules/b": { "version": "2.0.0" },
                "node_modules/x": { "version": "1.0.0", "dependencies": { "b": "^3.0.0" } },
                "node_modules/x/node_modules/b": { "version": "3.0.0" }
            }
        })
        .to_string();

        let graph = normalize(&parse_ok(&content), None, &lock_path()).unwrap();

        let copies: Vec<_> = graph
            .occurrences
            .iter()
            .filter(|o| o.name == "b")
            .collect();
        assert_eq!(copies.len(), 2);
        assert_eq!(copies[0].version, "2.0.0");
        assert!(copies[0].path.is_empty());
        assert_eq!(copies[1].version, "3.0.0");
        assert_eq!(copies[1].path, vec!["x".to_string()]);
    }

    #[test]
    fn test_modern_nearest_enclosing_resolution() {
        let content = serde_json::json!({
            "packages": {
                "": { "dependencies": { "a": "^1.0.0" } },
                "node_modules/a": { "version": "1.0.0", "dependencies": { "c": "^2.0.0" } },
                "node_modules/a/node_modules/c": { "version": "2.0.0" },
                "node_modules/c": { "version": "1.0.0" }
            }
        })
        .to_string();

        let graph = normalize(&parse_ok(&content), None, &lock_path()).unwrap();

        let edge = graph
            .edges
            .iter()
            .find(|e| e.from.is_some() && e.name == "c")
            .unwrap();
        let target = &graph.occurrences[edge.to.unwrap()];
        assert_eq!(target.version, "2.0.0");
        assert_eq!(target.path, vec!["a".to_string()]);
    }

    #[test]
    fn test_modern_missing_version_is_parse_error() {
        let content = serde_json::json!({
            "packages": {
                "": {},
                "node_modules/a": { "dependencies": { "b": "^1.0.0" } }
            }
        })
        .to_string();

        let err = normalize(&parse_ok(&content), None, &lock_path()).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::LOCKFILE_PARSE_FAILED);
        assert!(err.to_string().contains("node_modules/a"));
    }

    #[test]
    fn test_modern_dev_only_marking() {
        let content = serde_json::json!({
            "packages": {
                "": {
                    "dependencies": { "a": "^1.0.0" },
                    "devDependencies": { "d": "^1.0.0" }
                },
                "node_modules/a": { "version": "1.0.0" },
                "node_modules/d": { "version": "1.0.0", "dependencies": { "e": "^1.0.0" } },
                "node_modules/e": { "version": "1.0.0" }
            }
        })
        .to_string();

        let graph = normalize(&parse_ok(&content), None, &lock_path()).unwrap();
        let by_name = |name: &str| graph.occurrences.iter().find(|o| o.name == name).unwrap();
        assert!(!by_name("a").dev_only);
        assert!(by_name("d").dev_only);
        assert!(by_name("e").dev_only);
    }

    #[test]
    fn test_link_entries_are_skipped() {
        let content = serde_json::json!({
            "packages": {
                "": { "dependencies": { "local": "^1.0.0" } },
                "node_modules/local": { "link": true, "resolved": "packages/local" },
                "packages/local": { "name": "local", "version": "1.0.0" }
            }
        })
        .to_string();

        let graph = normalize(&parse_ok(&content), None, &lock_path()).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.occurrences[0].name, "local");
        assert!(graph.occurrences[0].path.is_empty());
    }

    #[test]
    fn test_legacy_tree_with_duplicates() {
        let content = serde_json::json!({
            "dependencies": {
                "a": { "version": "1.0.0", "requires": { "b": "^2.0.0" } },
                "b": { "version": "2.0.0" },
                "x": {
                    "version": "1.0.0",
                    "requires": { "b": "^3.0.0" },
                    "dependencies": {
                        "b": { "version": "3.0.0" }
                    }
                }
            }
        })
        .to_string();
        let manifest = Manifest::from_json(
            &PathBuf::from("/fixture/package.json"),
            r#"{ "dependencies": { "a": "^1.0.0", "x": "^1.0.0" } }"#,
        )
        .unwrap();

        let lockfile = parse_ok(&content);
        assert!(lockfile.needs_manifest());
        let graph = normalize(&lockfile, Some(&manifest), &lock_path()).unwrap();

        let copies: Vec<_> = graph
            .occurrences
            .iter()
            .filter(|o| o.name == "b")
            .collect();
        assert_eq!(copies.len(), 2);
        assert!(copies.iter().any(|o| o.version == "2.0.0" && o.path.is_empty()));
        assert!(copies
            .iter()
            .any(|o| o.version == "3.0.0" && o.path == vec!["x".to_string()]));

        // x's requires edge binds to its nested copy, not the hoisted one.
        let x_idx = graph.occurrences.iter().position(|o| o.name == "x").unwrap();
        let edge = graph
            .edges
            .iter()
            .find(|e| e.from == Some(x_idx) && e.name == "b")
            .unwrap();
        assert_eq!(graph.occurrences[edge.to.unwrap()].version, "3.0.0");
    }

    #[test]
    fn test_legacy_missing_version_names_offending_path() {
        let content = serde_json::json!({
            "dependencies": {
                "a": {
                    "version": "1.0.0",
                    "dependencies": {
                        "b": { "requires": { "c": "^1.0.0" } }
                    }
                }
            }
        })
        .to_string();

        let err = normalize(&parse_ok(&content), None, &lock_path()).unwrap_err();
        assert_eq!(err.code(), crate::error::codes::LOCKFILE_PARSE_FAILED);
        assert!(err.to_string().contains("dependencies.a.dependencies.b"));
    }

    #[test]
    fn test_packages_map_takes_precedence_over_legacy() {
        let content = serde_json::json!({
            "packages": {
                "": { "dependencies": { "modern": "^1.0.0" } },
                "node_modules/modern": { "version": "1.0.0" }
            },
            "dependencies": {
                "stale": { "version": "0.1.0" }
            }
        })
        .to_string();

        let graph = normalize(&parse_ok(&content), None, &lock_path()).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.occurrences[0].name, "modern");
    }

    #[test]
    fn test_malformed_json_is_parse_error_with_line() {
        let err = parse(&lock_path(), "{\n  \"packages\": nope\n}").unwrap_err();
        match err {
            SearchError::Parse { line, .. } => assert_eq!(line, Some(2)),
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_unresolved_requirement_kept_as_dangling_edge() {
        let content = serde_json::json!({
            "packages": {
                "": { "dependencies": { "a": "^1.0.0" } },
                "node_modules/a": { "version": "1.0.0", "peerDependencies": { "ghost": "^9.0.0" } }
            }
        })
        .to_string();

        let graph = normalize(&parse_ok(&content), None, &lock_path()).unwrap();
        let dangling = graph
            .edges
            .iter()
            .find(|e| e.name == "ghost")
            .unwrap();
        assert!(dangling.to.is_none());
        assert_eq!(dangling.kind, EdgeKind::Peer);
    }
}
