//! Search engine and dispatcher.
//!
//! The dispatcher is the single entry point the surrounding tool calls:
//! it selects the reader/normalizer pair for the supplied package manager
//! kind, reads the lockfile fresh (no caching across queries), and hands
//! the normalized graph to the search engine. The search itself is one
//! pass over the occurrence set, partitioned by name.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

use crate::error::SearchError;
use crate::graph::{DependencyGraph, PackageOccurrence};
use crate::manager::PackageManager;
use crate::manifest::Manifest;
use crate::{npm, pnpm, yarn};

/// Schema version for serialized search results.
pub const SEARCH_SCHEMA_VERSION: u32 = 1;

/// Result of one occurrence query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    /// One entry per requested target, keyed by package name. An empty
    /// list means "searched but absent", distinct from "not requested".
    pub packages: BTreeMap<String, Vec<PackageOccurrence>>,
}

impl SearchResult {
    /// Occurrences for one target; `None` when it was never requested.
    #[must_use]
    pub fn occurrences(&self, name: &str) -> Option<&[PackageOccurrence]> {
        self.packages.get(name).map(Vec::as_slice)
    }

    /// Sorted, deduplicated versions materialized for one target. More
    /// than one entry means stale duplicate copies remain in the tree.
    #[must_use]
    pub fn distinct_versions(&self, name: &str) -> Vec<&str> {
        let mut versions: Vec<&str> = self
            .packages
            .get(name)
            .map(|list| list.iter().map(|o| o.version.as_str()).collect())
            .unwrap_or_default();
        versions.sort_unstable();
        versions.dedup();
        versions
    }

    /// Total occurrences across all requested targets.
    #[must_use]
    pub fn total(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }
}

/// Query a pre-built graph for the requested targets.
///
/// Linear in the occurrence count; no re-walking per target. Occurrences
/// are ordered by path, compared lexicographically by ancestor names,
/// shallowest first.
#[must_use]
pub fn search_graph(graph: &DependencyGraph, targets: &[String]) -> SearchResult {
    let mut packages: BTreeMap<String, Vec<PackageOccurrence>> = targets
        .iter()
        .map(|target| (target.clone(), Vec::new()))
        .collect();

    for occurrence in &graph.occurrences {
        if let Some(list) = packages.get_mut(&occurrence.name) {
            list.push(occurrence.clone());
        }
    }
    for list in packages.values_mut() {
        list.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.version.cmp(&b.version)));
    }

    SearchResult { packages }
}

/// Single entry point: resolve the kind string, then read -> parse ->
/// normalize -> search. An unknown kind is rejected before any file I/O.
///
/// # Errors
///
/// `UnsupportedManager` for an unknown kind, `NotFound` for a missing
/// lockfile or required manifest, `Parse` for malformed content. All are
/// terminal; a partial result is never returned.
pub fn search_packages(
    kind: &str,
    project_dir: &Path,
    targets: &[String],
) -> Result<SearchResult, SearchError> {
    let manager: PackageManager = kind.parse()?;
    search_with_manager(manager, project_dir, targets)
}

/// As [`search_packages`], for callers already holding the enum.
///
/// # Errors
///
/// `NotFound` for a missing lockfile or required manifest, `Parse` for
/// malformed content.
pub fn search_with_manager(
    manager: PackageManager,
    project_dir: &Path,
    targets: &[String],
) -> Result<SearchResult, SearchError> {
    let lock_path = project_dir.join(manager.lockfile_name());
    debug!(manager = %manager, path = %lock_path.display(), "reading lockfile");
    let content = read_lockfile(&lock_path)?;

    let graph = match manager {
        PackageManager::Npm => {
            let lockfile = npm::parse(&lock_path, &content)?;
            let manifest = if lockfile.needs_manifest() {
                Some(Manifest::read_from(project_dir)?)
            } else {
                None
            };
            npm::normalize(&lockfile, manifest.as_ref(), &lock_path)?
        }
        PackageManager::Pnpm => pnpm::normalize(&pnpm::parse(&lock_path, &content)?),
        PackageManager::Yarn => {
            let lockfile = yarn::parse(&lock_path, &content)?;
            let manifest = Manifest::read_from(project_dir)?;
            yarn::normalize(&lockfile, &manifest)
        }
    };
    debug!(
        occurrences = graph.len(),
        edges = graph.edges.len(),
        "graph normalized"
    );

    Ok(search_graph(&graph, targets))
}

fn read_lockfile(path: &Path) -> Result<String, SearchError> {
    fs::read_to_string(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            SearchError::not_found(path)
        } else {
            SearchError::parse(path, format!("Failed to read: {e}"))
        }
    })
}
