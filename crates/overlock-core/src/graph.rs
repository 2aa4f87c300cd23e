//! Unified dependency graph model.
//!
//! All three lockfile formats normalize into this model before any search
//! runs. Occurrence indices are the node identity; edges reference
//! occurrences by index, and a declared-but-unresolved requirement keeps
//! its edge with `to: None` rather than being dropped.

use serde::Serialize;
use std::collections::VecDeque;

/// One materialized instance of a package in the dependency tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageOccurrence {
    /// Package name (e.g. "react" or "@scope/pkg").
    pub name: String,
    /// Resolved exact version, never a range.
    pub version: String,
    /// Ancestor package names from the root down to (not including) this
    /// occurrence. Empty for top-level packages.
    pub path: Vec<String>,
    /// True when the occurrence is reachable only through dev-only edges.
    pub dev_only: bool,
}

/// Kind of a declared dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Runtime,
    Dev,
    Peer,
    Optional,
}

/// A directed edge from a parent occurrence to a declared requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    /// Index of the declaring occurrence; `None` for root/importer edges.
    pub from: Option<usize>,
    /// Declared dependency name.
    pub name: String,
    /// Declared constraint: a range, an exact version, or a
    /// workspace/link marker, exactly as the lockfile records it.
    pub constraint: String,
    /// Edge kind.
    pub kind: EdgeKind,
    /// Index of the occurrence satisfying the edge; `None` when the
    /// requirement is declared but not materialized (e.g. an uninstalled
    /// optional peer).
    pub to: Option<usize>,
}

/// The normalized dependency graph for one project query.
///
/// Built fresh from lockfile content for every query, immutable once
/// built, and discarded after the search consumes it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DependencyGraph {
    /// Every materialized package instance, in deterministic build order.
    pub occurrences: Vec<PackageOccurrence>,
    /// Every declared dependency edge, resolved or not.
    pub edges: Vec<DependencyEdge>,
    /// Indices of occurrences satisfying top-level declared dependencies.
    pub roots: Vec<usize>,
}

impl DependencyGraph {
    /// Number of occurrences in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.occurrences.len()
    }

    /// True when the graph holds no occurrences.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.occurrences.is_empty()
    }
}

/// Incremental builder used by the per-format normalizers.
///
/// Normalizers add occurrences and edges in their format's deterministic
/// order; `finish` wires up root indices and resolves dev-only marking.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    occurrences: Vec<PackageOccurrence>,
    edges: Vec<DependencyEdge>,
}

impl GraphBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an occurrence, returning its index.
    ///
    /// Callers guarantee `(name, path)` uniqueness; the builder does not
    /// re-check it on the hot path.
    pub fn add_occurrence(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        path: Vec<String>,
    ) -> usize {
        let idx = self.occurrences.len();
        self.occurrences.push(PackageOccurrence {
            name: name.into(),
            version: version.into(),
            path,
            dev_only: false,
        });
        idx
    }

    /// Add a top-level (root or importer) dependency edge.
    pub fn add_root_edge(
        &mut self,
        name: impl Into<String>,
        constraint: impl Into<String>,
        kind: EdgeKind,
        to: Option<usize>,
    ) {
        self.edges.push(DependencyEdge {
            from: None,
            name: name.into(),
            constraint: constraint.into(),
            kind,
            to,
        });
    }

    /// Add a dependency edge declared by an existing occurrence.
    pub fn add_edge(
        &mut self,
        from: usize,
        name: impl Into<String>,
        constraint: impl Into<String>,
        kind: EdgeKind,
        to: Option<usize>,
    ) {
        self.edges.push(DependencyEdge {
            from: Some(from),
            name: name.into(),
            constraint: constraint.into(),
            kind,
            to,
        });
    }

    /// Number of occurrences added so far.
    #[must_use]
    pub fn occurrence_count(&self) -> usize {
        self.occurrences.len()
    }

    /// Finalize the graph: collect roots and resolve dev-only marking.
    ///
    /// An occurrence is dev-only when it is reachable from a dev root
    /// (or through a dev edge) but not reachable from any non-dev root
    /// through non-dev edges.
    #[must_use]
    pub fn finish(mut self) -> DependencyGraph {
        let n = self.occurrences.len();
        let mut roots = Vec::new();
        let mut non_dev_seeds = Vec::new();
        let mut dev_seeds = Vec::new();
        let mut adj_non_dev: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut adj_all: Vec<Vec<usize>> = vec![Vec::new(); n];

        for edge in &self.edges {
            let Some(to) = edge.to else { continue };
            match edge.from {
                None => {
                    roots.push(to);
                    if edge.kind == EdgeKind::Dev {
                        dev_seeds.push(to);
                    } else {
                        non_dev_seeds.push(to);
                    }
                }
                Some(from) => {
                    adj_all[from].push(to);
                    if edge.kind == EdgeKind::Dev {
                        dev_seeds.push(to);
                    } else {
                        adj_non_dev[from].push(to);
                    }
                }
            }
        }

        let non_dev_reach = reachable(&adj_non_dev, &non_dev_seeds, n);
        let dev_reach = reachable(&adj_all, &dev_seeds, n);

        for (idx, occurrence) in self.occurrences.iter_mut().enumerate() {
            occurrence.dev_only = dev_reach[idx] && !non_dev_reach[idx];
        }

        DependencyGraph {
            occurrences: self.occurrences,
            edges: self.edges,
            roots,
        }
    }
}

fn reachable(adj: &[Vec<usize>], seeds: &[usize], n: usize) -> Vec<bool> {
    let mut seen = vec![false; n];
    let mut queue: VecDeque<usize> = VecDeque::new();
    for &seed in seeds {
        if !seen[seed] {
            seen[seed] = true;
            queue.push_back(seed);
        }
    }
    while let Some(idx) = queue.pop_front() {
        for &next in &adj[idx] {
            if !seen[next] {
                seen[next] = true;
                queue.push_back(next);
            }
        }
    }
    seen
}
