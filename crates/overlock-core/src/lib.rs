#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

//! Lockfile parsing and dependency-graph search.
//!
//! Three mutually incompatible lockfile formats — npm's nested JSON tree,
//! pnpm's flat key-indexed YAML, and yarn's indentation-based text format —
//! are normalized into one dependency graph model, which a single-pass
//! search queries for every materialized occurrence of a set of target
//! packages: name, exact version, position in the tree, and dev-only
//! status, including duplicated or hoisted copies that differ in version.
//!
//! The entry point is [`search_packages`] (or [`search_with_manager`] for
//! callers already holding a [`PackageManager`]). Each query reads the
//! lockfile fresh, builds a graph owned by that query alone, and discards
//! it once the [`SearchResult`] is produced.

pub mod error;
pub mod graph;
pub mod manager;
pub mod manifest;
pub mod npm;
pub mod pnpm;
pub mod search;
pub mod yarn;

pub use error::{codes, SearchError};
pub use graph::{DependencyEdge, DependencyGraph, EdgeKind, GraphBuilder, PackageOccurrence};
pub use manager::PackageManager;
pub use manifest::Manifest;
pub use search::{
    search_graph, search_packages, search_with_manager, SearchResult, SEARCH_SCHEMA_VERSION,
};
