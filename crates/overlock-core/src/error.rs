//! Error types for the lockfile search pipeline.
//!
//! Every failure is one of three terminal kinds: a missing file, content
//! that could not be parsed, or an unknown package manager kind. None are
//! retried and none produce a partial search result.

use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes, mirrored in `--json` output.
pub mod codes {
    /// Lockfile (or required manifest) missing from the project directory.
    pub const LOCKFILE_NOT_FOUND: &str = "LOCKFILE_NOT_FOUND";
    /// Lockfile or manifest content could not be parsed.
    pub const LOCKFILE_PARSE_FAILED: &str = "LOCKFILE_PARSE_FAILED";
    /// The supplied package manager kind is not in the supported set.
    pub const PKG_MANAGER_UNSUPPORTED: &str = "PKG_MANAGER_UNSUPPORTED";
}

/// Error raised while reading, parsing, or searching a lockfile.
#[derive(Error, Debug)]
pub enum SearchError {
    /// A file the query depends on does not exist.
    #[error("File not found: {}", .path.display())]
    NotFound {
        /// Path that was expected to exist.
        path: PathBuf,
    },

    /// The file exists but its content could not be interpreted.
    #[error("Failed to parse {}{}: {}", .path.display(), fmt_line(.line), .message)]
    Parse {
        /// Path of the offending file.
        path: PathBuf,
        /// 1-based line number, when the underlying parser reports one.
        line: Option<usize>,
        /// What went wrong.
        message: String,
    },

    /// The caller supplied a kind outside the supported enumeration.
    #[error("Unsupported package manager: {kind}")]
    UnsupportedManager {
        /// The kind string as received.
        kind: String,
    },
}

impl SearchError {
    /// Create a not-found error for a path.
    #[must_use]
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a parse error without location information.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line: None,
            message: message.into(),
        }
    }

    /// Create a parse error pointing at a 1-based line.
    #[must_use]
    pub fn parse_at(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line: Some(line),
            message: message.into(),
        }
    }

    /// Create an unsupported-manager error naming the received value.
    #[must_use]
    pub fn unsupported(kind: impl Into<String>) -> Self {
        Self::UnsupportedManager { kind: kind.into() }
    }

    /// Get the stable error code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => codes::LOCKFILE_NOT_FOUND,
            Self::Parse { .. } => codes::LOCKFILE_PARSE_FAILED,
            Self::UnsupportedManager { .. } => codes::PKG_MANAGER_UNSUPPORTED,
        }
    }
}

fn fmt_line(line: &Option<usize>) -> String {
    line.map_or_else(String::new, |l| format!(" (line {l})"))
}
