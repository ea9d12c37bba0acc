//! Error kinds produced by a bundling run
//!
//! Every failure is fatal: the first error anywhere in the import graph aborts
//! the run and no partial bundle is produced.

use std::{
    io,
    path::{Path, PathBuf},
};

use ruff_python_parser::ParseError;
use ruff_text_size::TextRange;
use thiserror::Error;

use crate::ast_indexer::NodeLimitExceeded;

/// Result alias used throughout the library
pub type BundleResult<T> = Result<T, BundleError>;

#[derive(Debug, Error)]
pub enum BundleError {
    /// The entry path cannot be made absolute or read
    #[error("cannot resolve entry file {}: {source}", path.display())]
    PathResolution { path: PathBuf, source: io::Error },

    /// Syntax error in the entry file or any loaded module
    #[error("{}:{line}:{column}: syntax error: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    /// No module matches an import, or its file cannot be read
    #[error("cannot load module `{import_path}` (imported from {}): {reason}", origin_dir.display())]
    PackageLoad {
        import_path: String,
        origin_dir: PathBuf,
        reason: String,
    },

    /// Semantic analysis rejected a file in the closure
    #[error("{}:{line}:{column}: {message}", path.display())]
    TypeCheck {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    /// The final tree cannot be rendered as valid source
    #[error("cannot render bundle: {message}")]
    Serialization { message: String },
}

impl BundleError {
    pub fn parse(path: &Path, source: &str, error: &ParseError) -> Self {
        let (line, column) = line_column(source, error.location);
        Self::Parse {
            path: path.to_path_buf(),
            line,
            column,
            message: error.error.to_string(),
        }
    }

    pub fn type_check(path: &Path, source: &str, range: TextRange, message: String) -> Self {
        let (line, column) = line_column(source, range);
        Self::TypeCheck {
            path: path.to_path_buf(),
            line,
            column,
            message,
        }
    }

    /// A file too large to number is rejected like unparsable source
    pub fn node_limit(path: &Path, error: NodeLimitExceeded) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            line: 1,
            column: 1,
            message: error.to_string(),
        }
    }

    pub fn not_found(import_path: &str, origin_dir: &Path) -> Self {
        Self::PackageLoad {
            import_path: import_path.to_string(),
            origin_dir: origin_dir.to_path_buf(),
            reason: "no matching module found".to_string(),
        }
    }

    /// Process exit status reported by the CLI for this error kind
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::PathResolution { .. } => 2,
            Self::Parse { .. } => 3,
            Self::PackageLoad { .. } => 4,
            Self::TypeCheck { .. } => 5,
            Self::Serialization { .. } => 6,
        }
    }
}

/// One-based line and column of the start of `range`
fn line_column(source: &str, range: TextRange) -> (usize, usize) {
    let offset = usize::from(range.start()).min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}
