//! Standard library detection utilities
//!
//! This module provides the single source of truth for deciding whether a
//! module is assumed to be available in the target environment. Such modules
//! are never loaded, analysed or inlined.

use ruff_python_stdlib::{builtins, sys};

use crate::types::FxIndexSet;

/// Python minor version used when none is configured (3.12)
pub const DEFAULT_PYTHON_MINOR: u8 = 12;

/// Classifies module names as "always available" for the target environment.
///
/// Built once per process, before any resolution starts, and handed to the
/// symbol resolver and the declaration index builder by reference.
#[derive(Debug, Clone)]
pub struct StdlibClassifier {
    /// Python minor version (e.g., 12 for Python 3.12)
    python_minor: u8,
    /// Top-level third-party packages the judge environment provides
    always_available: FxIndexSet<String>,
}

impl Default for StdlibClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_PYTHON_MINOR, FxIndexSet::default())
    }
}

impl StdlibClassifier {
    pub fn new(python_minor: u8, always_available: FxIndexSet<String>) -> Self {
        Self {
            python_minor,
            always_available,
        }
    }

    pub fn python_minor(&self) -> u8 {
        self.python_minor
    }

    /// Check if a module name is assumed to always be available
    ///
    /// Covers the standard library (including submodules such as `os.path`),
    /// `__future__`, and the configured third-party packages. Relative
    /// import paths, empty names and the `.`/`_` pseudo-names never match.
    pub fn is_standard(&self, module_name: &str) -> bool {
        self.is_stdlib_module(module_name) || self.is_known_third_party(module_name)
    }

    /// Check if a module name represents a Python standard library module
    pub fn is_stdlib_module(&self, module_name: &str) -> bool {
        if module_name.is_empty() || module_name.starts_with('.') {
            return false;
        }

        // __future__ is not part of ruff's stdlib table
        if module_name == "__future__" {
            return true;
        }

        if sys::is_known_standard_library(self.python_minor, module_name) {
            return true;
        }

        // Submodule of a stdlib module
        top_level(module_name)
            .is_some_and(|top| sys::is_known_standard_library(self.python_minor, top))
    }

    /// Check if a module belongs to a configured always-available package
    pub fn is_known_third_party(&self, module_name: &str) -> bool {
        top_level(module_name).is_some_and(|top| self.always_available.contains(top))
    }
}

/// Check if a name is provided by the built-in scope of the given Python version
pub fn is_builtin_name(name: &str, python_minor: u8) -> bool {
    builtins::is_python_builtin(name, python_minor, false)
}

fn top_level(module_name: &str) -> Option<&str> {
    module_name.split('.').next().filter(|top| !top.is_empty())
}
