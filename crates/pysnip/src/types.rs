//! Shared type definitions for the pysnip crate
//!
//! This module contains common types that are used across multiple components
//! of the bundler, ensuring consistency and avoiding circular dependencies.

use std::hash::BuildHasherDefault;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHasher;

/// Insertion-ordered map using the Fx hash function
pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Insertion-ordered set using the Fx hash function
pub type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// Classification of a module based on its origin
///
/// Only first-party modules are ever loaded from disk and analysed; every
/// other kind is an opaque module whose attributes are assumed to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// The fixed built-in scope (`builtins`)
    Builtins,

    /// Python standard library modules (e.g., os, sys, json)
    StandardLibrary,

    /// Third-party packages the target environment is known to provide
    ThirdParty,

    /// First-party modules that are part of the project being bundled
    FirstParty,
}

impl ModuleKind {
    /// Check if this is a first-party module
    pub fn is_first_party(&self) -> bool {
        matches!(self, Self::FirstParty)
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Builtins => write!(f, "builtins"),
            Self::StandardLibrary => write!(f, "stdlib"),
            Self::ThirdParty => write!(f, "third-party"),
            Self::FirstParty => write!(f, "first-party"),
        }
    }
}
