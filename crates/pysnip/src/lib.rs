//! pysnip: fold a multi-module Python program into one source file
//!
//! Only the declarations reachable from the entry file's call sites are
//! appended, in dependency order, after the entry file's own statements.

pub mod ast_indexer;
pub mod bundler;
pub mod config;
pub mod declaration_index;
pub mod emitter;
pub mod error;
pub mod loader;
pub mod reachability;
pub mod semantic;
pub mod stdlib_detection;
pub mod types;
pub mod visitors;

pub use bundler::{BundleOptions, BundleOutput, Bundler};
pub use error::{BundleError, BundleResult};
