//! AST visitor implementations for pysnip
//!
//! This module contains the read-only traversals shared by semantic analysis
//! and reachability collection.

mod binding_collector;
mod call_sites;

pub use binding_collector::{BindingCollector, BindingOrigin, ScopeBindings, bound_name};
pub use call_sites::CallSiteVisitor;
