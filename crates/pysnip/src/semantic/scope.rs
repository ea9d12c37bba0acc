//! Lexical scopes used while walking a module

use crate::{
    semantic::module::{Binding, ModuleId, ScopeId, SymbolId},
    types::{FxIndexMap, FxIndexSet},
    visitors::ScopeBindings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Lambda,
    Comprehension,
}

impl ScopeKind {
    /// Whether assignment expressions inside this scope bind here
    pub fn owns_named_targets(&self) -> bool {
        !matches!(self, Self::Comprehension)
    }
}

/// One entry of the checker's scope stack
///
/// The module scope keeps no bindings of its own: module-scope names live in
/// the shared module namespace.
#[derive(Debug)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    bindings: FxIndexMap<String, Binding>,
    globals: FxIndexSet<String>,
    nonlocals: FxIndexSet<String>,
}

impl Scope {
    pub fn module() -> Self {
        Self {
            id: ScopeId::MODULE,
            kind: ScopeKind::Module,
            bindings: FxIndexMap::default(),
            globals: FxIndexSet::default(),
            nonlocals: FxIndexSet::default(),
        }
    }

    /// Create a nested scope whose locals are the collected bindings plus `extra`
    pub fn nested<'n>(
        module: ModuleId,
        id: ScopeId,
        kind: ScopeKind,
        collected: ScopeBindings,
        extra: impl IntoIterator<Item = &'n str>,
    ) -> Self {
        let mut scope = Self {
            id,
            kind,
            bindings: FxIndexMap::default(),
            globals: collected.globals,
            nonlocals: collected.nonlocals,
        };
        for name in collected.names.into_keys() {
            scope.declare(module, &name);
        }
        for name in extra {
            if !scope.globals.contains(name) && !scope.nonlocals.contains(name) {
                scope.declare(module, name);
            }
        }
        scope
    }

    fn declare(&mut self, module: ModuleId, name: &str) {
        let scope = self.id;
        self.bindings
            .entry(name.to_string())
            .or_insert_with(|| Binding::Symbol(SymbolId::new(module, scope, name)));
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Rebind a local name, as a function-local import does
    pub fn rebind(&mut self, name: &str, binding: Binding) {
        self.bindings.insert(name.to_string(), binding);
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    pub fn is_nonlocal(&self, name: &str) -> bool {
        self.nonlocals.contains(name)
    }
}
