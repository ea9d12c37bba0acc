//! Module objects and symbol identities produced by semantic analysis

use std::{
    cell::{Ref, RefCell},
    fmt,
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::types::{FxIndexMap, ModuleKind};

/// Identifier of an analysed module, unique per bundling run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    /// The fixed built-in scope
    pub const BUILTINS: Self = Self(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Identifier of a scope inside one module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The module namespace
    pub const MODULE: Self = Self(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn is_module(&self) -> bool {
        self.0 == 0
    }
}

/// Globally unique identity of a named entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId {
    pub module: ModuleId,
    pub scope: ScopeId,
    pub name: String,
}

impl SymbolId {
    pub fn new(module: ModuleId, scope: ScopeId, name: impl Into<String>) -> Self {
        Self {
            module,
            scope,
            name: name.into(),
        }
    }

    /// Identity of a module-scope name
    pub fn global(module: ModuleId, name: impl Into<String>) -> Self {
        Self::new(module, ScopeId::MODULE, name)
    }

    pub fn is_global(&self) -> bool {
        self.scope.is_module()
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "{}::{}", self.module, self.name)
        } else {
            write!(f, "{}::s{}::{}", self.module, self.scope.0, self.name)
        }
    }
}

/// What a resolved identifier occurrence refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Referent {
    Symbol(SymbolId),
    Module(ModuleId),
}

impl Referent {
    pub fn as_symbol(&self) -> Option<&SymbolId> {
        match self {
            Self::Symbol(symbol) => Some(symbol),
            Self::Module(_) => None,
        }
    }
}

/// Value bound to a name in a namespace
#[derive(Clone)]
pub enum Binding {
    Symbol(SymbolId),
    Module(Rc<Module>),
}

impl Binding {
    pub fn referent(&self) -> Referent {
        match self {
            Self::Symbol(symbol) => Referent::Symbol(symbol.clone()),
            Self::Module(module) => Referent::Module(module.id()),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(symbol) => write!(f, "Symbol({symbol})"),
            Self::Module(module) => write!(f, "Module({})", module.name()),
        }
    }
}

/// An analysed (or opaque) module
///
/// Modules are shared as `Rc<Module>` between the resolution cache, the
/// namespaces of importing modules and the parent's submodule table. The
/// namespace is filled while the module is being analysed, so circular
/// importers observe it through `RefCell`s.
pub struct Module {
    id: ModuleId,
    name: String,
    kind: ModuleKind,
    /// Module file, or directory of a namespace package; `None` for opaque modules
    location: Option<PathBuf>,
    is_package: bool,
    namespace: RefCell<FxIndexMap<String, Binding>>,
    submodules: RefCell<FxIndexMap<String, Rc<Module>>>,
    /// Opaque modules star-imported into this one
    star_sources: RefCell<Vec<Rc<Module>>>,
    all: RefCell<Option<Vec<String>>>,
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl Module {
    pub fn new(
        id: ModuleId,
        name: impl Into<String>,
        kind: ModuleKind,
        location: Option<PathBuf>,
        is_package: bool,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            location,
            is_package,
            namespace: RefCell::default(),
            submodules: RefCell::default(),
            star_sources: RefCell::default(),
            all: RefCell::default(),
        }
    }

    pub fn builtins() -> Self {
        Self::new(ModuleId::BUILTINS, "builtins", ModuleKind::Builtins, None, false)
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn is_package(&self) -> bool {
        self.is_package
    }

    /// Whether the module has not been analysed and accepts any attribute
    pub fn is_opaque(&self) -> bool {
        !self.kind.is_first_party()
    }

    pub fn bind(&self, name: impl Into<String>, binding: Binding) {
        self.namespace.borrow_mut().insert(name.into(), binding);
    }

    /// Look a name up in the module namespace only
    pub fn lookup(&self, name: &str) -> Option<Binding> {
        self.namespace.borrow().get(name).cloned()
    }

    pub fn namespace(&self) -> Ref<'_, FxIndexMap<String, Binding>> {
        self.namespace.borrow()
    }

    pub fn add_submodule(&self, name: impl Into<String>, module: Rc<Module>) {
        self.submodules.borrow_mut().insert(name.into(), module);
    }

    pub fn submodule(&self, name: &str) -> Option<Rc<Module>> {
        self.submodules.borrow().get(name).cloned()
    }

    pub fn add_star_source(&self, module: Rc<Module>) {
        let mut sources = self.star_sources.borrow_mut();
        if !sources.iter().any(|existing| Rc::ptr_eq(existing, &module)) {
            sources.push(module);
        }
    }

    pub fn star_sources(&self) -> Vec<Rc<Module>> {
        self.star_sources.borrow().clone()
    }

    pub fn set_all(&self, names: Vec<String>) {
        *self.all.borrow_mut() = Some(names);
    }

    /// Whether the module defines a module-level `__getattr__`
    pub fn has_getattr(&self) -> bool {
        self.namespace.borrow().contains_key("__getattr__")
    }

    /// Attribute access `module.name`
    ///
    /// Namespace bindings take precedence over imported submodules. Opaque
    /// modules resolve every attribute to one of their own symbols.
    pub fn member(&self, name: &str) -> Option<Binding> {
        if let Some(binding) = self.lookup(name) {
            return Some(binding);
        }
        if let Some(submodule) = self.submodule(name) {
            return Some(Binding::Module(submodule));
        }
        if self.is_opaque() {
            return Some(Binding::Symbol(SymbolId::global(self.id, name)));
        }
        None
    }

    /// Names copied by `from module import *`
    pub fn star_exports(&self) -> Vec<(String, Binding)> {
        let namespace = self.namespace.borrow();
        match &*self.all.borrow() {
            Some(all) => all
                .iter()
                .filter_map(|name| {
                    namespace
                        .get(name)
                        .cloned()
                        .or_else(|| self.submodule(name).map(Binding::Module))
                        .map(|binding| (name.clone(), binding))
                })
                .collect(),
            None => namespace
                .iter()
                .filter(|(name, _)| !name.starts_with('_'))
                .map(|(name, binding)| (name.clone(), binding.clone()))
                .collect(),
        }
    }
}
