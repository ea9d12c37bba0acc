//! Binding collector for a single scope
//!
//! Python decides which scope a name belongs to from every binding in the
//! scope body, wherever it occurs. This visitor gathers those names for one
//! body without descending into nested function or class bodies, honouring
//! `global` and `nonlocal` declarations.

use ruff_python_ast::{
    Alias, ExceptHandler, Expr, Pattern, Stmt,
    visitor::source_order::{self, SourceOrderVisitor},
};

use crate::types::{FxIndexMap, FxIndexSet};

/// How a name came to be bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingOrigin {
    /// Bound only by `import` / `from ... import` statements
    Import,
    /// Bound by at least one other statement
    Statement,
}

/// Names bound in one scope body
#[derive(Debug, Default)]
pub struct ScopeBindings {
    /// Local names, in first-binding order
    pub names: FxIndexMap<String, BindingOrigin>,
    /// Names declared `global` in this scope
    pub globals: FxIndexSet<String>,
    /// Names declared `nonlocal` in this scope
    pub nonlocals: FxIndexSet<String>,
    /// Names declared `global` anywhere in nested function or class bodies
    pub nested_globals: FxIndexSet<String>,
    /// Literal value of `__all__`, if assigned
    pub all: Option<Vec<String>>,
}

#[cfg(test)]
impl ScopeBindings {
    pub fn is_local(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Whether every binding of `name` is an import
    pub fn is_import_only(&self, name: &str) -> bool {
        self.names.get(name) == Some(&BindingOrigin::Import)
    }
}

/// Visitor collecting the bindings of one scope body
#[derive(Default)]
pub struct BindingCollector {
    bindings: ScopeBindings,
}

impl BindingCollector {
    /// Collect the bindings of a scope body
    pub fn collect(body: &[Stmt]) -> ScopeBindings {
        let mut collector = Self::default();
        collector.visit_body(body);

        let ScopeBindings {
            names,
            globals,
            nonlocals,
            ..
        } = &mut collector.bindings;
        names.retain(|name, _| !globals.contains(name) && !nonlocals.contains(name));

        collector.bindings
    }

    fn bind(&mut self, name: &str, origin: BindingOrigin) {
        let entry = self.bindings.names.entry(name.to_string()).or_insert(origin);
        if origin == BindingOrigin::Statement {
            *entry = BindingOrigin::Statement;
        }
    }

    /// Extract bound names from an assignment target
    fn collect_from_target(&mut self, target: &Expr) {
        match target {
            Expr::Name(name) => self.bind(&name.id, BindingOrigin::Statement),
            Expr::Tuple(tuple) => {
                for elt in &tuple.elts {
                    self.collect_from_target(elt);
                }
            }
            Expr::List(list) => {
                for elt in &list.elts {
                    self.collect_from_target(elt);
                }
            }
            Expr::Starred(starred) => self.collect_from_target(&starred.value),
            _ => {}
        }
    }

    fn collect_nested_globals(&mut self, body: &[Stmt]) {
        let mut visitor = GlobalDeclVisitor::default();
        source_order::walk_body(&mut visitor, body);
        self.bindings.nested_globals.extend(visitor.names);
    }

    fn record_all(&mut self, value: &Expr, extend: bool) {
        let Some(names) = string_sequence(value) else {
            return;
        };
        match (&mut self.bindings.all, extend) {
            (Some(all), true) => all.extend(names),
            (all, _) => *all = Some(names),
        }
    }
}

impl<'a> SourceOrderVisitor<'a> for BindingCollector {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::FunctionDef(func_def) => {
                self.bind(func_def.name.as_str(), BindingOrigin::Statement);
                // The body is its own scope
                self.collect_nested_globals(&func_def.body);
            }
            Stmt::ClassDef(class_def) => {
                self.bind(class_def.name.as_str(), BindingOrigin::Statement);
                self.collect_nested_globals(&class_def.body);
            }
            Stmt::Assign(assign) => {
                for target in &assign.targets {
                    self.collect_from_target(target);
                }
                if let [Expr::Name(name)] = assign.targets.as_slice()
                    && name.id.as_str() == "__all__"
                {
                    self.record_all(&assign.value, false);
                }
                source_order::walk_stmt(self, stmt);
            }
            Stmt::AugAssign(aug_assign) => {
                self.collect_from_target(&aug_assign.target);
                if let Expr::Name(name) = aug_assign.target.as_ref()
                    && name.id.as_str() == "__all__"
                {
                    self.record_all(&aug_assign.value, true);
                }
                source_order::walk_stmt(self, stmt);
            }
            Stmt::AnnAssign(ann_assign) => {
                self.collect_from_target(&ann_assign.target);
                if let Expr::Name(name) = ann_assign.target.as_ref()
                    && name.id.as_str() == "__all__"
                    && let Some(value) = &ann_assign.value
                {
                    self.record_all(value, false);
                }
                source_order::walk_stmt(self, stmt);
            }
            Stmt::TypeAlias(type_alias) => {
                self.collect_from_target(&type_alias.name);
            }
            Stmt::For(for_stmt) => {
                self.collect_from_target(&for_stmt.target);
                source_order::walk_stmt(self, stmt);
            }
            Stmt::With(with_stmt) => {
                for item in &with_stmt.items {
                    if let Some(ref optional_vars) = item.optional_vars {
                        self.collect_from_target(optional_vars);
                    }
                }
                source_order::walk_stmt(self, stmt);
            }
            Stmt::Delete(delete) => {
                for target in &delete.targets {
                    self.collect_from_target(target);
                }
            }
            Stmt::Import(import) => {
                for alias in &import.names {
                    self.bind(bound_name(alias, false), BindingOrigin::Import);
                }
            }
            Stmt::ImportFrom(import_from) => {
                for alias in &import_from.names {
                    if alias.name.as_str() == "*" {
                        continue;
                    }
                    self.bind(bound_name(alias, true), BindingOrigin::Import);
                }
            }
            Stmt::Global(global_stmt) => {
                self.bindings
                    .globals
                    .extend(global_stmt.names.iter().map(ToString::to_string));
            }
            Stmt::Nonlocal(nonlocal_stmt) => {
                self.bindings
                    .nonlocals
                    .extend(nonlocal_stmt.names.iter().map(ToString::to_string));
            }
            _ => {
                source_order::walk_stmt(self, stmt);
            }
        }
    }

    fn visit_expr(&mut self, expr: &'a Expr) {
        match expr {
            // Assignment expressions bind in the enclosing function scope,
            // even from inside a comprehension
            Expr::Named(named) => {
                self.collect_from_target(&named.target);
                source_order::walk_expr(self, expr);
            }
            // Lambda parameters and bodies belong to the lambda
            Expr::Lambda(_) => {}
            _ => source_order::walk_expr(self, expr),
        }
    }

    fn visit_except_handler(&mut self, handler: &'a ExceptHandler) {
        let ExceptHandler::ExceptHandler(eh) = handler;
        if let Some(ref name) = eh.name {
            self.bind(name.as_str(), BindingOrigin::Statement);
        }
        source_order::walk_except_handler(self, handler);
    }

    fn visit_pattern(&mut self, pattern: &'a Pattern) {
        match pattern {
            Pattern::MatchAs(match_as) => {
                if let Some(name) = &match_as.name {
                    self.bind(name.as_str(), BindingOrigin::Statement);
                }
            }
            Pattern::MatchStar(match_star) => {
                if let Some(name) = &match_star.name {
                    self.bind(name.as_str(), BindingOrigin::Statement);
                }
            }
            Pattern::MatchMapping(mapping) => {
                if let Some(rest) = &mapping.rest {
                    self.bind(rest.as_str(), BindingOrigin::Statement);
                }
            }
            _ => {}
        }
        source_order::walk_pattern(self, pattern);
    }
}

/// Name an import alias binds in the importing scope
///
/// `import a.b.c` binds `a`; every other form binds the alias or the name.
pub fn bound_name(alias: &Alias, from_import: bool) -> &str {
    match &alias.asname {
        Some(asname) => asname.as_str(),
        None if from_import => alias.name.as_str(),
        None => alias.name.as_str().split('.').next().unwrap_or_default(),
    }
}

/// Collects every name declared `global`, at any nesting depth
#[derive(Default)]
struct GlobalDeclVisitor {
    names: FxIndexSet<String>,
}

impl<'a> SourceOrderVisitor<'a> for GlobalDeclVisitor {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        if let Stmt::Global(global_stmt) = stmt {
            self.names
                .extend(global_stmt.names.iter().map(ToString::to_string));
        }
        source_order::walk_stmt(self, stmt);
    }
}

/// String elements of a list or tuple literal
fn string_sequence(expr: &Expr) -> Option<Vec<String>> {
    let elts = match expr {
        Expr::List(list) => &list.elts,
        Expr::Tuple(tuple) => &tuple.elts,
        _ => return None,
    };
    elts.iter()
        .map(|elt| match elt {
            Expr::StringLiteral(string) => Some(string.value.to_str().to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use ruff_python_parser::parse_module;

    use super::*;

    fn collect(source: &str) -> ScopeBindings {
        let module = parse_module(source).expect("Failed to parse").into_syntax();
        BindingCollector::collect(&module.body)
    }

    #[test]
    fn test_collect_basic_bindings() {
        let bindings = collect(
            r"
x = 1
a, (b, *c) = 1, (2, 3)
def foo():
    inner = 1
class Bar:
    attr = 2
type Alias = int
",
        );

        let names: Vec<&str> = bindings.names.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["x", "a", "b", "c", "foo", "Bar", "Alias"]);
    }

    #[test]
    fn test_nested_control_flow_binds_at_module_scope() {
        let bindings = collect(
            r"
if True:
    from os import path
else:
    path = None
try:
    import numpy as np
except ImportError as err:
    pass
for i in range(3):
    with open('f') as fh:
        pass
while (n := 0):
    pass
match value:
    case {'k': v, **rest}:
        pass
    case [first, *others]:
        pass
",
        );

        for name in ["path", "np", "err", "i", "fh", "n", "v", "rest", "first", "others"] {
            assert!(bindings.is_local(name), "{name} should be bound");
        }
        assert!(!bindings.is_local("value"));
    }

    #[test]
    fn test_import_only_tracking() {
        let bindings = collect(
            r"
import pkg.sub
from util import helper, other as renamed
from util import shadowed
def shadowed():
    pass
from star import *
",
        );

        assert!(bindings.is_import_only("pkg"));
        assert!(bindings.is_import_only("helper"));
        assert!(bindings.is_import_only("renamed"));
        assert!(!bindings.is_import_only("shadowed"));
        assert!(!bindings.is_local("*"));
    }

    #[test]
    fn test_respect_global_and_nonlocal() {
        let module = parse_module(
            r"
def outer():
    total = 0
    def inner():
        global counter
        nonlocal total
        counter = 1
        total = 2
        kept = 3
",
        )
        .expect("Failed to parse")
        .into_syntax();
        let Stmt::FunctionDef(outer) = &module.body[0] else {
            panic!("expected function");
        };
        let Stmt::FunctionDef(inner) = &outer.body[1] else {
            panic!("expected nested function");
        };
        let bindings = BindingCollector::collect(&inner.body);

        assert!(!bindings.is_local("counter"));
        assert!(!bindings.is_local("total"));
        assert!(bindings.is_local("kept"));
        assert!(bindings.globals.contains("counter"));
        assert!(bindings.nonlocals.contains("total"));
    }

    #[test]
    fn test_nested_scopes_are_not_collected() {
        let bindings = collect(
            r"
def outer():
    def inner():
        global configured
        configured = True
    local = 1
squares = [y for y in range(3)]
fn = lambda z: z
",
        );

        assert!(!bindings.is_local("local"));
        assert!(!bindings.is_local("y"));
        assert!(!bindings.is_local("z"));
        assert!(bindings.nested_globals.contains("configured"));
    }

    #[test]
    fn test_dunder_all_literal() {
        let bindings = collect(
            r#"
__all__ = ["a", "b"]
__all__ += ("c",)
"#,
        );
        assert_eq!(
            bindings.all,
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );

        let dynamic = collect("__all__ = names()\n");
        assert_eq!(dynamic.all, None);
    }
}
