//! Semantic analysis of one module file
//!
//! The checker runs three passes over a file:
//!
//! 1. every module-scope binding is entered into the module namespace as a
//!    placeholder, so circular importers see a complete namespace;
//! 2. module-scope imports are resolved in source order, and names bound
//!    purely by imports are rebound to what they import;
//! 3. the whole file is walked with a scope stack, recording every
//!    definition and every resolved use in the use-def table.

use std::{
    mem,
    path::{Path, PathBuf},
    rc::Rc,
};

use log::trace;
use ruff_python_ast::{
    Alias, Comprehension, Expr, ExprAttribute, ExprContext, ExprLambda, ExprName, ModModule,
    NodeIndex, Parameters, Stmt, StmtClassDef, StmtFunctionDef, TypeParam, TypeParams,
    visitor::{
        Visitor,
        source_order::{self, SourceOrderVisitor},
        walk_expr, walk_stmt,
    },
};
use ruff_text_size::TextRange;

use super::{
    Importer,
    module::{Binding, Module, ModuleId, Referent, ScopeId, SymbolId},
    scope::{Scope, ScopeKind},
    table::UseDefTable,
};
use crate::{
    error::{BundleError, BundleResult},
    stdlib_detection::{DEFAULT_PYTHON_MINOR, is_builtin_name},
    visitors::{BindingCollector, BindingOrigin, ScopeBindings, bound_name},
};

/// Names every module namespace provides implicitly
const MODULE_DUNDERS: &[&str] = &[
    "__name__",
    "__file__",
    "__doc__",
    "__package__",
    "__spec__",
    "__loader__",
    "__builtins__",
    "__path__",
    "__annotations__",
    "__dict__",
    "__cached__",
];

/// Settings shared by every checker of a run
#[derive(Debug, Clone, Copy)]
pub struct CheckConfig {
    /// Python minor version whose built-in scope is assumed
    pub python_minor: u8,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            python_minor: DEFAULT_PYTHON_MINOR,
        }
    }
}

/// Analyses one file of a module, dispatching imports through an [`Importer`]
pub struct Checker<'a> {
    config: &'a CheckConfig,
    importer: &'a mut dyn Importer,
    module: Rc<Module>,
    path: &'a Path,
    source: &'a str,
    origin_dir: PathBuf,
    table: UseDefTable,
    scopes: Vec<Scope>,
    next_scope: u32,
    annotation_depth: usize,
    /// Set while visiting the target of an assignment expression
    named_target: bool,
    /// First error found by the walk; the walk stops once set
    error: Option<BundleError>,
}

impl<'a> Checker<'a> {
    pub fn new(
        config: &'a CheckConfig,
        importer: &'a mut dyn Importer,
        module: Rc<Module>,
        path: &'a Path,
        source: &'a str,
    ) -> Self {
        Self {
            config,
            importer,
            module,
            path,
            source,
            origin_dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            table: UseDefTable::default(),
            scopes: Vec::new(),
            next_scope: 0,
            annotation_depth: 0,
            named_target: false,
            error: None,
        }
    }

    /// Run all passes and return the definitions and uses found in the file
    pub fn check(mut self, ast: &ModModule) -> BundleResult<UseDefTable> {
        let bindings = BindingCollector::collect(&ast.body);
        self.declare_module_bindings(&bindings);

        for stmt in ModuleImports::collect(&ast.body) {
            for (name, binding) in self.resolve_import(stmt)? {
                // Names also bound by other statements keep their own identity
                if !matches!(bindings.names.get(&name), Some(BindingOrigin::Statement)) {
                    self.module.bind(name, binding);
                }
            }
        }

        self.scopes.push(Scope::module());
        self.visit_body(&ast.body);
        self.scopes.pop();

        match self.error.take() {
            Some(err) => Err(err),
            None => {
                trace!(
                    "Checked {}: {} definitions, {} uses",
                    self.path.display(),
                    self.table.def_count(),
                    self.table.use_count()
                );
                Ok(self.table)
            }
        }
    }

    fn declare_module_bindings(&self, bindings: &ScopeBindings) {
        let module_id = self.module.id();
        for name in bindings.names.keys().chain(&bindings.nested_globals) {
            if self.module.lookup(name).is_none() {
                self.module
                    .bind(name.clone(), Binding::Symbol(SymbolId::global(module_id, name.clone())));
            }
        }
        if let Some(all) = &bindings.all {
            self.module.set_all(all.clone());
        }
    }

    /// Resolve an import statement to the names it binds
    fn resolve_import(&mut self, stmt: &Stmt) -> BundleResult<Vec<(String, Binding)>> {
        let mut imported = Vec::new();
        match stmt {
            Stmt::Import(import) => {
                for alias in &import.names {
                    let parts: Vec<&str> = alias.name.as_str().split('.').collect();
                    let mut top: Option<Rc<Module>> = None;
                    let mut parent: Option<Rc<Module>> = None;
                    for (depth, part) in parts.iter().enumerate() {
                        let path = parts[..=depth].join(".");
                        let module = self.importer.import_from(&path, &self.origin_dir)?;
                        if let Some(parent) = &parent {
                            parent.add_submodule(*part, Rc::clone(&module));
                        }
                        top.get_or_insert_with(|| Rc::clone(&module));
                        parent = Some(module);
                    }

                    let bound = if alias.asname.is_some() { parent } else { top };
                    if let Some(module) = bound {
                        imported.push((bound_name(alias, false).to_string(), Binding::Module(module)));
                    }
                }
            }
            Stmt::ImportFrom(import_from) => {
                let path = format!(
                    "{}{}",
                    ".".repeat(import_from.level as usize),
                    import_from
                        .module
                        .as_ref()
                        .map(|module| module.as_str())
                        .unwrap_or_default()
                );
                let source = self.importer.import_from(&path, &self.origin_dir)?;

                for alias in &import_from.names {
                    if alias.name.as_str() == "*" {
                        if source.is_opaque() {
                            self.module.add_star_source(Rc::clone(&source));
                        } else {
                            imported.extend(source.star_exports());
                        }
                        continue;
                    }
                    let binding = self.import_member(&source, &path, alias)?;
                    imported.push((bound_name(alias, true).to_string(), binding));
                }
            }
            _ => {}
        }
        Ok(imported)
    }

    /// `from <path> import <alias>`: a namespace member, else a submodule
    fn import_member(
        &mut self,
        source: &Rc<Module>,
        path: &str,
        alias: &Alias,
    ) -> BundleResult<Binding> {
        let name = alias.name.as_str();
        if let Some(binding) = source.member(name) {
            return Ok(binding);
        }

        if source.is_package()
            && let Some(submodule) = self
                .importer
                .try_import_from(&join_import_path(path, name), &self.origin_dir)?
        {
            source.add_submodule(name, Rc::clone(&submodule));
            return Ok(Binding::Module(submodule));
        }

        if source.has_getattr() {
            return Ok(Binding::Symbol(SymbolId::global(source.id(), name)));
        }

        Err(BundleError::type_check(
            self.path,
            self.source,
            alias.range,
            format!("cannot import name `{name}` from `{}`", source.name()),
        ))
    }

    fn fail(&mut self, range: TextRange, message: String) {
        let err = BundleError::type_check(self.path, self.source, range, message);
        self.abort(err);
    }

    fn abort(&mut self, err: BundleError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn allocate_scope(&mut self) -> ScopeId {
        self.next_scope += 1;
        ScopeId::new(self.next_scope)
    }

    fn innermost_kind(&self) -> ScopeKind {
        self.scopes.last().map_or(ScopeKind::Module, |scope| scope.kind)
    }

    /// Resolve a name read at the current position (LEGB)
    ///
    /// Class scopes are only visible from their own body, not from functions
    /// nested inside them.
    fn resolve_name(&self, name: &str) -> Option<Binding> {
        let innermost = self.scopes.len().saturating_sub(1);
        for (depth, scope) in self.scopes.iter().enumerate().rev() {
            match scope.kind {
                ScopeKind::Module => break,
                ScopeKind::Class if depth != innermost => continue,
                _ => {}
            }
            if scope.is_global(name) {
                break;
            }
            if scope.is_nonlocal(name) {
                continue;
            }
            if let Some(binding) = scope.get(name) {
                return Some(binding.clone());
            }
        }
        self.resolve_global(name)
    }

    fn resolve_global(&self, name: &str) -> Option<Binding> {
        if let Some(binding) = self.module.lookup(name) {
            return Some(binding);
        }
        if MODULE_DUNDERS.contains(&name) {
            return Some(Binding::Symbol(SymbolId::global(self.module.id(), name)));
        }
        if is_builtin_name(name, self.config.python_minor) {
            return Some(Binding::Symbol(SymbolId::global(ModuleId::BUILTINS, name)));
        }
        // Names from `from <opaque> import *` cannot be enumerated
        self.module
            .star_sources()
            .first()
            .map(|source| Binding::Symbol(SymbolId::global(source.id(), name)))
    }

    /// Scope a store to `name` binds in
    fn store_scope(&self, name: &str) -> ScopeId {
        let named_target = self.named_target;
        let mut enclosing = self
            .scopes
            .iter()
            .rev()
            .skip_while(|scope| named_target && !scope.kind.owns_named_targets());

        let Some(scope) = enclosing.next() else {
            return ScopeId::MODULE;
        };
        if scope.kind == ScopeKind::Module || scope.is_global(name) {
            return ScopeId::MODULE;
        }
        if scope.is_nonlocal(name) {
            return enclosing
                .filter(|outer| matches!(outer.kind, ScopeKind::Function | ScopeKind::Lambda))
                .find(|outer| outer.has_local(name))
                .map_or(ScopeId::MODULE, |outer| outer.id);
        }
        scope.id
    }

    fn define(&mut self, node: NodeIndex, name: &str) {
        let symbol = SymbolId::new(self.module.id(), self.store_scope(name), name);
        self.table.record_def(node, symbol);
    }

    fn visit_name(&mut self, name: &ExprName) {
        match name.ctx {
            ExprContext::Store => self.define(name.node_index.load(), name.id.as_str()),
            ExprContext::Load | ExprContext::Del => {
                if let Some(binding) = self.resolve_name(name.id.as_str()) {
                    self.table
                        .record_use(name.node_index.load(), binding.referent());
                } else if self.annotation_depth == 0 && matches!(name.ctx, ExprContext::Load) {
                    self.fail(name.range, format!("name `{}` is not defined", name.id));
                }
            }
            ExprContext::Invalid => {}
        }
    }

    /// Resolve `value.attr` when `value` refers to a module
    fn resolve_attribute(&mut self, attribute: &ExprAttribute) {
        if !matches!(attribute.ctx, ExprContext::Load) {
            return;
        }
        let value_node = match attribute.value.as_ref() {
            Expr::Name(name) => name.node_index.load(),
            Expr::Attribute(inner) => inner.node_index.load(),
            _ => return,
        };
        let Some(Referent::Module(module_id)) = self.table.use_of(value_node).cloned() else {
            return;
        };
        let Some(module) = self.importer.module(module_id) else {
            return;
        };

        let attr = attribute.attr.as_str();
        let binding = match module.member(attr) {
            Some(binding) => Some(binding),
            // A submodule imported elsewhere later in the run is still an attribute at runtime
            None if module.is_package() => {
                match self
                    .importer
                    .try_import_from(&join_import_path(module.name(), attr), &self.origin_dir)
                {
                    Ok(Some(submodule)) => {
                        module.add_submodule(attr, Rc::clone(&submodule));
                        Some(Binding::Module(submodule))
                    }
                    Ok(None) => None,
                    Err(err) => {
                        self.abort(err);
                        return;
                    }
                }
            }
            None => None,
        };

        match binding {
            Some(binding) => self
                .table
                .record_use(attribute.node_index.load(), binding.referent()),
            None if module.has_getattr() || self.annotation_depth > 0 => {}
            None => self.fail(
                attribute.range,
                format!("module `{}` has no attribute `{attr}`", module.name()),
            ),
        }
    }

    fn visit_import(&mut self, stmt: &Stmt) {
        if self.innermost_kind() != ScopeKind::Module {
            let imported = match self.resolve_import(stmt) {
                Ok(imported) => imported,
                Err(err) => {
                    self.abort(err);
                    return;
                }
            };
            for (name, binding) in imported {
                let Some(scope) = self.scopes.last_mut() else {
                    break;
                };
                if scope.is_global(&name) {
                    self.module.bind(name, binding);
                } else {
                    scope.rebind(&name, binding);
                }
            }
        }

        let (aliases, from_import) = match stmt {
            Stmt::Import(import) => (&import.names, false),
            Stmt::ImportFrom(import_from) => (&import_from.names, true),
            _ => return,
        };
        for alias in aliases {
            if alias.name.as_str() != "*" {
                self.define(alias.node_index.load(), bound_name(alias, from_import));
            }
        }
    }

    fn visit_parameter_defaults<'b>(&mut self, parameters: &'b Parameters) {
        for parameter in parameters
            .posonlyargs
            .iter()
            .chain(&parameters.args)
            .chain(&parameters.kwonlyargs)
        {
            if let Some(default) = &parameter.default {
                self.visit_expr(default);
            }
        }
    }

    fn visit_parameter_annotations<'b>(&mut self, parameters: &'b Parameters) {
        for parameter in parameters
            .posonlyargs
            .iter()
            .chain(&parameters.args)
            .chain(&parameters.kwonlyargs)
        {
            if let Some(annotation) = &parameter.parameter.annotation {
                self.visit_annotation(annotation);
            }
        }
        for parameter in parameters.vararg.iter().chain(&parameters.kwarg) {
            if let Some(annotation) = &parameter.annotation {
                self.visit_annotation(annotation);
            }
        }
    }

    fn visit_function_def<'b>(&mut self, function: &'b StmtFunctionDef) {
        for decorator in &function.decorator_list {
            self.visit_expr(&decorator.expression);
        }
        self.visit_parameter_defaults(&function.parameters);
        self.visit_parameter_annotations(&function.parameters);
        if let Some(returns) = &function.returns {
            self.visit_annotation(returns);
        }
        self.define(function.node_index.load(), function.name.as_str());

        let scope_id = self.allocate_scope();
        let mut implicit = parameter_names(&function.parameters);
        implicit.extend(type_param_names(function.type_params.as_deref()));
        if self.innermost_kind() == ScopeKind::Class {
            implicit.push("__class__");
        }
        let scope = Scope::nested(
            self.module.id(),
            scope_id,
            ScopeKind::Function,
            BindingCollector::collect(&function.body),
            implicit,
        );

        self.scopes.push(scope);
        self.visit_body(&function.body);
        self.scopes.pop();
    }

    fn visit_class_def<'b>(&mut self, class: &'b StmtClassDef) {
        for decorator in &class.decorator_list {
            self.visit_expr(&decorator.expression);
        }
        if let Some(arguments) = &class.arguments {
            self.visit_arguments(arguments);
        }
        self.define(class.node_index.load(), class.name.as_str());

        let scope_id = self.allocate_scope();
        let mut implicit = type_param_names(class.type_params.as_deref());
        implicit.extend(["__module__", "__qualname__"]);
        let scope = Scope::nested(
            self.module.id(),
            scope_id,
            ScopeKind::Class,
            BindingCollector::collect(&class.body),
            implicit,
        );

        self.scopes.push(scope);
        self.visit_body(&class.body);
        self.scopes.pop();
    }

    fn visit_lambda<'b>(&mut self, lambda: &'b ExprLambda) {
        if let Some(parameters) = &lambda.parameters {
            self.visit_parameter_defaults(parameters);
        }
        let scope_id = self.allocate_scope();
        let names = lambda
            .parameters
            .as_deref()
            .map(parameter_names)
            .unwrap_or_default();
        let scope = Scope::nested(
            self.module.id(),
            scope_id,
            ScopeKind::Lambda,
            ScopeBindings::default(),
            names,
        );

        self.scopes.push(scope);
        self.visit_expr(&lambda.body);
        self.scopes.pop();
    }

    /// The first iterable is evaluated in the enclosing scope, everything else
    /// in the comprehension's own scope
    fn visit_comprehension_scope<'b>(
        &mut self,
        generators: &'b [Comprehension],
        results: &[&'b Expr],
    ) {
        let Some((first, rest)) = generators.split_first() else {
            return;
        };
        self.visit_expr(&first.iter);

        let mut targets = Vec::new();
        for generator in generators {
            target_names(&generator.target, &mut targets);
        }
        let scope_id = self.allocate_scope();
        let scope = Scope::nested(
            self.module.id(),
            scope_id,
            ScopeKind::Comprehension,
            ScopeBindings::default(),
            targets.iter().map(String::as_str),
        );
        self.scopes.push(scope);

        self.visit_expr(&first.target);
        for condition in &first.ifs {
            self.visit_expr(condition);
        }
        for generator in rest {
            self.visit_expr(&generator.iter);
            self.visit_expr(&generator.target);
            for condition in &generator.ifs {
                self.visit_expr(condition);
            }
        }
        for result in results {
            self.visit_expr(result);
        }

        self.scopes.pop();
    }
}

impl<'b> Visitor<'b> for Checker<'_> {
    fn visit_stmt(&mut self, stmt: &'b Stmt) {
        if self.error.is_some() {
            return;
        }
        match stmt {
            Stmt::FunctionDef(function) => self.visit_function_def(function),
            Stmt::ClassDef(class) => self.visit_class_def(class),
            Stmt::Import(_) | Stmt::ImportFrom(_) => self.visit_import(stmt),
            Stmt::AnnAssign(ann_assign) => {
                if let Some(value) = &ann_assign.value {
                    self.visit_expr(value);
                }
                self.visit_annotation(&ann_assign.annotation);
                self.visit_expr(&ann_assign.target);
            }
            Stmt::TypeAlias(type_alias) => {
                self.visit_expr(&type_alias.name);
                // Lazily evaluated, like an annotation
                self.visit_annotation(&type_alias.value);
            }
            _ => walk_stmt(self, stmt),
        }
    }

    fn visit_annotation(&mut self, expr: &'b Expr) {
        self.annotation_depth += 1;
        self.visit_expr(expr);
        self.annotation_depth -= 1;
    }

    fn visit_expr(&mut self, expr: &'b Expr) {
        if self.error.is_some() {
            return;
        }
        match expr {
            Expr::Name(name) => self.visit_name(name),
            Expr::Attribute(attribute) => {
                self.visit_expr(&attribute.value);
                self.resolve_attribute(attribute);
            }
            Expr::Named(named) => {
                self.visit_expr(&named.value);
                let previous = mem::replace(&mut self.named_target, true);
                self.visit_expr(&named.target);
                self.named_target = previous;
            }
            Expr::Lambda(lambda) => self.visit_lambda(lambda),
            Expr::ListComp(comp) => self.visit_comprehension_scope(&comp.generators, &[&*comp.elt]),
            Expr::SetComp(comp) => self.visit_comprehension_scope(&comp.generators, &[&*comp.elt]),
            Expr::Generator(comp) => {
                self.visit_comprehension_scope(&comp.generators, &[&*comp.elt]);
            }
            Expr::DictComp(comp) => {
                if let Some(key) = comp.key.as_deref() {
                    self.visit_comprehension_scope(&comp.generators, &[key, &*comp.value]);
                } else {
                    self.visit_comprehension_scope(&comp.generators, &[&*comp.value]);
                }
            }
            _ => walk_expr(self, expr),
        }
    }
}

/// Module-scope import statements in source order, including those nested in
/// top-level control flow
#[derive(Default)]
struct ModuleImports<'a> {
    imports: Vec<&'a Stmt>,
}

impl<'a> ModuleImports<'a> {
    fn collect(body: &'a [Stmt]) -> Vec<&'a Stmt> {
        let mut visitor = Self::default();
        source_order::walk_body(&mut visitor, body);
        visitor.imports
    }
}

impl<'a> SourceOrderVisitor<'a> for ModuleImports<'a> {
    fn visit_stmt(&mut self, stmt: &'a Stmt) {
        match stmt {
            Stmt::Import(_) | Stmt::ImportFrom(_) => self.imports.push(stmt),
            Stmt::FunctionDef(_) | Stmt::ClassDef(_) => {}
            _ => source_order::walk_stmt(self, stmt),
        }
    }

    fn visit_expr(&mut self, _expr: &'a Expr) {}
}

/// Append `name` to an import path, respecting bare relative paths like `..`
pub(crate) fn join_import_path(path: &str, name: &str) -> String {
    if path.is_empty() || path.ends_with('.') {
        format!("{path}{name}")
    } else {
        format!("{path}.{name}")
    }
}

fn parameter_names(parameters: &Parameters) -> Vec<&str> {
    let mut names: Vec<&str> = parameters
        .posonlyargs
        .iter()
        .chain(&parameters.args)
        .chain(&parameters.kwonlyargs)
        .map(|parameter| parameter.parameter.name.as_str())
        .collect();
    names.extend(
        parameters
            .vararg
            .iter()
            .chain(&parameters.kwarg)
            .map(|parameter| parameter.name.as_str()),
    );
    names
}

fn type_param_names(type_params: Option<&TypeParams>) -> Vec<&str> {
    type_params
        .map(|params| {
            params
                .type_params
                .iter()
                .map(|param| match param {
                    TypeParam::TypeVar(type_var) => type_var.name.as_str(),
                    TypeParam::ParamSpec(param_spec) => param_spec.name.as_str(),
                    TypeParam::TypeVarTuple(tuple) => tuple.name.as_str(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn target_names(target: &Expr, names: &mut Vec<String>) {
    match target {
        Expr::Name(name) => names.push(name.id.to_string()),
        Expr::Tuple(tuple) => tuple.elts.iter().for_each(|elt| target_names(elt, names)),
        Expr::List(list) => list.elts.iter().for_each(|elt| target_names(elt, names)),
        Expr::Starred(starred) => target_names(&starred.value, names),
        _ => {}
    }
}
