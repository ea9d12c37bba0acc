//! Declaration index: symbol identity to minimal top-level declaration
//!
//! Every module-scope statement of every analysed module (the entry file
//! excepted), including those nested in top-level control flow, is cut into the smallest unit that can be appended to a bundle
//! on its own: a function, a class, a type alias, an assignment, or an import
//! of a single name.

use std::{path::PathBuf, rc::Rc};

use log::{debug, trace};
use ruff_python_ast::{Alias, ExceptHandler, Expr, ExprName, Stmt};

use crate::{
    semantic::{AnalyzedFile, SymbolId, UseDefTable},
    stdlib_detection::StdlibClassifier,
    types::FxIndexMap,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Function,
    Class,
    TypeAlias,
    Value,
    Import,
}

/// One appendable unit of source
#[derive(Debug)]
pub struct Declaration {
    pub kind: DeclarationKind,
    /// File the statement was taken from
    pub origin: PathBuf,
    /// Names bound by the statement
    pub names: Vec<String>,
    pub stmt: Stmt,
    /// Attribute docstring emitted right after the statement
    pub doc: Option<Stmt>,
}

/// Options for building the index
#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    /// Give every unit split from a grouped import the group's docstring,
    /// rather than only the first
    pub share_group_docs: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            share_group_docs: true,
        }
    }
}

/// Map from module-scope identity to declaration
///
/// A later top-level binding of a name replaces an earlier one, matching
/// Python's rebinding semantics.
#[derive(Debug, Default)]
pub struct DeclarationIndex {
    entries: FxIndexMap<SymbolId, Rc<Declaration>>,
}

impl DeclarationIndex {
    pub fn get(&self, symbol: &SymbolId) -> Option<&Rc<Declaration>> {
        self.entries.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SymbolId, &Rc<Declaration>)> {
        self.entries.iter()
    }

    fn insert(&mut self, symbol: SymbolId, declaration: Rc<Declaration>) {
        trace!("Indexed {symbol} as {:?}", declaration.kind);
        self.entries.insert(symbol, declaration);
    }
}

/// Build the index over every analysed file
///
/// Files of modules classified as always available are skipped entirely.
pub fn build_index(
    files: &[AnalyzedFile],
    table: &UseDefTable,
    classifier: &StdlibClassifier,
    options: IndexOptions,
) -> DeclarationIndex {
    let mut index = DeclarationIndex::default();

    for file in files {
        if classifier.is_standard(&file.module_name) {
            debug!("Not indexing always-available module '{}'", file.module_name);
            continue;
        }
        index_file(&mut index, file, table, options);
    }

    debug!("Indexed {} declarations", index.len());
    index
}

fn index_file(
    index: &mut DeclarationIndex,
    file: &AnalyzedFile,
    table: &UseDefTable,
    options: IndexOptions,
) {
    index_body(index, file, table, options, &file.ast.body);
}

/// Index one statement list of module scope
///
/// Definitions guarded by `if`, `try`, `with`, loops or `match` still bind
/// module-level names, so the bodies of those statements are walked too.
fn index_body(
    index: &mut DeclarationIndex,
    file: &AnalyzedFile,
    table: &UseDefTable,
    options: IndexOptions,
    body: &[Stmt],
) {
    let declaration = |kind: DeclarationKind, names: Vec<String>, stmt: Stmt, doc: Option<Stmt>| {
        Rc::new(Declaration {
            kind,
            origin: file.path.clone(),
            names,
            stmt,
            doc,
        })
    };

    for (position, stmt) in body.iter().enumerate() {
        let doc = body
            .get(position + 1)
            .filter(|next| carries_attribute_doc(stmt) && is_docstring(next))
            .cloned();

        match stmt {
            Stmt::FunctionDef(function) => {
                if let Some(symbol) = table.function_def(function) {
                    let names = vec![function.name.to_string()];
                    index.insert(
                        symbol.clone(),
                        declaration(DeclarationKind::Function, names, stmt.clone(), None),
                    );
                }
            }
            Stmt::ClassDef(class) => {
                if let Some(symbol) = table.class_def(class) {
                    let names = vec![class.name.to_string()];
                    index.insert(
                        symbol.clone(),
                        declaration(DeclarationKind::Class, names, stmt.clone(), None),
                    );
                }
            }
            Stmt::TypeAlias(type_alias) => {
                if let Expr::Name(name) = type_alias.name.as_ref()
                    && let Some(symbol) = table.def(name.node_index.load())
                {
                    let names = vec![name.id.to_string()];
                    index.insert(
                        symbol.clone(),
                        declaration(DeclarationKind::TypeAlias, names, stmt.clone(), doc),
                    );
                }
            }
            Stmt::Import(_) | Stmt::ImportFrom(_) => {
                let aliases = match stmt {
                    Stmt::Import(import) => &import.names,
                    Stmt::ImportFrom(import_from) => &import_from.names,
                    _ => continue,
                };
                let mut first = true;
                for alias in aliases {
                    // Star imports bind nothing that can be indexed
                    if alias.name.as_str() == "*" {
                        continue;
                    }
                    let Some(symbol) = table.def(alias.node_index.load()) else {
                        continue;
                    };
                    let unit_doc = if first || options.share_group_docs {
                        doc.clone()
                    } else {
                        None
                    };
                    first = false;
                    index.insert(
                        symbol.clone(),
                        declaration(
                            DeclarationKind::Import,
                            vec![symbol.name.clone()],
                            single_alias_import(stmt, alias),
                            unit_doc,
                        ),
                    );
                }
            }
            Stmt::Assign(_) | Stmt::AnnAssign(_) => {
                let mut targets = Vec::new();
                match stmt {
                    Stmt::Assign(assign) => {
                        for target in &assign.targets {
                            stored_names(target, &mut targets);
                        }
                    }
                    Stmt::AnnAssign(ann_assign) => stored_names(&ann_assign.target, &mut targets),
                    _ => {}
                }

                let symbols: Vec<&SymbolId> = targets
                    .iter()
                    .filter_map(|name| table.def(name.node_index.load()))
                    .collect();
                if symbols.is_empty() {
                    continue;
                }

                // One unit shared by every name the statement binds
                let names: Vec<String> = symbols.iter().map(|symbol| symbol.name.clone()).collect();
                let unit = declaration(DeclarationKind::Value, names, stmt.clone(), doc);
                for symbol in symbols {
                    index.insert(symbol.clone(), Rc::clone(&unit));
                }
            }
            Stmt::If(if_stmt) => {
                index_body(index, file, table, options, &if_stmt.body);
                for clause in &if_stmt.elif_else_clauses {
                    index_body(index, file, table, options, &clause.body);
                }
            }
            Stmt::Try(try_stmt) => {
                index_body(index, file, table, options, &try_stmt.body);
                for handler in &try_stmt.handlers {
                    let ExceptHandler::ExceptHandler(handler) = handler;
                    index_body(index, file, table, options, &handler.body);
                }
                index_body(index, file, table, options, &try_stmt.orelse);
                index_body(index, file, table, options, &try_stmt.finalbody);
            }
            Stmt::With(with) => index_body(index, file, table, options, &with.body),
            Stmt::For(for_stmt) => {
                index_body(index, file, table, options, &for_stmt.body);
                index_body(index, file, table, options, &for_stmt.orelse);
            }
            Stmt::While(while_stmt) => {
                index_body(index, file, table, options, &while_stmt.body);
                index_body(index, file, table, options, &while_stmt.orelse);
            }
            Stmt::Match(match_stmt) => {
                for case in &match_stmt.cases {
                    index_body(index, file, table, options, &case.body);
                }
            }
            _ => {}
        }
    }
}

/// Copy of an import statement reduced to one alias
fn single_alias_import(stmt: &Stmt, alias: &Alias) -> Stmt {
    let mut unit = stmt.clone();
    match &mut unit {
        Stmt::Import(import) => import.names = vec![alias.clone()],
        Stmt::ImportFrom(import_from) => import_from.names = vec![alias.clone()],
        _ => {}
    }
    unit
}

fn carries_attribute_doc(stmt: &Stmt) -> bool {
    matches!(
        stmt,
        Stmt::Assign(_)
            | Stmt::AnnAssign(_)
            | Stmt::TypeAlias(_)
            | Stmt::Import(_)
            | Stmt::ImportFrom(_)
    )
}

fn is_docstring(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::Expr(expr) if matches!(expr.value.as_ref(), Expr::StringLiteral(_)))
}

fn stored_names<'a>(target: &'a Expr, names: &mut Vec<&'a ExprName>) {
    match target {
        Expr::Name(name) => names.push(name),
        Expr::Tuple(tuple) => tuple.elts.iter().for_each(|elt| stored_names(elt, names)),
        Expr::List(list) => list.elts.iter().for_each(|elt| stored_names(elt, names)),
        Expr::Starred(starred) => stored_names(&starred.value, names),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        semantic::{ModuleId, Resolution, SymbolResolver, testing::MemoryLoader},
        types::FxIndexSet,
    };

    fn resolve(loader: &MemoryLoader, entry: &str) -> Resolution {
        let classifier = StdlibClassifier::default();
        SymbolResolver::new(loader, &classifier)
            .resolve(MemoryLoader::entry(entry))
            .expect("program resolves")
    }

    fn index_of(resolution: &Resolution, options: IndexOptions) -> DeclarationIndex {
        build_index(
            &resolution.files,
            &resolution.table,
            &StdlibClassifier::default(),
            options,
        )
    }

    fn module_id(resolution: &Resolution, name: &str) -> ModuleId {
        resolution
            .modules
            .values()
            .find(|module| module.name() == name)
            .map(|module| module.id())
            .expect("module was analysed")
    }

    const UTIL: &str = r#"
import os, sys
"""Platform modules."""

a, b = 1, 2
limit: int = 10
"""Upper bound."""

def f():
    return 1

def f(x):
    return x

class Shape:
    pass

type Pair = tuple[int, int]
"#;

    #[test]
    fn test_declaration_kinds_and_names() {
        let loader = MemoryLoader::new([("util", UTIL)]);
        let resolution = resolve(&loader, "import util\n");
        let index = index_of(&resolution, IndexOptions::default());
        let util = module_id(&resolution, "util");

        let mut kinds: Vec<(String, DeclarationKind)> = index
            .iter()
            .map(|(symbol, declaration)| {
                assert_eq!(symbol.module, util);
                (symbol.name.clone(), declaration.kind)
            })
            .collect();
        kinds.sort_by(|left, right| left.0.cmp(&right.0));

        assert_eq!(
            kinds,
            vec![
                ("Pair".to_string(), DeclarationKind::TypeAlias),
                ("Shape".to_string(), DeclarationKind::Class),
                ("a".to_string(), DeclarationKind::Value),
                ("b".to_string(), DeclarationKind::Value),
                ("f".to_string(), DeclarationKind::Function),
                ("limit".to_string(), DeclarationKind::Value),
                ("os".to_string(), DeclarationKind::Import),
                ("sys".to_string(), DeclarationKind::Import),
            ]
        );
    }

    #[test]
    fn test_grouped_import_is_split_and_shares_docs() {
        let loader = MemoryLoader::new([("util", UTIL)]);
        let resolution = resolve(&loader, "import util\n");
        let util = module_id(&resolution, "util");

        let shared = index_of(&resolution, IndexOptions::default());
        for name in ["os", "sys"] {
            let declaration = shared
                .get(&SymbolId::global(util, name))
                .expect("import unit is indexed");
            let Stmt::Import(import) = &declaration.stmt else {
                panic!("expected import statement");
            };
            assert_eq!(import.names.len(), 1);
            assert_eq!(import.names[0].name.as_str(), name);
            assert!(declaration.doc.is_some(), "{name} should carry the doc");
        }

        let first_only = index_of(
            &resolution,
            IndexOptions {
                share_group_docs: false,
            },
        );
        let os = first_only
            .get(&SymbolId::global(util, "os"))
            .expect("os is indexed");
        let sys = first_only
            .get(&SymbolId::global(util, "sys"))
            .expect("sys is indexed");
        assert!(os.doc.is_some());
        assert!(sys.doc.is_none());
    }

    #[test]
    fn test_multi_name_assignment_shares_one_declaration() {
        let loader = MemoryLoader::new([("util", UTIL)]);
        let resolution = resolve(&loader, "import util\n");
        let index = index_of(&resolution, IndexOptions::default());
        let util = module_id(&resolution, "util");

        let a = index.get(&SymbolId::global(util, "a")).expect("a is indexed");
        let b = index.get(&SymbolId::global(util, "b")).expect("b is indexed");
        assert!(Rc::ptr_eq(a, b));
        assert_eq!(a.names, vec!["a".to_string(), "b".to_string()]);
        assert!(a.doc.is_none());

        let limit = index
            .get(&SymbolId::global(util, "limit"))
            .expect("limit is indexed");
        assert!(limit.doc.is_some());
    }

    #[test]
    fn test_last_binding_wins() {
        let loader = MemoryLoader::new([("util", UTIL)]);
        let resolution = resolve(&loader, "import util\n");
        let index = index_of(&resolution, IndexOptions::default());
        let util = module_id(&resolution, "util");

        let f = index.get(&SymbolId::global(util, "f")).expect("f is indexed");
        let Stmt::FunctionDef(function) = &f.stmt else {
            panic!("expected function definition");
        };
        assert_eq!(function.parameters.args.len(), 1);
    }

    #[test]
    fn test_definitions_in_top_level_control_flow_are_indexed() {
        let lib = "try:\n    from math import gcd\nexcept ImportError:\n    def gcd(a, b):\n        return a\n\nif True:\n    def helper():\n        return 1\nelse:\n    LIMIT = 1\n\nwith open(__file__) as handle:\n    class Reader:\n        pass\n";
        let loader = MemoryLoader::new([("lib", lib)]);
        let resolution = resolve(&loader, "import lib\n");
        let index = index_of(&resolution, IndexOptions::default());
        let lib = module_id(&resolution, "lib");

        let helper = index
            .get(&SymbolId::global(lib, "helper"))
            .expect("conditional def is indexed");
        assert_eq!(helper.kind, DeclarationKind::Function);
        assert!(matches!(helper.stmt, Stmt::FunctionDef(_)));

        let limit = index
            .get(&SymbolId::global(lib, "LIMIT"))
            .expect("else branch is indexed");
        assert_eq!(limit.kind, DeclarationKind::Value);

        let reader = index
            .get(&SymbolId::global(lib, "Reader"))
            .expect("with body is indexed");
        assert_eq!(reader.kind, DeclarationKind::Class);

        // The fallback def comes after the import, so it wins
        let gcd = index
            .get(&SymbolId::global(lib, "gcd"))
            .expect("fallback is indexed");
        assert_eq!(gcd.kind, DeclarationKind::Function);

        // Function bodies are a different scope and stay opaque
        assert!(index.get(&SymbolId::global(lib, "a")).is_none());
    }

    #[test]
    fn test_entry_file_is_not_indexed() {
        let loader = MemoryLoader::empty();
        let resolution = resolve(&loader, "def local():\n    pass\n\nlocal()\n");
        assert!(index_of(&resolution, IndexOptions::default()).is_empty());
    }

    #[test]
    fn test_always_available_modules_are_skipped() {
        let loader = MemoryLoader::new([("vendored", "def helper():\n    pass\n")]);
        let resolution = resolve(&loader, "import vendored\n");

        let known: FxIndexSet<String> = ["vendored".to_string()].into_iter().collect();
        let classifier = StdlibClassifier::new(12, known);
        let index = build_index(
            &resolution.files,
            &resolution.table,
            &classifier,
            IndexOptions::default(),
        );
        assert!(index.is_empty());
    }
}
