//! Depth-first reachability over call sites
//!
//! Starting from the entry file, every call whose callee is an indexed
//! declaration pulls that declaration in. Its own call sites are followed
//! first, so a declaration always lands after everything it calls.

use std::rc::Rc;

use log::{debug, trace};
use ruff_python_ast::{ExprCall, ModModule};
use rustc_hash::FxHashSet;

use crate::{
    declaration_index::{Declaration, DeclarationIndex, DeclarationKind},
    semantic::UseDefTable,
    visitors::CallSiteVisitor,
};

/// Options for the reachability collector
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    /// Append each declaration at most once, however many call sites reach it
    pub deduplicate: bool,
}

/// Collect the declarations reachable from the entry module's call sites
///
/// The result is in post-order per call chain. Without deduplication a
/// declaration reached from several call sites appears once per site.
pub fn collect(
    entry: &ModModule,
    table: &UseDefTable,
    index: &DeclarationIndex,
    options: CollectOptions,
) -> Vec<Rc<Declaration>> {
    let mut collector = Collector {
        table,
        index,
        options,
        active: Vec::new(),
        emitted: FxHashSet::default(),
        output: Vec::new(),
    };

    for call in CallSiteVisitor::collect_from_body(&entry.body) {
        collector.follow(call);
    }

    debug!(
        "Collected {} declarations ({} distinct)",
        collector.output.len(),
        collector.emitted.len()
    );
    collector.output
}

struct Collector<'a> {
    table: &'a UseDefTable,
    index: &'a DeclarationIndex,
    options: CollectOptions,
    /// Declarations whose call sites are being followed
    active: Vec<*const Declaration>,
    emitted: FxHashSet<*const Declaration>,
    output: Vec<Rc<Declaration>>,
}

impl Collector<'_> {
    fn follow(&mut self, call: &ExprCall) {
        let Some(symbol) = self.table.callee(call) else {
            return;
        };
        let Some(declaration) = self.index.get(symbol) else {
            trace!("Callee {symbol} is not indexed");
            return;
        };

        let key = Rc::as_ptr(declaration);
        if self.active.contains(&key) {
            trace!("Recursive call to {symbol}; appended when its frame completes");
            return;
        }
        if self.options.deduplicate && self.emitted.contains(&key) {
            trace!("Already appended {symbol}");
            return;
        }

        let declaration = Rc::clone(declaration);
        self.active.push(key);
        // An import unit has no call sites of its own
        if declaration.kind != DeclarationKind::Import {
            for inner in CallSiteVisitor::collect_from_stmt(&declaration.stmt) {
                self.follow(inner);
            }
        }
        self.active.pop();

        trace!("Appending {symbol}");
        self.emitted.insert(key);
        self.output.push(declaration);
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::{
        declaration_index::{IndexOptions, build_index},
        semantic::{SymbolResolver, testing::MemoryLoader},
        stdlib_detection::StdlibClassifier,
    };

    const LIB: &str = r"
def a():
    return b()

def b():
    return c()

def c():
    return 1

def fact(n):
    return 1 if n == 0 else n * fact(n - 1)

def even(n):
    return True if n == 0 else odd(n - 1)

def odd(n):
    return False if n == 0 else even(n - 1)

def helper():
    return 1

class Widget:
    def size(self):
        return helper()

def make():
    return Widget()
";

    const PATHS: &str = r"
def join(*parts):
    return '/'.join(parts)

from os.path import join
";

    fn collected(entry: &str, options: CollectOptions) -> Vec<Rc<Declaration>> {
        let loader = MemoryLoader::new([("lib", LIB), ("paths", PATHS)]);
        let classifier = StdlibClassifier::default();
        let resolution = SymbolResolver::new(&loader, &classifier)
            .resolve(MemoryLoader::entry(entry))
            .expect("program resolves");
        let index = build_index(
            &resolution.files,
            &resolution.table,
            &classifier,
            IndexOptions::default(),
        );

        collect(&resolution.entry.ast, &resolution.table, &index, options)
    }

    fn reachable(entry: &str, options: CollectOptions) -> String {
        collected(entry, options)
            .iter()
            .map(|declaration| declaration.names.join("+"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    #[test]
    fn test_transitive_calls_in_post_order() {
        assert_snapshot!(
            reachable("from lib import a\na()\n", CollectOptions::default()),
            @"c, b, a"
        );
    }

    #[test]
    fn test_module_attribute_calls_are_followed() {
        assert_snapshot!(
            reachable("import lib\nprint(lib.b())\n", CollectOptions::default()),
            @"c, b"
        );
    }

    #[test]
    fn test_each_call_site_appends_again() {
        assert_snapshot!(
            reachable("from lib import b\nb()\nb()\n", CollectOptions::default()),
            @"c, b, c, b"
        );
    }

    #[test]
    fn test_deduplicate_appends_once() {
        let options = CollectOptions { deduplicate: true };
        assert_snapshot!(
            reachable("from lib import a, b\nb()\na()\nb()\n", options),
            @"c, b, a"
        );
    }

    #[test]
    fn test_recursion_terminates() {
        assert_snapshot!(
            reachable("from lib import fact\nfact(3)\n", CollectOptions::default()),
            @"fact"
        );
        assert_snapshot!(
            reachable("from lib import even\neven(4)\n", CollectOptions::default()),
            @"odd, even"
        );
    }

    #[test]
    fn test_class_calls_follow_method_bodies() {
        assert_snapshot!(
            reachable("from lib import make\nmake()\n", CollectOptions::default()),
            @"helper, Widget, make"
        );
    }

    #[test]
    fn test_non_call_references_append_nothing() {
        let entry = r"
from lib import Widget, make

class Local:
    widget: Widget
    factory = make

handler = make
";
        assert_snapshot!(reachable(entry, CollectOptions::default()), @"");
    }

    #[test]
    fn test_builtin_and_stdlib_calls_append_nothing() {
        assert_snapshot!(
            reachable("import os\nprint(os.getcwd(), len([]))\n", CollectOptions::default()),
            @""
        );
    }

    #[test]
    fn test_rebinding_import_is_appended_as_is() {
        let declarations = collected(
            "import paths\npaths.join('a', 'b')\n",
            CollectOptions::default(),
        );

        assert_eq!(declarations.len(), 1);
        assert_eq!(declarations[0].kind, DeclarationKind::Import);
        assert!(matches!(declarations[0].stmt, ruff_python_ast::Stmt::ImportFrom(_)));
    }
}
