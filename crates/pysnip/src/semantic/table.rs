//! The use-definition table

use ruff_python_ast::{Expr, ExprCall, NodeIndex, StmtClassDef, StmtFunctionDef};
use rustc_hash::FxHashMap;

use super::module::{Referent, SymbolId};

/// Maps identifier occurrences to what they define or refer to
///
/// Keys are universe-unique node indices, so one table serves every file of a
/// run. Definitions are keyed by the defining node: the `def`/`class`
/// statement, the stored `Name` expression, or the import `Alias`.
#[derive(Debug, Default)]
pub struct UseDefTable {
    defs: FxHashMap<NodeIndex, SymbolId>,
    uses: FxHashMap<NodeIndex, Referent>,
}

impl UseDefTable {
    pub fn record_def(&mut self, node: NodeIndex, symbol: SymbolId) {
        self.defs.insert(node, symbol);
    }

    pub fn record_use(&mut self, node: NodeIndex, referent: Referent) {
        self.uses.insert(node, referent);
    }

    pub fn def(&self, node: NodeIndex) -> Option<&SymbolId> {
        self.defs.get(&node)
    }

    pub fn use_of(&self, node: NodeIndex) -> Option<&Referent> {
        self.uses.get(&node)
    }

    pub fn function_def(&self, function: &StmtFunctionDef) -> Option<&SymbolId> {
        self.def(function.node_index.load())
    }

    pub fn class_def(&self, class: &StmtClassDef) -> Option<&SymbolId> {
        self.def(class.node_index.load())
    }

    /// Identity of the symbol a call expression invokes
    ///
    /// Only plain names and attribute accesses can name a callee; calls on
    /// any other expression, or on a module object, have none.
    pub fn callee(&self, call: &ExprCall) -> Option<&SymbolId> {
        let node = match call.func.as_ref() {
            Expr::Name(name) => name.node_index.load(),
            Expr::Attribute(attribute) => attribute.node_index.load(),
            _ => return None,
        };
        self.use_of(node).and_then(Referent::as_symbol)
    }

    /// Absorb the entries of another table
    pub fn merge(&mut self, other: Self) {
        self.defs.extend(other.defs);
        self.uses.extend(other.uses);
    }

    pub fn def_count(&self) -> usize {
        self.defs.len()
    }

    pub fn use_count(&self) -> usize {
        self.uses.len()
    }
}

#[cfg(test)]
mod tests {
    use ruff_python_ast::Stmt;
    use ruff_python_parser::parse_module;

    use super::*;
    use crate::{
        ast_indexer::{FileId, number_file},
        semantic::module::ModuleId,
    };

    #[test]
    fn test_callee_of_name_and_attribute_calls() {
        let mut module = parse_module("f()\nm.g()\n(lambda: 1)()\n")
            .expect("valid source")
            .into_syntax();
        number_file(&mut module, FileId::new(0)).expect("small file fits");

        let calls: Vec<&ExprCall> = module
            .body
            .iter()
            .map(|stmt| match stmt {
                Stmt::Expr(expr) => expr.value.as_call_expr().expect("call"),
                _ => panic!("expected expression statement"),
            })
            .collect();

        let f = SymbolId::global(ModuleId::new(1), "f");
        let g = SymbolId::global(ModuleId::new(2), "g");
        let mut table = UseDefTable::default();
        if let Expr::Name(name) = calls[0].func.as_ref() {
            table.record_use(name.node_index.load(), Referent::Symbol(f.clone()));
        }
        if let Expr::Attribute(attribute) = calls[1].func.as_ref() {
            table.record_use(attribute.node_index.load(), Referent::Symbol(g.clone()));
        }

        assert_eq!(table.callee(calls[0]), Some(&f));
        assert_eq!(table.callee(calls[1]), Some(&g));
        assert_eq!(table.callee(calls[2]), None);
    }

    #[test]
    fn test_module_referent_is_not_a_callee() {
        let mut module = parse_module("m()\n").expect("valid source").into_syntax();
        number_file(&mut module, FileId::new(0)).expect("small file fits");
        let Stmt::Expr(expr) = &module.body[0] else {
            panic!("expected expression statement");
        };
        let call = expr.value.as_call_expr().expect("call");

        let mut table = UseDefTable::default();
        let name = call.func.as_name_expr().expect("name");
        table.record_use(name.node_index.load(), Referent::Module(ModuleId::new(3)));
        assert_eq!(table.callee(call), None);
    }
}
