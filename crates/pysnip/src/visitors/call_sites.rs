//! Call site collection
//!
//! Gathers the call expressions of a statement or body in source order. A
//! call is reported before the calls nested in its callee and arguments, so
//! `f(g(x))` yields `f(...)` then `g(x)`.

use ruff_python_ast::{
    Expr, ExprCall, Stmt,
    visitor::source_order::{self, SourceOrderVisitor},
};

/// Visitor that collects every call expression in pre-order
#[derive(Default)]
pub struct CallSiteVisitor<'a> {
    calls: Vec<&'a ExprCall>,
}

impl<'a> CallSiteVisitor<'a> {
    /// Collect the call sites of a body
    pub fn collect_from_body(body: &'a [Stmt]) -> Vec<&'a ExprCall> {
        let mut visitor = Self::default();
        visitor.visit_body(body);
        visitor.calls
    }

    /// Collect the call sites of a single statement, including nested bodies
    pub fn collect_from_stmt(stmt: &'a Stmt) -> Vec<&'a ExprCall> {
        let mut visitor = Self::default();
        visitor.visit_stmt(stmt);
        visitor.calls
    }
}

impl<'a> SourceOrderVisitor<'a> for CallSiteVisitor<'a> {
    fn visit_expr(&mut self, expr: &'a Expr) {
        if let Expr::Call(call) = expr {
            self.calls.push(call);
        }
        source_order::walk_expr(self, expr);
    }
}
