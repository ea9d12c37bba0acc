//! Node numbering for parsed files.
//!
//! Every node of every file analysed during one run receives an index that is
//! unique across the whole run: `file_id * FILE_INDEX_RANGE + n`. The
//! use-definition table is keyed by these indices, so an identifier occurrence
//! can be found again from the AST alone, in any file.

use std::cell::Cell;

use ruff_python_ast::{
    Alias, Arguments, AtomicNodeIndex, Comprehension, Decorator, ExceptHandler, Expr, Keyword,
    MatchCase, ModModule, Parameter, Parameters, Pattern, Stmt, TypeParam, WithItem,
    visitor::transformer::{
        Transformer, walk_alias, walk_arguments, walk_body, walk_comprehension, walk_decorator,
        walk_except_handler, walk_expr, walk_keyword, walk_match_case, walk_parameter,
        walk_parameters, walk_pattern, walk_stmt, walk_type_param, walk_with_item,
    },
};
use thiserror::Error;

/// Number of indices reserved per file
pub const FILE_INDEX_RANGE: u32 = 1_000_000;

/// Identifier of a parsed file within one bundling run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(u32);

impl FileId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

/// A file has more nodes than its reserved index range can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("file has more than {limit} syntax nodes")]
pub struct NodeLimitExceeded {
    pub limit: u32,
}

/// Summary of a numbering pass
#[derive(Debug, Clone, Copy)]
pub struct NumberedFile {
    pub file_id: FileId,
    /// The total number of nodes numbered, including the module node
    pub node_count: u32,
}

/// Assigns sequential indices in a file's reserved range
struct NodeNumberer {
    next: Cell<u32>,
    limit: u32,
    overflowed: Cell<bool>,
}

impl NodeNumberer {
    fn new(file_id: FileId, range: u32) -> Self {
        let base = file_id.as_u32() * range;
        Self {
            next: Cell::new(base),
            limit: base + range,
            overflowed: Cell::new(false),
        }
    }

    fn number(&self, node_index: &AtomicNodeIndex) {
        let current = self.next.get();
        // Never hand out an index owned by the next file
        if current >= self.limit {
            self.overflowed.set(true);
            return;
        }
        node_index.set(current.into());
        self.next.set(current + 1);
    }
}

impl Transformer for NodeNumberer {
    fn visit_body(&self, body: &mut [Stmt]) {
        walk_body(self, body);
    }

    fn visit_stmt(&self, stmt: &mut Stmt) {
        match stmt {
            Stmt::FunctionDef(s) => self.number(&s.node_index),
            Stmt::ClassDef(s) => self.number(&s.node_index),
            Stmt::Import(s) => self.number(&s.node_index),
            Stmt::ImportFrom(s) => self.number(&s.node_index),
            Stmt::Assign(s) => self.number(&s.node_index),
            Stmt::Return(s) => self.number(&s.node_index),
            Stmt::Delete(s) => self.number(&s.node_index),
            Stmt::AugAssign(s) => self.number(&s.node_index),
            Stmt::AnnAssign(s) => self.number(&s.node_index),
            Stmt::TypeAlias(s) => self.number(&s.node_index),
            Stmt::For(s) => self.number(&s.node_index),
            Stmt::While(s) => self.number(&s.node_index),
            Stmt::If(s) => self.number(&s.node_index),
            Stmt::With(s) => self.number(&s.node_index),
            Stmt::Match(s) => self.number(&s.node_index),
            Stmt::Raise(s) => self.number(&s.node_index),
            Stmt::Try(s) => self.number(&s.node_index),
            Stmt::Assert(s) => self.number(&s.node_index),
            Stmt::Global(s) => self.number(&s.node_index),
            Stmt::Nonlocal(s) => self.number(&s.node_index),
            Stmt::Expr(s) => self.number(&s.node_index),
            Stmt::Pass(s) => self.number(&s.node_index),
            Stmt::Break(s) => self.number(&s.node_index),
            Stmt::Continue(s) => self.number(&s.node_index),
            Stmt::IpyEscapeCommand(s) => self.number(&s.node_index),
        }

        walk_stmt(self, stmt);
    }

    fn visit_expr(&self, expr: &mut Expr) {
        match expr {
            Expr::BoolOp(e) => self.number(&e.node_index),
            Expr::BinOp(e) => self.number(&e.node_index),
            Expr::UnaryOp(e) => self.number(&e.node_index),
            Expr::Lambda(e) => self.number(&e.node_index),
            Expr::If(e) => self.number(&e.node_index),
            Expr::Dict(e) => self.number(&e.node_index),
            Expr::Set(e) => self.number(&e.node_index),
            Expr::ListComp(e) => self.number(&e.node_index),
            Expr::SetComp(e) => self.number(&e.node_index),
            Expr::DictComp(e) => self.number(&e.node_index),
            Expr::Generator(e) => self.number(&e.node_index),
            Expr::Await(e) => self.number(&e.node_index),
            Expr::Yield(e) => self.number(&e.node_index),
            Expr::YieldFrom(e) => self.number(&e.node_index),
            Expr::Compare(e) => self.number(&e.node_index),
            Expr::Call(e) => self.number(&e.node_index),
            Expr::NumberLiteral(e) => self.number(&e.node_index),
            Expr::StringLiteral(e) => self.number(&e.node_index),
            Expr::FString(e) => self.number(&e.node_index),
            Expr::TString(e) => self.number(&e.node_index),
            Expr::BytesLiteral(e) => self.number(&e.node_index),
            Expr::BooleanLiteral(e) => self.number(&e.node_index),
            Expr::NoneLiteral(e) => self.number(&e.node_index),
            Expr::EllipsisLiteral(e) => self.number(&e.node_index),
            Expr::Attribute(e) => self.number(&e.node_index),
            Expr::Subscript(e) => self.number(&e.node_index),
            Expr::Starred(e) => self.number(&e.node_index),
            Expr::Name(e) => self.number(&e.node_index),
            Expr::List(e) => self.number(&e.node_index),
            Expr::Tuple(e) => self.number(&e.node_index),
            Expr::Slice(e) => self.number(&e.node_index),
            Expr::Named(e) => self.number(&e.node_index),
            Expr::IpyEscapeCommand(e) => self.number(&e.node_index),
        }

        walk_expr(self, expr);
    }

    fn visit_decorator(&self, decorator: &mut Decorator) {
        self.number(&decorator.node_index);
        walk_decorator(self, decorator);
    }

    fn visit_comprehension(&self, comprehension: &mut Comprehension) {
        self.number(&comprehension.node_index);
        walk_comprehension(self, comprehension);
    }

    fn visit_except_handler(&self, handler: &mut ExceptHandler) {
        let ExceptHandler::ExceptHandler(h) = handler;
        self.number(&h.node_index);
        walk_except_handler(self, handler);
    }

    fn visit_arguments(&self, arguments: &mut Arguments) {
        self.number(&arguments.node_index);
        walk_arguments(self, arguments);
    }

    fn visit_parameters(&self, parameters: &mut Parameters) {
        self.number(&parameters.node_index);
        // ParameterWithDefault is not visited on its own
        for param in parameters
            .posonlyargs
            .iter()
            .chain(&parameters.args)
            .chain(&parameters.kwonlyargs)
        {
            self.number(&param.node_index);
        }
        walk_parameters(self, parameters);
    }

    fn visit_parameter(&self, parameter: &mut Parameter) {
        self.number(&parameter.node_index);
        walk_parameter(self, parameter);
    }

    fn visit_keyword(&self, keyword: &mut Keyword) {
        self.number(&keyword.node_index);
        walk_keyword(self, keyword);
    }

    fn visit_alias(&self, alias: &mut Alias) {
        self.number(&alias.node_index);
        walk_alias(self, alias);
    }

    fn visit_with_item(&self, with_item: &mut WithItem) {
        self.number(&with_item.node_index);
        walk_with_item(self, with_item);
    }

    fn visit_match_case(&self, match_case: &mut MatchCase) {
        self.number(&match_case.node_index);
        walk_match_case(self, match_case);
    }

    fn visit_pattern(&self, pattern: &mut Pattern) {
        match pattern {
            Pattern::MatchValue(p) => self.number(&p.node_index),
            Pattern::MatchSingleton(p) => self.number(&p.node_index),
            Pattern::MatchSequence(p) => self.number(&p.node_index),
            Pattern::MatchMapping(p) => self.number(&p.node_index),
            Pattern::MatchClass(p) => self.number(&p.node_index),
            Pattern::MatchStar(p) => self.number(&p.node_index),
            Pattern::MatchAs(p) => self.number(&p.node_index),
            Pattern::MatchOr(p) => self.number(&p.node_index),
        }
        walk_pattern(self, pattern);
    }

    fn visit_type_param(&self, type_param: &mut TypeParam) {
        match type_param {
            TypeParam::TypeVar(t) => self.number(&t.node_index),
            TypeParam::ParamSpec(t) => self.number(&t.node_index),
            TypeParam::TypeVarTuple(t) => self.number(&t.node_index),
        }
        walk_type_param(self, type_param);
    }
}

/// Number every node of `module` inside the range reserved for `file_id`
pub fn number_file(
    module: &mut ModModule,
    file_id: FileId,
) -> Result<NumberedFile, NodeLimitExceeded> {
    number_file_within(module, file_id, FILE_INDEX_RANGE)
}

fn number_file_within(
    module: &mut ModModule,
    file_id: FileId,
    range: u32,
) -> Result<NumberedFile, NodeLimitExceeded> {
    let numberer = NodeNumberer::new(file_id, range);
    numberer.number(&module.node_index);
    numberer.visit_body(&mut module.body);

    if numberer.overflowed.get() {
        return Err(NodeLimitExceeded { limit: range });
    }
    Ok(NumberedFile {
        file_id,
        node_count: numberer.next.get() - file_id.as_u32() * range,
    })
}
