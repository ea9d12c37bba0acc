//! Bundle emission and rendering
//!
//! The bundle is the entry module followed by every collected declaration.
//! Nothing is rewritten and no import is added or removed. When the entry's
//! source text is known it is copied verbatim, so its comments, shebang and
//! blank lines survive; only the appended declarations are generated.

use std::rc::Rc;

use log::debug;
use ruff_python_ast::{ModModule, Stmt};
use ruff_python_codegen::{Generator, Stylist};
use ruff_python_parser::parse_module;

use crate::{
    declaration_index::Declaration,
    error::{BundleError, BundleResult},
};

/// Append each declaration, then its attribute docstring, to the entry module
pub fn emit(mut entry: ModModule, declarations: &[Rc<Declaration>]) -> ModModule {
    let original = entry.body.len();
    for declaration in declarations {
        entry.body.push(declaration.stmt.clone());
        if let Some(doc) = &declaration.doc {
            entry.body.push(doc.clone());
        }
    }

    debug!(
        "Appended {} statements to {original} entry statements",
        entry.body.len() - original
    );
    entry
}

/// Turns a module tree into source text
pub trait SourcePrinter {
    fn render(&self, module: &ModModule) -> BundleResult<String>;
}

/// Renders through ruff's code generator, in the entry file's style
#[derive(Debug)]
pub struct CodegenPrinter<'a> {
    stylist: &'a Stylist<'a>,
    entry: Option<EntrySource<'a>>,
}

/// Original text standing in for the first statements of a module
#[derive(Debug, Clone, Copy)]
struct EntrySource<'a> {
    text: &'a str,
    statements: usize,
}

impl<'a> CodegenPrinter<'a> {
    pub fn new(stylist: &'a Stylist<'a>) -> Self {
        Self {
            stylist,
            entry: None,
        }
    }

    /// Copy `text` verbatim in place of the first `statements` statements
    /// of the rendered module
    #[must_use]
    pub fn with_entry_source(mut self, text: &'a str, statements: usize) -> Self {
        self.entry = Some(EntrySource { text, statements });
        self
    }

    fn render_statement(&self, stmt: &Stmt) -> String {
        let rendered = Generator::from(self.stylist).stmt(stmt);
        rendered.trim_end_matches(['\r', '\n']).to_string()
    }
}

impl SourcePrinter for CodegenPrinter<'_> {
    fn render(&self, module: &ModModule) -> BundleResult<String> {
        let line_ending = self.stylist.line_ending().as_str();
        let mut code = String::new();

        let (verbatim, generated) = match self.entry {
            Some(entry) => {
                let split = entry.statements.min(module.body.len());
                code.push_str(entry.text.trim_end());
                (&module.body[..split], &module.body[split..])
            }
            None => (&[][..], &module.body[..]),
        };
        let mut previous_is_definition = verbatim.last().is_some_and(is_definition);

        for stmt in generated {
            if !code.is_empty() {
                // Two blank lines around top-level definitions
                let breaks = if previous_is_definition || is_definition(stmt) {
                    3
                } else {
                    1
                };
                code.push_str(&line_ending.repeat(breaks));
            }
            code.push_str(&self.render_statement(stmt));
            previous_is_definition = is_definition(stmt);
        }
        if !code.is_empty() {
            code.push_str(line_ending);
        }

        parse_module(&code).map_err(|err| BundleError::Serialization {
            message: format!("generated code is not valid Python: {}", err.error),
        })?;
        Ok(code)
    }
}

fn is_definition(stmt: &Stmt) -> bool {
    matches!(stmt, Stmt::FunctionDef(_) | Stmt::ClassDef(_))
}
