//! Whole-program semantic analysis
//!
//! [`SymbolResolver`] drives the analysis from the entry file, loading every
//! imported module through a [`PackageLoader`](crate::loader::PackageLoader)
//! and running a [`Checker`] over each loaded file. The result is one
//! use-definition table spanning every analysed file.

use std::{path::Path, rc::Rc};

use crate::error::{BundleError, BundleResult};

mod checker;
mod module;
mod resolver;
mod scope;
mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use checker::{CheckConfig, Checker};
pub use module::{Binding, Module, ModuleId, Referent, ScopeId, SymbolId};
pub use resolver::{AnalyzedFile, Resolution, SymbolResolver};
pub use table::UseDefTable;

/// Import service used by a [`Checker`] while it analyses a file
pub trait Importer {
    /// Resolve `import_path` as written in a file located in `origin_dir`
    ///
    /// Returns `Ok(None)` when no module matches.
    fn try_import_from(
        &mut self,
        import_path: &str,
        origin_dir: &Path,
    ) -> BundleResult<Option<Rc<Module>>>;

    /// Like [`Importer::try_import_from`], failing when no module matches
    fn import_from(&mut self, import_path: &str, origin_dir: &Path) -> BundleResult<Rc<Module>> {
        self.try_import_from(import_path, origin_dir)?
            .ok_or_else(|| BundleError::not_found(import_path, origin_dir))
    }

    /// Look up a module created during this run
    fn module(&self, id: ModuleId) -> Option<Rc<Module>>;
}
