//! One bundling run: read, resolve, index, collect, emit, render

use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use log::{debug, info, warn};
use ruff_python_ast::ModModule;
use ruff_python_codegen::Stylist;
use ruff_python_parser::parse_module;

use crate::{
    declaration_index::{Declaration, IndexOptions, build_index},
    emitter::{CodegenPrinter, SourcePrinter, emit},
    error::{BundleError, BundleResult},
    loader::{FsPackageLoader, PackageLoader, ParsedFile},
    reachability::{CollectOptions, collect},
    semantic::{Resolution, SymbolResolver},
    stdlib_detection::{DEFAULT_PYTHON_MINOR, StdlibClassifier},
    types::FxIndexSet,
};

/// Settings for a run, already merged from every configuration layer
#[derive(Debug, Clone)]
pub struct BundleOptions {
    /// Extra directories searched for absolute imports
    pub src: Vec<PathBuf>,
    /// Third-party packages available wherever the bundle runs
    pub known_third_party: FxIndexSet<String>,
    pub python_minor: u8,
    pub deduplicate: bool,
    pub share_group_docs: bool,
}

impl Default for BundleOptions {
    fn default() -> Self {
        Self {
            src: Vec::new(),
            known_third_party: FxIndexSet::default(),
            python_minor: DEFAULT_PYTHON_MINOR,
            deduplicate: false,
            share_group_docs: true,
        }
    }
}

/// Result of a successful run
#[derive(Debug)]
pub struct BundleOutput {
    /// The entry module with every collected declaration appended
    pub module: ModModule,
    /// Collected declarations, in append order
    pub appended: Vec<Rc<Declaration>>,
    /// Rendered bundle source
    pub code: String,
}

#[derive(Debug, Default)]
pub struct Bundler {
    options: BundleOptions,
}

impl Bundler {
    pub fn new(options: BundleOptions) -> Self {
        Self { options }
    }

    /// Bundle the program whose entry file is `entry_path`
    ///
    /// Imports are looked up on disk next to the entry file, then on
    /// `PYTHONPATH`, then in the configured source directories.
    pub fn bundle(&self, entry_path: &Path) -> BundleResult<BundleOutput> {
        let path =
            std::path::absolute(entry_path).map_err(|source| BundleError::PathResolution {
                path: entry_path.to_path_buf(),
                source,
            })?;
        let source = fs::read_to_string(&path).map_err(|source| BundleError::PathResolution {
            path: path.clone(),
            source,
        })?;

        let entry_dir = path
            .parent()
            .map_or_else(|| path.clone(), Path::to_path_buf);
        let loader = FsPackageLoader::new(&entry_dir, &self.options.src);
        debug!(
            "Searching for modules in {:?}",
            loader.search_directories()
        );
        for name in shadowed_modules(&entry_dir, &self.classifier()) {
            warn!(
                "'{name}' in {} has the name of an always-available module; \
                 imports of '{name}' are left to the target environment and it is never inlined",
                entry_dir.display()
            );
        }

        self.bundle_source(&loader, &path, source)
    }

    fn classifier(&self) -> StdlibClassifier {
        StdlibClassifier::new(
            self.options.python_minor,
            self.options.known_third_party.clone(),
        )
    }

    /// Bundle already-read entry source, loading imports through `loader`
    pub fn bundle_source(
        &self,
        loader: &dyn PackageLoader,
        path: &Path,
        source: String,
    ) -> BundleResult<BundleOutput> {
        let parsed = parse_module(&source).map_err(|err| BundleError::parse(path, &source, &err))?;
        let stylist = Stylist::from_tokens(parsed.tokens(), &source);
        let entry = ParsedFile {
            path: path.to_path_buf(),
            source: source.clone(),
            ast: parsed.syntax().clone(),
        };

        let classifier = self.classifier();
        let Resolution {
            table,
            entry,
            files,
            modules,
        } = SymbolResolver::new(loader, &classifier).resolve(entry)?;

        let index = build_index(
            &files,
            &table,
            &classifier,
            IndexOptions {
                share_group_docs: self.options.share_group_docs,
            },
        );
        let appended = collect(
            &entry.ast,
            &table,
            &index,
            CollectOptions {
                deduplicate: self.options.deduplicate,
            },
        );

        let entry_statements = entry.ast.body.len();
        let module = emit(entry.ast, &appended);
        let code = CodegenPrinter::new(&stylist)
            .with_entry_source(&source, entry_statements)
            .render(&module)?;

        info!(
            "Bundled {} ({} modules analysed, {} declarations appended)",
            path.display(),
            modules.len(),
            appended.len()
        );
        Ok(BundleOutput {
            module,
            appended,
            code,
        })
    }
}

/// Modules next to the entry file that share a name with an always-available
/// module
///
/// Such modules are never loaded, since always-available names are resolved
/// before the filesystem is searched.
fn shadowed_modules(dir: &Path, classifier: &StdlibClassifier) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                path.join("__init__.py")
                    .is_file()
                    .then(|| entry.file_name().to_str().map(str::to_string))
                    .flatten()
            } else if path.extension().is_some_and(|extension| extension == "py") {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            } else {
                None
            }
        })
        .filter(|name| classifier.is_standard(name))
        .collect();
    names.sort();
    names
}
