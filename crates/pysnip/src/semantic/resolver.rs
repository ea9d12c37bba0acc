//! Cross-module symbol resolution

use std::{
    path::{Path, PathBuf},
    rc::Rc,
};

use log::{debug, info, trace};
use ruff_python_ast::ModModule;
use rustc_hash::FxHashMap;

use super::{
    Importer,
    checker::{CheckConfig, Checker},
    module::{Module, ModuleId},
    table::UseDefTable,
};
use crate::{
    ast_indexer::{FileId, number_file},
    error::{BundleError, BundleResult},
    loader::{PackageLoader, ParsedFile},
    stdlib_detection::StdlibClassifier,
    types::{FxIndexMap, ModuleKind},
};

/// Name given to the entry module
pub const ENTRY_MODULE_NAME: &str = "__main__";

/// A parsed, numbered and analysed file
#[derive(Debug)]
pub struct AnalyzedFile {
    pub file_id: FileId,
    pub module: ModuleId,
    pub module_name: String,
    pub path: PathBuf,
    pub source: String,
    pub ast: ModModule,
}

/// Output of whole-program analysis
#[derive(Debug)]
pub struct Resolution {
    /// Definitions and uses of every analysed file
    pub table: UseDefTable,
    /// The entry file, numbered like every other file
    pub entry: AnalyzedFile,
    /// Every other file parsed during the run, in analysis completion order
    pub files: Vec<AnalyzedFile>,
    /// Every module object created during the run
    pub modules: FxIndexMap<ModuleId, Rc<Module>>,
}

/// Resolves every identifier of a program to a module-qualified identity
///
/// One resolver serves exactly one run. Its cache maps an import as written
/// plus the importing directory to the module object, so repeated imports
/// share a single `Rc<Module>`; a second map keyed by module location keeps
/// different spellings of the same import on one object too.
pub struct SymbolResolver<'a> {
    loader: &'a dyn PackageLoader,
    classifier: &'a StdlibClassifier,
    config: CheckConfig,
    cache: FxIndexMap<(String, PathBuf), Rc<Module>>,
    by_location: FxHashMap<PathBuf, Rc<Module>>,
    /// Opaque modules by dotted name, shared across importing directories
    opaque: FxHashMap<String, Rc<Module>>,
    modules: FxIndexMap<ModuleId, Rc<Module>>,
    table: UseDefTable,
    files: Vec<AnalyzedFile>,
    next_module_id: u32,
    next_file_id: u32,
}

impl<'a> SymbolResolver<'a> {
    pub fn new(loader: &'a dyn PackageLoader, classifier: &'a StdlibClassifier) -> Self {
        let builtins = Rc::new(Module::builtins());
        let mut modules = FxIndexMap::default();
        modules.insert(builtins.id(), builtins);

        Self {
            loader,
            classifier,
            config: CheckConfig {
                python_minor: classifier.python_minor(),
            },
            cache: FxIndexMap::default(),
            by_location: FxHashMap::default(),
            opaque: FxHashMap::default(),
            modules,
            table: UseDefTable::default(),
            files: Vec::new(),
            next_module_id: ModuleId::BUILTINS.as_u32() + 1,
            next_file_id: 0,
        }
    }

    /// Analyse the program rooted at `entry`
    pub fn resolve(mut self, entry: ParsedFile) -> BundleResult<Resolution> {
        let ParsedFile {
            path,
            source,
            mut ast,
        } = entry;

        let file_id = self.allocate_file(&path, &mut ast)?;
        let module = Rc::new(Module::new(
            self.allocate_module(),
            ENTRY_MODULE_NAME,
            ModuleKind::FirstParty,
            Some(path.clone()),
            false,
        ));
        self.register(&module);
        debug!("Analysing entry module {}", path.display());

        let config = self.config;
        let table =
            Checker::new(&config, &mut self, Rc::clone(&module), &path, &source).check(&ast)?;
        self.table.merge(table);

        info!(
            "Resolved {} modules ({} files besides the entry)",
            self.modules.len(),
            self.files.len()
        );

        Ok(Resolution {
            table: self.table,
            entry: AnalyzedFile {
                file_id,
                module: module.id(),
                module_name: module.name().to_string(),
                path,
                source,
                ast,
            },
            files: self.files,
            modules: self.modules,
        })
    }

    fn allocate_module(&mut self) -> ModuleId {
        let id = ModuleId::new(self.next_module_id);
        self.next_module_id += 1;
        id
    }

    fn allocate_file(&mut self, path: &Path, ast: &mut ModModule) -> BundleResult<FileId> {
        let file_id = FileId::new(self.next_file_id);
        self.next_file_id += 1;
        let numbered =
            number_file(ast, file_id).map_err(|err| BundleError::node_limit(path, err))?;
        trace!(
            "Numbered {} nodes for file {}",
            numbered.node_count,
            file_id.as_u32()
        );
        Ok(file_id)
    }

    fn register(&mut self, module: &Rc<Module>) {
        self.modules.insert(module.id(), Rc::clone(module));
        if let Some(location) = module.location() {
            self.by_location
                .insert(location.to_path_buf(), Rc::clone(module));
        }
    }

    fn opaque_module(&mut self, name: &str) -> Rc<Module> {
        if let Some(module) = self.opaque.get(name) {
            return Rc::clone(module);
        }
        let kind = if self.classifier.is_stdlib_module(name) {
            ModuleKind::StandardLibrary
        } else {
            ModuleKind::ThirdParty
        };
        let module = Rc::new(Module::new(self.allocate_module(), name, kind, None, true));
        debug!("Treating '{name}' as {kind} module");
        self.register(&module);
        self.opaque.insert(name.to_string(), Rc::clone(&module));
        module
    }

    /// Load, number and analyse a first-party module
    fn load_module(
        &mut self,
        import_path: &str,
        origin_dir: &Path,
        key: (String, PathBuf),
    ) -> BundleResult<Option<Rc<Module>>> {
        let Some(package) = self.loader.load(import_path, origin_dir)? else {
            return Ok(None);
        };

        if let Some(existing) = self.by_location.get(&package.location) {
            let existing = Rc::clone(existing);
            trace!(
                "'{import_path}' from {} is already loaded as '{}'",
                origin_dir.display(),
                existing.name()
            );
            self.cache.insert(key, Rc::clone(&existing));
            return Ok(Some(existing));
        }

        let module = Rc::new(Module::new(
            self.allocate_module(),
            package.name,
            ModuleKind::FirstParty,
            Some(package.location),
            package.is_package,
        ));
        // Cached before analysis so circular imports find it
        self.cache.insert(key, Rc::clone(&module));
        self.register(&module);
        debug!("Analysing module '{}' ({})", module.name(), module.id());

        for file in package.files {
            let ParsedFile {
                path,
                source,
                mut ast,
            } = file;
            let file_id = self.allocate_file(&path, &mut ast)?;

            let config = self.config;
            let table = Checker::new(&config, &mut *self, Rc::clone(&module), &path, &source)
                .check(&ast)?;
            self.table.merge(table);

            self.files.push(AnalyzedFile {
                file_id,
                module: module.id(),
                module_name: module.name().to_string(),
                path,
                source,
                ast,
            });
        }

        Ok(Some(module))
    }
}

impl Importer for SymbolResolver<'_> {
    fn try_import_from(
        &mut self,
        import_path: &str,
        origin_dir: &Path,
    ) -> BundleResult<Option<Rc<Module>>> {
        let key = (import_path.to_string(), origin_dir.to_path_buf());
        if let Some(module) = self.cache.get(&key) {
            trace!("Cache hit for '{import_path}' from {}", origin_dir.display());
            return Ok(Some(Rc::clone(module)));
        }

        if import_path == "builtins" {
            let builtins = self.modules.get(&ModuleId::BUILTINS).map(Rc::clone);
            if let Some(module) = &builtins {
                self.cache.insert(key, Rc::clone(module));
            }
            return Ok(builtins);
        }

        if self.classifier.is_standard(import_path) {
            let module = self.opaque_module(import_path);
            self.cache.insert(key, Rc::clone(&module));
            return Ok(Some(module));
        }

        self.load_module(import_path, origin_dir, key)
    }

    fn module(&self, id: ModuleId) -> Option<Rc<Module>> {
        self.modules.get(&id).map(Rc::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{Binding, Referent, SymbolId, testing::MemoryLoader};

    fn project_dir() -> &'static Path {
        Path::new("/project")
    }

    #[test]
    fn test_same_key_returns_identical_module() {
        let loader = MemoryLoader::new([("mathutil", "def double(x):\n    return x * 2\n")]);
        let classifier = StdlibClassifier::default();
        let mut resolver = SymbolResolver::new(&loader, &classifier);

        let first = resolver
            .import_from("mathutil", project_dir())
            .expect("mathutil should load");
        let second = resolver
            .import_from("mathutil", project_dir())
            .expect("mathutil should load");

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(loader.calls(), 1);
    }

    #[test]
    fn test_same_location_shares_module_across_keys() {
        let loader = MemoryLoader::new([("util", "VALUE = 1\n")]).alias("..util", "util");
        let classifier = StdlibClassifier::default();
        let mut resolver = SymbolResolver::new(&loader, &classifier);

        let absolute = resolver
            .import_from("util", project_dir())
            .expect("util should load");
        let relative = resolver
            .import_from("..util", Path::new("/project/pkg"))
            .expect("util should load");

        assert!(Rc::ptr_eq(&absolute, &relative));
        assert_eq!(loader.calls(), 2);
    }

    #[test]
    fn test_builtins_never_reach_the_loader() {
        let loader = MemoryLoader::empty();
        let classifier = StdlibClassifier::default();
        let mut resolver = SymbolResolver::new(&loader, &classifier);

        let builtins = resolver
            .import_from("builtins", project_dir())
            .expect("builtins always resolves");

        assert_eq!(builtins.id(), ModuleId::BUILTINS);
        assert_eq!(builtins.kind(), ModuleKind::Builtins);
        assert_eq!(loader.calls(), 0);
    }

    #[test]
    fn test_stdlib_modules_are_opaque_and_shared() {
        let loader = MemoryLoader::empty();
        let classifier = StdlibClassifier::default();
        let mut resolver = SymbolResolver::new(&loader, &classifier);

        let os = resolver
            .import_from("os", project_dir())
            .expect("os is stdlib");
        let again = resolver
            .import_from("os", Path::new("/elsewhere"))
            .expect("os is stdlib");

        assert!(Rc::ptr_eq(&os, &again));
        assert!(os.is_opaque());
        assert!(matches!(os.member("getcwd"), Some(Binding::Symbol(_))));
        assert_eq!(loader.calls(), 0);
    }

    #[test]
    fn test_missing_module_is_a_load_error() {
        let loader = MemoryLoader::empty();
        let classifier = StdlibClassifier::default();
        let mut resolver = SymbolResolver::new(&loader, &classifier);

        let err = resolver
            .import_from("nowhere", project_dir())
            .expect_err("nothing to load");
        assert!(matches!(err, BundleError::PackageLoad { .. }));
    }

    #[test]
    fn test_circular_imports_resolve() {
        let loader = MemoryLoader::new([
            ("a", "import b\n\ndef from_a():\n    return b.from_b()\n"),
            ("b", "import a\n\ndef from_b():\n    return 1\n\ndef call_a():\n    return a.from_a()\n"),
        ]);
        let classifier = StdlibClassifier::default();
        let mut resolver = SymbolResolver::new(&loader, &classifier);

        let a = resolver.import_from("a", project_dir()).expect("a resolves");
        assert!(a.lookup("from_a").is_some());
        assert_eq!(loader.calls(), 2);
    }

    #[test]
    fn test_resolution_reports_every_loaded_file() {
        let loader = MemoryLoader::new([
            ("mathutil", "def double(x):\n    return x * 2\n"),
            ("unused_helpers", "def noop():\n    pass\n"),
        ]);
        let classifier = StdlibClassifier::default();
        let entry = MemoryLoader::entry("import mathutil\nimport unused_helpers\nprint(mathutil.double(2))\n");

        let resolution = SymbolResolver::new(&loader, &classifier)
            .resolve(entry)
            .expect("program resolves");

        let names: Vec<&str> = resolution
            .files
            .iter()
            .map(|file| file.module_name.as_str())
            .collect();
        assert_eq!(names, vec!["mathutil", "unused_helpers"]);
        assert_eq!(resolution.entry.module_name, ENTRY_MODULE_NAME);

        let mathutil = resolution
            .modules
            .values()
            .find(|module| module.name() == "mathutil")
            .expect("mathutil module");
        let double = SymbolId::global(mathutil.id(), "double");
        assert_eq!(
            mathutil.lookup("double").map(|binding| binding.referent()),
            Some(Referent::Symbol(double))
        );
    }
}
