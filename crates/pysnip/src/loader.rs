//! Package loading: locating Python modules on disk and parsing them.
//!
//! The symbol resolver only talks to the [`PackageLoader`] trait, so tests can
//! substitute in-memory or counting loaders. [`FsPackageLoader`] is the
//! filesystem implementation used by the CLI.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use log::{debug, trace, warn};
use ruff_python_ast::ModModule;
use ruff_python_parser::parse_module;

use crate::error::{BundleError, BundleResult};

/// A parsed source file, before the resolver has numbered its nodes
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub source: String,
    pub ast: ModModule,
}

/// The result of loading one module
#[derive(Debug)]
pub struct LoadedPackage {
    /// Dotted module name (e.g., "utils.helpers")
    pub name: String,
    /// Canonical location: the module file, or the directory of a namespace package
    pub location: PathBuf,
    /// Whether submodules may be imported from this module
    pub is_package: bool,
    /// Parsed files of the module, in load order (empty for namespace packages)
    pub files: Vec<ParsedFile>,
}

/// Locates and parses the module named by an import
pub trait PackageLoader {
    /// Load the module `import_path` as imported by a file in `origin_dir`.
    ///
    /// Returns `Ok(None)` when no module matches. Read and parse failures are
    /// errors.
    fn load(&self, import_path: &str, origin_dir: &Path) -> BundleResult<Option<LoadedPackage>>;
}

/// Read and parse a Python file
pub fn parse_file(path: &Path) -> BundleResult<ParsedFile> {
    let source = std::fs::read_to_string(path).map_err(|err| BundleError::PackageLoad {
        import_path: path.display().to_string(),
        origin_dir: path.parent().unwrap_or(path).to_path_buf(),
        reason: format!("failed to read file: {err}"),
    })?;
    parse_source(path, source)
}

/// Parse already-read source text
pub fn parse_source(path: &Path, source: String) -> BundleResult<ParsedFile> {
    let parsed = parse_module(&source).map_err(|err| BundleError::parse(path, &source, &err))?;
    Ok(ParsedFile {
        path: path.to_path_buf(),
        ast: parsed.into_syntax(),
        source,
    })
}

/// Module descriptor for import resolution
#[derive(Debug)]
struct ImportModuleDescriptor {
    /// Number of leading dots for relative imports
    leading_dots: usize,
    /// Module name parts (e.g., ["foo", "bar"] for "foo.bar")
    name_parts: Vec<String>,
}

impl ImportModuleDescriptor {
    fn from_module_name(name: &str) -> Self {
        let leading_dots = name.chars().take_while(|c| *c == '.').count();
        let name_parts = name[leading_dots..]
            .split('.')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Self {
            leading_dots,
            name_parts,
        }
    }
}

/// Where a module was found on disk
#[derive(Debug, PartialEq, Eq)]
enum ModuleLocation {
    /// `foo/__init__.py`
    Package(PathBuf),
    /// `foo.py`
    File(PathBuf),
    /// `foo/` without `__init__.py`
    Namespace(PathBuf),
}

/// Filesystem package loader following Python's import resolution
#[derive(Debug)]
pub struct FsPackageLoader {
    /// Directories searched for absolute imports, in priority order
    search_dirs: Vec<PathBuf>,
}

impl FsPackageLoader {
    /// Create a loader searching the entry directory, then `PYTHONPATH`,
    /// then the configured source directories
    pub fn new(entry_dir: &Path, src: &[PathBuf]) -> Self {
        let pythonpath = std::env::var("PYTHONPATH").ok();
        Self::new_with_pythonpath(entry_dir, src, pythonpath.as_deref())
    }

    /// Create a loader with an explicit PYTHONPATH value (used by tests)
    pub fn new_with_pythonpath(entry_dir: &Path, src: &[PathBuf], pythonpath: Option<&str>) -> Self {
        let mut unique_dirs = IndexSet::new();

        // Entry file's directory is always first
        unique_dirs.insert(canonicalize_path(entry_dir.to_path_buf()));

        if let Some(pythonpath) = pythonpath {
            let separator = if cfg!(windows) { ';' } else { ':' };
            for path_str in pythonpath.split(separator) {
                if path_str.is_empty() {
                    continue;
                }
                let path = PathBuf::from(path_str);
                if path.is_dir() {
                    unique_dirs.insert(canonicalize_path(path));
                }
            }
        }

        for dir in src {
            unique_dirs.insert(canonicalize_path(dir.clone()));
        }

        let search_dirs: Vec<PathBuf> = unique_dirs.into_iter().collect();
        debug!("Module search path: {search_dirs:?}");
        Self { search_dirs }
    }

    /// Directories searched for absolute imports, in priority order
    pub fn search_directories(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    fn locate(&self, import_path: &str, origin_dir: &Path) -> Option<ModuleLocation> {
        let descriptor = ImportModuleDescriptor::from_module_name(import_path);

        if descriptor.leading_dots > 0 {
            return resolve_relative(&descriptor, origin_dir);
        }

        self.search_dirs
            .iter()
            .find_map(|search_dir| resolve_in_directory(search_dir, &descriptor))
    }

    /// Dotted name for a module found at `location`
    fn module_name(&self, import_path: &str, location: &Path) -> String {
        if !import_path.starts_with('.') {
            return import_path.to_string();
        }

        // Relative imports: name the module after its position under a search root
        let mut parts: Vec<String> = self
            .search_dirs
            .iter()
            .find_map(|root| location.strip_prefix(root).ok())
            .map(|relative| {
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_else(|| {
                location
                    .file_name()
                    .map(|name| vec![name.to_string_lossy().into_owned()])
                    .unwrap_or_default()
            });

        if parts.last().is_some_and(|last| last == "__init__.py") {
            parts.pop();
        } else if let Some(last) = parts.last_mut()
            && let Some(stem) = last.strip_suffix(".py")
        {
            *last = stem.to_string();
        }
        parts.join(".")
    }
}

impl PackageLoader for FsPackageLoader {
    fn load(&self, import_path: &str, origin_dir: &Path) -> BundleResult<Option<LoadedPackage>> {
        let Some(location) = self.locate(import_path, origin_dir) else {
            trace!("No module found for '{import_path}' from {}", origin_dir.display());
            return Ok(None);
        };

        let (location, is_package, files) = match location {
            ModuleLocation::Package(init) => {
                let parsed = parse_file(&init)?;
                (init, true, vec![parsed])
            }
            ModuleLocation::File(file) => {
                let parsed = parse_file(&file)?;
                (file, false, vec![parsed])
            }
            ModuleLocation::Namespace(dir) => (dir, true, Vec::new()),
        };

        let name = self.module_name(import_path, &location);
        debug!("Loaded module '{name}' from {}", location.display());

        Ok(Some(LoadedPackage {
            name,
            location,
            is_package,
            files,
        }))
    }
}

/// Canonicalize a path, handling errors gracefully
fn canonicalize_path(path: PathBuf) -> PathBuf {
    match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(e) => {
            warn!("Failed to canonicalize path {}: {}", path.display(), e);
            path
        }
    }
}

/// Resolve an absolute import within one search directory
///
/// For the last name part the order is: package (`foo/__init__.py`), module
/// file (`foo.py`), namespace package (`foo/`). Intermediate parts must be
/// regular or namespace packages.
fn resolve_in_directory(root: &Path, descriptor: &ImportModuleDescriptor) -> Option<ModuleLocation> {
    let (last, intermediate) = descriptor.name_parts.split_last()?;

    let mut current_path = root.to_path_buf();
    for part in intermediate {
        current_path = current_path.join(part);
        if !current_path.is_dir() {
            return None;
        }
    }

    probe(&current_path, last)
}

/// Resolve a relative import against the importing file's directory
///
/// One dot is the directory itself, every further dot goes up one level.
fn resolve_relative(descriptor: &ImportModuleDescriptor, origin_dir: &Path) -> Option<ModuleLocation> {
    let mut base_dir = origin_dir;
    for _ in 1..descriptor.leading_dots {
        base_dir = base_dir.parent()?;
    }

    let Some((last, intermediate)) = descriptor.name_parts.split_last() else {
        // `from . import x`: the package itself
        let init_path = base_dir.join("__init__.py");
        if init_path.is_file() {
            return Some(ModuleLocation::Package(canonicalize_path(init_path)));
        }
        return base_dir
            .is_dir()
            .then(|| ModuleLocation::Namespace(canonicalize_path(base_dir.to_path_buf())));
    };

    let parent = intermediate
        .iter()
        .fold(base_dir.to_path_buf(), |path, part| path.join(part));
    probe(&parent, last)
}

fn probe(parent: &Path, name: &str) -> Option<ModuleLocation> {
    let package_init = parent.join(name).join("__init__.py");
    if package_init.is_file() {
        trace!("Found package at: {package_init:?}");
        return Some(ModuleLocation::Package(canonicalize_path(package_init)));
    }

    let module_file = parent.join(format!("{name}.py"));
    if module_file.is_file() {
        trace!("Found module file at: {module_file:?}");
        return Some(ModuleLocation::File(canonicalize_path(module_file)));
    }

    let namespace_dir = parent.join(name);
    if namespace_dir.is_dir() {
        trace!("Found namespace package at: {namespace_dir:?}");
        return Some(ModuleLocation::Namespace(canonicalize_path(namespace_dir)));
    }

    None
}
