//! In-memory package loader for analysis tests

use std::{
    cell::Cell,
    path::{Path, PathBuf},
};

use crate::{
    error::BundleResult,
    loader::{LoadedPackage, PackageLoader, ParsedFile, parse_source},
    types::FxIndexMap,
};

/// Serves modules from source strings keyed by import path
///
/// Every module lives at `/project/<name>.py`; a name listed as a package
/// lives at `/project/<name>/__init__.py`. The originating directory is
/// ignored, so relative spellings are registered with [`MemoryLoader::alias`].
pub(crate) struct MemoryLoader {
    modules: FxIndexMap<String, String>,
    packages: Vec<String>,
    aliases: FxIndexMap<String, String>,
    calls: Cell<usize>,
}

impl MemoryLoader {
    pub(crate) fn new<'s>(modules: impl IntoIterator<Item = (&'s str, &'s str)>) -> Self {
        Self {
            modules: modules
                .into_iter()
                .map(|(name, source)| (name.to_string(), source.to_string()))
                .collect(),
            packages: Vec::new(),
            aliases: FxIndexMap::default(),
            calls: Cell::new(0),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn package(mut self, name: &str) -> Self {
        self.packages.push(name.to_string());
        self
    }

    pub(crate) fn alias(mut self, import_path: &str, name: &str) -> Self {
        self.aliases
            .insert(import_path.to_string(), name.to_string());
        self
    }

    /// Number of `load` calls so far
    pub(crate) fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Parse an entry file located at `/project/main.py`
    pub(crate) fn entry(source: &str) -> ParsedFile {
        parse_source(Path::new("/project/main.py"), source.to_string())
            .expect("entry source should parse")
    }

    fn location(&self, name: &str) -> PathBuf {
        let relative = name.replace('.', "/");
        if self.packages.iter().any(|package| package == name) {
            PathBuf::from(format!("/project/{relative}/__init__.py"))
        } else {
            PathBuf::from(format!("/project/{relative}.py"))
        }
    }
}

impl PackageLoader for MemoryLoader {
    fn load(&self, import_path: &str, _origin_dir: &Path) -> BundleResult<Option<LoadedPackage>> {
        self.calls.set(self.calls.get() + 1);

        let name = self
            .aliases
            .get(import_path)
            .map_or(import_path, String::as_str);
        let Some(source) = self.modules.get(name) else {
            return Ok(None);
        };

        let location = self.location(name);
        let parsed = parse_source(&location, source.clone())?;
        Ok(Some(LoadedPackage {
            name: name.to_string(),
            location,
            is_package: self.packages.iter().any(|package| package == name),
            files: vec![parsed],
        }))
    }
}
