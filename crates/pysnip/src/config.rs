//! Layered configuration
//!
//! Later layers override earlier ones: built-in defaults, the user config
//! file, the project config file, then command line flags. List settings
//! accumulate instead of being replaced.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use etcetera::{BaseStrategy, choose_base_strategy};
use indexmap::IndexSet;
use log::debug;
use serde::Deserialize;

use crate::{bundler::BundleOptions, stdlib_detection::DEFAULT_PYTHON_MINOR};

/// File name of user and project configuration files
pub const CONFIG_FILE_NAME: &str = "pysnip.toml";

/// Fully merged configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub src: Vec<PathBuf>,
    pub known_third_party: IndexSet<String>,
    pub target_version: String,
    pub deduplicate: bool,
    pub share_group_docs: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            src: Vec::new(),
            known_third_party: IndexSet::new(),
            target_version: format!("py3{DEFAULT_PYTHON_MINOR}"),
            deduplicate: false,
            share_group_docs: true,
        }
    }
}

/// One layer of settings, as read from a file or the command line
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ConfigLayer {
    pub src: Vec<PathBuf>,
    pub known_third_party: Vec<String>,
    pub target_version: Option<String>,
    pub deduplicate: Option<bool>,
    pub share_group_docs: Option<bool>,
}

impl ConfigLayer {
    /// Read a layer from a TOML file
    ///
    /// Relative `src` entries are taken relative to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut layer: Self = toml::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        if let Some(base) = path.parent() {
            layer.src = layer.src.into_iter().map(|dir| base.join(dir)).collect();
        }
        Ok(layer)
    }
}

impl Config {
    /// Load the user and project layers
    ///
    /// `explicit` replaces the project config found next to the entry file
    /// and must exist.
    pub fn load(project_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut files = Vec::new();

        if let Some(user) = user_config_path().filter(|path| path.is_file()) {
            files.push(user);
        }
        match explicit {
            Some(path) => {
                if !path.is_file() {
                    bail!("Config file {} does not exist", path.display());
                }
                files.push(path.to_path_buf());
            }
            None => {
                let project = project_dir.join(CONFIG_FILE_NAME);
                if project.is_file() {
                    files.push(project);
                }
            }
        }

        Self::from_files(&files)
    }

    /// Merge the given config files over the defaults, in order
    pub fn from_files(files: &[PathBuf]) -> Result<Self> {
        let mut config = Self::default();
        for file in files {
            debug!("Loading configuration from {}", file.display());
            config.apply(ConfigLayer::from_file(file)?);
        }
        Ok(config)
    }

    /// Apply a layer on top of this configuration
    pub fn apply(&mut self, layer: ConfigLayer) {
        self.src.extend(layer.src);
        self.known_third_party.extend(layer.known_third_party);
        if let Some(target_version) = layer.target_version {
            self.target_version = target_version;
        }
        if let Some(deduplicate) = layer.deduplicate {
            self.deduplicate = deduplicate;
        }
        if let Some(share_group_docs) = layer.share_group_docs {
            self.share_group_docs = share_group_docs;
        }
    }

    /// Python minor version named by `target_version`
    pub fn python_minor(&self) -> Result<u8> {
        parse_target_version(&self.target_version)
    }

    pub fn to_bundle_options(&self) -> Result<BundleOptions> {
        Ok(BundleOptions {
            src: self.src.clone(),
            known_third_party: self.known_third_party.iter().cloned().collect(),
            python_minor: self.python_minor()?,
            deduplicate: self.deduplicate,
            share_group_docs: self.share_group_docs,
        })
    }
}

/// `<config dir>/pysnip/pysnip.toml`, when a home directory is known
fn user_config_path() -> Option<PathBuf> {
    let strategy = choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("pysnip").join(CONFIG_FILE_NAME))
}

/// Parse `py312` or `3.12` into the minor version `12`
pub fn parse_target_version(version: &str) -> Result<u8> {
    let minor = version
        .strip_prefix("py3")
        .or_else(|| version.strip_prefix("3."))
        .filter(|minor| !minor.is_empty() && minor.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| anyhow!("Invalid target version `{version}`, expected e.g. `py312`"))?;

    let minor: u8 = minor
        .parse()
        .with_context(|| format!("Invalid target version `{version}`"))?;
    if minor < 7 {
        bail!("Unsupported target version `{version}`, Python 3.7 or later is required");
    }
    Ok(minor)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).expect("config written");
        path
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_files(&[]).expect("defaults load");
        assert_eq!(config, Config::default());
        assert_eq!(config.python_minor().expect("valid version"), 12);
        assert!(!config.deduplicate);
        assert!(config.share_group_docs);
    }

    #[test]
    fn test_layers_override_and_accumulate() {
        let user_dir = TempDir::new().expect("temp dir");
        let project_dir = TempDir::new().expect("temp dir");

        let user = write(
            user_dir.path(),
            "pysnip.toml",
            "src = [\"lib\"]\nknown-third-party = [\"numpy\"]\ntarget-version = \"py310\"\ndeduplicate = true\n",
        );
        let project = write(
            project_dir.path(),
            "pysnip.toml",
            "src = [\"vendor\"]\nknown-third-party = [\"numpy\", \"sortedcontainers\"]\ntarget-version = \"py311\"\n",
        );

        let mut config = Config::from_files(&[user, project]).expect("layers load");
        assert_eq!(
            config.src,
            vec![user_dir.path().join("lib"), project_dir.path().join("vendor")]
        );
        assert_eq!(
            config.known_third_party.iter().collect::<Vec<_>>(),
            vec!["numpy", "sortedcontainers"]
        );
        assert_eq!(config.target_version, "py311");
        assert!(config.deduplicate);

        config.apply(ConfigLayer {
            deduplicate: Some(false),
            share_group_docs: Some(false),
            ..ConfigLayer::default()
        });
        let options = config.to_bundle_options().expect("valid options");
        assert_eq!(options.python_minor, 11);
        assert!(!options.deduplicate);
        assert!(!options.share_group_docs);
        assert_eq!(options.src.len(), 2);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let dir = TempDir::new().expect("temp dir");
        let path = write(dir.path(), "pysnip.toml", "dedupe = true\n");
        let err = Config::from_files(&[path]).expect_err("unknown field");
        assert!(format!("{err:#}").contains("unknown field"));
    }

    #[test]
    fn test_project_config_is_found_next_to_entry() {
        let dir = TempDir::new().expect("temp dir");
        write(dir.path(), CONFIG_FILE_NAME, "deduplicate = true\n");

        let config = Config::load(dir.path(), None).expect("config loads");
        assert!(config.deduplicate);
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = TempDir::new().expect("temp dir");
        let missing = dir.path().join("missing.toml");
        assert!(Config::load(dir.path(), Some(&missing)).is_err());
    }

    #[test]
    fn test_target_version_parsing() {
        assert_eq!(parse_target_version("py312").expect("valid"), 12);
        assert_eq!(parse_target_version("py38").expect("valid"), 8);
        assert_eq!(parse_target_version("3.13").expect("valid"), 13);
        assert!(parse_target_version("py2").is_err());
        assert!(parse_target_version("py36").is_err());
        assert!(parse_target_version("python3").is_err());
        assert!(parse_target_version("py3").is_err());
    }
}
