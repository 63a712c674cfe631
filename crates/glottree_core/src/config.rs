//! Repository layout configuration.
//!
//! # Responsibility
//! - Resolve every path the tools read or write from one repos root.
//! - Apply optional overrides from `<repos>/glottree.json`.
//!
//! # Invariants
//! - A missing config file means defaults, never an error.
//! - `indent_width` is at least 1.

use crate::service::flat_service::{PartitionRule, DEFAULT_INDENT_WIDTH};
use log::info;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "glottree.json";

/// Errors while reading repository configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A value parsed but is out of range.
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Parse { path, source } => {
                write!(f, "invalid config {}: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

/// Layout of one data repository; relative paths resolve against the root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    #[serde(skip)]
    repos: PathBuf,
    pub tree_dir: PathBuf,
    pub registry_file: PathBuf,
    pub iso_dir: PathBuf,
    pub build_dir: PathBuf,
    pub document_a: String,
    pub document_b: String,
    pub indent_width: usize,
    pub partition: PartitionRule,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            repos: PathBuf::from("."),
            tree_dir: PathBuf::from("languoids/tree"),
            registry_file: PathBuf::from("languoids/glottocodes"),
            iso_dir: PathBuf::from("iso639-3"),
            build_dir: PathBuf::from("build"),
            document_a: "lff.txt".to_string(),
            document_b: "dff.txt".to_string(),
            indent_width: DEFAULT_INDENT_WIDTH,
            partition: PartitionRule::default(),
        }
    }
}

impl RepoConfig {
    /// Loads the config for the repository rooted at `repos`.
    pub fn load(repos: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let repos = repos.as_ref();
        let path = repos.join(CONFIG_FILE_NAME);
        let mut config = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<Self>(&content)
                .map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        config.repos = repos.to_path_buf();
        config.validate()?;

        info!(
            "event=config_load module=config status=ok repos={} tree_dir={} partition={} indent_width={}",
            repos.display(),
            config.tree_dir.display(),
            config.partition.as_str(),
            config.indent_width
        );
        Ok(config)
    }

    /// Defaults rooted at `repos`, ignoring any config file.
    pub fn with_root(repos: impl Into<PathBuf>) -> Self {
        Self {
            repos: repos.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indent_width == 0 {
            return Err(ConfigError::Invalid(
                "indent_width must be at least 1".to_string(),
            ));
        }
        for (field, value) in [
            ("document_a", &self.document_a),
            ("document_b", &self.document_b),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} cannot be empty")));
            }
        }
        if self.document_a == self.document_b {
            return Err(ConfigError::Invalid(
                "document_a and document_b must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn repos(&self) -> &Path {
        &self.repos
    }

    pub fn tree_root(&self) -> PathBuf {
        self.repos.join(&self.tree_dir)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.repos.join(&self.registry_file)
    }

    pub fn iso_path(&self) -> PathBuf {
        self.repos.join(&self.iso_dir)
    }

    pub fn document_a_path(&self) -> PathBuf {
        self.repos.join(&self.build_dir).join(&self.document_a)
    }

    pub fn document_b_path(&self) -> PathBuf {
        self.repos.join(&self.build_dir).join(&self.document_b)
    }
}
