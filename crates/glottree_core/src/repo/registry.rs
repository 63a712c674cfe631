//! Identifier registry backed by an append-only flat file.
//!
//! # Responsibility
//! - Track every identifier ever assigned so none is reused.
//! - Mint new identifiers from display names.
//!
//! # Invariants
//! - Entries are never removed, in memory or on disk.
//! - `flush` only appends identifiers allocated or registered since the last
//!   load/flush.
//! - One identifier has at most one owning name per process.

use crate::model::identifier::Identifier;
use deunicode::deunicode;
use log::{error, info};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const FIRST_NUMBER: u32 = 1234;
const LAST_NUMBER: u32 = 9999;

/// Result type used by registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors from identifier registry operations.
#[derive(Debug)]
pub enum RegistryError {
    /// Identifier already owned by a different name.
    DuplicateIdentifier {
        identifier: Identifier,
        existing: String,
        requested: String,
    },
    /// Name yields no letters to derive an identifier from.
    InvalidName(String),
    /// Every number for the derived prefix is taken.
    Exhausted(String),
    /// Registry file holds a line that is not an identifier.
    InvalidEntry { line: usize, value: String },
    Io { path: PathBuf, source: io::Error },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateIdentifier {
                identifier,
                existing,
                requested,
            } => write!(
                f,
                "identifier {identifier} already registered for `{existing}`, refusing `{requested}`"
            ),
            Self::InvalidName(name) => {
                write!(f, "cannot derive identifier from name `{name}`")
            }
            Self::Exhausted(prefix) => write!(f, "no free identifier left for prefix `{prefix}`"),
            Self::InvalidEntry { line, value } => {
                write!(f, "invalid registry entry on line {line}: `{value}`")
            }
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Process-scoped set of used identifiers.
///
/// Passed by reference into every component that mints or checks
/// identifiers; loaded once at start and flushed once at the end.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    path: Option<PathBuf>,
    owners: HashMap<Identifier, Option<String>>,
    pending: Vec<Identifier>,
}

impl IdentifierRegistry {
    /// Creates an in-memory registry that is never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the registry file; a missing file yields an empty registry.
    pub fn load(path: impl AsRef<Path>) -> RegistryResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut registry = Self {
            path: Some(path.clone()),
            ..Self::default()
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(
                    "event=registry_load module=registry status=ok entries=0 path={} missing=true",
                    path.display()
                );
                return Ok(registry);
            }
            Err(source) => return Err(RegistryError::Io { path, source }),
        };

        for (index, raw) in content.lines().enumerate() {
            let value = raw.trim();
            if value.is_empty() || value.starts_with('#') {
                continue;
            }
            let identifier = Identifier::parse(value).map_err(|_| RegistryError::InvalidEntry {
                line: index + 1,
                value: value.to_string(),
            })?;
            registry.owners.entry(identifier).or_insert(None);
        }

        info!(
            "event=registry_load module=registry status=ok entries={} path={}",
            registry.owners.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    pub fn is_registered(&self, identifier: &str) -> bool {
        self.owners.contains_key(identifier)
    }

    /// Identifiers added since the last load or flush.
    pub fn pending(&self) -> &[Identifier] {
        &self.pending
    }

    /// Marks an identifier as permanently used by `owner`.
    ///
    /// Idempotent for the same owner. An entry loaded from disk carries no
    /// owner and adopts the first one registered.
    pub fn register(&mut self, identifier: &Identifier, owner: &str) -> RegistryResult<()> {
        let owner = owner.trim();
        if let Some(slot) = self.owners.get_mut(identifier) {
            if let Some(existing) = slot.as_ref() {
                if existing.as_str() != owner {
                    return Err(RegistryError::DuplicateIdentifier {
                        identifier: identifier.clone(),
                        existing: existing.clone(),
                        requested: owner.to_string(),
                    });
                }
                return Ok(());
            }
            *slot = Some(owner.to_string());
            return Ok(());
        }

        self.owners
            .insert(identifier.clone(), Some(owner.to_string()));
        self.pending.push(identifier.clone());
        Ok(())
    }

    /// Mints an unused identifier derived from `name`.
    ///
    /// The prefix is the first four ASCII letters of the transliterated,
    /// lowercased name, padded by repeating the last letter; numbers are tried upward from
    /// 1234.
    pub fn allocate(&mut self, name: &str) -> RegistryResult<Identifier> {
        let prefix = identifier_prefix(name)?;
        for number in FIRST_NUMBER..=LAST_NUMBER {
            let candidate = format!("{prefix}{number}");
            if self.owners.contains_key(candidate.as_str()) {
                continue;
            }
            let identifier = Identifier::parse(&candidate)
                .map_err(|_| RegistryError::InvalidName(name.to_string()))?;
            self.register(&identifier, name)?;
            return Ok(identifier);
        }
        Err(RegistryError::Exhausted(prefix))
    }

    /// Appends pending identifiers to the registry file.
    ///
    /// Returns the number of appended entries. In-memory registries only
    /// clear their pending list.
    pub fn flush(&mut self) -> RegistryResult<usize> {
        let count = self.pending.len();
        let Some(path) = self.path.clone() else {
            self.pending.clear();
            return Ok(0);
        };
        if count == 0 {
            return Ok(0);
        }

        let append = || -> io::Result<()> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let needs_newline = match fs::read(&path) {
                Ok(bytes) => bytes.last().is_some_and(|last| *last != b'\n'),
                Err(err) if err.kind() == io::ErrorKind::NotFound => false,
                Err(err) => return Err(err),
            };
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            if needs_newline {
                file.write_all(b"\n")?;
            }
            for identifier in &self.pending {
                writeln!(file, "{identifier}")?;
            }
            file.flush()
        };

        match append() {
            Ok(()) => {
                info!(
                    "event=registry_flush module=registry status=ok appended={} path={}",
                    count,
                    path.display()
                );
                self.pending.clear();
                Ok(count)
            }
            Err(source) => {
                error!(
                    "event=registry_flush module=registry status=error path={} error={}",
                    path.display(),
                    source
                );
                Err(RegistryError::Io { path, source })
            }
        }
    }
}

fn identifier_prefix(name: &str) -> RegistryResult<String> {
    let mut prefix: String = deunicode(name)
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(char::is_ascii_lowercase)
        .take(4)
        .collect();
    let Some(last) = prefix.chars().last() else {
        return Err(RegistryError::InvalidName(name.to_string()));
    };
    while prefix.len() < 4 {
        prefix.push(last);
    }
    Ok(prefix)
}
