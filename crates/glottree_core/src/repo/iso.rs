//! Read-only ISO 639-3 code registry.
//!
//! # Responsibility
//! - Answer "is this code known, and is it retired?" for the validator.
//! - List active code table rows (scope, language type) for reports.
//! - Load the SIL code tables (`iso-639-3.tab`, `iso-639-3_Retirements.tab`).
//!
//! # Invariants
//! - A code is either active or retired, never both; retirement wins.
//! - Absence of the tables is not an error; callers skip ISO checks.

use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CODES_FILE_NAME: &str = "iso-639-3.tab";
pub const RETIREMENTS_FILE_NAME: &str = "iso-639-3_Retirements.tab";

static REMEDY_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([a-z]{3})\]").expect("remedy pattern must compile"));

/// Lookup result for one ISO code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoCode {
    pub code: String,
    pub is_retired: bool,
    /// Codes that replace a retired code, in table order.
    pub replacement_codes: Vec<String>,
}

impl Display for IsoCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_retired {
            write!(f, "<retired ISO code {}>", self.code)
        } else {
            write!(f, "<ISO code {}>", self.code)
        }
    }
}

/// One row of the active code table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoLanguage {
    pub code: String,
    /// `I`ndividual, `M`acrolanguage or `S`pecial.
    pub scope: String,
    /// `L`iving, `E`xtinct, `A`ncient, `H`istorical, `C`onstructed or `S`pecial.
    pub language_type: String,
    pub name: String,
}

impl IsoLanguage {
    pub fn is_living_individual(&self) -> bool {
        self.scope == "I" && self.language_type == "L"
    }

    /// Human-readable `<scope>/<type>` label, e.g. `Individual/Living`.
    pub fn kind(&self) -> String {
        let scope = match self.scope.as_str() {
            "I" => "Individual",
            "M" => "Macrolanguage",
            "S" => "Special",
            other => other,
        };
        let language_type = match self.language_type.as_str() {
            "L" => "Living",
            "E" => "Extinct",
            "A" => "Ancient",
            "H" => "Historical",
            "C" => "Constructed",
            "S" => "Special",
            other => other,
        };
        format!("{scope}/{language_type}")
    }
}

/// External ISO registry collaborator.
pub trait IsoRegistry {
    fn lookup(&self, code: &str) -> Option<IsoCode>;
}

/// Errors while reading ISO tables.
#[derive(Debug)]
pub enum IsoError {
    Io { path: PathBuf, source: io::Error },
    InvalidRow { path: PathBuf, line: usize },
}

impl Display for IsoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::InvalidRow { path, line } => {
                write!(f, "{}: malformed row on line {line}", path.display())
            }
        }
    }
}

impl Error for IsoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::InvalidRow { .. } => None,
        }
    }
}

/// In-memory ISO table.
#[derive(Debug, Clone, Default)]
pub struct IsoTable {
    codes: HashMap<String, IsoCode>,
    languages: BTreeMap<String, IsoLanguage>,
}

impl IsoTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the SIL tab files from `dir`.
    ///
    /// Returns `Ok(None)` when the directory or the main code table is
    /// missing. The retirements table is optional.
    pub fn load(dir: impl AsRef<Path>) -> Result<Option<Self>, IsoError> {
        let dir = dir.as_ref();
        let codes_path = dir.join(CODES_FILE_NAME);
        let Some(codes) = read_optional(&codes_path)? else {
            return Ok(None);
        };

        let mut table = Self::new();
        for (line, columns) in data_rows(&codes) {
            if columns.len() < 7 || columns[0].is_empty() {
                return Err(IsoError::InvalidRow {
                    path: codes_path.clone(),
                    line,
                });
            }
            table.insert_language(IsoLanguage {
                code: columns[0].to_string(),
                scope: columns[4].to_string(),
                language_type: columns[5].to_string(),
                name: columns[6].to_string(),
            });
        }

        let retirements_path = dir.join(RETIREMENTS_FILE_NAME);
        if let Some(retirements) = read_optional(&retirements_path)? {
            for (line, columns) in data_rows(&retirements) {
                if columns.len() < 5 || columns[0].is_empty() {
                    return Err(IsoError::InvalidRow {
                        path: retirements_path.clone(),
                        line,
                    });
                }
                let mut replacements: Vec<String> = Vec::new();
                if !columns[3].is_empty() {
                    replacements.push(columns[3].to_string());
                }
                for capture in REMEDY_CODE_PATTERN.captures_iter(columns[4]) {
                    let code = capture[1].to_string();
                    if !replacements.contains(&code) {
                        replacements.push(code);
                    }
                }
                table.insert_retired(columns[0], replacements);
            }
        }

        info!(
            "event=iso_load module=iso status=ok codes={} dir={}",
            table.len(),
            dir.display()
        );
        Ok(Some(table))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Active code table rows, sorted by code.
    pub fn languages(&self) -> impl Iterator<Item = &IsoLanguage> {
        self.languages.values()
    }

    /// Every code named as a replacement of some retired code.
    pub fn replacement_codes(&self) -> BTreeSet<&str> {
        self.codes
            .values()
            .filter(|code| code.is_retired)
            .flat_map(|code| code.replacement_codes.iter().map(String::as_str))
            .collect()
    }

    pub fn insert_language(&mut self, language: IsoLanguage) {
        self.insert_active(&language.code);
        self.languages.insert(language.code.clone(), language);
    }

    pub fn insert_active(&mut self, code: &str) {
        if self
            .codes
            .get(code)
            .is_some_and(|existing| existing.is_retired)
        {
            return;
        }
        self.codes.insert(
            code.to_string(),
            IsoCode {
                code: code.to_string(),
                is_retired: false,
                replacement_codes: Vec::new(),
            },
        );
    }

    pub fn insert_retired(&mut self, code: &str, replacement_codes: Vec<String>) {
        self.codes.insert(
            code.to_string(),
            IsoCode {
                code: code.to_string(),
                is_retired: true,
                replacement_codes,
            },
        );
    }
}

impl IsoRegistry for IsoTable {
    fn lookup(&self, code: &str) -> Option<IsoCode> {
        self.codes.get(code.trim()).cloned()
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, IsoError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(IsoError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Non-empty rows after the header, with 1-based line numbers.
fn data_rows(content: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    content
        .lines()
        .enumerate()
        .skip(1)
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            (
                index + 1,
                line.trim_end_matches('\r').split('\t').map(str::trim).collect(),
            )
        })
}
