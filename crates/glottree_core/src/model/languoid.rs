//! Languoid domain model.
//!
//! # Responsibility
//! - Define the canonical record for one family/language/dialect node.
//! - Map between typed core fields and the ordered metadata sections that
//!   are persisted next to every node.
//!
//! # Invariants
//! - `id` is only changed through `Forest::reassign_identifier`.
//! - Options outside the typed core fields are preserved in their original
//!   section and option order.
//! - `dir` is bookkeeping for the materializer and never part of equality.

use crate::model::identifier::{Identifier, IdentifierError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

pub const CORE_SECTION: &str = "core";
pub const CLASSIFICATION_SECTION: &str = "classification";
pub const BOOKKEEPING_CATEGORY: &str = "Bookkeeping";

const OPT_NAME: &str = "name";
const OPT_GLOTTOCODE: &str = "glottocode";
const OPT_LEVEL: &str = "level";
const OPT_ISO: &str = "iso639-3";
const OPT_CATEGORY: &str = "category";
const OPT_FAMILY: &str = "family";
const OPT_SUB: &str = "sub";

/// Nesting level of a languoid, ordered from outermost to innermost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Family,
    Language,
    Dialect,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Family, Level::Language, Level::Dialect];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::Language => "language",
            Self::Dialect => "dialect",
        }
    }

    /// One-letter marker used by flat documents.
    pub fn marker(self) -> char {
        match self {
            Self::Family => 'F',
            Self::Language => 'L',
            Self::Dialect => 'D',
        }
    }

    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            'F' => Some(Self::Family),
            'L' => Some(Self::Language),
            'D' => Some(Self::Dialect),
            _ => None,
        }
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "family" => Ok(Self::Family),
            "language" => Ok(Self::Language),
            "dialect" => Ok(Self::Dialect),
            other => Err(format!(
                "unknown level `{other}`; expected family|language|dialect"
            )),
        }
    }
}

/// Free-text rationale attached to a node's classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationComment {
    /// Rationale for the family-level classification.
    pub family: Option<String>,
    /// Rationale for the sub-classification.
    pub sub: Option<String>,
}

/// One named section of ordered option/value pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub options: Vec<(String, String)>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    pub fn get(&self, option: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(key, _)| key == option)
            .map(|(_, value)| value.as_str())
    }

    /// Sets an option in place, appending it when absent.
    pub fn set(&mut self, option: impl Into<String>, value: impl Into<String>) {
        let option = option.into();
        let value = value.into();
        match self.options.iter_mut().find(|(key, _)| *key == option) {
            Some(slot) => slot.1 = value,
            None => self.options.push((option, value)),
        }
    }

    fn remove(&mut self, option: &str) -> Option<String> {
        let index = self.options.iter().position(|(key, _)| key == option)?;
        Some(self.options.remove(index).1)
    }
}

/// Ordered section → option → value mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    sections: Vec<Section>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sections(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn into_sections(self) -> Vec<Section> {
        self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|section| section.options.is_empty())
    }

    pub fn get(&self, section: &str, option: &str) -> Option<&str> {
        self.section(section)?.get(option)
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.name == name)
    }

    /// Sets one option, creating the section at the end when absent.
    pub fn set(&mut self, section: &str, option: impl Into<String>, value: impl Into<String>) {
        self.section_mut(section).set(option, value);
    }

    fn section_mut(&mut self, name: &str) -> &mut Section {
        let index = match self.sections.iter().position(|section| section.name == name) {
            Some(index) => index,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[index]
    }

    fn drop_if_empty(&mut self, name: &str) {
        self.sections
            .retain(|section| section.name != name || !section.options.is_empty());
    }

    fn take(&mut self, section: &str, option: &str) -> Option<String> {
        let found = self
            .sections
            .iter_mut()
            .find(|candidate| candidate.name == section)?;
        found.remove(option)
    }
}

/// One node of the classification tree.
#[derive(Debug, Clone)]
pub struct Languoid {
    id: Identifier,
    /// Display name.
    pub name: String,
    pub level: Level,
    /// ISO 639-3 style cross-reference code.
    pub iso_code: Option<String>,
    /// Meaningful at language level only, e.g. [`BOOKKEEPING_CATEGORY`].
    pub category: Option<String>,
    pub classification: ClassificationComment,
    /// Every persisted option that is not a typed field above.
    pub metadata: Metadata,
    /// Last-known directory on disk; `None` for nodes never materialized.
    pub dir: Option<PathBuf>,
}

impl Languoid {
    /// Creates a languoid with empty optional fields.
    pub fn new(id: Identifier, name: impl Into<String>, level: Level) -> Self {
        Self {
            id,
            name: name.into(),
            level,
            iso_code: None,
            category: None,
            classification: ClassificationComment::default(),
            metadata: Metadata::new(),
            dir: None,
        }
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: Identifier) {
        self.id = id;
    }

    pub fn is_bookkeeping(&self) -> bool {
        self.category.as_deref() == Some(BOOKKEEPING_CATEGORY)
    }

    /// Builds a languoid from parsed metadata sections.
    ///
    /// # Errors
    /// - `glottocode` or `level` missing from `[core]`, or invalid.
    /// - `name` missing from `[core]` (an empty value is accepted and left to
    ///   the validator).
    pub fn from_sections(sections: Vec<Section>) -> Result<Self, LanguoidError> {
        let mut metadata = Metadata::from_sections(sections);

        let raw_id = metadata
            .take(CORE_SECTION, OPT_GLOTTOCODE)
            .ok_or(LanguoidError::MissingOption(OPT_GLOTTOCODE))?;
        let id = Identifier::parse(&raw_id).map_err(LanguoidError::InvalidIdentifier)?;
        let name = metadata
            .take(CORE_SECTION, OPT_NAME)
            .ok_or(LanguoidError::MissingOption(OPT_NAME))?;
        let raw_level = metadata
            .take(CORE_SECTION, OPT_LEVEL)
            .ok_or(LanguoidError::MissingOption(OPT_LEVEL))?;
        let level = raw_level.parse().map_err(LanguoidError::InvalidLevel)?;

        let iso_code = non_blank(metadata.take(CORE_SECTION, OPT_ISO));
        let category = non_blank(metadata.take(CORE_SECTION, OPT_CATEGORY));
        let classification = ClassificationComment {
            family: non_blank(metadata.take(CLASSIFICATION_SECTION, OPT_FAMILY)),
            sub: non_blank(metadata.take(CLASSIFICATION_SECTION, OPT_SUB)),
        };
        metadata.drop_if_empty(CORE_SECTION);
        metadata.drop_if_empty(CLASSIFICATION_SECTION);

        Ok(Self {
            id,
            name: name.trim().to_string(),
            level,
            iso_code,
            category,
            classification,
            metadata,
            dir: None,
        })
    }

    /// Renders the complete persisted section list.
    ///
    /// `[core]` always comes first and `[classification]` second when it has
    /// content; typed options lead their section, preserved options follow.
    pub fn to_sections(&self) -> Vec<Section> {
        let mut core = Section::new(CORE_SECTION);
        core.set(OPT_NAME, self.name.as_str());
        core.set(OPT_GLOTTOCODE, self.id.as_str());
        core.set(OPT_LEVEL, self.level.as_str());
        if let Some(iso) = &self.iso_code {
            core.set(OPT_ISO, iso.as_str());
        }
        if let Some(category) = &self.category {
            core.set(OPT_CATEGORY, category.as_str());
        }

        let mut classification = Section::new(CLASSIFICATION_SECTION);
        if let Some(family) = &self.classification.family {
            classification.set(OPT_FAMILY, family.as_str());
        }
        if let Some(sub) = &self.classification.sub {
            classification.set(OPT_SUB, sub.as_str());
        }

        let mut rest = Vec::new();
        for section in self.metadata.sections() {
            match section.name.as_str() {
                CORE_SECTION => core.options.extend(section.options.iter().cloned()),
                CLASSIFICATION_SECTION => classification
                    .options
                    .extend(section.options.iter().cloned()),
                _ => rest.push(section.clone()),
            }
        }

        let mut sections = vec![core];
        if !classification.options.is_empty() {
            sections.push(classification);
        }
        sections.extend(rest);
        sections
    }
}

impl PartialEq for Languoid {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.level == other.level
            && self.iso_code == other.iso_code
            && self.category == other.category
            && self.classification == other.classification
            && self.metadata == other.metadata
    }
}

impl Eq for Languoid {}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

/// Errors converting metadata sections into a languoid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LanguoidError {
    MissingOption(&'static str),
    InvalidIdentifier(IdentifierError),
    InvalidLevel(String),
}

impl Display for LanguoidError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingOption(option) => {
                write!(f, "missing required option `{option}` in [{CORE_SECTION}]")
            }
            Self::InvalidIdentifier(err) => write!(f, "{err}"),
            Self::InvalidLevel(message) => write!(f, "{message}"),
        }
    }
}

impl Error for LanguoidError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidIdentifier(err) => Some(err),
            Self::MissingOption(_) | Self::InvalidLevel(_) => None,
        }
    }
}
