//! Languoid identifier value type.
//!
//! # Responsibility
//! - Validate identifier syntax once, at the boundary where text enters core.
//! - Provide a cheap, ordered, hashable key for forest and registry lookups.
//!
//! # Invariants
//! - Every `Identifier` matches `^[a-z]{4}[0-9]{4}$`.
//! - Identifiers are never reused; uniqueness is owned by the registry.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Borrow;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]{4}[0-9]{4}$").expect("identifier pattern must compile")
});

/// Prefix of the reserved "unidentified" family and its provisional codes.
pub const UNIDENTIFIED_PREFIX: &str = "unun9";

/// Stable 8-character languoid identifier, e.g. `wolo1235`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Parses and validates one identifier.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if !is_valid_identifier(trimmed) {
            return Err(IdentifierError::InvalidFormat(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identifier belongs to the reserved unidentified family.
    pub fn is_unidentified(&self) -> bool {
        self.0.starts_with(UNIDENTIFIED_PREFIX)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identifier {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl FromStr for Identifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Returns whether `value` matches the identifier pattern.
pub fn is_valid_identifier(value: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(value)
}

/// Identifier syntax errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    Empty,
    InvalidFormat(String),
}

impl Display for IdentifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "identifier must not be empty"),
            Self::InvalidFormat(value) => write!(
                f,
                "invalid identifier `{value}`; expected 4 lowercase letters followed by 4 digits"
            ),
        }
    }
}

impl Error for IdentifierError {}
