//! Flat document transcoder.
//!
//! # Responsibility
//! - Encode a forest into two indented flat documents.
//! - Decode flat documents back into a forest, minting identifiers for new
//!   lines and carrying non-line attributes from a base forest.
//!
//! # Invariants
//! - One line per node: `<indent><marker> [<id>][<iso>] <name>`.
//! - Every root lands in exactly one document, followed by its subtree.
//! - An identifier occurs on at most one line across both documents.
//! - `decode_onto(encode(f), f) == f` for every partition predicate.

use crate::model::forest::{Forest, ForestError, NodeKey, Tombstone};
use crate::model::identifier::{Identifier, IdentifierError};
use crate::model::languoid::{Languoid, Level};
use crate::repo::registry::{IdentifierRegistry, RegistryError};
use log::{error, info};
use serde::Deserialize;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Instant;

pub const DEFAULT_INDENT_WIDTH: usize = 4;

/// Which of the two flat documents a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Document {
    A,
    B,
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

/// Result type used by transcoder operations.
pub type TranscodeResult<T> = Result<T, TranscodeError>;

/// Errors from decoding flat documents; line numbers are 1-based.
#[derive(Debug)]
pub enum TranscodeError {
    /// Tab indentation, a width that is not a multiple of the indent unit, or
    /// a jump of more than one level.
    MalformedIndent { document: Document, line: usize },
    /// Line is shallower than the first line of its document.
    UnbalancedIndent { document: Document, line: usize },
    DuplicateLine {
        identifier: Identifier,
        document: Document,
        line: usize,
    },
    MalformedLine {
        document: Document,
        line: usize,
        reason: String,
    },
    Identifier {
        document: Document,
        line: usize,
        source: IdentifierError,
    },
    Registry {
        document: Document,
        line: usize,
        source: RegistryError,
    },
    Forest(ForestError),
}

impl Display for TranscodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedIndent { document, line } => {
                write!(f, "document {document}, line {line}: malformed indentation")
            }
            Self::UnbalancedIndent { document, line } => write!(
                f,
                "document {document}, line {line}: indentation above the first line"
            ),
            Self::DuplicateLine {
                identifier,
                document,
                line,
            } => write!(
                f,
                "document {document}, line {line}: identifier {identifier} already used on another line"
            ),
            Self::MalformedLine {
                document,
                line,
                reason,
            } => write!(f, "document {document}, line {line}: {reason}"),
            Self::Identifier {
                document,
                line,
                source,
            } => write!(f, "document {document}, line {line}: {source}"),
            Self::Registry {
                document,
                line,
                source,
            } => write!(f, "document {document}, line {line}: {source}"),
            Self::Forest(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TranscodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Identifier { source, .. } => Some(source),
            Self::Registry { source, .. } => Some(source),
            Self::Forest(err) => Some(err),
            Self::MalformedIndent { .. }
            | Self::UnbalancedIndent { .. }
            | Self::DuplicateLine { .. }
            | Self::MalformedLine { .. } => None,
        }
    }
}

impl From<ForestError> for TranscodeError {
    fn from(value: ForestError) -> Self {
        Self::Forest(value)
    }
}

/// Built-in root partition predicates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartitionRule {
    /// Roots whose subtree holds no dialect go to document A.
    #[default]
    NoDialects,
    /// Every root goes to document A.
    SingleDocument,
}

impl PartitionRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoDialects => "no-dialects",
            Self::SingleDocument => "single-document",
        }
    }

    /// Returns `true` when the root at `key` belongs in document A.
    pub fn classify(self, forest: &Forest, key: NodeKey) -> bool {
        match self {
            Self::NoDialects => !forest.subtree_has_level(key, Level::Dialect),
            Self::SingleDocument => true,
        }
    }
}

impl FromStr for PartitionRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "no-dialects" => Ok(Self::NoDialects),
            "single-document" => Ok(Self::SingleDocument),
            other => Err(format!(
                "unknown partition rule `{other}`; expected no-dialects|single-document"
            )),
        }
    }
}

/// The two flat documents of one encoded forest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatDocuments {
    pub a: String,
    pub b: String,
}

/// Encoder/decoder for the flat line format.
#[derive(Debug, Clone, Copy)]
pub struct FlatTranscoder {
    indent_width: usize,
}

impl Default for FlatTranscoder {
    fn default() -> Self {
        Self::new(DEFAULT_INDENT_WIDTH)
    }
}

impl FlatTranscoder {
    /// Creates a transcoder; a zero width is treated as one space.
    pub fn new(indent_width: usize) -> Self {
        Self {
            indent_width: indent_width.max(1),
        }
    }

    pub fn indent_width(&self) -> usize {
        self.indent_width
    }

    /// Encodes `forest`, sending each root to A when `classify` holds.
    pub fn encode<F>(&self, forest: &Forest, classify: F) -> FlatDocuments
    where
        F: Fn(&Forest, NodeKey) -> bool,
    {
        let mut documents = FlatDocuments::default();
        let (mut lines_a, mut lines_b) = (0usize, 0usize);
        for root in forest.roots() {
            let (out, counter) = if classify(forest, *root) {
                (&mut documents.a, &mut lines_a)
            } else {
                (&mut documents.b, &mut lines_b)
            };
            let mut stack = vec![(*root, 0usize)];
            while let Some((key, depth)) = stack.pop() {
                let Some(languoid) = forest.get(key) else {
                    continue;
                };
                self.write_line(out, depth, languoid);
                *counter += 1;
                stack.extend(
                    forest
                        .children(key)
                        .iter()
                        .rev()
                        .map(|child| (*child, depth + 1)),
                );
            }
        }
        info!(
            "event=flat_encode module=flat_service status=ok lines_a={} lines_b={}",
            lines_a, lines_b
        );
        documents
    }

    /// Decodes both documents into a fresh forest.
    pub fn decode(
        &self,
        a: &str,
        b: &str,
        registry: &mut IdentifierRegistry,
    ) -> TranscodeResult<Forest> {
        self.logged_decode(a, b, None, registry)
    }

    /// Decodes both documents, taking every non-line attribute from `base`.
    ///
    /// Nodes of `base` that no longer appear in either document are
    /// tombstoned so a later materialize removes their directories.
    pub fn decode_onto(
        &self,
        a: &str,
        b: &str,
        base: &Forest,
        registry: &mut IdentifierRegistry,
    ) -> TranscodeResult<Forest> {
        self.logged_decode(a, b, Some(base), registry)
    }

    fn logged_decode(
        &self,
        a: &str,
        b: &str,
        base: Option<&Forest>,
        registry: &mut IdentifierRegistry,
    ) -> TranscodeResult<Forest> {
        let started_at = Instant::now();
        let result = self.decode_documents(a, b, base, registry);
        match &result {
            Ok(forest) => info!(
                "event=flat_decode module=flat_service status=ok nodes={} tombstones={} onto_base={} duration_ms={}",
                forest.len(),
                forest.tombstones().len(),
                base.is_some(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=flat_decode module=flat_service status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn decode_documents(
        &self,
        a: &str,
        b: &str,
        base: Option<&Forest>,
        registry: &mut IdentifierRegistry,
    ) -> TranscodeResult<Forest> {
        let mut forest = Forest::new();
        let mut seen: HashSet<Identifier> = HashSet::new();
        for (document, text) in [(Document::A, a), (Document::B, b)] {
            self.decode_document(document, text, base, &mut forest, &mut seen, registry)?;
        }

        if let Some(base) = base {
            for tombstone in base.tombstones() {
                forest.push_tombstone(tombstone.clone());
            }
            for languoid in base {
                if seen.contains(languoid.id()) {
                    continue;
                }
                if let Some(dir) = &languoid.dir {
                    forest.push_tombstone(Tombstone {
                        id: languoid.id().clone(),
                        dir: dir.clone(),
                    });
                }
            }
        }
        Ok(forest)
    }

    fn decode_document(
        &self,
        document: Document,
        text: &str,
        base: Option<&Forest>,
        forest: &mut Forest,
        seen: &mut HashSet<Identifier>,
        registry: &mut IdentifierRegistry,
    ) -> TranscodeResult<()> {
        let mut base_indent: Option<usize> = None;
        // Key of the most recent node at each depth.
        let mut ancestry: Vec<NodeKey> = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let raw = raw.trim_end();
            let content = raw.trim_start();
            if content.is_empty() || content.starts_with('#') {
                continue;
            }

            let indent = &raw[..raw.len() - content.len()];
            if indent.contains('\t') {
                return Err(TranscodeError::MalformedIndent { document, line });
            }
            let spaces = indent.len();
            let first = *base_indent.get_or_insert(spaces);
            if spaces < first {
                return Err(TranscodeError::UnbalancedIndent { document, line });
            }
            let offset = spaces - first;
            if offset % self.indent_width != 0 || offset / self.indent_width > ancestry.len() {
                return Err(TranscodeError::MalformedIndent { document, line });
            }
            let depth = offset / self.indent_width;

            let parsed = parse_line(content).map_err(|reason| TranscodeError::MalformedLine {
                document,
                line,
                reason,
            })?;
            let id = match parsed.identifier {
                Some(raw_id) => {
                    let id = Identifier::parse(raw_id).map_err(|source| {
                        TranscodeError::Identifier {
                            document,
                            line,
                            source,
                        }
                    })?;
                    if seen.contains(&id) {
                        return Err(TranscodeError::DuplicateLine {
                            identifier: id,
                            document,
                            line,
                        });
                    }
                    registry
                        .register(&id, parsed.name)
                        .map_err(|source| TranscodeError::Registry {
                            document,
                            line,
                            source,
                        })?;
                    id
                }
                None => registry
                    .allocate(parsed.name)
                    .map_err(|source| TranscodeError::Registry {
                        document,
                        line,
                        source,
                    })?,
            };
            seen.insert(id.clone());

            let mut languoid = Languoid::new(id, parsed.name, parsed.level);
            languoid.iso_code = parsed.iso_code.map(str::to_string);
            if let Some(previous) = base.and_then(|base| base.find(languoid.id().as_str())) {
                languoid.category = previous.category.clone();
                languoid.classification = previous.classification.clone();
                languoid.metadata = previous.metadata.clone();
                languoid.dir = previous.dir.clone();
            }

            ancestry.truncate(depth);
            let key = forest.insert(languoid, ancestry.last().copied())?;
            ancestry.push(key);
        }
        Ok(())
    }

    fn write_line(&self, out: &mut String, depth: usize, languoid: &Languoid) {
        out.extend(std::iter::repeat(' ').take(depth * self.indent_width));
        out.push(languoid.level.marker());
        out.push_str(" [");
        out.push_str(languoid.id().as_str());
        out.push(']');
        if let Some(iso) = &languoid.iso_code {
            out.push('[');
            out.push_str(iso);
            out.push(']');
        }
        out.push(' ');
        out.push_str(&languoid.name);
        out.push('\n');
    }
}

/// Encodes with the default indent width.
pub fn encode<F>(forest: &Forest, classify: F) -> FlatDocuments
where
    F: Fn(&Forest, NodeKey) -> bool,
{
    FlatTranscoder::default().encode(forest, classify)
}

/// Decodes with the default indent width.
pub fn decode(a: &str, b: &str, registry: &mut IdentifierRegistry) -> TranscodeResult<Forest> {
    FlatTranscoder::default().decode(a, b, registry)
}

/// Decodes onto `base` with the default indent width.
pub fn decode_onto(
    a: &str,
    b: &str,
    base: &Forest,
    registry: &mut IdentifierRegistry,
) -> TranscodeResult<Forest> {
    FlatTranscoder::default().decode_onto(a, b, base, registry)
}

struct ParsedLine<'a> {
    level: Level,
    identifier: Option<&'a str>,
    iso_code: Option<&'a str>,
    name: &'a str,
}

fn parse_line(content: &str) -> Result<ParsedLine<'_>, String> {
    let mut chars = content.chars();
    let marker = chars.next().ok_or_else(|| "empty line".to_string())?;
    let level = Level::from_marker(marker)
        .ok_or_else(|| format!("unknown level marker `{marker}`; expected F|L|D"))?;
    let rest = chars.as_str();
    if !rest.starts_with(char::is_whitespace) {
        return Err("level marker must be followed by whitespace".to_string());
    }
    let mut rest = rest.trim_start();

    let mut identifier = None;
    let mut iso_code = None;
    if let Some((inner, tail)) = take_bracket(rest)? {
        identifier = Some(inner).filter(|value| !value.is_empty());
        rest = tail;
        if let Some((inner, tail)) = take_bracket(rest)? {
            iso_code = Some(inner).filter(|value| !value.is_empty());
            rest = tail;
        }
    }

    // A blank name is left to the validator when the line is identified.
    let name = rest.trim();
    if name.is_empty() && identifier.is_none() {
        return Err("missing name".to_string());
    }
    Ok(ParsedLine {
        level,
        identifier,
        iso_code,
        name,
    })
}

/// Splits a leading `[...]` group into its trimmed content and the rest.
fn take_bracket(text: &str) -> Result<Option<(&str, &str)>, String> {
    let Some(open) = text.strip_prefix('[') else {
        return Ok(None);
    };
    let close = open
        .find(']')
        .ok_or_else(|| "unclosed `[` bracket".to_string())?;
    Ok(Some((open[..close].trim(), &open[close + 1..])))
}
