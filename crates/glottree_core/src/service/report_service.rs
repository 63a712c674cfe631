//! Read-only reports over a loaded forest.
//!
//! # Responsibility
//! - Count filled metadata options per section.
//! - List classification comments.
//! - Render one subtree as an ASCII tree.
//! - List living ISO codes no languoid uses.

use crate::model::forest::{Forest, NodeKey};
use crate::model::identifier::Identifier;
use crate::model::languoid::Level;
use crate::repo::iso::{IsoLanguage, IsoTable};
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

/// Number of languoids with a non-empty value for one option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionCount {
    pub section: String,
    pub option: String,
    pub count: usize,
}

/// Which classification comment a row comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentKind {
    Family,
    Sub,
}

impl Display for CommentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Family => f.write_str("family classification"),
            Self::Sub => f.write_str("subclassification"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRow {
    pub identifier: Identifier,
    pub kind: CommentKind,
    pub text: String,
}

impl Display for ClassificationRow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.identifier, self.kind, self.text)
    }
}

/// Living individual ISO code absent from the forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingIso {
    pub code: String,
    pub name: String,
    pub kind: String,
}

impl Display for MissingIso {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.code, self.name, self.kind)
    }
}

impl From<&IsoLanguage> for MissingIso {
    fn from(language: &IsoLanguage) -> Self {
        Self {
            code: language.code.clone(),
            name: language.name.clone(),
            kind: language.kind(),
        }
    }
}

/// Per-section option fill counts, typed core fields included.
///
/// Sections keep first-seen order; options within a section are sorted by
/// descending count, ties in first-seen order.
pub fn metadata_stats(forest: &Forest) -> Vec<OptionCount> {
    let mut sections: Vec<(String, Vec<(String, usize)>)> = Vec::new();
    let mut section_index: HashMap<String, usize> = HashMap::new();

    for languoid in forest {
        for section in languoid.to_sections() {
            let index = *section_index
                .entry(section.name.clone())
                .or_insert_with(|| {
                    sections.push((section.name.clone(), Vec::new()));
                    sections.len() - 1
                });
            let options = &mut sections[index].1;
            for (option, value) in section.options {
                if value.trim().is_empty() {
                    continue;
                }
                match options.iter_mut().find(|(name, _)| *name == option) {
                    Some(slot) => slot.1 += 1,
                    None => options.push((option, 1)),
                }
            }
        }
    }

    let mut rows = Vec::new();
    for (section, mut options) in sections {
        options.sort_by(|left, right| right.1.cmp(&left.1));
        rows.extend(options.into_iter().map(|(option, count)| OptionCount {
            section: section.clone(),
            option,
            count,
        }));
    }
    rows
}

/// Every non-empty classification comment, in forest order.
pub fn classification_comments(forest: &Forest) -> Vec<ClassificationRow> {
    let mut rows = Vec::new();
    for languoid in forest {
        let comments = [
            (CommentKind::Family, &languoid.classification.family),
            (CommentKind::Sub, &languoid.classification.sub),
        ];
        for (kind, text) in comments {
            if let Some(text) = text.as_deref().filter(|text| !text.trim().is_empty()) {
                rows.push(ClassificationRow {
                    identifier: languoid.id().clone(),
                    kind,
                    text: text.to_string(),
                });
            }
        }
    }
    rows
}

/// Renders the subtree of `id`, hiding nodes nested deeper than `max_level`.
///
/// Returns `None` when `id` is not in the forest.
pub fn ascii_tree(forest: &Forest, id: &str, max_level: Option<Level>) -> Option<String> {
    let root = forest.key_of(id)?;
    let mut out = String::new();
    render_node(forest, root, "", None, max_level, &mut out);
    Some(out)
}

fn render_node(
    forest: &Forest,
    key: NodeKey,
    prefix: &str,
    is_last: Option<bool>,
    max_level: Option<Level>,
    out: &mut String,
) {
    let Some(languoid) = forest.get(key) else {
        return;
    };
    let connector = match is_last {
        None => "",
        Some(true) => "└── ",
        Some(false) => "├── ",
    };
    out.push_str(&format!(
        "{prefix}{connector}{} [{}] {}\n",
        languoid.name,
        languoid.id(),
        languoid.level
    ));

    let visible: Vec<NodeKey> = forest
        .children(key)
        .iter()
        .copied()
        .filter(|child| {
            forest
                .get(*child)
                .is_some_and(|child| max_level.map_or(true, |max| child.level <= max))
        })
        .collect();
    let child_prefix = match is_last {
        None => prefix.to_string(),
        Some(true) => format!("{prefix}    "),
        Some(false) => format!("{prefix}│   "),
    };
    for (index, child) in visible.iter().enumerate() {
        let last = index + 1 == visible.len();
        render_node(forest, *child, &child_prefix, Some(last), max_level, out);
    }
}

/// Living individual codes of `iso` that no languoid carries and that do
/// not replace a retired code, sorted by code.
pub fn missing_iso(forest: &Forest, iso: &IsoTable) -> Vec<MissingIso> {
    let used: HashSet<&str> = forest
        .iter()
        .filter_map(|languoid| languoid.iso_code.as_deref())
        .collect();
    let replacements = iso.replacement_codes();
    iso.languages()
        .filter(|language| language.is_living_individual())
        .filter(|language| !replacements.contains(language.code.as_str()))
        .filter(|language| !used.contains(language.code.as_str()))
        .map(MissingIso::from)
        .collect()
}
