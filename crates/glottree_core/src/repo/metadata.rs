//! Metadata file codec (INI-style, order preserving).
//!
//! # Responsibility
//! - Parse one node metadata file into ordered sections.
//! - Render sections back into a stable textual form.
//!
//! # Invariants
//! - Section and option order is preserved by parse and render.
//! - `render(parse(render(x)))` equals `render(x)`.

use crate::model::languoid::Section;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const METADATA_EXTENSION: &str = "ini";

/// Metadata parse errors with 1-based line numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    InvalidLine { line: usize, content: String },
    OptionOutsideSection { line: usize },
}

impl Display for MetadataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLine { line, content } => {
                write!(f, "unparsable metadata line {line}: `{content}`")
            }
            Self::OptionOutsideSection { line } => {
                write!(f, "option outside of any section on line {line}")
            }
        }
    }
}

impl Error for MetadataError {}

/// Parses metadata text.
///
/// Lines starting with `#` or `;` are comments. Indented lines continue the
/// previous option's value; blank lines inside a continuation are kept, and
/// a tab-indented line keeps everything after its first tab. Repeated
/// sections are merged and a repeated option keeps its last value.
pub fn parse(text: &str) -> Result<Vec<Section>, MetadataError> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current: Option<usize> = None;
    let mut continuing: Option<String> = None;
    let mut blank_run = 0usize;

    for (index, raw) in text.trim_start_matches('\u{feff}').lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim_end();
        let trimmed = line.trim_start();

        if trimmed.is_empty() {
            if continuing.is_some() {
                blank_run += 1;
            }
            continue;
        }

        let indented = trimmed.len() != line.len();
        if indented {
            if let (Some(section_index), Some(option)) = (current, continuing.as_ref()) {
                let section = &mut sections[section_index];
                if let Some(slot) = section.options.iter_mut().find(|(key, _)| key == option) {
                    let content = line.strip_prefix('\t').unwrap_or(trimmed);
                    if !slot.1.is_empty() {
                        for _ in 0..=blank_run {
                            slot.1.push('\n');
                        }
                    }
                    slot.1.push_str(content);
                    blank_run = 0;
                    continue;
                }
            }
        }
        blank_run = 0;

        if trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if let Some(name) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let name = name.trim();
            if name.is_empty() {
                return Err(MetadataError::InvalidLine {
                    line: line_number,
                    content: raw.to_string(),
                });
            }
            current = Some(match sections.iter().position(|s| s.name == name) {
                Some(existing) => existing,
                None => {
                    sections.push(Section::new(name));
                    sections.len() - 1
                }
            });
            continuing = None;
            continue;
        }

        let Some((key, value)) = split_option(trimmed) else {
            return Err(MetadataError::InvalidLine {
                line: line_number,
                content: raw.to_string(),
            });
        };
        let Some(section_index) = current else {
            return Err(MetadataError::OptionOutsideSection { line: line_number });
        };
        sections[section_index].set(key, value);
        continuing = Some(key.to_string());
    }

    Ok(sections)
}

/// Renders sections; multi-line values continue on tab-indented lines and
/// interior blank lines stay blank.
pub fn render(sections: &[Section]) -> String {
    let mut out = String::new();
    for (index, section) in sections.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        out.push('[');
        out.push_str(&section.name);
        out.push_str("]\n");
        for (key, value) in &section.options {
            out.push_str(key);
            out.push_str(" =");
            let lines: Vec<&str> = value.lines().map(str::trim_end).collect();
            let start = lines.iter().position(|line| !line.trim().is_empty());
            let end = lines.iter().rposition(|line| !line.trim().is_empty());
            if let (Some(start), Some(end)) = (start, end) {
                out.push(' ');
                out.push_str(lines[start].trim_start());
                out.push('\n');
                for line in &lines[start + 1..=end] {
                    if !line.trim().is_empty() {
                        out.push('\t');
                        out.push_str(line);
                    }
                    out.push('\n');
                }
            } else {
                out.push('\n');
            }
        }
    }
    out
}

fn split_option(line: &str) -> Option<(&str, &str)> {
    let split_at = line.find(['=', ':'])?;
    let key = line[..split_at].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[split_at + 1..].trim()))
}
