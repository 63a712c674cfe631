//! Whole-tree validator.
//!
//! # Responsibility
//! - Evaluate every structural, naming, registry and ISO invariant on every
//!   languoid and collect the findings as data.
//! - Count languoids by level and languages by category.
//!
//! # Invariants
//! - One pre-order pass; each node is visited exactly once.
//! - Checks are independent; no finding stops the pass.
//! - Nothing in the forest is modified or auto-corrected.

use crate::model::forest::{Forest, NodeKey};
use crate::model::identifier::Identifier;
use crate::model::languoid::{Languoid, Level};
use crate::repo::iso::IsoRegistry;
use crate::repo::registry::IdentifierRegistry;
use log::info;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Category label for languages without a category.
pub const UNCATEGORISED: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Which invariant a diagnostic reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Directory base name differs from the identifier.
    DirectoryName,
    /// Language nested under something other than a family.
    LanguageParent,
    /// Language with a non-dialect child.
    LanguageChildren,
    ChildlessFamily,
    BlankName,
    UnknownIsoCode,
    RetiredIsoCode,
    UnregisteredIdentifier,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DirectoryName => "directory_name",
            Self::LanguageParent => "language_parent",
            Self::LanguageChildren => "language_children",
            Self::ChildlessFamily => "childless_family",
            Self::BlankName => "blank_name",
            Self::UnknownIsoCode => "unknown_iso_code",
            Self::RetiredIsoCode => "retired_iso_code",
            Self::UnregisteredIdentifier => "unregistered_identifier",
        }
    }
}

impl Display for DiagnosticKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validator finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub identifier: Identifier,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} [{}] {}",
            self.severity, self.identifier, self.kind, self.message
        )
    }
}

/// Result of one validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub diagnostics: Vec<Diagnostic>,
    pub by_level: BTreeMap<Level, usize>,
    /// Languages only; uncategorised ones under [`UNCATEGORISED`].
    pub by_category: BTreeMap<String, usize>,
}

impl CheckReport {
    /// False iff at least one `Error` diagnostic exists.
    pub fn is_ok(&self) -> bool {
        self.count(Severity::Error) == 0
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|diagnostic| diagnostic.severity == severity)
            .count()
    }

    /// Diagnostics reported for one identifier.
    pub fn for_identifier<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |diagnostic| diagnostic.identifier.as_str() == id)
    }

    /// Renders the level and category counters as two plain-text tables.
    pub fn render_counters(&self) -> String {
        let levels = self
            .by_level
            .iter()
            .map(|(level, count)| (level.as_str().to_string(), *count))
            .collect::<Vec<_>>();
        let categories = self
            .by_category
            .iter()
            .map(|(category, count)| (category.clone(), *count))
            .collect::<Vec<_>>();

        let mut out = render_counter("Languoids by level", levels);
        out.push('\n');
        out.push_str(&render_counter("Languages by category", categories));
        out
    }
}

/// Validates every languoid of `forest`.
///
/// ISO checks run only when `iso` is supplied.
pub fn validate(
    forest: &Forest,
    registry: &IdentifierRegistry,
    iso: Option<&dyn IsoRegistry>,
) -> CheckReport {
    let started_at = Instant::now();
    let mut report = CheckReport::default();

    for key in forest.keys() {
        let Some(languoid) = forest.get(key) else {
            continue;
        };
        *report.by_level.entry(languoid.level).or_insert(0) += 1;
        if languoid.level == Level::Language {
            let category = languoid
                .category
                .clone()
                .unwrap_or_else(|| UNCATEGORISED.to_string());
            *report.by_category.entry(category).or_insert(0) += 1;
        }

        let exempt = forest.is_exempt(key);
        let mut check = NodeCheck {
            forest,
            key,
            languoid,
            diagnostics: &mut report.diagnostics,
        };
        if !exempt {
            check.directory_name();
        }
        // Only the placeholder identifiers themselves stay unregistered.
        if !languoid.id().is_unidentified() {
            check.registered(registry);
        }
        check.nesting();
        check.name();
        if let Some(iso) = iso {
            check.iso_code(iso);
        }
    }

    info!(
        "event=tree_check module=check_service status=ok nodes={} errors={} warnings={} duration_ms={}",
        forest.len(),
        report.count(Severity::Error),
        report.count(Severity::Warning),
        started_at.elapsed().as_millis()
    );
    report
}

struct NodeCheck<'a> {
    forest: &'a Forest,
    key: NodeKey,
    languoid: &'a Languoid,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl NodeCheck<'_> {
    fn report(&mut self, severity: Severity, kind: DiagnosticKind, message: String) {
        self.diagnostics.push(Diagnostic {
            severity,
            identifier: self.languoid.id().clone(),
            kind,
            message,
        });
    }

    fn directory_name(&mut self) {
        let languoid = self.languoid;
        let Some(dir) = &languoid.dir else {
            return;
        };
        let base = dir.file_name().and_then(|name| name.to_str());
        if base != Some(languoid.id().as_str()) {
            self.report(
                Severity::Error,
                DiagnosticKind::DirectoryName,
                format!("invalid directory name: {}", dir.display()),
            );
        }
    }

    fn registered(&mut self, registry: &IdentifierRegistry) {
        if !registry.is_registered(self.languoid.id().as_str()) {
            self.report(
                Severity::Error,
                DiagnosticKind::UnregisteredIdentifier,
                "identifier missing from the registry".to_string(),
            );
        }
    }

    fn nesting(&mut self) {
        let forest = self.forest;
        match self.languoid.level {
            Level::Language => {
                let parent_level = forest
                    .parent(self.key)
                    .and_then(|parent| forest.get(parent))
                    .map(|parent| parent.level);
                if let Some(level) = parent_level.filter(|level| *level != Level::Family) {
                    self.report(
                        Severity::Error,
                        DiagnosticKind::LanguageParent,
                        format!("language nested under a {level}"),
                    );
                }

                let misplaced = forest
                    .children(self.key)
                    .iter()
                    .filter_map(|child| forest.get(*child))
                    .filter(|child| child.level != Level::Dialect)
                    .map(|child| format!("{} ({})", child.id(), child.level))
                    .collect::<Vec<_>>();
                if !misplaced.is_empty() {
                    self.report(
                        Severity::Error,
                        DiagnosticKind::LanguageChildren,
                        format!("non-dialect children: {}", misplaced.join(", ")),
                    );
                }
            }
            Level::Family => {
                if forest.children(self.key).is_empty() {
                    self.report(
                        Severity::Error,
                        DiagnosticKind::ChildlessFamily,
                        "family without children".to_string(),
                    );
                }
            }
            Level::Dialect => {}
        }
    }

    fn name(&mut self) {
        if self.languoid.name.trim().is_empty() {
            self.report(
                Severity::Error,
                DiagnosticKind::BlankName,
                "missing name".to_string(),
            );
        }
    }

    fn iso_code(&mut self, iso: &dyn IsoRegistry) {
        let languoid = self.languoid;
        let Some(code) = languoid.iso_code.as_deref() else {
            return;
        };
        match iso.lookup(code) {
            None => self.report(
                Severity::Warning,
                DiagnosticKind::UnknownIsoCode,
                format!("invalid ISO 639-3 code [{code}]"),
            ),
            Some(found) if found.is_retired && !languoid.is_bookkeeping() => {
                let message = if found.replacement_codes.is_empty() {
                    format!("{found} has no replacement")
                } else {
                    format!("{found} changed to {}", found.replacement_codes.join(", "))
                };
                self.report(Severity::Warning, DiagnosticKind::RetiredIsoCode, message);
            }
            Some(_) => {}
        }
    }
}

fn render_counter(title: &str, mut rows: Vec<(String, usize)>) -> String {
    rows.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
    let width = rows.iter().map(|(name, _)| name.len() + 1).max().unwrap_or(1);
    let total: usize = rows.iter().map(|(_, count)| count).sum();

    let mut out = format!("{title}:\n");
    for (name, count) in &rows {
        out.push_str(&format!(
            "{:<width$} {:>8}\n",
            format!("{name}:"),
            with_thousands(*count)
        ));
    }
    out.push_str(&format!("{:<width$} {:>8}\n", "", with_thousands(total)));
    out
}

fn with_thousands(value: usize) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{with_thousands, CheckReport};
    use crate::model::languoid::Level;

    #[test]
    fn thousands_separator_groups_from_the_right() {
        assert_eq!(with_thousands(7), "7");
        assert_eq!(with_thousands(1234), "1,234");
        assert_eq!(with_thousands(8_456_123), "8,456,123");
    }

    #[test]
    fn render_counters_sorts_by_count_and_totals() {
        let mut report = CheckReport::default();
        report.by_level.insert(Level::Family, 2);
        report.by_level.insert(Level::Language, 1_500);
        report.by_category.insert("Spoken L1 Language".to_string(), 1_499);
        report.by_category.insert("-".to_string(), 1);

        let rendered = report.render_counters();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Languoids by level:");
        assert_eq!(lines[1], "language:    1,500");
        assert_eq!(lines[2], "family:          2");
        assert_eq!(lines[3], "             1,502");
        assert!(rendered.contains("Spoken L1 Language:    1,499\n"));
    }
}
