//! Core domain logic for glottree.
//! This crate is the single source of truth for languoid tree invariants.

pub mod config;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, RepoConfig};
pub use logging::{default_log_level, init_console_logging, init_logging, logging_status};
pub use model::forest::{Forest, ForestError, NodeKey, Tombstone};
pub use model::identifier::{Identifier, IdentifierError};
pub use model::languoid::{ClassificationComment, Languoid, Level, Metadata, Section};
pub use repo::iso::{IsoCode, IsoLanguage, IsoRegistry, IsoTable};
pub use repo::registry::{IdentifierRegistry, RegistryError};
pub use repo::relocation::RelocationPlan;
pub use repo::tree_repo::{
    DirectoryTreeRepository, LoadOutcome, MalformedNode, MaterializeSummary, TreeRepoError,
    TreeRepository,
};
pub use service::check_service::{validate, CheckReport, Diagnostic, DiagnosticKind, Severity};
pub use service::flat_service::{
    FlatDocuments, FlatTranscoder, PartitionRule, TranscodeError,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
