//! Repository layer: everything that touches files.
//!
//! # Responsibility
//! - Read and write the directory tree, metadata files and registries.
//! - Keep filesystem details out of the transcoder and validator.
//!
//! # Invariants
//! - The identifier registry file is only ever appended to.
//! - Directory moves are planned and checked before the first write.

pub mod iso;
pub mod metadata;
pub mod registry;
pub mod relocation;
pub mod tree_repo;
