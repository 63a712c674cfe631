//! Languoid tree domain model.
//!
//! # Responsibility
//! - Define identifiers, languoid records and the forest that holds them.
//! - Keep structural invariants checkable without any I/O.
//!
//! # Invariants
//! - Every node is identified by a stable `Identifier`.
//! - Parent links are arena keys; the forest owns every node.

pub mod forest;
pub mod identifier;
pub mod languoid;
