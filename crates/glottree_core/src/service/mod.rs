//! Core use-case services over a loaded forest.
//!
//! # Responsibility
//! - Transcode between the forest and flat documents.
//! - Validate the forest and build read-only reports.
//! - Stay free of directory I/O; the repository layer owns the filesystem.

pub mod check_service;
pub mod flat_service;
pub mod report_service;
