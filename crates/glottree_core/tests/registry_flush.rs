use glottree_core::{Identifier, IdentifierRegistry, RegistryError};
use std::fs;
use tempfile::TempDir;

const SEEDED: &str = "# languoid identifiers, one per line\natla1234\nwolo1235";

fn seeded_registry() -> (TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identifiers.txt");
    fs::write(&path, SEEDED).unwrap();
    (dir, path)
}

#[test]
fn flush_appends_new_identifiers_and_keeps_existing_content() {
    let (_dir, path) = seeded_registry();
    let mut registry = IdentifierRegistry::load(&path).unwrap();
    assert_eq!(registry.len(), 2);

    let allocated = registry.allocate("Wolof, Gambian").unwrap();
    assert_eq!(allocated.as_str(), "wolo1234");
    let skipped = registry.allocate("Wolof").unwrap();
    assert_eq!(skipped.as_str(), "wolo1236");
    assert_eq!(registry.pending().len(), 2);

    assert_eq!(registry.flush().unwrap(), 2);
    let content = fs::read_to_string(&path).unwrap();
    assert!(content.starts_with(SEEDED));
    assert_eq!(&content[SEEDED.len()..], "\nwolo1234\nwolo1236\n");

    assert_eq!(registry.flush().unwrap(), 0);
    assert_eq!(fs::read_to_string(&path).unwrap(), content);

    let reloaded = IdentifierRegistry::load(&path).unwrap();
    assert_eq!(reloaded.len(), 4);
    for id in ["atla1234", "wolo1235", "wolo1234", "wolo1236"] {
        assert!(reloaded.is_registered(id), "{id} missing after reload");
    }
}

#[test]
fn loaded_entries_adopt_their_first_owner() {
    let (_dir, path) = seeded_registry();
    let mut registry = IdentifierRegistry::load(&path).unwrap();
    let wolof = Identifier::parse("wolo1235").unwrap();

    registry.register(&wolof, "Wolof").unwrap();
    registry.register(&wolof, "Wolof").unwrap();
    assert!(registry.pending().is_empty());

    let err = registry.register(&wolof, "Serer").unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateIdentifier { .. }));
}

#[test]
fn missing_file_loads_empty_and_is_created_on_flush() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("identifiers.txt");
    let mut registry = IdentifierRegistry::load(&path).unwrap();
    assert!(registry.is_empty());

    registry.allocate("Serer").unwrap();
    assert_eq!(registry.flush().unwrap(), 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), "sere1234\n");
}

#[test]
fn malformed_entry_reports_its_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identifiers.txt");
    fs::write(&path, "atla1234\n\nnot an id\n").unwrap();
    let err = IdentifierRegistry::load(&path).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidEntry { line: 3, .. }));
}
