use glottree_core::repo::registry::RegistryError;
use glottree_core::repo::tree_repo::TreeRepoError;
use glottree_core::service::flat_service::{decode, decode_onto, encode, TranscodeError};
use glottree_core::{
    DirectoryTreeRepository, Forest, IdentifierRegistry, Level, NodeKey, PartitionRule,
    TreeRepository,
};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

type Predicate = Box<dyn Fn(&Forest, NodeKey) -> bool>;

fn write_node(root: &Path, relative: &str, body: &str) {
    let dir = root.join(relative);
    fs::create_dir_all(&dir).unwrap();
    let name = dir.file_name().unwrap().to_str().unwrap().to_string();
    fs::write(dir.join(format!("{name}.ini")), body).unwrap();
}

fn core(name: &str, id: &str, level: &str) -> String {
    format!("[core]\nname = {name}\nglottocode = {id}\nlevel = {level}\n")
}

/// Atlantic > Wolof > Gambian Wolof, plus a bookkeeping language at the root.
fn scenario(root: &Path) {
    write_node(
        root,
        "atla1234",
        &format!(
            "{}\n[classification]\nsub = Sapir 1971\n",
            core("Atlantic", "atla1234", "family")
        ),
    );
    write_node(
        root,
        "atla1234/wolo1235",
        "[core]\nname = Wolof\nglottocode = wolo1235\nlevel = language\niso639-3 = wol\n\
         latitude = 15.0\n\n[sources]\nglottolog = **hh:s:Fal:Wolof**\n",
    );
    write_node(
        root,
        "atla1234/wolo1235/gamb1236",
        &core("Gambian Wolof", "gamb1236", "dialect"),
    );
    write_node(
        root,
        "book1237",
        "[core]\nname = Bookkeeping Wolof\nglottocode = book1237\nlevel = language\n\
         category = Bookkeeping\n",
    );
}

fn snapshot(root: &Path) -> Vec<(PathBuf, String)> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .map(Result::unwrap)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            (
                entry.path().strip_prefix(root).unwrap().to_path_buf(),
                fs::read_to_string(entry.path()).unwrap(),
            )
        })
        .collect()
}

fn parent_id(forest: &Forest, id: &str) -> Option<String> {
    let key = forest.key_of(id)?;
    forest
        .parent(key)
        .and_then(|parent| forest.get(parent))
        .map(|languoid| languoid.id().to_string())
}

#[test]
fn scenario_encodes_into_expected_documents() {
    let dir = tempfile::tempdir().unwrap();
    scenario(dir.path());
    let outcome = DirectoryTreeRepository::new(dir.path()).load().unwrap();
    assert!(outcome.is_complete());
    assert_eq!(outcome.forest.len(), 4);

    let rule = PartitionRule::NoDialects;
    let documents = encode(&outcome.forest, |forest, key| rule.classify(forest, key));
    assert_eq!(documents.a, "L [book1237] Bookkeeping Wolof\n");
    assert_eq!(
        documents.b,
        "F [atla1234] Atlantic\n    L [wolo1235][wol] Wolof\n        D [gamb1236] Gambian Wolof\n"
    );
}

#[test]
fn decode_onto_round_trips_for_every_partition() {
    let dir = tempfile::tempdir().unwrap();
    scenario(dir.path());
    let forest = DirectoryTreeRepository::new(dir.path())
        .load()
        .unwrap()
        .forest;

    let families_first: Predicate = Box::new(|forest: &Forest, key: NodeKey| {
        forest
            .get(key)
            .is_some_and(|languoid| languoid.level == Level::Family)
    });
    let predicates: Vec<Predicate> = vec![
        Box::new(|forest: &Forest, key: NodeKey| PartitionRule::NoDialects.classify(forest, key)),
        Box::new(|forest: &Forest, key: NodeKey| {
            PartitionRule::SingleDocument.classify(forest, key)
        }),
        families_first,
    ];
    for predicate in predicates {
        let documents = encode(&forest, predicate);
        let mut registry = IdentifierRegistry::in_memory();
        let decoded = decode_onto(&documents.a, &documents.b, &forest, &mut registry).unwrap();
        assert_eq!(decoded, forest);
        assert!(decoded.tombstones().is_empty());
        assert_eq!(
            decoded.find("wolo1235").unwrap().metadata.get("sources", "glottolog"),
            Some("**hh:s:Fal:Wolof**")
        );
        assert_eq!(
            decoded.find("book1237").unwrap().category.as_deref(),
            Some("Bookkeeping")
        );
    }
}

#[test]
fn decode_round_trips_line_only_forests() {
    let mut registry = IdentifierRegistry::in_memory();
    let forest = decode(
        "L [book1237] Bookkeeping Wolof\n",
        "F [atla1234] Atlantic\n    L [wolo1235][wol] Wolof\n        D [gamb1236] Gambian Wolof\n",
        &mut registry,
    )
    .unwrap();
    assert_eq!(parent_id(&forest, "gamb1236").as_deref(), Some("wolo1235"));
    assert_eq!(forest.find("wolo1235").unwrap().iso_code.as_deref(), Some("wol"));

    let documents = encode(&forest, |forest, key| {
        PartitionRule::NoDialects.classify(forest, key)
    });
    let again = decode(&documents.a, &documents.b, &mut registry).unwrap();
    assert_eq!(again, forest);
}

#[test]
fn decode_allocates_identifiers_for_new_lines() {
    let mut registry = IdentifierRegistry::in_memory();
    let forest = decode(
        "F [atla1234] Atlantic\n    L [wolo1234] Wolof\n    L [] Wolof\n    L Serer\n",
        "",
        &mut registry,
    )
    .unwrap();
    assert_eq!(forest.len(), 4);
    assert_eq!(forest.find("wolo1235").unwrap().name, "Wolof");
    assert_eq!(forest.find("sere1234").unwrap().name, "Serer");
    assert_eq!(parent_id(&forest, "sere1234").as_deref(), Some("atla1234"));
    assert!(registry.is_registered("wolo1235"));
}

#[test]
fn materialize_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    scenario(dir.path());
    let repo = DirectoryTreeRepository::new(dir.path());

    let mut first = repo.load().unwrap().forest;
    repo.materialize(&mut first).unwrap();
    let after_first = snapshot(dir.path());

    let mut second = repo.load().unwrap().forest;
    assert_eq!(second, first);
    let plan = repo.plan(&second).unwrap();
    assert!(plan.is_noop());

    let summary = repo.materialize(&mut second).unwrap();
    assert_eq!(summary.moved, 0);
    assert_eq!(summary.written, 0);
    assert_eq!(summary.created, 0);
    assert_eq!(summary.removed, 0);
    assert_eq!(snapshot(dir.path()), after_first);
}

#[test]
fn flat_edit_moves_creates_and_removes_directories() {
    let dir = tempfile::tempdir().unwrap();
    scenario(dir.path());
    let repo = DirectoryTreeRepository::new(dir.path());
    let mut base = repo.load().unwrap().forest;
    repo.materialize(&mut base).unwrap();
    let base = repo.load().unwrap().forest;

    let mut registry = IdentifierRegistry::in_memory();
    let mut edited = decode_onto(
        "",
        "F [atla1234] Atlantic\n    F [] Senegambian\n        L [wolo1235][wol] Wolof\n            D [gamb1236] Gambian Wolof\n",
        &base,
        &mut registry,
    )
    .unwrap();
    assert_eq!(registry.pending().len(), 4);
    assert_eq!(edited.tombstones().len(), 1);

    let summary = repo.materialize(&mut edited).unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.moved, 1);
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.written, 1);

    assert!(dir.path().join("atla1234/sene1234/sene1234.ini").is_file());
    assert!(dir
        .path()
        .join("atla1234/sene1234/wolo1235/gamb1236/gamb1236.ini")
        .is_file());
    assert!(!dir.path().join("atla1234/wolo1235").exists());
    assert!(!dir.path().join("book1237").exists());
    assert!(!dir.path().join(".glottree-staging").exists());

    let reloaded = repo.load().unwrap();
    assert!(reloaded.is_complete());
    assert_eq!(reloaded.forest, edited);
    assert_eq!(
        parent_id(&reloaded.forest, "wolo1235").as_deref(),
        Some("sene1234")
    );
    assert_eq!(
        reloaded
            .forest
            .find("wolo1235")
            .unwrap()
            .metadata
            .get("core", "latitude"),
        Some("15.0")
    );
}

#[test]
fn malformed_directory_is_reported_and_descendants_still_load() {
    let dir = tempfile::tempdir().unwrap();
    scenario(dir.path());
    fs::create_dir_all(dir.path().join("atla1234/brok1234/nobr1234")).unwrap();
    fs::write(
        dir.path().join("atla1234/brok1234/nobr1234/nobr1234.ini"),
        core("Nobrok", "nobr1234", "language"),
    )
    .unwrap();
    write_node(
        dir.path(),
        "atla1234/lvls1234",
        "[core]\nname = Levelless\nglottocode = lvls1234\n",
    );

    let outcome = DirectoryTreeRepository::new(dir.path()).load().unwrap();
    assert_eq!(outcome.forest.len(), 5);
    assert_eq!(outcome.failures.len(), 2);
    assert!(outcome.failures[0].path.ends_with("atla1234/brok1234"));
    assert!(outcome.failures[0].reason.contains("no .ini"));
    assert!(outcome.failures[1].path.ends_with("atla1234/lvls1234"));
    assert!(outcome.failures[1].reason.contains("level"));
    assert_eq!(
        parent_id(&outcome.forest, "nobr1234").as_deref(),
        Some("atla1234")
    );
}

#[test]
fn swapped_directories_fail_without_touching_disk() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("aaaa1234")).unwrap();
    fs::write(
        dir.path().join("aaaa1234/bbbb1234.ini"),
        core("Bravo", "bbbb1234", "family"),
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("bbbb1234")).unwrap();
    fs::write(
        dir.path().join("bbbb1234/aaaa1234.ini"),
        core("Alpha", "aaaa1234", "family"),
    )
    .unwrap();
    let before = snapshot(dir.path());

    let repo = DirectoryTreeRepository::new(dir.path());
    let mut forest = repo.load().unwrap().forest;
    let err = repo.materialize(&mut forest).unwrap_err();
    match err {
        TreeRepoError::RelocationCycle { identifiers } => {
            let mut ids: Vec<_> = identifiers.iter().map(|id| id.to_string()).collect();
            ids.sort();
            assert_eq!(ids, vec!["aaaa1234", "bbbb1234"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(snapshot(dir.path()), before);
    assert!(!dir.path().join(".glottree-staging").exists());
}

#[test]
fn occupied_destination_is_a_collision() {
    let dir = tempfile::tempdir().unwrap();
    scenario(dir.path());
    let repo = DirectoryTreeRepository::new(dir.path());
    let mut forest = repo.load().unwrap().forest;

    let wolof = forest.key_of("wolo1235").unwrap();
    forest.move_node(wolof, None).unwrap();
    fs::create_dir_all(dir.path().join("wolo1235")).unwrap();
    let before = snapshot(dir.path());

    let err = repo.materialize(&mut forest).unwrap_err();
    assert!(matches!(err, TreeRepoError::RelocationCollision { .. }));
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn reassigned_identifier_renames_directory_and_metadata_file() {
    let dir = tempfile::tempdir().unwrap();
    scenario(dir.path());
    let repo = DirectoryTreeRepository::new(dir.path());
    let mut forest = repo.load().unwrap().forest;

    let key = forest.key_of("gamb1236").unwrap();
    forest
        .reassign_identifier(key, "gamb1240".parse().unwrap())
        .unwrap();
    let summary = repo.materialize(&mut forest).unwrap();
    assert_eq!(summary.moved, 1);

    let moved = dir.path().join("atla1234/wolo1235/gamb1240");
    assert!(moved.join("gamb1240.ini").is_file());
    assert!(!moved.join("gamb1236.ini").exists());
    assert!(!dir.path().join("atla1234/wolo1235/gamb1236").exists());
}

#[test]
fn plain_decode_materializes_against_existing_directories() {
    let dir = tempfile::tempdir().unwrap();
    scenario(dir.path());
    let repo = DirectoryTreeRepository::new(dir.path());

    let mut registry = IdentifierRegistry::in_memory();
    let mut decoded = decode(
        "",
        "F [atla1234] Atlantic\nL [wolo1235][wol] Wolof\n    D [gamb1236] Gambian Wolof\n",
        &mut registry,
    )
    .unwrap();
    assert!(decoded.iter().all(|languoid| languoid.dir.is_none()));

    let before = snapshot(dir.path());
    let plan = repo.plan(&decoded).unwrap();
    assert_eq!(plan.relocations.len(), 1);
    assert_eq!(plan.removals.len(), 1);
    assert!(plan.created.is_empty());
    assert_eq!(snapshot(dir.path()), before);

    let summary = repo.materialize(&mut decoded).unwrap();
    assert_eq!(summary.moved, 1);
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.created, 0);

    assert!(dir.path().join("wolo1235/gamb1236/gamb1236.ini").is_file());
    assert!(!dir.path().join("atla1234/wolo1235").exists());
    assert!(!dir.path().join("book1237").exists());

    let reloaded = repo.load().unwrap();
    assert!(reloaded.is_complete());
    assert_eq!(reloaded.forest, decoded);
}

#[test]
fn identified_blank_name_survives_a_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    scenario(dir.path());
    write_node(dir.path(), "atla1234/blnk1234", &core("", "blnk1234", "language"));
    let forest = DirectoryTreeRepository::new(dir.path())
        .load()
        .unwrap()
        .forest;
    assert_eq!(forest.find("blnk1234").unwrap().name, "");

    let documents = encode(&forest, |forest, key| {
        PartitionRule::NoDialects.classify(forest, key)
    });
    let mut registry = IdentifierRegistry::in_memory();
    let decoded = decode_onto(&documents.a, &documents.b, &forest, &mut registry).unwrap();
    assert_eq!(decoded, forest);

    let plain = decode(&documents.a, &documents.b, &mut registry).unwrap();
    assert_eq!(plain.find("blnk1234").unwrap().name, "");
    assert_eq!(parent_id(&plain, "blnk1234").as_deref(), Some("atla1234"));
}

#[test]
fn parent_moves_under_its_former_child() {
    let dir = tempfile::tempdir().unwrap();
    scenario(dir.path());
    let repo = DirectoryTreeRepository::new(dir.path());
    let base = repo.load().unwrap().forest;

    let mut registry = IdentifierRegistry::in_memory();
    let mut edited = decode_onto(
        "L [book1237] Bookkeeping Wolof\n",
        "L [wolo1235][wol] Wolof\n    F [atla1234] Atlantic\n    D [gamb1236] Gambian Wolof\n",
        &base,
        &mut registry,
    )
    .unwrap();
    assert_eq!(parent_id(&edited, "atla1234").as_deref(), Some("wolo1235"));

    let summary = repo.materialize(&mut edited).unwrap();
    assert_eq!(summary.moved, 2);
    assert!(dir.path().join("wolo1235/wolo1235.ini").is_file());
    assert!(dir.path().join("wolo1235/atla1234/atla1234.ini").is_file());
    assert!(dir.path().join("wolo1235/gamb1236/gamb1236.ini").is_file());
    assert!(!dir.path().join("atla1234").exists());
    assert!(!dir.path().join(".glottree-staging").exists());

    let reloaded = repo.load().unwrap();
    assert!(reloaded.is_complete());
    assert_eq!(reloaded.forest, edited);
}

#[test]
fn decode_rejects_identifier_owned_by_another_name() {
    let mut registry = IdentifierRegistry::in_memory();
    registry
        .register(&"wolo1235".parse().unwrap(), "Wolof")
        .unwrap();

    let err = decode("", "L [wolo1235] Serer\n", &mut registry).unwrap_err();
    match err {
        TranscodeError::Registry {
            line,
            source: RegistryError::DuplicateIdentifier { existing, requested, .. },
            ..
        } => {
            assert_eq!(line, 1);
            assert_eq!(existing, "Wolof");
            assert_eq!(requested, "Serer");
        }
        other => panic!("unexpected error: {other}"),
    }
}
