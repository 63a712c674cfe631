//! Languoid tree repository contracts and directory implementation.
//!
//! # Responsibility
//! - Load a directory hierarchy (one directory + metadata file per languoid)
//!   into a [`Forest`].
//! - Materialize a forest back onto disk with the minimal set of moves,
//!   removals and metadata writes.
//! - Reconcile a forest with the directories already on disk, so a forest
//!   decoded without a base still moves and removes existing directories.
//!
//! # Invariants
//! - A malformed directory never aborts a load; it is reported and skipped.
//! - Relocation plans are validated before the first filesystem write.
//! - Metadata files are rewritten only when their content changes.

use crate::model::forest::{Forest, ForestError, NodeKey, Tombstone};
use crate::model::identifier::Identifier;
use crate::model::languoid::Languoid;
use crate::repo::metadata::{self, METADATA_EXTENSION};
use crate::repo::relocation::{self, RelocationPlan};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::ffi::OsStr;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::{DirEntry, WalkDir};

/// Scratch directory used while applying relocations; hidden from loads.
const STAGING_DIR_NAME: &str = ".glottree-staging";

/// Result type used by tree repository operations.
pub type TreeRepoResult<T> = Result<T, TreeRepoError>;

/// Errors from tree repository operations.
#[derive(Debug)]
pub enum TreeRepoError {
    /// Tree root directory does not exist.
    RootNotFound(PathBuf),
    Io { path: PathBuf, source: io::Error },
    /// Planned moves form a cycle; nothing was written.
    RelocationCycle { identifiers: Vec<Identifier> },
    /// A move destination is occupied and not vacated by the plan.
    RelocationCollision { path: PathBuf },
    Forest(ForestError),
}

impl Display for TreeRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RootNotFound(path) => write!(f, "tree root not found: {}", path.display()),
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::RelocationCycle { identifiers } => {
                let joined = identifiers
                    .iter()
                    .map(Identifier::as_str)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                write!(f, "relocation cycle between {joined}")
            }
            Self::RelocationCollision { path } => {
                write!(f, "relocation destination already exists: {}", path.display())
            }
            Self::Forest(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TreeRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Forest(err) => Some(err),
            Self::RootNotFound(_) => None,
            Self::RelocationCycle { .. } => None,
            Self::RelocationCollision { .. } => None,
        }
    }
}

impl From<ForestError> for TreeRepoError {
    fn from(value: ForestError) -> Self {
        Self::Forest(value)
    }
}

/// One directory that could not be turned into a languoid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedNode {
    pub path: PathBuf,
    pub reason: String,
}

impl Display for MalformedNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.reason)
    }
}

/// Forest plus every per-directory failure met while loading it.
#[derive(Debug)]
pub struct LoadOutcome {
    pub forest: Forest,
    pub failures: Vec<MalformedNode>,
}

impl LoadOutcome {
    /// Whether every directory produced a languoid.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Counters reported by one materialize run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeSummary {
    /// Directories created for nodes that had none.
    pub created: usize,
    pub moved: usize,
    pub removed: usize,
    /// Metadata files written.
    pub written: usize,
}

/// Repository interface for languoid tree persistence.
pub trait TreeRepository {
    /// Loads the whole tree, collecting malformed directories.
    fn load(&self) -> TreeRepoResult<LoadOutcome>;
    /// Computes and pre-flights the relocation plan without writing.
    ///
    /// Directories already on disk are taken into account exactly as
    /// `materialize` would.
    fn plan(&self, forest: &Forest) -> TreeRepoResult<RelocationPlan>;
    /// Writes `forest` to disk and refreshes each node's directory.
    fn materialize(&self, forest: &mut Forest) -> TreeRepoResult<MaterializeSummary>;
}

/// Tree repository over one root directory.
#[derive(Debug, Clone)]
pub struct DirectoryTreeRepository {
    root: PathBuf,
}

impl DirectoryTreeRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Identifier and relative path of every loadable languoid directory on
    /// disk, in walk order. Malformed directories are never indexed.
    fn disk_index(&self) -> Vec<(Identifier, PathBuf)> {
        if !self.root.is_dir() {
            return Vec::new();
        }
        walk(&self.root)
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| {
                let id = read_languoid(entry.path()).ok()?.id().clone();
                let relative = entry.path().strip_prefix(&self.root).ok()?.to_path_buf();
                Some((id, relative))
            })
            .collect()
    }

    /// Aligns `forest` with the directories on disk.
    ///
    /// Nodes without a last-known directory adopt the one holding their
    /// identifier. Languoid directories whose identifier left the forest are
    /// tombstoned unless a tombstone already covers them.
    fn reconcile(&self, forest: &mut Forest) {
        let claimed: HashSet<PathBuf> = forest.iter().filter_map(|l| l.dir.clone()).collect();
        let mut adopted = 0usize;
        let mut orphaned = 0usize;

        for (id, path) in self.disk_index() {
            if claimed.contains(&path) {
                continue;
            }
            if let Some(key) = forest.key_of(id.as_str()) {
                if let Some(languoid) = forest.get_mut(key).filter(|l| l.dir.is_none()) {
                    languoid.dir = Some(path);
                    adopted += 1;
                }
                continue;
            }
            let covered = forest
                .tombstones()
                .iter()
                .any(|tombstone| path.starts_with(&tombstone.dir));
            if !covered {
                forest.push_tombstone(Tombstone { id, dir: path });
                orphaned += 1;
            }
        }

        if adopted > 0 || orphaned > 0 {
            info!(
                "event=tree_reconcile module=tree_repo status=ok adopted={} orphaned={}",
                adopted, orphaned
            );
        }
    }

    fn preflight(&self, plan: &RelocationPlan) -> TreeRepoResult<()> {
        for relocation in &plan.relocations {
            let destination = self.root.join(&relocation.to);
            if destination.exists() && !plan.vacates(&relocation.to) {
                return Err(TreeRepoError::RelocationCollision { path: destination });
            }
        }
        Ok(())
    }

    fn apply(
        &self,
        forest: &mut Forest,
        plan: &RelocationPlan,
    ) -> TreeRepoResult<MaterializeSummary> {
        let mut summary = MaterializeSummary {
            created: plan.created.len(),
            ..MaterializeSummary::default()
        };
        self.apply_moves(plan, &mut summary)?;

        for (key, target) in &plan.targets {
            let absolute = self.root.join(target);
            fs::create_dir_all(&absolute).map_err(|source| io_error(&absolute, source))?;
            if let Some(languoid) = forest.get(*key) {
                if write_metadata(&absolute, languoid)? {
                    summary.written += 1;
                }
            }
            if let Some(languoid) = forest.get_mut(*key) {
                languoid.dir = Some(target.clone());
            }
        }

        forest.clear_tombstones();
        Ok(summary)
    }

    fn apply_moves(
        &self,
        plan: &RelocationPlan,
        summary: &mut MaterializeSummary,
    ) -> TreeRepoResult<()> {
        if plan.is_noop() {
            return Ok(());
        }

        let staging = self.root.join(STAGING_DIR_NAME);
        if !plan.relocations.is_empty() {
            fs::create_dir_all(&staging).map_err(|source| io_error(&staging, source))?;
        }

        // Deepest sources first so no source is carried away by an ancestor.
        let mut evictions: Vec<(usize, Eviction<'_>)> = plan
            .relocations
            .iter()
            .enumerate()
            .map(|(index, relocation)| {
                (depth_of(&relocation.from), Eviction::Stage(index, &relocation.from))
            })
            .chain(
                plan.removals
                    .iter()
                    .map(|removal| (depth_of(&removal.dir), Eviction::Remove(&removal.dir))),
            )
            .collect();
        evictions.sort_by(|left, right| right.0.cmp(&left.0));

        for (_, eviction) in evictions {
            match eviction {
                Eviction::Stage(index, from) => {
                    let source = self.root.join(from);
                    let staged = staging.join(index.to_string());
                    fs::rename(&source, &staged).map_err(|err| io_error(&source, err))?;
                }
                Eviction::Remove(dir) => {
                    let doomed = self.root.join(dir);
                    match fs::remove_dir_all(&doomed) {
                        Ok(()) => summary.removed += 1,
                        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                        Err(err) => return Err(io_error(&doomed, err)),
                    }
                }
            }
        }

        let mut placements: Vec<usize> = (0..plan.relocations.len()).collect();
        placements.sort_by_key(|index| depth_of(&plan.relocations[*index].to));
        for index in placements {
            let destination = self.root.join(&plan.relocations[index].to);
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(|err| io_error(parent, err))?;
            }
            let staged = staging.join(index.to_string());
            fs::rename(&staged, &destination).map_err(|err| io_error(&destination, err))?;
            summary.moved += 1;
        }

        if staging.exists() {
            fs::remove_dir(&staging).map_err(|err| io_error(&staging, err))?;
        }
        Ok(())
    }
}

enum Eviction<'a> {
    Stage(usize, &'a Path),
    Remove(&'a Path),
}

impl TreeRepository for DirectoryTreeRepository {
    fn load(&self) -> TreeRepoResult<LoadOutcome> {
        let started_at = Instant::now();
        if !self.root.is_dir() {
            error!(
                "event=tree_load module=tree_repo status=error root={} error=root_not_found",
                self.root.display()
            );
            return Err(TreeRepoError::RootNotFound(self.root.clone()));
        }

        let mut forest = Forest::new();
        let mut failures = Vec::new();
        let mut loaded: HashMap<PathBuf, NodeKey> = HashMap::new();

        for entry in walk(&self.root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    failures.push(MalformedNode {
                        path: err
                            .path()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| self.root.clone()),
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_path_buf();
            let mut languoid = match read_languoid(entry.path()) {
                Ok(languoid) => languoid,
                Err(reason) => {
                    failures.push(MalformedNode {
                        path: entry.path().to_path_buf(),
                        reason,
                    });
                    continue;
                }
            };
            languoid.dir = Some(relative.clone());

            // Children of a malformed directory hang off its nearest loaded ancestor.
            let parent = relative
                .ancestors()
                .skip(1)
                .find_map(|ancestor| loaded.get(ancestor).copied());
            match forest.insert(languoid, parent) {
                Ok(key) => {
                    loaded.insert(relative, key);
                }
                Err(err) => failures.push(MalformedNode {
                    path: entry.path().to_path_buf(),
                    reason: err.to_string(),
                }),
            }
        }

        for failure in &failures {
            warn!(
                "event=tree_load module=tree_repo status=error path={} reason={}",
                failure.path.display(),
                failure.reason
            );
        }
        info!(
            "event=tree_load module=tree_repo status=ok root={} nodes={} failures={} duration_ms={}",
            self.root.display(),
            forest.len(),
            failures.len(),
            started_at.elapsed().as_millis()
        );
        Ok(LoadOutcome { forest, failures })
    }

    fn plan(&self, forest: &Forest) -> TreeRepoResult<RelocationPlan> {
        let mut forest = forest.clone();
        self.reconcile(&mut forest);
        let plan = relocation::plan(&forest)?;
        self.preflight(&plan)?;
        Ok(plan)
    }

    fn materialize(&self, forest: &mut Forest) -> TreeRepoResult<MaterializeSummary> {
        let started_at = Instant::now();
        info!(
            "event=tree_materialize module=tree_repo status=start root={} nodes={}",
            self.root.display(),
            forest.len()
        );

        self.reconcile(forest);
        let result = relocation::plan(forest)
            .and_then(|plan| self.preflight(&plan).map(|()| plan))
            .and_then(|plan| self.apply(forest, &plan));
        match &result {
            Ok(summary) => info!(
                "event=tree_materialize module=tree_repo status=ok created={} moved={} removed={} written={} duration_ms={}",
                summary.created,
                summary.moved,
                summary.removed,
                summary.written,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=tree_materialize module=tree_repo status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}

/// Depth-first walk below `root`, sorted by name, skipping hidden entries.
fn walk(root: &Path) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_hidden(entry))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

fn depth_of(path: &Path) -> usize {
    path.components().count()
}

fn io_error(path: &Path, source: io::Error) -> TreeRepoError {
    TreeRepoError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn is_metadata_file(path: &Path) -> bool {
    path.is_file() && path.extension() == Some(OsStr::new(METADATA_EXTENSION))
}

/// Picks `<dirname>.ini`, else the only `*.ini` in `dir`.
fn metadata_file(dir: &Path) -> Result<PathBuf, String> {
    if let Some(name) = dir.file_name().and_then(OsStr::to_str) {
        let preferred = dir.join(format!("{name}.{METADATA_EXTENSION}"));
        if preferred.is_file() {
            return Ok(preferred);
        }
    }

    let mut candidates = Vec::new();
    let entries = fs::read_dir(dir).map_err(|err| err.to_string())?;
    for entry in entries {
        let path = entry.map_err(|err| err.to_string())?.path();
        if is_metadata_file(&path) {
            candidates.push(path);
        }
    }
    match candidates.len() {
        0 => Err(format!("no .{METADATA_EXTENSION} metadata file")),
        1 => Ok(candidates.remove(0)),
        count => Err(format!(
            "{count} .{METADATA_EXTENSION} files and none named after the directory"
        )),
    }
}

fn read_languoid(dir: &Path) -> Result<Languoid, String> {
    let path = metadata_file(dir)?;
    let content = fs::read_to_string(&path).map_err(|err| err.to_string())?;
    let sections = metadata::parse(&content).map_err(|err| err.to_string())?;
    Languoid::from_sections(sections).map_err(|err| err.to_string())
}

/// Writes the node's metadata file when it changed and drops stale ones.
fn write_metadata(dir: &Path, languoid: &Languoid) -> TreeRepoResult<bool> {
    let file_name = format!("{}.{METADATA_EXTENSION}", languoid.id());
    let path = dir.join(&file_name);
    let rendered = metadata::render(&languoid.to_sections());

    let changed = match fs::read_to_string(&path) {
        Ok(existing) => existing != rendered,
        Err(err) if err.kind() == io::ErrorKind::NotFound => true,
        Err(err) => return Err(io_error(&path, err)),
    };
    if changed {
        fs::write(&path, rendered).map_err(|err| io_error(&path, err))?;
    }

    let entries = fs::read_dir(dir).map_err(|err| io_error(dir, err))?;
    for entry in entries {
        let stale = entry.map_err(|err| io_error(dir, err))?.path();
        if is_metadata_file(&stale) && stale.file_name() != Some(OsStr::new(&file_name)) {
            fs::remove_file(&stale).map_err(|err| io_error(&stale, err))?;
        }
    }
    Ok(changed)
}
