//! Relocation planning for the directory materializer.
//!
//! # Responsibility
//! - Compute, without I/O, where every languoid directory has to end up.
//! - Derive the minimal set of directory moves and removals.
//! - Reject plans whose moves form a cycle before anything touches disk.
//!
//! # Invariants
//! - All paths are relative to the tree root.
//! - A node moved together with its ancestor gets no move of its own.
//! - A plan returned by [`plan`] is acyclic.

use crate::model::forest::{Forest, NodeKey};
use crate::model::identifier::Identifier;
use crate::repo::tree_repo::{TreeRepoError, TreeRepoResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One directory move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub id: Identifier,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// One directory deletion for a node no longer in the forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removal {
    pub id: Identifier,
    pub dir: PathBuf,
}

/// Full, validated relocation plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationPlan {
    pub relocations: Vec<Relocation>,
    pub removals: Vec<Removal>,
    /// Final directory of every live node, in forest pre-order.
    pub targets: Vec<(NodeKey, PathBuf)>,
    /// Nodes that have no directory yet.
    pub created: Vec<NodeKey>,
}

impl RelocationPlan {
    /// Whether applying the plan moves or deletes anything.
    pub fn is_noop(&self) -> bool {
        self.relocations.is_empty() && self.removals.is_empty()
    }

    /// Returns whether `path` is emptied by a planned move or removal.
    pub fn vacates(&self, path: &Path) -> bool {
        self.relocations
            .iter()
            .map(|relocation| relocation.from.as_path())
            .chain(self.removals.iter().map(|removal| removal.dir.as_path()))
            .any(|source| path.starts_with(source))
    }
}

/// Computes the relocation plan for `forest`.
///
/// # Errors
/// - `RelocationCycle` when following destinations into other moves'
///   sources leads back to the start.
pub fn plan(forest: &Forest) -> TreeRepoResult<RelocationPlan> {
    let mut desired: HashMap<NodeKey, PathBuf> = HashMap::new();
    let mut result = RelocationPlan::default();

    for key in forest.keys() {
        let Some(languoid) = forest.get(key) else {
            continue;
        };
        let name = match (&languoid.dir, forest.is_exempt(key)) {
            (Some(dir), true) => dir
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(languoid.id().as_str())),
            _ => PathBuf::from(languoid.id().as_str()),
        };
        let parent = forest.parent(key);
        let target = match parent.and_then(|p| desired.get(&p)) {
            Some(parent_target) => parent_target.join(name),
            None => name,
        };

        if let Some(old) = &languoid.dir {
            // Where the directory sits once its ancestors have been moved.
            let carried = parent
                .and_then(|p| forest.get(p))
                .and_then(|p| p.dir.as_ref())
                .filter(|parent_old| old.parent() == Some(parent_old.as_path()))
                .and_then(|_| parent.and_then(|p| desired.get(&p)))
                .zip(old.file_name())
                .map(|(parent_target, base)| parent_target.join(base))
                .unwrap_or_else(|| old.clone());
            if carried != target {
                result.relocations.push(Relocation {
                    id: languoid.id().clone(),
                    from: old.clone(),
                    to: target.clone(),
                });
            }
        } else {
            result.created.push(key);
        }

        desired.insert(key, target.clone());
        result.targets.push((key, target));
    }

    result.removals = forest
        .tombstones()
        .iter()
        .map(|tombstone| Removal {
            id: tombstone.id.clone(),
            dir: tombstone.dir.clone(),
        })
        .collect();

    if let Some(identifiers) = find_cycle(&result.relocations) {
        return Err(TreeRepoError::RelocationCycle { identifiers });
    }
    Ok(result)
}

/// Returns the identifiers of the first cycle found, in traversal order.
fn find_cycle(relocations: &[Relocation]) -> Option<Vec<Identifier>> {
    let by_source: HashMap<&Path, usize> = relocations
        .iter()
        .enumerate()
        .map(|(index, relocation)| (relocation.from.as_path(), index))
        .collect();

    // 0 = unvisited, 1 = on current path, 2 = done
    let mut state = vec![0u8; relocations.len()];
    for start in 0..relocations.len() {
        let mut path = Vec::new();
        let mut cursor = Some(start);
        while let Some(index) = cursor {
            match state[index] {
                2 => break,
                1 => {
                    let begin = path.iter().position(|step| *step == index).unwrap_or(0);
                    return Some(
                        path[begin..]
                            .iter()
                            .map(|step: &usize| relocations[*step].id.clone())
                            .collect(),
                    );
                }
                _ => {
                    state[index] = 1;
                    path.push(index);
                    cursor = by_source.get(relocations[index].to.as_path()).copied();
                }
            }
        }
        for step in path {
            state[step] = 2;
        }
    }
    None
}
