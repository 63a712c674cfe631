//! Arena-backed languoid forest.
//!
//! # Responsibility
//! - Own every languoid of one loaded tree and the parent/child edges.
//! - Provide the read API used by collaborators (`iter`, `find`).
//! - Provide mutation primitives (insert, move, remove, re-identify).
//!
//! # Invariants
//! - Parent links are keys into the arena, never owning references.
//! - The children index and root list mirror the parent links exactly.
//! - Every live identifier appears once in the identifier index.
//! - Children and roots keep insertion order; that order is the forest
//!   iteration order.

use crate::model::identifier::Identifier;
use crate::model::languoid::{Languoid, Level};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Stable handle of one node inside a [`Forest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

impl Display for NodeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Directory left behind by a node removed from the forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    pub id: Identifier,
    pub dir: PathBuf,
}

/// Errors from forest mutation primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForestError {
    /// Identifier already used by another live node.
    DuplicateIdentifier(Identifier),
    /// Key does not point at a live node.
    NodeNotFound(NodeKey),
    /// Move would place a node below itself.
    CycleDetected { node: Identifier, parent: Identifier },
}

impl Display for ForestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateIdentifier(id) => write!(f, "identifier already in forest: {id}"),
            Self::NodeNotFound(key) => write!(f, "forest node not found: {key}"),
            Self::CycleDetected { node, parent } => {
                write!(f, "move would create cycle: node {node} under parent {parent}")
            }
        }
    }
}

impl Error for ForestError {}

#[derive(Debug, Clone)]
struct Slot {
    languoid: Languoid,
    parent: Option<NodeKey>,
    children: Vec<NodeKey>,
}

/// All languoid trees of one repository.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    slots: Vec<Option<Slot>>,
    index: HashMap<Identifier, NodeKey>,
    roots: Vec<NodeKey>,
    tombstones: Vec<Tombstone>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live languoids.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Inserts one languoid as the last child of `parent` (or last root).
    pub fn insert(
        &mut self,
        languoid: Languoid,
        parent: Option<NodeKey>,
    ) -> Result<NodeKey, ForestError> {
        if let Some(parent) = parent {
            self.slot(parent)?;
        }
        if self.index.contains_key(languoid.id()) {
            return Err(ForestError::DuplicateIdentifier(languoid.id().clone()));
        }

        let key = NodeKey(self.slots.len());
        self.index.insert(languoid.id().clone(), key);
        self.slots.push(Some(Slot {
            languoid,
            parent,
            children: Vec::new(),
        }));
        self.sibling_list_mut(parent).push(key);
        Ok(key)
    }

    pub fn key_of(&self, id: &str) -> Option<NodeKey> {
        self.index.get(id).copied()
    }

    pub fn get(&self, key: NodeKey) -> Option<&Languoid> {
        self.slot(key).ok().map(|slot| &slot.languoid)
    }

    /// Mutable access to every attribute except the identifier.
    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut Languoid> {
        self.slots
            .get_mut(key.0)
            .and_then(Option::as_mut)
            .map(|slot| &mut slot.languoid)
    }

    /// Looks up one languoid by identifier.
    pub fn find(&self, id: &str) -> Option<&Languoid> {
        self.key_of(id).and_then(|key| self.get(key))
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.slot(key).ok().and_then(|slot| slot.parent)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.slot(key)
            .map(|slot| slot.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    /// Walks parent links upward, nearest ancestor first.
    pub fn ancestors(&self, key: NodeKey) -> Ancestors<'_> {
        Ancestors {
            forest: self,
            cursor: self.parent(key),
        }
    }

    /// Pre-order keys of the subtree rooted at `key`, `key` first.
    pub fn subtree(&self, key: NodeKey) -> Keys<'_> {
        let stack = if self.get(key).is_some() {
            vec![key]
        } else {
            Vec::new()
        };
        Keys {
            forest: self,
            stack,
        }
    }

    /// Pre-order keys strictly below `key`.
    pub fn descendants(&self, key: NodeKey) -> std::iter::Skip<Keys<'_>> {
        self.subtree(key).skip(1)
    }

    /// Pre-order keys of the whole forest.
    pub fn keys(&self) -> Keys<'_> {
        Keys {
            forest: self,
            stack: self.roots.iter().rev().copied().collect(),
        }
    }

    /// Lazy pre-order iteration over every languoid.
    ///
    /// Restartable: each call walks the forest as it is now.
    pub fn iter(&self) -> Iter<'_> {
        Iter { keys: self.keys() }
    }

    /// Whether the node or one of its ancestors is the unidentified family.
    pub fn is_exempt(&self, key: NodeKey) -> bool {
        std::iter::once(key)
            .chain(self.ancestors(key))
            .filter_map(|candidate| self.get(candidate))
            .any(|languoid| languoid.id().is_unidentified())
    }

    /// Whether the subtree rooted at `key` holds a node of `level`.
    pub fn subtree_has_level(&self, key: NodeKey, level: Level) -> bool {
        self.subtree(key)
            .filter_map(|candidate| self.get(candidate))
            .any(|languoid| languoid.level == level)
    }

    /// Re-parents one node (with its subtree) as the last child of `new_parent`.
    pub fn move_node(
        &mut self,
        key: NodeKey,
        new_parent: Option<NodeKey>,
    ) -> Result<(), ForestError> {
        let old_parent = self.slot(key)?.parent;
        if let Some(parent) = new_parent {
            self.slot(parent)?;
            if parent == key || self.ancestors(parent).any(|ancestor| ancestor == key) {
                return Err(ForestError::CycleDetected {
                    node: self.slot(key)?.languoid.id().clone(),
                    parent: self.slot(parent)?.languoid.id().clone(),
                });
            }
        }

        self.sibling_list_mut(old_parent).retain(|child| *child != key);
        self.sibling_list_mut(new_parent).push(key);
        if let Some(slot) = self.slots.get_mut(key.0).and_then(Option::as_mut) {
            slot.parent = new_parent;
        }
        Ok(())
    }

    /// Removes a node and its subtree, returning the removed languoids in
    /// pre-order. Nodes that had a directory leave a tombstone behind.
    pub fn remove_subtree(&mut self, key: NodeKey) -> Result<Vec<Languoid>, ForestError> {
        let parent = self.slot(key)?.parent;
        let doomed: Vec<NodeKey> = self.subtree(key).collect();
        self.sibling_list_mut(parent).retain(|child| *child != key);

        let mut removed = Vec::with_capacity(doomed.len());
        for doomed_key in doomed {
            if let Some(slot) = self.slots.get_mut(doomed_key.0).and_then(Option::take) {
                self.index.remove(slot.languoid.id());
                if let Some(dir) = &slot.languoid.dir {
                    self.tombstones.push(Tombstone {
                        id: slot.languoid.id().clone(),
                        dir: dir.clone(),
                    });
                }
                removed.push(slot.languoid);
            }
        }
        Ok(removed)
    }

    /// Gives a node a new identifier, returning the previous one.
    ///
    /// The previous identifier stays retired in the registry; the node keeps
    /// its directory until the next materialize renames it.
    pub fn reassign_identifier(
        &mut self,
        key: NodeKey,
        new_id: Identifier,
    ) -> Result<Identifier, ForestError> {
        self.slot(key)?;
        if self.index.contains_key(&new_id) {
            return Err(ForestError::DuplicateIdentifier(new_id));
        }
        let slot = self
            .slots
            .get_mut(key.0)
            .and_then(Option::as_mut)
            .ok_or(ForestError::NodeNotFound(key))?;
        let old_id = slot.languoid.id().clone();
        slot.languoid.set_id(new_id.clone());
        self.index.remove(&old_id);
        self.index.insert(new_id, key);
        Ok(old_id)
    }

    pub fn tombstones(&self) -> &[Tombstone] {
        &self.tombstones
    }

    pub(crate) fn push_tombstone(&mut self, tombstone: Tombstone) {
        self.tombstones.push(tombstone);
    }

    pub(crate) fn clear_tombstones(&mut self) {
        self.tombstones.clear();
    }

    fn slot(&self, key: NodeKey) -> Result<&Slot, ForestError> {
        self.slots
            .get(key.0)
            .and_then(Option::as_ref)
            .ok_or(ForestError::NodeNotFound(key))
    }

    fn sibling_list_mut(&mut self, parent: Option<NodeKey>) -> &mut Vec<NodeKey> {
        match parent.and_then(|key| self.slots.get_mut(key.0).and_then(Option::as_mut)) {
            Some(slot) => &mut slot.children,
            None => &mut self.roots,
        }
    }
}

/// Equality ignores ordering and directories: same identifiers, same
/// attributes, same parent identifier for every node.
impl PartialEq for Forest {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        self.keys().all(|key| {
            let Some(languoid) = self.get(key) else {
                return false;
            };
            let Some(other_key) = other.key_of(languoid.id().as_str()) else {
                return false;
            };
            let parent_id = self.parent(key).and_then(|p| self.get(p)).map(Languoid::id);
            let other_parent_id = other
                .parent(other_key)
                .and_then(|p| other.get(p))
                .map(Languoid::id);
            other.get(other_key) == Some(languoid) && parent_id == other_parent_id
        })
    }
}

impl Eq for Forest {}

/// Iterator over ancestor keys, nearest first.
pub struct Ancestors<'a> {
    forest: &'a Forest,
    cursor: Option<NodeKey>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.cursor?;
        self.cursor = self.forest.parent(current);
        Some(current)
    }
}

/// Pre-order key iterator.
pub struct Keys<'a> {
    forest: &'a Forest,
    stack: Vec<NodeKey>,
}

impl Iterator for Keys<'_> {
    type Item = NodeKey;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.stack.pop()?;
        self.stack
            .extend(self.forest.children(key).iter().rev().copied());
        Some(key)
    }
}

/// Pre-order languoid iterator returned by [`Forest::iter`].
pub struct Iter<'a> {
    keys: Keys<'a>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Languoid;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.keys.next()?;
        self.keys.forest.get(key)
    }
}

impl<'a> IntoIterator for &'a Forest {
    type Item = &'a Languoid;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Collects identifiers of a key sequence, for diagnostics and tests.
pub fn identifiers_of(forest: &Forest, keys: impl IntoIterator<Item = NodeKey>) -> Vec<String> {
    keys.into_iter()
        .filter_map(|key| forest.get(key))
        .map(|languoid| languoid.id().to_string())
        .collect()
}

/// Returns identifiers that occur in both forests but under different parents.
pub fn reparented_identifiers(before: &Forest, after: &Forest) -> Vec<Identifier> {
    let mut seen = HashSet::new();
    let mut moved = Vec::new();
    for key in after.keys() {
        let Some(languoid) = after.get(key) else {
            continue;
        };
        let Some(before_key) = before.key_of(languoid.id().as_str()) else {
            continue;
        };
        let after_parent = after.parent(key).and_then(|p| after.get(p)).map(Languoid::id);
        let before_parent = before
            .parent(before_key)
            .and_then(|p| before.get(p))
            .map(Languoid::id);
        if after_parent != before_parent && seen.insert(languoid.id().clone()) {
            moved.push(languoid.id().clone());
        }
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::{identifiers_of, reparented_identifiers, Forest, ForestError};
    use crate::model::identifier::Identifier;
    use crate::model::languoid::{Languoid, Level};
    use std::path::PathBuf;

    fn languoid(id: &str, level: Level) -> Languoid {
        Languoid::new(Identifier::parse(id).unwrap(), id.to_uppercase(), level)
    }

    fn sample() -> Forest {
        let mut forest = Forest::new();
        let family = forest.insert(languoid("atla1234", Level::Family), None).unwrap();
        let language = forest
            .insert(languoid("wolo1235", Level::Language), Some(family))
            .unwrap();
        forest
            .insert(languoid("gamb1236", Level::Dialect), Some(language))
            .unwrap();
        forest.insert(languoid("book1237", Level::Language), None).unwrap();
        forest
    }

    #[test]
    fn iteration_is_pre_order_and_restartable() {
        let forest = sample();
        let first: Vec<_> = forest.iter().map(|l| l.id().to_string()).collect();
        let second: Vec<_> = forest.iter().map(|l| l.id().to_string()).collect();
        assert_eq!(first, vec!["atla1234", "wolo1235", "gamb1236", "book1237"]);
        assert_eq!(first, second);
    }

    #[test]
    fn insert_rejects_duplicate_identifier() {
        let mut forest = sample();
        let err = forest
            .insert(languoid("wolo1235", Level::Language), None)
            .unwrap_err();
        assert!(matches!(err, ForestError::DuplicateIdentifier(id) if id.as_str() == "wolo1235"));
    }

    #[test]
    fn move_rejects_cycles_and_updates_edges() {
        let mut forest = sample();
        let family = forest.key_of("atla1234").unwrap();
        let dialect = forest.key_of("gamb1236").unwrap();
        let book = forest.key_of("book1237").unwrap();

        let err = forest.move_node(family, Some(dialect)).unwrap_err();
        assert!(matches!(err, ForestError::CycleDetected { .. }));

        forest.move_node(book, Some(family)).unwrap();
        assert_eq!(forest.parent(book), Some(family));
        assert_eq!(
            identifiers_of(&forest, forest.descendants(family)),
            vec!["wolo1235", "gamb1236", "book1237"]
        );
        assert_eq!(
            identifiers_of(&forest, forest.children(family).iter().copied()),
            vec!["wolo1235", "book1237"]
        );
        assert_eq!(forest.roots().len(), 1);
    }

    #[test]
    fn reparented_identifiers_lists_moved_nodes_only() {
        let before = sample();
        let mut after = sample();
        let book = after.key_of("book1237").unwrap();
        let family = after.key_of("atla1234").unwrap();
        after.move_node(book, Some(family)).unwrap();
        after.insert(languoid("sere1234", Level::Language), Some(family)).unwrap();

        let moved = reparented_identifiers(&before, &after);
        assert_eq!(moved, vec![Identifier::parse("book1237").unwrap()]);
        assert!(reparented_identifiers(&before, &sample()).is_empty());
    }

    #[test]
    fn remove_subtree_records_tombstones_for_materialized_nodes() {
        let mut forest = sample();
        let language = forest.key_of("wolo1235").unwrap();
        forest.get_mut(language).unwrap().dir = Some(PathBuf::from("atla1234/wolo1235"));

        let removed = forest.remove_subtree(language).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(forest.find("gamb1236").is_none());
        assert_eq!(forest.len(), 2);
        assert_eq!(forest.tombstones().len(), 1);
        assert_eq!(forest.tombstones()[0].id.as_str(), "wolo1235");
    }

    #[test]
    fn reassign_identifier_updates_index() {
        let mut forest = sample();
        let key = forest.key_of("book1237").unwrap();
        let old = forest
            .reassign_identifier(key, Identifier::parse("book1238").unwrap())
            .unwrap();
        assert_eq!(old.as_str(), "book1237");
        assert!(forest.find("book1237").is_none());
        assert_eq!(forest.find("book1238").unwrap().level, Level::Language);
    }

    #[test]
    fn equality_ignores_order_but_not_parents() {
        let forest = sample();
        let mut reordered = Forest::new();
        reordered.insert(languoid("book1237", Level::Language), None).unwrap();
        let family = reordered
            .insert(languoid("atla1234", Level::Family), None)
            .unwrap();
        let language = reordered
            .insert(languoid("wolo1235", Level::Language), Some(family))
            .unwrap();
        let dialect = reordered
            .insert(languoid("gamb1236", Level::Dialect), Some(language))
            .unwrap();
        assert_eq!(forest, reordered);

        reordered.move_node(dialect, None).unwrap();
        assert_ne!(forest, reordered);
    }

    #[test]
    fn exemption_is_inherited_from_unidentified_family() {
        let mut forest = Forest::new();
        let unidentified = forest.insert(languoid("unun9999", Level::Family), None).unwrap();
        let child = forest
            .insert(languoid("abcd1234", Level::Language), Some(unidentified))
            .unwrap();
        assert!(forest.is_exempt(child));
        assert!(!sample().is_exempt(sample().key_of("wolo1235").unwrap()));
    }
}
