//! Set difference by record id, used when a collection is replaced wholesale.

use std::collections::HashSet;

/// Anything that carries an optional persistent id.
pub trait Identified {
    fn identity(&self) -> Option<&str>;
}

/// Items added and removed by replacing one collection with another.
#[derive(Debug, Clone, PartialEq)]
pub struct SetDiff<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Default for SetDiff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
        }
    }
}

impl<T> SetDiff<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Compare `old` against `new` by id.
///
/// An item without an id is never matched: on the new side it counts as
/// added, on the old side as removed.
pub fn diff_by_id<T: Identified + Clone>(old: &[T], new: &[T]) -> SetDiff<T> {
    let old_ids: HashSet<&str> = old.iter().filter_map(|i| i.identity()).collect();
    let new_ids: HashSet<&str> = new.iter().filter_map(|i| i.identity()).collect();

    let added = new
        .iter()
        .filter(|i| i.identity().map_or(true, |id| !old_ids.contains(id)))
        .cloned()
        .collect();
    let removed = old
        .iter()
        .filter(|i| i.identity().map_or(true, |id| !new_ids.contains(id)))
        .cloned()
        .collect();

    SetDiff { added, removed }
}
