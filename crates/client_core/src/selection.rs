//! Selection state for list screens, independent of any rendering.

use std::collections::{btree_set, BTreeSet};

/// Tri-state of the "select all" checkbox in a table header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeaderCheckboxState {
    pub checked: bool,
    pub indeterminate: bool,
}

/// Computes the header checkbox from the currently visible ids.
///
/// Selected ids that are not visible do not count towards either state.
pub fn header_checkbox_state<'a, Id>(
    visible: impl IntoIterator<Item = &'a Id>,
    selection: &SelectionSet<Id>,
) -> HeaderCheckboxState
where
    Id: Ord + 'a,
{
    let mut total = 0usize;
    let mut selected = 0usize;
    for id in visible {
        total += 1;
        if selection.contains(id) {
            selected += 1;
        }
    }

    HeaderCheckboxState {
        checked: total > 0 && selected == total,
        indeterminate: selected > 0 && selected < total,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionSet<Id: Ord> {
    ids: BTreeSet<Id>,
}

impl<Id: Ord> Default for SelectionSet<Id> {
    fn default() -> Self {
        Self {
            ids: BTreeSet::new(),
        }
    }
}

impl<Id: Ord> SelectionSet<Id> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &Id) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> btree_set::Iter<'_, Id> {
        self.ids.iter()
    }
}

impl<Id: Ord + Clone> SelectionSet<Id> {
    /// Flips membership of `id`; returns whether it is selected afterwards.
    pub fn toggle_one(&mut self, id: &Id) -> bool {
        if self.ids.remove(id) {
            false
        } else {
            self.ids.insert(id.clone());
            true
        }
    }

    /// Clears the selection when every visible id is already selected (or nothing
    /// is visible); otherwise replaces the selection with exactly the visible ids.
    pub fn toggle_all<'a>(&mut self, visible: impl IntoIterator<Item = &'a Id>)
    where
        Id: 'a,
    {
        let visible: BTreeSet<Id> = visible.into_iter().cloned().collect();
        if visible.iter().all(|id| self.ids.contains(id)) {
            self.ids.clear();
        } else {
            self.ids = visible;
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Drops ids for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&Id) -> bool) {
        self.ids.retain(|id| keep(id));
    }
}

impl<'a, Id: Ord> IntoIterator for &'a SelectionSet<Id> {
    type Item = &'a Id;
    type IntoIter = btree_set::Iter<'a, Id>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

#[cfg(test)]
#[path = "tests/selection_tests.rs"]
mod tests;
