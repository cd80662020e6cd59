//! Grouping of a batch by instrumentation scope name.

use std::sync::Arc;

use indexmap::IndexMap;

/// Indices of a batch grouped by scope name, in first-seen order.
///
/// Index lists are recycled between exports so grouping does not allocate in steady state.
#[derive(Debug, Default)]
pub(crate) struct ScopeGroups {
    groups: IndexMap<Arc<str>, Vec<usize>>,
    spare: Vec<Vec<usize>>,
}

impl ScopeGroups {
    /// Groups the records whose scope names `names` yields, in batch order.
    pub(crate) fn group<'a>(&mut self, names: impl IntoIterator<Item = &'a Arc<str>>) {
        self.clear();
        for (index, name) in names.into_iter().enumerate() {
            if let Some(indices) = self.groups.get_mut(name) {
                indices.push(index);
            } else {
                let mut indices = self.spare.pop().unwrap_or_default();
                indices.push(index);
                self.groups.insert(Arc::clone(name), indices);
            }
        }
    }

    /// Returns the groups in first-seen order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.groups.values().map(Vec::as_slice)
    }

    /// Returns the index lists to the spare list.
    pub(crate) fn clear(&mut self) {
        for (_, mut indices) in self.groups.drain(..) {
            indices.clear();
            self.spare.push(indices);
        }
    }
}
