//! Operations: the unit of atomicity and of undo/redo.
//!
//! An [`Operation`] is a label plus an ordered list of [`MutationEntry`]
//! primitives. Entries are applied in order; undo applies the inverse entries
//! in reverse order. Every entry kind has an exact inverse:
//!
//! | Entry | Inverse |
//! |---|---|
//! | `Insert(element)` | `Delete(element.id)` |
//! | `Delete(id)` | `Insert(snapshot taken at deletion)` |
//! | `FieldInsert` | `FieldRemove` at the position the value landed at |
//! | `FieldRemove` | `FieldInsert` at the position the value was removed from |
//! | `FieldAssign(old, new)` | `FieldAssign(new, old)` |
//!
//! Because `Delete` and positional entries depend on the state they are
//! applied to, the repository produces inverses while applying an operation.

use indexmap::IndexSet;

use armillary_core::{
    element::Element,
    identifier::{ElementId, Name},
    value::Value,
};

/// A primitive mutation of the element graph.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationEntry {
    /// Make a parentless element live.
    Insert(Box<Element>),

    /// Destroy an unowned, childless, unreferenced element.
    Delete(ElementId),

    /// Insert `value` into the collection `field` of `target`.
    /// `index` defaults to appending.
    FieldInsert {
        target: ElementId,
        field: Name,
        value: Value,
        index: Option<usize>,
    },

    /// Remove `value` from the collection `field` of `target`.
    /// Without an `index` the first equal item is removed.
    FieldRemove {
        target: ElementId,
        field: Name,
        value: Value,
        index: Option<usize>,
    },

    /// Set the scalar `field` of `target` from `old` to `new`.
    FieldAssign {
        target: ElementId,
        field: Name,
        old: Value,
        new: Value,
    },
}

impl MutationEntry {
    /// The element this entry mutates.
    pub fn target(&self) -> ElementId {
        match self {
            MutationEntry::Insert(element) => element.id(),
            MutationEntry::Delete(id) => *id,
            MutationEntry::FieldInsert { target, .. }
            | MutationEntry::FieldRemove { target, .. }
            | MutationEntry::FieldAssign { target, .. } => *target,
        }
    }

    /// Every element this entry touches: the target plus any element
    /// referenced by the values it carries.
    pub fn touched(&self) -> Vec<ElementId> {
        let mut touched = vec![self.target()];
        match self {
            MutationEntry::FieldInsert { value, .. } | MutationEntry::FieldRemove { value, .. } => {
                touched.extend(value.refs());
            }
            MutationEntry::FieldAssign { old, new, .. } => {
                touched.extend(old.refs());
                touched.extend(new.refs());
            }
            MutationEntry::Insert(_) | MutationEntry::Delete(_) => {}
        }
        touched
    }
}

/// An ordered, labeled list of mutation entries committed as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    label: String,
    entries: Vec<MutationEntry>,
}

impl Operation {
    /// Create a new operation.
    ///
    /// Most callers obtain operations from
    /// [`OperationBuilder::end`](crate::OperationBuilder::end) instead.
    pub fn new(label: impl Into<String>, entries: Vec<MutationEntry>) -> Self {
        Self {
            label: label.into(),
            entries,
        }
    }

    /// Human-readable label shown in undo/redo menus.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entries(&self) -> &[MutationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Summary of an applied operation.
///
/// Returned by `do_operation`, `undo`, and `redo` so that callers can use the
/// committed ids directly instead of re-querying the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Commit {
    label: String,
    inserted: Vec<ElementId>,
    deleted: Vec<ElementId>,
    modified: Vec<ElementId>,
}

impl Commit {
    /// Summary of an operation that changed nothing.
    pub(crate) fn empty(label: &str) -> Self {
        Self {
            label: label.to_string(),
            ..Self::default()
        }
    }

    /// Derives the net effect of `entries`.
    ///
    /// An element inserted and deleted within the same entries appears in
    /// neither list; modified elements exclude inserted and deleted ones.
    pub(crate) fn from_entries(label: &str, entries: &[MutationEntry]) -> Self {
        let mut inserted = IndexSet::new();
        let mut deleted = IndexSet::new();
        let mut modified = IndexSet::new();

        for entry in entries {
            match entry {
                MutationEntry::Insert(element) => {
                    if !deleted.shift_remove(&element.id()) {
                        inserted.insert(element.id());
                    } else {
                        modified.insert(element.id());
                    }
                }
                MutationEntry::Delete(id) => {
                    if !inserted.shift_remove(id) {
                        deleted.insert(*id);
                    }
                }
                MutationEntry::FieldInsert { target, .. }
                | MutationEntry::FieldRemove { target, .. }
                | MutationEntry::FieldAssign { target, .. } => {
                    modified.insert(*target);
                }
            }
        }
        modified.retain(|id| !inserted.contains(id) && !deleted.contains(id));

        Self {
            label: label.to_string(),
            inserted: inserted.into_iter().collect(),
            deleted: deleted.into_iter().collect(),
            modified: modified.into_iter().collect(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Elements that became live.
    pub fn inserted(&self) -> &[ElementId] {
        &self.inserted
    }

    /// Elements that were destroyed.
    pub fn deleted(&self) -> &[ElementId] {
        &self.deleted
    }

    /// Live elements whose fields changed.
    pub fn modified(&self) -> &[ElementId] {
        &self.modified
    }

    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.deleted.is_empty() && self.modified.is_empty()
    }
}
