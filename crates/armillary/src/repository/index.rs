//! Element arena and its secondary indexes.
//!
//! This module provides [`ElementGraph`], the id-indexed arena that backs the
//! repository. Ownership and cross references are plain ids stored in element
//! fields, so the graph needs no language-level back pointers. Alongside the
//! arena it maintains:
//!
//! - a kind index and a type-name index for type-based queries
//! - a referrer index mapping each element to the live elements holding a
//!   non-owning reference to it, with a count per referrer
//!
//! All mutation goes through [`ElementGraph::add`], [`ElementGraph::remove`]
//! and [`ElementGraph::update`], which keep the indexes in step with the arena.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use armillary_core::{
    element::Element,
    identifier::{ElementId, Name},
    kind::ElementKind,
};

/// Id-indexed element arena with kind, type, and referrer indexes.
#[derive(Debug, Default)]
pub(super) struct ElementGraph {
    elements: IndexMap<ElementId, Element>,
    by_kind: HashMap<ElementKind, IndexSet<ElementId>>,
    by_type: HashMap<Name, IndexSet<ElementId>>,
    referrers: HashMap<ElementId, IndexMap<ElementId, usize>>,
}

impl ElementGraph {
    /// Creates a new empty graph.
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Returns the element for the given ID, if it exists.
    pub(super) fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Checks if an element with the given ID is live.
    pub(super) fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    /// Returns the number of live elements.
    pub(super) fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns an iterator over all live elements.
    pub(super) fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// Returns an iterator over the elements of the given kind.
    pub(super) fn of_kind(&self, kind: ElementKind) -> impl Iterator<Item = &Element> {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(|id| self.elements.get(id))
    }

    /// Returns an iterator over the elements with the given type name.
    pub(super) fn of_type(&self, type_name: Name) -> impl Iterator<Item = &Element> {
        self.by_type
            .get(&type_name)
            .into_iter()
            .flatten()
            .filter_map(|id| self.elements.get(id))
    }

    /// Returns an iterator over the elements holding a non-owning reference to `id`.
    pub(super) fn referrers(&self, id: ElementId) -> impl Iterator<Item = &Element> {
        self.referrers
            .get(&id)
            .into_iter()
            .flat_map(|referrers| referrers.keys())
            .filter_map(|referrer| self.elements.get(referrer))
    }

    /// Returns the first other element still referencing `id`, if any.
    ///
    /// A self-reference does not count, since it disappears with the element.
    pub(super) fn first_referrer(&self, id: ElementId) -> Option<ElementId> {
        self.referrers
            .get(&id)
            .and_then(|referrers| referrers.keys().copied().find(|referrer| *referrer != id))
    }

    /// Adds an element and indexes it.
    ///
    /// # Panics
    /// Panics in debug mode if an element with the same ID is already live.
    /// Callers check for duplicates first; in a release build this check is
    /// optimized away.
    pub(super) fn add(&mut self, element: Element) {
        debug_assert!(
            !self.elements.contains_key(&element.id()),
            "Adding element: {} is already live",
            element.id()
        );

        let id = element.id();
        self.by_kind.entry(element.kind()).or_default().insert(id);
        self.by_type.entry(element.type_name()).or_default().insert(id);
        self.index_references(&element);
        self.elements.insert(id, element);
    }

    /// Removes an element and its index entries, returning it.
    ///
    /// References *to* the removed element are left in the referrer index;
    /// callers must not remove an element that is still referenced.
    pub(super) fn remove(&mut self, id: ElementId) -> Option<Element> {
        let element = self.elements.swap_remove(&id)?;

        if let Some(ids) = self.by_kind.get_mut(&element.kind()) {
            ids.swap_remove(&id);
        }
        if let Some(ids) = self.by_type.get_mut(&element.type_name()) {
            ids.swap_remove(&id);
        }
        self.unindex_references(&element);
        Some(element)
    }

    /// Mutates an element in place, re-indexing its references around the edit.
    ///
    /// Returns `None` if the element is not live.
    pub(super) fn update<R>(
        &mut self,
        id: ElementId,
        edit: impl FnOnce(&mut Element) -> R,
    ) -> Option<R> {
        let mut element = self.elements.get(&id)?.clone();
        self.unindex_references(&element);
        let result = edit(&mut element);
        self.index_references(&element);
        self.elements.insert(id, element);
        Some(result)
    }

    fn index_references(&mut self, element: &Element) {
        for (_, target) in element.references() {
            *self
                .referrers
                .entry(target)
                .or_default()
                .entry(element.id())
                .or_insert(0) += 1;
        }
    }

    fn unindex_references(&mut self, element: &Element) {
        for (_, target) in element.references() {
            let Some(referrers) = self.referrers.get_mut(&target) else {
                continue;
            };
            if let Some(count) = referrers.get_mut(&element.id()) {
                *count -= 1;
                if *count == 0 {
                    referrers.swap_remove(&element.id());
                }
            }
            if referrers.is_empty() {
                self.referrers.remove(&target);
            }
        }
    }
}
