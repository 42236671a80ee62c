//! The repository: authoritative store of the element graph.
//!
//! A [`Repository`] owns every live [`Element`], the indexes used to query
//! them, the undo/redo history, and the change listeners. The graph is only
//! ever mutated through [`Repository::do_operation`], [`Repository::undo`] and
//! [`Repository::redo`]; queries hand out shared references only.
//!
//! # Application
//!
//! Applying an operation runs its entries in order. Each applied entry yields
//! its exact inverse, so the inverse operation is known as soon as the last
//! entry lands. If any entry is malformed, the entries applied so far are
//! reverted in reverse order before the error is returned, so the graph is
//! never left partially updated.
//!
//! After the last entry, the touched elements are checked for the ownership
//! and endpoint invariants (no orphans, complete endpoints, edge views inside
//! their diagram). Elements that changed owner take their descendants along,
//! so edges attached anywhere below them are checked too. A violation there is
//! rolled back the same way.
//!
//! Ids are never reused. An id deleted by a committed operation is retired;
//! only undo and redo may bring it back. Inserting a used id, or deleting an
//! element that is not live, is rolled back and then panics.

mod index;

use std::{
    cell::Cell,
    collections::{BTreeMap, HashSet},
    fmt,
};

use indexmap::IndexSet;
use log::{debug, error, info, trace, warn};

use armillary_core::{
    element::Element,
    identifier::{ElementId, Name},
    kind::{ElementKind, HasEndpoints, HasOwnedCollection},
    value::Value,
};

use crate::{
    builder::OperationBuilder,
    config::StoreConfig,
    engine::Engine,
    error::{IntegrityViolation, ModelError},
    event::{Listener, OperationDirection, OperationEvent},
    operation::{Commit, MutationEntry, Operation},
    undo::{HistoryEntry, UndoManager},
};

use index::ElementGraph;

/// Ordered copy of the whole element graph, used for diffing states.
pub type Snapshot = BTreeMap<ElementId, Element>;

/// The indexed store of all live elements and the sole applier of operations.
pub struct Repository {
    graph: ElementGraph,
    root: ElementId,
    history: UndoManager,
    config: StoreConfig,
    modified: bool,
    transaction_open: Cell<bool>,
    listeners: Vec<Listener>,
    retired: HashSet<ElementId>,
}

impl Repository {
    /// Creates a repository holding only `root`, with default configuration.
    ///
    /// # Panics
    ///
    /// Panics if `root` has a parent or already lists owned children; use
    /// [`Repository::load`] to construct a populated graph.
    pub fn new(root: Element) -> Self {
        Self::with_config(root, StoreConfig::default())
    }

    /// Creates a repository holding only `root`.
    ///
    /// # Panics
    ///
    /// Panics if `root` has a parent or already lists owned children.
    pub fn with_config(root: Element, config: StoreConfig) -> Self {
        assert!(root.parent().is_none(), "root element must not have a parent");
        assert!(
            root.owned_children().next().is_none(),
            "root element must not own children; use Repository::load"
        );

        let root_id = root.id();
        let mut graph = ElementGraph::new();
        graph.add(root);

        Self::from_parts(graph, root_id, config)
    }

    /// Bulk-constructs a repository from already materialized elements.
    ///
    /// This is the entry point for persistence: it bypasses the operation
    /// pipeline, derives every element's owner from the owning collections,
    /// and validates the whole graph. The result has no undo history and is
    /// not modified.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Integrity`] if ids repeat, an owning collection
    /// lists a missing or doubly owned element, or the loaded graph breaks the
    /// ownership or endpoint invariants.
    pub fn load(
        root: Element,
        elements: impl IntoIterator<Item = Element>,
        config: StoreConfig,
    ) -> Result<Self, ModelError> {
        let root_id = root.id();
        let mut all = indexmap::IndexMap::new();
        for mut element in std::iter::once(root).chain(elements) {
            element.detach();
            let id = element.id();
            if all.insert(id, element).is_some() {
                return Err(IntegrityViolation::DuplicateId(id).into());
            }
        }

        let ownership: Vec<(ElementId, Name, ElementId)> = all
            .values()
            .flat_map(|parent| {
                parent
                    .owned_children()
                    .map(move |(field, child)| (parent.id(), field, child))
            })
            .collect();
        for (parent, field, child) in ownership {
            if child == root_id {
                return Err(IntegrityViolation::RootElement(root_id).into());
            }
            let Some(element) = all.get_mut(&child) else {
                return Err(IntegrityViolation::UnresolvedReference {
                    element: parent,
                    field,
                    target: child,
                }
                .into());
            };
            if let Some(owner) = element.parent() {
                return Err(IntegrityViolation::AlreadyOwned { child, owner }.into());
            }
            element.attach(parent, field);
        }

        let mut graph = ElementGraph::new();
        for element in all.into_values() {
            graph.add(element);
        }

        let repository = Self::from_parts(graph, root_id, config);
        if let Some(violation) = repository.verify_integrity().into_iter().next() {
            return Err(violation.into());
        }

        info!(elements = repository.len(); "Element graph loaded");
        Ok(repository)
    }

    fn from_parts(graph: ElementGraph, root: ElementId, config: StoreConfig) -> Self {
        Self {
            graph,
            root,
            history: UndoManager::new(config.undo_limit()),
            config,
            modified: false,
            transaction_open: Cell::new(false),
            listeners: Vec::new(),
            retired: HashSet::new(),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Returns the configuration the repository was created with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Id of the root element.
    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Looks up a live element.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotFound`] if the id was never inserted or has
    /// been deleted. Callers treat this as "the element no longer exists".
    pub fn get(&self, id: ElementId) -> Result<&Element, ModelError> {
        self.graph.element(id).ok_or(ModelError::NotFound(id))
    }

    /// Checks if an element is live.
    pub fn contains(&self, id: ElementId) -> bool {
        self.graph.contains(id)
    }

    /// Number of live elements, root included.
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// Always `false`: a repository holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.graph.len() == 0
    }

    /// Iterates every live element. Order is unspecified.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.graph.elements()
    }

    /// Iterates the live elements matching `predicate`. Order is unspecified.
    pub fn instances_of<'a>(
        &'a self,
        predicate: impl Fn(&Element) -> bool + 'a,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.graph.elements().filter(move |element| predicate(element))
    }

    /// Iterates the live elements of `kind`, using the kind index.
    pub fn instances_of_kind(&self, kind: ElementKind) -> impl Iterator<Item = &Element> {
        self.graph.of_kind(kind)
    }

    /// Iterates the live elements of a domain type, using the type index.
    pub fn instances_of_type(&self, type_name: impl Into<Name>) -> impl Iterator<Item = &Element> {
        self.graph.of_type(type_name.into())
    }

    /// Iterates the live elements holding a non-owning reference to `id`.
    pub fn referrers_of(&self, id: ElementId) -> impl Iterator<Item = &Element> {
        self.graph.referrers(id)
    }

    /// All relationships having `id` as one of their endpoints.
    pub fn relationships_of(&self, id: ElementId) -> Vec<&Element> {
        self.relationships_of_where(id, |_| true)
    }

    /// Relationships having `id` as an endpoint and satisfying `filter`.
    pub fn relationships_of_where(
        &self,
        id: ElementId,
        filter: impl Fn(&Element) -> bool,
    ) -> Vec<&Element> {
        self.graph
            .referrers(id)
            .filter(|element| element.kind().is_relationship())
            .filter(|element| element.endpoints().any(|end| end == id))
            .filter(|element| filter(element))
            .collect()
    }

    /// All views rendering `id`, across all diagrams.
    pub fn views_of(&self, id: ElementId) -> Vec<&Element> {
        self.graph
            .referrers(id)
            .filter(|element| element.kind().is_view() && element.model_ref() == Some(id))
            .collect()
    }

    /// Ids listed in the collection `field` of `id`, in order.
    pub fn children_of(&self, id: ElementId, field: impl Into<Name>) -> Vec<ElementId> {
        self.graph
            .element(id)
            .and_then(|element| element.get(field).as_list())
            .map(|items| items.iter().filter_map(Value::as_ref_id).collect())
            .unwrap_or_default()
    }

    /// Owners of `id`, nearest first.
    pub fn ancestors(&self, id: ElementId) -> Vec<ElementId> {
        let mut ancestors = Vec::new();
        let mut current = self.graph.element(id).and_then(Element::parent);
        while let Some(parent) = current {
            // A cycle can only appear in a corrupted graph; stop instead of looping.
            if ancestors.len() > self.graph.len() || ancestors.contains(&parent) {
                break;
            }
            ancestors.push(parent);
            current = self.graph.element(parent).and_then(Element::parent);
        }
        ancestors
    }

    /// Returns `true` if `ancestor` owns `id`, directly or transitively.
    pub fn is_ancestor(&self, ancestor: ElementId, id: ElementId) -> bool {
        self.ancestors(id).contains(&ancestor)
    }

    /// Every element owned by `id`, transitively, in pre-order.
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        let mut descendants = Vec::new();
        let mut stack: Vec<ElementId> = self.owned_children_of(id).into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            descendants.push(next);
            stack.extend(self.owned_children_of(next).into_iter().rev());
        }
        descendants
    }

    fn owned_children_of(&self, id: ElementId) -> Vec<ElementId> {
        self.graph
            .element(id)
            .map(|element| element.owned_children().map(|(_, child)| child).collect())
            .unwrap_or_default()
    }

    /// The diagram a view belongs to; a diagram belongs to itself.
    pub fn diagram_of(&self, id: ElementId) -> Option<ElementId> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find(|candidate| {
                self.graph
                    .element(*candidate)
                    .is_some_and(|element| element.kind() == ElementKind::Diagram)
            })
    }

    /// Case-insensitive search over element names.
    ///
    /// Exact matches rank first, then prefix, substring, and finally
    /// subsequence matches. At most [`StoreConfig::search_limit`] results are
    /// returned; ties are broken by id.
    pub fn search(&self, keyword: &str) -> Vec<&Element> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(u8, &Element)> = self
            .graph
            .elements()
            .filter_map(|element| {
                let name = element.name()?.to_lowercase();
                match_rank(&name, &needle).map(|rank| (rank, element))
            })
            .collect();
        ranked.sort_by_key(|(rank, element)| (*rank, element.id()));

        ranked
            .into_iter()
            .take(self.config.search_limit())
            .map(|(_, element)| element)
            .collect()
    }

    /// Ordered copy of the whole graph.
    pub fn snapshot(&self) -> Snapshot {
        self.graph
            .elements()
            .map(|element| (element.id(), element.clone()))
            .collect()
    }

    /// Audits the whole graph for ownership and endpoint-liveness breaches.
    ///
    /// Returns every violation found; an empty list means the graph is sound.
    pub fn verify_integrity(&self) -> Vec<IntegrityViolation> {
        let mut violations = Vec::new();

        for element in self.graph.elements() {
            let id = element.id();
            match element.parent() {
                None if id != self.root => violations.push(IntegrityViolation::Orphan(id)),
                None => {}
                Some(_) if id == self.root => {
                    violations.push(IntegrityViolation::RootElement(id));
                }
                Some(parent) => {
                    if !self.listed_once_by_owner(element, parent) {
                        violations.push(IntegrityViolation::BrokenOwnership(id));
                    }
                    if !self.ancestors(id).contains(&self.root) {
                        violations.push(IntegrityViolation::OwnershipCycle { child: id, parent });
                    }
                }
            }

            for (field, child) in element.owned_children() {
                match self.graph.element(child) {
                    None => violations.push(IntegrityViolation::UnresolvedReference {
                        element: id,
                        field,
                        target: child,
                    }),
                    Some(owned)
                        if owned.parent() != Some(id) || owned.owner_field() != Some(field) =>
                    {
                        violations.push(IntegrityViolation::BrokenOwnership(child));
                    }
                    Some(_) => {}
                }
            }

            for (field, target) in element.references() {
                if !self.graph.contains(target) {
                    violations.push(IntegrityViolation::UnresolvedReference {
                        element: id,
                        field,
                        target,
                    });
                }
            }

            if let Err(violation) = self.check_endpoints(element) {
                violations.push(violation);
            }
        }

        violations
    }

    fn listed_once_by_owner(&self, element: &Element, parent: ElementId) -> bool {
        let Some(field) = element.owner_field() else {
            return false;
        };
        let entry = Value::Ref(element.id());
        self.graph
            .element(parent)
            .and_then(|owner| owner.get(field).as_list())
            .is_some_and(|items| items.iter().filter(|item| **item == entry).count() == 1)
    }

    /// Endpoint fields present, and edge views connecting views of their own diagram.
    fn check_endpoints(&self, element: &Element) -> Result<(), IntegrityViolation> {
        for field in element.kind().endpoint_fields() {
            if element.get(*field).as_ref_id().is_none() {
                return Err(IntegrityViolation::MissingEndpoint {
                    element: element.id(),
                    field: Name::new(field),
                });
            }
        }

        if element.kind() == ElementKind::EdgeView {
            let diagram = self.diagram_of(element.id());
            let inside = diagram.is_some()
                && element.endpoints().all(|end| {
                    self.graph
                        .element(end)
                        .is_some_and(|view| view.kind().is_view())
                        && self.diagram_of(end) == diagram
                });
            if !inside {
                return Err(IntegrityViolation::CrossDiagramEdge(element.id()));
            }
        }
        Ok(())
    }

    // =========================================================================
    // History and state flags
    // =========================================================================

    /// Returns `true` iff an operation was applied since the last load or checkpoint.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Marks the current state as saved: clears the modified flag and the
    /// undo history.
    pub fn checkpoint(&mut self) {
        info!(elements = self.len(); "Checkpoint");
        self.modified = false;
        self.history.clear();
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Label of the operation [`Repository::undo`] would revert.
    pub fn undo_label(&self) -> Option<&str> {
        self.history.undo_label()
    }

    /// Label of the operation [`Repository::redo`] would reapply.
    pub fn redo_label(&self) -> Option<&str> {
        self.history.redo_label()
    }

    /// Read access to the undo/redo stacks.
    pub fn history(&self) -> &UndoManager {
        &self.history
    }

    /// Registers a listener called after every committed operation, undo, and redo.
    pub fn subscribe(&mut self, listener: impl FnMut(&OperationEvent<'_>) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Opens an operation builder labeled `label`.
    ///
    /// # Panics
    ///
    /// Panics if another builder is still open on this repository.
    pub fn begin(&self, label: impl Into<String>) -> OperationBuilder<'_> {
        assert!(
            !self.transaction_open.replace(true),
            "an operation builder is already open on this repository"
        );
        OperationBuilder::new(self, label.into())
    }

    /// Called by a builder when it is finished or dropped.
    pub(crate) fn close_transaction(&self) {
        self.transaction_open.set(false);
    }

    /// High-level composite operations over this repository.
    pub fn engine(&mut self) -> Engine<'_> {
        Engine::new(self)
    }

    /// Applies `operation` atomically and records it for undo.
    ///
    /// On success the redo stack is cleared, the repository is marked
    /// modified, and one [`OperationDirection::Executed`] event is raised. An
    /// empty operation changes nothing and raises nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Integrity`] if an entry is malformed or the
    /// result breaks a graph invariant; the repository is left exactly as it
    /// was.
    ///
    /// # Panics
    ///
    /// Panics, after restoring the previous state, if an entry deletes an
    /// element that is still referenced or not live, or inserts an id that
    /// was used before. Composite operations never stage these, so they
    /// indicate a bug in the caller.
    pub fn do_operation(&mut self, operation: Operation) -> Result<Commit, ModelError> {
        if operation.is_empty() {
            debug!(label = operation.label(); "Skipping empty operation");
            return Ok(Commit::empty(operation.label()));
        }

        let inverse = self.apply_operation(&operation, false)?;
        let commit = Commit::from_entries(operation.label(), operation.entries());
        info!(
            label = operation.label(),
            entries = operation.len(),
            inserted = commit.inserted().len(),
            deleted = commit.deleted().len();
            "Operation executed"
        );

        self.history.record(operation, inverse);
        self.modified = true;
        self.notify(OperationDirection::Executed, &commit);
        Ok(commit)
    }

    /// Reverts the most recent operation. A no-op returning `None` when there
    /// is nothing to undo.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Integrity`] if the recorded inverse no longer
    /// applies; the history is dropped in that case since it cannot be trusted.
    pub fn undo(&mut self) -> Result<Option<Commit>, ModelError> {
        let Some(entry) = self.history.pop_undo() else {
            debug!("Nothing to undo");
            return Ok(None);
        };
        debug!(label = entry.operation.label(); "Undoing operation");

        let forward = self.apply_history(&entry.inverse)?;
        let commit = Commit::from_entries(entry.inverse.label(), entry.inverse.entries());
        self.history.push_redo(HistoryEntry {
            operation: forward,
            inverse: entry.inverse,
        });

        self.modified = true;
        self.notify(OperationDirection::Undone, &commit);
        Ok(Some(commit))
    }

    /// Reapplies the most recently undone operation. A no-op returning `None`
    /// when there is nothing to redo.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Integrity`] if the recorded operation no longer
    /// applies; the history is dropped in that case.
    pub fn redo(&mut self) -> Result<Option<Commit>, ModelError> {
        let Some(entry) = self.history.pop_redo() else {
            debug!("Nothing to redo");
            return Ok(None);
        };
        debug!(label = entry.operation.label(); "Redoing operation");

        let inverse = self.apply_history(&entry.operation)?;
        let commit = Commit::from_entries(entry.operation.label(), entry.operation.entries());
        self.history.push_undo(HistoryEntry {
            operation: entry.operation,
            inverse,
        });

        self.modified = true;
        self.notify(OperationDirection::Redone, &commit);
        Ok(Some(commit))
    }

    fn apply_history(&mut self, operation: &Operation) -> Result<Operation, ModelError> {
        self.apply_operation(operation, true).inspect_err(|err| {
            error!(label = operation.label(); "History no longer applies, dropping it: {err}");
            self.history.clear();
        })
    }

    fn notify(&mut self, direction: OperationDirection, commit: &Commit) {
        let event = OperationEvent::new(direction, commit);
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    // =========================================================================
    // Entry application
    // =========================================================================

    /// Applies every entry of `operation`, returning the inverse operation.
    ///
    /// `replay` is set for undo and redo, which legitimately re-insert
    /// retired ids.
    fn apply_operation(
        &mut self,
        operation: &Operation,
        replay: bool,
    ) -> Result<Operation, ModelError> {
        let mut applied = Vec::with_capacity(operation.len());

        for entry in operation.entries() {
            trace!(label = operation.label(); "Applying {entry:?}");
            let result = if replay {
                self.apply_entry(entry)
            } else {
                self.check_lifecycle(entry)
                    .and_then(|()| self.apply_entry(entry))
            };
            match result {
                Ok(inverse) => applied.push(inverse),
                Err(violation) => {
                    self.rollback(operation.label(), &applied);
                    if violation.is_fatal() {
                        error!(label = operation.label(); "Refusing to apply operation: {violation}");
                        panic!(
                            "core invariant breached while applying `{}`: {violation}",
                            operation.label()
                        );
                    }
                    return Err(violation.into());
                }
            }
        }

        if let Err(violation) = self.validate_touched(operation) {
            self.rollback(operation.label(), &applied);
            return Err(violation.into());
        }

        for entry in operation.entries() {
            match entry {
                MutationEntry::Insert(element) => {
                    self.retired.remove(&element.id());
                }
                MutationEntry::Delete(id) => {
                    self.retired.insert(*id);
                }
                _ => {}
            }
        }

        applied.reverse();
        Ok(Operation::new(operation.label(), applied))
    }

    /// Rejects id reuse and deletes of elements that are not live.
    fn check_lifecycle(&self, entry: &MutationEntry) -> Result<(), IntegrityViolation> {
        match entry {
            MutationEntry::Insert(element) => {
                let id = element.id();
                if self.graph.contains(id) || self.retired.contains(&id) {
                    return Err(IntegrityViolation::ReusedId(id));
                }
            }
            MutationEntry::Delete(id) if !self.graph.contains(*id) => {
                return Err(IntegrityViolation::DoubleDelete(*id));
            }
            _ => {}
        }
        Ok(())
    }

    fn rollback(&mut self, label: &str, applied: &[MutationEntry]) {
        debug!(label, entries = applied.len(); "Rolling back partially applied operation");
        for entry in applied.iter().rev() {
            if let Err(violation) = self.apply_entry(entry) {
                panic!("rollback of `{label}` failed: {violation}");
            }
        }
    }

    fn apply_entry(&mut self, entry: &MutationEntry) -> Result<MutationEntry, IntegrityViolation> {
        match entry {
            MutationEntry::Insert(element) => self.apply_insert(element),
            MutationEntry::Delete(id) => self.apply_delete(*id),
            MutationEntry::FieldInsert {
                target,
                field,
                value,
                index,
            } => self.apply_field_insert(*target, *field, value, *index),
            MutationEntry::FieldRemove {
                target,
                field,
                value,
                index,
            } => self.apply_field_remove(*target, *field, value, *index),
            MutationEntry::FieldAssign {
                target,
                field,
                old,
                new,
            } => self.apply_field_assign(*target, *field, old, new),
        }
    }

    fn apply_insert(&mut self, element: &Element) -> Result<MutationEntry, IntegrityViolation> {
        let id = element.id();
        if self.graph.contains(id) {
            return Err(IntegrityViolation::DuplicateId(id));
        }
        if element.parent().is_some() {
            return Err(IntegrityViolation::InsertedWithParent(id));
        }
        if let Some((_, child)) = element.owned_children().next() {
            return Err(IntegrityViolation::InsertedWithChildren { element: id, child });
        }
        for (field, target) in element.references() {
            self.check_resolves(id, field, target)?;
        }

        self.graph.add(element.clone());
        Ok(MutationEntry::Delete(id))
    }

    fn apply_delete(&mut self, id: ElementId) -> Result<MutationEntry, IntegrityViolation> {
        let element = self.live(id)?;
        if id == self.root {
            return Err(IntegrityViolation::RootElement(id));
        }
        if let Some(parent) = element.parent() {
            return Err(IntegrityViolation::DeletedWhileOwned {
                element: id,
                parent,
            });
        }
        if let Some((_, child)) = element.owned_children().next() {
            return Err(IntegrityViolation::DeletedWithChildren { element: id, child });
        }
        if let Some(referrer) = self.graph.first_referrer(id) {
            return Err(IntegrityViolation::DanglingReference {
                element: id,
                referrer,
            });
        }

        let removed = self
            .graph
            .remove(id)
            .ok_or(IntegrityViolation::UnknownElement(id))?;
        Ok(MutationEntry::Insert(Box::new(removed)))
    }

    fn apply_field_insert(
        &mut self,
        target: ElementId,
        field: Name,
        value: &Value,
        index: Option<usize>,
    ) -> Result<MutationEntry, IntegrityViolation> {
        let owning = self.live(target)?.kind().owns(field);
        let child = if owning {
            let child = value
                .as_ref_id()
                .ok_or(IntegrityViolation::NotAnElementReference {
                    element: target,
                    field,
                })?;
            self.check_adoptable(target, field, child)?;
            Some(child)
        } else {
            for reference in value.refs() {
                self.check_resolves(target, field, reference)?;
            }
            None
        };

        let position = self
            .graph
            .update(target, |element| element.insert_item(field, value.clone(), index))
            .ok_or(IntegrityViolation::UnknownElement(target))?
            .map_err(|error| IntegrityViolation::Field {
                element: target,
                error,
            })?;
        if let Some(child) = child {
            self.graph
                .update(child, |element| element.attach(target, field));
        }

        Ok(MutationEntry::FieldRemove {
            target,
            field,
            value: value.clone(),
            index: Some(position),
        })
    }

    fn apply_field_remove(
        &mut self,
        target: ElementId,
        field: Name,
        value: &Value,
        index: Option<usize>,
    ) -> Result<MutationEntry, IntegrityViolation> {
        let owning = self.live(target)?.kind().owns(field);
        let child = value.as_ref_id().filter(|_| owning);
        if let Some(child) = child {
            let owned = self.graph.element(child).is_some_and(|element| {
                element.parent() == Some(target) && element.owner_field() == Some(field)
            });
            if !owned {
                return Err(IntegrityViolation::NotOwnedBy {
                    child,
                    parent: target,
                    field,
                });
            }
        }

        let position = self
            .graph
            .update(target, |element| element.remove_item(field, value, index))
            .ok_or(IntegrityViolation::UnknownElement(target))?
            .map_err(|error| IntegrityViolation::Field {
                element: target,
                error,
            })?;
        if let Some(child) = child {
            self.graph.update(child, Element::detach);
        }

        Ok(MutationEntry::FieldInsert {
            target,
            field,
            value: value.clone(),
            index: Some(position),
        })
    }

    fn apply_field_assign(
        &mut self,
        target: ElementId,
        field: Name,
        old: &Value,
        new: &Value,
    ) -> Result<MutationEntry, IntegrityViolation> {
        if self.live(target)?.kind().owns(field) {
            return Err(IntegrityViolation::OwnedFieldAssignment {
                element: target,
                field,
            });
        }
        for reference in new.refs() {
            self.check_resolves(target, field, reference)?;
        }

        let previous = self
            .graph
            .update(target, |element| element.set_field(field, new.clone()))
            .ok_or(IntegrityViolation::UnknownElement(target))?;
        if previous != *old {
            warn!(
                element = target.raw(),
                field = field.as_string();
                "Assigned field differed from the staged value; inverse uses the actual value"
            );
        }

        Ok(MutationEntry::FieldAssign {
            target,
            field,
            old: new.clone(),
            new: previous,
        })
    }

    fn live(&self, id: ElementId) -> Result<&Element, IntegrityViolation> {
        self.graph
            .element(id)
            .ok_or(IntegrityViolation::UnknownElement(id))
    }

    fn check_resolves(
        &self,
        element: ElementId,
        field: Name,
        target: ElementId,
    ) -> Result<(), IntegrityViolation> {
        if target == element || self.graph.contains(target) {
            Ok(())
        } else {
            Err(IntegrityViolation::UnresolvedReference {
                element,
                field,
                target,
            })
        }
    }

    fn check_adoptable(
        &self,
        parent: ElementId,
        field: Name,
        child: ElementId,
    ) -> Result<(), IntegrityViolation> {
        if child == self.root {
            return Err(IntegrityViolation::RootElement(child));
        }
        let element = self
            .graph
            .element(child)
            .ok_or(IntegrityViolation::UnresolvedReference {
                element: parent,
                field,
                target: child,
            })?;
        if let Some(owner) = element.parent() {
            return Err(IntegrityViolation::AlreadyOwned { child, owner });
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(IntegrityViolation::OwnershipCycle { child, parent });
        }
        Ok(())
    }

    /// Checks the invariants around every element an operation touched.
    fn validate_touched(&self, operation: &Operation) -> Result<(), IntegrityViolation> {
        let touched: IndexSet<ElementId> = operation
            .entries()
            .iter()
            .flat_map(MutationEntry::touched)
            .collect();
        let mut edges_checked = HashSet::new();

        for &id in &touched {
            let Some(element) = self.graph.element(id) else {
                continue;
            };
            if element.parent().is_none() && id != self.root {
                return Err(IntegrityViolation::Orphan(id));
            }
            self.check_endpoints(element)?;
            self.check_attached_edges(id, &mut edges_checked)?;
        }

        // A subtree that changed owner may have changed diagram as a whole.
        for id in self.adopted(operation) {
            for nested in self.descendants(id) {
                if let Some(element) = self.graph.element(nested) {
                    self.check_endpoints(element)?;
                }
                self.check_attached_edges(nested, &mut edges_checked)?;
            }
        }
        Ok(())
    }

    fn check_attached_edges(
        &self,
        id: ElementId,
        edges_checked: &mut HashSet<ElementId>,
    ) -> Result<(), IntegrityViolation> {
        let attached_edges = self
            .graph
            .referrers(id)
            .filter(|referrer| referrer.kind() == ElementKind::EdgeView);
        for edge in attached_edges {
            if edges_checked.insert(edge.id()) {
                self.check_endpoints(edge)?;
            }
        }
        Ok(())
    }

    /// Live elements placed into an owning collection by `operation`.
    fn adopted(&self, operation: &Operation) -> IndexSet<ElementId> {
        operation
            .entries()
            .iter()
            .filter_map(|entry| match entry {
                MutationEntry::FieldInsert { target, value, .. } => value
                    .as_ref_id()
                    .filter(|child| {
                        self.graph
                            .element(*child)
                            .is_some_and(|element| element.parent() == Some(*target))
                    }),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Debug for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("elements", &self.graph.len())
            .field("modified", &self.modified)
            .field("undo", &self.history.undo_len())
            .field("redo", &self.history.redo_len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Rank of a search match; lower is better.
fn match_rank(name: &str, needle: &str) -> Option<u8> {
    if name == needle {
        Some(0)
    } else if name.starts_with(needle) {
        Some(1)
    } else if name.contains(needle) {
        Some(2)
    } else if is_subsequence(name, needle) {
        Some(3)
    } else {
        None
    }
}

fn is_subsequence(haystack: &str, needle: &str) -> bool {
    let mut chars = haystack.chars();
    needle.chars().all(|wanted| chars.any(|c| c == wanted))
}
