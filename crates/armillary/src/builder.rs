//! Staging of operations.
//!
//! An [`OperationBuilder`] accumulates [`MutationEntry`] primitives and
//! precondition checks without touching the repository. Nothing becomes
//! visible until [`OperationBuilder::end`] hands back an [`Operation`] and the
//! caller passes it to [`Repository::do_operation`].
//!
//! # Overlay
//!
//! The builder keeps working copies of the elements it touched, so reads made
//! while staging ([`OperationBuilder::element`], [`OperationBuilder::value_of`],
//! [`OperationBuilder::is_live`]) see the effect of entries staged earlier.
//! This is also where [`OperationBuilder::field_assign`] captures the old value
//! used to build the inverse.
//!
//! # Examples
//!
//! ```
//! use armillary::{Repository, element::Element, kind::field};
//!
//! let mut repo = Repository::new(Element::project("Shop"));
//! let root = repo.root();
//!
//! let mut builder = repo.begin("Add class");
//! let id = builder.insert(Element::model("UMLClass", "Customer"));
//! builder.field_insert(root, field::OWNED_ELEMENTS, id);
//! let operation = builder.end().unwrap();
//!
//! let commit = repo.do_operation(operation).unwrap();
//! assert_eq!(commit.inserted(), &[id]);
//! ```

use std::{
    collections::{HashMap, HashSet},
    mem,
};

use log::debug;

use armillary_core::{
    element::Element,
    identifier::{ElementId, Name},
    kind::HasOwnedCollection,
    value::Value,
};

use crate::{
    error::ModelError,
    operation::{MutationEntry, Operation},
    repository::Repository,
};

/// Accumulates entries for one operation.
///
/// Obtained from [`Repository::begin`]. At most one builder can be open per
/// repository; dropping it, or calling [`OperationBuilder::end`], closes it.
#[must_use = "staged entries are discarded unless the builder is ended and committed"]
pub struct OperationBuilder<'repo> {
    repo: &'repo Repository,
    label: String,
    entries: Vec<MutationEntry>,
    working: HashMap<ElementId, Element>,
    deleted: HashSet<ElementId>,
    failure: Option<String>,
}

impl<'repo> OperationBuilder<'repo> {
    pub(crate) fn new(repo: &'repo Repository, label: String) -> Self {
        Self {
            repo,
            label,
            entries: Vec::new(),
            working: HashMap::new(),
            deleted: HashSet::new(),
            failure: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of staged entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The repository this builder stages against.
    pub fn repository(&self) -> &'repo Repository {
        self.repo
    }

    /// Returns `true` if a precondition has failed.
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    // =========================================================================
    // Staged reads
    // =========================================================================

    /// Returns `true` if `id` is live once the staged entries are applied.
    pub fn is_live(&self, id: ElementId) -> bool {
        !self.deleted.contains(&id) && (self.working.contains_key(&id) || self.repo.contains(id))
    }

    /// The element as the staged entries leave it.
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        if self.deleted.contains(&id) {
            return None;
        }
        self.working
            .get(&id)
            .or_else(|| self.repo.get(id).ok())
    }

    /// A field as the staged entries leave it; `None` if the element is not live.
    pub fn value_of(&self, id: ElementId, field: impl Into<Name>) -> Option<&Value> {
        self.element(id).map(|element| element.get(field))
    }

    fn working_copy(&mut self, id: ElementId) -> Option<&mut Element> {
        if self.deleted.contains(&id) {
            return None;
        }
        if !self.working.contains_key(&id) {
            let element = self.repo.get(id).ok()?.clone();
            self.working.insert(id, element);
        }
        self.working.get_mut(&id)
    }

    // =========================================================================
    // Staging
    // =========================================================================

    /// Stages an `Insert` of `element` and returns its id.
    ///
    /// The id was assigned when the element was constructed; staging never
    /// allocates one.
    pub fn insert(&mut self, element: Element) -> ElementId {
        let id = element.id();
        if self.is_failed() {
            return id;
        }

        self.deleted.remove(&id);
        self.working.insert(id, element.clone());
        self.entries.push(MutationEntry::Insert(Box::new(element)));
        id
    }

    /// Stages a `Delete` of `id`.
    pub fn delete(&mut self, id: ElementId) {
        if self.is_failed() {
            return;
        }

        self.working.remove(&id);
        self.deleted.insert(id);
        self.entries.push(MutationEntry::Delete(id));
    }

    /// Stages a `FieldInsert` appending `value` to the collection `field` of `target`.
    pub fn field_insert(
        &mut self,
        target: ElementId,
        field: impl Into<Name>,
        value: impl Into<Value>,
    ) {
        self.stage_insert(target, field.into(), value.into(), None);
    }

    /// Stages a `FieldInsert` placing `value` at `index` in the collection
    /// `field` of `target`.
    pub fn field_insert_at(
        &mut self,
        target: ElementId,
        field: impl Into<Name>,
        value: impl Into<Value>,
        index: usize,
    ) {
        self.stage_insert(target, field.into(), value.into(), Some(index));
    }

    fn stage_insert(&mut self, target: ElementId, field: Name, value: Value, index: Option<usize>) {
        if self.is_failed() {
            return;
        }

        let mut adopted = None;
        if let Some(copy) = self.working_copy(target) {
            if copy.insert_item(field, value.clone(), index).is_ok() && copy.kind().owns(field) {
                adopted = value.as_ref_id();
            }
        }
        if let Some(child) = adopted.and_then(|child| self.working_copy(child)) {
            child.attach(target, field);
        }

        self.entries.push(MutationEntry::FieldInsert {
            target,
            field,
            value,
            index,
        });
    }

    /// Stages a `FieldRemove` of the first item equal to `value` in the
    /// collection `field` of `target`.
    ///
    /// The position is resolved when the entry is applied, so the inverse
    /// re-inserts the value exactly where it was.
    pub fn field_remove(
        &mut self,
        target: ElementId,
        field: impl Into<Name>,
        value: impl Into<Value>,
    ) {
        if self.is_failed() {
            return;
        }
        let field = field.into();
        let value = value.into();

        let mut released = None;
        if let Some(copy) = self.working_copy(target) {
            if copy.remove_item(field, &value, None).is_ok() && copy.kind().owns(field) {
                released = value.as_ref_id();
            }
        }
        if let Some(child) = released.and_then(|child| self.working_copy(child)) {
            child.detach();
        }

        self.entries.push(MutationEntry::FieldRemove {
            target,
            field,
            value,
            index: None,
        });
    }

    /// Stages a `FieldAssign` of `value` to the scalar `field` of `target`.
    ///
    /// The old value is read from the staged state.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotFound`] if `target` is not live in the staged
    /// state.
    pub fn field_assign(
        &mut self,
        target: ElementId,
        field: impl Into<Name>,
        value: impl Into<Value>,
    ) -> Result<(), ModelError> {
        if self.is_failed() {
            return Ok(());
        }
        let field = field.into();
        let new = value.into();

        let copy = self
            .working_copy(target)
            .ok_or(ModelError::NotFound(target))?;
        let old = copy.set_field(field, new.clone());

        self.entries.push(MutationEntry::FieldAssign {
            target,
            field,
            old,
            new,
        });
        Ok(())
    }

    // =========================================================================
    // Preconditions
    // =========================================================================

    /// Checks a precondition.
    ///
    /// On failure every staged entry is discarded, later staging calls are
    /// ignored, and [`OperationBuilder::end`] reports the failure.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::PreconditionFailed`] carrying `message` if
    /// `condition` is false, or carrying the earlier message if a previous
    /// precondition already failed.
    pub fn ensure(&mut self, condition: bool, message: impl Into<String>) -> Result<(), ModelError> {
        if let Some(failure) = &self.failure {
            return Err(ModelError::precondition(failure.clone()));
        }
        if condition {
            return Ok(());
        }

        let message = message.into();
        debug!(
            label = self.label,
            discarded = self.entries.len();
            "Precondition failed: {message}"
        );
        self.entries.clear();
        self.working.clear();
        self.deleted.clear();
        self.failure = Some(message.clone());
        Err(ModelError::PreconditionFailed(message))
    }

    /// Ensures `id` is live in the staged state and returns it.
    ///
    /// # Errors
    ///
    /// Fails the builder with a "no longer exists" precondition otherwise.
    pub fn ensure_live(&mut self, id: ElementId) -> Result<&Element, ModelError> {
        let live = self.is_live(id);
        self.ensure(live, format!("element {id} no longer exists"))?;
        self.element(id).ok_or(ModelError::NotFound(id))
    }

    /// Finalizes the staged entries into an [`Operation`].
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::PreconditionFailed`] if any precondition failed.
    pub fn end(mut self) -> Result<Operation, ModelError> {
        if let Some(message) = self.failure.take() {
            return Err(ModelError::PreconditionFailed(message));
        }

        let operation = Operation::new(mem::take(&mut self.label), mem::take(&mut self.entries));
        debug!(label = operation.label(), entries = operation.len(); "Operation staged");
        Ok(operation)
    }
}

impl Drop for OperationBuilder<'_> {
    fn drop(&mut self) {
        self.repo.close_transaction();
    }
}
