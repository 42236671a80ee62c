//! The element: base unit of the model graph.
//!
//! An [`Element`] is a model element, a relationship, a diagram, or a view. It
//! carries a stable [`ElementId`], a structural [`ElementKind`], a domain
//! `type_name`, a single owning parent, and a map of named field values.
//!
//! Elements are plain data. Constructing or editing one does not touch any
//! store; an element becomes visible only when an operation inserting it is
//! committed.

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::{
    identifier::{ElementId, Name},
    kind::{ElementKind, HasEndpoints, HasOwnedCollection, field},
    value::Value,
};

static NULL: Value = Value::Null;

/// Failure to edit a collection field in place.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FieldError {
    #[error("field `{0}` holds a scalar, not a collection")]
    NotACollection(Name),

    #[error("index {index} out of bounds for field `{field}` of length {len}")]
    IndexOutOfBounds { field: Name, index: usize, len: usize },

    #[error("value {value} not found in field `{field}`")]
    ValueNotFound { field: Name, value: Value },
}

/// A stored model or view object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Element {
    id: ElementId,
    kind: ElementKind,
    type_name: Name,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent: Option<ElementId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    owner_field: Option<Name>,
    fields: IndexMap<Name, Value>,
}

impl Element {
    /// Creates a parentless element with a freshly allocated id.
    pub fn new(kind: ElementKind, type_name: impl Into<Name>) -> Self {
        Self::with_id(ElementId::next(), kind, type_name)
    }

    /// Creates a parentless element with a known id.
    pub fn with_id(id: ElementId, kind: ElementKind, type_name: impl Into<Name>) -> Self {
        Self {
            id,
            kind,
            type_name: type_name.into(),
            parent: None,
            owner_field: None,
            fields: IndexMap::new(),
        }
    }

    /// Creates a project root.
    pub fn project(name: &str) -> Self {
        Self::new(ElementKind::Project, "Project").with_field(field::NAME, name)
    }

    /// Creates a generic model element, e.g. `Element::model("UMLClass", "Customer")`.
    pub fn model(type_name: &str, name: &str) -> Self {
        Self::new(ElementKind::Model, type_name).with_field(field::NAME, name)
    }

    /// Creates a diagram.
    pub fn diagram(type_name: &str, name: &str) -> Self {
        Self::new(ElementKind::Diagram, type_name).with_field(field::NAME, name)
    }

    /// Creates a node view, optionally rendering `model`.
    pub fn node_view(type_name: &str, model: Option<ElementId>) -> Self {
        Self::new(ElementKind::NodeView, type_name).with_field(field::MODEL, model)
    }

    /// Creates an edge view from `tail` to `head`, optionally rendering `model`.
    pub fn edge_view(
        type_name: &str,
        model: Option<ElementId>,
        tail: ElementId,
        head: ElementId,
    ) -> Self {
        Self::new(ElementKind::EdgeView, type_name)
            .with_field(field::MODEL, model)
            .with_field(field::TAIL, tail)
            .with_field(field::HEAD, head)
    }

    /// Creates a relationship with `source` and `target` ends.
    pub fn directed_relationship(type_name: &str, source: ElementId, target: ElementId) -> Self {
        Self::new(ElementKind::DirectedRelationship, type_name)
            .with_field(field::SOURCE, source)
            .with_field(field::TARGET, target)
    }

    /// Creates a relationship with `end1` and `end2` ends.
    pub fn undirected_relationship(type_name: &str, end1: ElementId, end2: ElementId) -> Self {
        Self::new(ElementKind::UndirectedRelationship, type_name)
            .with_field(field::END1, end1)
            .with_field(field::END2, end2)
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: impl Into<Name>, value: impl Into<Value>) -> Self {
        self.set_field(name, value);
        self
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn type_name(&self) -> Name {
        self.type_name
    }

    /// Owning element, or `None` for roots and unattached elements.
    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    /// Field on the parent through which this element is reachable.
    pub fn owner_field(&self) -> Option<Name> {
        self.owner_field
    }

    /// Reads a field; absent fields read as [`Value::Null`].
    pub fn get(&self, name: impl Into<Name>) -> &Value {
        self.fields.get(&name.into()).unwrap_or(&NULL)
    }

    /// Iterates the fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (Name, &Value)> {
        self.fields.iter().map(|(name, value)| (*name, value))
    }

    /// Display name, if the element has a textual `name` field.
    pub fn name(&self) -> Option<&str> {
        self.get(field::NAME).as_text()
    }

    /// Model rendered by this element when it is a view.
    pub fn model_ref(&self) -> Option<ElementId> {
        self.get(field::MODEL).as_ref_id()
    }

    /// Endpoint references declared by the element's kind.
    pub fn endpoints(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.kind
            .endpoint_fields()
            .iter()
            .filter_map(|name| self.get(*name).as_ref_id())
    }

    /// Every non-owning reference held by this element, with the field it lives in.
    pub fn references(&self) -> impl Iterator<Item = (Name, ElementId)> + '_ {
        self.fields
            .iter()
            .filter(|(name, _)| !self.kind.owns(**name))
            .flat_map(|(name, value)| value.refs().map(move |id| (*name, id)))
    }

    /// Members of the owning collections, with the collection they live in.
    pub fn owned_children(&self) -> impl Iterator<Item = (Name, ElementId)> + '_ {
        self.fields
            .iter()
            .filter(|(name, _)| self.kind.owns(**name))
            .flat_map(|(name, value)| value.refs().map(move |id| (*name, id)))
    }

    /// Sets a field and returns its previous value.
    ///
    /// Assigning [`Value::Null`] removes the field.
    pub fn set_field(&mut self, name: impl Into<Name>, value: impl Into<Value>) -> Value {
        let name = name.into();
        let value = value.into();
        if value.is_null() {
            self.fields.shift_remove(&name).unwrap_or_default()
        } else {
            self.fields.insert(name, value).unwrap_or_default()
        }
    }

    /// Inserts `value` into the collection `name`, creating it if absent.
    ///
    /// `index` defaults to appending. Returns the position the value landed at.
    pub fn insert_item(
        &mut self,
        name: Name,
        value: Value,
        index: Option<usize>,
    ) -> Result<usize, FieldError> {
        let len = match self.fields.get(&name) {
            Some(Value::List(items)) => items.len(),
            Some(_) => return Err(FieldError::NotACollection(name)),
            None => 0,
        };
        let index = index.unwrap_or(len);
        if index > len {
            return Err(FieldError::IndexOutOfBounds {
                field: name,
                index,
                len,
            });
        }

        if let Value::List(items) = self
            .fields
            .entry(name)
            .or_insert_with(|| Value::List(Vec::new()))
        {
            items.insert(index, value);
        }
        Ok(index)
    }

    /// Removes `value` from the collection `name`.
    ///
    /// With an `index` the item at that position must equal `value`; without
    /// one the first equal item is removed. An emptied collection is dropped
    /// so that insert-then-remove leaves the element unchanged. Returns the
    /// position the value was removed from.
    pub fn remove_item(
        &mut self,
        name: Name,
        value: &Value,
        index: Option<usize>,
    ) -> Result<usize, FieldError> {
        let not_found = || FieldError::ValueNotFound {
            field: name,
            value: value.clone(),
        };
        let items = match self.fields.get_mut(&name) {
            Some(Value::List(items)) => items,
            Some(_) => return Err(FieldError::NotACollection(name)),
            None => return Err(not_found()),
        };

        let position = match index {
            Some(index) if items.get(index) == Some(value) => index,
            Some(_) => return Err(not_found()),
            None => items
                .iter()
                .position(|item| item == value)
                .ok_or_else(not_found)?,
        };
        items.remove(position);
        if items.is_empty() {
            self.fields.shift_remove(&name);
        }
        Ok(position)
    }

    /// Records `parent.field` as the owner of this element.
    pub fn attach(&mut self, parent: ElementId, field: Name) {
        self.parent = Some(parent);
        self.owner_field = Some(field);
    }

    /// Clears the owner of this element.
    pub fn detach(&mut self) {
        self.parent = None;
        self.owner_field = None;
    }
}


#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::*;

    // ===================
    // Strategies
    // ===================

    fn item_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::Int),
            "[a-z]{0,6}".prop_map(Value::Text),
            any::<bool>().prop_map(Value::Bool),
        ]
    }

    fn element_strategy() -> impl Strategy<Value = Element> {
        prop::collection::vec(item_strategy(), 0..6).prop_map(|items| {
            let element = Element::model("UMLEnumeration", "Sample");
            if items.is_empty() {
                element
            } else {
                element.with_field("items", items)
            }
        })
    }

    // ===================
    // Property Test Functions
    // ===================

    /// Removing the item at the position `insert_item` reported restores the element.
    fn check_insert_then_remove_restores(
        element: Element,
        value: Value,
        index: usize,
    ) -> Result<(), TestCaseError> {
        let name = Name::new("items");
        let len = element.get(name).as_list().map_or(0, <[Value]>::len);
        let mut edited = element.clone();

        let position = edited
            .insert_item(name, value.clone(), Some(index % (len + 1)))
            .map_err(|err| TestCaseError::fail(err.to_string()))?;
        let removed = edited
            .remove_item(name, &value, Some(position))
            .map_err(|err| TestCaseError::fail(err.to_string()))?;

        prop_assert_eq!(removed, position);
        prop_assert_eq!(edited, element);
        Ok(())
    }

    /// Assigning back the value `set_field` returned restores the element.
    fn check_assign_returns_previous(element: Element, value: Value) -> Result<(), TestCaseError> {
        let mut edited = element.clone();

        let previous = edited.set_field("items", value.clone());
        prop_assert_eq!(edited.get("items"), &value);
        edited.set_field("items", previous);

        prop_assert_eq!(edited, element);
        Ok(())
    }

    // ===================
    // Property Tests
    // ===================

    proptest! {
        #[test]
        fn insert_then_remove_restores(
            element in element_strategy(),
            value in item_strategy(),
            index in 0usize..16,
        ) {
            check_insert_then_remove_restores(element, value, index)?;
        }

        #[test]
        fn assign_returns_previous(element in element_strategy(), value in item_strategy()) {
            check_assign_returns_previous(element, value)?;
        }
    }
}
