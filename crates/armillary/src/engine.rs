//! Composite editing operations.
//!
//! The [`Engine`] is what editors use instead of staging entries by hand.
//! Every method validates its preconditions, stages a fixed sequence of
//! primitive entries, and commits them as exactly one undoable operation. A
//! failed precondition aborts before the repository is touched.

use std::collections::HashSet;

use log::info;

use armillary_core::{
    element::Element,
    identifier::{ElementId, Name},
    kind::{ElementKind, HasEndpoints, HasOwnedCollection, field},
    value::Value,
};

use crate::{
    builder::OperationBuilder,
    error::ModelError,
    operation::Commit,
    repository::Repository,
};

/// Collection that holds views inside a view container.
fn view_collection(kind: ElementKind) -> Option<&'static str> {
    match kind {
        ElementKind::Diagram => Some(field::OWNED_VIEWS),
        ElementKind::NodeView => Some(field::CONTAINED_VIEWS),
        _ => None,
    }
}

/// Checks that a model-side element of `kind` may be placed in the collection
/// `field` of a `parent_kind` element: only projects and models hold them, in
/// `ownedElements`.
fn ensure_model_placement(
    builder: &mut OperationBuilder<'_>,
    parent_kind: ElementKind,
    field: &str,
    kind: ElementKind,
) -> Result<(), ModelError> {
    builder.ensure(!kind.is_view(), "views must be added to a diagram")?;
    builder.ensure(
        parent_kind.owns(Name::new(field)),
        format!("{parent_kind} cannot own elements through `{field}`"),
    )?;
    builder.ensure(
        field == field::OWNED_ELEMENTS
            && matches!(parent_kind, ElementKind::Project | ElementKind::Model),
        format!("a {kind} cannot be placed in `{field}` of a {parent_kind}"),
    )
}

/// Returns `true` if `referrer` cannot outlive the element it references
/// through `field`.
fn depends_through(referrer: &Element, field: Name) -> bool {
    referrer
        .kind()
        .endpoint_fields()
        .iter()
        .any(|endpoint| field == *endpoint)
        || (referrer.kind().is_view() && field == field::MODEL)
}

/// Removes every reference to `id` from `value`.
fn without_ref(value: &Value, id: ElementId) -> Value {
    match value {
        Value::Ref(target) if *target == id => Value::Null,
        Value::List(items) => Value::List(
            items
                .iter()
                .filter(|item| item.as_ref_id() != Some(id))
                .map(|item| without_ref(item, id))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// High-level operations over a [`Repository`].
///
/// Obtained from [`Repository::engine`].
#[derive(Debug)]
pub struct Engine<'repo> {
    repo: &'repo mut Repository,
}

impl<'repo> Engine<'repo> {
    pub(crate) fn new(repo: &'repo mut Repository) -> Self {
        Self { repo }
    }

    /// The underlying repository.
    pub fn repository(&self) -> &Repository {
        self.repo
    }

    /// Adds `model` to the collection `field` of `parent`.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if `parent` no longer exists or does
    /// not own elements through `field`, or if `model` is a view.
    pub fn add_model(
        &mut self,
        parent: ElementId,
        field: &str,
        model: Element,
    ) -> Result<Commit, ModelError> {
        let mut builder = self.repo.begin(format!("Add {}", model.type_name()));
        let parent_kind = builder.ensure_live(parent)?.kind();
        ensure_model_placement(&mut builder, parent_kind, field, model.kind())?;

        let id = builder.insert(model);
        builder.field_insert(parent, field, id);
        let operation = builder.end()?;
        self.repo.do_operation(operation)
    }

    /// Adds `model` under `parent` and a `view` of it into `diagram`, as one
    /// operation.
    ///
    /// If the view does not render anything yet, it is bound to `model`.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if `diagram` is not a live diagram,
    /// `parent` cannot own `model` through `field`, or `view` renders some
    /// other element.
    pub fn add_model_and_view(
        &mut self,
        diagram: ElementId,
        model: Element,
        mut view: Element,
        parent: ElementId,
        field: &str,
    ) -> Result<Commit, ModelError> {
        let model_id = model.id();
        if view.kind().is_view() && view.model_ref().is_none() {
            view.set_field(field::MODEL, model_id);
        }

        let mut builder = self.repo.begin(format!("Add {}", model.type_name()));
        let diagram_kind = builder.ensure_live(diagram)?.kind();
        builder.ensure(
            diagram_kind == ElementKind::Diagram,
            format!("{diagram} is not a diagram"),
        )?;
        let parent_kind = builder.ensure_live(parent)?.kind();
        ensure_model_placement(&mut builder, parent_kind, field, model.kind())?;
        builder.ensure(view.kind().is_view(), format!("{} is not a view", view.kind()))?;
        builder.ensure(
            view.model_ref() == Some(model_id),
            "the view must render the added model",
        )?;

        builder.insert(model);
        builder.field_insert(parent, field, model_id);
        let view_id = builder.insert(view);
        builder.field_insert(diagram, field::OWNED_VIEWS, view_id);
        let operation = builder.end()?;
        self.repo.do_operation(operation)
    }

    /// Adds `view` to a diagram or container view.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if `container` cannot hold views, the
    /// rendered model no longer exists, or an edge view's ends are not views
    /// of the same diagram.
    pub fn add_view(&mut self, container: ElementId, view: Element) -> Result<Commit, ModelError> {
        let repo: &Repository = self.repo;
        let mut builder = repo.begin(format!("Add {}", view.type_name()));
        let container_kind = builder.ensure_live(container)?.kind();
        let collection = view_collection(container_kind);
        builder.ensure(
            collection.is_some(),
            format!("{container_kind} cannot contain views"),
        )?;
        builder.ensure(view.kind().is_view(), format!("{} is not a view", view.kind()))?;
        if let Some(model) = view.model_ref() {
            builder.ensure_live(model)?;
        }
        if view.kind() == ElementKind::EdgeView {
            let diagram = repo.diagram_of(container);
            for end in view.endpoints() {
                let end_kind = builder.ensure_live(end)?.kind();
                builder.ensure(
                    end_kind.is_view() && repo.diagram_of(end) == diagram,
                    "an edge can only connect views of its own diagram",
                )?;
            }
        }

        let id = builder.insert(view);
        if let Some(collection) = collection {
            builder.field_insert(container, collection, id);
        }
        let operation = builder.end()?;
        self.repo.do_operation(operation)
    }

    /// Adds `relationship` to the `ownedElements` of `parent`.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if `relationship` is not a
    /// relationship or one of its ends no longer exists.
    pub fn add_relationship(
        &mut self,
        parent: ElementId,
        relationship: Element,
    ) -> Result<Commit, ModelError> {
        let mut builder = self.repo.begin(format!("Add {}", relationship.type_name()));
        builder.ensure(
            relationship.kind().is_relationship(),
            format!("{} is not a relationship", relationship.kind()),
        )?;
        let parent_kind = builder.ensure_live(parent)?.kind();
        ensure_model_placement(
            &mut builder,
            parent_kind,
            field::OWNED_ELEMENTS,
            relationship.kind(),
        )?;
        for end in relationship.endpoints() {
            builder.ensure_live(end)?;
        }

        let id = builder.insert(relationship);
        builder.field_insert(parent, field::OWNED_ELEMENTS, id);
        let operation = builder.end()?;
        self.repo.do_operation(operation)
    }

    /// Deletes `models` and `views`, with everything that cannot outlive them.
    ///
    /// Deleting a model also deletes its owned descendants, the relationships
    /// attached to any of them, and every view rendering them. Deleting a
    /// node view also deletes its contained views and the edge views attached
    /// to them. Other references to the deleted elements are cleared.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if an id no longer exists, a model id
    /// names a view (or the other way around), or the root is included.
    pub fn delete_elements(
        &mut self,
        models: &[ElementId],
        views: &[ElementId],
    ) -> Result<Commit, ModelError> {
        let repo: &Repository = self.repo;
        let mut builder = repo.begin("Delete elements");
        for &id in models {
            let kind = builder.ensure_live(id)?.kind();
            builder.ensure(!kind.is_view(), format!("{id} is a view, not a model"))?;
            builder.ensure(id != repo.root(), "the project cannot be deleted")?;
        }
        for &id in views {
            let kind = builder.ensure_live(id)?.kind();
            builder.ensure(kind.is_view(), format!("{id} is not a view"))?;
        }

        let plan = DeletionPlan::new(repo, models.iter().chain(views).copied());

        // Clear the references that survive the deletion first.
        for &id in &plan.order {
            for referrer in repo.referrers_of(id) {
                for (name, target) in referrer.references() {
                    if target != id || depends_through(referrer, name) {
                        continue;
                    }
                    let current = builder
                        .value_of(referrer.id(), name)
                        .cloned()
                        .unwrap_or_default();
                    if current.refs().any(|r| r == id) {
                        builder.field_assign(referrer.id(), name, without_ref(&current, id))?;
                    }
                }
            }
        }

        for &id in &plan.order {
            let element = repo.get(id)?;
            if let (Some(parent), Some(owner_field)) = (element.parent(), element.owner_field()) {
                builder.field_remove(parent, owner_field, id);
            }
            builder.delete(id);
        }

        let operation = builder.end()?;
        info!(requested = models.len() + views.len(), deleted = plan.order.len(); "Deleting elements");
        self.repo.do_operation(operation)
    }

    /// Shifts node views by `dx`, `dy`.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if an id is not a live node view.
    pub fn move_views(&mut self, views: &[ElementId], dx: f64, dy: f64) -> Result<Commit, ModelError> {
        let mut builder = self.repo.begin("Move views");
        Self::stage_shift(&mut builder, views, dx, dy)?;
        let operation = builder.end()?;
        self.repo.do_operation(operation)
    }

    fn stage_shift(
        builder: &mut OperationBuilder<'_>,
        views: &[ElementId],
        dx: f64,
        dy: f64,
    ) -> Result<(), ModelError> {
        for &id in views {
            let kind = builder.ensure_live(id)?.kind();
            builder.ensure(
                kind == ElementKind::NodeView,
                format!("{id} is not a node view"),
            )?;
            for (coordinate, delta) in [(field::LEFT, dx), (field::TOP, dy)] {
                if delta == 0.0 {
                    continue;
                }
                let current = builder
                    .value_of(id, coordinate)
                    .and_then(Value::as_real)
                    .unwrap_or_default();
                builder.field_assign(id, coordinate, current + delta)?;
            }
        }
        Ok(())
    }

    /// Shifts node views by `dx`, `dy` and moves them into `container`.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if `container` cannot hold views, a
    /// view belongs to another diagram, or `container` is one of the moved
    /// views or nested inside one.
    pub fn move_views_changing_container(
        &mut self,
        views: &[ElementId],
        dx: f64,
        dy: f64,
        container: ElementId,
    ) -> Result<Commit, ModelError> {
        let repo: &Repository = self.repo;
        let mut builder = repo.begin("Move views");
        let container_kind = builder.ensure_live(container)?.kind();
        let collection = view_collection(container_kind);
        builder.ensure(
            collection.is_some(),
            format!("{container_kind} cannot contain views"),
        )?;
        let diagram = repo.diagram_of(container);
        for &id in views {
            builder.ensure_live(id)?;
            builder.ensure(
                repo.diagram_of(id) == diagram,
                "views cannot be moved to another diagram",
            )?;
            builder.ensure(
                id != container && !repo.is_ancestor(id, container),
                "a view cannot be moved into itself",
            )?;
        }

        Self::stage_shift(&mut builder, views, dx, dy)?;
        if let Some(collection) = collection {
            for &id in views {
                let element = repo.get(id)?;
                if element.parent() == Some(container) {
                    continue;
                }
                if let (Some(parent), Some(owner_field)) = (element.parent(), element.owner_field())
                {
                    builder.field_remove(parent, owner_field, id);
                }
                builder.field_insert(container, collection, id);
            }
        }

        let operation = builder.end()?;
        self.repo.do_operation(operation)
    }

    /// Assigns `value` to the scalar `field` of `id`.
    ///
    /// Assigning the current value commits nothing.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if `id` no longer exists or `field` is
    /// an owning collection.
    pub fn set_property(
        &mut self,
        id: ElementId,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Commit, ModelError> {
        self.set_elems_property(&[id], field, value)
    }

    /// Assigns `value` to the scalar `field` of every element in `ids`.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if an element no longer exists or
    /// `field` is an owning collection of one of them.
    pub fn set_elems_property(
        &mut self,
        ids: &[ElementId],
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Commit, ModelError> {
        let value = value.into();
        let name = Name::new(field);
        let mut builder = self.repo.begin(format!("Change {field}"));
        for &id in ids {
            let kind = builder.ensure_live(id)?.kind();
            builder.ensure(
                !kind.owns(name),
                format!("`{field}` is managed through ownership"),
            )?;
            if builder.value_of(id, name) != Some(&value) {
                builder.field_assign(id, name, value.clone())?;
            }
        }

        let operation = builder.end()?;
        self.repo.do_operation(operation)
    }

    /// Moves `id` one position towards the front of its owner's collection.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if `id` is not owned or already first.
    pub fn move_up(&mut self, id: ElementId) -> Result<Commit, ModelError> {
        self.reorder(id, -1)
    }

    /// Moves `id` one position towards the back of its owner's collection.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if `id` is not owned or already last.
    pub fn move_down(&mut self, id: ElementId) -> Result<Commit, ModelError> {
        self.reorder(id, 1)
    }

    fn reorder(&mut self, id: ElementId, step: isize) -> Result<Commit, ModelError> {
        let label = if step < 0 { "Move up" } else { "Move down" };
        let mut builder = self.repo.begin(label);
        let element = builder.ensure_live(id)?;
        let owner = element.parent().zip(element.owner_field());
        builder.ensure(owner.is_some(), format!("{id} is not owned by any element"))?;
        let Some((parent, owner_field)) = owner else {
            return Err(ModelError::NotFound(id));
        };

        let siblings = builder
            .value_of(parent, owner_field)
            .and_then(Value::as_list)
            .map(<[Value]>::to_vec)
            .unwrap_or_default();
        let entry = Value::Ref(id);
        let position = siblings.iter().position(|item| *item == entry);
        let destination = position
            .and_then(|position| position.checked_add_signed(step))
            .filter(|destination| *destination < siblings.len());
        builder.ensure(
            destination.is_some(),
            format!("{id} cannot move {}", if step < 0 { "up" } else { "down" }),
        )?;

        if let Some(destination) = destination {
            builder.field_remove(parent, owner_field, id);
            builder.field_insert_at(parent, owner_field, id, destination);
        }
        let operation = builder.end()?;
        self.repo.do_operation(operation)
    }

    /// Moves the model-side element `id` into the collection `field` of
    /// `new_parent`.
    ///
    /// Relocating an element into its current collection commits nothing.
    ///
    /// # Errors
    ///
    /// Fails with a precondition error if either element no longer exists,
    /// `id` is the root or a view, `new_parent` cannot own through `field`,
    /// or `new_parent` is `id` or one of its descendants.
    pub fn relocate(
        &mut self,
        id: ElementId,
        new_parent: ElementId,
        field: &str,
    ) -> Result<Commit, ModelError> {
        let repo: &Repository = self.repo;
        let name = Name::new(field);
        let mut builder = repo.begin("Relocate");
        let element = builder.ensure_live(id)?;
        let (kind, owner) = (element.kind(), element.parent().zip(element.owner_field()));
        let parent_kind = builder.ensure_live(new_parent)?.kind();
        builder.ensure(id != repo.root(), "the project cannot be relocated")?;
        builder.ensure(!kind.is_view(), "views are moved between containers, not relocated")?;
        ensure_model_placement(&mut builder, parent_kind, field, kind)?;
        builder.ensure(
            id != new_parent && !repo.is_ancestor(id, new_parent),
            "an element cannot be moved into itself",
        )?;

        if owner != Some((new_parent, name)) {
            if let Some((parent, owner_field)) = owner {
                builder.field_remove(parent, owner_field, id);
            }
            builder.field_insert(new_parent, name, id);
        }
        let operation = builder.end()?;
        self.repo.do_operation(operation)
    }
}

/// Elements to delete, ordered so that dependents and children come before
/// the elements they depend on.
struct DeletionPlan {
    order: Vec<ElementId>,
}

impl DeletionPlan {
    fn new(repo: &Repository, requested: impl Iterator<Item = ElementId>) -> Self {
        let mut plan = Self { order: Vec::new() };
        let mut visited = HashSet::new();
        for id in requested {
            plan.visit(repo, id, &mut visited);
        }
        plan
    }

    fn visit(&mut self, repo: &Repository, id: ElementId, visited: &mut HashSet<ElementId>) {
        if !visited.insert(id) {
            return;
        }
        let Ok(element) = repo.get(id) else {
            return;
        };

        let dependents: Vec<ElementId> = repo
            .referrers_of(id)
            .filter(|referrer| {
                referrer
                    .references()
                    .any(|(name, target)| target == id && depends_through(referrer, name))
            })
            .map(Element::id)
            .collect();
        for dependent in dependents {
            self.visit(repo, dependent, visited);
        }
        for (_, child) in element.owned_children() {
            self.visit(repo, child, visited);
        }

        self.order.push(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        repo: Repository,
        diagram: ElementId,
    }

    fn fixture() -> Fixture {
        let mut repo = Repository::new(Element::project("P"));
        let root = repo.root();
        let diagram = Element::diagram("UMLClassDiagram", "Main");
        let diagram_id = diagram.id();
        repo.engine()
            .add_model(root, field::OWNED_ELEMENTS, diagram)
            .unwrap();
        Fixture {
            repo,
            diagram: diagram_id,
        }
    }

    fn add_class(fixture: &mut Fixture, name: &str) -> (ElementId, ElementId) {
        let root = fixture.repo.root();
        let model = Element::model("UMLClass", name);
        let view = Element::node_view("UMLClassView", None);
        let ids = (model.id(), view.id());
        fixture
            .repo
            .engine()
            .add_model_and_view(fixture.diagram, model, view, root, field::OWNED_ELEMENTS)
            .unwrap();
        ids
    }

    #[test]
    fn test_without_ref() {
        let a = ElementId::next();
        let b = ElementId::next();

        assert_eq!(without_ref(&Value::Ref(a), a), Value::Null);
        assert_eq!(without_ref(&Value::Ref(b), a), Value::Ref(b));
        assert_eq!(
            without_ref(&Value::List(vec![Value::Ref(a), Value::Ref(b)]), a),
            Value::List(vec![Value::Ref(b)])
        );
    }

    #[test]
    fn test_add_model_and_view_binds_view() {
        let mut fixture = fixture();
        let (model, view) = add_class(&mut fixture, "A");

        let view = fixture.repo.get(view).unwrap();
        assert_eq!(view.model_ref(), Some(model));
        assert_eq!(view.parent(), Some(fixture.diagram));
        assert_eq!(fixture.repo.undo_label(), Some("Add UMLClass"));
    }

    #[test]
    fn test_add_model_rejects_non_owning_field() {
        let mut fixture = fixture();
        let root = fixture.repo.root();

        let result = fixture
            .repo
            .engine()
            .add_model(root, "ownedViews", Element::model("UMLClass", "A"));
        assert!(matches!(result, Err(ModelError::PreconditionFailed(_))));
        assert_eq!(fixture.repo.len(), 2);
    }

    #[test]
    fn test_add_view_rejects_cross_diagram_edge() {
        let mut fixture = fixture();
        let root = fixture.repo.root();
        let (a, a_view) = add_class(&mut fixture, "A");
        let (b, _) = add_class(&mut fixture, "B");
        let other = Element::diagram("UMLClassDiagram", "Other");
        let other_id = other.id();
        fixture
            .repo
            .engine()
            .add_model(root, field::OWNED_ELEMENTS, other)
            .unwrap();
        let b_view = Element::node_view("UMLClassView", Some(b));
        let b_view_id = b_view.id();
        fixture.repo.engine().add_view(other_id, b_view).unwrap();

        let rel = Element::directed_relationship("UMLDependency", a, b);
        let rel_id = rel.id();
        fixture.repo.engine().add_relationship(root, rel).unwrap();
        let edge = Element::edge_view("UMLDependencyView", Some(rel_id), a_view, b_view_id);

        let result = fixture.repo.engine().add_view(fixture.diagram, edge);
        assert!(matches!(result, Err(ModelError::PreconditionFailed(_))));
    }

    #[test]
    fn test_delete_model_cascades() {
        let mut fixture = fixture();
        let root = fixture.repo.root();
        let (a, a_view) = add_class(&mut fixture, "A");
        let (b, b_view) = add_class(&mut fixture, "B");
        let rel = Element::directed_relationship("UMLAssociation", a, b);
        let rel_id = rel.id();
        fixture.repo.engine().add_relationship(root, rel).unwrap();
        let edge = Element::edge_view("UMLAssociationView", Some(rel_id), a_view, b_view);
        let edge_id = edge.id();
        fixture.repo.engine().add_view(fixture.diagram, edge).unwrap();
        let before = fixture.repo.snapshot();

        let commit = fixture.repo.engine().delete_elements(&[a], &[]).unwrap();

        for gone in [a, a_view, rel_id, edge_id] {
            assert!(!fixture.repo.contains(gone));
            assert!(commit.deleted().contains(&gone));
        }
        assert!(fixture.repo.contains(b));
        assert!(fixture.repo.contains(b_view));
        assert!(fixture.repo.verify_integrity().is_empty());

        fixture.repo.undo().unwrap();
        assert_eq!(fixture.repo.snapshot(), before);
    }

    #[test]
    fn test_delete_clears_generic_references() {
        let mut fixture = fixture();
        let root = fixture.repo.root();
        let (a, _) = add_class(&mut fixture, "A");
        let attribute = Element::model("UMLAttribute", "owner").with_field("type", a);
        let attribute_id = attribute.id();
        fixture
            .repo
            .engine()
            .add_model(root, field::OWNED_ELEMENTS, attribute)
            .unwrap();

        fixture.repo.engine().delete_elements(&[a], &[]).unwrap();

        assert!(fixture.repo.get(attribute_id).unwrap().get("type").is_null());
        fixture.repo.undo().unwrap();
        assert_eq!(
            fixture.repo.get(attribute_id).unwrap().get("type"),
            &Value::Ref(a)
        );
    }

    #[test]
    fn test_delete_rejects_root() {
        let mut fixture = fixture();
        let root = fixture.repo.root();

        let result = fixture.repo.engine().delete_elements(&[root], &[]);
        assert!(matches!(result, Err(ModelError::PreconditionFailed(_))));
    }

    #[test]
    fn test_move_views_shifts_geometry() {
        let mut fixture = fixture();
        let (_, view) = add_class(&mut fixture, "A");
        fixture
            .repo
            .engine()
            .set_property(view, field::LEFT, 10.0)
            .unwrap();

        fixture.repo.engine().move_views(&[view], 5.0, 7.5).unwrap();

        let element = fixture.repo.get(view).unwrap();
        assert_eq!(element.get(field::LEFT).as_real(), Some(15.0));
        assert_eq!(element.get(field::TOP).as_real(), Some(7.5));
    }

    #[test]
    fn test_move_views_changing_container() {
        let mut fixture = fixture();
        let (_, outer) = add_class(&mut fixture, "Outer");
        let (_, inner) = add_class(&mut fixture, "Inner");

        fixture
            .repo
            .engine()
            .move_views_changing_container(&[inner], 1.0, 1.0, outer)
            .unwrap();

        assert_eq!(fixture.repo.get(inner).unwrap().parent(), Some(outer));
        assert_eq!(
            fixture.repo.children_of(outer, field::CONTAINED_VIEWS),
            vec![inner]
        );

        let result = fixture
            .repo
            .engine()
            .move_views_changing_container(&[outer], 0.0, 0.0, inner);
        assert!(matches!(result, Err(ModelError::PreconditionFailed(_))));
    }

    #[test]
    fn test_set_property_same_value_is_noop() {
        let mut fixture = fixture();
        let (a, _) = add_class(&mut fixture, "A");
        let undo_len = fixture.repo.history().undo_len();

        let commit = fixture.repo.engine().set_property(a, field::NAME, "A").unwrap();

        assert!(commit.is_empty());
        assert_eq!(fixture.repo.history().undo_len(), undo_len);
    }

    #[test]
    fn test_set_property_rejects_owning_field() {
        let mut fixture = fixture();
        let root = fixture.repo.root();

        let result = fixture
            .repo
            .engine()
            .set_property(root, field::OWNED_ELEMENTS, Value::Null);
        assert!(matches!(result, Err(ModelError::PreconditionFailed(_))));
    }

    #[test]
    fn test_move_up_and_down() {
        let mut fixture = fixture();
        let root = fixture.repo.root();
        let (a, _) = add_class(&mut fixture, "A");
        let (b, _) = add_class(&mut fixture, "B");
        let order = |repo: &Repository| repo.children_of(root, field::OWNED_ELEMENTS);
        assert_eq!(order(&fixture.repo), vec![fixture.diagram, a, b]);

        fixture.repo.engine().move_up(b).unwrap();
        assert_eq!(order(&fixture.repo), vec![fixture.diagram, b, a]);
        assert_eq!(fixture.repo.get(b).unwrap().parent(), Some(root));

        fixture.repo.engine().move_down(b).unwrap();
        assert_eq!(order(&fixture.repo), vec![fixture.diagram, a, b]);
        assert!(fixture.repo.engine().move_down(b).is_err());
        assert!(fixture.repo.engine().move_up(root).is_err());
    }

    #[test]
    fn test_relocate() {
        let mut fixture = fixture();
        let root = fixture.repo.root();
        let package = Element::model("UMLPackage", "pkg");
        let package_id = package.id();
        fixture
            .repo
            .engine()
            .add_model(root, field::OWNED_ELEMENTS, package)
            .unwrap();
        let (a, _) = add_class(&mut fixture, "A");

        fixture
            .repo
            .engine()
            .relocate(a, package_id, field::OWNED_ELEMENTS)
            .unwrap();
        assert_eq!(fixture.repo.get(a).unwrap().parent(), Some(package_id));

        let result = fixture
            .repo
            .engine()
            .relocate(package_id, a, field::OWNED_ELEMENTS);
        assert!(matches!(result, Err(ModelError::PreconditionFailed(_))));
    }

    #[test]
    fn test_model_side_elements_stay_out_of_view_collections() {
        let mut fixture = fixture();
        let root = fixture.repo.root();
        let diagram = fixture.diagram;
        let (a, a_view) = add_class(&mut fixture, "A");
        let (b, _) = add_class(&mut fixture, "B");
        let before = fixture.repo.snapshot();
        let mut engine = fixture.repo.engine();

        let rejected = [
            engine.add_model(diagram, field::OWNED_VIEWS, Element::model("UMLClass", "X")),
            engine.add_model(a_view, field::CONTAINED_VIEWS, Element::model("UMLClass", "Y")),
            engine.add_model(
                diagram,
                field::OWNED_VIEWS,
                Element::diagram("UMLClassDiagram", "Nested"),
            ),
            engine.add_model_and_view(
                diagram,
                Element::model("UMLClass", "Z"),
                Element::node_view("UMLClassView", None),
                diagram,
                field::OWNED_VIEWS,
            ),
            engine.add_relationship(
                diagram,
                Element::directed_relationship("UMLDependency", a, b),
            ),
            engine.relocate(a, diagram, field::OWNED_VIEWS),
            engine.relocate(b, a_view, field::CONTAINED_VIEWS),
        ];

        for result in rejected {
            assert!(matches!(result, Err(ModelError::PreconditionFailed(_))));
        }
        assert_eq!(fixture.repo.snapshot(), before);
        assert_eq!(fixture.repo.get(a).unwrap().parent(), Some(root));
    }

    #[test]
    fn test_undirected_relationship_requires_live_ends() {
        let mut fixture = fixture();
        let root = fixture.repo.root();
        let (a, _) = add_class(&mut fixture, "A");
        let missing = ElementId::next();

        let result = fixture.repo.engine().add_relationship(
            root,
            Element::undirected_relationship("UMLAssociation", a, missing),
        );

        assert!(matches!(result, Err(ModelError::PreconditionFailed(_))));
    }

    #[test]
    fn test_delete_undirected_end_cascades() {
        let mut fixture = fixture();
        let root = fixture.repo.root();
        let (a, a_view) = add_class(&mut fixture, "A");
        let (b, b_view) = add_class(&mut fixture, "B");
        let rel = Element::undirected_relationship("UMLAssociation", a, b);
        let rel_id = rel.id();
        fixture.repo.engine().add_relationship(root, rel).unwrap();
        let edge = Element::edge_view("UMLAssociationView", Some(rel_id), a_view, b_view);
        let edge_id = edge.id();
        fixture.repo.engine().add_view(fixture.diagram, edge).unwrap();
        assert_eq!(fixture.repo.relationships_of(b).len(), 1);
        let before = fixture.repo.snapshot();

        let commit = fixture.repo.engine().delete_elements(&[b], &[]).unwrap();

        for gone in [b, b_view, rel_id, edge_id] {
            assert!(!fixture.repo.contains(gone));
            assert!(commit.deleted().contains(&gone));
        }
        assert!(fixture.repo.contains(a));
        assert!(fixture.repo.relationships_of(a).is_empty());
        assert!(fixture.repo.verify_integrity().is_empty());

        fixture.repo.undo().unwrap();
        assert_eq!(fixture.repo.snapshot(), before);
        assert_eq!(
            fixture.repo.get(rel_id).unwrap().get(field::END2),
            &Value::Ref(b)
        );

        fixture.repo.redo().unwrap();
        assert!(!fixture.repo.contains(rel_id));
    }
}
