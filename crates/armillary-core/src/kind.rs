//! Element kinds and the capabilities attached to them.
//!
//! The store does not know domain semantics such as "class" or "port". It only
//! distinguishes a closed set of structural shapes ([`ElementKind`]) and asks
//! each shape two questions through capability traits:
//!
//! - [`HasEndpoints`]: which fields hold endpoint references that must stay live
//! - [`HasOwnedCollection`]: which collection fields own their members
//!
//! Domain type information lives in the free-form `type_name` of an element.

use std::{fmt, str::FromStr};

use serde::Serialize;
use thiserror::Error;

use crate::identifier::Name;

/// Well-known field names.
pub mod field {
    /// Display name used by search and tree listings.
    pub const NAME: &str = "name";
    /// Owning collection of model-side containers.
    pub const OWNED_ELEMENTS: &str = "ownedElements";
    /// Owning collection of a diagram.
    pub const OWNED_VIEWS: &str = "ownedViews";
    /// Owning collection of a container view.
    pub const CONTAINED_VIEWS: &str = "containedViews";
    pub const SOURCE: &str = "source";
    pub const TARGET: &str = "target";
    pub const END1: &str = "end1";
    pub const END2: &str = "end2";
    /// Model rendered by a view.
    pub const MODEL: &str = "model";
    pub const TAIL: &str = "tail";
    pub const HEAD: &str = "head";
    pub const LEFT: &str = "left";
    pub const TOP: &str = "top";
}

/// Structural shape of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementKind {
    /// Root of the model tree.
    Project,
    /// Generic model element (class, package, port, ...).
    Model,
    /// Relationship with `source` and `target` ends.
    DirectedRelationship,
    /// Relationship with `end1` and `end2` ends.
    UndirectedRelationship,
    /// Root of a view tree, owned by a model-side container.
    Diagram,
    /// Box-shaped view that may contain other views.
    NodeView,
    /// Edge-shaped view connecting a `tail` view to a `head` view.
    EdgeView,
}

/// Capability: the element carries endpoint references that must resolve to
/// live elements at all times.
pub trait HasEndpoints {
    /// Names of the endpoint fields. Empty when the shape has none.
    fn endpoint_fields(&self) -> &'static [&'static str];
}

/// Capability: the element owns the members of some of its collections.
pub trait HasOwnedCollection {
    /// Names of the owning collection fields.
    fn owned_collections(&self) -> &'static [&'static str];

    /// Returns `true` if `field` is one of the owning collections.
    fn owns(&self, field: Name) -> bool {
        self.owned_collections().iter().any(|owned| field == *owned)
    }
}

impl ElementKind {
    /// All kinds, in declaration order.
    pub const ALL: [ElementKind; 7] = [
        ElementKind::Project,
        ElementKind::Model,
        ElementKind::DirectedRelationship,
        ElementKind::UndirectedRelationship,
        ElementKind::Diagram,
        ElementKind::NodeView,
        ElementKind::EdgeView,
    ];

    /// Returns `true` for directed and undirected relationships.
    pub fn is_relationship(self) -> bool {
        matches!(
            self,
            ElementKind::DirectedRelationship | ElementKind::UndirectedRelationship
        )
    }

    /// Returns `true` for node and edge views.
    pub fn is_view(self) -> bool {
        matches!(self, ElementKind::NodeView | ElementKind::EdgeView)
    }
}

impl HasEndpoints for ElementKind {
    fn endpoint_fields(&self) -> &'static [&'static str] {
        match self {
            ElementKind::DirectedRelationship => &[field::SOURCE, field::TARGET],
            ElementKind::UndirectedRelationship => &[field::END1, field::END2],
            ElementKind::EdgeView => &[field::TAIL, field::HEAD],
            ElementKind::Project | ElementKind::Model | ElementKind::Diagram => &[],
            ElementKind::NodeView => &[],
        }
    }
}

impl HasOwnedCollection for ElementKind {
    fn owned_collections(&self) -> &'static [&'static str] {
        match self {
            ElementKind::Project | ElementKind::Model => &[field::OWNED_ELEMENTS],
            ElementKind::Diagram => &[field::OWNED_VIEWS],
            ElementKind::NodeView => &[field::CONTAINED_VIEWS],
            ElementKind::DirectedRelationship
            | ElementKind::UndirectedRelationship
            | ElementKind::EdgeView => &[],
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Project => "project",
            ElementKind::Model => "model",
            ElementKind::DirectedRelationship => "directed-relationship",
            ElementKind::UndirectedRelationship => "undirected-relationship",
            ElementKind::Diagram => "diagram",
            ElementKind::NodeView => "node-view",
            ElementKind::EdgeView => "edge-view",
        };
        write!(f, "{name}")
    }
}

/// Error returned when parsing an unknown [`ElementKind`] name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown element kind `{0}`")]
pub struct UnknownKindError(pub String);

impl FromStr for ElementKind {
    type Err = UnknownKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementKind::ALL
            .into_iter()
            .find(|kind| kind.to_string() == s)
            .ok_or_else(|| UnknownKindError(s.to_string()))
    }
}
