//! Armillary - a transactional model/view graph store with undo and redo.
//!
//! The store holds the semantic elements of a modeling tool (classes,
//! packages, relationships) alongside the diagram views that render them, in
//! one owned element tree rooted at a project. All changes are staged in an
//! [`OperationBuilder`], committed atomically through
//! [`Repository::do_operation`], and recorded for [`Repository::undo`] and
//! [`Repository::redo`]. Most callers use the composite operations of the
//! [`Engine`] facade instead of staging entries by hand.
//!
//! # Examples
//!
//! ```
//! use armillary::{Repository, element::Element, kind::field};
//!
//! let mut repo = Repository::new(Element::project("Shop"));
//! let root = repo.root();
//!
//! let diagram = Element::diagram("UMLClassDiagram", "Main");
//! let diagram_id = diagram.id();
//! repo.engine().add_model(root, field::OWNED_ELEMENTS, diagram).unwrap();
//!
//! let class = Element::model("UMLClass", "Customer");
//! let view = Element::node_view("UMLClassView", None);
//! let class_id = class.id();
//! repo.engine()
//!     .add_model_and_view(diagram_id, class, view, root, field::OWNED_ELEMENTS)
//!     .unwrap();
//! assert_eq!(repo.views_of(class_id).len(), 1);
//!
//! repo.undo().unwrap();
//! assert!(!repo.contains(class_id));
//! assert_eq!(repo.redo_label(), Some("Add UMLClass"));
//! ```

pub mod config;

mod builder;
mod engine;
mod error;
mod event;
mod operation;
mod repository;
mod undo;

pub use armillary_core::{element, identifier, kind, value};

pub use builder::OperationBuilder;
pub use engine::Engine;
pub use error::{IntegrityViolation, ModelError};
pub use event::{Listener, OperationDirection, OperationEvent};
pub use operation::{Commit, MutationEntry, Operation};
pub use repository::{Repository, Snapshot};
pub use undo::{HistoryEntry, UndoManager};
