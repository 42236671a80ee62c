//! Error types for model store operations.
//!
//! This module provides the main error type [`ModelError`] returned by the
//! repository, the operation builder, and the engine facade, plus the
//! [`IntegrityViolation`] taxonomy describing structural breaches of the
//! element graph.

use thiserror::Error;

use armillary_core::{
    element::FieldError,
    identifier::{ElementId, Name},
};

/// The main error type for model store operations.
///
/// `PreconditionFailed` and `NotFound` are expected conditions that callers
/// handle, typically by showing a message. `Integrity` means an operation was
/// malformed; the store rolled back every entry of that operation before
/// returning it.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{0}")]
    PreconditionFailed(String),

    #[error("element {0} not found")]
    NotFound(ElementId),

    #[error("integrity violation: {0}")]
    Integrity(#[from] IntegrityViolation),
}

impl ModelError {
    /// Create a new `PreconditionFailed` error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }
}

/// A structural breach of the element graph invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrityViolation {
    #[error("element {0} already exists")]
    DuplicateId(ElementId),

    #[error("element {0} does not exist")]
    UnknownElement(ElementId),

    #[error("field `{field}` of {element} references missing element {target}")]
    UnresolvedReference {
        element: ElementId,
        field: Name,
        target: ElementId,
    },

    #[error("element {0} must be parentless when inserted")]
    InsertedWithParent(ElementId),

    #[error("element {element} cannot be inserted while already owning {child}")]
    InsertedWithChildren { element: ElementId, child: ElementId },

    #[error("owning field `{field}` of {element} only accepts element references")]
    NotAnElementReference { element: ElementId, field: Name },

    #[error("owning field `{field}` of {element} cannot be assigned directly")]
    OwnedFieldAssignment { element: ElementId, field: Name },

    #[error("element {child} is already owned by {owner}")]
    AlreadyOwned { child: ElementId, owner: ElementId },

    #[error("element {child} is not owned by field `{field}` of {parent}")]
    NotOwnedBy {
        child: ElementId,
        parent: ElementId,
        field: Name,
    },

    #[error("placing {child} under {parent} would create an ownership cycle")]
    OwnershipCycle { child: ElementId, parent: ElementId },

    #[error("root element {0} cannot be deleted or owned")]
    RootElement(ElementId),

    #[error("element {element} is still owned by {parent}")]
    DeletedWhileOwned { element: ElementId, parent: ElementId },

    #[error("element {element} still owns {child}")]
    DeletedWithChildren { element: ElementId, child: ElementId },

    #[error("element {0} was inserted before and its id cannot be reused")]
    ReusedId(ElementId),

    #[error("element {0} is not live and cannot be deleted")]
    DoubleDelete(ElementId),

    #[error("element {element} is still referenced by {referrer}")]
    DanglingReference {
        element: ElementId,
        referrer: ElementId,
    },

    #[error("endpoint `{field}` of {element} is not set")]
    MissingEndpoint { element: ElementId, field: Name },

    #[error("element {0} has no owner")]
    Orphan(ElementId),

    #[error("ownership record of {0} does not match its parent's collection")]
    BrokenOwnership(ElementId),

    #[error("edge view {0} connects views that are not in its diagram")]
    CrossDiagramEdge(ElementId),

    #[error("{element}: {error}")]
    Field {
        element: ElementId,
        #[source]
        error: FieldError,
    },
}

impl IntegrityViolation {
    /// Returns `true` for breaches that indicate a bug in the caller's
    /// deletion ordering rather than a malformed request.
    pub fn is_dangling(&self) -> bool {
        matches!(self, IntegrityViolation::DanglingReference { .. })
    }

    /// Returns `true` for programming errors the store refuses to survive:
    /// dangling references, id reuse and double deletes.
    pub fn is_fatal(&self) -> bool {
        self.is_dangling()
            || matches!(
                self,
                IntegrityViolation::ReusedId(_) | IntegrityViolation::DoubleDelete(_)
            )
    }
}
