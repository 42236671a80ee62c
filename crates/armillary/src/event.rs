//! Change notifications.
//!
//! Every committed `do_operation`, `undo`, and `redo` raises exactly one
//! [`OperationEvent`] to the listeners registered with
//! [`Repository::subscribe`](crate::Repository::subscribe).

use std::fmt;

use crate::operation::Commit;

/// How an operation reached the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationDirection {
    /// Committed for the first time.
    Executed,
    /// Reverted by undo.
    Undone,
    /// Reapplied by redo.
    Redone,
}

impl fmt::Display for OperationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationDirection::Executed => write!(f, "executed"),
            OperationDirection::Undone => write!(f, "undone"),
            OperationDirection::Redone => write!(f, "redone"),
        }
    }
}

/// Notification raised after an operation is applied.
#[derive(Debug, Clone, Copy)]
pub struct OperationEvent<'a> {
    direction: OperationDirection,
    commit: &'a Commit,
}

impl<'a> OperationEvent<'a> {
    pub(crate) fn new(direction: OperationDirection, commit: &'a Commit) -> Self {
        Self { direction, commit }
    }

    pub fn direction(&self) -> OperationDirection {
        self.direction
    }

    /// Label of the operation.
    pub fn label(&self) -> &'a str {
        self.commit.label()
    }

    /// Net effect of the application.
    pub fn commit(&self) -> &'a Commit {
        self.commit
    }
}

/// Callback registered for [`OperationEvent`]s.
pub type Listener = Box<dyn FnMut(&OperationEvent<'_>)>;
