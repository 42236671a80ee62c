//! Undo/redo history.
//!
//! The [`UndoManager`] keeps two stacks of [`HistoryEntry`] records, each
//! pairing an applied operation with the inverse produced while applying it.
//! The repository drives it: committing pushes onto the undo stack and clears
//! the redo stack, undoing and redoing move records between the stacks.

use std::collections::VecDeque;

use log::debug;

use crate::operation::Operation;

/// An applied operation paired with its precomputed inverse.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// The operation as it was (re)applied.
    pub operation: Operation,
    /// Entries that restore the state before `operation`.
    pub inverse: Operation,
}

/// Bounded undo and redo stacks.
#[derive(Debug)]
pub struct UndoManager {
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    limit: usize,
}

impl UndoManager {
    /// Creates an empty history keeping at most `limit` undo records.
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit,
        }
    }

    /// Records a newly committed operation.
    ///
    /// Clears the redo stack and drops the oldest record once the limit is
    /// exceeded.
    pub fn record(&mut self, operation: Operation, inverse: Operation) {
        self.redo.clear();
        self.push_undo(HistoryEntry { operation, inverse });
    }

    /// Pushes a record onto the undo stack without touching the redo stack.
    pub fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo.push_back(entry);
        while self.undo.len() > self.limit {
            if let Some(dropped) = self.undo.pop_front() {
                debug!(label = dropped.operation.label(); "Undo history limit reached, dropping oldest");
            }
        }
    }

    /// Pops the most recent record to undo.
    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo.pop_back()
    }

    /// Pushes an undone record onto the redo stack.
    pub fn push_redo(&mut self, entry: HistoryEntry) {
        self.redo.push(entry);
    }

    /// Pops the most recently undone record to redo.
    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo.pop()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Label of the operation `undo` would revert, for menus.
    pub fn undo_label(&self) -> Option<&str> {
        self.undo.back().map(|entry| entry.operation.label())
    }

    /// Label of the operation `redo` would reapply, for menus.
    pub fn redo_label(&self) -> Option<&str> {
        self.redo.last().map(|entry| entry.operation.label())
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Drops both stacks.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> HistoryEntry {
        HistoryEntry {
            operation: Operation::new(name, Vec::new()),
            inverse: Operation::new(name, Vec::new()),
        }
    }

    fn record(manager: &mut UndoManager, name: &str) {
        let entry = entry(name);
        manager.record(entry.operation, entry.inverse);
    }

    #[test]
    fn test_empty_manager() {
        let mut manager = UndoManager::new(10);

        assert!(!manager.can_undo());
        assert!(!manager.can_redo());
        assert!(manager.pop_undo().is_none());
        assert!(manager.pop_redo().is_none());
        assert_eq!(manager.undo_label(), None);
    }

    #[test]
    fn test_record_and_pop() {
        let mut manager = UndoManager::new(10);
        record(&mut manager, "first");
        record(&mut manager, "second");

        assert_eq!(manager.undo_label(), Some("second"));
        let popped = manager.pop_undo().unwrap();
        assert_eq!(popped.operation.label(), "second");

        manager.push_redo(popped);
        assert_eq!(manager.redo_label(), Some("second"));
        assert_eq!(manager.undo_label(), Some("first"));
    }

    #[test]
    fn test_record_clears_redo() {
        let mut manager = UndoManager::new(10);
        record(&mut manager, "first");
        let popped = manager.pop_undo().unwrap();
        manager.push_redo(popped);
        assert!(manager.can_redo());

        record(&mut manager, "second");
        assert!(!manager.can_redo());
    }

    #[test]
    fn test_push_undo_keeps_redo() {
        let mut manager = UndoManager::new(10);
        manager.push_redo(entry("redo-me"));
        manager.push_undo(entry("undo-me"));

        assert!(manager.can_redo());
        assert_eq!(manager.undo_len(), 1);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let mut manager = UndoManager::new(2);
        record(&mut manager, "a");
        record(&mut manager, "b");
        record(&mut manager, "c");

        assert_eq!(manager.undo_len(), 2);
        assert_eq!(manager.pop_undo().unwrap().operation.label(), "c");
        assert_eq!(manager.pop_undo().unwrap().operation.label(), "b");
        assert!(manager.pop_undo().is_none());
    }

    #[test]
    fn test_zero_limit_keeps_nothing() {
        let mut manager = UndoManager::new(0);
        record(&mut manager, "a");
        assert!(!manager.can_undo());
    }

    #[test]
    fn test_clear() {
        let mut manager = UndoManager::new(10);
        record(&mut manager, "a");
        manager.push_redo(entry("b"));
        manager.clear();

        assert_eq!(manager.undo_len(), 0);
        assert_eq!(manager.redo_len(), 0);
    }
}
