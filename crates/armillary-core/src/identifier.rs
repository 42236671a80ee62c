//! Identifiers for stored elements and interned names.
//!
//! This module provides two identifier types:
//!
//! - [`ElementId`]: a process-unique element identity allocated from a global
//!   counter. Ids are never reused, even after the element is deleted.
//! - [`Name`]: an interned string used for field names and domain type names,
//!   backed by a global string interner for cheap copies and comparisons.

use std::{
    fmt,
    sync::{
        Mutex, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::{Serialize, Serializer};
use string_interner::{DefaultStringInterner, DefaultSymbol};

/// Next id handed out by [`ElementId::next`].
static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Global string interner for [`Name`] storage.
///
/// # Thread Safety
///
/// This uses `Mutex` for thread-safe access to the string interner.
static INTERNER: OnceLock<Mutex<DefaultStringInterner>> = OnceLock::new();

fn with_interner<R>(f: impl FnOnce(&mut DefaultStringInterner) -> R) -> R {
    let mut interner = INTERNER
        .get_or_init(|| Mutex::new(DefaultStringInterner::new()))
        .lock()
        .expect("Failed to acquire interner lock");
    f(&mut interner)
}

/// Stable identity of an element in the model graph.
///
/// Ids are assigned when an element is constructed, before it is staged into
/// an operation, and remain valid for the lifetime of the process.
///
/// # Examples
///
/// ```
/// use armillary_core::identifier::ElementId;
///
/// let a = ElementId::next();
/// let b = ElementId::next();
/// assert_ne!(a, b);
/// assert!(b.raw() > a.raw());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ElementId(u64);

impl ElementId {
    /// Allocates a fresh id that has never been handed out before.
    pub fn next() -> Self {
        Self(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuilds an id from its raw value.
    ///
    /// Used when an element graph is constructed from an external source. The
    /// global allocator is advanced past `raw` so that later calls to
    /// [`ElementId::next`] can never collide with it.
    pub fn from_raw(raw: u64) -> Self {
        NEXT_ELEMENT_ID.fetch_max(raw.saturating_add(1), Ordering::Relaxed);
        Self(raw)
    }

    /// Returns the raw numeric value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Interned name used for field names and domain type names.
///
/// # Examples
///
/// ```
/// use armillary_core::identifier::Name;
///
/// let field = Name::new("ownedElements");
/// let same: Name = "ownedElements".into();
/// assert_eq!(field, same);
/// assert_eq!(field, "ownedElements");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Name(DefaultSymbol);

impl Name {
    /// Creates a `Name` from &str, interning it on first use.
    pub fn new(name: &str) -> Self {
        Self(with_interner(|interner| interner.get_or_intern(name)))
    }

    /// Returns an owned copy of the interned string.
    pub fn as_string(&self) -> String {
        with_interner(|interner| {
            interner
                .resolve(self.0)
                .expect("Symbol should exist in interner")
                .to_string()
        })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for Name {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<&String> for Name {
    fn from(name: &String) -> Self {
        Self::new(name)
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        with_interner(|interner| interner.resolve(self.0) == Some(other))
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_string())
    }
}
