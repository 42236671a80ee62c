//! Configuration types for the model store.
//!
//! [`StoreConfig`] implements [`serde::Deserialize`] so that hosts can load
//! it from their own configuration files.
//!
//! # Example
//!
//! ```
//! # use armillary::config::StoreConfig;
//! let config = StoreConfig::default();
//! assert_eq!(config.undo_limit(), 100);
//! assert_eq!(config.search_limit(), 50);
//! ```

use serde::Deserialize;

const DEFAULT_UNDO_LIMIT: usize = 100;
const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Tunables of a [`Repository`](crate::Repository).
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of operations kept on the undo stack.
    #[serde(default = "default_undo_limit")]
    undo_limit: usize,

    /// Maximum number of results returned by a search.
    #[serde(default = "default_search_limit")]
    search_limit: usize,
}

fn default_undo_limit() -> usize {
    DEFAULT_UNDO_LIMIT
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            undo_limit: DEFAULT_UNDO_LIMIT,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl StoreConfig {
    /// Creates a new [`StoreConfig`].
    ///
    /// # Arguments
    ///
    /// * `undo_limit` - Maximum undo history length. Zero disables undo.
    /// * `search_limit` - Maximum number of search results.
    pub fn new(undo_limit: usize, search_limit: usize) -> Self {
        Self {
            undo_limit,
            search_limit,
        }
    }

    /// Returns the maximum undo history length.
    pub fn undo_limit(&self) -> usize {
        self.undo_limit
    }

    /// Returns the maximum number of search results.
    pub fn search_limit(&self) -> usize {
        self.search_limit
    }
}
