//! Call options shared across `List` and `Search` (§4.3).

use crate::entry::Entry;

/// Options accepted by [`crate::Provider::list`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub recursive: bool,
    pub max_results: Option<usize>,
}

/// Options accepted by the façade's fan-out `Search` (§4.3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    /// Mount prefixes to restrict the search to. Empty means "all mounts
    /// whose provider is `Searchable`".
    pub scope: Vec<String>,
    /// Caps the merged result count; defaults to 20 (§4.3).
    pub max_results: Option<usize>,
}

impl SearchOptions {
    #[must_use]
    pub fn max_results_or_default(&self) -> usize {
        self.max_results.unwrap_or(20)
    }
}

/// One match from a `Searchable` provider, before the façade's merge/sort.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub entry: Entry,
    pub score: f64,
}
