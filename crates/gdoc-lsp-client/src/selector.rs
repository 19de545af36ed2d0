//! Activation scope: which documents a session serves.

use std::fmt;

use url::Url;

/// URI scheme for documents backed by the local file system.
pub const FILE_SCHEME: &str = "file";

/// A `(scheme, language)` pair describing one routable document kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentFilter {
    scheme: String,
    language: String,
}

impl DocumentFilter {
    /// Creates a filter for an arbitrary scheme.
    #[must_use]
    pub fn new(scheme: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            language: language.into(),
        }
    }

    /// Creates a filter for on-disk documents of `language`.
    #[must_use]
    pub fn file(language: impl Into<String>) -> Self {
        Self::new(FILE_SCHEME, language)
    }

    /// URI scheme matched by this filter.
    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Language identifier matched by this filter.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Returns true when both the scheme and the language id match.
    #[must_use]
    pub fn matches(&self, uri: &Url, language_id: &str) -> bool {
        uri.scheme() == self.scheme && language_id == self.language
    }
}

impl fmt::Display for DocumentFilter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{{}, {}}}", self.scheme, self.language)
    }
}

/// De-duplicated, insertion-ordered set of document filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationScope {
    filters: Vec<DocumentFilter>,
}

impl ActivationScope {
    /// Creates an empty scope that matches nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a scope of `file` filters, one per language kind.
    #[must_use]
    pub fn from_kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        kinds.into_iter().map(DocumentFilter::file).collect()
    }

    /// Adds a filter; duplicates are ignored.
    pub fn insert(&mut self, filter: DocumentFilter) {
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
    }

    /// Adds a filter and returns the scope.
    #[must_use]
    pub fn with(mut self, filter: DocumentFilter) -> Self {
        self.insert(filter);
        self
    }

    /// Returns true when any filter matches the document.
    #[must_use]
    pub fn matches(&self, uri: &Url, language_id: &str) -> bool {
        self.filters
            .iter()
            .any(|filter| filter.matches(uri, language_id))
    }

    /// Filters in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &DocumentFilter> {
        self.filters.iter()
    }

    /// Number of distinct filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns true when the scope has no filters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl FromIterator<DocumentFilter> for ActivationScope {
    fn from_iter<T: IntoIterator<Item = DocumentFilter>>(iter: T) -> Self {
        let mut scope = Self::new();
        for filter in iter {
            scope.insert(filter);
        }
        scope
    }
}
