//! Client-side search, filter and pagination over a fetched collection.
//!
//! The engine never performs I/O and never fails: every input is clamped or
//! defaulted. Stages run in a fixed order (filter, then search, then page)
//! and each stage only sees the previous stage's output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

pub const DEFAULT_ITEMS_PER_PAGE: usize = 10;
pub const DEFAULT_PAGE_WINDOW: usize = 5;

/// A fetched record the engine can inspect without knowing its schema.
pub trait Record {
    fn record_id(&self) -> Option<String>;

    /// Text value of a (possibly dotted) field path. `None` for missing or
    /// non-scalar values.
    fn field_text(&self, path: &str) -> Option<String>;
}

impl Record for serde_json::Value {
    fn record_id(&self) -> Option<String> {
        self.field_text("id")
    }

    fn field_text(&self, path: &str) -> Option<String> {
        let mut current = self;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }

        match current {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// A searchable projection of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchField {
    Field(String),
    /// Several fields joined with a single space, e.g. first and last name.
    Joined(Vec<String>),
}

impl SearchField {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    pub fn joined<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Joined(paths.into_iter().map(Into::into).collect())
    }

    fn text<T: Record>(&self, item: &T) -> String {
        match self {
            Self::Field(path) => item.field_text(path).unwrap_or_default(),
            Self::Joined(paths) => paths
                .iter()
                .map(|p| item.field_text(p).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

pub type FilterComparator<T> = Arc<dyn Fn(&T, &str) -> bool + Send + Sync>;

/// How one filter key constrains a record.
pub enum FilterRule<T> {
    /// Exact, case-sensitive match on a named field.
    FieldEquals(String),
    /// Caller-supplied comparator for composite fields.
    Custom(FilterComparator<T>),
}

impl<T> FilterRule<T> {
    pub fn custom<F>(comparator: F) -> Self
    where
        F: Fn(&T, &str) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(comparator))
    }
}

impl<T: Record> FilterRule<T> {
    fn matches(&self, item: &T, value: &str) -> bool {
        match self {
            Self::FieldEquals(path) => item.field_text(path).as_deref() == Some(value),
            Self::Custom(comparator) => comparator(item, value),
        }
    }
}

impl<T> Clone for FilterRule<T> {
    fn clone(&self) -> Self {
        match self {
            Self::FieldEquals(path) => Self::FieldEquals(path.clone()),
            Self::Custom(comparator) => Self::Custom(Arc::clone(comparator)),
        }
    }
}

impl<T> fmt::Debug for FilterRule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldEquals(path) => f.debug_tuple("FieldEquals").field(path).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Per-screen engine parameters.
pub struct ListConfig<T> {
    search_fields: Vec<SearchField>,
    filter_rules: BTreeMap<String, FilterRule<T>>,
    items_per_page: usize,
}

impl<T> ListConfig<T> {
    #[must_use]
    pub fn new(items_per_page: usize) -> Self {
        Self {
            search_fields: Vec::new(),
            filter_rules: BTreeMap::new(),
            items_per_page: items_per_page.max(1),
        }
    }

    #[must_use]
    pub fn search(mut self, field: SearchField) -> Self {
        self.search_fields.push(field);
        self
    }

    #[must_use]
    pub fn filter(mut self, key: impl Into<String>, rule: FilterRule<T>) -> Self {
        self.filter_rules.insert(key.into(), rule);
        self
    }

    pub fn items_per_page(&self) -> usize {
        self.items_per_page
    }

    pub fn search_fields(&self) -> &[SearchField] {
        &self.search_fields
    }
}

impl<T> Clone for ListConfig<T> {
    fn clone(&self) -> Self {
        Self {
            search_fields: self.search_fields.clone(),
            filter_rules: self.filter_rules.clone(),
            items_per_page: self.items_per_page,
        }
    }
}

impl<T> fmt::Debug for ListConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListConfig")
            .field("search_fields", &self.search_fields)
            .field("filter_rules", &self.filter_rules)
            .field("items_per_page", &self.items_per_page)
            .finish()
    }
}

impl<T> Default for ListConfig<T> {
    fn default() -> Self {
        Self::new(DEFAULT_ITEMS_PER_PAGE)
    }
}

/// The user-controlled inputs of one recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub search_term: String,
    /// Only active filters; the blank sentinel is never stored.
    pub filters: BTreeMap<String, String>,
    pub current_page: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            filters: BTreeMap::new(),
            current_page: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage<'a, T> {
    pub visible_items: Vec<&'a T>,
    pub current_page: usize,
    pub total_pages: usize,
    pub filtered_count: usize,
    /// The requested page no longer existed and was reset to 1.
    pub corrected: bool,
}

fn passes_filters<T: Record>(item: &T, config: &ListConfig<T>, filters: &BTreeMap<String, String>) -> bool {
    filters.iter().all(|(key, value)| match config.filter_rules.get(key) {
        Some(rule) => rule.matches(item, value),
        None => item.field_text(key).as_deref() == Some(value.as_str()),
    })
}

fn matches_search<T: Record>(item: &T, config: &ListConfig<T>, needle: &str) -> bool {
    needle.is_empty()
        || config
            .search_fields
            .iter()
            .any(|field| field.text(item).to_lowercase().contains(needle))
}

/// Filter and search stages: the filtered set, in collection order.
pub fn filtered_items<'a, T: Record>(
    collection: &'a [T],
    config: &ListConfig<T>,
    query: &ListQuery,
) -> Vec<&'a T> {
    let needle = query.search_term.trim().to_lowercase();

    collection
        .iter()
        .filter(|item| passes_filters(*item, config, &query.filters))
        .filter(|item| matches_search(*item, config, &needle))
        .collect()
}

#[must_use]
pub fn total_pages(filtered_count: usize, items_per_page: usize) -> usize {
    filtered_count.div_ceil(items_per_page.max(1)).max(1)
}

/// Pure recompute of the visible page.
pub fn derive_page<'a, T: Record>(
    collection: &'a [T],
    config: &ListConfig<T>,
    query: &ListQuery,
) -> ListPage<'a, T> {
    let filtered = filtered_items(collection, config, query);
    let per_page = config.items_per_page;
    let total = total_pages(filtered.len(), per_page);

    let requested = query.current_page.max(1);
    let (current_page, corrected) = if requested > total {
        (1, true)
    } else {
        (requested, query.current_page == 0)
    };

    let filtered_count = filtered.len();
    let visible_items = filtered
        .into_iter()
        .skip((current_page - 1) * per_page)
        .take(per_page)
        .collect();

    ListPage {
        visible_items,
        current_page,
        total_pages: total,
        filtered_count,
        corrected,
    }
}

/// Inclusive range of page numbers to offer as buttons, centered on
/// `current_page` where the bounds allow.
#[must_use]
pub fn page_window(current_page: usize, total_pages: usize, max_visible: usize) -> RangeInclusive<usize> {
    let total = total_pages.max(1);
    let current = current_page.clamp(1, total);
    let width = max_visible.max(1).min(total);

    let mut start = current.saturating_sub(width / 2).max(1);
    let mut end = start + width - 1;
    if end > total {
        end = total;
        start = end + 1 - width;
    }

    start..=end
}

/// Stateful engine owned by one list screen.
#[derive(Debug, Clone)]
pub struct ListView<T> {
    config: ListConfig<T>,
    query: ListQuery,
    total_pages: usize,
}

impl<T: Record> ListView<T> {
    #[must_use]
    pub fn new(config: ListConfig<T>) -> Self {
        Self {
            config,
            query: ListQuery::default(),
            total_pages: 1,
        }
    }

    pub fn config(&self) -> &ListConfig<T> {
        &self.config
    }

    pub fn query(&self) -> &ListQuery {
        &self.query
    }

    pub fn search_term(&self) -> &str {
        &self.query.search_term
    }

    /// Current value of a filter, or the empty sentinel.
    pub fn filter_value(&self, key: &str) -> &str {
        self.query.filters.get(key).map_or("", String::as_str)
    }

    pub fn current_page(&self) -> usize {
        self.query.current_page
    }

    /// As of the last recompute.
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    pub fn items_per_page(&self) -> usize {
        self.config.items_per_page
    }

    /// Page validity is restored by the next recompute, not here.
    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.query.search_term = term.into();
    }

    pub fn set_filter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if value.trim().is_empty() {
            self.query.filters.remove(&key);
        } else {
            self.query.filters.insert(key, value);
        }
    }

    pub fn clear_filters(&mut self) {
        self.query.filters.clear();
        self.query.search_term.clear();
        self.query.current_page = 1;
    }

    /// Returns `false` (and changes nothing) when `page` is out of range.
    pub fn set_page(&mut self, page: usize) -> bool {
        if (1..=self.total_pages).contains(&page) {
            self.query.current_page = page;
            true
        } else {
            false
        }
    }

    pub fn recompute<'a>(&mut self, collection: &'a [T]) -> ListPage<'a, T> {
        let page = derive_page(collection, &self.config, &self.query);
        self.query.current_page = page.current_page;
        self.total_pages = page.total_pages;
        page
    }

    pub fn page_window(&self, max_visible: usize) -> RangeInclusive<usize> {
        page_window(self.query.current_page, self.total_pages, max_visible)
    }
}
