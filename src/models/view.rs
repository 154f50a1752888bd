// Caller-owned view state and the materialized page.

use serde::{Deserialize, Serialize};

use super::{GroupRow, Sample};

pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Duration,
    Timestamp,
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

/// Filters, sort order, grouping toggle and pagination for one materialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewState {
    /// Case-insensitive substring over model, operation and serialized query.
    pub search: String,
    /// Exact model match; `None` keeps every model.
    pub model: Option<String>,
    /// Exact operation match; `None` keeps every operation.
    pub operation: Option<String>,
    pub sort_key: SortKey,
    pub sort_direction: SortDirection,
    pub grouped: bool,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            search: String::new(),
            model: None,
            operation: None,
            sort_key: SortKey::default(),
            sort_direction: SortDirection::default(),
            grouped: false,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Partial update for [`ViewState`]. For `model` and `operation`, an empty
/// string clears the filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewStatePatch {
    pub search: Option<String>,
    pub model: Option<String>,
    pub operation: Option<String>,
    pub sort_key: Option<SortKey>,
    pub sort_direction: Option<SortDirection>,
    pub grouped: Option<bool>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

impl ViewState {
    /// Applies `patch`. Any change to filters, sort or grouping moves back to page 1
    /// unless the patch also sets a page.
    pub fn apply(&mut self, patch: ViewStatePatch) {
        let before = (
            self.search.clone(),
            self.model.clone(),
            self.operation.clone(),
            self.sort_key,
            self.sort_direction,
            self.grouped,
        );
        if let Some(search) = patch.search {
            self.search = search;
        }
        if let Some(model) = patch.model {
            self.model = Some(model).filter(|m| !m.is_empty());
        }
        if let Some(operation) = patch.operation {
            self.operation = Some(operation).filter(|o| !o.is_empty());
        }
        if let Some(key) = patch.sort_key {
            self.sort_key = key;
        }
        if let Some(direction) = patch.sort_direction {
            self.sort_direction = direction;
        }
        if let Some(grouped) = patch.grouped {
            self.grouped = grouped;
        }
        if let Some(page_size) = patch.page_size {
            self.page_size = page_size.max(1);
        }
        let after = (
            self.search.clone(),
            self.model.clone(),
            self.operation.clone(),
            self.sort_key,
            self.sort_direction,
            self.grouped,
        );
        match patch.page {
            Some(page) => self.page = page.max(1),
            None if before != after => self.page = 1,
            None => {}
        }
    }
}

/// Rows of one page; every row of a page is of the same kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "rows", rename_all = "lowercase")]
pub enum ViewItems {
    Samples(Vec<Sample>),
    Groups(Vec<GroupRow>),
}

impl ViewItems {
    pub fn len(&self) -> usize {
        match self {
            ViewItems::Samples(rows) => rows.len(),
            ViewItems::Groups(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewPage {
    pub items: ViewItems,
    /// Filtered row count before pagination.
    pub total_items: usize,
    /// Always at least 1, so `page` is in `[1, total_pages]`.
    pub total_pages: usize,
    /// The page actually served, after clamping.
    pub page: usize,
}
