//! Query-shape value objects: sort, page request and page.
//!
//! # Invariants
//! - `PageRequest::page_size` is always >= 1.
//! - `Page::total_pages == ceil(total_elements / page_size)`.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Sort direction for one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One sort key: logical property plus direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
        }
    }
}

/// Ordered multi-key sort. Keys apply in listed order.
///
/// An empty sort means natural order (primary key ascending).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    /// Sorts by every listed property in the same direction.
    pub fn by<I, S>(direction: Direction, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            orders: properties
                .into_iter()
                .map(|property| Order {
                    property: property.into(),
                    direction,
                })
                .collect(),
        }
    }

    /// Appends one more sort key.
    pub fn and(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }
}

impl From<Order> for Sort {
    fn from(order: Order) -> Self {
        Self {
            orders: vec![order],
        }
    }
}

impl FromIterator<Order> for Sort {
    fn from_iter<T: IntoIterator<Item = Order>>(iter: T) -> Self {
        Self {
            orders: iter.into_iter().collect(),
        }
    }
}

/// Errors raised when constructing paging requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    ZeroPageSize,
}

impl Display for PagingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroPageSize => write!(f, "page size must be at least 1"),
        }
    }
}

impl Error for PagingError {}

/// Zero-based page index, positive page size and sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page_index: u32,
    page_size: u32,
    sort: Sort,
}

impl PageRequest {
    /// # Errors
    /// - `PagingError::ZeroPageSize` when `page_size == 0`.
    pub fn new(page_index: u32, page_size: u32, sort: Sort) -> Result<Self, PagingError> {
        if page_size == 0 {
            return Err(PagingError::ZeroPageSize);
        }
        Ok(Self {
            page_index,
            page_size,
            sort,
        })
    }

    pub fn unsorted(page_index: u32, page_size: u32) -> Result<Self, PagingError> {
        Self::new(page_index, page_size, Sort::unsorted())
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// Row offset of the first element on this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page_index) * u64::from(self.page_size)
    }

    /// Request for the following page with the same size and sort.
    pub fn next(&self) -> Self {
        Self {
            page_index: self.page_index.saturating_add(1),
            page_size: self.page_size,
            sort: self.sort.clone(),
        }
    }
}

/// A bounded, sorted slice of a full result set plus totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    content: Vec<T>,
    page_index: u32,
    page_size: u32,
    total_elements: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            page_index: request.page_index(),
            page_size: request.page_size(),
            total_elements,
        }
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u64 {
        self.total_elements.div_ceil(u64::from(self.page_size))
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page_index) + 1 < self.total_pages()
    }

    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    /// Converts the content while keeping paging totals.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page_index: self.page_index,
            page_size: self.page_size,
            total_elements: self.total_elements,
        }
    }
}
