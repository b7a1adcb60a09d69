use crate::core::{Result, TxError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// `DESC` in any case is descending; everything else is ascending.
    pub fn parse(direction: &str) -> Self {
        if direction.eq_ignore_ascii_case("DESC") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub direction: Direction,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, Direction::Desc)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.direction.as_sql())
    }
}

/// Zero-based page index plus page size, with optional sort order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
    #[serde(default)]
    pub sorts: Vec<Sort>,
}

impl PageRequest {
    pub fn new(page: usize, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(TxError::InvalidArgument("page size must be > 0".into()));
        }
        Ok(Self {
            page,
            size,
            sorts: Vec::new(),
        })
    }

    pub fn sorted_by(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    /// Rows skipped before this page. Fails when `page * size` overflows.
    pub fn offset(&self) -> Result<usize> {
        self.page.checked_mul(self.size).ok_or_else(|| {
            TxError::InvalidArgument(format!(
                "page {} of size {} is out of range",
                self.page, self.size
            ))
        })
    }
}

/// One page of results plus the total across all pages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: usize,
    pub page: usize,
    pub size: usize,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, total_elements: usize, page: usize, size: usize) -> Self {
        Self {
            content,
            total_elements,
            page,
            size,
        }
    }

    pub fn total_pages(&self) -> usize {
        if self.size == 0 {
            return 0;
        }
        self.total_elements.div_ceil(self.size)
    }

    pub fn is_first(&self) -> bool {
        self.page == 0
    }

    pub fn is_last(&self) -> bool {
        self.page + 1 >= self.total_pages()
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            page: self.page,
            size: self.size,
        }
    }

    pub fn try_map<U, F: FnMut(T) -> Result<U>>(self, f: F) -> Result<Page<U>> {
        Ok(Page {
            content: self.content.into_iter().map(f).collect::<Result<Vec<_>>>()?,
            total_elements: self.total_elements,
            page: self.page,
            size: self.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_math() {
        let page = Page::new(vec![1, 2, 3, 4, 5], 25, 2, 10);
        assert_eq!(page.total_pages(), 3);
        assert!(!page.is_first());
        assert!(page.is_last());

        let first = Page::new(vec![0; 10], 25, 0, 10);
        assert!(first.is_first());
        assert!(!first.is_last());
    }

    #[test]
    fn test_zero_size_has_no_pages() {
        let page: Page<i32> = Page::new(vec![], 10, 0, 0);
        assert_eq!(page.total_pages(), 0);
        assert!(page.is_last());
    }

    #[test]
    fn test_offset_and_validation() {
        assert_eq!(PageRequest::new(2, 10).unwrap().offset().unwrap(), 20);
        let huge = PageRequest::new(usize::MAX / 2, 10).unwrap();
        assert!(matches!(huge.offset(), Err(TxError::InvalidArgument(_))));
        assert!(matches!(PageRequest::new(0, 0), Err(TxError::InvalidArgument(_))));
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("desc"), Direction::Desc);
        assert_eq!(Direction::parse("DESC"), Direction::Desc);
        assert_eq!(Direction::parse("down"), Direction::Asc);
    }

    #[test]
    fn test_map_keeps_metadata() {
        let page = Page::new(vec![1, 2], 4, 1, 2).map(|n| n * 10);
        assert_eq!(page.content, vec![10, 20]);
        assert_eq!(page.total_elements, 4);
        assert_eq!(page.page, 1);
    }
}
