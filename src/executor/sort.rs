// ============================================================================
// ORDER BY support
// ============================================================================
//
// Sorting is stable: rows with equal keys keep their source order. NULLs sort
// last ascending and first descending.
//
// ============================================================================

use crate::core::{Result, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    NullsFirst,
    NullsLast,
}

impl NullOrdering {
    pub fn default_for_direction(descending: bool) -> Self {
        if descending {
            Self::NullsFirst
        } else {
            Self::NullsLast
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortDirection {
    pub descending: bool,
    pub null_ordering: NullOrdering,
}

impl SortDirection {
    pub fn new(descending: bool) -> Self {
        Self {
            descending,
            null_ordering: NullOrdering::default_for_direction(descending),
        }
    }

    fn compare(&self, a: &Value, b: &Value) -> Result<Ordering> {
        let ordering = match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => match self.null_ordering {
                NullOrdering::NullsFirst => Ordering::Less,
                NullOrdering::NullsLast => Ordering::Greater,
            },
            (false, true) => match self.null_ordering {
                NullOrdering::NullsFirst => Ordering::Greater,
                NullOrdering::NullsLast => Ordering::Less,
            },
            (false, false) => {
                let ordering = a.compare(b)?;
                if self.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        };
        Ok(ordering)
    }
}

/// Sort `items` by their precomputed keys.
///
/// The first comparison error (e.g. TEXT against INTEGER) aborts the sort.
pub fn sort_by_keys<T>(items: Vec<(Vec<Value>, T)>, directions: &[SortDirection]) -> Result<Vec<T>> {
    let mut items = items;
    let mut failure = None;

    items.sort_by(|(a, _), (b, _)| {
        for ((left, right), direction) in a.iter().zip(b).zip(directions) {
            match direction.compare(left, right) {
                Ok(Ordering::Equal) => continue,
                Ok(ordering) => return ordering,
                Err(err) => {
                    failure.get_or_insert(err);
                    return Ordering::Equal;
                }
            }
        }
        Ordering::Equal
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(items.into_iter().map(|(_, item)| item).collect()),
    }
}
