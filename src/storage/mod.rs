//! Storage Engine Module
//!
//! The in-memory half of LumenKV: a single [`Keyspace`] holding every key,
//! its type tag and its optional expiry, plus the command groups that
//! operate on it.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Keyspace                            │
//! │   data:    HashMap<String, Value>                            │
//! │   types:   HashMap<String, DataType>                         │
//! │   expires: HashMap<String, f64>   (unix seconds)             │
//! │                                                              │
//! │   keyspace.rs  generic key commands, type checks             │
//! │   expiry.rs    TTL commands, lazy + active expiry            │
//! │   strings.rs   lists.rs   sets.rs   hashes.rs   zsets.rs     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The keyspace is not synchronized on its own. [`crate::Database`] owns it
//! behind one lock, and every command runs start to finish under that lock.
//!
//! ## Journaling Contract
//!
//! Commands that may change state return [`Outcome`], whose `mutated` flag
//! tells the caller whether the call has to be recorded in the write-ahead
//! log. A command that returns `Err` has changed nothing.
//!
//! ## Example
//!
//! ```
//! use lumenkv::storage::{Keyspace, SetOptions};
//!
//! let mut keyspace = Keyspace::new();
//! keyspace.set("name", "ariz", &SetOptions::default()).unwrap();
//! assert_eq!(keyspace.get("name").unwrap(), Some("ariz".to_string()));
//!
//! keyspace.rpush("queue", &["a", "b"]).unwrap();
//! assert_eq!(keyspace.llen("queue").unwrap(), 2);
//! ```

pub mod expiry;
pub mod glob;
pub mod hashes;
pub mod keyspace;
pub mod lists;
pub mod sets;
pub mod sorted_set;
pub mod strings;
pub mod value;
pub mod zsets;

pub use expiry::{unix_now, ExpireOptions};
pub use glob::GlobPattern;
pub use hashes::HashFields;
pub use keyspace::{Keyspace, Outcome};
pub use lists::InsertPosition;
pub use sorted_set::SortedSet;
pub use strings::{SetOptions, SetOutcome};
pub use value::{DataType, Value};
pub use zsets::{PopSide, ZAddOptions};

use std::ops::Range;

/// Resolves an inclusive `[start, end]` index pair against a sequence of
/// length `len`. Negative indices count from the end. Returns `None` when
/// the window is empty.
pub(crate) fn inclusive_range(len: usize, start: i64, end: i64) -> Option<Range<usize>> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = if end < 0 { len + end } else { end.min(len - 1) };

    if start >= len || end < 0 || start > end {
        return None;
    }
    Some(start as usize..end as usize + 1)
}

/// Resolves a single possibly-negative index.
pub(crate) fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    if (0..len).contains(&index) {
        Some(index as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusive_range() {
        assert_eq!(inclusive_range(5, 0, -1), Some(0..5));
        assert_eq!(inclusive_range(5, 1, 2), Some(1..3));
        assert_eq!(inclusive_range(5, -2, -1), Some(3..5));
        assert_eq!(inclusive_range(5, -100, 100), Some(0..5));
        assert_eq!(inclusive_range(5, 3, 1), None);
        assert_eq!(inclusive_range(5, 5, 10), None);
        assert_eq!(inclusive_range(5, 0, -6), None);
        assert_eq!(inclusive_range(0, 0, -1), None);
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(3, 0), Some(0));
        assert_eq!(resolve_index(3, -1), Some(2));
        assert_eq!(resolve_index(3, 3), None);
        assert_eq!(resolve_index(3, -4), None);
    }
}
