//! List commands.
//!
//! Lists are `VecDeque<String>`, so pushes and pops at both ends are O(1).
//! All index arguments accept negative values counting from the tail.

use crate::error::{Error, Result};
use crate::storage::{inclusive_range, resolve_index, Keyspace, Outcome};
use std::fmt;
use std::str::FromStr;

/// Where `LINSERT` puts the new element relative to the pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
}

impl FromStr for InsertPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BEFORE" => Ok(InsertPosition::Before),
            "AFTER" => Ok(InsertPosition::After),
            other => Err(Error::invalid(format!("expected BEFORE or AFTER, got '{}'", other))),
        }
    }
}

impl fmt::Display for InsertPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InsertPosition::Before => "BEFORE",
            InsertPosition::After => "AFTER",
        })
    }
}

fn require_values(values: &[impl AsRef<str>], command: &str) -> Result<()> {
    if values.is_empty() {
        return Err(Error::invalid(format!(
            "wrong number of arguments for '{}'",
            command
        )));
    }
    Ok(())
}

impl Keyspace {
    /// LPUSH key value [value ...] - each value goes to the head in turn,
    /// so the last one ends up first.
    pub fn lpush(&mut self, key: &str, values: &[impl AsRef<str>]) -> Result<Outcome<usize>> {
        require_values(values, "lpush")?;
        let list = self.list_entry(key)?;
        for value in values {
            list.push_front(value.as_ref().to_string());
        }
        Ok(Outcome::changed(list.len()))
    }

    /// RPUSH key value [value ...]
    pub fn rpush(&mut self, key: &str, values: &[impl AsRef<str>]) -> Result<Outcome<usize>> {
        require_values(values, "rpush")?;
        let list = self.list_entry(key)?;
        for value in values {
            list.push_back(value.as_ref().to_string());
        }
        Ok(Outcome::changed(list.len()))
    }

    /// LPUSHX key value [value ...] - only when the list exists.
    pub fn lpushx(&mut self, key: &str, values: &[impl AsRef<str>]) -> Result<Outcome<usize>> {
        require_values(values, "lpushx")?;
        match self.list_mut(key)? {
            Some(list) => {
                for value in values {
                    list.push_front(value.as_ref().to_string());
                }
                Ok(Outcome::changed(list.len()))
            }
            None => Ok(Outcome::unchanged(0)),
        }
    }

    /// RPUSHX key value [value ...] - only when the list exists.
    pub fn rpushx(&mut self, key: &str, values: &[impl AsRef<str>]) -> Result<Outcome<usize>> {
        require_values(values, "rpushx")?;
        match self.list_mut(key)? {
            Some(list) => {
                for value in values {
                    list.push_back(value.as_ref().to_string());
                }
                Ok(Outcome::changed(list.len()))
            }
            None => Ok(Outcome::unchanged(0)),
        }
    }

    /// LPOP key
    pub fn lpop(&mut self, key: &str) -> Result<Outcome<Option<String>>> {
        let popped = self.list_mut(key)?.and_then(|list| list.pop_front());
        self.remove_if_empty(key);
        let mutated = popped.is_some();
        Ok(Outcome::new(popped, mutated))
    }

    /// RPOP key
    pub fn rpop(&mut self, key: &str) -> Result<Outcome<Option<String>>> {
        let popped = self.list_mut(key)?.and_then(|list| list.pop_back());
        self.remove_if_empty(key);
        let mutated = popped.is_some();
        Ok(Outcome::new(popped, mutated))
    }

    /// LPOP key count - `None` when the key does not exist.
    pub fn lpop_count(&mut self, key: &str, count: usize) -> Result<Outcome<Option<Vec<String>>>> {
        let popped = self.list_mut(key)?.map(|list| {
            let n = count.min(list.len());
            list.drain(..n).collect::<Vec<_>>()
        });
        self.remove_if_empty(key);
        let mutated = popped.as_ref().is_some_and(|p| !p.is_empty());
        Ok(Outcome::new(popped, mutated))
    }

    /// RPOP key count - elements come back tail first.
    pub fn rpop_count(&mut self, key: &str, count: usize) -> Result<Outcome<Option<Vec<String>>>> {
        let popped = self.list_mut(key)?.map(|list| {
            let n = count.min(list.len());
            let mut tail: Vec<String> = list.drain(list.len() - n..).collect();
            tail.reverse();
            tail
        });
        self.remove_if_empty(key);
        let mutated = popped.as_ref().is_some_and(|p| !p.is_empty());
        Ok(Outcome::new(popped, mutated))
    }

    /// LINDEX key index
    pub fn lindex(&mut self, key: &str, index: i64) -> Result<Option<String>> {
        Ok(self.list(key)?.and_then(|list| {
            resolve_index(list.len(), index).and_then(|i| list.get(i).cloned())
        }))
    }

    /// LLEN key
    pub fn llen(&mut self, key: &str) -> Result<usize> {
        Ok(self.list(key)?.map_or(0, |list| list.len()))
    }

    /// LRANGE key start end - inclusive on both ends.
    pub fn lrange(&mut self, key: &str, start: i64, end: i64) -> Result<Vec<String>> {
        let Some(list) = self.list(key)? else {
            return Ok(Vec::new());
        };
        Ok(match inclusive_range(list.len(), start, end) {
            Some(window) => list.range(window).cloned().collect(),
            None => Vec::new(),
        })
    }

    /// LTRIM key start end - keeps only the inclusive window.
    pub fn ltrim(&mut self, key: &str, start: i64, end: i64) -> Result<Outcome<()>> {
        let Some(list) = self.list_mut(key)? else {
            return Ok(Outcome::unchanged(()));
        };

        let before = list.len();
        match inclusive_range(before, start, end) {
            Some(window) => {
                list.truncate(window.end);
                list.drain(..window.start);
            }
            None => list.clear(),
        }
        let mutated = list.len() != before;
        self.remove_if_empty(key);
        Ok(Outcome::new((), mutated))
    }

    /// LINSERT key BEFORE|AFTER pivot value
    ///
    /// # Returns
    ///
    /// The new length, or `-1` when the key or the pivot is missing.
    pub fn linsert(
        &mut self,
        key: &str,
        position: InsertPosition,
        pivot: &str,
        value: &str,
    ) -> Result<Outcome<i64>> {
        let Some(list) = self.list_mut(key)? else {
            return Ok(Outcome::unchanged(-1));
        };
        let Some(at) = list.iter().position(|item| item == pivot) else {
            return Ok(Outcome::unchanged(-1));
        };

        let at = match position {
            InsertPosition::Before => at,
            InsertPosition::After => at + 1,
        };
        list.insert(at, value.to_string());
        Ok(Outcome::changed(list.len() as i64))
    }

    /// LREM key count value
    ///
    /// Removes up to `|count|` occurrences of `value`: from the head when
    /// `count > 0`, from the tail when `count < 0`, all of them when `0`.
    pub fn lrem(&mut self, key: &str, count: i64, value: &str) -> Result<Outcome<usize>> {
        let Some(list) = self.list_mut(key)? else {
            return Ok(Outcome::unchanged(0));
        };

        let limit = if count == 0 {
            usize::MAX
        } else {
            count.unsigned_abs() as usize
        };

        let mut removed = 0;
        if count >= 0 {
            list.retain(|item| {
                if removed < limit && item == value {
                    removed += 1;
                    false
                } else {
                    true
                }
            });
        } else {
            let mut index = list.len();
            while index > 0 && removed < limit {
                index -= 1;
                if list[index] == value {
                    list.remove(index);
                    removed += 1;
                }
            }
        }

        self.remove_if_empty(key);
        Ok(Outcome::new(removed, removed > 0))
    }

    /// LSET key index value
    pub fn lset(&mut self, key: &str, index: i64, value: &str) -> Result<Outcome<()>> {
        let list = self
            .list_mut(key)?
            .ok_or_else(|| Error::NoSuchKey(key.to_string()))?;
        let i = resolve_index(list.len(), index).ok_or(Error::IndexOutOfRange)?;
        list[i] = value.to_string();
        Ok(Outcome::changed(()))
    }

    /// Sorts the list in place (lexicographically) and returns it.
    pub fn lsort(&mut self, key: &str, desc: bool) -> Result<Outcome<Vec<String>>> {
        let Some(list) = self.list_mut(key)? else {
            return Ok(Outcome::unchanged(Vec::new()));
        };

        let mut sorted: Vec<String> = list.iter().cloned().collect();
        if desc {
            sorted.sort_by(|a, b| b.cmp(a));
        } else {
            sorted.sort();
        }
        let mutated = sorted.iter().ne(list.iter());
        *list = sorted.iter().cloned().collect();
        Ok(Outcome::new(sorted, mutated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SetOptions;

    fn list_of(items: &[&str]) -> Keyspace {
        let mut ks = Keyspace::new();
        ks.rpush("l", items).unwrap();
        ks
    }

    fn all(ks: &mut Keyspace) -> Vec<String> {
        ks.lrange("l", 0, -1).unwrap()
    }

    #[test]
    fn test_lpush_rpush() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.lpush("l", &["a"]).unwrap().value, 1);
        assert_eq!(ks.lpush("l", &["b"]).unwrap().value, 2);
        assert_eq!(ks.rpush("l", &["c"]).unwrap().value, 3);
        assert_eq!(all(&mut ks), vec!["b", "a", "c"]);

        // y pushed last, ends up at head
        ks.lpush("l", &["x", "y"]).unwrap();
        assert_eq!(ks.lindex("l", 0).unwrap(), Some("y".to_string()));
        assert_eq!(ks.lindex("l", 1).unwrap(), Some("x".to_string()));
    }

    #[test]
    fn test_push_requires_values() {
        let mut ks = Keyspace::new();
        let none: [&str; 0] = [];
        assert!(ks.lpush("l", &none).is_err());
        assert_eq!(ks.key_type("l"), None);
    }

    #[test]
    fn test_pushx_on_missing() {
        let mut ks = Keyspace::new();
        assert_eq!(ks.lpushx("l", &["a"]).unwrap(), Outcome::unchanged(0));
        assert_eq!(ks.rpushx("l", &["a"]).unwrap(), Outcome::unchanged(0));
        assert_eq!(ks.llen("l").unwrap(), 0);

        ks.rpush("l", &["a"]).unwrap();
        assert_eq!(ks.rpushx("l", &["b"]).unwrap().value, 2);
        assert_eq!(ks.lpushx("l", &["z"]).unwrap().value, 3);
    }

    #[test]
    fn test_pop_removes_empty_list() {
        let mut ks = list_of(&["a", "b", "c"]);
        assert_eq!(ks.lpop("l").unwrap().value, Some("a".to_string()));
        assert_eq!(ks.rpop("l").unwrap().value, Some("c".to_string()));
        assert_eq!(ks.lpop("l").unwrap().value, Some("b".to_string()));

        assert_eq!(ks.key_type("l"), None);
        assert_eq!(ks.lpop("l").unwrap(), Outcome::unchanged(None));
    }

    #[test]
    fn test_pop_count() {
        let mut ks = list_of(&["a", "b", "c", "d"]);
        assert_eq!(
            ks.lpop_count("l", 2).unwrap().value,
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            ks.rpop_count("l", 5).unwrap().value,
            Some(vec!["d".to_string(), "c".to_string()])
        );
        assert_eq!(ks.lpop_count("l", 1).unwrap().value, None);
    }

    #[test]
    fn test_lindex() {
        let mut ks = list_of(&["a", "b", "c"]);
        assert_eq!(ks.lindex("l", -1).unwrap(), Some("c".to_string()));
        assert_eq!(ks.lindex("l", -3).unwrap(), Some("a".to_string()));
        assert_eq!(ks.lindex("l", 3).unwrap(), None);
        assert_eq!(ks.lindex("l", -4).unwrap(), None);
    }

    #[test]
    fn test_lrange() {
        let mut ks = list_of(&["a", "b", "c", "d", "e"]);
        assert_eq!(ks.lrange("l", 1, 3).unwrap(), vec!["b", "c", "d"]);
        assert_eq!(ks.lrange("l", -2, -1).unwrap(), vec!["d", "e"]);
        assert_eq!(ks.lrange("l", 0, 100).unwrap().len(), 5);
        assert!(ks.lrange("l", 3, 1).unwrap().is_empty());
        assert!(ks.lrange("missing", 0, -1).unwrap().is_empty());
    }

    #[test]
    fn test_ltrim() {
        let mut ks = list_of(&["a", "b", "c", "d", "e"]);
        assert!(ks.ltrim("l", 1, -2).unwrap().mutated);
        assert_eq!(all(&mut ks), vec!["b", "c", "d"]);

        assert!(!ks.ltrim("l", 0, -1).unwrap().mutated);

        ks.ltrim("l", 5, 10).unwrap();
        assert_eq!(ks.key_type("l"), None);

        assert!(!ks.ltrim("missing", 0, 1).unwrap().mutated);
    }

    #[test]
    fn test_linsert() {
        let mut ks = list_of(&["a", "c"]);
        assert_eq!(
            ks.linsert("l", InsertPosition::Before, "c", "b").unwrap().value,
            3
        );
        assert_eq!(
            ks.linsert("l", InsertPosition::After, "c", "d").unwrap().value,
            4
        );
        assert_eq!(all(&mut ks), vec!["a", "b", "c", "d"]);

        assert_eq!(
            ks.linsert("l", InsertPosition::After, "zz", "x").unwrap(),
            Outcome::unchanged(-1)
        );
        assert_eq!(
            ks.linsert("missing", InsertPosition::After, "a", "x").unwrap().value,
            -1
        );
    }

    #[test]
    fn test_lrem_from_head_and_tail() {
        let mut ks = list_of(&["x", "a", "x", "b", "x"]);
        assert_eq!(ks.lrem("l", 2, "x").unwrap().value, 2);
        assert_eq!(all(&mut ks), vec!["a", "b", "x"]);

        let mut ks = list_of(&["x", "a", "x", "b", "x"]);
        assert_eq!(ks.lrem("l", -2, "x").unwrap().value, 2);
        assert_eq!(all(&mut ks), vec!["x", "a", "b"]);

        let mut ks = list_of(&["x", "a", "x"]);
        assert_eq!(ks.lrem("l", 0, "x").unwrap().value, 2);
        assert_eq!(all(&mut ks), vec!["a"]);

        assert_eq!(ks.lrem("l", 0, "nope").unwrap(), Outcome::unchanged(0));
        assert_eq!(ks.lrem("l", 1, "a").unwrap().value, 1);
        assert_eq!(ks.key_type("l"), None);
    }

    #[test]
    fn test_lset() {
        let mut ks = list_of(&["a", "b", "c"]);
        ks.lset("l", -1, "z").unwrap();
        assert_eq!(all(&mut ks), vec!["a", "b", "z"]);

        assert!(matches!(ks.lset("l", 3, "q"), Err(Error::IndexOutOfRange)));
        assert!(matches!(ks.lset("missing", 0, "q"), Err(Error::NoSuchKey(_))));
    }

    #[test]
    fn test_lsort() {
        let mut ks = list_of(&["b", "c", "a"]);
        assert_eq!(ks.lsort("l", false).unwrap().value, vec!["a", "b", "c"]);
        assert_eq!(all(&mut ks), vec!["a", "b", "c"]);
        assert!(!ks.lsort("l", false).unwrap().mutated);
        assert_eq!(ks.lsort("l", true).unwrap().value, vec!["c", "b", "a"]);
        assert!(ks.lsort("missing", false).unwrap().value.is_empty());
    }

    #[test]
    fn test_list_ops_on_string_fail() {
        let mut ks = Keyspace::new();
        ks.set("s", "x", &SetOptions::default()).unwrap();
        assert!(matches!(ks.lpush("s", &["a"]), Err(Error::WrongType { .. })));
        assert!(matches!(ks.llen("s"), Err(Error::WrongType { .. })));
        assert!(matches!(ks.lrange("s", 0, -1), Err(Error::WrongType { .. })));
        assert_eq!(ks.get("s").unwrap(), Some("x".to_string()));
    }
}
