//! The keyspace: three parallel maps and the generic key commands.
//!
//! ## Invariants
//!
//! - a key is in `data` iff it is in `types`, and both are written together
//! - a key in `expires` is always in `data`
//! - a container that becomes empty is removed from all three maps
//! - a type tag that disagrees with the stored variant is reported as
//!   `WrongType` rather than trusted
//!
//! Every accessor applies lazy expiry to the keys it touches first, so an
//! expired key behaves exactly like a missing one.

use crate::error::{Error, Result};
use crate::storage::expiry::unix_now;
use crate::storage::{DataType, GlobPattern, SortedSet, Value};
use indexmap::IndexMap;
use rand::seq::IteratorRandom;
use std::collections::{HashMap, HashSet, VecDeque};

/// Result of a command that may change state.
///
/// `mutated` is set only when the keyspace actually changed; the journaling
/// layer records the command exactly in that case.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub mutated: bool,
}

impl<T> Outcome<T> {
    pub fn changed(value: T) -> Self {
        Self {
            value,
            mutated: true,
        }
    }

    pub fn unchanged(value: T) -> Self {
        Self {
            value,
            mutated: false,
        }
    }

    pub(crate) fn new(value: T, mutated: bool) -> Self {
        Self { value, mutated }
    }
}

/// All keys of one database.
#[derive(Debug, Default, Clone)]
pub struct Keyspace {
    pub(crate) data: HashMap<String, Value>,
    pub(crate) types: HashMap<String, DataType>,
    pub(crate) expires: HashMap<String, f64>,
    /// While set, deadlines are stored but never enforced.
    pub(crate) replaying: bool,
    /// Keys removed by expiry since the last [`Keyspace::take_evicted`],
    /// when tracking is on.
    pub(crate) evicted: Option<Vec<String>>,
}

/// Generates the typed accessors for one value variant:
/// a shared view, a mutable view, and a get-or-create view.
macro_rules! typed_access {
    ($get:ident, $get_mut:ident, $entry:ident, $variant:ident, $ty:ty) => {
        pub(crate) fn $get(&mut self, key: &str) -> Result<Option<&$ty>> {
            self.expire_if_needed(key);
            self.check_type(key, DataType::$variant)?;
            match self.data.get(key) {
                Some(Value::$variant(inner)) => Ok(Some(inner)),
                Some(other) => Err(Error::wrong_type(key, DataType::$variant, other.data_type())),
                None => Ok(None),
            }
        }

        pub(crate) fn $get_mut(&mut self, key: &str) -> Result<Option<&mut $ty>> {
            self.expire_if_needed(key);
            self.check_type(key, DataType::$variant)?;
            match self.data.get_mut(key) {
                Some(Value::$variant(inner)) => Ok(Some(inner)),
                Some(other) => Err(Error::wrong_type(key, DataType::$variant, other.data_type())),
                None => Ok(None),
            }
        }

        pub(crate) fn $entry(&mut self, key: &str) -> Result<&mut $ty> {
            self.expire_if_needed(key);
            self.check_type(key, DataType::$variant)?;
            if !self.data.contains_key(key) {
                self.put(key.to_string(), Value::$variant(Default::default()));
            }
            match self.data.get_mut(key) {
                Some(Value::$variant(inner)) => Ok(inner),
                Some(other) => Err(Error::wrong_type(key, DataType::$variant, other.data_type())),
                None => Err(Error::NoSuchKey(key.to_string())),
            }
        }
    };
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    typed_access!(string, string_mut, string_entry, String, String);
    typed_access!(list, list_mut, list_entry, List, VecDeque<String>);
    typed_access!(set_ref, set_mut, set_entry, Set, HashSet<String>);
    typed_access!(hash, hash_mut, hash_entry, Hash, IndexMap<String, String>);
    typed_access!(zset, zset_mut, zset_entry, SortedSet, SortedSet);

    /// Fails with `WrongType` if `key` exists with a different tag.
    pub(crate) fn check_type(&self, key: &str, expected: DataType) -> Result<()> {
        match self.types.get(key) {
            Some(&actual) if actual != expected => Err(Error::wrong_type(key, expected, actual)),
            _ => Ok(()),
        }
    }

    /// Lazy expiry: drops `key` if its deadline has passed.
    ///
    /// # Returns
    ///
    /// `true` if the key was expired and removed.
    pub(crate) fn expire_if_needed(&mut self, key: &str) -> bool {
        if self.replaying {
            return false;
        }
        match self.expires.get(key) {
            Some(&at) if at <= unix_now() => {
                self.evict(key);
                true
            }
            _ => false,
        }
    }

    /// Removes a key because its deadline passed, noting it for the log.
    pub(crate) fn evict(&mut self, key: &str) {
        if self.remove_entry(key).is_some() {
            if let Some(evicted) = self.evicted.as_mut() {
                evicted.push(key.to_string());
            }
        }
    }

    /// True if `key` is present and not expired. Does not evict.
    pub(crate) fn is_live(&self, key: &str, now: f64) -> bool {
        self.data.contains_key(key)
            && (self.replaying || !matches!(self.expires.get(key), Some(&at) if at <= now))
    }

    /// Starts recording keys removed by expiry, for logging as `DEL`.
    pub fn track_evictions(&mut self) {
        self.evicted.get_or_insert_with(Vec::new);
    }

    /// Drains the keys removed by expiry since the last call.
    pub fn take_evicted(&mut self) -> Vec<String> {
        self.evicted.as_mut().map(std::mem::take).unwrap_or_default()
    }

    /// Suspends (or resumes) lazy expiry, past-deadline deletes and
    /// `purge_expired`. Deadlines set meanwhile are stored as given.
    pub fn set_replaying(&mut self, replaying: bool) {
        self.replaying = replaying;
    }

    /// Inserts or replaces a value and its tag. The expiry is left alone.
    pub(crate) fn put(&mut self, key: String, value: Value) {
        self.types.insert(key.clone(), value.data_type());
        self.data.insert(key, value);
    }

    /// Removes a key from all three maps.
    pub(crate) fn remove_entry(&mut self, key: &str) -> Option<Value> {
        self.types.remove(key);
        self.expires.remove(key);
        self.data.remove(key)
    }

    /// Removes `key` if it holds an empty container.
    pub(crate) fn remove_if_empty(&mut self, key: &str) {
        if self.data.get(key).is_some_and(Value::is_empty_container) {
            self.remove_entry(key);
        }
    }

    /// Iterates every stored entry as `(key, tag, value, expiry)`.
    pub fn entries(&self) -> impl Iterator<Item = (&str, DataType, &Value, Option<f64>)> {
        self.data.iter().map(|(key, value)| {
            let tag = self.types.get(key).copied().unwrap_or_else(|| value.data_type());
            (key.as_str(), tag, value, self.expires.get(key).copied())
        })
    }

    /// Re-inserts an entry read back from a snapshot.
    ///
    /// The tag has to agree with the value variant; anything else means the
    /// snapshot is damaged.
    pub(crate) fn restore(
        &mut self,
        key: String,
        tag: DataType,
        value: Value,
        expires_at: Option<f64>,
    ) -> Result<()> {
        if value.data_type() != tag {
            return Err(Error::CorruptSnapshot(format!(
                "key '{}' is tagged {} but holds a {}",
                key,
                tag,
                value.data_type()
            )));
        }
        if let Some(at) = expires_at {
            self.expires.insert(key.clone(), at);
        }
        self.put(key, value);
        Ok(())
    }

    // ========================================================================
    // Generic key commands
    // ========================================================================

    /// DEL key [key ...]
    pub fn delete(&mut self, keys: &[impl AsRef<str>]) -> Outcome<usize> {
        let mut removed = 0;
        for key in keys {
            let key: &str = key.as_ref();
            if !self.expire_if_needed(key) && self.remove_entry(key).is_some() {
                removed += 1;
            }
        }
        Outcome::new(removed, removed > 0)
    }

    /// EXISTS key [key ...] - repeated keys are counted repeatedly.
    pub fn exists(&mut self, keys: &[impl AsRef<str>]) -> usize {
        keys.iter()
            .filter(|key| {
                let key: &str = key.as_ref();
                !self.expire_if_needed(key) && self.data.contains_key(key)
            })
            .count()
    }

    /// KEYS pattern, sorted.
    pub fn keys(&mut self, pattern: &str) -> Vec<String> {
        let pattern = GlobPattern::new(pattern);
        let now = unix_now();
        let mut keys: Vec<String> = self
            .data
            .keys()
            .filter(|key| self.is_live(key, now) && pattern.matches(key))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// TYPE key
    pub fn key_type(&mut self, key: &str) -> Option<DataType> {
        self.expire_if_needed(key);
        self.types.get(key).copied()
    }

    /// RENAME src dst - moves value, tag and expiry, replacing `dst`.
    pub fn rename(&mut self, src: &str, dst: &str) -> Result<Outcome<()>> {
        self.expire_if_needed(src);
        self.expire_if_needed(dst);
        if !self.data.contains_key(src) {
            return Err(Error::NoSuchKey(src.to_string()));
        }
        if src == dst {
            return Ok(Outcome::unchanged(()));
        }

        let expires_at = self.expires.get(src).copied();
        if let Some(value) = self.remove_entry(src) {
            self.remove_entry(dst);
            self.put(dst.to_string(), value);
            if let Some(at) = expires_at {
                self.expires.insert(dst.to_string(), at);
            }
        }
        Ok(Outcome::changed(()))
    }

    /// RENAMENX src dst - like `rename`, but only when `dst` does not exist.
    pub fn renamenx(&mut self, src: &str, dst: &str) -> Result<Outcome<bool>> {
        self.expire_if_needed(src);
        if !self.data.contains_key(src) {
            return Err(Error::NoSuchKey(src.to_string()));
        }
        if self.expire_if_needed(dst) || !self.data.contains_key(dst) {
            self.rename(src, dst)?;
            return Ok(Outcome::changed(true));
        }
        Ok(Outcome::unchanged(false))
    }

    /// COPY src dst [REPLACE] - deep copy of value, tag and expiry.
    pub fn copy(&mut self, src: &str, dst: &str, replace: bool) -> Outcome<bool> {
        self.expire_if_needed(src);
        self.expire_if_needed(dst);
        if src == dst {
            return Outcome::unchanged(false);
        }
        let Some(value) = self.data.get(src).cloned() else {
            return Outcome::unchanged(false);
        };
        if self.data.contains_key(dst) && !replace {
            return Outcome::unchanged(false);
        }

        let expires_at = self.expires.get(src).copied();
        self.remove_entry(dst);
        self.put(dst.to_string(), value);
        if let Some(at) = expires_at {
            self.expires.insert(dst.to_string(), at);
        }
        Outcome::changed(true)
    }

    /// DUMP key - JSON rendering of the value.
    pub fn dump(&mut self, key: &str) -> Option<String> {
        self.expire_if_needed(key);
        self.data.get(key).map(|value| value.to_json().to_string())
    }

    /// RANDOMKEY
    pub fn randomkey(&mut self) -> Option<String> {
        let now = unix_now();
        self.data
            .keys()
            .filter(|key| self.is_live(key, now))
            .choose(&mut rand::thread_rng())
            .cloned()
    }

    /// DBSIZE - live keys only.
    pub fn dbsize(&self) -> usize {
        let now = unix_now();
        self.data.keys().filter(|key| self.is_live(key, now)).count()
    }

    /// FLUSHDB
    pub fn flushdb(&mut self) -> Outcome<()> {
        let mutated = !self.data.is_empty();
        self.data.clear();
        self.types.clear();
        self.expires.clear();
        Outcome::new((), mutated)
    }
}
