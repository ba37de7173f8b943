//! String commands.
//!
//! Lengths and ranges count characters, not bytes.

use crate::error::{Error, Result};
use crate::storage::expiry::unix_now;
use crate::storage::{inclusive_range, Keyspace, Outcome, Value};

/// Options for `SET`.
///
/// ```
/// use lumenkv::storage::SetOptions;
///
/// let options = SetOptions::new().ex(60).nx();
/// assert!(options.nx);
/// assert_eq!(options.ex, Some(60));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOptions {
    /// Expire after this many seconds.
    pub ex: Option<i64>,
    /// Expire at this unix timestamp (seconds).
    pub exat: Option<f64>,
    /// Only set if the key does not exist.
    pub nx: bool,
    /// Only set if the key already exists.
    pub xx: bool,
    /// Report the previous value.
    pub get: bool,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ex(mut self, seconds: i64) -> Self {
        self.ex = Some(seconds);
        self
    }

    pub fn exat(mut self, timestamp: f64) -> Self {
        self.exat = Some(timestamp);
        self
    }

    pub fn nx(mut self) -> Self {
        self.nx = true;
        self
    }

    pub fn xx(mut self) -> Self {
        self.xx = true;
        self
    }

    pub fn get(mut self) -> Self {
        self.get = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.nx && self.xx {
            return Err(Error::invalid("NX and XX are mutually exclusive"));
        }
        if self.ex.is_some() && self.exat.is_some() {
            return Err(Error::invalid("EX and EXAT are mutually exclusive"));
        }
        if matches!(self.ex, Some(seconds) if seconds <= 0) {
            return Err(Error::invalid("invalid expire time in 'set' command"));
        }
        if matches!(self.exat, Some(at) if !at.is_finite() || at <= 0.0) {
            return Err(Error::invalid("invalid expire time in 'set' command"));
        }
        Ok(())
    }

    /// Replaces a relative `ex` with the equivalent absolute `exat`.
    pub fn resolved(&self, now: f64) -> SetOptions {
        let mut resolved = self.clone();
        if let Some(seconds) = resolved.ex.take() {
            resolved.exat = Some(now + seconds as f64);
        }
        resolved
    }

    fn deadline(&self) -> Option<f64> {
        self.exat.or_else(|| self.ex.map(|seconds| unix_now() + seconds as f64))
    }
}

/// What `SET` did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOutcome {
    /// `false` when an `NX`/`XX` condition prevented the write.
    pub applied: bool,
    /// The previous value, when `get` was requested.
    pub old: Option<String>,
}

impl Keyspace {
    /// SET key value [EX seconds | EXAT timestamp] [NX | XX] [GET]
    ///
    /// Without an expiry option the key keeps whatever expiry it had.
    pub fn set(&mut self, key: &str, value: &str, options: &SetOptions) -> Result<Outcome<SetOutcome>> {
        options.validate()?;
        self.expire_if_needed(key);

        let exists = self.data.contains_key(key);
        if (options.nx && exists) || (options.xx && !exists) {
            let old = match (options.get, self.data.get(key)) {
                (true, Some(Value::String(old))) => Some(old.clone()),
                _ => None,
            };
            return Ok(Outcome::unchanged(SetOutcome {
                applied: false,
                old,
            }));
        }

        let old = self.string(key)?.cloned();
        self.put(key.to_string(), Value::String(value.to_string()));
        if let Some(at) = options.deadline() {
            self.expires.insert(key.to_string(), at);
        }

        Ok(Outcome::changed(SetOutcome {
            applied: true,
            old: old.filter(|_| options.get),
        }))
    }

    /// GET key
    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.string(key)?.cloned())
    }

    /// APPEND key value - creates the key when missing.
    ///
    /// # Returns
    ///
    /// The length of the string after the append.
    pub fn append(&mut self, key: &str, value: &str) -> Result<Outcome<usize>> {
        let current = self.string_entry(key)?;
        current.push_str(value);
        Ok(Outcome::changed(current.chars().count()))
    }

    /// INCRBY key delta
    pub fn incrby(&mut self, key: &str, delta: i64) -> Result<Outcome<i64>> {
        let current = match self.string(key)? {
            Some(raw) => raw.parse::<i64>().map_err(|_| Error::NotInteger)?,
            None => 0,
        };
        let updated = current.checked_add(delta).ok_or(Error::Overflow)?;
        *self.string_entry(key)? = updated.to_string();
        Ok(Outcome::changed(updated))
    }

    /// INCR key
    pub fn incr(&mut self, key: &str) -> Result<Outcome<i64>> {
        self.incrby(key, 1)
    }

    /// DECRBY key delta
    pub fn decrby(&mut self, key: &str, delta: i64) -> Result<Outcome<i64>> {
        let delta = delta.checked_neg().ok_or(Error::Overflow)?;
        self.incrby(key, delta)
    }

    /// DECR key
    pub fn decr(&mut self, key: &str) -> Result<Outcome<i64>> {
        self.incrby(key, -1)
    }

    /// INCRBYFLOAT key delta
    pub fn incrbyfloat(&mut self, key: &str, delta: f64) -> Result<Outcome<f64>> {
        if !delta.is_finite() {
            return Err(Error::NotFloat);
        }
        let current = match self.string(key)? {
            Some(raw) => raw.trim().parse::<f64>().map_err(|_| Error::NotFloat)?,
            None => 0.0,
        };
        let updated = current + delta;
        if !updated.is_finite() {
            return Err(Error::NotFloat);
        }
        *self.string_entry(key)? = updated.to_string();
        Ok(Outcome::changed(updated))
    }

    /// GETRANGE key start end - inclusive, negative indices from the end.
    pub fn getrange(&mut self, key: &str, start: i64, end: i64) -> Result<String> {
        let Some(value) = self.string(key)? else {
            return Ok(String::new());
        };
        let chars: Vec<char> = value.chars().collect();
        Ok(match inclusive_range(chars.len(), start, end) {
            Some(window) => chars[window].iter().collect(),
            None => String::new(),
        })
    }

    /// STRLEN key
    pub fn strlen(&mut self, key: &str) -> Result<usize> {
        Ok(self.string(key)?.map_or(0, |value| value.chars().count()))
    }

    /// MGET key [key ...] - `None` for missing keys and for non-strings.
    pub fn mget(&mut self, keys: &[impl AsRef<str>]) -> Vec<Option<String>> {
        keys.iter()
            .map(|key| {
                let key: &str = key.as_ref();
                self.expire_if_needed(key);
                match self.data.get(key) {
                    Some(Value::String(value)) => Some(value.clone()),
                    _ => None,
                }
            })
            .collect()
    }

    /// MSET key value [key value ...] - overwrites keys of any type.
    pub fn mset<K: AsRef<str>, V: AsRef<str>>(&mut self, pairs: &[(K, V)]) -> Outcome<()> {
        for (key, value) in pairs {
            let key: &str = key.as_ref();
            self.expire_if_needed(key);
            self.put(key.to_string(), Value::String(value.as_ref().to_string()));
        }
        Outcome::new((), !pairs.is_empty())
    }

    /// MSETNX key value [key value ...] - all or nothing.
    ///
    /// # Returns
    ///
    /// `false`, with nothing written, if any of the keys exists.
    pub fn msetnx<K: AsRef<str>, V: AsRef<str>>(&mut self, pairs: &[(K, V)]) -> Outcome<bool> {
        let now = unix_now();
        if pairs.iter().any(|(key, _)| self.is_live(key.as_ref(), now)) {
            return Outcome::unchanged(false);
        }
        let outcome = self.mset(pairs);
        Outcome::new(true, outcome.mutated)
    }
}
