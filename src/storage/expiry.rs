//! Key Expiry
//!
//! Deadlines are absolute unix timestamps in seconds (`f64`), stored in the
//! keyspace's `expires` map. Keys are expired two ways:
//!
//! 1. **Lazy**: every accessor checks the touched key first
//!    (see `Keyspace::expire_if_needed`).
//! 2. **Active**: [`Keyspace::purge_expired`] scans everything. It runs once
//!    after startup replay and then periodically from the maintenance task,
//!    so keys nobody reads again still get reclaimed.
//!
//! Relative commands (`EXPIRE`, `PEXPIRE`) are thin wrappers that resolve to
//! an absolute deadline and go through [`Keyspace::expire_at`]; the database
//! records the absolute form in the write-ahead log.

use crate::error::{Error, Result};
use crate::storage::{Keyspace, Outcome};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Conditions for `EXPIRE` and friends.
///
/// - `nx`: only when the key has no expiry
/// - `xx`: only when the key already has one
/// - `gt` / `lt`: only when the new deadline is later / earlier than the
///   current one; a key with no expiry accepts either
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpireOptions {
    pub nx: bool,
    pub xx: bool,
    pub gt: bool,
    pub lt: bool,
}

impl ExpireOptions {
    pub fn nx() -> Self {
        Self {
            nx: true,
            ..Self::default()
        }
    }

    pub fn xx() -> Self {
        Self {
            xx: true,
            ..Self::default()
        }
    }

    pub fn gt() -> Self {
        Self {
            gt: true,
            ..Self::default()
        }
    }

    pub fn lt() -> Self {
        Self {
            lt: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.nx && (self.xx || self.gt || self.lt) {
            return Err(Error::invalid("NX and XX, GT or LT options at the same time are not compatible"));
        }
        if self.gt && self.lt {
            return Err(Error::invalid("GT and LT options at the same time are not compatible"));
        }
        Ok(())
    }

    fn allows(&self, current: Option<f64>, new: f64) -> bool {
        match current {
            None => !self.xx,
            Some(current) => {
                !self.nx && (!self.gt || new > current) && (!self.lt || new < current)
            }
        }
    }
}

impl Keyspace {
    /// EXPIREAT with an absolute deadline in (fractional) seconds.
    ///
    /// A deadline already in the past deletes the key immediately.
    ///
    /// # Returns
    ///
    /// `false` without touching anything when the key is missing or the
    /// condition in `options` does not hold.
    pub fn expire_at(&mut self, key: &str, at: f64, options: ExpireOptions) -> Result<Outcome<bool>> {
        options.validate()?;
        if !at.is_finite() {
            return Err(Error::invalid("invalid expire time"));
        }

        self.expire_if_needed(key);
        if !self.data.contains_key(key) {
            return Ok(Outcome::unchanged(false));
        }
        if !options.allows(self.expires.get(key).copied(), at) {
            return Ok(Outcome::unchanged(false));
        }

        if at <= unix_now() && !self.replaying {
            self.evict(key);
        } else {
            self.expires.insert(key.to_string(), at);
        }
        Ok(Outcome::changed(true))
    }

    /// EXPIRE key seconds
    pub fn expire(&mut self, key: &str, seconds: i64, options: ExpireOptions) -> Result<Outcome<bool>> {
        self.expire_at(key, unix_now() + seconds as f64, options)
    }

    /// PEXPIRE key milliseconds
    pub fn pexpire(&mut self, key: &str, millis: i64, options: ExpireOptions) -> Result<Outcome<bool>> {
        self.expire_at(key, unix_now() + millis as f64 / 1000.0, options)
    }

    /// TTL key: `-2` when missing, `-1` without expiry, else whole seconds left.
    pub fn ttl(&mut self, key: &str) -> i64 {
        self.remaining(key)
            .map_or_else(|code| code, |left| left.round().max(0.0) as i64)
    }

    /// PTTL key: like [`Keyspace::ttl`] in milliseconds.
    pub fn pttl(&mut self, key: &str) -> i64 {
        self.remaining(key)
            .map_or_else(|code| code, |left| (left * 1000.0).round().max(0.0) as i64)
    }

    /// EXPIRETIME key: the deadline as a unix timestamp in seconds.
    pub fn expiretime(&mut self, key: &str) -> i64 {
        self.expire_if_needed(key);
        if !self.data.contains_key(key) {
            return -2;
        }
        self.expires.get(key).map_or(-1, |&at| at as i64)
    }

    /// PERSIST key
    pub fn persist(&mut self, key: &str) -> Outcome<bool> {
        self.expire_if_needed(key);
        let removed = self.expires.remove(key).is_some();
        Outcome::new(removed, removed)
    }

    /// Active expiry: removes every key whose deadline has passed.
    ///
    /// # Returns
    ///
    /// The number of keys removed.
    pub fn purge_expired(&mut self) -> usize {
        if self.replaying {
            return 0;
        }
        let now = unix_now();
        let expired: Vec<String> = self
            .expires
            .iter()
            .filter(|(_, &at)| at <= now)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.evict(key);
        }
        expired.len()
    }

    /// Number of keys carrying an expiry.
    pub fn volatile_count(&self) -> usize {
        self.expires.len()
    }

    /// Seconds left, or the TTL status code as the error side.
    fn remaining(&mut self, key: &str) -> std::result::Result<f64, i64> {
        self.expire_if_needed(key);
        if !self.data.contains_key(key) {
            return Err(-2);
        }
        match self.expires.get(key) {
            Some(&at) => Ok(at - unix_now()),
            None => Err(-1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SetOptions;

    fn keyspace_with(key: &str) -> Keyspace {
        let mut ks = Keyspace::new();
        ks.set(key, "v", &SetOptions::default()).unwrap();
        ks
    }

    #[test]
    fn test_expire_and_ttl() {
        let mut ks = keyspace_with("k");
        assert_eq!(ks.ttl("k"), -1);
        assert_eq!(ks.ttl("missing"), -2);

        assert!(ks.expire("k", 100, ExpireOptions::default()).unwrap().value);
        let ttl = ks.ttl("k");
        assert!((99..=100).contains(&ttl));
        let pttl = ks.pttl("k");
        assert!(pttl > 98_000 && pttl <= 100_000);
    }

    #[test]
    fn test_expire_missing_key() {
        let mut ks = Keyspace::new();
        let outcome = ks.expire("nope", 10, ExpireOptions::default()).unwrap();
        assert_eq!(outcome, Outcome::unchanged(false));
    }

    #[test]
    fn test_expire_in_past_deletes() {
        let mut ks = keyspace_with("k");
        let outcome = ks.expire_at("k", unix_now() - 5.0, ExpireOptions::default()).unwrap();
        assert_eq!(outcome, Outcome::changed(true));
        assert!(ks.is_empty());
    }

    #[test]
    fn test_expire_nx_xx() {
        let mut ks = keyspace_with("k");
        assert!(!ks.expire("k", 10, ExpireOptions::xx()).unwrap().value);
        assert!(ks.expire("k", 10, ExpireOptions::nx()).unwrap().value);
        assert!(!ks.expire("k", 20, ExpireOptions::nx()).unwrap().value);
        assert!(ks.expire("k", 20, ExpireOptions::xx()).unwrap().value);
    }

    #[test]
    fn test_expire_gt_lt() {
        let mut ks = keyspace_with("k");
        // Without an expiry both GT and LT set one
        assert!(ks.expire("k", 100, ExpireOptions::gt()).unwrap().value);
        assert_eq!(ks.ttl("k"), 100);
        assert!(ks.persist("k").value);
        assert!(ks.expire("k", 100, ExpireOptions::lt()).unwrap().value);

        assert!(!ks.expire("k", 50, ExpireOptions::gt()).unwrap().value);
        assert!(ks.expire("k", 200, ExpireOptions::gt()).unwrap().value);
        assert!(!ks.expire("k", 300, ExpireOptions::lt()).unwrap().value);
        assert!(ks.expire("k", 30, ExpireOptions::lt()).unwrap().value);
        assert!(ks.ttl("k") <= 30);
    }

    #[test]
    fn test_expire_rejects_conflicting_flags() {
        let mut ks = keyspace_with("k");
        let both = ExpireOptions {
            nx: true,
            xx: true,
            ..Default::default()
        };
        assert!(matches!(
            ks.expire("k", 10, both),
            Err(Error::InvalidArgument(_))
        ));

        let gt_lt = ExpireOptions {
            gt: true,
            lt: true,
            ..Default::default()
        };
        assert!(ks.expire("k", 10, gt_lt).is_err());
        assert_eq!(ks.ttl("k"), -1);
    }

    #[test]
    fn test_persist() {
        let mut ks = keyspace_with("k");
        assert_eq!(ks.persist("k"), Outcome::unchanged(false));

        ks.expire("k", 100, ExpireOptions::default()).unwrap();
        assert_eq!(ks.persist("k"), Outcome::changed(true));
        assert_eq!(ks.ttl("k"), -1);
        assert_eq!(ks.persist("k"), Outcome::unchanged(false));
    }

    #[test]
    fn test_expiretime() {
        let mut ks = keyspace_with("k");
        assert_eq!(ks.expiretime("k"), -1);
        assert_eq!(ks.expiretime("missing"), -2);

        ks.expire_at("k", 4_000_000_000.0, ExpireOptions::default()).unwrap();
        assert_eq!(ks.expiretime("k"), 4_000_000_000);
    }

    #[test]
    fn test_purge_expired() {
        let mut ks = Keyspace::new();
        for i in 0..10 {
            ks.set(&format!("key{}", i), "v", &SetOptions::default()).unwrap();
        }
        let past = unix_now() - 1.0;
        for i in 0..4 {
            ks.expires.insert(format!("key{}", i), past);
        }
        ks.expire("key9", 100, ExpireOptions::default()).unwrap();

        assert_eq!(ks.volatile_count(), 5);
        assert_eq!(ks.purge_expired(), 4);
        assert_eq!(ks.len(), 6);
        assert_eq!(ks.volatile_count(), 1);
    }

    #[test]
    fn test_lazy_expiry_on_access() {
        let mut ks = keyspace_with("k");
        ks.pexpire("k", 20, ExpireOptions::default()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(40));
        assert_eq!(ks.get("k").unwrap(), None);
        assert_eq!(ks.ttl("k"), -2);
    }

    #[test]
    fn test_replaying_keeps_past_deadlines() {
        let mut ks = Keyspace::new();
        ks.set("counter", "0", &SetOptions::default()).unwrap();
        ks.set_replaying(true);
        let past = unix_now() - 10.0;

        assert!(ks.expire_at("counter", past, ExpireOptions::default()).unwrap().value);
        assert_eq!(ks.incrby("counter", 1).unwrap().value, 1);
        assert_eq!(ks.purge_expired(), 0);
        assert_eq!(ks.expiretime("counter"), past as i64);

        ks.set_replaying(false);
        assert_eq!(ks.purge_expired(), 1);
        assert_eq!(ks.get("counter").unwrap(), None);
    }

    #[test]
    fn test_evictions_are_tracked() {
        let mut ks = keyspace_with("a");
        ks.set("b", "v", &SetOptions::default()).unwrap();
        ks.set("c", "v", &SetOptions::default()).unwrap();
        ks.purge_expired();
        assert!(ks.take_evicted().is_empty());

        ks.track_evictions();
        let past = unix_now() - 1.0;
        ks.expires.insert("a".to_string(), past);
        ks.expires.insert("b".to_string(), past);
        assert_eq!(ks.get("a").unwrap(), None);
        ks.expire_at("c", past, ExpireOptions::default()).unwrap();
        ks.purge_expired();

        let mut evicted = ks.take_evicted();
        evicted.sort();
        assert_eq!(evicted, vec!["a", "b", "c"]);
        assert!(ks.take_evicted().is_empty());
    }
}
