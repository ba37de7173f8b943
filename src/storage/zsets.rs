//! Sorted set commands.
//!
//! The ordering work lives in [`SortedSet`]; this module is the command
//! surface over it: flag validation, type checks, and removing sets that
//! become empty.

use crate::error::{Error, Result};
use crate::storage::{Keyspace, Outcome, SortedSet};
use std::fmt;

/// Conditions for `ZADD`.
///
/// - `nx`: only add new members, never re-score
/// - `xx`: only re-score existing members, never add
/// - `gt` / `lt`: re-score only when the new score is higher / lower;
///   new members are still added
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZAddOptions {
    pub nx: bool,
    pub xx: bool,
    pub gt: bool,
    pub lt: bool,
}

impl ZAddOptions {
    pub fn validate(&self) -> Result<()> {
        if self.nx && self.xx {
            return Err(Error::invalid("XX and NX options at the same time are not compatible"));
        }
        if self.gt && self.lt {
            return Err(Error::invalid("GT and LT options at the same time are not compatible"));
        }
        if self.nx && (self.gt || self.lt) {
            return Err(Error::invalid("GT, LT, and/or NX options at the same time are not compatible"));
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

/// Which end `ZMPOP` takes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopSide {
    Min,
    Max,
}

impl fmt::Display for PopSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopSide::Min => write!(f, "MIN"),
            PopSide::Max => write!(f, "MAX"),
        }
    }
}

impl std::str::FromStr for PopSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MIN" => Ok(PopSide::Min),
            "MAX" => Ok(PopSide::Max),
            other => Err(Error::invalid(format!("unknown pop side '{}'", other))),
        }
    }
}

fn check_score(score: f64) -> Result<()> {
    if score.is_nan() {
        return Err(Error::NotFloat);
    }
    Ok(())
}

impl Keyspace {
    /// ZADD key [NX|XX] [GT|LT] score member [score member ...]
    ///
    /// # Returns
    ///
    /// The number of members added. Re-scored members are not counted but
    /// still mark the keyspace as changed.
    pub fn zadd(
        &mut self,
        key: &str,
        members: &[(impl AsRef<str>, f64)],
        options: ZAddOptions,
    ) -> Result<Outcome<usize>> {
        options.validate()?;
        if members.is_empty() {
            return Err(Error::invalid("wrong number of arguments for 'zadd'"));
        }
        for (_, score) in members {
            check_score(*score)?;
        }

        let zset = self.zset_entry(key)?;
        let mut added = 0;
        let mut mutated = false;
        for (member, score) in members {
            let member = member.as_ref();
            let current = zset.score(member);
            if !options.allows(current, *score) {
                continue;
            }
            if current == Some(*score) {
                continue;
            }
            if zset.insert(member, *score) {
                added += 1;
            }
            mutated = true;
        }
        // NX/XX can leave a freshly created set empty
        self.remove_if_empty(key);
        Ok(Outcome::new(added, mutated))
    }

    /// ZINCRBY key amount member
    pub fn zincrby(&mut self, key: &str, amount: f64, member: &str) -> Result<Outcome<f64>> {
        check_score(amount)?;
        let zset = self.zset_entry(key)?;
        let updated = zset.score(member).unwrap_or(0.0) + amount;
        if updated.is_nan() {
            self.remove_if_empty(key);
            return Err(Error::NotFloat);
        }
        Ok(Outcome::changed(zset.incr(member, amount)))
    }

    /// ZCARD key
    pub fn zcard(&mut self, key: &str) -> Result<usize> {
        Ok(self.zset(key)?.map_or(0, SortedSet::len))
    }

    /// ZCOUNT key min max
    pub fn zcount(&mut self, key: &str, min: f64, max: f64) -> Result<usize> {
        Ok(self.zset(key)?.map_or(0, |zset| zset.count(min, max)))
    }

    /// ZSCORE key member
    pub fn zscore(&mut self, key: &str, member: &str) -> Result<Option<f64>> {
        Ok(self.zset(key)?.and_then(|zset| zset.score(member)))
    }

    /// ZMSCORE key member [member ...]
    pub fn zmscore(&mut self, key: &str, members: &[impl AsRef<str>]) -> Result<Vec<Option<f64>>> {
        let zset = self.zset(key)?;
        Ok(members
            .iter()
            .map(|member| zset.and_then(|zset| zset.score(member.as_ref())))
            .collect())
    }

    /// ZRANK key member
    pub fn zrank(&mut self, key: &str, member: &str) -> Result<Option<usize>> {
        Ok(self.zset(key)?.and_then(|zset| zset.rank(member, false)))
    }

    /// ZREVRANK key member
    pub fn zrevrank(&mut self, key: &str, member: &str) -> Result<Option<usize>> {
        Ok(self.zset(key)?.and_then(|zset| zset.rank(member, true)))
    }

    /// ZRANGE key start end
    pub fn zrange(&mut self, key: &str, start: i64, end: i64) -> Result<Vec<String>> {
        Ok(strip_scores(self.zrange_withscores(key, start, end)?))
    }

    /// ZRANGE key start end WITHSCORES
    pub fn zrange_withscores(&mut self, key: &str, start: i64, end: i64) -> Result<Vec<(String, f64)>> {
        Ok(self
            .zset(key)?
            .map(|zset| zset.range(start, end, None, false))
            .unwrap_or_default())
    }

    /// ZREVRANGE key start end
    pub fn zrevrange(&mut self, key: &str, start: i64, end: i64) -> Result<Vec<String>> {
        Ok(strip_scores(self.zrevrange_withscores(key, start, end)?))
    }

    /// ZREVRANGE key start end WITHSCORES
    pub fn zrevrange_withscores(&mut self, key: &str, start: i64, end: i64) -> Result<Vec<(String, f64)>> {
        Ok(self
            .zset(key)?
            .map(|zset| zset.range(start, end, None, true))
            .unwrap_or_default())
    }

    /// ZRANGEBYSCORE key min max [LIMIT offset count]
    pub fn zrangebyscore(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<(String, f64)>> {
        self.score_window(key, min, max, limit, false)
    }

    /// ZREVRANGEBYSCORE key min max [LIMIT offset count] - highest score first.
    pub fn zrevrangebyscore(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<(String, f64)>> {
        self.score_window(key, min, max, limit, true)
    }

    /// ZPOPMIN key count
    pub fn zpopmin(&mut self, key: &str, count: i64) -> Result<Outcome<Vec<(String, f64)>>> {
        self.zpop(key, PopSide::Min, count)
    }

    /// ZPOPMAX key count
    pub fn zpopmax(&mut self, key: &str, count: i64) -> Result<Outcome<Vec<(String, f64)>>> {
        self.zpop(key, PopSide::Max, count)
    }

    /// ZMPOP key [key ...] MIN|MAX count
    ///
    /// Pops from the first key holding a non-empty sorted set.
    ///
    /// # Returns
    ///
    /// The key popped from and the removed pairs, or `None` if every key is
    /// missing.
    pub fn zmpop(
        &mut self,
        keys: &[impl AsRef<str>],
        side: PopSide,
        count: i64,
    ) -> Result<Outcome<Option<(String, Vec<(String, f64)>)>>> {
        if keys.is_empty() {
            return Err(Error::invalid("at least one key is required"));
        }
        if count < 1 {
            return Err(Error::invalid("count must be positive"));
        }
        for key in keys {
            let key: &str = key.as_ref();
            if self.zset(key)?.is_some_and(|zset| !zset.is_empty()) {
                let popped = self.zpop(key, side, count)?;
                return Ok(Outcome::changed(Some((key.to_string(), popped.value))));
            }
        }
        Ok(Outcome::unchanged(None))
    }

    /// ZREM key member [member ...]
    pub fn zrem(&mut self, key: &str, members: &[impl AsRef<str>]) -> Result<Outcome<usize>> {
        let Some(zset) = self.zset_mut(key)? else {
            return Ok(Outcome::unchanged(0));
        };
        let removed = members
            .iter()
            .filter(|member| zset.remove(member.as_ref()).is_some())
            .count();
        self.remove_if_empty(key);
        Ok(Outcome::new(removed, removed > 0))
    }

    /// ZREMRANGEBYSCORE key min max
    pub fn zremrangebyscore(&mut self, key: &str, min: f64, max: f64) -> Result<Outcome<usize>> {
        let Some(zset) = self.zset_mut(key)? else {
            return Ok(Outcome::unchanged(0));
        };
        if min > max {
            return Ok(Outcome::unchanged(0));
        }
        let doomed: Vec<String> = zset
            .range_by_score(min, max)
            .map(|(member, _)| member.to_string())
            .collect();
        for member in &doomed {
            zset.remove(member);
        }
        self.remove_if_empty(key);
        Ok(Outcome::new(doomed.len(), !doomed.is_empty()))
    }

    /// ZUNION key [key ...]
    pub fn zunion(&mut self, keys: &[impl AsRef<str>]) -> Result<Vec<(String, f64)>> {
        Ok(self.fold_zsets(keys, SortedSet::union)?.into())
    }

    /// ZINTER key [key ...]
    pub fn zinter(&mut self, keys: &[impl AsRef<str>]) -> Result<Vec<(String, f64)>> {
        Ok(self.fold_zsets(keys, SortedSet::intersection)?.into())
    }

    /// ZDIFF key [key ...]
    pub fn zdiff(&mut self, keys: &[impl AsRef<str>]) -> Result<Vec<(String, f64)>> {
        Ok(self.fold_zsets(keys, SortedSet::difference)?.into())
    }

    /// ZINTERCARD key [key ...] [LIMIT limit] - `0` means no limit.
    pub fn zintercard(&mut self, keys: &[impl AsRef<str>], limit: usize) -> Result<usize> {
        let size = self.fold_zsets(keys, SortedSet::intersection)?.len();
        Ok(if limit > 0 { size.min(limit) } else { size })
    }

    /// ZRANDMEMBER key count
    pub fn zrandmember(&mut self, key: &str, count: i64) -> Result<Vec<(String, f64)>> {
        Ok(self
            .zset(key)?
            .map(|zset| zset.random_members(count))
            .unwrap_or_default())
    }

    /// ZSCAN key cursor [COUNT count]
    ///
    /// The cursor is a position in ascending order. A `count` of 0 scans to
    /// the end.
    ///
    /// # Returns
    ///
    /// The next cursor (`0` once the walk is complete) and the pairs seen.
    pub fn zscan(&mut self, key: &str, cursor: usize, count: usize) -> Result<(usize, Vec<(String, f64)>)> {
        let Some(zset) = self.zset(key)? else {
            return Ok((0, Vec::new()));
        };
        let take = if count == 0 { usize::MAX } else { count };
        let page: Vec<(String, f64)> = zset
            .iter()
            .skip(cursor)
            .take(take)
            .map(|(member, score)| (member.to_string(), score))
            .collect();

        let next = cursor.saturating_add(page.len());
        Ok((if next >= zset.len() { 0 } else { next }, page))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn zpop(&mut self, key: &str, side: PopSide, count: i64) -> Result<Outcome<Vec<(String, f64)>>> {
        if count < 1 {
            return Err(Error::invalid("count must be positive"));
        }
        let Some(zset) = self.zset_mut(key)? else {
            return Ok(Outcome::unchanged(Vec::new()));
        };
        let count = usize::try_from(count).unwrap_or(usize::MAX);
        let popped = match side {
            PopSide::Min => zset.pop_min(count),
            PopSide::Max => zset.pop_max(count),
        };
        self.remove_if_empty(key);
        let mutated = !popped.is_empty();
        Ok(Outcome::new(popped, mutated))
    }

    fn score_window(
        &mut self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<(usize, usize)>,
        desc: bool,
    ) -> Result<Vec<(String, f64)>> {
        let Some(zset) = self.zset(key)? else {
            return Ok(Vec::new());
        };
        if min > max {
            return Ok(Vec::new());
        }
        let mut window: Vec<(String, f64)> = zset
            .range_by_score(min, max)
            .map(|(member, score)| (member.to_string(), score))
            .collect();
        if desc {
            window.reverse();
        }
        Ok(match limit {
            Some((offset, count)) => window.into_iter().skip(offset).take(count).collect(),
            None => window,
        })
    }

    /// Left fold over the named sorted sets; missing keys count as empty.
    fn fold_zsets(
        &mut self,
        keys: &[impl AsRef<str>],
        combine: impl Fn(&SortedSet, &SortedSet) -> SortedSet,
    ) -> Result<SortedSet> {
        let Some((first, rest)) = keys.split_first() else {
            return Err(Error::invalid("at least one key is required"));
        };

        let empty = SortedSet::new();
        let mut acc = self.zset(first.as_ref())?.cloned().unwrap_or_default();
        for key in rest {
            let next = self.zset(key.as_ref())?.unwrap_or(&empty);
            acc = combine(&acc, next);
        }
        Ok(acc)
    }
}

fn strip_scores(pairs: Vec<(String, f64)>) -> Vec<String> {
    pairs.into_iter().map(|(member, _)| member).collect()
}
