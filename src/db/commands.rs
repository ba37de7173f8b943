//! The public command surface of [`Database`].
//!
//! Each method locks the database, runs the matching [`Keyspace`] call and,
//! for mutating commands, says which [`Command`] to log when the call
//! changed something. Relative times and random choices are resolved here
//! so the log only ever holds their effect.

use crate::db::Database;
use crate::error::Result;
use crate::persistence::Command;
use crate::storage::{
    unix_now, DataType, ExpireOptions, HashFields, InsertPosition, PopSide, SetOptions, SetOutcome,
    ZAddOptions,
};
use indexmap::IndexMap;
use std::collections::HashSet;

fn owned(items: &[impl AsRef<str>]) -> Vec<String> {
    items.iter().map(|item| item.as_ref().to_string()).collect()
}

fn owned_pairs<K: AsRef<str>, V: AsRef<str>>(pairs: &[(K, V)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
        .collect()
}

impl Database {
    // ========================================================================
    // Keys
    // ========================================================================

    /// Removes `keys`. Returns how many existed.
    pub fn delete(&self, keys: &[impl AsRef<str>]) -> Result<usize> {
        self.write(
            |ks| Ok(ks.delete(keys)),
            |_| Command::Del { keys: owned(keys) },
        )
    }

    /// Counts the live keys among `keys`; repeats count each time.
    pub fn exists(&self, keys: &[impl AsRef<str>]) -> Result<usize> {
        self.read(|ks| Ok(ks.exists(keys)))
    }

    /// Live keys matching a glob `pattern`, sorted.
    pub fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.read(|ks| Ok(ks.keys(pattern)))
    }

    pub fn key_type(&self, key: &str) -> Result<Option<DataType>> {
        self.read(|ks| Ok(ks.key_type(key)))
    }

    pub fn rename(&self, src: &str, dst: &str) -> Result<()> {
        self.write(
            |ks| ks.rename(src, dst),
            |_| Command::Rename {
                src: src.to_string(),
                dst: dst.to_string(),
            },
        )
    }

    pub fn renamenx(&self, src: &str, dst: &str) -> Result<bool> {
        self.write(
            |ks| ks.renamenx(src, dst),
            |_| Command::Rename {
                src: src.to_string(),
                dst: dst.to_string(),
            },
        )
    }

    pub fn copy(&self, src: &str, dst: &str, replace: bool) -> Result<bool> {
        self.write(
            |ks| Ok(ks.copy(src, dst, replace)),
            |_| Command::Copy {
                src: src.to_string(),
                dst: dst.to_string(),
                replace,
            },
        )
    }

    /// The value at `key` as JSON.
    pub fn dump(&self, key: &str) -> Result<Option<String>> {
        self.read(|ks| Ok(ks.dump(key)))
    }

    pub fn randomkey(&self) -> Result<Option<String>> {
        self.read(|ks| Ok(ks.randomkey()))
    }

    pub fn dbsize(&self) -> Result<usize> {
        self.read(|ks| Ok(ks.dbsize()))
    }

    pub fn flushdb(&self) -> Result<()> {
        self.write(|ks| Ok(ks.flushdb()), |_| Command::FlushDb)
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    fn expire_record(key: &str, at: f64) -> Command {
        Command::ExpireAt {
            key: key.to_string(),
            at,
        }
    }

    /// Sets a timeout of `seconds` on `key`.
    ///
    /// # Returns
    ///
    /// `false` when the key is missing or `options` rejected the change.
    pub fn expire(&self, key: &str, seconds: i64, options: ExpireOptions) -> Result<bool> {
        self.expireat_secs(key, unix_now() + seconds as f64, options)
    }

    /// Sets the deadline of `key` to a unix `timestamp` in seconds.
    pub fn expireat(&self, key: &str, timestamp: i64, options: ExpireOptions) -> Result<bool> {
        self.expireat_secs(key, timestamp as f64, options)
    }

    /// Like [`Database::expire`] in milliseconds.
    pub fn pexpire(&self, key: &str, millis: i64, options: ExpireOptions) -> Result<bool> {
        self.expireat_secs(key, unix_now() + millis as f64 / 1000.0, options)
    }

    /// Like [`Database::expireat`] with a timestamp in milliseconds.
    pub fn pexpireat(&self, key: &str, timestamp_ms: i64, options: ExpireOptions) -> Result<bool> {
        self.expireat_secs(key, timestamp_ms as f64 / 1000.0, options)
    }

    fn expireat_secs(&self, key: &str, at: f64, options: ExpireOptions) -> Result<bool> {
        self.write(
            |ks| ks.expire_at(key, at, options),
            |_| Self::expire_record(key, at),
        )
    }

    /// Seconds left: `-2` for a missing key, `-1` without expiry.
    pub fn ttl(&self, key: &str) -> Result<i64> {
        self.read(|ks| Ok(ks.ttl(key)))
    }

    pub fn pttl(&self, key: &str) -> Result<i64> {
        self.read(|ks| Ok(ks.pttl(key)))
    }

    pub fn expiretime(&self, key: &str) -> Result<i64> {
        self.read(|ks| Ok(ks.expiretime(key)))
    }

    pub fn persist(&self, key: &str) -> Result<bool> {
        self.write(
            |ks| Ok(ks.persist(key)),
            |_| Command::Persist {
                key: key.to_string(),
            },
        )
    }

    // ========================================================================
    // Strings
    // ========================================================================

    /// Sets `key` to `value`.
    ///
    /// A relative `EX` is turned into an absolute deadline before anything
    /// runs, so the stored deadline and the logged one are the same.
    pub fn set(&self, key: &str, value: &str, options: &SetOptions) -> Result<SetOutcome> {
        options.validate()?;
        let options = options.resolved(unix_now());
        self.write(
            |ks| ks.set(key, value, &options),
            |_| Command::Set {
                key: key.to_string(),
                value: value.to_string(),
                expire_at: options.exat,
            },
        )
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.read(|ks| ks.get(key))
    }

    /// Appends to the string at `key`. Returns the new length in characters.
    pub fn append(&self, key: &str, value: &str) -> Result<usize> {
        self.write(
            |ks| ks.append(key, value),
            |_| Command::Append {
                key: key.to_string(),
                value: value.to_string(),
            },
        )
    }

    fn incr_record(key: &str, delta: i64) -> Command {
        Command::IncrBy {
            key: key.to_string(),
            delta,
        }
    }

    pub fn incr(&self, key: &str) -> Result<i64> {
        self.write(|ks| ks.incr(key), |_| Self::incr_record(key, 1))
    }

    pub fn incrby(&self, key: &str, delta: i64) -> Result<i64> {
        self.write(|ks| ks.incrby(key, delta), |_| Self::incr_record(key, delta))
    }

    pub fn decr(&self, key: &str) -> Result<i64> {
        self.write(|ks| ks.decr(key), |_| Self::incr_record(key, -1))
    }

    /// `delta` must not be `i64::MIN`; that fails with `Overflow`.
    pub fn decrby(&self, key: &str, delta: i64) -> Result<i64> {
        self.write(
            |ks| ks.decrby(key, delta),
            // decrby already rejected a delta with no negation
            |_| Self::incr_record(key, delta.wrapping_neg()),
        )
    }

    pub fn incrbyfloat(&self, key: &str, delta: f64) -> Result<f64> {
        self.write(
            |ks| ks.incrbyfloat(key, delta),
            |_| Command::IncrByFloat {
                key: key.to_string(),
                delta,
            },
        )
    }

    /// Inclusive character range; negative indices count from the end.
    pub fn getrange(&self, key: &str, start: i64, end: i64) -> Result<String> {
        self.read(|ks| ks.getrange(key, start, end))
    }

    /// Alias of [`Database::getrange`].
    pub fn substr(&self, key: &str, start: i64, end: i64) -> Result<String> {
        self.getrange(key, start, end)
    }

    pub fn strlen(&self, key: &str) -> Result<usize> {
        self.read(|ks| ks.strlen(key))
    }

    pub fn mget(&self, keys: &[impl AsRef<str>]) -> Result<Vec<Option<String>>> {
        self.read(|ks| Ok(ks.mget(keys)))
    }

    pub fn mset<K: AsRef<str>, V: AsRef<str>>(&self, pairs: &[(K, V)]) -> Result<()> {
        self.write(
            |ks| Ok(ks.mset(pairs)),
            |_| Command::MSet {
                pairs: owned_pairs(pairs),
            },
        )
    }

    /// Sets every pair, or nothing at all if any of the keys exists.
    pub fn msetnx<K: AsRef<str>, V: AsRef<str>>(&self, pairs: &[(K, V)]) -> Result<bool> {
        self.write(
            |ks| Ok(ks.msetnx(pairs)),
            |_| Command::MSet {
                pairs: owned_pairs(pairs),
            },
        )
    }

    // ========================================================================
    // Lists
    // ========================================================================

    fn push_record(key: &str, values: &[impl AsRef<str>], left: bool) -> Command {
        let key = key.to_string();
        let values = owned(values);
        if left {
            Command::LPush { key, values }
        } else {
            Command::RPush { key, values }
        }
    }

    pub fn lpush(&self, key: &str, values: &[impl AsRef<str>]) -> Result<usize> {
        self.write(
            |ks| ks.lpush(key, values),
            |_| Self::push_record(key, values, true),
        )
    }

    pub fn rpush(&self, key: &str, values: &[impl AsRef<str>]) -> Result<usize> {
        self.write(
            |ks| ks.rpush(key, values),
            |_| Self::push_record(key, values, false),
        )
    }

    /// Pushes only onto an existing list. Returns 0 when the key is missing.
    pub fn lpushx(&self, key: &str, values: &[impl AsRef<str>]) -> Result<usize> {
        self.write(
            |ks| ks.lpushx(key, values),
            |_| Self::push_record(key, values, true),
        )
    }

    pub fn rpushx(&self, key: &str, values: &[impl AsRef<str>]) -> Result<usize> {
        self.write(
            |ks| ks.rpushx(key, values),
            |_| Self::push_record(key, values, false),
        )
    }

    pub fn lpop(&self, key: &str) -> Result<Option<String>> {
        self.write(
            |ks| ks.lpop(key),
            |_| Command::LPop {
                key: key.to_string(),
                count: 1,
            },
        )
    }

    pub fn rpop(&self, key: &str) -> Result<Option<String>> {
        self.write(
            |ks| ks.rpop(key),
            |_| Command::RPop {
                key: key.to_string(),
                count: 1,
            },
        )
    }

    pub fn lpop_count(&self, key: &str, count: usize) -> Result<Option<Vec<String>>> {
        self.write(
            |ks| ks.lpop_count(key, count),
            |popped| Command::LPop {
                key: key.to_string(),
                count: popped.as_ref().map_or(0, Vec::len),
            },
        )
    }

    pub fn rpop_count(&self, key: &str, count: usize) -> Result<Option<Vec<String>>> {
        self.write(
            |ks| ks.rpop_count(key, count),
            |popped| Command::RPop {
                key: key.to_string(),
                count: popped.as_ref().map_or(0, Vec::len),
            },
        )
    }

    pub fn lindex(&self, key: &str, index: i64) -> Result<Option<String>> {
        self.read(|ks| ks.lindex(key, index))
    }

    pub fn llen(&self, key: &str) -> Result<usize> {
        self.read(|ks| ks.llen(key))
    }

    pub fn lrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>> {
        self.read(|ks| ks.lrange(key, start, end))
    }

    pub fn ltrim(&self, key: &str, start: i64, end: i64) -> Result<()> {
        self.write(
            |ks| ks.ltrim(key, start, end),
            |_| Command::LTrim {
                key: key.to_string(),
                start,
                end,
            },
        )
    }

    /// Inserts `value` next to the first `pivot`.
    ///
    /// # Returns
    ///
    /// The new length, or `-1` when the key or the pivot is missing.
    pub fn linsert(
        &self,
        key: &str,
        position: InsertPosition,
        pivot: &str,
        value: &str,
    ) -> Result<i64> {
        self.write(
            |ks| ks.linsert(key, position, pivot, value),
            |_| Command::LInsert {
                key: key.to_string(),
                position,
                pivot: pivot.to_string(),
                value: value.to_string(),
            },
        )
    }

    pub fn lrem(&self, key: &str, count: i64, value: &str) -> Result<usize> {
        self.write(
            |ks| ks.lrem(key, count, value),
            |_| Command::LRem {
                key: key.to_string(),
                count,
                value: value.to_string(),
            },
        )
    }

    pub fn lset(&self, key: &str, index: i64, value: &str) -> Result<()> {
        self.write(
            |ks| ks.lset(key, index, value),
            |_| Command::LSet {
                key: key.to_string(),
                index,
                value: value.to_string(),
            },
        )
    }

    /// Sorts the list in place and returns it.
    pub fn lsort(&self, key: &str, desc: bool) -> Result<Vec<String>> {
        self.write(
            |ks| ks.lsort(key, desc),
            |_| Command::LSort {
                key: key.to_string(),
                desc,
            },
        )
    }

    // ========================================================================
    // Sets
    // ========================================================================

    pub fn sadd(&self, key: &str, members: &[impl AsRef<str>]) -> Result<usize> {
        self.write(
            |ks| ks.sadd(key, members),
            |_| Command::SAdd {
                key: key.to_string(),
                members: owned(members),
            },
        )
    }

    pub fn srem(&self, key: &str, members: &[impl AsRef<str>]) -> Result<usize> {
        self.write(
            |ks| ks.srem(key, members),
            |_| Command::SRem {
                key: key.to_string(),
                members: owned(members),
            },
        )
    }

    pub fn scard(&self, key: &str) -> Result<usize> {
        self.read(|ks| ks.scard(key))
    }

    pub fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.read(|ks| ks.sismember(key, member))
    }

    pub fn smismember(&self, key: &str, members: &[impl AsRef<str>]) -> Result<Vec<bool>> {
        self.read(|ks| ks.smismember(key, members))
    }

    pub fn smembers(&self, key: &str) -> Result<HashSet<String>> {
        self.read(|ks| ks.smembers(key))
    }

    pub fn sinter(&self, keys: &[impl AsRef<str>]) -> Result<HashSet<String>> {
        self.read(|ks| ks.sinter(keys))
    }

    pub fn sunion(&self, keys: &[impl AsRef<str>]) -> Result<HashSet<String>> {
        self.read(|ks| ks.sunion(keys))
    }

    pub fn sdiff(&self, keys: &[impl AsRef<str>]) -> Result<HashSet<String>> {
        self.read(|ks| ks.sdiff(keys))
    }

    pub fn smove(&self, src: &str, dst: &str, member: &str) -> Result<bool> {
        self.write(
            |ks| ks.smove(src, dst, member),
            |_| Command::SMove {
                src: src.to_string(),
                dst: dst.to_string(),
                member: member.to_string(),
            },
        )
    }

    /// Removes one random member. Logged as `SREM` of that member.
    pub fn spop(&self, key: &str) -> Result<Option<String>> {
        self.write(
            |ks| ks.spop(key),
            |popped| {
                popped.as_ref().map(|member| Command::SRem {
                    key: key.to_string(),
                    members: vec![member.clone()],
                })
            },
        )
    }

    /// Removes up to `count` random members.
    pub fn spop_count(&self, key: &str, count: usize) -> Result<Vec<String>> {
        self.write(
            |ks| ks.spop_count(key, count),
            |popped| Command::SRem {
                key: key.to_string(),
                members: popped.clone(),
            },
        )
    }

    pub fn srandmember(&self, key: &str) -> Result<Option<String>> {
        self.read(|ks| ks.srandmember(key))
    }

    /// `count > 0` gives distinct members, `count < 0` may repeat.
    pub fn srandmember_count(&self, key: &str, count: i64) -> Result<Vec<String>> {
        self.read(|ks| ks.srandmember_count(key, count))
    }

    // ========================================================================
    // Hashes
    // ========================================================================

    /// Sets hash fields. Returns how many fields are new.
    pub fn hset(&self, key: &str, fields: &HashFields) -> Result<usize> {
        self.write(
            |ks| ks.hset(key, fields),
            |_| Command::HSet {
                key: key.to_string(),
                pairs: fields
                    .pairs()
                    .map(|(f, v)| (f.to_string(), v.to_string()))
                    .collect(),
            },
        )
    }

    pub fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        self.write(
            |ks| ks.hsetnx(key, field, value),
            |_| Command::HSet {
                key: key.to_string(),
                pairs: vec![(field.to_string(), value.to_string())],
            },
        )
    }

    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.read(|ks| ks.hget(key, field))
    }

    pub fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.read(|ks| ks.hexists(key, field))
    }

    pub fn hlen(&self, key: &str) -> Result<usize> {
        self.read(|ks| ks.hlen(key))
    }

    pub fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        self.read(|ks| ks.hkeys(key))
    }

    pub fn hvals(&self, key: &str) -> Result<Vec<String>> {
        self.read(|ks| ks.hvals(key))
    }

    /// All fields and values in insertion order.
    pub fn hgetall(&self, key: &str) -> Result<IndexMap<String, String>> {
        self.read(|ks| ks.hgetall(key))
    }

    pub fn hstrlen(&self, key: &str, field: &str) -> Result<usize> {
        self.read(|ks| ks.hstrlen(key, field))
    }

    pub fn hmget(&self, key: &str, fields: &[impl AsRef<str>]) -> Result<Vec<Option<String>>> {
        self.read(|ks| ks.hmget(key, fields))
    }

    pub fn hdel(&self, key: &str, fields: &[impl AsRef<str>]) -> Result<usize> {
        self.write(
            |ks| ks.hdel(key, fields),
            |_| Command::HDel {
                key: key.to_string(),
                fields: owned(fields),
            },
        )
    }

    pub fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.write(
            |ks| ks.hincrby(key, field, delta),
            |_| Command::HIncrBy {
                key: key.to_string(),
                field: field.to_string(),
                delta,
            },
        )
    }

    pub fn hincrbyfloat(&self, key: &str, field: &str, delta: f64) -> Result<f64> {
        self.write(
            |ks| ks.hincrbyfloat(key, field, delta),
            |_| Command::HIncrByFloat {
                key: key.to_string(),
                field: field.to_string(),
                delta,
            },
        )
    }

    // ========================================================================
    // Sorted sets
    // ========================================================================

    /// Adds or re-scores members. Returns how many members are new.
    pub fn zadd(
        &self,
        key: &str,
        members: &[(impl AsRef<str>, f64)],
        options: ZAddOptions,
    ) -> Result<usize> {
        self.write(
            |ks| ks.zadd(key, members, options),
            |_| Command::ZAdd {
                key: key.to_string(),
                options,
                members: members
                    .iter()
                    .map(|(member, score)| (member.as_ref().to_string(), *score))
                    .collect(),
            },
        )
    }

    /// Adds `amount` to the score of `member`. Returns the new score.
    pub fn zincrby(&self, key: &str, amount: f64, member: &str) -> Result<f64> {
        self.write(
            |ks| ks.zincrby(key, amount, member),
            |_| Command::ZIncrBy {
                key: key.to_string(),
                amount,
                member: member.to_string(),
            },
        )
    }

    pub fn zcard(&self, key: &str) -> Result<usize> {
        self.read(|ks| ks.zcard(key))
    }

    pub fn zcount(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        self.read(|ks| ks.zcount(key, min, max))
    }

    pub fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.read(|ks| ks.zscore(key, member))
    }

    pub fn zmscore(&self, key: &str, members: &[impl AsRef<str>]) -> Result<Vec<Option<f64>>> {
        self.read(|ks| ks.zmscore(key, members))
    }

    pub fn zrank(&self, key: &str, member: &str) -> Result<Option<usize>> {
        self.read(|ks| ks.zrank(key, member))
    }

    pub fn zrevrank(&self, key: &str, member: &str) -> Result<Option<usize>> {
        self.read(|ks| ks.zrevrank(key, member))
    }

    pub fn zrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>> {
        self.read(|ks| ks.zrange(key, start, end))
    }

    pub fn zrange_withscores(&self, key: &str, start: i64, end: i64) -> Result<Vec<(String, f64)>> {
        self.read(|ks| ks.zrange_withscores(key, start, end))
    }

    pub fn zrevrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>> {
        self.read(|ks| ks.zrevrange(key, start, end))
    }

    pub fn zrevrange_withscores(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<(String, f64)>> {
        self.read(|ks| ks.zrevrange_withscores(key, start, end))
    }

    /// Members with a score in `[min, max]`, optionally sliced by
    /// `(offset, count)`.
    pub fn zrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<(String, f64)>> {
        self.read(|ks| ks.zrangebyscore(key, min, max, limit))
    }

    /// Like [`Database::zrangebyscore`], highest score first.
    pub fn zrevrangebyscore(
        &self,
        key: &str,
        min: f64,
        max: f64,
        limit: Option<(usize, usize)>,
    ) -> Result<Vec<(String, f64)>> {
        self.read(|ks| ks.zrevrangebyscore(key, min, max, limit))
    }

    fn zpop_record(key: &str, side: PopSide, popped: &[(String, f64)]) -> Option<Command> {
        (!popped.is_empty()).then(|| Command::ZPop {
            key: key.to_string(),
            side,
            count: popped.len(),
        })
    }

    pub fn zpopmin(&self, key: &str, count: i64) -> Result<Vec<(String, f64)>> {
        self.write(
            |ks| ks.zpopmin(key, count),
            |popped| Self::zpop_record(key, PopSide::Min, popped),
        )
    }

    pub fn zpopmax(&self, key: &str, count: i64) -> Result<Vec<(String, f64)>> {
        self.write(
            |ks| ks.zpopmax(key, count),
            |popped| Self::zpop_record(key, PopSide::Max, popped),
        )
    }

    /// Pops from the first of `keys` that holds a non-empty sorted set.
    /// Logged as a plain pop on the key that was chosen.
    pub fn zmpop(
        &self,
        keys: &[impl AsRef<str>],
        side: PopSide,
        count: i64,
    ) -> Result<Option<(String, Vec<(String, f64)>)>> {
        self.write(
            |ks| ks.zmpop(keys, side, count),
            |popped| {
                popped
                    .as_ref()
                    .and_then(|(key, pairs)| Self::zpop_record(key, side, pairs))
            },
        )
    }

    pub fn zrem(&self, key: &str, members: &[impl AsRef<str>]) -> Result<usize> {
        self.write(
            |ks| ks.zrem(key, members),
            |_| Command::ZRem {
                key: key.to_string(),
                members: owned(members),
            },
        )
    }

    pub fn zremrangebyscore(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        self.write(
            |ks| ks.zremrangebyscore(key, min, max),
            |_| Command::ZRemRangeByScore {
                key: key.to_string(),
                min,
                max,
            },
        )
    }

    pub fn zunion(&self, keys: &[impl AsRef<str>]) -> Result<Vec<(String, f64)>> {
        self.read(|ks| ks.zunion(keys))
    }

    pub fn zinter(&self, keys: &[impl AsRef<str>]) -> Result<Vec<(String, f64)>> {
        self.read(|ks| ks.zinter(keys))
    }

    pub fn zdiff(&self, keys: &[impl AsRef<str>]) -> Result<Vec<(String, f64)>> {
        self.read(|ks| ks.zdiff(keys))
    }

    /// Size of the intersection, capped at `limit` unless it is 0.
    pub fn zintercard(&self, keys: &[impl AsRef<str>], limit: usize) -> Result<usize> {
        self.read(|ks| ks.zintercard(keys, limit))
    }

    pub fn zrandmember(&self, key: &str, count: i64) -> Result<Vec<(String, f64)>> {
        self.read(|ks| ks.zrandmember(key, count))
    }

    /// Walks the set in score order, `count` members at a time (0 = all).
    ///
    /// # Returns
    ///
    /// The cursor for the next call (0 once finished) and this page.
    pub fn zscan(&self, key: &str, cursor: usize, count: usize) -> Result<(usize, Vec<(String, f64)>)> {
        self.read(|ks| ks.zscan(key, cursor, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AofFsync, Config, Persistence};
    use crate::error::Error;
    use crate::persistence::parse_frame;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    fn open_logged() -> (TempDir, Arc<Database>) {
        let dir = tempdir().unwrap();
        let db = Database::open(
            Config::new()
                .data_dir(dir.path())
                .db_name("journal")
                .persistence(Persistence::Aof)
                .aof_fsync(AofFsync::Always)
                .singleton(false),
        )
        .unwrap();
        (dir, db)
    }

    fn logged(path: &Path) -> Vec<Command> {
        let data = std::fs::read(path).unwrap();
        let mut offset = 0;
        let mut records = Vec::new();
        while let Some((frame, used)) = parse_frame(&data[offset..]).unwrap() {
            records.push(Command::from_frame(frame).unwrap());
            offset += used;
        }
        records
    }

    #[test]
    fn test_expire_is_logged_as_absolute() {
        let (_dir, db) = open_logged();
        db.set("k", "v", &SetOptions::default()).unwrap();
        assert!(db.expire("k", 100, ExpireOptions::default()).unwrap());

        let records = logged(&db.config().aof_path());
        let Command::ExpireAt { key, at } = &records[1] else {
            panic!("expected EXPIREAT, got {:?}", records[1]);
        };
        assert_eq!(key, "k");
        assert!((at - (unix_now() + 100.0)).abs() < 5.0);
        assert_eq!(db.expiretime("k").unwrap(), *at as i64);
    }

    #[test]
    fn test_set_ex_is_logged_with_exat() {
        let (_dir, db) = open_logged();
        db.set("k", "v", &SetOptions::new().ex(60)).unwrap();

        let records = logged(&db.config().aof_path());
        let Command::Set { expire_at: Some(at), .. } = &records[0] else {
            panic!("expected SET with EXAT, got {:?}", records[0]);
        };
        assert_eq!(db.expiretime("k").unwrap(), *at as i64);
    }

    #[test]
    fn test_set_rejects_non_positive_ex() {
        let (_dir, db) = open_logged();
        assert!(matches!(
            db.set("k", "v", &SetOptions::new().ex(-5)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            db.set("k", "v", &SetOptions::new().ex(0)),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(db.get("k").unwrap(), None);
        assert!(logged(&db.config().aof_path()).is_empty());
    }

    #[test]
    fn test_expired_keys_are_logged_as_del() {
        let (_dir, db) = open_logged();
        db.set("k", "v", &SetOptions::default()).unwrap();
        db.pexpire("k", 1, ExpireOptions::default()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(db.get("k").unwrap(), None);

        // A past deadline removes the key right away
        db.set("p", "v", &SetOptions::default()).unwrap();
        assert!(db.expireat("p", 1, ExpireOptions::default()).unwrap());

        let records = logged(&db.config().aof_path());
        assert_eq!(records[2], Command::Del { keys: vec!["k".to_string()] });
        assert_eq!(records[4], Command::Del { keys: vec!["p".to_string()] });
        assert!(matches!(&records[5], Command::ExpireAt { key, .. } if key == "p"));
    }

    #[test]
    fn test_spop_is_logged_as_srem() {
        let (_dir, db) = open_logged();
        db.sadd("s", &["a", "b", "c"]).unwrap();
        let popped = db.spop("s").unwrap().unwrap();

        let records = logged(&db.config().aof_path());
        assert_eq!(
            records[1],
            Command::SRem {
                key: "s".to_string(),
                members: vec![popped],
            }
        );
    }

    #[test]
    fn test_conditional_writes_logged_plain() {
        let (_dir, db) = open_logged();
        assert!(db.msetnx(&[("a", "1"), ("b", "2")]).unwrap());
        assert!(!db.msetnx(&[("b", "3"), ("c", "4")]).unwrap());
        assert!(db.renamenx("a", "z").unwrap());
        assert_eq!(db.decrby("n", 5).unwrap(), -5);

        let names: Vec<&str> = logged(&db.config().aof_path())
            .iter()
            .map(Command::name)
            .collect();
        assert_eq!(names, vec!["MSET", "RENAME", "INCRBY"]);
    }

    #[test]
    fn test_zmpop_logged_as_pop_on_chosen_key() {
        let (_dir, db) = open_logged();
        db.zadd("z2", &[("a", 1.0), ("b", 2.0), ("c", 3.0)], ZAddOptions::default())
            .unwrap();
        let (key, popped) = db.zmpop(&["z1", "z2"], PopSide::Max, 2).unwrap().unwrap();
        assert_eq!(key, "z2");
        assert_eq!(popped, vec![("c".to_string(), 3.0), ("b".to_string(), 2.0)]);

        let records = logged(&db.config().aof_path());
        assert_eq!(
            records[1],
            Command::ZPop {
                key: "z2".to_string(),
                side: PopSide::Max,
                count: 2,
            }
        );
    }

    #[test]
    fn test_failed_and_noop_calls_not_logged() {
        let (_dir, db) = open_logged();
        db.set("s", "text", &SetOptions::default()).unwrap();
        assert!(matches!(db.lpush("s", &["x"]), Err(Error::WrongType { .. })));
        assert!(matches!(db.incr("s"), Err(Error::NotInteger)));
        assert!(!db.set("s", "other", &SetOptions::new().nx()).unwrap().applied);
        assert_eq!(db.linsert("nolist", InsertPosition::Before, "p", "v").unwrap(), -1);
        assert_eq!(db.spop("noset").unwrap(), None);
        assert_eq!(db.zmpop(&["none"], PopSide::Min, 1).unwrap(), None);

        assert_eq!(logged(&db.config().aof_path()).len(), 1);
    }

    #[test]
    fn test_hash_and_list_roundtrip_through_database() {
        let (_dir, db) = open_logged();
        assert_eq!(
            db.hset("h", &HashFields::new().field("a", "1").mapping([("b", "2")]))
                .unwrap(),
            2
        );
        assert!(!db.hsetnx("h", "a", "9").unwrap());
        assert_eq!(db.hincrby("h", "a", 4).unwrap(), 5);
        assert_eq!(db.hgetall("h").unwrap().len(), 2);

        db.rpush("l", &["c", "a", "b"]).unwrap();
        assert_eq!(db.lsort("l", false).unwrap(), vec!["a", "b", "c"]);
        assert_eq!(db.lpop_count("l", 5).unwrap().unwrap().len(), 3);
        assert_eq!(db.key_type("l").unwrap(), None);
        assert_eq!(db.substr("missing", 0, -1).unwrap(), "");
    }
}
