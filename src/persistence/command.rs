//! Log records.
//!
//! A [`Command`] is one state change in replayable form. The database builds
//! one after a mutating call succeeds and appends it to the log; replay
//! decodes the records and applies them to a [`Keyspace`] in order.
//!
//! Records always describe the effect, never the request:
//!
//! - relative deadlines are already absolute (`EXPIREAT`, `SET .. EXAT`)
//! - random choices are already made (`SPOP` arrives as `SREM`)
//! - conditional writes that went through are unconditional (`MSETNX` is
//!   logged as `MSET`, `RENAMENX` as `RENAME`)
//!
//! so replaying the same log always rebuilds the same keyspace.

use crate::error::{Error, Result};
use crate::persistence::Frame;
use crate::storage::{
    ExpireOptions, HashFields, InsertPosition, Keyspace, PopSide, SetOptions, ZAddOptions,
};
use std::iter::Peekable;
use std::vec;

/// A replayable mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Del { keys: Vec<String> },
    Rename { src: String, dst: String },
    Copy { src: String, dst: String, replace: bool },
    FlushDb,
    ExpireAt { key: String, at: f64 },
    Persist { key: String },

    Set { key: String, value: String, expire_at: Option<f64> },
    Append { key: String, value: String },
    IncrBy { key: String, delta: i64 },
    IncrByFloat { key: String, delta: f64 },
    MSet { pairs: Vec<(String, String)> },

    LPush { key: String, values: Vec<String> },
    RPush { key: String, values: Vec<String> },
    LPop { key: String, count: usize },
    RPop { key: String, count: usize },
    LTrim { key: String, start: i64, end: i64 },
    LInsert { key: String, position: InsertPosition, pivot: String, value: String },
    LRem { key: String, count: i64, value: String },
    LSet { key: String, index: i64, value: String },
    LSort { key: String, desc: bool },

    SAdd { key: String, members: Vec<String> },
    SRem { key: String, members: Vec<String> },
    SMove { src: String, dst: String, member: String },

    HSet { key: String, pairs: Vec<(String, String)> },
    HDel { key: String, fields: Vec<String> },
    HIncrBy { key: String, field: String, delta: i64 },
    HIncrByFloat { key: String, field: String, delta: f64 },

    ZAdd { key: String, options: ZAddOptions, members: Vec<(String, f64)> },
    ZIncrBy { key: String, amount: f64, member: String },
    ZRem { key: String, members: Vec<String> },
    ZRemRangeByScore { key: String, min: f64, max: f64 },
    ZPop { key: String, side: PopSide, count: usize },
}

impl Command {
    /// The command name as written to the log.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Del { .. } => "DEL",
            Command::Rename { .. } => "RENAME",
            Command::Copy { .. } => "COPY",
            Command::FlushDb => "FLUSHDB",
            Command::ExpireAt { .. } => "EXPIREAT",
            Command::Persist { .. } => "PERSIST",
            Command::Set { .. } => "SET",
            Command::Append { .. } => "APPEND",
            Command::IncrBy { .. } => "INCRBY",
            Command::IncrByFloat { .. } => "INCRBYFLOAT",
            Command::MSet { .. } => "MSET",
            Command::LPush { .. } => "LPUSH",
            Command::RPush { .. } => "RPUSH",
            Command::LPop { .. } => "LPOP",
            Command::RPop { .. } => "RPOP",
            Command::LTrim { .. } => "LTRIM",
            Command::LInsert { .. } => "LINSERT",
            Command::LRem { .. } => "LREM",
            Command::LSet { .. } => "LSET",
            Command::LSort { .. } => "LSORT",
            Command::SAdd { .. } => "SADD",
            Command::SRem { .. } => "SREM",
            Command::SMove { .. } => "SMOVE",
            Command::HSet { .. } => "HSET",
            Command::HDel { .. } => "HDEL",
            Command::HIncrBy { .. } => "HINCRBY",
            Command::HIncrByFloat { .. } => "HINCRBYFLOAT",
            Command::ZAdd { .. } => "ZADD",
            Command::ZIncrBy { .. } => "ZINCRBY",
            Command::ZRem { .. } => "ZREM",
            Command::ZRemRangeByScore { .. } => "ZREMRANGEBYSCORE",
            Command::ZPop { side: PopSide::Min, .. } => "ZPOPMIN",
            Command::ZPop { side: PopSide::Max, .. } => "ZPOPMAX",
        }
    }

    /// Name followed by the arguments, as text.
    pub fn args(&self) -> Vec<String> {
        let mut out = vec![self.name().to_string()];
        match self {
            Command::Del { keys } => out.extend(keys.iter().cloned()),
            Command::Rename { src, dst } => out.extend([src.clone(), dst.clone()]),
            Command::Copy { src, dst, replace } => {
                out.extend([src.clone(), dst.clone()]);
                if *replace {
                    out.push("REPLACE".to_string());
                }
            }
            Command::FlushDb => {}
            Command::ExpireAt { key, at } => out.extend([key.clone(), at.to_string()]),
            Command::Persist { key } => out.push(key.clone()),
            Command::Set { key, value, expire_at } => {
                out.extend([key.clone(), value.clone()]);
                if let Some(at) = expire_at {
                    out.extend(["EXAT".to_string(), at.to_string()]);
                }
            }
            Command::Append { key, value } => out.extend([key.clone(), value.clone()]),
            Command::IncrBy { key, delta } => out.extend([key.clone(), delta.to_string()]),
            Command::IncrByFloat { key, delta } => out.extend([key.clone(), delta.to_string()]),
            Command::MSet { pairs } => {
                for (key, value) in pairs {
                    out.extend([key.clone(), value.clone()]);
                }
            }
            Command::LPush { key, values } | Command::RPush { key, values } => {
                out.push(key.clone());
                out.extend(values.iter().cloned());
            }
            Command::LPop { key, count } | Command::RPop { key, count } => {
                out.extend([key.clone(), count.to_string()])
            }
            Command::LTrim { key, start, end } => {
                out.extend([key.clone(), start.to_string(), end.to_string()])
            }
            Command::LInsert { key, position, pivot, value } => out.extend([
                key.clone(),
                position.to_string(),
                pivot.clone(),
                value.clone(),
            ]),
            Command::LRem { key, count, value } => {
                out.extend([key.clone(), count.to_string(), value.clone()])
            }
            Command::LSet { key, index, value } => {
                out.extend([key.clone(), index.to_string(), value.clone()])
            }
            Command::LSort { key, desc } => {
                out.push(key.clone());
                if *desc {
                    out.push("DESC".to_string());
                }
            }
            Command::SAdd { key, members }
            | Command::SRem { key, members }
            | Command::ZRem { key, members } => {
                out.push(key.clone());
                out.extend(members.iter().cloned());
            }
            Command::SMove { src, dst, member } => {
                out.extend([src.clone(), dst.clone(), member.clone()])
            }
            Command::HSet { key, pairs } => {
                out.push(key.clone());
                for (field, value) in pairs {
                    out.extend([field.clone(), value.clone()]);
                }
            }
            Command::HDel { key, fields } => {
                out.push(key.clone());
                out.extend(fields.iter().cloned());
            }
            Command::HIncrBy { key, field, delta } => {
                out.extend([key.clone(), field.clone(), delta.to_string()])
            }
            Command::HIncrByFloat { key, field, delta } => {
                out.extend([key.clone(), field.clone(), delta.to_string()])
            }
            Command::ZAdd { key, options, members } => {
                out.push(key.clone());
                for (set, flag) in [
                    (options.nx, "NX"),
                    (options.xx, "XX"),
                    (options.gt, "GT"),
                    (options.lt, "LT"),
                ] {
                    if set {
                        out.push(flag.to_string());
                    }
                }
                for (member, score) in members {
                    out.extend([score.to_string(), member.clone()]);
                }
            }
            Command::ZIncrBy { key, amount, member } => {
                out.extend([key.clone(), amount.to_string(), member.clone()])
            }
            Command::ZRemRangeByScore { key, min, max } => {
                out.extend([key.clone(), min.to_string(), max.to_string()])
            }
            Command::ZPop { key, count, .. } => out.extend([key.clone(), count.to_string()]),
        }
        out
    }

    /// Encodes the record as an array of bulk strings.
    pub fn to_frame(&self) -> Frame {
        Frame::strings(self.args())
    }

    /// Decodes a record read back from the log.
    pub fn from_frame(frame: Frame) -> Result<Command> {
        let items = frame
            .into_array()
            .ok_or_else(|| Error::MalformedRecord("record is not an array".to_string()))?;

        let mut words = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str() {
                Some(word) => words.push(word.to_string()),
                None => {
                    return Err(Error::MalformedRecord(format!(
                        "record element is not text: {:?}",
                        item
                    )))
                }
            }
        }

        let mut words = words.into_iter();
        let name = words
            .next()
            .ok_or_else(|| Error::MalformedRecord("empty record".to_string()))?
            .to_ascii_uppercase();
        let mut args = ArgReader::new(&name, words.collect(), Error::MalformedRecord);
        let command = Self::decode(&name, &mut args)?;
        args.finish()?;
        Ok(command)
    }

    fn decode(name: &str, args: &mut ArgReader) -> Result<Command> {
        let command = match name {
            "DEL" => Command::Del { keys: args.rest_nonempty()? },
            "RENAME" => Command::Rename { src: args.string()?, dst: args.string()? },
            "COPY" => Command::Copy {
                src: args.string()?,
                dst: args.string()?,
                replace: args.flag("REPLACE"),
            },
            "FLUSHDB" => Command::FlushDb,
            "EXPIREAT" => Command::ExpireAt { key: args.string()?, at: args.float()? },
            "PERSIST" => Command::Persist { key: args.string()? },
            "SET" => {
                let key = args.string()?;
                let value = args.string()?;
                let expire_at = if args.flag("EXAT") { Some(args.float()?) } else { None };
                Command::Set { key, value, expire_at }
            }
            "APPEND" => Command::Append { key: args.string()?, value: args.string()? },
            "INCRBY" => Command::IncrBy { key: args.string()?, delta: args.int()? },
            "INCRBYFLOAT" => Command::IncrByFloat { key: args.string()?, delta: args.float()? },
            "MSET" => Command::MSet { pairs: args.rest_pairs()? },
            "LPUSH" => Command::LPush { key: args.string()?, values: args.rest_nonempty()? },
            "RPUSH" => Command::RPush { key: args.string()?, values: args.rest_nonempty()? },
            "LPOP" => Command::LPop { key: args.string()?, count: args.count()? },
            "RPOP" => Command::RPop { key: args.string()?, count: args.count()? },
            "LTRIM" => Command::LTrim {
                key: args.string()?,
                start: args.int()?,
                end: args.int()?,
            },
            "LINSERT" => Command::LInsert {
                key: args.string()?,
                position: args.string()?.parse().map_err(|e: Error| args.malformed(e.to_string()))?,
                pivot: args.string()?,
                value: args.string()?,
            },
            "LREM" => Command::LRem {
                key: args.string()?,
                count: args.int()?,
                value: args.string()?,
            },
            "LSET" => Command::LSet {
                key: args.string()?,
                index: args.int()?,
                value: args.string()?,
            },
            "LSORT" => Command::LSort { key: args.string()?, desc: args.flag("DESC") },
            "SADD" => Command::SAdd { key: args.string()?, members: args.rest_nonempty()? },
            "SREM" => Command::SRem { key: args.string()?, members: args.rest_nonempty()? },
            "SMOVE" => Command::SMove {
                src: args.string()?,
                dst: args.string()?,
                member: args.string()?,
            },
            "HSET" => Command::HSet { key: args.string()?, pairs: args.rest_pairs()? },
            "HDEL" => Command::HDel { key: args.string()?, fields: args.rest_nonempty()? },
            "HINCRBY" => Command::HIncrBy {
                key: args.string()?,
                field: args.string()?,
                delta: args.int()?,
            },
            "HINCRBYFLOAT" => Command::HIncrByFloat {
                key: args.string()?,
                field: args.string()?,
                delta: args.float()?,
            },
            "ZADD" => {
                let key = args.string()?;
                let options = ZAddOptions {
                    nx: args.flag("NX"),
                    xx: args.flag("XX"),
                    gt: args.flag("GT"),
                    lt: args.flag("LT"),
                };
                Command::ZAdd { key, options, members: args.rest_scored()? }
            }
            "ZINCRBY" => Command::ZIncrBy {
                key: args.string()?,
                amount: args.float()?,
                member: args.string()?,
            },
            "ZREM" => Command::ZRem { key: args.string()?, members: args.rest_nonempty()? },
            "ZREMRANGEBYSCORE" => Command::ZRemRangeByScore {
                key: args.string()?,
                min: args.float()?,
                max: args.float()?,
            },
            "ZPOPMIN" | "ZPOPMAX" => Command::ZPop {
                key: args.string()?,
                side: if name == "ZPOPMIN" { PopSide::Min } else { PopSide::Max },
                count: args.count()?,
            },
            other => {
                return Err(Error::MalformedRecord(format!("unknown command '{}'", other)))
            }
        };
        Ok(command)
    }

    /// Applies the record to `keyspace`.
    pub fn apply(&self, keyspace: &mut Keyspace) -> Result<()> {
        match self {
            Command::Del { keys } => {
                keyspace.delete(keys);
            }
            Command::Rename { src, dst } => {
                keyspace.rename(src, dst)?;
            }
            Command::Copy { src, dst, replace } => {
                keyspace.copy(src, dst, *replace);
            }
            Command::FlushDb => {
                keyspace.flushdb();
            }
            Command::ExpireAt { key, at } => {
                keyspace.expire_at(key, *at, ExpireOptions::default())?;
            }
            Command::Persist { key } => {
                keyspace.persist(key);
            }
            Command::Set { key, value, expire_at } => {
                let mut options = SetOptions::new();
                options.exat = *expire_at;
                keyspace.set(key, value, &options)?;
            }
            Command::Append { key, value } => {
                keyspace.append(key, value)?;
            }
            Command::IncrBy { key, delta } => {
                keyspace.incrby(key, *delta)?;
            }
            Command::IncrByFloat { key, delta } => {
                keyspace.incrbyfloat(key, *delta)?;
            }
            Command::MSet { pairs } => {
                keyspace.mset(pairs);
            }
            Command::LPush { key, values } => {
                keyspace.lpush(key, values)?;
            }
            Command::RPush { key, values } => {
                keyspace.rpush(key, values)?;
            }
            Command::LPop { key, count } => {
                keyspace.lpop_count(key, *count)?;
            }
            Command::RPop { key, count } => {
                keyspace.rpop_count(key, *count)?;
            }
            Command::LTrim { key, start, end } => {
                keyspace.ltrim(key, *start, *end)?;
            }
            Command::LInsert { key, position, pivot, value } => {
                keyspace.linsert(key, *position, pivot, value)?;
            }
            Command::LRem { key, count, value } => {
                keyspace.lrem(key, *count, value)?;
            }
            Command::LSet { key, index, value } => {
                keyspace.lset(key, *index, value)?;
            }
            Command::LSort { key, desc } => {
                keyspace.lsort(key, *desc)?;
            }
            Command::SAdd { key, members } => {
                keyspace.sadd(key, members)?;
            }
            Command::SRem { key, members } => {
                keyspace.srem(key, members)?;
            }
            Command::SMove { src, dst, member } => {
                keyspace.smove(src, dst, member)?;
            }
            Command::HSet { key, pairs } => {
                keyspace.hset(key, &HashFields::new().items(pairs.iter().cloned()))?;
            }
            Command::HDel { key, fields } => {
                keyspace.hdel(key, fields)?;
            }
            Command::HIncrBy { key, field, delta } => {
                keyspace.hincrby(key, field, *delta)?;
            }
            Command::HIncrByFloat { key, field, delta } => {
                keyspace.hincrbyfloat(key, field, *delta)?;
            }
            Command::ZAdd { key, options, members } => {
                keyspace.zadd(key, members, *options)?;
            }
            Command::ZIncrBy { key, amount, member } => {
                keyspace.zincrby(key, *amount, member)?;
            }
            Command::ZRem { key, members } => {
                keyspace.zrem(key, members)?;
            }
            Command::ZRemRangeByScore { key, min, max } => {
                keyspace.zremrangebyscore(key, *min, *max)?;
            }
            Command::ZPop { key, side, count } => {
                let count = i64::try_from(*count).unwrap_or(i64::MAX);
                match side {
                    PopSide::Min => keyspace.zpopmin(key, count)?,
                    PopSide::Max => keyspace.zpopmax(key, count)?,
                };
            }
        }
        Ok(())
    }
}

// ============================================================================
// Argument reading
// ============================================================================

/// Pulls typed arguments off a word list.
///
/// Shared by log replay and the command-line front end; each passes the
/// error variant its callers expect.
pub(crate) struct ArgReader {
    command: String,
    words: Peekable<vec::IntoIter<String>>,
    error: fn(String) -> Error,
}

impl ArgReader {
    pub(crate) fn new(command: &str, words: Vec<String>, error: fn(String) -> Error) -> Self {
        Self {
            command: command.to_ascii_lowercase(),
            words: words.into_iter().peekable(),
            error,
        }
    }

    pub(crate) fn malformed(&self, detail: impl std::fmt::Display) -> Error {
        (self.error)(format!("'{}': {}", self.command, detail))
    }

    pub(crate) fn is_empty(&mut self) -> bool {
        self.words.peek().is_none()
    }

    pub(crate) fn string(&mut self) -> Result<String> {
        match self.words.next() {
            Some(word) => Ok(word),
            None => Err(self.malformed("wrong number of arguments")),
        }
    }

    pub(crate) fn int(&mut self) -> Result<i64> {
        let word = self.string()?;
        word.trim()
            .parse()
            .map_err(|_| self.malformed(format!("'{}' is not an integer", word)))
    }

    pub(crate) fn float(&mut self) -> Result<f64> {
        let word = self.string()?;
        parse_float(&word).ok_or_else(|| self.malformed(format!("'{}' is not a float", word)))
    }

    pub(crate) fn count(&mut self) -> Result<usize> {
        let word = self.string()?;
        word.trim()
            .parse()
            .map_err(|_| self.malformed(format!("'{}' is not a count", word)))
    }

    /// Consumes the next word if it equals `flag`, ignoring case.
    pub(crate) fn flag(&mut self, flag: &str) -> bool {
        if self.words.peek().is_some_and(|word| word.eq_ignore_ascii_case(flag)) {
            self.words.next();
            return true;
        }
        false
    }

    pub(crate) fn rest(&mut self) -> Vec<String> {
        self.words.by_ref().collect()
    }

    pub(crate) fn rest_nonempty(&mut self) -> Result<Vec<String>> {
        let rest = self.rest();
        if rest.is_empty() {
            return Err(self.malformed("wrong number of arguments"));
        }
        Ok(rest)
    }

    pub(crate) fn rest_pairs(&mut self) -> Result<Vec<(String, String)>> {
        let rest = self.rest_nonempty()?;
        if rest.len() % 2 != 0 {
            return Err(self.malformed("arguments must come in pairs"));
        }
        let mut pairs = Vec::with_capacity(rest.len() / 2);
        let mut words = rest.into_iter();
        while let (Some(a), Some(b)) = (words.next(), words.next()) {
            pairs.push((a, b));
        }
        Ok(pairs)
    }

    /// `score member [score member ...]`
    pub(crate) fn rest_scored(&mut self) -> Result<Vec<(String, f64)>> {
        let mut scored = Vec::new();
        for (score, member) in self.rest_pairs()? {
            let score = parse_float(&score)
                .ok_or_else(|| self.malformed(format!("'{}' is not a float", score)))?;
            scored.push((member, score));
        }
        Ok(scored)
    }

    /// Fails if anything is left over.
    pub(crate) fn finish(&mut self) -> Result<()> {
        match self.words.peek() {
            None => Ok(()),
            Some(extra) => {
                let extra = extra.clone();
                Err(self.malformed(format!("unexpected argument '{}'", extra)))
            }
        }
    }
}

/// Parses a float, accepting the `+inf` / `-inf` spellings as well.
pub(crate) fn parse_float(word: &str) -> Option<f64> {
    let word = word.trim();
    let value = match word.to_ascii_lowercase().as_str() {
        "+inf" | "inf" => f64::INFINITY,
        "-inf" => f64::NEG_INFINITY,
        _ => word.parse().ok()?,
    };
    (!value.is_nan()).then_some(value)
}
