//! Command-line front end.
//!
//! Turns a line of text such as `ZADD board 10 alice` into a call on a
//! [`Database`] and the result into a [`Frame`] that prints the way
//! redis-cli does.
//!
//! ```text
//! "SET k v EX 10"
//!       │ split_line
//!       ▼
//! ["SET", "k", "v", "EX", "10"]
//!       │ CommandHandler::execute
//!       ▼
//! dispatch ──▶ cmd_set ──▶ Database::set ──▶ Frame::ok()
//! ```
//!
//! Command names are case-insensitive. Every failure becomes an error
//! frame; nothing here panics or aborts the session.

use crate::db::Database;
use crate::error::{Error, Result};
use crate::persistence::command::ArgReader;
use crate::persistence::Frame;
use crate::storage::{ExpireOptions, HashFields, PopSide, SetOptions, ZAddOptions};
use std::sync::Arc;

/// Splits a command line into words.
///
/// Words are separated by whitespace. Double quotes group a word and
/// understand `\"`, `\\`, `\n`, `\r` and `\t`; single quotes group a word
/// literally.
pub fn split_line(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            return Ok(words);
        };

        let mut word = String::new();
        match first {
            '"' => {
                chars.next();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some('n') => word.push('\n'),
                            Some('r') => word.push('\r'),
                            Some('t') => word.push('\t'),
                            Some(other) => word.push(other),
                            None => return Err(Error::invalid("unbalanced quotes")),
                        },
                        Some(c) => word.push(c),
                        None => return Err(Error::invalid("unbalanced quotes")),
                    }
                }
            }
            '\'' => {
                chars.next();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(Error::invalid("unbalanced quotes")),
                    }
                }
            }
            _ => {
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
            }
        }
        words.push(word);
    }
}

fn count(n: usize) -> Frame {
    Frame::integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn flag(b: bool) -> Frame {
    Frame::integer(i64::from(b))
}

fn scored(pairs: Vec<(String, f64)>, with_scores: bool) -> Frame {
    let mut items = Vec::with_capacity(pairs.len() * if with_scores { 2 } else { 1 });
    for (member, score) in pairs {
        items.push(Frame::bulk(member));
        if with_scores {
            items.push(Frame::float(score));
        }
    }
    Frame::Array(items)
}

fn sorted(members: impl IntoIterator<Item = String>) -> Frame {
    let mut members: Vec<String> = members.into_iter().collect();
    members.sort();
    Frame::strings(members)
}

fn expire_options(args: &mut ArgReader) -> Result<ExpireOptions> {
    let mut options = ExpireOptions::default();
    while !args.is_empty() {
        match args.string()?.to_ascii_uppercase().as_str() {
            "NX" => options.nx = true,
            "XX" => options.xx = true,
            "GT" => options.gt = true,
            "LT" => options.lt = true,
            other => return Err(args.malformed(format!("unknown option '{}'", other))),
        }
    }
    Ok(options)
}

/// `numkeys key [key ...]`
fn numbered_keys(args: &mut ArgReader) -> Result<Vec<String>> {
    let n = args.count()?;
    if n == 0 {
        return Err(args.malformed("numkeys must be positive"));
    }
    (0..n).map(|_| args.string()).collect()
}

/// Runs text commands against one database.
#[derive(Clone)]
pub struct CommandHandler {
    db: Arc<Database>,
}

impl CommandHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Splits `line` and executes it. A blank line yields `None`.
    pub fn execute_line(&self, line: &str) -> Option<Frame> {
        match split_line(line) {
            Ok(words) if words.is_empty() => None,
            Ok(words) => Some(self.execute(words)),
            Err(e) => Some(e.into()),
        }
    }

    /// Executes one command given as words, name first.
    ///
    /// # Returns
    ///
    /// The reply; failures come back as an error frame.
    pub fn execute(&self, words: Vec<String>) -> Frame {
        let mut words = words.into_iter();
        let Some(name) = words.next() else {
            return Frame::error("ERR empty command");
        };
        let name = name.to_ascii_uppercase();
        let mut args = ArgReader::new(&name, words.collect(), Error::InvalidArgument);

        let reply = self
            .dispatch(&name, &mut args)
            .and_then(|reply| args.finish().map(|()| reply));
        reply.unwrap_or_else(Frame::from)
    }

    fn dispatch(&self, name: &str, args: &mut ArgReader) -> Result<Frame> {
        match name {
            // Keys
            "DEL" => self.cmd_del(args),
            "EXISTS" => Ok(count(self.db.exists(&args.rest_nonempty()?)?)),
            "KEYS" => Ok(Frame::strings(self.db.keys(&args.string()?)?)),
            "TYPE" => self.cmd_type(args),
            "RENAME" => {
                self.db.rename(&args.string()?, &args.string()?)?;
                Ok(Frame::ok())
            }
            "RENAMENX" => Ok(flag(self.db.renamenx(&args.string()?, &args.string()?)?)),
            "COPY" => {
                let src = args.string()?;
                let dst = args.string()?;
                let replace = args.flag("REPLACE");
                Ok(flag(self.db.copy(&src, &dst, replace)?))
            }
            "DUMP" => Ok(Frame::optional(self.db.dump(&args.string()?)?)),
            "RANDOMKEY" => Ok(Frame::optional(self.db.randomkey()?)),
            "DBSIZE" => Ok(count(self.db.dbsize()?)),
            "FLUSHDB" => {
                self.db.flushdb()?;
                Ok(Frame::ok())
            }

            // Expiry
            "EXPIRE" | "PEXPIRE" | "EXPIREAT" | "PEXPIREAT" => self.cmd_expire(name, args),
            "TTL" => Ok(Frame::integer(self.db.ttl(&args.string()?)?)),
            "PTTL" => Ok(Frame::integer(self.db.pttl(&args.string()?)?)),
            "EXPIRETIME" => Ok(Frame::integer(self.db.expiretime(&args.string()?)?)),
            "PERSIST" => Ok(flag(self.db.persist(&args.string()?)?)),

            // Strings
            "SET" => self.cmd_set(args),
            "GET" => Ok(Frame::optional(self.db.get(&args.string()?)?)),
            "APPEND" => Ok(count(self.db.append(&args.string()?, &args.string()?)?)),
            "INCR" => Ok(Frame::integer(self.db.incr(&args.string()?)?)),
            "DECR" => Ok(Frame::integer(self.db.decr(&args.string()?)?)),
            "INCRBY" => Ok(Frame::integer(self.db.incrby(&args.string()?, args.int()?)?)),
            "DECRBY" => Ok(Frame::integer(self.db.decrby(&args.string()?, args.int()?)?)),
            "INCRBYFLOAT" => Ok(Frame::float(
                self.db.incrbyfloat(&args.string()?, args.float()?)?,
            )),
            "GETRANGE" | "SUBSTR" => {
                let key = args.string()?;
                Ok(Frame::bulk(self.db.getrange(&key, args.int()?, args.int()?)?))
            }
            "STRLEN" => Ok(count(self.db.strlen(&args.string()?)?)),
            "MGET" => Ok(Frame::Array(
                self.db
                    .mget(&args.rest_nonempty()?)?
                    .into_iter()
                    .map(Frame::optional)
                    .collect(),
            )),
            "MSET" => {
                self.db.mset(&args.rest_pairs()?)?;
                Ok(Frame::ok())
            }
            "MSETNX" => Ok(flag(self.db.msetnx(&args.rest_pairs()?)?)),

            // Lists
            "LPUSH" | "RPUSH" | "LPUSHX" | "RPUSHX" => self.cmd_push(name, args),
            "LPOP" | "RPOP" => self.cmd_pop(name, args),
            "LINDEX" => {
                let key = args.string()?;
                Ok(Frame::optional(self.db.lindex(&key, args.int()?)?))
            }
            "LLEN" => Ok(count(self.db.llen(&args.string()?)?)),
            "LRANGE" => {
                let key = args.string()?;
                Ok(Frame::strings(self.db.lrange(&key, args.int()?, args.int()?)?))
            }
            "LTRIM" => {
                let key = args.string()?;
                self.db.ltrim(&key, args.int()?, args.int()?)?;
                Ok(Frame::ok())
            }
            "LINSERT" => {
                let key = args.string()?;
                let position = args.string()?.parse()?;
                let pivot = args.string()?;
                let value = args.string()?;
                Ok(Frame::integer(self.db.linsert(&key, position, &pivot, &value)?))
            }
            "LREM" => {
                let key = args.string()?;
                let n = args.int()?;
                Ok(count(self.db.lrem(&key, n, &args.string()?)?))
            }
            "LSET" => {
                let key = args.string()?;
                let index = args.int()?;
                self.db.lset(&key, index, &args.string()?)?;
                Ok(Frame::ok())
            }
            "LSORT" => {
                let key = args.string()?;
                let desc = args.flag("DESC");
                Ok(Frame::strings(self.db.lsort(&key, desc)?))
            }

            // Sets
            "SADD" => {
                let key = args.string()?;
                Ok(count(self.db.sadd(&key, &args.rest_nonempty()?)?))
            }
            "SREM" => {
                let key = args.string()?;
                Ok(count(self.db.srem(&key, &args.rest_nonempty()?)?))
            }
            "SCARD" => Ok(count(self.db.scard(&args.string()?)?)),
            "SISMEMBER" => Ok(flag(self.db.sismember(&args.string()?, &args.string()?)?)),
            "SMISMEMBER" => {
                let key = args.string()?;
                Ok(Frame::Array(
                    self.db
                        .smismember(&key, &args.rest_nonempty()?)?
                        .into_iter()
                        .map(flag)
                        .collect(),
                ))
            }
            "SMEMBERS" => Ok(sorted(self.db.smembers(&args.string()?)?)),
            "SINTER" => Ok(sorted(self.db.sinter(&args.rest_nonempty()?)?)),
            "SUNION" => Ok(sorted(self.db.sunion(&args.rest_nonempty()?)?)),
            "SDIFF" => Ok(sorted(self.db.sdiff(&args.rest_nonempty()?)?)),
            "SMOVE" => Ok(flag(self.db.smove(
                &args.string()?,
                &args.string()?,
                &args.string()?,
            )?)),
            "SPOP" => {
                let key = args.string()?;
                if args.is_empty() {
                    Ok(Frame::optional(self.db.spop(&key)?))
                } else {
                    Ok(Frame::strings(self.db.spop_count(&key, args.count()?)?))
                }
            }
            "SRANDMEMBER" => {
                let key = args.string()?;
                if args.is_empty() {
                    Ok(Frame::optional(self.db.srandmember(&key)?))
                } else {
                    Ok(Frame::strings(self.db.srandmember_count(&key, args.int()?)?))
                }
            }

            // Hashes
            "HSET" => {
                let key = args.string()?;
                let fields = HashFields::new().items(args.rest_pairs()?);
                Ok(count(self.db.hset(&key, &fields)?))
            }
            "HSETNX" => Ok(flag(self.db.hsetnx(
                &args.string()?,
                &args.string()?,
                &args.string()?,
            )?)),
            "HGET" => Ok(Frame::optional(self.db.hget(&args.string()?, &args.string()?)?)),
            "HEXISTS" => Ok(flag(self.db.hexists(&args.string()?, &args.string()?)?)),
            "HLEN" => Ok(count(self.db.hlen(&args.string()?)?)),
            "HKEYS" => Ok(Frame::strings(self.db.hkeys(&args.string()?)?)),
            "HVALS" => Ok(Frame::strings(self.db.hvals(&args.string()?)?)),
            "HGETALL" => Ok(Frame::strings(
                self.db
                    .hgetall(&args.string()?)?
                    .into_iter()
                    .flat_map(|(field, value)| [field, value]),
            )),
            "HSTRLEN" => Ok(count(self.db.hstrlen(&args.string()?, &args.string()?)?)),
            "HMGET" => {
                let key = args.string()?;
                Ok(Frame::Array(
                    self.db
                        .hmget(&key, &args.rest_nonempty()?)?
                        .into_iter()
                        .map(Frame::optional)
                        .collect(),
                ))
            }
            "HDEL" => {
                let key = args.string()?;
                Ok(count(self.db.hdel(&key, &args.rest_nonempty()?)?))
            }
            "HINCRBY" => {
                let key = args.string()?;
                let field = args.string()?;
                Ok(Frame::integer(self.db.hincrby(&key, &field, args.int()?)?))
            }
            "HINCRBYFLOAT" => {
                let key = args.string()?;
                let field = args.string()?;
                Ok(Frame::float(self.db.hincrbyfloat(&key, &field, args.float()?)?))
            }

            // Sorted sets
            "ZADD" => self.cmd_zadd(args),
            "ZINCRBY" => {
                let key = args.string()?;
                let amount = args.float()?;
                Ok(Frame::float(self.db.zincrby(&key, amount, &args.string()?)?))
            }
            "ZCARD" => Ok(count(self.db.zcard(&args.string()?)?)),
            "ZCOUNT" => {
                let key = args.string()?;
                Ok(count(self.db.zcount(&key, args.float()?, args.float()?)?))
            }
            "ZSCORE" => Ok(self
                .db
                .zscore(&args.string()?, &args.string()?)?
                .map_or(Frame::Null, Frame::float)),
            "ZMSCORE" => {
                let key = args.string()?;
                Ok(Frame::Array(
                    self.db
                        .zmscore(&key, &args.rest_nonempty()?)?
                        .into_iter()
                        .map(|score| score.map_or(Frame::Null, Frame::float))
                        .collect(),
                ))
            }
            "ZRANK" | "ZREVRANK" => {
                let key = args.string()?;
                let member = args.string()?;
                let rank = if name == "ZRANK" {
                    self.db.zrank(&key, &member)?
                } else {
                    self.db.zrevrank(&key, &member)?
                };
                Ok(rank.map_or(Frame::Null, count))
            }
            "ZRANGE" | "ZREVRANGE" => {
                let key = args.string()?;
                let start = args.int()?;
                let end = args.int()?;
                let with_scores = args.flag("WITHSCORES");
                let pairs = if name == "ZRANGE" {
                    self.db.zrange_withscores(&key, start, end)?
                } else {
                    self.db.zrevrange_withscores(&key, start, end)?
                };
                Ok(scored(pairs, with_scores))
            }
            "ZRANGEBYSCORE" | "ZREVRANGEBYSCORE" => self.cmd_zrangebyscore(name, args),
            "ZPOPMIN" | "ZPOPMAX" => {
                let key = args.string()?;
                let n = if args.is_empty() { 1 } else { args.int()? };
                let popped = if name == "ZPOPMIN" {
                    self.db.zpopmin(&key, n)?
                } else {
                    self.db.zpopmax(&key, n)?
                };
                Ok(scored(popped, true))
            }
            "ZMPOP" => self.cmd_zmpop(args),
            "ZREM" => {
                let key = args.string()?;
                Ok(count(self.db.zrem(&key, &args.rest_nonempty()?)?))
            }
            "ZREMRANGEBYSCORE" => {
                let key = args.string()?;
                Ok(count(self.db.zremrangebyscore(&key, args.float()?, args.float()?)?))
            }
            "ZUNION" | "ZINTER" | "ZDIFF" => {
                let keys = numbered_keys(args)?;
                let with_scores = args.flag("WITHSCORES");
                let pairs = match name {
                    "ZUNION" => self.db.zunion(&keys)?,
                    "ZINTER" => self.db.zinter(&keys)?,
                    _ => self.db.zdiff(&keys)?,
                };
                Ok(scored(pairs, with_scores))
            }
            "ZINTERCARD" => {
                let keys = numbered_keys(args)?;
                let limit = if args.flag("LIMIT") { args.count()? } else { 0 };
                Ok(count(self.db.zintercard(&keys, limit)?))
            }
            "ZRANDMEMBER" => {
                let key = args.string()?;
                if args.is_empty() {
                    let picked = self.db.zrandmember(&key, 1)?;
                    return Ok(Frame::optional(picked.into_iter().next().map(|(m, _)| m)));
                }
                let n = args.int()?;
                let with_scores = args.flag("WITHSCORES");
                Ok(scored(self.db.zrandmember(&key, n)?, with_scores))
            }
            "ZSCAN" => {
                let key = args.string()?;
                let cursor = args.count()?;
                let page = if args.flag("COUNT") { args.count()? } else { 10 };
                let (next, pairs) = self.db.zscan(&key, cursor, page)?;
                Ok(Frame::Array(vec![
                    Frame::bulk(next.to_string()),
                    scored(pairs, true),
                ]))
            }

            // Admin
            "PING" => Ok(if args.is_empty() {
                Frame::simple("PONG")
            } else {
                Frame::bulk(args.string()?)
            }),
            "ECHO" => Ok(Frame::bulk(args.string()?)),
            "SAVE" => Ok(if self.db.save()? {
                Frame::ok()
            } else {
                Frame::error("ERR snapshots are disabled for this database")
            }),
            "INFO" => self.cmd_info(),

            _ => Ok(Frame::error(format!("ERR unknown command '{}'", name))),
        }
    }

    // ========================================================================
    // Commands with options
    // ========================================================================

    /// DEL key [key ...]
    fn cmd_del(&self, args: &mut ArgReader) -> Result<Frame> {
        let keys = args.rest_nonempty()?;
        Ok(count(self.db.delete(&keys)?))
    }

    /// TYPE key
    fn cmd_type(&self, args: &mut ArgReader) -> Result<Frame> {
        let key = args.string()?;
        Ok(Frame::simple(
            self.db.key_type(&key)?.map_or("none", |t| t.as_str()),
        ))
    }

    /// EXPIRE key seconds [NX|XX|GT|LT], and the PEXPIRE/EXPIREAT/PEXPIREAT
    /// variants.
    fn cmd_expire(&self, name: &str, args: &mut ArgReader) -> Result<Frame> {
        let key = args.string()?;
        let amount = args.int()?;
        let options = expire_options(args)?;
        let applied = match name {
            "EXPIRE" => self.db.expire(&key, amount, options)?,
            "PEXPIRE" => self.db.pexpire(&key, amount, options)?,
            "EXPIREAT" => self.db.expireat(&key, amount, options)?,
            _ => self.db.pexpireat(&key, amount, options)?,
        };
        Ok(flag(applied))
    }

    /// SET key value [EX seconds | EXAT timestamp] [NX | XX] [GET]
    fn cmd_set(&self, args: &mut ArgReader) -> Result<Frame> {
        let key = args.string()?;
        let value = args.string()?;

        let mut options = SetOptions::new();
        while !args.is_empty() {
            match args.string()?.to_ascii_uppercase().as_str() {
                "EX" => options.ex = Some(args.int()?),
                "EXAT" => options.exat = Some(args.int()? as f64),
                "NX" => options.nx = true,
                "XX" => options.xx = true,
                "GET" => options.get = true,
                other => return Err(args.malformed(format!("unknown option '{}'", other))),
            }
        }

        let outcome = self.db.set(&key, &value, &options)?;
        Ok(if options.get {
            Frame::optional(outcome.old)
        } else if outcome.applied {
            Frame::ok()
        } else {
            Frame::Null
        })
    }

    /// LPUSH/RPUSH/LPUSHX/RPUSHX key value [value ...]
    fn cmd_push(&self, name: &str, args: &mut ArgReader) -> Result<Frame> {
        let key = args.string()?;
        let values = args.rest_nonempty()?;
        let len = match name {
            "LPUSH" => self.db.lpush(&key, &values)?,
            "RPUSH" => self.db.rpush(&key, &values)?,
            "LPUSHX" => self.db.lpushx(&key, &values)?,
            _ => self.db.rpushx(&key, &values)?,
        };
        Ok(count(len))
    }

    /// LPOP/RPOP key [count]
    fn cmd_pop(&self, name: &str, args: &mut ArgReader) -> Result<Frame> {
        let key = args.string()?;
        let left = name == "LPOP";
        if args.is_empty() {
            let popped = if left {
                self.db.lpop(&key)?
            } else {
                self.db.rpop(&key)?
            };
            return Ok(Frame::optional(popped));
        }
        let n = args.count()?;
        let popped = if left {
            self.db.lpop_count(&key, n)?
        } else {
            self.db.rpop_count(&key, n)?
        };
        Ok(popped.map_or(Frame::Null, Frame::strings))
    }

    /// ZADD key [NX|XX] [GT|LT] score member [score member ...]
    fn cmd_zadd(&self, args: &mut ArgReader) -> Result<Frame> {
        let key = args.string()?;
        let mut options = ZAddOptions::default();
        loop {
            if args.flag("NX") {
                options.nx = true;
            } else if args.flag("XX") {
                options.xx = true;
            } else if args.flag("GT") {
                options.gt = true;
            } else if args.flag("LT") {
                options.lt = true;
            } else {
                break;
            }
        }
        let members = args.rest_scored()?;
        Ok(count(self.db.zadd(&key, &members, options)?))
    }

    /// ZRANGEBYSCORE key min max [WITHSCORES] [LIMIT offset count]
    ///
    /// ZREVRANGEBYSCORE takes `max` before `min`.
    fn cmd_zrangebyscore(&self, name: &str, args: &mut ArgReader) -> Result<Frame> {
        let key = args.string()?;
        let first = args.float()?;
        let second = args.float()?;

        let mut with_scores = false;
        let mut limit = None;
        while !args.is_empty() {
            match args.string()?.to_ascii_uppercase().as_str() {
                "WITHSCORES" => with_scores = true,
                "LIMIT" => limit = Some((args.count()?, args.count()?)),
                other => return Err(args.malformed(format!("unknown option '{}'", other))),
            }
        }

        let pairs = if name == "ZRANGEBYSCORE" {
            self.db.zrangebyscore(&key, first, second, limit)?
        } else {
            self.db.zrevrangebyscore(&key, second, first, limit)?
        };
        Ok(scored(pairs, with_scores))
    }

    /// ZMPOP numkeys key [key ...] MIN|MAX [COUNT count]
    fn cmd_zmpop(&self, args: &mut ArgReader) -> Result<Frame> {
        let keys = numbered_keys(args)?;
        let side: PopSide = args.string()?.parse()?;
        let n = if args.flag("COUNT") { args.int()? } else { 1 };

        Ok(match self.db.zmpop(&keys, side, n)? {
            Some((key, popped)) => Frame::Array(vec![Frame::bulk(key), scored(popped, true)]),
            None => Frame::Null,
        })
    }

    /// INFO
    fn cmd_info(&self) -> Result<Frame> {
        let info = self.db.info()?;
        let text = format!(
            "# Server\r\n\
             lumenkv_version:{}\r\n\
             os:{}\r\n\
             open_databases:{}\r\n\
             \r\n\
             # Persistence\r\n\
             persistence:{}\r\n\
             aof_fsync:{}\r\n\
             aof_pending_bytes:{}\r\n\
             \r\n\
             # Keyspace\r\n\
             db:{}\r\n\
             status:{}\r\n\
             keys:{}\r\n\
             expires:{}\r\n",
            crate::VERSION,
            std::env::consts::OS,
            Database::registered(),
            info.persistence,
            info.aof_fsync,
            info.aof_pending_bytes,
            info.identity,
            info.status,
            info.keys,
            info.volatile_keys,
        );
        Ok(Frame::bulk(text))
    }
}
