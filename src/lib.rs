//! # LumenKV - An Embedded Multi-Type Key-Value Store
//!
//! LumenKV keeps strings, lists, sets, hashes and sorted sets in memory and
//! makes them durable with an append-only log plus periodic snapshots. It is
//! a library: databases are opened inside your process, there is no server.
//!
//! ## Features
//!
//! - **Typed values**: five value types with Redis-style commands
//! - **Expiry**: per-key deadlines, removed lazily on access and by a
//!   background sweep
//! - **Durability**: every change is logged before the call returns
//!   (with the default fsync policy), snapshots compact the log
//! - **One instance per directory**: opening the same database twice in a
//!   process hands back the same handle
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                             Database                                │
//! │                                                                     │
//! │   caller ──▶ lock ──▶ Keyspace command ──▶ mutated? ──▶ Aof.append  │
//! │                          │                                          │
//! │                          ▼                                          │
//! │   ┌──────────────────────────────────────────────┐                  │
//! │   │                  Keyspace                    │                  │
//! │   │  strings  lists  sets  hashes  sorted sets   │                  │
//! │   │  type tags, expiry deadlines                 │                  │
//! │   └──────────────────────────────────────────────┘                  │
//! │                          ▲                                          │
//! │   ┌──────────────────────┴───────────────────────┐                  │
//! │   │        Maintenance (own thread)              │                  │
//! │   │  expiry sweep · AOF flush · RDB snapshot     │                  │
//! │   └──────────────────────────────────────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────┘
//!            │                                   │
//!            ▼                                   ▼
//!      <name>.aof (RESP records)          <name>.rdb (bincode, gzip)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use lumenkv::{Config, Database, SetOptions};
//!
//! let db = Database::open(Config::new().data_dir("./data").db_name("app"))?;
//!
//! db.set("user:1:name", "ariz", &SetOptions::new().ex(3600))?;
//! db.rpush("queue", &["job-1", "job-2"])?;
//! db.zadd("board", &[("ariz", 42.0)], Default::default())?;
//!
//! assert_eq!(db.llen("queue")?, 2);
//! db.close()?;
//! # Ok::<(), lumenkv::Error>(())
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: the in-memory keyspace and every command group
//! - [`persistence`]: log records, RESP framing, the AOF and the RDB
//! - [`db`]: database instances, the registry and background maintenance
//! - [`config`]: configuration, connection strings, environment loading
//! - [`cli`]: text command dispatch used by the `lumenkv` binary
//!
//! ## Design Highlights
//!
//! ### One Lock, One Order
//!
//! Each database has a single mutex over its keyspace, log and snapshot
//! handle. Commands hold it from start to finish, so the order in which
//! they take effect is the order in which they reach the log.
//!
//! ### Log the Effect
//!
//! Records never contain relative times or random choices: `EXPIRE` is
//! logged as `EXPIREAT`, `SPOP` as `SREM` of what was popped. Replaying a
//! log always rebuilds the same data.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod persistence;
pub mod storage;

// Re-export commonly used types for convenience
pub use cli::CommandHandler;
pub use config::{AofFsync, Config, Persistence};
pub use db::{Database, ExpiryConfig, Info, Status};
pub use error::{Error, Result};
pub use persistence::{Command, Frame};
pub use storage::{
    DataType, ExpireOptions, HashFields, InsertPosition, PopSide, SetOptions, SetOutcome,
    ZAddOptions,
};

/// Version of LumenKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
