//! Persistence
//!
//! Two files per database, both under the configured data directory:
//!
//! - `<name>.aof`: the append-only log. One [`Command`] per mutation, encoded
//!   as a RESP [`Frame`], replayed in order on startup.
//! - `<name>.rdb`: the snapshot. The whole keyspace in one bincode blob,
//!   optionally gzipped.
//!
//! ```text
//!   startup:  load .rdb ──▶ replay .aof ──▶ (records applied?) save .rdb, clear .aof
//!   running:  every write ──▶ .aof        every N seconds ──▶ save .rdb, clear .aof
//! ```
//!
//! Which of the two are active is decided by
//! [`Persistence`](crate::config::Persistence).

pub mod aof;
pub mod command;
pub mod frame;
pub mod parser;
pub mod rdb;

pub use aof::{Aof, ReplayStats};
pub use command::Command;
pub use frame::Frame;
pub use parser::{parse_frame, FrameParser, ParseError, ParseResult};
pub use rdb::Rdb;
