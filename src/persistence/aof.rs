//! Append-only log.
//!
//! Records are encoded into an in-memory buffer first and reach the file on
//! [`Aof::flush`]. How often that happens depends on [`AofFsync`]:
//!
//! ```text
//!   Always    append -> flush -> fdatasync, every record
//!   EverySec  append;  the maintenance task flushes once per second
//!   Never     append;  flushed only by close (a snapshot discards it)
//! ```
//!
//! A failed flush keeps the buffer, so the next flush retries the same bytes.

use crate::config::AofFsync;
use crate::error::Result;
use crate::persistence::{Command, FrameParser};
use crate::storage::Keyspace;
use bytes::BytesMut;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Counters from one replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records applied to the keyspace.
    pub applied: usize,
    /// Records that decoded or applied with an error and were passed over.
    pub skipped: usize,
    /// Bytes cut off the end of the file because they were not a complete record.
    pub truncated: u64,
}

#[derive(Debug)]
pub struct Aof {
    path: PathBuf,
    file: File,
    buffer: BytesMut,
    fsync: AofFsync,
}

impl Aof {
    /// Opens (creating if needed) the log at `path` for appending.
    pub fn open(path: impl AsRef<Path>, fsync: AofFsync) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file,
            buffer: BytesMut::new(),
            fsync,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fsync(&self) -> AofFsync {
        self.fsync
    }

    /// Bytes buffered but not yet written.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Buffers a record, flushing right away under [`AofFsync::Always`].
    ///
    /// A flush failure is logged, not returned: the command it records has
    /// already been applied, and the bytes stay buffered for the next try.
    pub fn append(&mut self, command: &Command) {
        command.to_frame().serialize_into(&mut self.buffer);
        if self.fsync == AofFsync::Always {
            if let Err(e) = self.flush() {
                error!(path = %self.path.display(), error = %e, "Failed to flush AOF");
            }
        }
    }

    /// Writes out the buffer and syncs the file.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.file.write_all(&self.buffer)?;
        self.file.sync_data()?;
        debug!(bytes = self.buffer.len(), "AOF flushed");
        self.buffer.clear();
        Ok(())
    }

    /// Drops the buffer and empties the file. Called once a snapshot covers
    /// everything the log held.
    pub fn clear(&mut self) -> Result<()> {
        self.buffer.clear();
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Replays every record in the file into `keyspace`.
    ///
    /// Records that fail to decode or apply are skipped with a warning. A
    /// torn or unparseable tail ends the replay, and the file is cut back to
    /// the last complete record so new appends stay readable.
    ///
    /// Expiry is suspended for the duration: removals made by expiry were
    /// logged as `DEL` records when they happened. Callers purge expired
    /// keys afterwards.
    pub fn replay(&mut self, keyspace: &mut Keyspace) -> Result<ReplayStats> {
        keyspace.set_replaying(true);
        let result = self.replay_records(keyspace);
        keyspace.set_replaying(false);
        result
    }

    fn replay_records(&mut self, keyspace: &mut Keyspace) -> Result<ReplayStats> {
        let mut data = Vec::new();
        let mut reader = File::open(&self.path)?;
        reader.read_to_end(&mut data)?;

        let mut stats = ReplayStats::default();
        let mut parser = FrameParser::new();
        let mut offset = 0;

        while offset < data.len() {
            let (frame, consumed) = match parser.parse(&data[offset..]) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => {
                    warn!(
                        path = %self.path.display(),
                        offset,
                        "AOF ends with an incomplete record"
                    );
                    break;
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        offset,
                        error = %e,
                        "AOF contains unreadable data, ignoring the rest"
                    );
                    break;
                }
            };
            offset += consumed;

            let applied = Command::from_frame(frame).and_then(|command| command.apply(keyspace));
            match applied {
                Ok(()) => stats.applied += 1,
                Err(e) => {
                    stats.skipped += 1;
                    warn!(error = %e, "Skipping AOF record");
                }
            }
        }

        if offset < data.len() {
            stats.truncated = (data.len() - offset) as u64;
            self.file.set_len(offset as u64)?;
            self.file.sync_all()?;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn set(key: &str, value: &str) -> Command {
        Command::Set {
            key: key.to_string(),
            value: value.to_string(),
            expire_at: None,
        }
    }

    #[test]
    fn test_append_and_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.aof");

        let mut aof = Aof::open(&path, AofFsync::Always).unwrap();
        aof.append(&set("a", "1"));
        aof.append(&Command::RPush {
            key: "l".to_string(),
            values: vec!["x".to_string(), "y".to_string()],
        });
        assert_eq!(aof.pending(), 0);

        let mut ks = Keyspace::new();
        let stats = Aof::open(&path, AofFsync::Always).unwrap().replay(&mut ks).unwrap();
        assert_eq!(stats, ReplayStats { applied: 2, skipped: 0, truncated: 0 });
        assert_eq!(ks.get("a").unwrap(), Some("1".to_string()));
        assert_eq!(ks.llen("l").unwrap(), 2);
    }

    #[test]
    fn test_buffered_until_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.aof");

        let mut aof = Aof::open(&path, AofFsync::EverySec).unwrap();
        aof.append(&set("a", "1"));
        assert!(aof.pending() > 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        aof.flush().unwrap();
        assert_eq!(aof.pending(), 0);
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.aof");

        let mut aof = Aof::open(&path, AofFsync::Always).unwrap();
        aof.append(&set("a", "1"));
        aof.clear().unwrap();
        aof.append(&set("b", "2"));

        let mut ks = Keyspace::new();
        Aof::open(&path, AofFsync::Always).unwrap().replay(&mut ks).unwrap();
        assert_eq!(ks.get("a").unwrap(), None);
        assert_eq!(ks.get("b").unwrap(), Some("2".to_string()));
    }

    #[test]
    fn test_skips_bad_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.aof");

        let mut aof = Aof::open(&path, AofFsync::Always).unwrap();
        aof.append(&set("s", "x"));
        // Wrong type for the key: applies with an error
        aof.append(&Command::LPush {
            key: "s".to_string(),
            values: vec!["v".to_string()],
        });
        // Unknown command: decodes with an error
        let mut raw = BytesMut::new();
        crate::persistence::Frame::strings(["BOGUS", "k"]).serialize_into(&mut raw);
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&raw)
            .unwrap();
        aof.append(&set("t", "y"));

        let mut ks = Keyspace::new();
        let stats = Aof::open(&path, AofFsync::Always).unwrap().replay(&mut ks).unwrap();
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(ks.get("t").unwrap(), Some("y".to_string()));
    }

    #[test]
    fn test_truncates_torn_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.aof");

        let mut aof = Aof::open(&path, AofFsync::Always).unwrap();
        aof.append(&set("a", "1"));
        let good_len = std::fs::metadata(&path).unwrap().len();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nb")
            .unwrap();

        let mut ks = Keyspace::new();
        let mut reopened = Aof::open(&path, AofFsync::Always).unwrap();
        let stats = reopened.replay(&mut ks).unwrap();
        assert_eq!(stats.applied, 1);
        assert!(stats.truncated > 0);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);

        // Appends after the cut are readable again
        reopened.append(&set("c", "3"));
        let mut ks = Keyspace::new();
        let stats = Aof::open(&path, AofFsync::Always).unwrap().replay(&mut ks).unwrap();
        assert_eq!(stats.applied, 2);
        assert_eq!(ks.get("c").unwrap(), Some("3".to_string()));
    }

    #[test]
    fn test_garbage_stops_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.aof");

        let mut aof = Aof::open(&path, AofFsync::Always).unwrap();
        aof.append(&set("a", "1"));
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not a frame at all\r\n")
            .unwrap();

        let mut ks = Keyspace::new();
        let stats = Aof::open(&path, AofFsync::Always).unwrap().replay(&mut ks).unwrap();
        assert_eq!(stats.applied, 1);
        assert_eq!(stats.truncated, 20);
    }
}
