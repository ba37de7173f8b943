//! Snapshots.
//!
//! ## File Format
//!
//! ```text
//! ┌────────────┬─────────┬───────┬──────────────────────────────────┐
//! │ "LUMRDB"   │ version │ flags │ body                             │
//! │ 6 bytes    │ 1 byte  │ 1 byte│ bincode Vec<Entry>, gzip if      │
//! │            │         │       │ flags & 1                        │
//! └────────────┴─────────┴───────┴──────────────────────────────────┘
//! ```
//!
//! Each entry is `(key, type tag, value, expiry)`. A save goes to
//! `<name>.rdb.tmp` first, is synced, then renamed over the old file, so a
//! crash mid-save leaves the previous snapshot in place.

use crate::error::{Error, Result};
use crate::storage::{DataType, Keyspace, Value};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

pub const MAGIC: &[u8; 6] = b"LUMRDB";
pub const VERSION: u8 = 1;

const FLAG_GZIP: u8 = 0b0000_0001;

#[derive(Serialize)]
struct EntryRef<'a> {
    key: &'a str,
    tag: DataType,
    value: &'a Value,
    expires_at: Option<f64>,
}

#[derive(Deserialize)]
struct Entry {
    key: String,
    tag: DataType,
    value: Value,
    expires_at: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Rdb {
    path: PathBuf,
    compression: bool,
}

impl Rdb {
    pub fn new(path: impl Into<PathBuf>, compression: bool) -> Self {
        Self {
            path: path.into(),
            compression,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes every entry of `keyspace` and atomically replaces the old file.
    ///
    /// # Returns
    ///
    /// The number of entries written.
    pub fn save(&self, keyspace: &Keyspace) -> Result<usize> {
        let entries: Vec<EntryRef<'_>> = keyspace
            .entries()
            .map(|(key, tag, value, expires_at)| EntryRef {
                key,
                tag,
                value,
                expires_at,
            })
            .collect();

        let tmp = self.tmp_path();
        let written = self.write_file(&tmp, &entries);
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, &self.path)?;
        Ok(entries.len())
    }

    /// Reads the snapshot into a fresh keyspace. A missing file is an empty
    /// keyspace.
    pub fn load(&self) -> Result<Keyspace> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Keyspace::new()),
            Err(e) => return Err(e.into()),
        };
        let mut reader = BufReader::new(file);

        let mut header = [0u8; 8];
        reader.read_exact(&mut header).map_err(|_| {
            Error::CorruptSnapshot(format!("{}: file too short", self.path.display()))
        })?;
        if &header[..6] != MAGIC {
            return Err(Error::CorruptSnapshot(format!(
                "{}: not a snapshot file",
                self.path.display()
            )));
        }
        if header[6] != VERSION {
            return Err(Error::CorruptSnapshot(format!(
                "{}: unsupported version {}",
                self.path.display(),
                header[6]
            )));
        }

        let decoded: bincode::Result<Vec<Entry>> = if header[7] & FLAG_GZIP != 0 {
            bincode::deserialize_from(GzDecoder::new(reader))
        } else {
            bincode::deserialize_from(reader)
        };
        let entries = decoded
            .map_err(|e| Error::CorruptSnapshot(format!("{}: {}", self.path.display(), e)))?;

        let mut keyspace = Keyspace::new();
        for entry in entries {
            keyspace.restore(entry.key, entry.tag, entry.value, entry.expires_at)?;
        }
        Ok(keyspace)
    }

    fn write_file(&self, path: &Path, entries: &[EntryRef<'_>]) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(MAGIC)?;
        writer.write_all(&[VERSION, if self.compression { FLAG_GZIP } else { 0 }])?;

        let mut writer = if self.compression {
            let mut encoder = GzEncoder::new(writer, Compression::default());
            bincode::serialize_into(&mut encoder, entries)?;
            encoder.finish()?
        } else {
            bincode::serialize_into(&mut writer, entries)?;
            writer
        };

        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?
            .sync_all()?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
