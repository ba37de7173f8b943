//! Database configuration.
//!
//! A [`Config`] names a database (`data_dir` + `db_name`) and says how it is
//! persisted. It can be built three ways:
//!
//! ```
//! use lumenkv::config::{AofFsync, Config, Persistence};
//!
//! // Builder style
//! let config = Config::new()
//!     .data_dir("/var/lib/app")
//!     .db_name("sessions")
//!     .persistence(Persistence::Mixed)
//!     .aof_fsync(AofFsync::EverySec);
//!
//! // From a connection string
//! let same = Config::from_connection_string("lumenkv:///var/lib/app/sessions").unwrap();
//! assert_eq!(config.identity(), same.identity());
//! ```
//!
//! or from `LUMENKV_*` environment variables with [`Config::from_env`].

use crate::db::ExpiryConfig;
use crate::error::{Error, Result};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Scheme prefix accepted by [`Config::from_connection_string`].
pub const SCHEME: &str = "lumenkv://";

pub const DEFAULT_DB_NAME: &str = "lumenkv";
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_RDB_SAVE_FREQUENCY_SECS: u64 = 600;

/// Which persistence mechanisms are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persistence {
    /// Write-ahead log only.
    Aof,
    /// Periodic snapshots only.
    Rdb,
    /// Both: the log covers writes made since the last snapshot.
    #[default]
    Mixed,
}

impl Persistence {
    pub fn aof_enabled(self) -> bool {
        matches!(self, Persistence::Aof | Persistence::Mixed)
    }

    pub fn rdb_enabled(self) -> bool {
        matches!(self, Persistence::Rdb | Persistence::Mixed)
    }
}

impl FromStr for Persistence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aof" => Ok(Persistence::Aof),
            "rdb" => Ok(Persistence::Rdb),
            "mixed" => Ok(Persistence::Mixed),
            other => Err(Error::invalid(format!("unknown persistence mode '{}'", other))),
        }
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Persistence::Aof => "aof",
            Persistence::Rdb => "rdb",
            Persistence::Mixed => "mixed",
        })
    }
}

/// When buffered log records reach the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AofFsync {
    /// Write and sync after every record.
    #[default]
    Always,
    /// Sync once per second from the maintenance task.
    EverySec,
    /// Only write when a snapshot or close forces it.
    Never,
}

impl FromStr for AofFsync {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(AofFsync::Always),
            "everysec" | "every_sec" => Ok(AofFsync::EverySec),
            "never" | "no" => Ok(AofFsync::Never),
            other => Err(Error::invalid(format!("unknown fsync policy '{}'", other))),
        }
    }
}

impl fmt::Display for AofFsync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AofFsync::Always => "always",
            AofFsync::EverySec => "everysec",
            AofFsync::Never => "never",
        })
    }
}

/// Settings for one database instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database name; also the stem of the `.aof` / `.rdb` files.
    pub db_name: String,

    /// Directory holding the persistence files. Created on open.
    pub data_dir: PathBuf,

    pub persistence: Persistence,

    pub aof_fsync: AofFsync,

    /// Interval between background snapshots.
    pub rdb_save_frequency: Duration,

    /// Gzip the snapshot body.
    pub compression: bool,

    /// Share one live instance per identity within the process.
    pub singleton: bool,

    /// Tuning for the background expiry sweep.
    pub expiry: ExpiryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            persistence: Persistence::default(),
            aof_fsync: AofFsync::default(),
            rdb_save_frequency: Duration::from_secs(DEFAULT_RDB_SAVE_FREQUENCY_SECS),
            compression: true,
            singleton: true,
            expiry: ExpiryConfig::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = name.into();
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn persistence(mut self, persistence: Persistence) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn aof_fsync(mut self, fsync: AofFsync) -> Self {
        self.aof_fsync = fsync;
        self
    }

    pub fn rdb_save_frequency(mut self, every: Duration) -> Self {
        self.rdb_save_frequency = every;
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn singleton(mut self, enabled: bool) -> Self {
        self.singleton = enabled;
        self
    }

    pub fn expiry(mut self, expiry: ExpiryConfig) -> Self {
        self.expiry = expiry;
        self
    }

    /// Parses `lumenkv:///absolute/dir/name` or `lumenkv://relative/dir/name`.
    ///
    /// The last path segment is the database name; everything before it is
    /// the data directory (`.` when there is none).
    pub fn from_connection_string(url: &str) -> Result<Self> {
        let invalid = || Error::InvalidConnectionString(url.to_string());

        let path = url.strip_prefix(SCHEME).ok_or_else(invalid)?;
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return Err(invalid());
        }

        let (dir, name) = match path.rsplit_once('/') {
            Some(("", name)) => ("/", name),
            Some((dir, name)) => (dir, name),
            None => (".", path),
        };
        if name.is_empty() {
            return Err(invalid());
        }

        Ok(Self::default().data_dir(dir).db_name(name))
    }

    /// Loads configuration from `LUMENKV_*` environment variables.
    ///
    /// `LUMENKV_URL` takes precedence over `LUMENKV_DATA_DIR` / `LUMENKV_DB`.
    /// Unset variables keep their defaults; malformed ones are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("LUMENKV_URL") {
            Some(url) => Self::from_connection_string(&url)?,
            None => {
                let mut config = Self::default();
                if let Some(dir) = lookup("LUMENKV_DATA_DIR") {
                    config.data_dir = PathBuf::from(dir);
                }
                if let Some(name) = lookup("LUMENKV_DB") {
                    config.db_name = name;
                }
                config
            }
        };

        if let Some(mode) = lookup("LUMENKV_PERSISTENCE") {
            config.persistence = mode.parse()?;
        }
        if let Some(fsync) = lookup("LUMENKV_AOF_FSYNC") {
            config.aof_fsync = fsync.parse()?;
        }
        if let Some(secs) = lookup("LUMENKV_RDB_SAVE_FREQUENCY") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                Error::invalid(format!("LUMENKV_RDB_SAVE_FREQUENCY must be seconds, got '{}'", secs))
            })?;
            config.rdb_save_frequency = Duration::from_secs(secs);
        }
        if let Some(flag) = lookup("LUMENKV_COMPRESSION") {
            config.compression = parse_bool(&flag)?;
        }

        Ok(config)
    }

    /// The registry key for this database: resolved data directory plus name.
    ///
    /// An existing directory is canonicalized, following symlinks; one that
    /// does not exist yet is made absolute with `.` and `..` folded away.
    pub fn identity(&self) -> String {
        let dir = std::fs::canonicalize(&self.data_dir).unwrap_or_else(|_| {
            let absolute =
                std::path::absolute(&self.data_dir).unwrap_or_else(|_| self.data_dir.clone());
            normalize(&absolute)
        });
        format!("{}{}/{}", SCHEME, dir.display(), self.db_name)
    }

    pub fn aof_path(&self) -> PathBuf {
        self.file_path("aof")
    }

    pub fn rdb_path(&self) -> PathBuf {
        self.file_path("rdb")
    }

    fn file_path(&self, extension: &str) -> PathBuf {
        Path::new(&self.data_dir).join(format!("{}.{}", self.db_name, extension))
    }
}

/// Folds `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::invalid(format!("expected a boolean, got '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.db_name, "lumenkv");
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.persistence, Persistence::Mixed);
        assert_eq!(config.aof_fsync, AofFsync::Always);
        assert_eq!(config.rdb_save_frequency, Duration::from_secs(600));
        assert!(config.compression);
        assert!(config.singleton);
    }

    #[test]
    fn test_connection_string_absolute() {
        let config = Config::from_connection_string("lumenkv:///tmp/data/cache").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/data"));
        assert_eq!(config.db_name, "cache");
    }

    #[test]
    fn test_connection_string_relative() {
        let config = Config::from_connection_string("lumenkv://data/cache").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.db_name, "cache");

        let bare = Config::from_connection_string("lumenkv://cache").unwrap();
        assert_eq!(bare.data_dir, PathBuf::from("."));
        assert_eq!(bare.db_name, "cache");
    }

    #[test]
    fn test_connection_string_root_dir() {
        let config = Config::from_connection_string("lumenkv:///cache").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/"));
        assert_eq!(config.db_name, "cache");
    }

    #[test]
    fn test_connection_string_rejects_garbage() {
        assert!(matches!(
            Config::from_connection_string("redis://localhost/0"),
            Err(Error::InvalidConnectionString(_))
        ));
        assert!(Config::from_connection_string("lumenkv://").is_err());
        assert!(Config::from_connection_string("lumenkv:///").is_err());
    }

    #[test]
    fn test_identity_matches_across_spellings() {
        let a = Config::new().data_dir("/srv/kv").db_name("main");
        let b = Config::from_connection_string("lumenkv:///srv/kv/main").unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), a.clone().db_name("other").identity());
    }

    #[test]
    fn test_identity_folds_dot_segments() {
        let plain = Config::new().data_dir("/srv/kv").db_name("main");
        let dotted = Config::new().data_dir("/srv/./other/../kv/").db_name("main");
        assert_eq!(plain.identity(), dotted.identity());
    }

    #[test]
    fn test_identity_resolves_existing_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data")).unwrap();
        let plain = Config::new().data_dir(dir.path().join("data")).db_name("main");
        let dotted = Config::new()
            .data_dir(dir.path().join("data").join("..").join("data"))
            .db_name("main");
        assert_eq!(plain.identity(), dotted.identity());

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(dir.path().join("data"), dir.path().join("link")).unwrap();
            let linked = Config::new().data_dir(dir.path().join("link")).db_name("main");
            assert_eq!(plain.identity(), linked.identity());
        }
    }

    #[test]
    fn test_file_paths() {
        let config = Config::new().data_dir("/srv/kv").db_name("main");
        assert_eq!(config.aof_path(), PathBuf::from("/srv/kv/main.aof"));
        assert_eq!(config.rdb_path(), PathBuf::from("/srv/kv/main.rdb"));
    }

    #[test]
    fn test_from_env_vars() {
        let config = Config::from_lookup(lookup_from(&[
            ("LUMENKV_DATA_DIR", "/var/kv"),
            ("LUMENKV_DB", "jobs"),
            ("LUMENKV_PERSISTENCE", "AOF"),
            ("LUMENKV_AOF_FSYNC", "everysec"),
            ("LUMENKV_RDB_SAVE_FREQUENCY", "30"),
            ("LUMENKV_COMPRESSION", "off"),
        ]))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/kv"));
        assert_eq!(config.db_name, "jobs");
        assert_eq!(config.persistence, Persistence::Aof);
        assert_eq!(config.aof_fsync, AofFsync::EverySec);
        assert_eq!(config.rdb_save_frequency, Duration::from_secs(30));
        assert!(!config.compression);
    }

    #[test]
    fn test_from_env_url_wins() {
        let config = Config::from_lookup(lookup_from(&[
            ("LUMENKV_URL", "lumenkv:///opt/kv/main"),
            ("LUMENKV_DB", "ignored"),
        ]))
        .unwrap();
        assert_eq!(config.db_name, "main");
        assert_eq!(config.data_dir, PathBuf::from("/opt/kv"));
    }

    #[test]
    fn test_from_env_rejects_bad_values() {
        assert!(Config::from_lookup(lookup_from(&[("LUMENKV_PERSISTENCE", "tape")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("LUMENKV_RDB_SAVE_FREQUENCY", "soon")])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("LUMENKV_COMPRESSION", "maybe")])).is_err());
    }

    #[test]
    fn test_persistence_flags() {
        assert!(Persistence::Aof.aof_enabled());
        assert!(!Persistence::Aof.rdb_enabled());
        assert!(Persistence::Rdb.rdb_enabled());
        assert!(!Persistence::Rdb.aof_enabled());
        assert!(Persistence::Mixed.aof_enabled() && Persistence::Mixed.rdb_enabled());
    }
}
