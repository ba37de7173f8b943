//! Database instances.
//!
//! A [`Database`] ties a [`Keyspace`] to its persistence files and its
//! maintenance thread, and puts all of it behind one lock.
//!
//! ## Lifecycle
//!
//! ```text
//!   Loading ──▶ Open ──▶ Closing ──▶ Closed
//!      │                                ▲
//!      └── load .rdb, replay .aof,      └── close() or drop of the
//!          snapshot if replayed,            last handle
//!          purge expired keys
//! ```
//!
//! Every command checks the status under the lock and fails with
//! [`Error::Closed`] once the database has begun closing.
//!
//! ## Journaling
//!
//! Mutating commands go through [`Database::write`]: the keyspace call runs
//! first, and only if it reports a change is the matching [`Command`]
//! appended to the log. Failed and no-op calls never reach the log.

mod commands;
mod maintenance;
mod registry;

pub use maintenance::{ExpiryConfig, Maintenance};

use crate::config::{AofFsync, Config, Persistence};
use crate::error::{Error, Result};
use crate::persistence::{Aof, Command, Rdb};
use crate::storage::{Keyspace, Outcome};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where a database is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Loading,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Loading => "loading",
            Status::Open => "open",
            Status::Closing => "closing",
            Status::Closed => "closed",
        })
    }
}

/// Returned by [`Database::info`].
#[derive(Debug, Clone, PartialEq)]
pub struct Info {
    pub identity: String,
    pub status: Status,
    pub persistence: Persistence,
    pub aof_fsync: AofFsync,
    /// Keys currently stored, including expired ones not yet swept.
    pub keys: usize,
    pub volatile_keys: usize,
    /// Log bytes waiting for the next flush.
    pub aof_pending_bytes: usize,
}

/// Everything the lock protects.
pub(crate) struct State {
    keyspace: Keyspace,
    aof: Option<Aof>,
    rdb: Option<Rdb>,
    status: Status,
}

impl State {
    /// Saves a snapshot and empties the log it supersedes.
    ///
    /// # Returns
    ///
    /// `false` when snapshots are disabled.
    fn snapshot(&mut self) -> Result<bool> {
        let Some(rdb) = &self.rdb else {
            return Ok(false);
        };
        let entries = rdb.save(&self.keyspace)?;
        if let Some(aof) = self.aof.as_mut() {
            aof.clear()?;
        }
        info!(entries, path = %rdb.path().display(), "Snapshot saved");
        Ok(true)
    }

    /// Logs the keys expiry removed since the last call as one `DEL`.
    fn log_evictions(&mut self) {
        let keys = self.keyspace.take_evicted();
        if keys.is_empty() {
            return;
        }
        if let Some(aof) = self.aof.as_mut() {
            aof.append(&Command::Del { keys });
        }
    }

    /// Final persistence work on close: flush the log, or in snapshot-only
    /// mode write one last snapshot.
    fn shutdown(&mut self) -> Result<()> {
        match self.aof.as_mut() {
            Some(aof) => aof.flush(),
            None => self.snapshot().map(drop),
        }
    }
}

/// The part of a database shared with its maintenance thread.
pub(crate) struct Shared {
    identity: String,
    state: Mutex<State>,
}

impl Shared {
    /// Locks the state, failing if the database is not open.
    fn lock_open(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.state.lock();
        if state.status != Status::Open {
            return Err(Error::Closed(self.identity.clone()));
        }
        Ok(state)
    }
}

/// An open database.
///
/// Handles are `Arc<Database>` and can be shared freely between threads.
/// Every command locks the whole database for its duration, so commands
/// are applied (and logged) in one total order.
///
/// ```no_run
/// use lumenkv::{Config, Database};
///
/// let db = Database::open(Config::new().data_dir("/tmp/lumenkv").db_name("demo"))?;
/// db.set("greeting", "hello", &Default::default())?;
/// assert_eq!(db.get("greeting")?, Some("hello".to_string()));
/// db.close()?;
/// # Ok::<(), lumenkv::Error>(())
/// ```
pub struct Database {
    config: Config,
    shared: Arc<Shared>,
    maintenance: Mutex<Option<Maintenance>>,
}

impl Database {
    /// Opens the database described by `config`.
    ///
    /// With `config.singleton` set (the default), an identity that is
    /// already open in this process returns the existing instance.
    pub fn open(config: Config) -> Result<Arc<Database>> {
        if !config.singleton {
            return Self::start(config);
        }
        // The identity resolves the directory, so it has to exist first
        std::fs::create_dir_all(&config.data_dir)?;
        let identity = config.identity();
        registry::get_or_open(&identity, move || Self::start(config))
    }

    /// Opens a database from a `lumenkv://` connection string.
    pub fn connect(url: &str) -> Result<Arc<Database>> {
        Self::open(Config::from_connection_string(url)?)
    }

    /// Opens `db_name` under `data_dir` with default settings.
    pub fn open_path(data_dir: impl AsRef<Path>, db_name: &str) -> Result<Arc<Database>> {
        Self::open(
            Config::new()
                .data_dir(data_dir.as_ref())
                .db_name(db_name),
        )
    }

    fn start(config: Config) -> Result<Arc<Database>> {
        std::fs::create_dir_all(&config.data_dir)?;
        let identity = config.identity();
        info!(
            db = %identity,
            persistence = %config.persistence,
            fsync = %config.aof_fsync,
            "Opening database"
        );

        let rdb = config
            .persistence
            .rdb_enabled()
            .then(|| Rdb::new(config.rdb_path(), config.compression));
        let mut keyspace = match &rdb {
            Some(rdb) => rdb.load()?,
            None => Keyspace::new(),
        };
        let loaded = keyspace.len();
        if config.persistence.aof_enabled() {
            keyspace.track_evictions();
        }

        let mut aof = None;
        let mut replayed = 0;
        if config.persistence.aof_enabled() {
            let mut log = Aof::open(config.aof_path(), config.aof_fsync)?;
            let stats = log.replay(&mut keyspace)?;
            if stats.skipped > 0 || stats.truncated > 0 {
                warn!(
                    db = %identity,
                    skipped = stats.skipped,
                    truncated_bytes = stats.truncated,
                    "AOF replay was not clean"
                );
            }
            replayed = stats.applied;
            aof = Some(log);
        }

        let mut state = State {
            keyspace,
            aof,
            rdb,
            status: Status::Loading,
        };

        let expired = state.keyspace.purge_expired();
        state.log_evictions();
        if replayed > 0 {
            // Fold the replayed log into a fresh snapshot
            if let Err(e) = state.snapshot() {
                error!(db = %identity, error = %e, "Snapshot after replay failed, keeping the log");
            }
        }
        state.status = Status::Open;

        info!(
            db = %identity,
            loaded,
            replayed,
            expired,
            keys = state.keyspace.len(),
            "Database open"
        );

        let shared = Arc::new(Shared {
            identity,
            state: Mutex::new(state),
        });
        let maintenance = Maintenance::start(Arc::clone(&shared), &config)?;

        Ok(Arc::new(Database {
            config,
            shared,
            maintenance: Mutex::new(Some(maintenance)),
        }))
    }

    pub fn identity(&self) -> &str {
        &self.shared.identity
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn status(&self) -> Status {
        self.shared.state.lock().status
    }

    pub fn is_open(&self) -> bool {
        self.status() == Status::Open
    }

    /// Forces a snapshot now.
    ///
    /// # Returns
    ///
    /// `false` when snapshots are disabled for this database.
    pub fn save(&self) -> Result<bool> {
        self.shared.lock_open()?.snapshot()
    }

    /// Writes any buffered log records to disk.
    pub fn flush(&self) -> Result<()> {
        match self.shared.lock_open()?.aof.as_mut() {
            Some(aof) => aof.flush(),
            None => Ok(()),
        }
    }

    /// Closes the database. Idempotent.
    ///
    /// Stops the maintenance thread, flushes the log (or, with snapshots
    /// only, writes a final snapshot) and unregisters the instance. Any
    /// command issued afterwards fails with [`Error::Closed`].
    ///
    /// # Returns
    ///
    /// The error from the final flush, if it failed.
    pub fn close(&self) -> Result<()> {
        // The maintenance thread takes the state lock, so stop it first
        if let Some(mut maintenance) = self.maintenance.lock().take() {
            maintenance.stop();
        }

        let result = {
            let mut state = self.shared.state.lock();
            if state.status == Status::Closed {
                return Ok(());
            }
            state.status = Status::Closing;
            let result = state.shutdown();
            state.status = Status::Closed;
            result
        };

        registry::forget(&self.shared.identity, self);
        match &result {
            Ok(()) => info!(db = %self.shared.identity, "Database closed"),
            Err(e) => error!(db = %self.shared.identity, error = %e, "Database closed with a failed flush"),
        }
        result
    }

    /// Runs a mutating keyspace call and logs `record` if it changed anything.
    pub(crate) fn write<T, R>(
        &self,
        op: impl FnOnce(&mut Keyspace) -> Result<Outcome<T>>,
        record: impl FnOnce(&T) -> R,
    ) -> Result<T>
    where
        R: Into<Option<Command>>,
    {
        let mut guard = self.shared.lock_open()?;
        let state = &mut *guard;
        let result = op(&mut state.keyspace);
        state.log_evictions();
        let outcome = result?;
        if outcome.mutated {
            if let Some(aof) = state.aof.as_mut() {
                if let Some(command) = record(&outcome.value).into() {
                    aof.append(&command);
                }
            }
        }
        Ok(outcome.value)
    }

    /// Runs a read-only keyspace call.
    pub(crate) fn read<T>(&self, op: impl FnOnce(&mut Keyspace) -> Result<T>) -> Result<T> {
        let mut state = self.shared.lock_open()?;
        let result = op(&mut state.keyspace);
        state.log_evictions();
        result
    }

    /// A point-in-time summary of the database.
    pub fn info(&self) -> Result<Info> {
        let state = self.shared.lock_open()?;
        Ok(Info {
            identity: self.shared.identity.clone(),
            status: state.status,
            persistence: self.config.persistence,
            aof_fsync: self.config.aof_fsync,
            keys: state.keyspace.len(),
            volatile_keys: state.keyspace.volatile_count(),
            aof_pending_bytes: state.aof.as_ref().map_or(0, Aof::pending),
        })
    }

    /// Number of databases currently registered in this process.
    pub fn registered() -> usize {
        registry::len()
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("identity", &self.shared.identity)
            .field("status", &self.status())
            .finish()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!(db = %self.shared.identity, error = %e, "Failed to close database on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SetOptions;
    use tempfile::tempdir;

    fn config(dir: &Path) -> Config {
        Config::new().data_dir(dir).db_name("test")
    }

    #[test]
    fn test_open_write_reopen() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(config(dir.path())).unwrap();
            db.set("k", "v", &SetOptions::default()).unwrap();
            db.close().unwrap();
        }
        let db = Database::open(config(dir.path())).unwrap();
        assert_eq!(db.get("k").unwrap(), Some("v".to_string()));
    }

    #[test]
    fn test_singleton_shares_instance() {
        let dir = tempdir().unwrap();
        let a = Database::open(config(dir.path())).unwrap();
        let b = Database::connect(&format!("lumenkv://{}/test", dir.path().display())).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(registry::contains(a.identity()));

        a.close().unwrap();
        assert!(!registry::contains(b.identity()));
        let c = Database::open(config(dir.path())).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_non_singleton_gets_own_instance() {
        let dir = tempdir().unwrap();
        let a = Database::open(config(dir.path()).db_name("solo").singleton(false)).unwrap();
        let b = Database::open(config(dir.path()).db_name("solo").singleton(false)).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!registry::contains(a.identity()));
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let dir = tempdir().unwrap();
        let db = Database::open(config(dir.path())).unwrap();
        db.close().unwrap();
        db.close().unwrap();
        assert_eq!(db.status(), Status::Closed);
        assert!(matches!(db.get("k"), Err(Error::Closed(_))));
        assert!(matches!(
            db.set("k", "v", &SetOptions::default()),
            Err(Error::Closed(_))
        ));
        assert!(matches!(db.save(), Err(Error::Closed(_))));
    }

    #[test]
    fn test_noop_writes_are_not_logged() {
        let dir = tempdir().unwrap();
        let db = Database::open(
            config(dir.path())
                .persistence(Persistence::Aof)
                .aof_fsync(AofFsync::Always),
        )
        .unwrap();
        db.delete(&["missing"]).unwrap();
        db.persist("missing").unwrap();
        assert!(db.lpush("s", &[] as &[&str]).is_err());
        assert_eq!(std::fs::metadata(db.config().aof_path()).unwrap().len(), 0);

        db.set("k", "v", &SetOptions::default()).unwrap();
        assert!(std::fs::metadata(db.config().aof_path()).unwrap().len() > 0);
    }

    #[test]
    fn test_save_clears_log() {
        let dir = tempdir().unwrap();
        let db = Database::open(config(dir.path())).unwrap();
        db.set("k", "v", &SetOptions::default()).unwrap();
        assert!(std::fs::metadata(db.config().aof_path()).unwrap().len() > 0);

        assert!(db.save().unwrap());
        assert_eq!(std::fs::metadata(db.config().aof_path()).unwrap().len(), 0);
        assert!(db.config().rdb_path().exists());
    }

    #[test]
    fn test_save_without_snapshots() {
        let dir = tempdir().unwrap();
        let db = Database::open(config(dir.path()).persistence(Persistence::Aof)).unwrap();
        assert!(!db.save().unwrap());
        assert!(!db.config().rdb_path().exists());
    }

    #[test]
    fn test_drop_closes() {
        let dir = tempdir().unwrap();
        let identity;
        {
            let db = Database::open(config(dir.path()).aof_fsync(AofFsync::Never)).unwrap();
            db.set("k", "v", &SetOptions::default()).unwrap();
            identity = db.identity().to_string();
        }
        assert!(!registry::contains(&identity));
        let db = Database::open(config(dir.path())).unwrap();
        assert_eq!(db.get("k").unwrap(), Some("v".to_string()));
    }
}
