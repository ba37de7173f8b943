//! Process-wide registry of open databases.
//!
//! Maps a database identity to a weak handle, so opening the same data
//! directory and name twice yields the same instance while it is open.
//! The registry has its own lock, separate from any database's data lock;
//! it never holds a database lock itself.

use crate::db::Database;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

static REGISTRY: OnceLock<Mutex<HashMap<String, Weak<Database>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Weak<Database>>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the live instance registered under `identity`, or opens a new one
/// with `open` and registers it.
///
/// Opening happens under the registry lock, so two threads racing to open
/// the same identity end up sharing one instance.
pub(crate) fn get_or_open(
    identity: &str,
    open: impl FnOnce() -> Result<Arc<Database>>,
) -> Result<Arc<Database>> {
    // Declared before the guard so a stale handle is released after the lock
    let mut stale = None;
    let mut map = registry().lock();

    if let Some(existing) = map.get(identity).and_then(Weak::upgrade) {
        if existing.is_open() {
            return Ok(existing);
        }
        stale = Some(existing);
    }

    let database = open()?;
    map.insert(identity.to_string(), Arc::downgrade(&database));
    drop(map);
    drop(stale);
    Ok(database)
}

/// Removes `identity` if it still points at `database`.
pub(crate) fn forget(identity: &str, database: &Database) {
    let mut map = registry().lock();
    let registered = map
        .get(identity)
        .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), database));
    if registered {
        map.remove(identity);
    }
}

/// Number of identities currently registered.
pub(crate) fn len() -> usize {
    let mut map = registry().lock();
    map.retain(|_, weak| weak.strong_count() > 0);
    map.len()
}

#[cfg(test)]
pub(crate) fn contains(identity: &str) -> bool {
    registry()
        .lock()
        .get(identity)
        .is_some_and(|weak| weak.strong_count() > 0)
}
