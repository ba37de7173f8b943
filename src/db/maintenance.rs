//! Background Maintenance
//!
//! Each open database owns one maintenance thread. It runs a single-threaded
//! tokio runtime and multiplexes three timers plus a shutdown signal:
//!
//! ```text
//!   ┌──────────────── tokio::select! ────────────────┐
//!   │ expiry sweep   adaptive, 10ms..1s              │──▶ purge_expired
//!   │ AOF flush      every 1s (EverySec only)        │──▶ aof.flush
//!   │ snapshot       every rdb_save_frequency        │──▶ rdb.save
//!   │ shutdown       watch channel                   │──▶ exit
//!   └────────────────────────────────────────────────┘
//! ```
//!
//! Every job takes the database lock for its whole duration, exactly like a
//! command does.
//!
//! ## Adaptive Sweep
//!
//! If a sweep finds many expired keys the next one comes sooner; if it
//! finds none, the interval backs off toward the maximum.

use crate::config::{AofFsync, Config};
use crate::db::{Shared, Status};
use crate::error::Result;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, trace};

const FLUSH_PERIOD: Duration = Duration::from_secs(1);

/// Tuning for the expiry sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiryConfig {
    /// Starting interval between sweeps (default: 100ms)
    pub base_interval: Duration,

    /// Shortest interval (default: 10ms)
    pub min_interval: Duration,

    /// Longest interval (default: 1s)
    pub max_interval: Duration,

    /// Halve the interval when more than this fraction of volatile keys expired
    pub speedup_threshold: f64,

    /// Double the interval when less than this fraction expired
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
        }
    }
}

impl ExpiryConfig {
    /// The interval to wait after a sweep that removed `expired` of
    /// `volatile` keys.
    pub fn next_interval(&self, current: Duration, expired: usize, volatile: usize) -> Duration {
        if volatile == 0 {
            return (current * 2).min(self.max_interval);
        }
        let rate = expired as f64 / volatile as f64;
        if rate > self.speedup_threshold {
            (current / 2).max(self.min_interval)
        } else if rate < self.slowdown_threshold && expired == 0 {
            (current * 2).min(self.max_interval)
        } else {
            current
        }
    }
}

/// What the loop has to do, derived from the database config.
#[derive(Debug, Clone)]
struct Schedule {
    expiry: ExpiryConfig,
    flush_every: Option<Duration>,
    snapshot_every: Option<Duration>,
}

impl Schedule {
    fn from_config(config: &Config) -> Self {
        let flush = config.persistence.aof_enabled() && config.aof_fsync == AofFsync::EverySec;
        let snapshot = config.persistence.rdb_enabled() && !config.rdb_save_frequency.is_zero();
        Self {
            expiry: config.expiry.clone(),
            flush_every: flush.then_some(FLUSH_PERIOD),
            snapshot_every: snapshot.then_some(config.rdb_save_frequency),
        }
    }
}

/// Handle to a running maintenance thread.
///
/// Dropping the handle stops the thread and waits for it to exit.
#[derive(Debug)]
pub struct Maintenance {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Maintenance {
    /// Spawns the maintenance thread for `shared`.
    pub(crate) fn start(shared: Arc<Shared>, config: &Config) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let schedule = Schedule::from_config(config);

        let handle = thread::Builder::new()
            .name(format!("lumenkv-{}", config.db_name))
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(db = %shared.identity, error = %e, "Failed to start maintenance runtime");
                        return;
                    }
                };
                runtime.block_on(maintenance_loop(shared, schedule, shutdown_rx));
            })?;

        debug!(db = %config.identity(), "Maintenance task started");
        Ok(Self {
            shutdown_tx,
            handle: Some(handle),
        })
    }

    /// Signals the thread and joins it. Safe to call more than once.
    pub fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Maintenance thread panicked");
            }
        }
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.stop();
    }
}

fn interval_every(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Waits for the next tick, or forever when the job is disabled.
async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn maintenance_loop(
    shared: Arc<Shared>,
    schedule: Schedule,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut sweep_interval = schedule.expiry.base_interval;
    let sweep = tokio::time::sleep(sweep_interval);
    tokio::pin!(sweep);

    let mut flush = schedule.flush_every.map(interval_every);
    let mut snapshot = schedule.snapshot_every.map(interval_every);

    loop {
        tokio::select! {
            _ = &mut sweep => {
                sweep_interval = sweep_expired(&shared, &schedule.expiry, sweep_interval);
                sweep.as_mut().reset(Instant::now() + sweep_interval);
            }
            _ = tick(&mut flush) => flush_log(&shared),
            _ = tick(&mut snapshot) => take_snapshot(&shared),
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!(db = %shared.identity, "Maintenance task received shutdown signal");
                    return;
                }
            }
        }
    }
}

/// One active-expiry pass. Returns the interval until the next one.
fn sweep_expired(shared: &Shared, expiry: &ExpiryConfig, current: Duration) -> Duration {
    let mut state = shared.state.lock();
    if state.status != Status::Open {
        return current;
    }

    let volatile = state.keyspace.volatile_count();
    let expired = state.keyspace.purge_expired();
    state.log_evictions();
    let next = expiry.next_interval(current, expired, volatile);

    if expired > 0 {
        debug!(
            db = %shared.identity,
            expired,
            keys_remaining = state.keyspace.len(),
            next_interval_ms = next.as_millis() as u64,
            "Expired keys cleaned up"
        );
    } else {
        trace!(next_interval_ms = next.as_millis() as u64, "Nothing to expire");
    }
    next
}

fn flush_log(shared: &Shared) {
    let mut state = shared.state.lock();
    if state.status != Status::Open {
        return;
    }
    if let Some(aof) = state.aof.as_mut() {
        if let Err(e) = aof.flush() {
            error!(db = %shared.identity, error = %e, "Background AOF flush failed");
        }
    }
}

fn take_snapshot(shared: &Shared) {
    let mut state = shared.state.lock();
    if state.status != Status::Open {
        return;
    }
    if let Err(e) = state.snapshot() {
        error!(db = %shared.identity, error = %e, "Background snapshot failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_speeds_up_on_heavy_expiry() {
        let config = ExpiryConfig::default();
        let next = config.next_interval(Duration::from_millis(100), 50, 100);
        assert_eq!(next, Duration::from_millis(50));

        let floor = config.next_interval(Duration::from_millis(12), 90, 100);
        assert_eq!(floor, config.min_interval);
    }

    #[test]
    fn test_interval_backs_off_when_idle() {
        let config = ExpiryConfig::default();
        assert_eq!(
            config.next_interval(Duration::from_millis(100), 0, 100),
            Duration::from_millis(200)
        );
        assert_eq!(
            config.next_interval(Duration::from_millis(800), 0, 0),
            config.max_interval
        );
    }

    #[test]
    fn test_interval_holds_steady_in_between() {
        let config = ExpiryConfig::default();
        assert_eq!(
            config.next_interval(Duration::from_millis(100), 10, 100),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_schedule_follows_persistence() {
        use crate::config::Persistence;

        let everysec = Config::new()
            .persistence(Persistence::Mixed)
            .aof_fsync(AofFsync::EverySec);
        let schedule = Schedule::from_config(&everysec);
        assert_eq!(schedule.flush_every, Some(FLUSH_PERIOD));
        assert_eq!(schedule.snapshot_every, Some(Duration::from_secs(600)));

        let aof_only = Config::new().persistence(Persistence::Aof);
        let schedule = Schedule::from_config(&aof_only);
        assert_eq!(schedule.flush_every, None);
        assert_eq!(schedule.snapshot_every, None);
    }
}
