//! Cached `date` header value
//!
//! Responders splice the current IMF-fixdate into every dated response. The
//! value is formatted once per tick by a background task and read lock-free.

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Length of an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`)
pub const DATE_LEN: usize = 29;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Formatted date bytes
pub type DateSnapshot = [u8; DATE_LEN];

static GLOBAL: Lazy<Arc<DateHeaderCache>> = Lazy::new(|| Arc::new(DateHeaderCache::new()));

/// Single writer, many readers
#[derive(Debug)]
pub struct DateHeaderCache {
    current: ArcSwap<DateSnapshot>,
}

impl DateHeaderCache {
    /// Cache holding the current time
    pub fn new() -> Self {
        Self::at(SystemTime::now())
    }

    pub fn at(time: SystemTime) -> Self {
        Self {
            current: ArcSwap::from_pointee(format_date(time)),
        }
    }

    /// Process-wide cache, created on first use
    pub fn global() -> &'static Arc<DateHeaderCache> {
        &GLOBAL
    }

    #[inline]
    pub fn snapshot(&self) -> Arc<DateSnapshot> {
        self.current.load_full()
    }

    pub fn refresh(&self) {
        self.store(SystemTime::now());
    }

    pub fn store(&self, time: SystemTime) {
        self.current.store(Arc::new(format_date(time)));
    }
}

impl Default for DateHeaderCache {
    fn default() -> Self {
        Self::new()
    }
}

fn format_date(time: SystemTime) -> DateSnapshot {
    let formatted = httpdate::fmt_http_date(time);
    let mut out = [b' '; DATE_LEN];
    let len = formatted.len().min(DATE_LEN);
    out[..len].copy_from_slice(&formatted.as_bytes()[..len]);
    out
}

/// Background task keeping a [`DateHeaderCache`] fresh
pub struct DateRefresher;

impl DateRefresher {
    /// Refresh every [`REFRESH_INTERVAL`] until `shutdown` turns true or its
    /// sender is dropped.
    pub fn spawn(cache: Arc<DateHeaderCache>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        Self::spawn_with_interval(cache, shutdown, REFRESH_INTERVAL)
    }

    pub fn spawn_with_interval(
        cache: Arc<DateHeaderCache>,
        mut shutdown: watch::Receiver<bool>,
        interval: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(interval_ms = interval.as_millis() as u64, "date refresher started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => cache.refresh(),
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("date refresher stopped");
        })
    }
}
