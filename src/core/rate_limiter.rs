//! Admission control against the provider's requests-per-minute budget
//!
//! The configured requests-per-minute value is applied directly as a ceiling
//! on in-flight calls, with capacity returned on permit drop. The trailing
//! 60-second timestamp log is bookkeeping only and never replenishes permits,
//! so this enforces "at most K in flight" rather than a strict K-per-minute
//! rolling window.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant};
use tracing::debug;

use crate::core::errors::{Result, TranslateError};

/// Longest a caller may wait for admission before failing.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(120);

/// Trailing interval covered by the timestamp log.
const WINDOW: Duration = Duration::from_secs(60);

/// How often the background sweep prunes the log.
const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Concurrency-bounded rate limiter with a sliding-window request log.
///
/// Clones share the same capacity and log. The sweep task lives as long as
/// any clone does.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    window: Arc<Mutex<VecDeque<Instant>>>,
    _sweep: Arc<SweepGuard>,
}

/// RAII admission permit. Dropping it is the exactly-once release, on every
/// exit path.
#[derive(Debug)]
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

impl RateLimiter {
    /// Create a limiter admitting at most `requests_per_minute` concurrent
    /// calls. Must be called from within a tokio runtime.
    pub fn new(requests_per_minute: usize) -> Self {
        let permits = Arc::new(Semaphore::new(requests_per_minute));
        let window = Arc::new(Mutex::new(VecDeque::new()));
        let handle = tokio::spawn(sweep_loop(Arc::clone(&window)));

        Self {
            permits,
            window,
            _sweep: Arc::new(SweepGuard { handle }),
        }
    }

    /// Wait for admission, at most two minutes.
    ///
    /// On success the call is stamped into the window log and the returned
    /// permit holds capacity until dropped.
    pub async fn acquire(&self) -> Result<RatePermit> {
        let permit = timeout(ACQUIRE_TIMEOUT, Arc::clone(&self.permits).acquire_owned())
            .await
            .map_err(|_| TranslateError::RateLimitTimeout)?
            .map_err(|_| TranslateError::Internal {
                message: "rate limiter semaphore closed".to_string(),
            })?;

        self.window.lock().await.push_back(Instant::now());

        Ok(RatePermit { _permit: permit })
    }

    /// Permits currently available.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Requests admitted within the trailing window.
    pub async fn recent(&self) -> usize {
        let mut log = self.window.lock().await;
        prune(&mut log);
        log.len()
    }
}

/// Aborts the sweep task when the last limiter clone is dropped.
#[derive(Debug)]
struct SweepGuard {
    handle: JoinHandle<()>,
}

impl Drop for SweepGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn sweep_loop(window: Arc<Mutex<VecDeque<Instant>>>) {
    let mut tick = interval(SWEEP_INTERVAL);
    loop {
        tick.tick().await;

        let mut log = window.lock().await;
        let before = log.len();
        prune(&mut log);
        let removed = before - log.len();
        drop(log);

        if removed > 0 {
            debug!(removed, "pruned request timestamps outside window");
        }
    }
}

fn prune(log: &mut VecDeque<Instant>) {
    let now = Instant::now();
    while log
        .front()
        .is_some_and(|&stamp| now.duration_since(stamp) > WINDOW)
    {
        log.pop_front();
    }
}
