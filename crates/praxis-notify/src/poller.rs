//! Decoupled notification polling loops.
//!
//! Two independent timers drive the cache: a full-list refresh on a long
//! interval and an unread-count refresh on a shorter one. The loops run
//! unconditionally while the poller is alive; they do not pause when the
//! streaming connection drops, so the REST path keeps the badge moving
//! even with realtime down.
//!
//! Read-state mutations are acknowledge-then-refetch: the server is the
//! source of truth, so a successful mark is followed by a refetch of both
//! the list and the count rather than a local edit. A refetch failure
//! after a successful mark leaves the pre-mutation values in place,
//! flagged stale, until the next poll succeeds.

use std::sync::Arc;
use std::time::Duration;

use praxis_core::NotificationRecord;
use praxis_settings::NotificationSettings;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::NotificationApi;
use crate::cache::{NotificationCache, NotificationSnapshot};
use crate::errors::Result;

/// Refresh cadence for the two polling loops.
#[derive(Clone, Copy, Debug)]
pub struct PollIntervals {
    /// Full-list refresh period.
    pub list: Duration,
    /// Unread-count refresh period.
    pub count: Duration,
}

impl PollIntervals {
    /// Build from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &NotificationSettings) -> Self {
        Self {
            list: Duration::from_millis(settings.list_interval_ms),
            count: Duration::from_millis(settings.count_interval_ms),
        }
    }
}

/// Owns the cache and the two polling tasks.
pub struct NotificationPoller {
    api: Arc<dyn NotificationApi>,
    cache: Arc<NotificationCache>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl NotificationPoller {
    /// Start polling immediately (each loop fires its first refresh at
    /// spawn, then every period thereafter).
    #[must_use]
    pub fn spawn(api: Arc<dyn NotificationApi>, intervals: PollIntervals) -> Self {
        let cache = Arc::new(NotificationCache::new());
        let shutdown = CancellationToken::new();

        let list_task = tokio::spawn(run_list_loop(
            api.clone(),
            cache.clone(),
            intervals.list,
            shutdown.clone(),
        ));
        let count_task = tokio::spawn(run_count_loop(
            api.clone(),
            cache.clone(),
            intervals.count,
            shutdown.clone(),
        ));

        Self {
            api,
            cache,
            shutdown,
            tasks: vec![list_task, count_task],
        }
    }

    /// Subscribe to snapshot replacements.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NotificationSnapshot> {
        self.cache.subscribe()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> NotificationSnapshot {
        self.cache.snapshot()
    }

    /// Fold a pushed notification into the cache.
    pub fn apply_push(&self, record: NotificationRecord) {
        self.cache.apply_push(record);
    }

    /// Shared handle to the cache, for writers that outlive a borrow of
    /// the poller (e.g. the push bridge task).
    #[must_use]
    pub fn cache(&self) -> Arc<NotificationCache> {
        self.cache.clone()
    }

    /// Refresh both caches immediately, outside the timer cadence.
    /// Failures are absorbed as staleness, same as a timed poll.
    pub async fn refresh_now(&self) {
        refresh_list(self.api.as_ref(), &self.cache).await;
        refresh_count(self.api.as_ref(), &self.cache).await;
    }

    /// Mark one notification read, then refetch.
    ///
    /// The mark itself failing is the caller's problem and propagates; a
    /// refetch failure after a successful mark is absorbed as staleness.
    pub async fn mark_read(&self, id: &str) -> Result<()> {
        self.api.mark_read(id).await?;
        debug!(id, "notification marked read, refetching");
        refresh_list(self.api.as_ref(), &self.cache).await;
        refresh_count(self.api.as_ref(), &self.cache).await;
        Ok(())
    }

    /// Mark every notification read, then refetch.
    pub async fn mark_all_read(&self) -> Result<()> {
        self.api.mark_all_read().await?;
        debug!("all notifications marked read, refetching");
        refresh_list(self.api.as_ref(), &self.cache).await;
        refresh_count(self.api.as_ref(), &self.cache).await;
        Ok(())
    }

    /// Stop both loops. The final snapshot stays readable through any
    /// receivers already handed out.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

async fn run_list_loop(
    api: Arc<dyn NotificationApi>,
    cache: Arc<NotificationCache>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => refresh_list(api.as_ref(), &cache).await,
        }
    }
}

async fn run_count_loop(
    api: Arc<dyn NotificationApi>,
    cache: Arc<NotificationCache>,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => refresh_count(api.as_ref(), &cache).await,
        }
    }
}

/// One list refresh; a failure keeps the cached records and flags them.
async fn refresh_list(api: &dyn NotificationApi, cache: &NotificationCache) {
    match api.list().await {
        Ok(records) => cache.replace_records(records),
        Err(e) => {
            warn!(error = %e, "notification list refresh failed");
            cache.mark_stale();
        }
    }
}

/// One count refresh; same failure policy as the list.
async fn refresh_count(api: &dyn NotificationApi, cache: &NotificationCache) {
    match api.unread_count().await {
        Ok(count) => cache.set_unread_count(count),
        Err(e) => {
            warn!(error = %e, "unread count refresh failed");
            cache.mark_stale();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
