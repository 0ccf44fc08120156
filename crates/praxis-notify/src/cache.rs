//! Watch-backed notification cache.
//!
//! The cache holds a single [`NotificationSnapshot`] value behind a watch
//! channel and only ever replaces it wholesale, so readers can never
//! observe a half-updated list or a count that belongs to a different
//! snapshot than the records next to it.

use chrono::{DateTime, Utc};
use praxis_core::{NotificationRecord, count_unread, sort_newest_first};
use tokio::sync::watch;
use tracing::debug;

/// Consistent point-in-time view of the notification state.
#[derive(Clone, Debug, Default)]
pub struct NotificationSnapshot {
    /// All known notifications, newest first.
    pub records: Vec<NotificationRecord>,
    /// Unread count. Tracks `records` after a list refresh or push, but
    /// may be fresher than `records` between list polls since the count
    /// endpoint is polled on its own shorter interval.
    pub unread_count: u64,
    /// True when the last refresh attempt failed; the data shown is the
    /// last successful fetch.
    pub stale: bool,
    /// Time of the last successful refresh, if any.
    pub fetched_at: Option<DateTime<Utc>>,
}

/// Single-writer cache; clone receivers freely.
pub struct NotificationCache {
    tx: watch::Sender<NotificationSnapshot>,
}

impl Default for NotificationCache {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCache {
    /// Empty cache: no records, zero unread, not stale.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(NotificationSnapshot::default());
        Self { tx }
    }

    /// Subscribe to snapshot replacements.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<NotificationSnapshot> {
        self.tx.subscribe()
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> NotificationSnapshot {
        self.tx.borrow().clone()
    }

    /// Replace the record set from a successful list fetch. Recomputes
    /// the unread count from the new records and clears staleness.
    pub fn replace_records(&self, mut records: Vec<NotificationRecord>) {
        sort_newest_first(&mut records);
        let unread_count = count_unread(&records);
        debug!(total = records.len(), unread = unread_count, "notification list replaced");
        let _ = self.tx.send_replace(NotificationSnapshot {
            records,
            unread_count,
            stale: false,
            fetched_at: Some(Utc::now()),
        });
    }

    /// Replace just the unread count from a successful count fetch. The
    /// record set is left as-is.
    pub fn set_unread_count(&self, unread_count: u64) {
        let _ = self.tx.send_modify(|snapshot| {
            snapshot.unread_count = unread_count;
            snapshot.stale = false;
            snapshot.fetched_at = Some(Utc::now());
        });
    }

    /// Fold one pushed notification into the snapshot: upsert by id,
    /// re-sort, recompute the count.
    ///
    /// The whole read-modify-write runs inside `send_modify`, so a push
    /// racing a concurrent `replace_records` can never resurrect a
    /// superseded record set.
    pub fn apply_push(&self, record: NotificationRecord) {
        let _ = self.tx.send_modify(|snapshot| {
            match snapshot.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => snapshot.records.push(record),
            }
            sort_newest_first(&mut snapshot.records);
            snapshot.unread_count = count_unread(&snapshot.records);
        });
    }

    /// Flag the current data as stale after a failed refresh. The cached
    /// values are kept; showing yesterday's list beats showing nothing.
    pub fn mark_stale(&self) {
        let _ = self.tx.send_modify(|snapshot| snapshot.stale = true);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
