//! Bridge from streaming pushes into the notification cache.
//!
//! Follows the lifecycle controller's view: whenever a new connection
//! handle appears, the bridge subscribes to its push fan-out and folds
//! notification events into the cache. Non-notification pushes and
//! malformed payloads are dropped with a log line; the polling loops
//! will repair anything the push path misses.

use std::sync::Arc;

use praxis_core::NotificationRecord;
use praxis_notify::NotificationCache;
use praxis_realtime::ConnectionView;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Push messages the bridge folds into the cache.
const NOTIFICATION_KIND_PREFIX: &str = "notification.";

/// Run until `shutdown` fires or the view source goes away.
pub async fn run(
    mut view: watch::Receiver<ConnectionView>,
    cache: Arc<NotificationCache>,
    shutdown: CancellationToken,
) {
    let mut subscribed: Option<String> = None;
    let mut pushes: Option<broadcast::Receiver<Value>> = None;

    loop {
        // Track the current handle; a new connection means a new fan-out
        // channel to subscribe to.
        {
            let current = view.borrow_and_update().connection.clone();
            match current {
                Some(handle) if subscribed.as_deref() != Some(handle.id()) => {
                    debug!(connection = %handle.id(), "bridging pushes from connection");
                    subscribed = Some(handle.id().to_string());
                    pushes = Some(handle.subscribe_pushes());
                }
                Some(_) => {}
                None => {
                    subscribed = None;
                    pushes = None;
                }
            }
        }

        tokio::select! {
            () = shutdown.cancelled() => break,
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            push = next_push(&mut pushes) => match push {
                Some(value) => fold_push(&cache, &value),
                None => pushes = None,
            }
        }
    }
    debug!("push bridge stopped");
}

/// Next push from the current subscription; pends forever without one.
async fn next_push(pushes: &mut Option<broadcast::Receiver<Value>>) -> Option<Value> {
    let Some(rx) = pushes else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(value) => return Some(value),
            Err(broadcast::error::RecvError::Lagged(dropped)) => {
                warn!(dropped, "push bridge lagged, events skipped");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Fold one push into the cache if it carries a notification.
fn fold_push(cache: &NotificationCache, value: &Value) {
    let kind = value.get("kind").and_then(Value::as_str).unwrap_or_default();
    if !kind.starts_with(NOTIFICATION_KIND_PREFIX) {
        return;
    }
    let Some(body) = value.get("notification") else {
        warn!(kind, "notification push without a body, ignoring");
        return;
    };
    match serde_json::from_value::<NotificationRecord>(body.clone()) {
        Ok(record) => {
            debug!(id = %record.id, kind, "applying pushed notification");
            cache.apply_push(record);
        }
        Err(e) => warn!(kind, error = %e, "malformed notification push, ignoring"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
