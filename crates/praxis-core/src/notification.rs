//! Notification record model and set helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One notification as delivered by the REST API or pushed over the
/// streaming connection.
///
/// Records are keyed by `id`; storage order is irrelevant, display order
/// is newest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// Server-assigned identifier.
    pub id: String,
    /// Whether the practitioner has read this notification.
    pub read: bool,
    /// Server-side creation time.
    pub created_at: DateTime<Utc>,
    /// Opaque notification body (type, title, deep link, ...).
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Count of unread records.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn count_unread(records: &[NotificationRecord]) -> u64 {
    records.iter().filter(|r| !r.read).count() as u64
}

/// Sort records into display order (newest first, id as tiebreaker so
/// the order is total).
pub fn sort_newest_first(records: &mut [NotificationRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, read: bool, ts_secs: i64) -> NotificationRecord {
        NotificationRecord {
            id: id.into(),
            read,
            created_at: Utc.timestamp_opt(ts_secs, 0).unwrap(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn count_unread_empty() {
        assert_eq!(count_unread(&[]), 0);
    }

    #[test]
    fn count_unread_mixed() {
        let records = vec![
            record("a", false, 1),
            record("b", true, 2),
            record("c", false, 3),
        ];
        assert_eq!(count_unread(&records), 2);
    }

    #[test]
    fn count_unread_all_read() {
        let records = vec![record("a", true, 1), record("b", true, 2)];
        assert_eq!(count_unread(&records), 0);
    }

    #[test]
    fn sort_puts_newest_first() {
        let mut records = vec![
            record("old", false, 1),
            record("new", false, 100),
            record("mid", false, 50),
        ];
        sort_newest_first(&mut records);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn sort_ties_break_on_id() {
        let mut records = vec![record("a", false, 10), record("b", false, 10)];
        sort_newest_first(&mut records);
        assert_eq!(records[0].id, "b");
        assert_eq!(records[1].id, "a");
    }

    #[test]
    fn serde_camel_case() {
        let json = serde_json::json!({
            "id": "n1",
            "read": false,
            "createdAt": "2026-08-01T10:00:00Z",
            "payload": {"kind": "appointment.created"}
        });
        let rec: NotificationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(rec.id, "n1");
        assert!(!rec.read);
        assert_eq!(rec.payload["kind"], "appointment.created");
    }

    #[test]
    fn serde_payload_defaults_to_null() {
        let json = serde_json::json!({
            "id": "n1",
            "read": true,
            "createdAt": "2026-08-01T10:00:00Z"
        });
        let rec: NotificationRecord = serde_json::from_value(json).unwrap();
        assert!(rec.payload.is_null());
    }
}
