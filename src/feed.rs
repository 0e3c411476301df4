//! Activity log and live feed.
//!
//! Every economy event is appended to the permanent `activity_log`; events
//! meant for the front page ticker are additionally pushed to `live_feed`,
//! which a background sweep prunes by TTL. Writes here are best-effort by
//! contract: they run after the money commit, so a failed append is logged
//! and swallowed rather than unwinding a settled balance.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::store::{paths, LedgerStore, StoreError};

#[derive(Clone)]
pub struct ActivityLog {
    ledger: Arc<dyn LedgerStore>,
}

impl ActivityLog {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    fn entry(kind: &str, uid: Option<&str>, message: &str, now: i64) -> Value {
        let mut entry = json!({
            "type": kind,
            "message": message,
            "timestamp": now,
        });
        if let Some(uid) = uid {
            entry["uid"] = json!(uid);
        }
        entry
    }

    /// Append to the permanent activity log.
    pub fn record(&self, kind: &str, message: &str) {
        self.record_for(kind, None, message);
    }

    pub fn record_for(&self, kind: &str, uid: Option<&str>, message: &str) {
        let now = Utc::now().timestamp();
        let entry = Self::entry(kind, uid, message, now);
        if let Err(err) = self.ledger.push(paths::ACTIVITY_LOG, &entry) {
            warn!(kind, %err, "failed to append activity log entry");
        }
    }

    /// Append to both the permanent log and the short-lived ticker feed.
    pub fn live(&self, kind: &str, uid: Option<&str>, message: &str) {
        let now = Utc::now().timestamp();
        let entry = Self::entry(kind, uid, message, now);
        if let Err(err) = self.ledger.push(paths::ACTIVITY_LOG, &entry) {
            warn!(kind, %err, "failed to append activity log entry");
        }
        if let Err(err) = self.ledger.push(paths::LIVE_FEED, &entry) {
            warn!(kind, %err, "failed to append live feed entry");
        }
    }

    /// Drop a message into a user's inbox.
    pub fn notify(&self, uid: &str, title: &str, body: &str) {
        let entry = json!({
            "title": title,
            "body": body,
            "timestamp": Utc::now().timestamp(),
            "read": false,
        });
        if let Err(err) = self.ledger.push(&paths::user_messages(uid), &entry) {
            warn!(uid, %err, "failed to deliver user message");
        }
    }

    /// Remove live feed entries older than `ttl_secs`. Returns how many
    /// entries were removed.
    pub fn sweep_expired(&self, now: i64, ttl_secs: i64) -> Result<usize, StoreError> {
        let Some(feed) = self.ledger.get(paths::LIVE_FEED)? else {
            return Ok(0);
        };
        let Some(entries) = feed.as_object() else {
            return Ok(0);
        };

        let cutoff = now - ttl_secs;
        let mut batch = crate::store::BatchUpdate::new();
        for (key, entry) in entries {
            let ts = entry.get("timestamp").and_then(Value::as_i64).unwrap_or(0);
            if ts < cutoff {
                batch.remove(format!("{}/{key}", paths::LIVE_FEED));
            }
        }
        let removed = batch.len();
        if removed > 0 {
            self.ledger.update(&batch)?;
        }
        Ok(removed)
    }

    /// Newest-first slice of the ticker feed.
    pub fn live_entries(&self, limit: usize) -> Result<Vec<Value>, StoreError> {
        let Some(feed) = self.ledger.get(paths::LIVE_FEED)? else {
            return Ok(Vec::new());
        };
        let Some(entries) = feed.as_object() else {
            return Ok(Vec::new());
        };
        // Push keys sort chronologically, so reverse iteration is newest
        // first.
        Ok(entries.values().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;

    #[test]
    fn sweep_removes_only_expired_entries() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger
            .push(paths::LIVE_FEED, &json!({"message": "old", "timestamp": 100}))
            .unwrap();
        ledger
            .push(paths::LIVE_FEED, &json!({"message": "fresh", "timestamp": 190}))
            .unwrap();

        let feed = ActivityLog::new(ledger.clone());
        let removed = feed.sweep_expired(200, 60).unwrap();
        assert_eq!(removed, 1);

        let remaining = feed.live_entries(10).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["message"], "fresh");
    }

    #[test]
    fn live_entries_are_newest_first() {
        let ledger = Arc::new(MemoryLedger::new());
        let feed = ActivityLog::new(ledger);
        feed.live("test", None, "first");
        feed.live("test", None, "second");

        let entries = feed.live_entries(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["message"], "second");
    }
}
