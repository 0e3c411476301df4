//! Crawler directory and community operations.
//!
//! Likes, point donations, nominations and reports, plus the points-history
//! read model. Nomination and report text passes the configurable
//! banned-word filter before anything is written.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::config::SettingsStore;
use crate::errors::EngineError;
use crate::feed::ActivityLog;
use crate::models::{Crawler, HistoryPoint};
use crate::store::{paths, LedgerStore};

use super::wallet;

#[derive(Clone)]
pub struct CrawlerDirectory {
    ledger: Arc<dyn LedgerStore>,
    settings: SettingsStore,
    feed: ActivityLog,
}

/// Case-insensitive token match against the banned-word list.
pub fn contains_banned_word(text: &str, banned: &[String]) -> bool {
    if banned.is_empty() {
        return false;
    }
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .any(|token| banned.iter().any(|b| b.to_lowercase() == token))
}

impl CrawlerDirectory {
    pub fn new(ledger: Arc<dyn LedgerStore>, settings: SettingsStore, feed: ActivityLog) -> Self {
        Self { ledger, settings, feed }
    }

    pub fn list(&self) -> Result<Vec<Crawler>, EngineError> {
        let Some(tree) = self.ledger.get(paths::USERS)? else {
            return Ok(Vec::new());
        };
        let Some(entries) = tree.as_object() else {
            return Ok(Vec::new());
        };
        let mut crawlers: Vec<Crawler> = entries
            .iter()
            .filter_map(|(name, raw)| {
                let mut c: Crawler = serde_json::from_value(raw.clone()).ok()?;
                if c.name.is_empty() {
                    c.name = name.clone();
                }
                Some(c)
            })
            .collect();
        crawlers.sort_by(|a, b| b.points.cmp(&a.points));
        Ok(crawlers)
    }

    pub fn get(&self, name: &str) -> Result<Crawler, EngineError> {
        let raw = self
            .ledger
            .get(&paths::crawler(name))?
            .ok_or_else(|| EngineError::not_found(format!("crawler '{name}'")))?;
        serde_json::from_value(raw).map_err(|_| EngineError::validation("corrupt crawler record"))
    }

    pub fn like(&self, uid: &str, name: &str) -> Result<i64, EngineError> {
        if self.ledger.get(&paths::crawler(name))?.is_none() {
            return Err(EngineError::not_found(format!("crawler '{name}'")));
        }
        let result = self.ledger.transaction(&paths::crawler_likes(name), &mut |current| {
            let likes = current.and_then(Value::as_i64).unwrap_or(0);
            Some(json!(likes + 1))
        })?;
        self.feed.record_for("like", Some(uid), &format!("{uid} liked {name}"));
        Ok(result.value.as_ref().and_then(Value::as_i64).unwrap_or(0))
    }

    pub fn unlike(&self, _uid: &str, name: &str) -> Result<i64, EngineError> {
        if self.ledger.get(&paths::crawler(name))?.is_none() {
            return Err(EngineError::not_found(format!("crawler '{name}'")));
        }
        let result = self.ledger.transaction(&paths::crawler_likes(name), &mut |current| {
            let likes = current.and_then(Value::as_i64).unwrap_or(0);
            Some(json!((likes - 1).max(0)))
        })?;
        Ok(result.value.as_ref().and_then(Value::as_i64).unwrap_or(0))
    }

    /// Gift points to a crawler. Positive integer amounts only.
    pub fn donate_points(
        &self,
        uid: &str,
        name: &str,
        amount: i64,
        now: i64,
    ) -> Result<i64, EngineError> {
        if amount <= 0 {
            return Err(EngineError::validation("donation must be a positive number of points"));
        }
        let new_points = wallet::credit_points(self.ledger.as_ref(), name, amount)?;

        let entry = json!({"points": new_points, "timestamp": now, "reason": "donation"});
        if let Err(err) = self.ledger.push(&paths::points_history(name), &entry) {
            tracing::warn!(%err, "failed to record donation history");
        }
        self.feed.live(
            "donation",
            Some(uid),
            &format!("{uid} donated {amount} points to {name}"),
        );
        info!(uid, name, amount, "points donated");
        Ok(new_points)
    }

    /// Propose a new crawler. Creates a candidate record for admin review.
    pub fn nominate(&self, uid: &str, name: &str, reason: &str, now: i64) -> Result<(), EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("a nominee needs a name"));
        }
        let banned = self.settings.moderation()?.banned_words;
        if contains_banned_word(name, &banned) || contains_banned_word(reason, &banned) {
            return Err(EngineError::validation("nomination contains disallowed language"));
        }
        if self.ledger.get(&paths::crawler(name))?.is_some() {
            return Err(EngineError::conflict(format!("'{name}' is already listed")));
        }
        if self.ledger.get(&paths::candidate(name))?.is_some() {
            return Err(EngineError::conflict(format!("'{name}' is already nominated")));
        }

        self.ledger.set(
            &paths::candidate(name),
            &json!({"name": name, "nominated_by": uid, "reason": reason, "timestamp": now}),
        )?;
        self.feed.record_for("nomination", Some(uid), &format!("{uid} nominated {name}"));
        info!(uid, name, "crawler nominated");
        Ok(())
    }

    /// File a report against a crawler for admin attention.
    pub fn report(&self, uid: &str, name: &str, reason: &str, now: i64) -> Result<(), EngineError> {
        let banned = self.settings.moderation()?.banned_words;
        if contains_banned_word(reason, &banned) {
            return Err(EngineError::validation("report contains disallowed language"));
        }
        if self.ledger.get(&paths::crawler(name))?.is_none() {
            return Err(EngineError::not_found(format!("crawler '{name}'")));
        }
        self.feed.record_for(
            "report",
            Some(uid),
            &format!("{uid} reported {name}: {reason} (at {now})"),
        );
        Ok(())
    }

    /// Points-history series for charting. An empty history yields a flat
    /// synthetic 24h series at the current value rather than an empty chart.
    pub fn history(&self, name: &str, now: i64) -> Result<Vec<HistoryPoint>, EngineError> {
        let crawler = self.get(name)?;
        let stored = self
            .ledger
            .get(&paths::points_history(name))?
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();

        let mut series: Vec<HistoryPoint> = stored
            .values()
            .filter_map(|raw| serde_json::from_value(raw.clone()).ok())
            .collect();
        series.sort_by_key(|p| p.timestamp);
        if series.is_empty() {
            series = vec![
                HistoryPoint { points: crawler.points, timestamp: now - 86_400, reason: None },
                HistoryPoint { points: crawler.points, timestamp: now, reason: None },
            ];
        }
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;

    fn directory(ledger: Arc<MemoryLedger>) -> CrawlerDirectory {
        CrawlerDirectory::new(
            ledger.clone(),
            SettingsStore::new(ledger.clone()),
            ActivityLog::new(ledger),
        )
    }

    fn seed(ledger: &MemoryLedger) {
        ledger
            .set("users/alpha", &json!({"name": "alpha", "points": 100, "likes": 2}))
            .unwrap();
    }

    #[test]
    fn banned_word_filter_matches_tokens_not_substrings() {
        let banned = vec!["scam".to_string()];
        assert!(contains_banned_word("total SCAM here", &banned));
        assert!(contains_banned_word("scam!", &banned));
        assert!(!contains_banned_word("scampi is a dish", &banned));
        assert!(!contains_banned_word("clean text", &banned));
    }

    #[test]
    fn likes_increment_and_floor_at_zero() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        let dir = directory(ledger.clone());

        assert_eq!(dir.like("u1", "alpha").unwrap(), 3);
        dir.unlike("u1", "alpha").unwrap();
        dir.unlike("u1", "alpha").unwrap();
        dir.unlike("u1", "alpha").unwrap();
        assert_eq!(dir.unlike("u1", "alpha").unwrap(), 0);
        assert!(dir.like("u1", "ghost").is_err());
    }

    #[test]
    fn donation_updates_points_and_history() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        let dir = directory(ledger.clone());

        assert_eq!(dir.donate_points("u1", "alpha", 50, 1_000).unwrap(), 150);
        assert!(dir.donate_points("u1", "alpha", 0, 1_000).is_err());
        assert!(dir.donate_points("u1", "alpha", -5, 1_000).is_err());

        let history = dir.history("alpha", 2_000).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].points, 150);
    }

    #[test]
    fn empty_history_backfills_a_flat_series() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        let dir = directory(ledger);

        let series = dir.history("alpha", 100_000).unwrap();
        assert_eq!(series.len(), 2);
        assert!(series.iter().all(|p| p.points == 100));
        assert_eq!(series[0].timestamp, 100_000 - 86_400);
    }

    #[test]
    fn nomination_moderation_and_duplicates() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        ledger
            .set("site_settings/moderation", &json!({"banned_words": ["spam"]}))
            .unwrap();
        let dir = directory(ledger.clone());

        assert!(dir.nominate("u1", "newbie", "great spam content", 0).is_err());
        dir.nominate("u1", "newbie", "great content", 0).unwrap();
        assert!(dir.nominate("u2", "newbie", "me too", 1).is_err());
        assert!(dir.nominate("u2", "alpha", "already listed", 1).is_err());
        assert!(ledger.get("candidates/newbie").unwrap().is_some());
    }
}
