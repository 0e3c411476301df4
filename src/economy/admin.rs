//! Admin operations.
//!
//! Everything here sits behind the admin role at the API layer. Wallet and
//! multiplier edits are logged to the activity stream so there is a paper
//! trail for every manual balance change.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::config::SettingsStore;
use crate::errors::EngineError;
use crate::feed::ActivityLog;
use crate::store::{paths, BatchUpdate, LedgerStore};

/// Settings sections an admin may overwrite. Anything else is rejected so a
/// typo cannot create an orphan section.
const SETTINGS_WHITELIST: &[&str] = &[
    crate::config::SPIN_WHEEL_SECTION,
    crate::config::INVESTMENT_SECTION,
    crate::config::VOLATILITY_SECTION,
    crate::config::CONTEST_SECTION,
    crate::config::RPS_SECTION,
    crate::config::GAMBLING_SECTION,
    crate::config::PREDICTION_SECTION,
    crate::config::MODERATION_SECTION,
    "shop_products",
    "shop_products_spins",
    "shop_products_points",
];

#[derive(Clone)]
pub struct AdminOps {
    ledger: Arc<dyn LedgerStore>,
    settings: SettingsStore,
    feed: ActivityLog,
}

impl AdminOps {
    pub fn new(ledger: Arc<dyn LedgerStore>, settings: SettingsStore, feed: ActivityLog) -> Self {
        Self { ledger, settings, feed }
    }

    /// Create or update a crawler. Points changes land in the history
    /// stream.
    pub fn upsert_crawler(
        &self,
        name: &str,
        points: i64,
        avatar_url: Option<&str>,
        now: i64,
    ) -> Result<(), EngineError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::validation("a crawler needs a name"));
        }
        if points < 0 {
            return Err(EngineError::validation("points cannot be negative"));
        }

        let existing = self.ledger.get(&paths::crawler(name))?;
        let old_points = existing
            .as_ref()
            .and_then(|c| c.get("points"))
            .and_then(Value::as_i64);
        let likes = existing
            .as_ref()
            .and_then(|c| c.get("likes"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let multiplier = existing
            .as_ref()
            .and_then(|c| c.get("stock_multiplier"))
            .and_then(Value::as_f64)
            .unwrap_or(1.0);

        let mut record = json!({
            "name": name,
            "points": points,
            "likes": likes,
            "stock_multiplier": multiplier,
        });
        if let Some(url) = avatar_url {
            record["avatar_url"] = json!(url);
        }
        self.ledger.set(&paths::crawler(name), &record)?;
        // A nominee becoming listed stops being a candidate.
        self.ledger.delete(&paths::candidate(name))?;

        if old_points != Some(points) {
            let entry = json!({"points": points, "timestamp": now, "reason": "admin_edit"});
            if let Err(err) = self.ledger.push(&paths::points_history(name), &entry) {
                tracing::warn!(%err, "failed to record admin points history");
            }
        }
        info!(name, points, "crawler upserted");
        Ok(())
    }

    /// Remove a crawler and its history/candidacy in one batch. Investor
    /// positions survive and liquidate at the neutral fallback factor.
    pub fn remove_crawler(&self, name: &str) -> Result<(), EngineError> {
        if self.ledger.get(&paths::crawler(name))?.is_none() {
            return Err(EngineError::not_found(format!("crawler '{name}'")));
        }
        let mut batch = BatchUpdate::new();
        batch.remove(paths::crawler(name));
        batch.remove(paths::points_history(name));
        batch.remove(paths::candidate(name));
        self.ledger.update(&batch)?;
        self.feed.record("admin", &format!("crawler {name} removed"));
        info!(name, "crawler removed");
        Ok(())
    }

    pub fn set_wallet(&self, uid: &str, cc: i64, sp: f64) -> Result<(), EngineError> {
        if cc < 0 || !(sp.is_finite() && sp >= 0.0) {
            return Err(EngineError::validation("balances must be non-negative"));
        }
        self.ledger.set(&paths::wallet(uid), &json!({"cc": cc, "sp": sp}))?;
        self.feed.record("admin", &format!("wallet of {uid} set to {cc} CC / {sp:.2} SP"));
        info!(uid, cc, sp, "wallet set");
        Ok(())
    }

    pub fn set_purchased_attempts(&self, uid: &str, attempts: i64) -> Result<(), EngineError> {
        if attempts < 0 {
            return Err(EngineError::validation("attempts cannot be negative"));
        }
        self.ledger
            .set(&paths::spin_field(uid, "purchasedAttempts"), &json!(attempts))?;
        info!(uid, attempts, "purchased attempts set");
        Ok(())
    }

    /// Refill free spins for one user, or for everyone with a spin record
    /// when `uid` is `None`.
    pub fn reset_free_spins(&self, uid: Option<&str>, now: i64) -> Result<usize, EngineError> {
        let max_attempts = self.settings.spin_wheel()?.max_attempts;
        let targets: Vec<String> = match uid {
            Some(one) => vec![one.to_string()],
            None => self
                .ledger
                .get(paths::SPIN_STATE)?
                .and_then(|v| v.as_object().map(|m| m.keys().cloned().collect()))
                .unwrap_or_default(),
        };
        if targets.is_empty() {
            return Ok(0);
        }
        let mut batch = BatchUpdate::new();
        for target in &targets {
            batch.set(paths::spin_field(target, "freeAttempts"), json!(max_attempts));
            batch.set(paths::spin_field(target, "lastFreeUpdateTimestamp"), json!(now));
        }
        self.ledger.update(&batch)?;
        info!(count = targets.len(), "free spins reset");
        Ok(targets.len())
    }

    pub fn ban(&self, uid: &str, reason: &str, now: i64) -> Result<(), EngineError> {
        self.ledger.set(
            &paths::banned_user(uid),
            &json!({"reason": reason, "timestamp": now}),
        )?;
        self.feed.record("admin", &format!("{uid} banned: {reason}"));
        info!(uid, "user banned");
        Ok(())
    }

    pub fn unban(&self, uid: &str) -> Result<(), EngineError> {
        if self.ledger.get(&paths::banned_user(uid))?.is_none() {
            return Err(EngineError::not_found(format!("ban record for '{uid}'")));
        }
        self.ledger.delete(&paths::banned_user(uid))?;
        self.feed.record("admin", &format!("{uid} unbanned"));
        Ok(())
    }

    pub fn is_banned(&self, uid: &str) -> Result<bool, EngineError> {
        Ok(self.ledger.get(&paths::banned_user(uid))?.is_some())
    }

    pub fn remove_candidate(&self, name: &str) -> Result<(), EngineError> {
        if self.ledger.get(&paths::candidate(name))?.is_none() {
            return Err(EngineError::not_found(format!("candidate '{name}'")));
        }
        self.ledger.delete(&paths::candidate(name))?;
        Ok(())
    }

    pub fn candidates(&self) -> Result<Vec<Value>, EngineError> {
        Ok(self
            .ledger
            .get(paths::CANDIDATES)?
            .and_then(|v| v.as_object().map(|m| m.values().cloned().collect()))
            .unwrap_or_default())
    }

    /// Overwrite one whitelisted settings section.
    pub fn save_settings(&self, section: &str, value: &Value) -> Result<(), EngineError> {
        if !SETTINGS_WHITELIST.contains(&section) {
            return Err(EngineError::validation(format!(
                "unknown settings section '{section}'"
            )));
        }
        if !value.is_object() {
            return Err(EngineError::validation("settings must be an object"));
        }
        self.ledger.set(&paths::settings(section), value)?;
        self.feed.record("admin", &format!("settings section {section} updated"));
        info!(section, "settings saved");
        Ok(())
    }

    pub fn send_message(&self, uid: &str, title: &str, body: &str) -> Result<(), EngineError> {
        if title.trim().is_empty() {
            return Err(EngineError::validation("a message needs a title"));
        }
        self.feed.notify(uid, title, body);
        Ok(())
    }
}
