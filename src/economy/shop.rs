//! Shop engine.
//!
//! Three catalogs live under `site_settings/`: CC->SP conversion packs,
//! purchased spin attempts, and raise/drop points products with per-day
//! purchase limits. Each purchase is a debit-then-apply sequence; when the
//! apply step loses a race (attempt cap, daily limit) the debit is handed
//! back.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tracing::info;

use crate::config::{PointsProductKind, SettingsStore};
use crate::errors::EngineError;
use crate::feed::ActivityLog;
use crate::store::{paths, LedgerStore};

use super::wallet;

#[derive(Clone)]
pub struct ShopEngine {
    ledger: Arc<dyn LedgerStore>,
    settings: SettingsStore,
    feed: ActivityLog,
}

fn day_stamp(now: i64) -> String {
    Utc.timestamp_opt(now, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "epoch".to_string())
}

impl ShopEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, settings: SettingsStore, feed: ActivityLog) -> Self {
        Self { ledger, settings, feed }
    }

    /// Convert CC into SP in one wallet transaction: both fields move
    /// together or not at all.
    pub fn buy_sp_pack(&self, uid: &str, product_id: &str) -> Result<f64, EngineError> {
        let product = self
            .settings
            .sp_pack(product_id)?
            .ok_or_else(|| EngineError::not_found(format!("product '{product_id}'")))?;
        if product.cc_price <= 0 || product.sp_amount <= 0.0 {
            return Err(EngineError::validation("misconfigured product"));
        }

        let result = self.ledger.transaction(&paths::wallet(uid), &mut |current| {
            let cc = current
                .and_then(|w| w.get("cc"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if cc < product.cc_price {
                return None;
            }
            let sp = current
                .and_then(|w| w.get("sp"))
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            Some(json!({"cc": cc - product.cc_price, "sp": sp + product.sp_amount}))
        })?;
        if !result.committed {
            return Err(EngineError::InsufficientFunds { currency: "CC" });
        }

        let new_sp = result
            .value
            .as_ref()
            .and_then(|w| w.get("sp"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        info!(uid, product_id, "SP pack purchased");
        Ok(new_sp)
    }

    /// Buy spin attempts with SP, capped at the wheel's purchase limit.
    pub fn buy_spin_attempts(&self, uid: &str, product_id: &str) -> Result<i64, EngineError> {
        let product = self
            .settings
            .spin_attempt_product(product_id)?
            .ok_or_else(|| EngineError::not_found(format!("product '{product_id}'")))?;
        if product.sp_price <= 0.0 || product.attempts_amount <= 0 {
            return Err(EngineError::validation("misconfigured product"));
        }
        let limit = self.settings.spin_wheel()?.purchase_limit;

        wallet::try_debit_sp(self.ledger.as_ref(), uid, product.sp_price)?;

        let result = self.ledger.transaction(
            &paths::spin_field(uid, "purchasedAttempts"),
            &mut |current| {
                let held = current.and_then(Value::as_i64).unwrap_or(0);
                if held + product.attempts_amount > limit {
                    return None;
                }
                Some(json!(held + product.attempts_amount))
            },
        )?;
        if !result.committed {
            let _ = wallet::credit_sp(self.ledger.as_ref(), uid, product.sp_price);
            return Err(EngineError::conflict(format!(
                "purchased attempts are capped at {limit}"
            )));
        }

        info!(uid, product_id, "spin attempts purchased");
        Ok(result.value.as_ref().and_then(Value::as_i64).unwrap_or(0))
    }

    /// Raise or drop a crawler's points. Limited per user per product per
    /// UTC day.
    pub fn buy_points_product(
        &self,
        uid: &str,
        product_id: &str,
        crawler: &str,
        now: i64,
    ) -> Result<i64, EngineError> {
        let product = self
            .settings
            .points_product(product_id)?
            .ok_or_else(|| EngineError::not_found(format!("product '{product_id}'")))?;
        if product.sp_price <= 0.0 || product.points_amount <= 0 || product.daily_limit <= 0 {
            return Err(EngineError::validation("misconfigured product"));
        }
        if self.ledger.get(&paths::crawler(crawler))?.is_none() {
            return Err(EngineError::not_found(format!("crawler '{crawler}'")));
        }

        wallet::try_debit_sp(self.ledger.as_ref(), uid, product.sp_price)?;

        // Claim one use of today's allowance.
        let today = day_stamp(now);
        let result = self
            .ledger
            .transaction(&paths::daily_limit(uid, product_id), &mut |current| {
                let same_day = current
                    .and_then(|c| c.get("date"))
                    .and_then(Value::as_str)
                    .map_or(false, |d| d == today);
                let count = if same_day {
                    current.and_then(|c| c.get("count")).and_then(Value::as_i64).unwrap_or(0)
                } else {
                    0
                };
                if count >= product.daily_limit {
                    return None;
                }
                Some(json!({"date": today, "count": count + 1}))
            })?;
        if !result.committed {
            let _ = wallet::credit_sp(self.ledger.as_ref(), uid, product.sp_price);
            return Err(EngineError::conflict(format!(
                "daily limit of {} for this item reached",
                product.daily_limit
            )));
        }

        let delta = match product.kind {
            PointsProductKind::Raise => product.points_amount,
            PointsProductKind::Drop => -product.points_amount,
        };
        let new_points = wallet::credit_points(self.ledger.as_ref(), crawler, delta)?;

        let entry = json!({"points": new_points, "timestamp": now, "reason": format!("shop:{product_id}")});
        if let Err(err) = self.ledger.push(&paths::points_history(crawler), &entry) {
            tracing::warn!(%err, "failed to record shop points history");
        }
        let verb = if delta > 0 { "raised" } else { "dropped" };
        self.feed.live(
            "shop",
            Some(uid),
            &format!("{uid} {verb} {crawler}'s points by {}", delta.abs()),
        );
        info!(uid, product_id, crawler, delta, "points product applied");
        Ok(new_points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;

    fn engine(ledger: Arc<MemoryLedger>) -> ShopEngine {
        ShopEngine::new(
            ledger.clone(),
            SettingsStore::new(ledger.clone()),
            ActivityLog::new(ledger),
        )
    }

    fn seed(ledger: &MemoryLedger) {
        ledger
            .set(
                "site_settings/shop_products/pack1",
                &json!({"cc_price": 100, "sp_amount": 50.0}),
            )
            .unwrap();
        ledger
            .set(
                "site_settings/shop_products_spins/spin3",
                &json!({"sp_price": 30.0, "attempts_amount": 3}),
            )
            .unwrap();
        ledger
            .set(
                "site_settings/shop_products_points/raise10",
                &json!({"type": "raise", "points_amount": 10, "sp_price": 5.0, "daily_limit": 2}),
            )
            .unwrap();
        ledger
            .set("users/alpha", &json!({"name": "alpha", "points": 100}))
            .unwrap();
    }

    #[test]
    fn sp_pack_moves_both_currencies_atomically() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        ledger.set("wallets/u1", &json!({"cc": 150, "sp": 1.0})).unwrap();

        let shop = engine(ledger.clone());
        let new_sp = shop.buy_sp_pack("u1", "pack1").unwrap();
        assert_eq!(new_sp, 51.0);
        assert_eq!(ledger.get("wallets/u1/cc").unwrap(), Some(json!(50)));

        // Second purchase cannot afford the pack; nothing moves.
        assert!(matches!(
            shop.buy_sp_pack("u1", "pack1"),
            Err(EngineError::InsufficientFunds { currency: "CC" })
        ));
        assert_eq!(ledger.get("wallets/u1/sp").unwrap(), Some(json!(51.0)));
    }

    #[test]
    fn spin_attempt_cap_refunds_the_debit() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        ledger
            .set("site_settings/spin_wheel_settings/purchaseLimit", &json!(4))
            .unwrap();
        ledger.set("wallets/u1/sp", &json!(100.0)).unwrap();

        let shop = engine(ledger.clone());
        assert_eq!(shop.buy_spin_attempts("u1", "spin3").unwrap(), 3);
        // 3 + 3 > 4: rejected and refunded.
        assert!(matches!(
            shop.buy_spin_attempts("u1", "spin3"),
            Err(EngineError::Conflict(_))
        ));
        assert_eq!(ledger.get("wallets/u1/sp").unwrap(), Some(json!(70.0)));
    }

    #[test]
    fn points_product_enforces_daily_limit() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        ledger.set("wallets/u1/sp", &json!(100.0)).unwrap();
        let shop = engine(ledger.clone());

        let day = 86_400;
        assert_eq!(shop.buy_points_product("u1", "raise10", "alpha", day).unwrap(), 110);
        assert_eq!(shop.buy_points_product("u1", "raise10", "alpha", day + 10).unwrap(), 120);
        let third = shop.buy_points_product("u1", "raise10", "alpha", day + 20);
        assert!(matches!(third, Err(EngineError::Conflict(_))));
        // Refunded: two purchases cost 10 SP total.
        assert_eq!(ledger.get("wallets/u1/sp").unwrap(), Some(json!(90.0)));

        // Next UTC day the counter resets.
        assert!(shop.buy_points_product("u1", "raise10", "alpha", 2 * day + 5).is_ok());
    }

    #[test]
    fn unknown_product_is_not_found() {
        let ledger = Arc::new(MemoryLedger::new());
        let shop = engine(ledger);
        assert!(matches!(
            shop.buy_sp_pack("u1", "ghost"),
            Err(EngineError::NotFound(_))
        ));
    }
}
