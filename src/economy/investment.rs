//! Investment engine.
//!
//! Discrete-lots model: every buy creates an immutable lot `{sp, p, t}` and
//! every sell liquidates exactly one whole lot. A lot's current value is
//!
//! ```text
//! value = lot.sp * (current_points / max(1, lot.p))
//!               * stock_multiplier * personal_multiplier
//! ```
//!
//! All operations fail closed: a rejection leaves the ledger untouched.
//! Double-sell protection comes from claiming the lot with an aborting
//! delete transaction before any payout is computed.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::config::SettingsStore;
use crate::errors::EngineError;
use crate::feed::ActivityLog;
use crate::models::{Crawler, InvestmentLot, Position};
use crate::store::{paths, BatchUpdate, LedgerStore};

use super::wallet;

/// Multiplier floor written by the volatility engine; admin actions may set
/// values below it.
pub const MULTIPLIER_FLOOR: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplierAction {
    /// Back to the neutral 1.0.
    Reset,
    /// Position is worth nothing.
    TotalLoss,
    /// Gains become losses and vice versa.
    InvertProfit,
    /// Solve for the multiplier that makes current value equal invested.
    BreakEven,
}

impl MultiplierAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reset" => Some(Self::Reset),
            "total_loss" => Some(Self::TotalLoss),
            "invert_profit" => Some(Self::InvertProfit),
            "reset_profit" => Some(Self::BreakEven),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LotView {
    pub lot_id: String,
    pub invested_sp: f64,
    pub current_value: f64,
    pub unlock_at: i64,
    pub locked: bool,
}

#[derive(Debug, Serialize)]
pub struct PositionView {
    pub crawler: String,
    pub personal_multiplier: f64,
    pub invested_sp: f64,
    pub current_value: f64,
    pub lots: Vec<LotView>,
}

#[derive(Debug, Serialize)]
pub struct SellReceipt {
    pub lot_id: String,
    pub value: f64,
    pub tax: f64,
    pub fee: f64,
    pub payout: f64,
    pub new_balance: f64,
}

#[derive(Clone)]
pub struct InvestmentEngine {
    ledger: Arc<dyn LedgerStore>,
    settings: SettingsStore,
    feed: ActivityLog,
}

fn lot_value(lot: &InvestmentLot, current_points: i64, stock_mult: f64, personal_mult: f64) -> f64 {
    let basis = lot.p.max(1) as f64;
    lot.sp * (current_points as f64 / basis) * stock_mult * personal_mult
}

impl InvestmentEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, settings: SettingsStore, feed: ActivityLog) -> Self {
        Self { ledger, settings, feed }
    }

    fn crawler(&self, name: &str) -> Result<Option<Crawler>, EngineError> {
        match self.ledger.get(&paths::crawler(name))? {
            None => Ok(None),
            Some(value) => Ok(serde_json::from_value(value).ok()),
        }
    }

    fn position(&self, investor: &str, crawler: &str) -> Result<Option<Position>, EngineError> {
        match self.ledger.get(&paths::position(investor, crawler))? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|_| EngineError::validation("corrupt investment position")),
        }
    }

    fn log_trade(&self, investor: &str, crawler: &str, action: &str, amount: f64, now: i64) {
        let entry = json!({
            "investor": investor,
            "target": crawler,
            "action": action,
            "amount": amount,
            "timestamp": now,
        });
        if let Err(err) = self.ledger.push(paths::INVESTMENT_LOG, &entry) {
            tracing::warn!(%err, "failed to append investment log entry");
        }
    }

    /// Create a new lot. Returns the lot id.
    pub fn buy(
        &self,
        investor: &str,
        crawler: &str,
        sp_amount: f64,
        now: i64,
    ) -> Result<String, EngineError> {
        if !(sp_amount.is_finite() && sp_amount > 0.0) {
            return Err(EngineError::validation("investment amount must be a positive number"));
        }
        let target = self
            .crawler(crawler)?
            .ok_or_else(|| EngineError::not_found(format!("crawler '{crawler}'")))?;

        // Portfolio cap applies to opening new positions only; top-ups of an
        // existing position always pass.
        let settings = self.settings.investment()?;
        if self.position(investor, crawler)?.is_none() {
            let held = self
                .ledger
                .get(&paths::investor_positions(investor))?
                .and_then(|v| v.as_object().map(|m| m.len()))
                .unwrap_or(0);
            if held >= settings.max_investments {
                return Err(EngineError::conflict(format!(
                    "portfolio limit of {} crawlers reached",
                    settings.max_investments
                )));
            }
        }

        wallet::try_debit_sp(self.ledger.as_ref(), investor, sp_amount)?;

        let lot_id = Uuid::new_v4().to_string();
        let lot = InvestmentLot { sp: sp_amount, p: target.points, t: now };
        let lot_json = match serde_json::to_value(&lot) {
            Ok(v) => v,
            Err(err) => {
                // Wallet already debited; hand the stake back.
                let _ = wallet::credit_sp(self.ledger.as_ref(), investor, sp_amount);
                return Err(EngineError::validation(format!("unstorable lot: {err}")));
            }
        };
        if let Err(err) = self
            .ledger
            .set(&paths::lot(investor, crawler, &lot_id), &lot_json)
        {
            let _ = wallet::credit_sp(self.ledger.as_ref(), investor, sp_amount);
            return Err(err.into());
        }

        self.log_trade(investor, crawler, "buy", sp_amount, now);
        self.feed.live(
            "investment",
            Some(investor),
            &format!("{investor} invested {sp_amount:.2} SP in {crawler}"),
        );
        info!(investor, crawler, sp_amount, lot_id, "investment bought");
        Ok(lot_id)
    }

    /// Liquidate one lot. Lock, tax and fee per current settings.
    pub fn sell(
        &self,
        investor: &str,
        crawler: &str,
        lot_id: &str,
        now: i64,
    ) -> Result<SellReceipt, EngineError> {
        let settings = self.settings.investment()?;
        let lock_seconds = settings.lock_seconds();

        // Deleted crawlers fall back to a neutral market factor so holders
        // can still recover their stake.
        let (current_points, stock_mult, crawler_exists) = match self.crawler(crawler)? {
            Some(c) => (c.points, c.stock_multiplier, true),
            None => (0, 1.0, false),
        };
        let personal_mult = self
            .position(investor, crawler)?
            .map_or(1.0, |p| p.personal_multiplier);

        // Claim the lot: delete it atomically, aborting when missing or
        // still locked. Whoever commits the delete owns the payout.
        let mut claimed: Option<InvestmentLot> = None;
        let mut locked_until = 0i64;
        let result = self
            .ledger
            .transaction(&paths::lot(investor, crawler, lot_id), &mut |current| {
                claimed = None;
                locked_until = 0;
                let lot: InvestmentLot = serde_json::from_value(current?.clone()).ok()?;
                if now - lot.t < lock_seconds {
                    locked_until = lot.t + lock_seconds;
                    return None;
                }
                claimed = Some(lot);
                Some(Value::Null)
            })?;

        if !result.committed {
            if locked_until > 0 {
                let hours_left = ((locked_until - now) as f64 / 3600.0).ceil() as i64;
                return Err(EngineError::conflict(format!(
                    "investment is locked for {hours_left} more hour(s)"
                )));
            }
            return Err(EngineError::not_found(format!("investment lot '{lot_id}'")));
        }
        let lot = claimed.ok_or_else(|| EngineError::validation("corrupt investment lot"))?;

        let value = if crawler_exists {
            lot_value(&lot, current_points, stock_mult, personal_mult)
        } else {
            lot.sp * personal_mult
        };
        let profit = value - lot.sp;
        let tax = profit.max(0.0) * settings.sell_tax_percent / 100.0;
        let payout = (value - tax - settings.sell_fee_sp).max(0.0);

        let new_balance = wallet::credit_sp(self.ledger.as_ref(), investor, payout)?;
        self.cleanup_empty_position(investor, crawler)?;

        self.log_trade(investor, crawler, "sell", payout, now);
        self.feed.live(
            "investment",
            Some(investor),
            &format!("{investor} sold a position in {crawler} for {payout:.2} SP"),
        );
        info!(investor, crawler, lot_id, payout, "investment sold");
        Ok(SellReceipt {
            lot_id: lot_id.to_string(),
            value,
            tax,
            fee: settings.sell_fee_sp,
            payout,
            new_balance,
        })
    }

    /// Admin bypass: liquidate every lot at current value, ignoring the
    /// lock and charging no tax or fee. Returns the credited total.
    pub fn force_sell_all_lots(
        &self,
        investor: &str,
        crawler: &str,
        now: i64,
    ) -> Result<f64, EngineError> {
        let (current_points, stock_mult, crawler_exists) = match self.crawler(crawler)? {
            Some(c) => (c.points, c.stock_multiplier, true),
            None => (0, 1.0, false),
        };
        let personal_mult = self
            .position(investor, crawler)?
            .map_or(1.0, |p| p.personal_multiplier);

        let mut claimed: BTreeMap<String, InvestmentLot> = BTreeMap::new();
        let result = self
            .ledger
            .transaction(&paths::position_lots(investor, crawler), &mut |current| {
                claimed.clear();
                let lots: BTreeMap<String, InvestmentLot> =
                    serde_json::from_value(current?.clone()).ok()?;
                if lots.is_empty() {
                    return None;
                }
                claimed = lots;
                Some(Value::Null)
            })?;
        if !result.committed {
            return Err(EngineError::not_found(format!(
                "investments of '{investor}' in '{crawler}'"
            )));
        }

        let total: f64 = claimed
            .values()
            .map(|lot| {
                if crawler_exists {
                    lot_value(lot, current_points, stock_mult, personal_mult)
                } else {
                    lot.sp * personal_mult
                }
            })
            .sum();
        let total = total.max(0.0);

        wallet::credit_sp(self.ledger.as_ref(), investor, total)?;
        self.ledger.delete(&paths::position(investor, crawler))?;

        self.log_trade(investor, crawler, "force_sell", total, now);
        info!(investor, crawler, total, "position force-liquidated");
        Ok(total)
    }

    /// Admin multiplier override on one (investor, crawler) position.
    /// Returns the multiplier that was applied.
    pub fn set_special_multiplier(
        &self,
        investor: &str,
        crawler: &str,
        action: MultiplierAction,
    ) -> Result<f64, EngineError> {
        let position = self
            .position(investor, crawler)?
            .ok_or_else(|| EngineError::not_found(format!("investments of '{investor}' in '{crawler}'")))?;
        if position.lots.is_empty() {
            return Err(EngineError::not_found(format!(
                "investments of '{investor}' in '{crawler}'"
            )));
        }

        let (multiplier, override_tag): (f64, Option<&str>) = match action {
            MultiplierAction::Reset => (1.0, None),
            MultiplierAction::TotalLoss => (0.0, Some("total_loss")),
            MultiplierAction::InvertProfit => (-1.0, Some("inverted")),
            MultiplierAction::BreakEven => {
                let target = self
                    .crawler(crawler)?
                    .ok_or_else(|| EngineError::not_found(format!("crawler '{crawler}'")))?;
                // Solve sum(sp_i) = sum(sp_i * market_factor_i) * x.
                let invested: f64 = position.lots.values().map(|l| l.sp).sum();
                let market_value: f64 = position
                    .lots
                    .values()
                    .map(|l| lot_value(l, target.points, target.stock_multiplier, 1.0))
                    .sum();
                if market_value.abs() < f64::EPSILON {
                    return Err(EngineError::conflict(
                        "position has zero market value, break-even multiplier is undefined",
                    ));
                }
                (invested / market_value, Some("reset_profit"))
            }
        };

        let mut batch = BatchUpdate::new();
        batch.set(paths::personal_multiplier(investor, crawler), json!(multiplier));
        match override_tag {
            Some(tag) => batch.set(paths::manual_override(investor, crawler), json!(tag)),
            None => batch.remove(paths::manual_override(investor, crawler)),
        };
        self.ledger.update(&batch)?;

        info!(investor, crawler, multiplier, ?action, "personal multiplier overridden");
        Ok(multiplier)
    }

    /// Current valuation of every position an investor holds.
    pub fn portfolio(&self, investor: &str, now: i64) -> Result<Vec<PositionView>, EngineError> {
        let settings = self.settings.investment()?;
        let lock_seconds = settings.lock_seconds();
        let Some(tree) = self.ledger.get(&paths::investor_positions(investor))? else {
            return Ok(Vec::new());
        };
        let Some(positions) = tree.as_object() else {
            return Ok(Vec::new());
        };

        let mut views = Vec::with_capacity(positions.len());
        for (crawler_name, raw) in positions {
            let position: Position = match serde_json::from_value(raw.clone()) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let (points, stock_mult, exists) = match self.crawler(crawler_name)? {
                Some(c) => (c.points, c.stock_multiplier, true),
                None => (0, 1.0, false),
            };
            let mut lots = Vec::with_capacity(position.lots.len());
            let mut invested = 0.0;
            let mut current = 0.0;
            for (lot_id, lot) in &position.lots {
                let value = if exists {
                    lot_value(lot, points, stock_mult, position.personal_multiplier)
                } else {
                    lot.sp * position.personal_multiplier
                };
                invested += lot.sp;
                current += value;
                lots.push(LotView {
                    lot_id: lot_id.clone(),
                    invested_sp: lot.sp,
                    current_value: value,
                    unlock_at: lot.t + lock_seconds,
                    locked: now - lot.t < lock_seconds,
                });
            }
            views.push(PositionView {
                crawler: crawler_name.clone(),
                personal_multiplier: position.personal_multiplier,
                invested_sp: invested,
                current_value: current,
                lots,
            });
        }
        Ok(views)
    }

    /// Positions lose their node when the last lot goes.
    fn cleanup_empty_position(&self, investor: &str, crawler: &str) -> Result<(), EngineError> {
        let lots = self.ledger.get(&paths::position_lots(investor, crawler))?;
        let empty = lots.as_ref().and_then(Value::as_object).map_or(true, |m| m.is_empty());
        if empty {
            self.ledger.delete(&paths::position(investor, crawler))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;
    use serde_json::json;

    fn engine() -> (Arc<MemoryLedger>, InvestmentEngine) {
        let ledger = Arc::new(MemoryLedger::new());
        let engine = InvestmentEngine::new(
            ledger.clone(),
            SettingsStore::new(ledger.clone()),
            ActivityLog::new(ledger.clone()),
        );
        (ledger, engine)
    }

    fn seed_crawler(ledger: &MemoryLedger, name: &str, points: i64) {
        ledger
            .set(
                &paths::crawler(name),
                &json!({"name": name, "points": points, "likes": 0, "stock_multiplier": 1.0}),
            )
            .unwrap();
    }

    fn zero_friction(ledger: &MemoryLedger) {
        ledger
            .set(
                "site_settings/investment_settings",
                &json!({"investment_lock_hours": 0, "sell_tax_percent": 0.0, "sell_fee_sp": 0.0}),
            )
            .unwrap();
    }

    #[test]
    fn buy_then_sell_is_nearly_identity() {
        let (ledger, engine) = engine();
        seed_crawler(&ledger, "alpha", 100);
        zero_friction(&ledger);
        wallet::credit_sp(ledger.as_ref(), "u1", 100.0).unwrap();

        let lot = engine.buy("u1", "alpha", 100.0, 1_000).unwrap();
        assert_eq!(wallet::get(ledger.as_ref(), "u1").unwrap().sp, 0.0);

        let receipt = engine.sell("u1", "alpha", &lot, 1_000).unwrap();
        assert!((receipt.payout - 100.0).abs() < 1e-6);
        assert!((wallet::get(ledger.as_ref(), "u1").unwrap().sp - 100.0).abs() < 1e-6);
        // Last lot gone means the position node is gone.
        assert!(ledger.get(&paths::position("u1", "alpha")).unwrap().is_none());
    }

    #[test]
    fn tax_and_fee_scenario() {
        // 1000 SP lot at points=100; points double; 10% tax, 5 SP fee.
        let (ledger, engine) = engine();
        seed_crawler(&ledger, "alpha", 100);
        ledger
            .set(
                "site_settings/investment_settings",
                &json!({"investment_lock_hours": 0, "sell_tax_percent": 10.0, "sell_fee_sp": 5.0}),
            )
            .unwrap();
        wallet::credit_sp(ledger.as_ref(), "u1", 1_000.0).unwrap();

        let lot = engine.buy("u1", "alpha", 1_000.0, 0).unwrap();
        ledger.set(&paths::crawler_points("alpha"), &json!(200)).unwrap();

        let receipt = engine.sell("u1", "alpha", &lot, 10).unwrap();
        assert!((receipt.value - 2_000.0).abs() < 1e-6);
        assert!((receipt.tax - 100.0).abs() < 1e-6);
        assert!((receipt.payout - 1_895.0).abs() < 1e-6);
    }

    #[test]
    fn lock_boundary_is_enforced() {
        let (ledger, engine) = engine();
        seed_crawler(&ledger, "alpha", 100);
        ledger
            .set(
                "site_settings/investment_settings",
                &json!({"investment_lock_hours": 1, "sell_tax_percent": 0.0, "sell_fee_sp": 0.0}),
            )
            .unwrap();
        wallet::credit_sp(ledger.as_ref(), "u1", 50.0).unwrap();
        let lot = engine.buy("u1", "alpha", 50.0, 0).unwrap();

        let early = engine.sell("u1", "alpha", &lot, 3_599);
        assert!(matches!(early, Err(EngineError::Conflict(_))));

        assert!(engine.sell("u1", "alpha", &lot, 3_601).is_ok());
    }

    #[test]
    fn second_sell_of_same_lot_fails() {
        let (ledger, engine) = engine();
        seed_crawler(&ledger, "alpha", 100);
        zero_friction(&ledger);
        wallet::credit_sp(ledger.as_ref(), "u1", 50.0).unwrap();
        let lot = engine.buy("u1", "alpha", 50.0, 0).unwrap();

        engine.sell("u1", "alpha", &lot, 10).unwrap();
        assert!(matches!(
            engine.sell("u1", "alpha", &lot, 10),
            Err(EngineError::NotFound(_))
        ));
        // Exactly one payout landed.
        assert!((wallet::get(ledger.as_ref(), "u1").unwrap().sp - 50.0).abs() < 1e-6);
    }

    #[test]
    fn portfolio_cap_blocks_new_positions_not_topups() {
        let (ledger, engine) = engine();
        seed_crawler(&ledger, "alpha", 100);
        seed_crawler(&ledger, "beta", 100);
        ledger
            .set("site_settings/investment_settings", &json!({"max_investments": 1}))
            .unwrap();
        wallet::credit_sp(ledger.as_ref(), "u1", 300.0).unwrap();

        engine.buy("u1", "alpha", 100.0, 0).unwrap();
        // Top-up is fine.
        engine.buy("u1", "alpha", 100.0, 0).unwrap();
        // Opening a second position is not.
        assert!(matches!(
            engine.buy("u1", "beta", 100.0, 0),
            Err(EngineError::Conflict(_))
        ));
    }

    #[test]
    fn insufficient_balance_rejects_without_lot() {
        let (ledger, engine) = engine();
        seed_crawler(&ledger, "alpha", 100);
        wallet::credit_sp(ledger.as_ref(), "u1", 10.0).unwrap();

        assert!(matches!(
            engine.buy("u1", "alpha", 50.0, 0),
            Err(EngineError::InsufficientFunds { .. })
        ));
        assert!(ledger.get(&paths::position("u1", "alpha")).unwrap().is_none());
    }

    #[test]
    fn break_even_multiplier_flattens_profit() {
        let (ledger, engine) = engine();
        seed_crawler(&ledger, "alpha", 100);
        zero_friction(&ledger);
        wallet::credit_sp(ledger.as_ref(), "u1", 200.0).unwrap();
        let lot = engine.buy("u1", "alpha", 200.0, 0).unwrap();

        // Points triple; unadjusted value would be 600.
        ledger.set(&paths::crawler_points("alpha"), &json!(300)).unwrap();
        let m = engine
            .set_special_multiplier("u1", "alpha", MultiplierAction::BreakEven)
            .unwrap();
        assert!((m - 1.0 / 3.0).abs() < 1e-9);

        let receipt = engine.sell("u1", "alpha", &lot, 10).unwrap();
        assert!((receipt.payout - 200.0).abs() < 1e-6);
    }

    #[test]
    fn total_loss_pays_nothing() {
        let (ledger, engine) = engine();
        seed_crawler(&ledger, "alpha", 100);
        zero_friction(&ledger);
        wallet::credit_sp(ledger.as_ref(), "u1", 100.0).unwrap();
        let lot = engine.buy("u1", "alpha", 100.0, 0).unwrap();

        engine
            .set_special_multiplier("u1", "alpha", MultiplierAction::TotalLoss)
            .unwrap();
        let receipt = engine.sell("u1", "alpha", &lot, 10).unwrap();
        assert_eq!(receipt.payout, 0.0);
    }

    #[test]
    fn force_sell_liquidates_every_lot_ignoring_lock() {
        let (ledger, engine) = engine();
        seed_crawler(&ledger, "alpha", 100);
        ledger
            .set("site_settings/investment_settings", &json!({"investment_lock_hours": 24}))
            .unwrap();
        wallet::credit_sp(ledger.as_ref(), "u1", 300.0).unwrap();
        engine.buy("u1", "alpha", 100.0, 0).unwrap();
        engine.buy("u1", "alpha", 200.0, 0).unwrap();

        let total = engine.force_sell_all_lots("u1", "alpha", 5).unwrap();
        assert!((total - 300.0).abs() < 1e-6);
        assert!(ledger.get(&paths::position("u1", "alpha")).unwrap().is_none());
        assert!((wallet::get(ledger.as_ref(), "u1").unwrap().sp - 300.0).abs() < 1e-6);
    }
}
