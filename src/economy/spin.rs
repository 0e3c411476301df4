//! Spin-wheel engine.
//!
//! Two attempt pools per user: free attempts replenish on a cooldown and
//! cap at `maxAccumulation`; purchased attempts are bought with SP and cap
//! at `purchaseLimit`. The attempt decrement is an aborting transaction, so
//! two concurrent spins can never share one attempt.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::SettingsStore;
use crate::errors::EngineError;
use crate::feed::ActivityLog;
use crate::models::{AttemptPool, SpinState};
use crate::store::{paths, LedgerStore};

use super::sampler::draw_prize;
use super::wallet;

#[derive(Debug, Serialize)]
pub struct SpinOutcome {
    pub prize_cc: i64,
    /// Wheel segment index for the UI animation.
    pub segment: usize,
    pub pool: &'static str,
    pub attempts_left: i64,
    pub new_cc_balance: i64,
}

#[derive(Clone)]
pub struct SpinEngine {
    ledger: Arc<dyn LedgerStore>,
    settings: SettingsStore,
    feed: ActivityLog,
}

impl SpinEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, settings: SettingsStore, feed: ActivityLog) -> Self {
        Self { ledger, settings, feed }
    }

    /// Lazily initialize a user's pools and replenish free attempts when
    /// the cooldown window has elapsed. Returns the state after the check.
    pub fn check_and_update_state(&self, uid: &str, now: i64) -> Result<SpinState, EngineError> {
        let settings = self.settings.spin_wheel()?;
        let cooldown_secs = settings.cooldown_hours * 3600;

        let result = self.ledger.transaction(&paths::spin_state(uid), &mut |current| {
            let state: SpinState = current
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            if current.is_none() {
                return serde_json::to_value(SpinState {
                    free_attempts: settings.max_attempts,
                    purchased_attempts: 0,
                    last_free_update_timestamp: now,
                })
                .ok();
            }
            if now - state.last_free_update_timestamp >= cooldown_secs {
                return serde_json::to_value(SpinState {
                    free_attempts: (state.free_attempts + settings.max_attempts)
                        .min(settings.max_accumulation),
                    last_free_update_timestamp: now,
                    ..state
                })
                .ok();
            }
            // Inside the window: leave the record alone.
            None
        })?;

        let value = result.value.unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|_| EngineError::validation("corrupt spin state"))
    }

    pub fn spin<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        uid: &str,
        pool: AttemptPool,
        now: i64,
    ) -> Result<SpinOutcome, EngineError> {
        let settings = self.settings.spin_wheel()?;
        if !settings.enabled {
            return Err(EngineError::Disabled("the spin wheel"));
        }
        if settings.prizes.is_empty() {
            return Err(EngineError::validation("the prize table is empty"));
        }
        self.check_and_update_state(uid, now)?;

        // Claim one attempt; abort leaves the pool untouched.
        let result = self
            .ledger
            .transaction(&paths::spin_field(uid, pool.field()), &mut |current| {
                let attempts = current.and_then(Value::as_i64).unwrap_or(0);
                if attempts <= 0 {
                    return None;
                }
                Some(json!(attempts - 1))
            })?;
        if !result.committed {
            return Err(EngineError::conflict(format!(
                "no {} attempts left",
                pool.label()
            )));
        }
        let attempts_left = result.value.as_ref().and_then(Value::as_i64).unwrap_or(0);

        let draw = draw_prize(rng, &settings.prizes)
            .ok_or_else(|| EngineError::validation("the prize table has no positive weights"))?;
        let new_cc_balance = wallet::credit_cc(self.ledger.as_ref(), uid, draw.value)?;

        self.feed.live(
            "spin",
            Some(uid),
            &format!("{uid} won {} CC on the wheel!", draw.value),
        );
        info!(uid, prize = draw.value, pool = pool.label(), "wheel spun");
        Ok(SpinOutcome {
            prize_cc: draw.value,
            segment: draw.segment,
            pool: pool.label(),
            attempts_left,
            new_cc_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn engine(ledger: Arc<MemoryLedger>) -> SpinEngine {
        SpinEngine::new(
            ledger.clone(),
            SettingsStore::new(ledger.clone()),
            ActivityLog::new(ledger),
        )
    }

    fn configure(ledger: &MemoryLedger, max_attempts: i64, cooldown_hours: i64) {
        ledger
            .set(
                "site_settings/spin_wheel_settings",
                &json!({
                    "enabled": true,
                    "cooldownHours": cooldown_hours,
                    "maxAttempts": max_attempts,
                    "maxAccumulation": 3,
                    "purchaseLimit": 20,
                    "prizes": [{"value": 100, "weight": 1.0}],
                }),
            )
            .unwrap();
    }

    #[test]
    fn cooldown_scenario_one_free_spin_per_day() {
        let ledger = Arc::new(MemoryLedger::new());
        configure(&ledger, 1, 24);
        let spin = engine(ledger.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let first = spin.spin(&mut rng, "u1", AttemptPool::Free, 0).unwrap();
        assert_eq!(first.prize_cc, 100);
        assert_eq!(first.attempts_left, 0);

        // Second spin inside the window fails.
        let again = spin.spin(&mut rng, "u1", AttemptPool::Free, 3_600);
        assert!(matches!(again, Err(EngineError::Conflict(_))));

        // 24h later a fresh attempt is granted.
        let later = spin.spin(&mut rng, "u1", AttemptPool::Free, 86_400 + 1);
        assert!(later.is_ok());
    }

    #[test]
    fn replenishment_caps_at_accumulation_limit() {
        let ledger = Arc::new(MemoryLedger::new());
        configure(&ledger, 2, 24);
        let spin = engine(ledger.clone());

        spin.check_and_update_state("u1", 0).unwrap();
        let mut now = 0;
        for _ in 0..5 {
            now += 86_400 + 1;
            spin.check_and_update_state("u1", now).unwrap();
        }
        let state = spin.check_and_update_state("u1", now).unwrap();
        assert_eq!(state.free_attempts, 3);
    }

    #[test]
    fn disabled_wheel_rejects_before_touching_attempts() {
        let ledger = Arc::new(MemoryLedger::new());
        configure(&ledger, 1, 24);
        ledger
            .set("site_settings/spin_wheel_settings/enabled", &json!(false))
            .unwrap();
        let spin = engine(ledger.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        assert!(matches!(
            spin.spin(&mut rng, "u1", AttemptPool::Free, 0),
            Err(EngineError::Disabled(_))
        ));
        assert!(ledger.get("user_spin_state/u1").unwrap().is_none());
    }

    #[test]
    fn purchased_pool_is_independent_of_free_pool() {
        let ledger = Arc::new(MemoryLedger::new());
        configure(&ledger, 0, 24);
        let spin = engine(ledger.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        spin.check_and_update_state("u1", 0).unwrap();
        ledger
            .set("user_spin_state/u1/purchasedAttempts", &json!(2))
            .unwrap();

        assert!(matches!(
            spin.spin(&mut rng, "u1", AttemptPool::Free, 0),
            Err(EngineError::Conflict(_))
        ));
        let outcome = spin.spin(&mut rng, "u1", AttemptPool::Purchased, 0).unwrap();
        assert_eq!(outcome.attempts_left, 1);
        assert_eq!(outcome.new_cc_balance, 100);
    }
}
