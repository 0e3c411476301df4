//! Simple gamble games.
//!
//! Coin flip: escrow the bet, roll a weighted coin, a win pays twice the
//! stake. Stock prediction: a double-or-nothing ladder against a randomly
//! drawn crawler; each correct up/down guess doubles the running winnings,
//! one miss forfeits them, cashing out banks them. The session state lives
//! in the ledger so the engine, not the HTTP layer, owns it; state changes
//! go through aborting transactions so a concurrent play and cashout cannot
//! both pay.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::SettingsStore;
use crate::errors::EngineError;
use crate::feed::ActivityLog;
use crate::models::{GambleSession, PriceGuess};
use crate::store::{paths, LedgerStore};

use super::wallet;

/// Prediction rounds go stale this many seconds after starting.
const SESSION_TTL_SECS: i64 = 300;

#[derive(Debug, Serialize)]
pub struct FlipOutcome {
    pub won: bool,
    pub payout: f64,
    pub new_balance: f64,
}

#[derive(Debug, Serialize)]
pub struct PredictionOutcome {
    pub won: bool,
    pub current_winnings: f64,
    pub round_over: bool,
}

#[derive(Clone)]
pub struct GambleEngine {
    ledger: Arc<dyn LedgerStore>,
    settings: SettingsStore,
    feed: ActivityLog,
}

impl GambleEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, settings: SettingsStore, feed: ActivityLog) -> Self {
        Self { ledger, settings, feed }
    }

    fn validate_bet(bet: f64, max_bet: f64) -> Result<(), EngineError> {
        if !(bet.is_finite() && bet > 0.0) {
            return Err(EngineError::validation("bet must be a positive number"));
        }
        if bet > max_bet {
            return Err(EngineError::validation(format!(
                "bet exceeds the maximum of {max_bet:.0} SP"
            )));
        }
        Ok(())
    }

    pub fn coin_flip<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        uid: &str,
        bet: f64,
    ) -> Result<FlipOutcome, EngineError> {
        let settings = self.settings.gambling()?;
        if !settings.is_enabled {
            return Err(EngineError::Disabled("gambling"));
        }
        Self::validate_bet(bet, settings.max_bet)?;

        let mut balance = wallet::try_debit_sp(self.ledger.as_ref(), uid, bet)?;
        let won = rng.gen_range(0.0..100.0) < settings.win_chance_percent;
        let payout = if won { bet * 2.0 } else { 0.0 };
        if won {
            balance = wallet::credit_sp(self.ledger.as_ref(), uid, payout)?;
            self.feed
                .live("gamble", Some(uid), &format!("{uid} doubled {bet:.2} SP on a coin flip"));
        }
        info!(uid, bet, won, "coin flip resolved");
        Ok(FlipOutcome { won, payout, new_balance: balance })
    }

    /// Escrow the bet and open a prediction round against a random crawler.
    pub fn prediction_start<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        uid: &str,
        bet: f64,
        now: i64,
    ) -> Result<GambleSession, EngineError> {
        let settings = self.settings.prediction()?;
        if !settings.is_enabled {
            return Err(EngineError::Disabled("the prediction game"));
        }
        Self::validate_bet(bet, settings.max_bet)?;
        if self.active_session(uid, now)?.is_some() {
            return Err(EngineError::conflict(
                "finish or cash out your current prediction round first",
            ));
        }

        let crawlers: Vec<String> = self
            .ledger
            .get(paths::USERS)?
            .and_then(|v| v.as_object().map(|m| m.keys().cloned().collect()))
            .unwrap_or_default();
        if crawlers.is_empty() {
            return Err(EngineError::not_found("any crawler to predict on"));
        }
        let crawler_name = crawlers[rng.gen_range(0..crawlers.len())].clone();

        wallet::try_debit_sp(self.ledger.as_ref(), uid, bet)?;

        let session = GambleSession {
            initial_bet: bet,
            current_winnings: bet,
            crawler_name,
            started_at: now,
        };
        let session_json = match serde_json::to_value(&session) {
            Ok(v) => v,
            Err(_) => {
                let _ = wallet::credit_sp(self.ledger.as_ref(), uid, bet);
                return Err(EngineError::validation("unstorable session"));
            }
        };
        if let Err(err) = self.ledger.set(&paths::gamble_session(uid), &session_json) {
            let _ = wallet::credit_sp(self.ledger.as_ref(), uid, bet);
            return Err(err.into());
        }
        info!(uid, bet, crawler = %session.crawler_name, "prediction round started");
        Ok(session)
    }

    /// One up/down guess. A win doubles the running winnings, a loss ends
    /// the round with nothing.
    pub fn prediction_play<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        uid: &str,
        _guess: PriceGuess,
        now: i64,
    ) -> Result<PredictionOutcome, EngineError> {
        let settings = self.settings.prediction()?;
        if !settings.is_enabled {
            return Err(EngineError::Disabled("the prediction game"));
        }
        // The roll happens before the transaction so the closure stays pure.
        let won = rng.gen_range(0.0..100.0) < settings.win_chance_percent;

        let mut expired = false;
        let mut winnings = 0.0;
        let result = self.ledger.transaction(&paths::gamble_session(uid), &mut |current| {
            expired = false;
            winnings = 0.0;
            let session: GambleSession = serde_json::from_value(current?.clone()).ok()?;
            if now - session.started_at > SESSION_TTL_SECS {
                expired = true;
                return Some(Value::Null);
            }
            if !won {
                return Some(Value::Null);
            }
            winnings = session.current_winnings * 2.0;
            serde_json::to_value(GambleSession { current_winnings: winnings, ..session }).ok()
        })?;

        if !result.committed {
            return Err(EngineError::not_found("an active prediction round"));
        }
        if expired {
            return Err(EngineError::conflict("the prediction round expired"));
        }
        info!(uid, won, winnings, "prediction guess resolved");
        Ok(PredictionOutcome { won, current_winnings: winnings, round_over: !won })
    }

    /// Bank the running winnings and close the round.
    pub fn prediction_cashout(&self, uid: &str, now: i64) -> Result<f64, EngineError> {
        let mut expired = false;
        let mut winnings = 0.0;
        let result = self.ledger.transaction(&paths::gamble_session(uid), &mut |current| {
            expired = false;
            winnings = 0.0;
            let session: GambleSession = serde_json::from_value(current?.clone()).ok()?;
            if now - session.started_at > SESSION_TTL_SECS {
                expired = true;
            } else {
                winnings = session.current_winnings;
            }
            Some(Value::Null)
        })?;

        if !result.committed {
            return Err(EngineError::not_found("an active prediction round"));
        }
        if expired {
            return Err(EngineError::conflict("the prediction round expired"));
        }
        wallet::credit_sp(self.ledger.as_ref(), uid, winnings)?;
        self.feed.live(
            "gamble",
            Some(uid),
            &format!("{uid} cashed out {winnings:.2} SP from the prediction game"),
        );
        info!(uid, winnings, "prediction round cashed out");
        Ok(winnings)
    }

    fn active_session(&self, uid: &str, now: i64) -> Result<Option<GambleSession>, EngineError> {
        match self.ledger.get(&paths::gamble_session(uid))? {
            None => Ok(None),
            Some(raw) => {
                let session: GambleSession = serde_json::from_value(raw)
                    .map_err(|_| EngineError::validation("corrupt gamble session"))?;
                if now - session.started_at > SESSION_TTL_SECS {
                    self.ledger.delete(&paths::gamble_session(uid))?;
                    Ok(None)
                } else {
                    Ok(Some(session))
                }
            }
        }
    }
}
