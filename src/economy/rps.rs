//! Rock-paper-scissors PvP wager engine.
//!
//! Challenge lifecycle: open -> playing -> finished. Both stakes are
//! escrowed out of the wallets up front; the pot pays out at settlement.
//! The whole record-move / resolve-round / maybe-finish sequence runs as
//! one transaction on the challenge record, since both players may submit
//! concurrently. The closure stays pure: settlement, the global cooldown
//! lock and logging all happen after the commit, keyed on whether this
//! call's commit finished the match.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::config::SettingsStore;
use crate::errors::EngineError;
use crate::feed::ActivityLog;
use crate::models::{Challenge, ChallengeStatus, GameState, MatchOutcome, PlayerRef, RpsMove};
use crate::store::{paths, LedgerStore};

use super::wallet;

#[derive(Debug, Serialize)]
pub struct PlayOutcome {
    pub round: u32,
    pub scores: (u32, u32),
    pub finished: bool,
    pub winner: Option<MatchOutcome>,
}

#[derive(Clone)]
pub struct RpsEngine {
    ledger: Arc<dyn LedgerStore>,
    settings: SettingsStore,
    feed: ActivityLog,
}

fn round_key(round: u32) -> String {
    format!("round{round}")
}

/// Apply one move to the game state. Returns an error string on an illegal
/// submission, otherwise whether the match is now over and who won.
fn apply_move(
    challenge: &mut Challenge,
    player: MatchOutcome,
    mv: RpsMove,
) -> Result<Option<MatchOutcome>, &'static str> {
    let state = &mut challenge.game_state;
    let key = round_key(state.round);
    let choices = state.choices.entry(key).or_default();
    let (own, theirs) = match player {
        MatchOutcome::Player1 => (&mut choices.player1, choices.player2),
        MatchOutcome::Player2 => (&mut choices.player2, choices.player1),
        MatchOutcome::Draw => return Err("not a player"),
    };
    if own.is_some() {
        return Err("you already moved this round");
    }
    *own = Some(mv);

    let Some(other) = theirs else {
        // Opponent still to move; round stays open.
        return Ok(None);
    };
    let (p1_move, p2_move) = match player {
        MatchOutcome::Player1 => (mv, other),
        _ => (other, mv),
    };
    if p1_move.beats(p2_move) {
        state.scores.player1 += 1;
    } else if p2_move.beats(p1_move) {
        state.scores.player2 += 1;
    }
    // A drawn round still advances the counter.
    state.round += 1;

    let over = state.scores.player1 >= 2 || state.scores.player2 >= 2 || state.round > 3;
    if !over {
        return Ok(None);
    }
    challenge.status = ChallengeStatus::Finished;
    let winner = if state.scores.player1 > state.scores.player2 {
        MatchOutcome::Player1
    } else if state.scores.player2 > state.scores.player1 {
        MatchOutcome::Player2
    } else {
        MatchOutcome::Draw
    };
    challenge.winner = Some(winner);
    Ok(Some(winner))
}

impl RpsEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, settings: SettingsStore, feed: ActivityLog) -> Self {
        Self { ledger, settings, feed }
    }

    fn check_lock(&self, now: i64) -> Result<crate::config::RpsSettings, EngineError> {
        let settings = self.settings.rps()?;
        if !settings.is_enabled {
            return Err(EngineError::Disabled("RPS wagering"));
        }
        if now < settings.lock_until {
            return Err(EngineError::conflict(format!(
                "RPS is cooling down for {} more second(s)",
                settings.lock_until - now
            )));
        }
        Ok(settings)
    }

    fn engage_lock(&self, now: i64, cooldown_seconds: i64) {
        let path = format!("{}/lock_until", paths::settings(crate::config::RPS_SECTION));
        if let Err(err) = self.ledger.set(&path, &json!(now + cooldown_seconds)) {
            tracing::warn!(%err, "failed to engage RPS cooldown lock");
        }
    }

    fn settle(&self, challenge: &Challenge, winner: MatchOutcome, reason: &str) {
        let pot = challenge.bet_amount * 2.0;
        match winner {
            MatchOutcome::Draw => {
                for key in [MatchOutcome::Player1, MatchOutcome::Player2] {
                    if let Some(p) = challenge.player(key) {
                        let _ = wallet::credit_sp(self.ledger.as_ref(), &p.uid, challenge.bet_amount);
                    }
                }
                self.feed.live("rps", None, "an RPS match ended in a draw, stakes returned");
            }
            key => {
                if let Some(p) = challenge.player(key) {
                    let _ = wallet::credit_sp(self.ledger.as_ref(), &p.uid, pot);
                    self.feed.live(
                        "rps",
                        Some(&p.uid),
                        &format!("{} won an RPS pot of {pot:.2} SP ({reason})", p.name),
                    );
                }
            }
        }
    }

    /// Escrow the creator's stake and open a challenge. Returns its id.
    pub fn create(
        &self,
        uid: &str,
        name: &str,
        bet: f64,
        now: i64,
    ) -> Result<String, EngineError> {
        let settings = self.check_lock(now)?;
        if !(bet.is_finite() && bet > 0.0) {
            return Err(EngineError::validation("bet must be a positive number"));
        }
        if bet > settings.max_bet {
            return Err(EngineError::validation(format!(
                "bet exceeds the maximum of {:.0} SP",
                settings.max_bet
            )));
        }

        wallet::try_debit_sp(self.ledger.as_ref(), uid, bet)?;

        let id = Uuid::new_v4().to_string();
        let challenge = json!({
            "player1": {"uid": uid, "name": name},
            "bet_amount": bet,
            "status": "open",
            "created_at": now,
            "game_state": {"round": 1, "scores": {"player1": 0, "player2": 0}, "choices": {}},
        });
        if let Err(err) = self.ledger.set(&paths::challenge(&id), &challenge) {
            let _ = wallet::credit_sp(self.ledger.as_ref(), uid, bet);
            return Err(err.into());
        }

        info!(uid, bet, id, "RPS challenge created");
        Ok(id)
    }

    /// Escrow the joiner's stake, then claim the open seat. The escrow runs
    /// first as its own wallet transaction; losing the claim race refunds
    /// it.
    pub fn join(&self, uid: &str, name: &str, id: &str, now: i64) -> Result<(), EngineError> {
        self.check_lock(now)?;

        let raw = self
            .ledger
            .get(&paths::challenge(id))?
            .ok_or_else(|| EngineError::not_found("challenge"))?;
        let preview: Challenge = serde_json::from_value(raw)
            .map_err(|_| EngineError::validation("corrupt challenge record"))?;
        if preview.player1.uid == uid {
            return Err(EngineError::conflict("you cannot join your own challenge"));
        }
        let bet = preview.bet_amount;

        wallet::try_debit_sp(self.ledger.as_ref(), uid, bet)?;

        let result = self.ledger.transaction(&paths::challenge(id), &mut |current| {
            let mut challenge: Challenge = serde_json::from_value(current?.clone()).ok()?;
            if challenge.status != ChallengeStatus::Open
                || challenge.player2.is_some()
                || challenge.player1.uid == uid
            {
                return None;
            }
            challenge.player2 = Some(PlayerRef { uid: uid.to_string(), name: name.to_string() });
            challenge.status = ChallengeStatus::Playing;
            serde_json::to_value(&challenge).ok()
        })?;

        if !result.committed {
            let _ = wallet::credit_sp(self.ledger.as_ref(), uid, bet);
            return Err(EngineError::conflict("the challenge is no longer open"));
        }
        info!(uid, id, "RPS challenge joined");
        Ok(())
    }

    /// Submit a move for the current round.
    pub fn play(&self, uid: &str, id: &str, mv: RpsMove, now: i64) -> Result<PlayOutcome, EngineError> {
        let settings = self.settings.rps()?;
        if !settings.is_enabled {
            return Err(EngineError::Disabled("RPS wagering"));
        }

        let mut reject: Option<&'static str> = None;
        let mut finished: Option<(Challenge, MatchOutcome)> = None;
        let mut outcome: Option<PlayOutcome> = None;
        let result = self.ledger.transaction(&paths::challenge(id), &mut |current| {
            reject = None;
            finished = None;
            outcome = None;
            let mut challenge: Challenge = serde_json::from_value(current?.clone()).ok()?;
            if challenge.status != ChallengeStatus::Playing {
                reject = Some("the match is not in progress");
                return None;
            }
            let Some(player) = challenge.player_key(uid) else {
                reject = Some("you are not part of this match");
                return None;
            };
            match apply_move(&mut challenge, player, mv) {
                Err(msg) => {
                    reject = Some(msg);
                    None
                }
                Ok(winner) => {
                    outcome = Some(PlayOutcome {
                        round: challenge.game_state.round,
                        scores: (
                            challenge.game_state.scores.player1,
                            challenge.game_state.scores.player2,
                        ),
                        finished: winner.is_some(),
                        winner,
                    });
                    if let Some(w) = winner {
                        finished = Some((challenge.clone(), w));
                    }
                    serde_json::to_value(&challenge).ok()
                }
            }
        })?;

        if !result.committed {
            return Err(match reject {
                Some(msg) => EngineError::conflict(msg),
                None => EngineError::not_found("challenge"),
            });
        }
        // Only the call whose commit ended the match settles it.
        if let Some((challenge, winner)) = finished.take() {
            self.settle(&challenge, winner, "best of 3");
            self.engage_lock(now, settings.cooldown_seconds);
        }
        outcome.take().ok_or_else(|| EngineError::validation("corrupt challenge record"))
    }

    /// Concede an in-progress match; the opponent takes the whole pot.
    pub fn surrender(&self, uid: &str, id: &str, now: i64) -> Result<(), EngineError> {
        let settings = self.settings.rps()?;

        let mut finished: Option<(Challenge, MatchOutcome)> = None;
        let result = self.ledger.transaction(&paths::challenge(id), &mut |current| {
            finished = None;
            let mut challenge: Challenge = serde_json::from_value(current?.clone()).ok()?;
            if challenge.status != ChallengeStatus::Playing {
                return None;
            }
            let winner = match challenge.player_key(uid)? {
                MatchOutcome::Player1 => MatchOutcome::Player2,
                MatchOutcome::Player2 => MatchOutcome::Player1,
                MatchOutcome::Draw => return None,
            };
            challenge.status = ChallengeStatus::Finished;
            challenge.winner = Some(winner);
            challenge.outcome_reason = Some("surrender".to_string());
            finished = Some((challenge.clone(), winner));
            serde_json::to_value(&challenge).ok()
        })?;

        if !result.committed {
            return Err(EngineError::conflict("no surrenderable match found"));
        }
        if let Some((challenge, winner)) = finished.take() {
            self.settle(&challenge, winner, "surrender");
            self.engage_lock(now, settings.cooldown_seconds);
        }
        info!(uid, id, "RPS match surrendered");
        Ok(())
    }

    /// Creator withdraws a still-open challenge and gets the stake back.
    pub fn cancel(&self, uid: &str, id: &str) -> Result<(), EngineError> {
        let mut refund = 0.0;
        let result = self.ledger.transaction(&paths::challenge(id), &mut |current| {
            refund = 0.0;
            let challenge: Challenge = serde_json::from_value(current?.clone()).ok()?;
            if challenge.status != ChallengeStatus::Open || challenge.player1.uid != uid {
                return None;
            }
            refund = challenge.bet_amount;
            Some(Value::Null)
        })?;

        if !result.committed {
            return Err(EngineError::conflict(
                "only the creator of an open challenge can cancel it",
            ));
        }
        wallet::credit_sp(self.ledger.as_ref(), uid, refund)?;
        info!(uid, id, "RPS challenge cancelled");
        Ok(())
    }

    pub fn open_challenges(&self) -> Result<Vec<(String, Challenge)>, EngineError> {
        let Some(tree) = self.ledger.get(paths::CHALLENGES)? else {
            return Ok(Vec::new());
        };
        let Some(entries) = tree.as_object() else {
            return Ok(Vec::new());
        };
        let mut open = Vec::new();
        for (id, raw) in entries {
            if let Ok(challenge) = serde_json::from_value::<Challenge>(raw.clone()) {
                if challenge.status == ChallengeStatus::Open {
                    open.push((id.clone(), challenge));
                }
            }
        }
        Ok(open)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;

    fn engine(ledger: Arc<MemoryLedger>) -> RpsEngine {
        RpsEngine::new(
            ledger.clone(),
            SettingsStore::new(ledger.clone()),
            ActivityLog::new(ledger),
        )
    }

    fn setup(ledger: &MemoryLedger) {
        ledger
            .set(
                "site_settings/rps_game",
                &json!({"is_enabled": true, "max_bet": 500.0, "cooldown_seconds": 60, "lock_until": 0}),
            )
            .unwrap();
        for uid in ["p1", "p2"] {
            ledger.set(&format!("wallets/{uid}/sp"), &json!(100.0)).unwrap();
        }
    }

    fn sp(ledger: &MemoryLedger, uid: &str) -> f64 {
        ledger
            .get(&format!("wallets/{uid}/sp"))
            .unwrap()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    fn start_match(rps: &RpsEngine) -> String {
        let id = rps.create("p1", "One", 50.0, 0).unwrap();
        rps.join("p2", "Two", &id, 0).unwrap();
        id
    }

    #[test]
    fn create_and_join_escrow_both_stakes() {
        let ledger = Arc::new(MemoryLedger::new());
        setup(&ledger);
        let rps = engine(ledger.clone());
        start_match(&rps);
        assert_eq!(sp(&ledger, "p1"), 50.0);
        assert_eq!(sp(&ledger, "p2"), 50.0);
    }

    #[test]
    fn rock_beats_scissors_and_winner_takes_pot() {
        let ledger = Arc::new(MemoryLedger::new());
        setup(&ledger);
        let rps = engine(ledger.clone());
        let id = start_match(&rps);

        for _ in 0..2 {
            rps.play("p1", &id, RpsMove::Rock, 10).unwrap();
            let out = rps.play("p2", &id, RpsMove::Scissors, 10).unwrap();
            if out.finished {
                assert_eq!(out.winner, Some(MatchOutcome::Player1));
            }
        }
        assert_eq!(sp(&ledger, "p1"), 150.0);
        assert_eq!(sp(&ledger, "p2"), 50.0);

        // The global cooldown engaged.
        let lock = ledger
            .get("site_settings/rps_game/lock_until")
            .unwrap()
            .and_then(|v| v.as_i64())
            .unwrap();
        assert_eq!(lock, 70);
        assert!(matches!(
            rps.create("p1", "One", 10.0, 30),
            Err(EngineError::Conflict(_))
        ));
    }

    #[test]
    fn drawn_round_advances_without_score() {
        let ledger = Arc::new(MemoryLedger::new());
        setup(&ledger);
        let rps = engine(ledger.clone());
        let id = start_match(&rps);

        rps.play("p1", &id, RpsMove::Rock, 10).unwrap();
        let out = rps.play("p2", &id, RpsMove::Rock, 10).unwrap();
        assert_eq!(out.scores, (0, 0));
        assert_eq!(out.round, 2);
        assert!(!out.finished);
    }

    #[test]
    fn three_drawn_rounds_refund_both_players() {
        let ledger = Arc::new(MemoryLedger::new());
        setup(&ledger);
        let rps = engine(ledger.clone());
        let id = start_match(&rps);

        for _ in 0..3 {
            rps.play("p1", &id, RpsMove::Paper, 10).unwrap();
            rps.play("p2", &id, RpsMove::Paper, 10).unwrap();
        }
        assert_eq!(sp(&ledger, "p1"), 100.0);
        assert_eq!(sp(&ledger, "p2"), 100.0);
    }

    #[test]
    fn double_move_in_one_round_is_rejected() {
        let ledger = Arc::new(MemoryLedger::new());
        setup(&ledger);
        let rps = engine(ledger.clone());
        let id = start_match(&rps);

        rps.play("p1", &id, RpsMove::Rock, 10).unwrap();
        assert!(matches!(
            rps.play("p1", &id, RpsMove::Paper, 11),
            Err(EngineError::Conflict(_))
        ));
    }

    #[test]
    fn surrender_hands_the_pot_to_the_opponent() {
        let ledger = Arc::new(MemoryLedger::new());
        setup(&ledger);
        let rps = engine(ledger.clone());
        let id = start_match(&rps);

        rps.surrender("p1", &id, 20).unwrap();
        assert_eq!(sp(&ledger, "p1"), 50.0);
        assert_eq!(sp(&ledger, "p2"), 150.0);
    }

    #[test]
    fn cancel_refunds_only_open_challenges_by_creator() {
        let ledger = Arc::new(MemoryLedger::new());
        setup(&ledger);
        let rps = engine(ledger.clone());

        let id = rps.create("p1", "One", 30.0, 0).unwrap();
        assert!(rps.cancel("p2", &id).is_err());
        rps.cancel("p1", &id).unwrap();
        assert_eq!(sp(&ledger, "p1"), 100.0);
        assert!(rps.cancel("p1", &id).is_err());
    }

    #[test]
    fn join_race_loser_is_refunded() {
        let ledger = Arc::new(MemoryLedger::new());
        setup(&ledger);
        ledger.set("wallets/p3/sp", &json!(100.0)).unwrap();
        let rps = engine(ledger.clone());

        let id = rps.create("p1", "One", 40.0, 0).unwrap();
        rps.join("p2", "Two", &id, 0).unwrap();
        // Third player arrives after the seat is taken.
        assert!(matches!(
            rps.join("p3", "Three", &id, 1),
            Err(EngineError::Conflict(_))
        ));
        assert_eq!(sp(&ledger, "p3"), 100.0);
    }

    #[test]
    fn join_own_challenge_is_rejected_before_escrow() {
        let ledger = Arc::new(MemoryLedger::new());
        setup(&ledger);
        let rps = engine(ledger.clone());
        let id = rps.create("p1", "One", 40.0, 0).unwrap();
        assert!(rps.join("p1", "One", &id, 0).is_err());
        assert_eq!(sp(&ledger, "p1"), 60.0);
    }

    #[test]
    fn bet_validation() {
        let ledger = Arc::new(MemoryLedger::new());
        setup(&ledger);
        let rps = engine(ledger.clone());
        assert!(rps.create("p1", "One", 0.0, 0).is_err());
        assert!(rps.create("p1", "One", 501.0, 0).is_err());
        assert!(matches!(
            rps.create("p1", "One", 101.0, 0),
            Err(EngineError::InsufficientFunds { .. })
        ));
    }
}
