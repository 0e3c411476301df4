//! Popularity contest engine.
//!
//! A singleton head-to-head contest between two random crawlers. While
//! active, both contestants carry a flat multiplier boost; at expiry the
//! boost is reverted, votes are tallied and rewards paid, and the next
//! scheduler tick spawns a fresh contest. One ballot per user across both
//! contestants, enforced inside the contest transaction so concurrent votes
//! cannot slip a second ballot in.

use std::sync::Arc;

use rand::Rng;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::SettingsStore;
use crate::errors::EngineError;
use crate::feed::ActivityLog;
use crate::models::{Contest, ContestStatus};
use crate::store::{paths, BatchUpdate, LedgerStore};

use super::wallet;

#[derive(Clone)]
pub struct ContestEngine {
    ledger: Arc<dyn LedgerStore>,
    settings: SettingsStore,
    feed: ActivityLog,
}

enum VoteReject {
    NoContest,
    Ended,
    UnknownContestant,
    AlreadyVoted,
}

impl ContestEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, settings: SettingsStore, feed: ActivityLog) -> Self {
        Self { ledger, settings, feed }
    }

    pub fn current(&self) -> Result<Option<Contest>, EngineError> {
        match self.ledger.get(paths::CONTEST)? {
            None => Ok(None),
            Some(value) => Ok(serde_json::from_value(value).ok()),
        }
    }

    /// Scheduler entry point: spawn, settle or idle depending on state.
    pub fn tick<R: Rng + ?Sized>(&self, rng: &mut R, now: i64) -> Result<(), EngineError> {
        let settings = self.settings.contest()?;
        let contest = self.current()?;

        if !settings.is_enabled {
            // Disabled mid-contest drops the record as-is; boosted
            // multipliers stay until an admin resets them.
            if contest.is_some() {
                self.ledger.delete(paths::CONTEST)?;
                warn!("contest system disabled, active contest record dropped");
            }
            return Ok(());
        }

        match contest {
            Some(c) if c.status == ContestStatus::Active => {
                if now >= c.end_timestamp {
                    self.settle(&c, now)?;
                }
                Ok(())
            }
            // Completed records count as absent.
            _ => self.spawn(rng, now, &settings),
        }
    }

    fn spawn<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        now: i64,
        settings: &crate::config::ContestSettings,
    ) -> Result<(), EngineError> {
        let crawlers = self
            .ledger
            .get(paths::USERS)?
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        if crawlers.len() < 2 {
            return Ok(());
        }

        let names: Vec<&String> = crawlers.keys().collect();
        let first = rng.gen_range(0..names.len());
        let second = {
            let mut idx = rng.gen_range(0..names.len() - 1);
            if idx >= first {
                idx += 1;
            }
            idx
        };
        let (name1, name2) = (names[first].clone(), names[second].clone());
        let mult = |name: &str| {
            crawlers
                .get(name)
                .and_then(|c| c.get("stock_multiplier"))
                .and_then(Value::as_f64)
                .unwrap_or(1.0)
        };
        let (m1, m2) = (mult(&name1), mult(&name2));

        let contest = json!({
            "contestant1_name": name1,
            "contestant2_name": name2,
            "contestant1_original_multiplier": m1,
            "contestant2_original_multiplier": m2,
            "end_timestamp": now + settings.duration_secs,
            "status": "active",
            "votes": {},
        });
        let mut batch = BatchUpdate::new();
        batch.set(paths::CONTEST, contest);
        batch.set(paths::crawler_multiplier(&name1), json!(m1 + settings.multiplier_boost));
        batch.set(paths::crawler_multiplier(&name2), json!(m2 + settings.multiplier_boost));
        self.ledger.update(&batch)?;

        self.feed.live(
            "contest",
            None,
            &format!("popularity contest started: {name1} vs {name2}!"),
        );
        info!(contestant1 = %name1, contestant2 = %name2, "contest spawned");
        Ok(())
    }

    fn settle(&self, contest: &Contest, now: i64) -> Result<(), EngineError> {
        let settings = self.settings.contest()?;
        let votes1 = contest.vote_count(&contest.contestant1_name);
        let votes2 = contest.vote_count(&contest.contestant2_name);
        let winner = if votes1 > votes2 {
            Some(&contest.contestant1_name)
        } else if votes2 > votes1 {
            Some(&contest.contestant2_name)
        } else {
            None
        };

        // Revert boosts and close the record in one batch; reward credits
        // follow as their own atomic increments.
        let mut batch = BatchUpdate::new();
        batch.set(
            paths::crawler_multiplier(&contest.contestant1_name),
            json!(contest.contestant1_original_multiplier),
        );
        batch.set(
            paths::crawler_multiplier(&contest.contestant2_name),
            json!(contest.contestant2_original_multiplier),
        );
        batch.set(format!("{}/status", paths::CONTEST), json!("completed"));
        self.ledger.update(&batch)?;

        match winner {
            None => {
                self.feed.live("contest", None, "the popularity contest ended in a tie");
                info!(votes1, votes2, "contest settled with no winner");
            }
            Some(name) => {
                if wallet::credit_points(self.ledger.as_ref(), name, settings.winner_points_reward)
                    .is_ok()
                {
                    let entry = json!({
                        "points": settings.winner_points_reward,
                        "timestamp": now,
                        "reason": "contest_win",
                    });
                    if let Err(err) = self.ledger.push(&paths::points_history(name), &entry) {
                        warn!(%err, "failed to record contest points history");
                    }
                }
                for uid in contest.votes.get(name).into_iter().flat_map(|b| b.keys()) {
                    wallet::credit_sp(self.ledger.as_ref(), uid, settings.voter_sp_reward)?;
                    self.feed.notify(
                        uid,
                        "Contest reward",
                        &format!(
                            "{name} won the popularity contest. Your vote earned you {:.0} SP!",
                            settings.voter_sp_reward
                        ),
                    );
                }
                self.feed.live(
                    "contest",
                    None,
                    &format!("{name} won the popularity contest with {} votes!", votes1.max(votes2)),
                );
                info!(winner = %name, votes1, votes2, "contest settled");
            }
        }
        Ok(())
    }

    /// Cast a ballot. First write wins; a user who voted for either
    /// contestant cannot vote again.
    pub fn vote(&self, uid: &str, contestant: &str, now: i64) -> Result<(), EngineError> {
        let mut reject: Option<VoteReject> = None;
        let result = self.ledger.transaction(paths::CONTEST, &mut |current| {
            reject = None;
            let Some(raw) = current else {
                reject = Some(VoteReject::NoContest);
                return None;
            };
            let Ok(contest) = serde_json::from_value::<Contest>(raw.clone()) else {
                reject = Some(VoteReject::NoContest);
                return None;
            };
            if contest.status != ContestStatus::Active || now >= contest.end_timestamp {
                reject = Some(VoteReject::Ended);
                return None;
            }
            if contestant != contest.contestant1_name && contestant != contest.contestant2_name {
                reject = Some(VoteReject::UnknownContestant);
                return None;
            }
            if contest.has_voted(uid) {
                reject = Some(VoteReject::AlreadyVoted);
                return None;
            }
            let mut next = raw.clone();
            next["votes"][contestant][uid] = json!(true);
            Some(next)
        })?;

        if result.committed {
            return Ok(());
        }
        Err(match reject {
            Some(VoteReject::NoContest) | None => EngineError::not_found("active contest"),
            Some(VoteReject::Ended) => EngineError::conflict("the contest has already ended"),
            Some(VoteReject::UnknownContestant) => {
                EngineError::validation(format!("'{contestant}' is not in this contest"))
            }
            Some(VoteReject::AlreadyVoted) => {
                EngineError::conflict("you have already voted in this contest")
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLedger;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn engine(ledger: Arc<MemoryLedger>) -> ContestEngine {
        ContestEngine::new(
            ledger.clone(),
            SettingsStore::new(ledger.clone()),
            ActivityLog::new(ledger),
        )
    }

    fn seed(ledger: &MemoryLedger) {
        for name in ["alpha", "beta"] {
            ledger
                .set(
                    &format!("users/{name}"),
                    &json!({"name": name, "points": 100, "likes": 0, "stock_multiplier": 1.0}),
                )
                .unwrap();
        }
        ledger
            .set(
                "site_settings/contest_settings",
                &json!({
                    "is_enabled": true,
                    "winner_points_reward": 1000,
                    "voter_sp_reward": 50.0,
                    "multiplier_boost": 0.2,
                    "duration_secs": 86400,
                }),
            )
            .unwrap();
    }

    #[test]
    fn spawn_boosts_both_contestants() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        let contest = engine(ledger.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        contest.tick(&mut rng, 0).unwrap();
        let active = contest.current().unwrap().unwrap();
        assert_eq!(active.status, ContestStatus::Active);
        assert_ne!(active.contestant1_name, active.contestant2_name);
        assert_eq!(active.end_timestamp, 86_400);

        for name in [&active.contestant1_name, &active.contestant2_name] {
            let m = ledger
                .get(&paths::crawler_multiplier(name))
                .unwrap()
                .and_then(|v| v.as_f64())
                .unwrap();
            assert!((m - 1.2).abs() < 1e-9);
        }
    }

    #[test]
    fn one_ballot_per_user_across_both_contestants() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        let contest = engine(ledger.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        contest.tick(&mut rng, 0).unwrap();
        let active = contest.current().unwrap().unwrap();

        contest.vote("u1", &active.contestant1_name, 10).unwrap();
        let second = contest.vote("u1", &active.contestant2_name, 11);
        assert!(matches!(second, Err(EngineError::Conflict(_))));
        let again = contest.vote("u1", &active.contestant1_name, 12);
        assert!(matches!(again, Err(EngineError::Conflict(_))));
    }

    #[test]
    fn tally_matches_simulated_voters_and_rewards_flow() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        let contest = engine(ledger.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        contest.tick(&mut rng, 0).unwrap();
        let active = contest.current().unwrap().unwrap();
        let winner = active.contestant1_name.clone();
        let loser = active.contestant2_name.clone();

        for i in 0..5 {
            contest.vote(&format!("w{i}"), &winner, 10).unwrap();
        }
        for i in 0..2 {
            contest.vote(&format!("l{i}"), &loser, 10).unwrap();
        }
        let tallied = contest.current().unwrap().unwrap();
        assert_eq!(tallied.vote_count(&winner), 5);
        assert_eq!(tallied.vote_count(&loser), 2);

        // Expire and settle.
        contest.tick(&mut rng, 90_000).unwrap();
        let settled = contest.current().unwrap().unwrap();
        assert_eq!(settled.status, ContestStatus::Completed);

        let points = ledger
            .get(&paths::crawler_points(&winner))
            .unwrap()
            .and_then(|v| v.as_i64())
            .unwrap();
        assert_eq!(points, 1_100);
        assert_eq!(
            ledger.get("wallets/w0/sp").unwrap(),
            Some(json!(50.0))
        );
        assert!(ledger.get("wallets/l0/sp").unwrap().is_none());

        // Boost reverted.
        let m = ledger
            .get(&paths::crawler_multiplier(&winner))
            .unwrap()
            .and_then(|v| v.as_f64())
            .unwrap();
        assert!((m - 1.0).abs() < 1e-9);

        // Next tick treats the completed record as absent.
        contest.tick(&mut rng, 90_010).unwrap();
        let fresh = contest.current().unwrap().unwrap();
        assert_eq!(fresh.status, ContestStatus::Active);
        assert!(fresh.votes.is_empty());
    }

    #[test]
    fn tie_reverts_without_rewards() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        let contest = engine(ledger.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        contest.tick(&mut rng, 0).unwrap();
        let active = contest.current().unwrap().unwrap();

        contest.vote("u1", &active.contestant1_name, 10).unwrap();
        contest.vote("u2", &active.contestant2_name, 10).unwrap();
        contest.tick(&mut rng, 90_000).unwrap();

        for name in ["alpha", "beta"] {
            assert_eq!(
                ledger.get(&paths::crawler_points(name)).unwrap(),
                Some(json!(100))
            );
        }
        assert!(ledger.get("wallets/u1/sp").unwrap().is_none());
    }

    #[test]
    fn disabling_mid_contest_drops_the_record() {
        let ledger = Arc::new(MemoryLedger::new());
        seed(&ledger);
        let contest = engine(ledger.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        contest.tick(&mut rng, 0).unwrap();
        assert!(contest.current().unwrap().is_some());

        ledger
            .set("site_settings/contest_settings/is_enabled", &json!(false))
            .unwrap();
        contest.tick(&mut rng, 100).unwrap();
        assert!(contest.current().unwrap().is_none());
    }
}
