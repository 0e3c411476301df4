//! Core economy data shapes as they live in the ledger tree.
//!
//! Field names match the stored document layout (`sp`/`p`/`t` on lots,
//! camelCase on spin state), so these types (de)serialize straight against
//! ledger values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-user currency balances. Created lazily on first credit; never
/// deleted. `cc` is the spend currency, `sp` the investment/wager currency.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Wallet {
    pub cc: i64,
    pub sp: f64,
}

/// A nominated, competing entity users invest in and vote for. Not
/// necessarily a login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Crawler {
    pub name: String,
    pub points: i64,
    pub likes: i64,
    pub stock_multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Default for Crawler {
    fn default() -> Self {
        Self {
            name: String::new(),
            points: 0,
            likes: 0,
            stock_multiplier: 1.0,
            avatar_url: None,
        }
    }
}

/// One discrete investment purchase. Immutable once created; only ever
/// deleted whole (full sale of the lot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentLot {
    /// SP staked at purchase.
    pub sp: f64,
    /// Crawler points at purchase time, the cost-basis denominator.
    /// Floored at 1 during valuation, stored raw.
    pub p: i64,
    /// Purchase timestamp (unix seconds); drives the lock window.
    pub t: i64,
}

/// All lots one investor holds in one crawler, plus the per-pair
/// multiplier override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub lots: BTreeMap<String, InvestmentLot>,
    pub personal_multiplier: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_override: Option<String>,
}

impl Default for Position {
    fn default() -> Self {
        Self {
            lots: BTreeMap::new(),
            personal_multiplier: 1.0,
            manual_override: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestStatus {
    Active,
    Completed,
}

/// The singleton head-to-head popularity contest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contest {
    pub contestant1_name: String,
    pub contestant2_name: String,
    pub contestant1_original_multiplier: f64,
    pub contestant2_original_multiplier: f64,
    pub end_timestamp: i64,
    pub status: ContestStatus,
    /// contestant name -> voter uid -> true. One ballot per user across
    /// both contestants, enforced at vote time.
    #[serde(default)]
    pub votes: BTreeMap<String, BTreeMap<String, bool>>,
}

impl Contest {
    pub fn vote_count(&self, contestant: &str) -> usize {
        self.votes.get(contestant).map_or(0, |v| v.len())
    }

    pub fn has_voted(&self, uid: &str) -> bool {
        self.votes.values().any(|ballots| ballots.contains_key(uid))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpsMove {
    Rock,
    Paper,
    Scissors,
}

impl RpsMove {
    pub fn beats(self, other: RpsMove) -> bool {
        matches!(
            (self, other),
            (RpsMove::Rock, RpsMove::Scissors)
                | (RpsMove::Paper, RpsMove::Rock)
                | (RpsMove::Scissors, RpsMove::Paper)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Open,
    Playing,
    Finished,
}

/// "player1" / "player2" / "draw", as stored on finished challenges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOutcome {
    Player1,
    Player2,
    Draw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRef {
    pub uid: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundChoices {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player1: Option<RpsMove>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player2: Option<RpsMove>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Scores {
    pub player1: u32,
    pub player2: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GameState {
    pub round: u32,
    pub scores: Scores,
    /// "round1".."round3" -> pending/complete moves.
    pub choices: BTreeMap<String, RoundChoices>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            round: 1,
            scores: Scores::default(),
            choices: BTreeMap::new(),
        }
    }
}

/// Two-player escrowed rock-paper-scissors match, best of 3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub player1: PlayerRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player2: Option<PlayerRef>,
    pub bet_amount: f64,
    pub status: ChallengeStatus,
    pub created_at: i64,
    #[serde(default)]
    pub game_state: GameState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<MatchOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome_reason: Option<String>,
}

impl Challenge {
    pub fn player_key(&self, uid: &str) -> Option<MatchOutcome> {
        if self.player1.uid == uid {
            return Some(MatchOutcome::Player1);
        }
        if self.player2.as_ref().is_some_and(|p| p.uid == uid) {
            return Some(MatchOutcome::Player2);
        }
        None
    }

    pub fn player(&self, key: MatchOutcome) -> Option<&PlayerRef> {
        match key {
            MatchOutcome::Player1 => Some(&self.player1),
            MatchOutcome::Player2 => self.player2.as_ref(),
            MatchOutcome::Draw => None,
        }
    }
}

/// Per-user spin attempt pools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinState {
    #[serde(rename = "freeAttempts")]
    pub free_attempts: i64,
    #[serde(rename = "purchasedAttempts")]
    pub purchased_attempts: i64,
    #[serde(rename = "lastFreeUpdateTimestamp")]
    pub last_free_update_timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPool {
    Free,
    Purchased,
}

impl AttemptPool {
    pub fn field(self) -> &'static str {
        match self {
            AttemptPool::Free => "freeAttempts",
            AttemptPool::Purchased => "purchasedAttempts",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttemptPool::Free => "free",
            AttemptPool::Purchased => "purchased",
        }
    }
}

/// Active double-or-nothing round for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GambleSession {
    pub initial_bet: f64,
    pub current_winnings: f64,
    pub crawler_name: String,
    pub started_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceGuess {
    Up,
    Down,
}

/// One point on a crawler's points-history chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub points: i64,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rps_precedence() {
        assert!(RpsMove::Rock.beats(RpsMove::Scissors));
        assert!(RpsMove::Paper.beats(RpsMove::Rock));
        assert!(RpsMove::Scissors.beats(RpsMove::Paper));
        assert!(!RpsMove::Rock.beats(RpsMove::Paper));
        assert!(!RpsMove::Rock.beats(RpsMove::Rock));
    }

    #[test]
    fn spin_state_uses_stored_field_names() {
        let state = SpinState {
            free_attempts: 2,
            purchased_attempts: 1,
            last_free_update_timestamp: 42,
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["freeAttempts"], 2);
        assert_eq!(value["lastFreeUpdateTimestamp"], 42);
    }

    #[test]
    fn contest_ballot_lookup_spans_both_contestants() {
        let mut contest = Contest {
            contestant1_name: "a".into(),
            contestant2_name: "b".into(),
            contestant1_original_multiplier: 1.0,
            contestant2_original_multiplier: 1.0,
            end_timestamp: 100,
            status: ContestStatus::Active,
            votes: BTreeMap::new(),
        };
        contest
            .votes
            .entry("a".into())
            .or_default()
            .insert("u1".into(), true);

        assert!(contest.has_voted("u1"));
        assert!(!contest.has_voted("u2"));
        assert_eq!(contest.vote_count("a"), 1);
        assert_eq!(contest.vote_count("b"), 0);
    }
}
