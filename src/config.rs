//! Configuration.
//!
//! Two layers: process configuration from env vars (port, ledger path,
//! secrets, scheduler intervals), and per-engine settings stored in the
//! ledger under `site_settings/*` so admins can change them at runtime.
//! Missing or malformed stored sections fall back to defaults matching the
//! original deployment.

use std::env;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::EngineError;
use crate::store::{paths, LedgerStore};

/// Process-level configuration read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub ledger_path: String,
    pub jwt_secret: String,
    pub admin_password: String,
    pub volatility_interval_secs: u64,
    pub contest_interval_secs: u64,
    pub feed_sweep_secs: u64,
    pub feed_ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        let ledger_path =
            env::var("LEDGER_PATH").unwrap_or_else(|_| "./crawlex_ledger.db".to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| "dev-secret-change-in-production-minimum-32-characters".to_string());

        let admin_password = env::var("ADMIN_PASSWORD").unwrap_or_default();

        // Volatility cycles shorter than 10s would hammer the ledger.
        let volatility_interval_secs = env_u64("VOLATILITY_INTERVAL_SECS", 900).max(10);
        let contest_interval_secs = env_u64("CONTEST_INTERVAL_SECS", 300).max(10);
        let feed_sweep_secs = env_u64("FEED_SWEEP_SECS", 30).max(5);
        let feed_ttl_secs = env_u64("FEED_TTL_SECS", 60) as i64;

        Ok(Self {
            port,
            ledger_path,
            jwt_secret,
            admin_password,
            volatility_interval_secs,
            contest_interval_secs,
            feed_sweep_secs,
            feed_ttl_secs,
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

/// One wheel segment: the CC prize and its draw weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrizeEntry {
    pub value: i64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinWheelSettings {
    pub enabled: bool,
    #[serde(rename = "cooldownHours")]
    pub cooldown_hours: i64,
    #[serde(rename = "maxAttempts")]
    pub max_attempts: i64,
    #[serde(rename = "maxAccumulation")]
    pub max_accumulation: i64,
    #[serde(rename = "purchaseLimit")]
    pub purchase_limit: i64,
    pub prizes: Vec<PrizeEntry>,
}

impl Default for SpinWheelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_hours: 24,
            max_attempts: 1,
            max_accumulation: 10,
            purchase_limit: 20,
            prizes: vec![
                PrizeEntry { value: 100, weight: 35.0 },
                PrizeEntry { value: 250, weight: 25.0 },
                PrizeEntry { value: 500, weight: 18.0 },
                PrizeEntry { value: 1_000, weight: 10.0 },
                PrizeEntry { value: 2_500, weight: 6.0 },
                PrizeEntry { value: 5_000, weight: 3.0 },
                PrizeEntry { value: 10_000, weight: 1.5 },
                PrizeEntry { value: 50_000, weight: 1.0 },
                PrizeEntry { value: 1_000_000, weight: 0.5 },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestmentSettings {
    /// Max distinct crawler positions per investor; existing positions may
    /// always be topped up.
    pub max_investments: usize,
    pub investment_lock_hours: i64,
    pub sell_tax_percent: f64,
    pub sell_fee_sp: f64,
}

impl Default for InvestmentSettings {
    fn default() -> Self {
        Self {
            max_investments: 10,
            investment_lock_hours: 24,
            sell_tax_percent: 5.0,
            sell_fee_sp: 0.0,
        }
    }
}

impl InvestmentSettings {
    pub fn lock_seconds(&self) -> i64 {
        self.investment_lock_hours * 3600
    }
}

/// Magnitude band and selection weight for one volatility event category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBand {
    pub min_percent: f64,
    pub max_percent: f64,
    pub chance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilitySettings {
    pub enabled: bool,
    /// Per-crawler trigger chance each cycle, 0..100.
    pub chance_percent: f64,
    pub up: EventBand,
    pub down: EventBand,
    pub strong_up: EventBand,
    pub crash: EventBand,
    pub jackpot_chance_percent: f64,
    pub jackpot_multiplier: f64,
    pub jackpot_min_sp: f64,
}

impl Default for VolatilitySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            chance_percent: 25.0,
            up: EventBand { min_percent: 1.0, max_percent: 5.0, chance: 45.0 },
            down: EventBand { min_percent: 1.0, max_percent: 3.0, chance: 40.0 },
            strong_up: EventBand { min_percent: 10.0, max_percent: 25.0, chance: 7.5 },
            crash: EventBand { min_percent: 8.0, max_percent: 20.0, chance: 7.5 },
            jackpot_chance_percent: 0.5,
            jackpot_multiplier: 10.0,
            jackpot_min_sp: 1_000_000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContestSettings {
    pub is_enabled: bool,
    pub winner_points_reward: i64,
    pub voter_sp_reward: f64,
    pub multiplier_boost: f64,
    pub duration_secs: i64,
}

impl Default for ContestSettings {
    fn default() -> Self {
        Self {
            is_enabled: false,
            winner_points_reward: 1_000,
            voter_sp_reward: 50.0,
            multiplier_boost: 0.2,
            duration_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpsSettings {
    pub is_enabled: bool,
    pub max_bet: f64,
    pub cooldown_seconds: i64,
    /// Mutable lock written by the engine after a match ends; creates and
    /// joins are blocked until this timestamp passes.
    pub lock_until: i64,
}

impl Default for RpsSettings {
    fn default() -> Self {
        Self {
            is_enabled: false,
            max_bet: 500.0,
            cooldown_seconds: 60,
            lock_until: 0,
        }
    }
}

/// Shared shape of the coin-flip and prediction game settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GamblingSettings {
    pub is_enabled: bool,
    pub max_bet: f64,
    pub win_chance_percent: f64,
}

impl Default for GamblingSettings {
    fn default() -> Self {
        Self {
            is_enabled: false,
            max_bet: 1_000.0,
            win_chance_percent: 49.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    pub banned_words: Vec<String>,
}

/// CC -> SP conversion pack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpPackProduct {
    pub cc_price: i64,
    pub sp_amount: f64,
}

/// Purchased spin attempts pack.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpinAttemptProduct {
    pub sp_price: f64,
    pub attempts_amount: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointsProductKind {
    Raise,
    Drop,
}

/// Shop item that raises or drops a crawler's points, limited per day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsProduct {
    #[serde(rename = "type")]
    pub kind: PointsProductKind,
    pub points_amount: i64,
    pub sp_price: f64,
    pub daily_limit: i64,
}

pub const SPIN_WHEEL_SECTION: &str = "spin_wheel_settings";
pub const INVESTMENT_SECTION: &str = "investment_settings";
pub const VOLATILITY_SECTION: &str = "market_volatility";
pub const CONTEST_SECTION: &str = "contest_settings";
pub const RPS_SECTION: &str = "rps_game";
pub const GAMBLING_SECTION: &str = "gambling_game";
pub const PREDICTION_SECTION: &str = "stock_prediction_game";
pub const MODERATION_SECTION: &str = "moderation";

/// Reads `site_settings/*` sections, falling back to defaults.
#[derive(Clone)]
pub struct SettingsStore {
    ledger: Arc<dyn LedgerStore>,
}

impl SettingsStore {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    fn section<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T, EngineError> {
        match self.ledger.get(&paths::settings(name))? {
            None => Ok(T::default()),
            Some(value) => Ok(serde_json::from_value(value).unwrap_or_else(|err| {
                warn!(section = name, %err, "stored settings are malformed, using defaults");
                T::default()
            })),
        }
    }

    pub fn spin_wheel(&self) -> Result<SpinWheelSettings, EngineError> {
        self.section(SPIN_WHEEL_SECTION)
    }

    pub fn investment(&self) -> Result<InvestmentSettings, EngineError> {
        self.section(INVESTMENT_SECTION)
    }

    pub fn volatility(&self) -> Result<VolatilitySettings, EngineError> {
        self.section(VOLATILITY_SECTION)
    }

    pub fn contest(&self) -> Result<ContestSettings, EngineError> {
        self.section(CONTEST_SECTION)
    }

    pub fn rps(&self) -> Result<RpsSettings, EngineError> {
        self.section(RPS_SECTION)
    }

    pub fn gambling(&self) -> Result<GamblingSettings, EngineError> {
        self.section(GAMBLING_SECTION)
    }

    pub fn prediction(&self) -> Result<GamblingSettings, EngineError> {
        self.section(PREDICTION_SECTION)
    }

    pub fn moderation(&self) -> Result<ModerationSettings, EngineError> {
        self.section(MODERATION_SECTION)
    }

    pub fn sp_pack(&self, product_id: &str) -> Result<Option<SpPackProduct>, EngineError> {
        self.product("shop_products", product_id)
    }

    pub fn spin_attempt_product(
        &self,
        product_id: &str,
    ) -> Result<Option<SpinAttemptProduct>, EngineError> {
        self.product("shop_products_spins", product_id)
    }

    pub fn points_product(&self, product_id: &str) -> Result<Option<PointsProduct>, EngineError> {
        self.product("shop_products_points", product_id)
    }

    fn product<T: DeserializeOwned>(
        &self,
        catalog: &str,
        product_id: &str,
    ) -> Result<Option<T>, EngineError> {
        let path = format!("{}/{catalog}/{product_id}", paths::SITE_SETTINGS);
        match self.ledger.get(&path)? {
            None => Ok(None),
            Some(value) => Ok(serde_json::from_value(value).ok()),
        }
    }
}
