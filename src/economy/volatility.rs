//! Market volatility engine.
//!
//! Each cycle rolls a trigger per crawler; triggered crawlers draw one of
//! four weighted event categories and shift their stock multiplier by the
//! drawn percentage as an additive delta, floored at 0.20. A rare
//! independent jackpot roll blesses one qualifying investor's largest
//! position. All multiplier writes for the cycle land in a single atomic
//! batch; activity-log pushes follow best-effort after the batch commits.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use serde_json::{json, Value};
use tracing::info;

use crate::config::{SettingsStore, VolatilitySettings};
use crate::errors::EngineError;
use crate::feed::ActivityLog;
use crate::models::{InvestmentLot, Wallet};
use crate::store::{paths, BatchUpdate, LedgerStore};

use super::investment::MULTIPLIER_FLOOR;
use super::sampler::weighted_pick;

#[derive(Debug, Default)]
pub struct CycleSummary {
    pub crawlers_moved: usize,
    pub jackpot_winner: Option<String>,
}

#[derive(Clone)]
pub struct VolatilityEngine {
    ledger: Arc<dyn LedgerStore>,
    settings: SettingsStore,
    feed: ActivityLog,
}

struct EventDraw {
    label: &'static str,
    signed_percent: f64,
}

fn draw_event<R: Rng + ?Sized>(rng: &mut R, s: &VolatilitySettings) -> Option<EventDraw> {
    let bands = [
        ("up", &s.up, 1.0),
        ("down", &s.down, -1.0),
        ("strong_up", &s.strong_up, 1.0),
        ("crash", &s.crash, -1.0),
    ];
    let weights: Vec<f64> = bands.iter().map(|(_, b, _)| b.chance).collect();
    let (label, band, sign) = bands[weighted_pick(rng, &weights)?];
    let lo = band.min_percent.min(band.max_percent);
    let hi = band.min_percent.max(band.max_percent);
    let magnitude = if hi > lo { rng.gen_range(lo..hi) } else { lo };
    Some(EventDraw { label, signed_percent: sign * magnitude })
}

impl VolatilityEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, settings: SettingsStore, feed: ActivityLog) -> Self {
        Self { ledger, settings, feed }
    }

    pub fn run_cycle<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<CycleSummary, EngineError> {
        let settings = self.settings.volatility()?;
        if !settings.enabled {
            return Ok(CycleSummary::default());
        }

        let crawlers = self
            .ledger
            .get(paths::USERS)?
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();

        let mut batch = BatchUpdate::new();
        let mut events: Vec<(String, String)> = Vec::new();
        let mut summary = CycleSummary::default();

        for (name, record) in &crawlers {
            if rng.gen_range(0.0..100.0) >= settings.chance_percent {
                continue;
            }
            let Some(event) = draw_event(rng, &settings) else {
                continue;
            };
            let current = record
                .get("stock_multiplier")
                .and_then(Value::as_f64)
                .unwrap_or(1.0);
            let next = (current + event.signed_percent / 100.0).max(MULTIPLIER_FLOOR);
            batch.set(paths::crawler_multiplier(name), json!(next));
            summary.crawlers_moved += 1;

            let verb = if event.signed_percent >= 0.0 { "rose" } else { "fell" };
            events.push((
                event.label.to_string(),
                format!(
                    "{name}'s stock {verb} {:.1}% ({current:.2} -> {next:.2})",
                    event.signed_percent.abs()
                ),
            ));
        }

        if rng.gen_range(0.0..100.0) < settings.jackpot_chance_percent {
            if let Some((winner, crawler)) = self.pick_jackpot_target(rng, &settings)? {
                batch.set(
                    paths::personal_multiplier(&winner, &crawler),
                    json!(settings.jackpot_multiplier),
                );
                batch.set(
                    paths::manual_override(&winner, &crawler),
                    json!("golden_blessing"),
                );
                events.push((
                    "jackpot".to_string(),
                    format!("a golden blessing landed on {winner}'s stake in {crawler}!"),
                ));
                summary.jackpot_winner = Some(winner);
            }
        }

        if !batch.is_empty() {
            self.ledger.update(&batch)?;
        }
        for (kind, message) in events {
            self.feed.live(&kind, None, &message);
        }
        info!(
            moved = summary.crawlers_moved,
            jackpot = summary.jackpot_winner.as_deref().unwrap_or("-"),
            "volatility cycle complete"
        );
        Ok(summary)
    }

    /// A random wallet with SP above the threshold, paired with the crawler
    /// holding that investor's largest lot stake.
    fn pick_jackpot_target<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        settings: &VolatilitySettings,
    ) -> Result<Option<(String, String)>, EngineError> {
        let wallets = self
            .ledger
            .get(paths::WALLETS)?
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        let qualifying: Vec<&String> = wallets
            .iter()
            .filter(|(_, w)| {
                serde_json::from_value::<Wallet>((*w).clone())
                    .map(|w| w.sp >= settings.jackpot_min_sp)
                    .unwrap_or(false)
            })
            .map(|(uid, _)| uid)
            .collect();
        if qualifying.is_empty() {
            return Ok(None);
        }
        let uid = qualifying[rng.gen_range(0..qualifying.len())].clone();

        let positions = self
            .ledger
            .get(&paths::investor_positions(&uid))?
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        let mut best: Option<(String, f64)> = None;
        for (crawler, raw) in &positions {
            let lots: BTreeMap<String, InvestmentLot> = raw
                .get("lots")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            for lot in lots.values() {
                if best.as_ref().map_or(true, |(_, stake)| lot.sp > *stake) {
                    best = Some((crawler.clone(), lot.sp));
                }
            }
        }
        Ok(best.map(|(crawler, _)| (uid, crawler)))
    }
}
