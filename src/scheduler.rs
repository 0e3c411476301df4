//! Background jobs.
//!
//! One tokio task per concern: the volatility cycle, the contest check and
//! the live-feed TTL sweep. Cycle bodies return `Result`; a failed cycle is
//! logged and the loop keeps ticking.

use std::time::Duration;

use chrono::Utc;
use rand::SeedableRng;
use tracing::{error, info};

use crate::api::AppState;
use crate::config::Config;

pub fn spawn_all(state: AppState, config: &Config) {
    spawn_volatility(state.clone(), config.volatility_interval_secs);
    spawn_contest(state.clone(), config.contest_interval_secs);
    spawn_feed_sweep(state, config.feed_sweep_secs, config.feed_ttl_secs);
}

fn spawn_volatility(state: AppState, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        info!(interval_secs, "volatility cycle scheduled");
        loop {
            interval.tick().await;
            let mut rng = rand::rngs::StdRng::from_entropy();
            if let Err(err) = state.volatility.run_cycle(&mut rng) {
                error!(%err, "volatility cycle failed");
            }
        }
    });
}

fn spawn_contest(state: AppState, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        info!(interval_secs, "contest check scheduled");
        loop {
            interval.tick().await;
            let mut rng = rand::rngs::StdRng::from_entropy();
            if let Err(err) = state.contest.tick(&mut rng, Utc::now().timestamp()) {
                error!(%err, "contest tick failed");
            }
        }
    });
}

fn spawn_feed_sweep(state: AppState, interval_secs: u64, ttl_secs: i64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        info!(interval_secs, ttl_secs, "live feed sweep scheduled");
        loop {
            interval.tick().await;
            match state.feed.sweep_expired(Utc::now().timestamp(), ttl_secs) {
                Ok(0) => {}
                Ok(removed) => info!(removed, "expired live feed entries swept"),
                Err(err) => error!(%err, "live feed sweep failed"),
            }
        }
    });
}
