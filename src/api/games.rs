//! Contest, RPS, spin-wheel and gamble handlers.

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::auth::Identity;
use crate::models::{AttemptPool, PriceGuess, RpsMove};

use super::{ApiError, AppState};

pub async fn current_contest(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let contest = state.contest.current()?;
    Ok(Json(json!({"success": true, "contest": contest})))
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub contestant: String,
}

pub async fn vote(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .contest
        .vote(&identity.uid, &payload.contestant, Utc::now().timestamp())?;
    Ok(Json(json!({"success": true})))
}

pub async fn open_challenges(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let open: Vec<serde_json::Value> = state
        .rps
        .open_challenges()?
        .into_iter()
        .map(|(id, c)| json!({"id": id, "challenge": c}))
        .collect();
    Ok(Json(json!({"success": true, "challenges": open})))
}

#[derive(Deserialize)]
pub struct CreateChallengeRequest {
    pub bet: f64,
}

pub async fn rps_create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CreateChallengeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = state.rps.create(
        &identity.uid,
        &identity.name,
        payload.bet,
        Utc::now().timestamp(),
    )?;
    Ok(Json(json!({"success": true, "challenge_id": id})))
}

pub async fn rps_join(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .rps
        .join(&identity.uid, &identity.name, &id, Utc::now().timestamp())?;
    Ok(Json(json!({"success": true})))
}

#[derive(Deserialize)]
pub struct PlayRequest {
    #[serde(rename = "move")]
    pub mv: RpsMove,
}

pub async fn rps_play(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(payload): Json<PlayRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .rps
        .play(&identity.uid, &id, payload.mv, Utc::now().timestamp())?;
    Ok(Json(json!({"success": true, "outcome": outcome})))
}

pub async fn rps_surrender(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.rps.surrender(&identity.uid, &id, Utc::now().timestamp())?;
    Ok(Json(json!({"success": true})))
}

pub async fn rps_cancel(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.rps.cancel(&identity.uid, &id)?;
    Ok(Json(json!({"success": true})))
}

pub async fn spin_state(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let spin = state
        .spin
        .check_and_update_state(&identity.uid, Utc::now().timestamp())?;
    Ok(Json(json!({"success": true, "state": spin})))
}

#[derive(Deserialize)]
pub struct SpinRequest {
    pub pool: String,
}

pub async fn spin(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<SpinRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pool = match payload.pool.as_str() {
        "free" => AttemptPool::Free,
        "purchased" => AttemptPool::Purchased,
        other => {
            return Err(crate::errors::EngineError::validation(format!(
                "unknown attempt pool '{other}'"
            ))
            .into())
        }
    };
    let outcome = state.spin.spin(
        &mut rand::thread_rng(),
        &identity.uid,
        pool,
        Utc::now().timestamp(),
    )?;
    Ok(Json(json!({"success": true, "outcome": outcome})))
}

#[derive(Deserialize)]
pub struct BetRequest {
    pub bet: f64,
}

pub async fn coin_flip(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<BetRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .gamble
        .coin_flip(&mut rand::thread_rng(), &identity.uid, payload.bet)?;
    Ok(Json(json!({"success": true, "outcome": outcome})))
}

pub async fn prediction_start(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<BetRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state.gamble.prediction_start(
        &mut rand::thread_rng(),
        &identity.uid,
        payload.bet,
        Utc::now().timestamp(),
    )?;
    Ok(Json(json!({"success": true, "session": session})))
}

#[derive(Deserialize)]
pub struct GuessRequest {
    pub guess: PriceGuess,
}

pub async fn prediction_play(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<GuessRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.gamble.prediction_play(
        &mut rand::thread_rng(),
        &identity.uid,
        payload.guess,
        Utc::now().timestamp(),
    )?;
    Ok(Json(json!({"success": true, "outcome": outcome})))
}

pub async fn prediction_cashout(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let winnings = state
        .gamble
        .prediction_cashout(&identity.uid, Utc::now().timestamp())?;
    Ok(Json(json!({"success": true, "winnings": winnings})))
}
