//! Admin handlers. Every handler checks the admin role first.

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::auth::Identity;
use crate::economy::investment::MultiplierAction;
use crate::errors::EngineError;

use super::{require_admin, ApiError, AppState};

#[derive(Deserialize)]
pub struct UpsertCrawlerRequest {
    pub name: String,
    pub points: i64,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

pub async fn upsert_crawler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<UpsertCrawlerRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    state.admin.upsert_crawler(
        &payload.name,
        payload.points,
        payload.avatar_url.as_deref(),
        Utc::now().timestamp(),
    )?;
    Ok(Json(json!({"success": true})))
}

pub async fn remove_crawler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    state.admin.remove_crawler(&name)?;
    Ok(Json(json!({"success": true})))
}

#[derive(Deserialize)]
pub struct SetWalletRequest {
    pub uid: String,
    pub cc: i64,
    pub sp: f64,
}

pub async fn set_wallet(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<SetWalletRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    state.admin.set_wallet(&payload.uid, payload.cc, payload.sp)?;
    Ok(Json(json!({"success": true})))
}

#[derive(Deserialize)]
pub struct SetAttemptsRequest {
    pub uid: String,
    pub attempts: i64,
}

pub async fn set_purchased_attempts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<SetAttemptsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    state
        .admin
        .set_purchased_attempts(&payload.uid, payload.attempts)?;
    Ok(Json(json!({"success": true})))
}

#[derive(Deserialize)]
pub struct ResetSpinsRequest {
    /// Omitted means every user with a spin record.
    #[serde(default)]
    pub uid: Option<String>,
}

pub async fn reset_free_spins(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ResetSpinsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    let count = state
        .admin
        .reset_free_spins(payload.uid.as_deref(), Utc::now().timestamp())?;
    Ok(Json(json!({"success": true, "reset": count})))
}

#[derive(Deserialize)]
pub struct BanRequest {
    pub uid: String,
    #[serde(default)]
    pub reason: String,
}

pub async fn ban_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<BanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    state
        .admin
        .ban(&payload.uid, &payload.reason, Utc::now().timestamp())?;
    Ok(Json(json!({"success": true})))
}

#[derive(Deserialize)]
pub struct UnbanRequest {
    pub uid: String,
}

pub async fn unban_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<UnbanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    state.admin.unban(&payload.uid)?;
    Ok(Json(json!({"success": true})))
}

pub async fn list_candidates(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    let candidates = state.admin.candidates()?;
    Ok(Json(json!({"success": true, "candidates": candidates})))
}

pub async fn remove_candidate(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    state.admin.remove_candidate(&name)?;
    Ok(Json(json!({"success": true})))
}

pub async fn save_settings(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(section): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    state.admin.save_settings(&section, &payload)?;
    Ok(Json(json!({"success": true})))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub uid: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    state
        .admin
        .send_message(&payload.uid, &payload.title, &payload.body)?;
    Ok(Json(json!({"success": true})))
}

#[derive(Deserialize)]
pub struct ForceSellRequest {
    pub investor: String,
    pub crawler: String,
}

pub async fn force_sell(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ForceSellRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    let total = state.investments.force_sell_all_lots(
        &payload.investor,
        &payload.crawler,
        Utc::now().timestamp(),
    )?;
    Ok(Json(json!({"success": true, "credited": total})))
}

#[derive(Deserialize)]
pub struct MultiplierRequest {
    pub investor: String,
    pub crawler: String,
    /// One of `reset`, `total_loss`, `invert_profit`, `reset_profit`.
    pub action: String,
}

pub async fn set_multiplier(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<MultiplierRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&identity)?;
    let action = MultiplierAction::parse(&payload.action).ok_or_else(|| {
        ApiError(EngineError::validation(format!(
            "unknown multiplier action '{}'",
            payload.action
        )))
    })?;
    let multiplier =
        state
            .investments
            .set_special_multiplier(&payload.investor, &payload.crawler, action)?;
    Ok(Json(json!({"success": true, "multiplier": multiplier})))
}
