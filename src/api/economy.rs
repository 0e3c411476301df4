//! Wallet, investment, crawler and shop handlers.

use axum::{
    extract::{Path, Query, State},
    response::Json,
    Extension,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::auth::Identity;
use crate::economy::wallet;

use super::{ApiError, AppState};

pub async fn my_wallet(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let wallet = wallet::get(state.ledger.as_ref(), &identity.uid)?;
    Ok(Json(json!({"success": true, "wallet": wallet})))
}

pub async fn my_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let messages = state
        .ledger
        .get(&crate::store::paths::user_messages(&identity.uid))
        .map_err(crate::errors::EngineError::from)?
        .unwrap_or_else(|| json!({}));
    Ok(Json(json!({"success": true, "messages": messages})))
}

pub async fn list_crawlers(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let crawlers = state.crawlers.list()?;
    Ok(Json(json!({"success": true, "crawlers": crawlers})))
}

pub async fn get_crawler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let crawler = state.crawlers.get(&name)?;
    Ok(Json(json!({"success": true, "crawler": crawler})))
}

pub async fn crawler_history(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let series = state.crawlers.history(&name, Utc::now().timestamp())?;
    Ok(Json(json!({"success": true, "history": series})))
}

#[derive(Deserialize)]
pub struct FeedQuery {
    limit: Option<usize>,
}

pub async fn live_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = query.limit.unwrap_or(50).min(200);
    let entries = state
        .feed
        .live_entries(limit)
        .map_err(crate::errors::EngineError::from)?;
    Ok(Json(json!({"success": true, "feed": entries})))
}

#[derive(Deserialize)]
pub struct BuyRequest {
    pub crawler: String,
    pub amount: f64,
}

pub async fn invest_buy(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<BuyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lot_id = state.investments.buy(
        &identity.uid,
        &payload.crawler,
        payload.amount,
        Utc::now().timestamp(),
    )?;
    Ok(Json(json!({"success": true, "lot_id": lot_id})))
}

#[derive(Deserialize)]
pub struct SellRequest {
    pub crawler: String,
    pub lot_id: String,
}

pub async fn invest_sell(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<SellRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let receipt = state.investments.sell(
        &identity.uid,
        &payload.crawler,
        &payload.lot_id,
        Utc::now().timestamp(),
    )?;
    Ok(Json(json!({"success": true, "receipt": receipt})))
}

pub async fn portfolio(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let positions = state
        .investments
        .portfolio(&identity.uid, Utc::now().timestamp())?;
    Ok(Json(json!({"success": true, "positions": positions})))
}

pub async fn like_crawler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let likes = state.crawlers.like(&identity.uid, &name)?;
    Ok(Json(json!({"success": true, "likes": likes})))
}

pub async fn unlike_crawler(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let likes = state.crawlers.unlike(&identity.uid, &name)?;
    Ok(Json(json!({"success": true, "likes": likes})))
}

#[derive(Deserialize)]
pub struct DonateRequest {
    pub amount: i64,
}

pub async fn donate_points(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
    Json(payload): Json<DonateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let points =
        state
            .crawlers
            .donate_points(&identity.uid, &name, payload.amount, Utc::now().timestamp())?;
    Ok(Json(json!({"success": true, "points": points})))
}

#[derive(Deserialize)]
pub struct NominateRequest {
    pub name: String,
    #[serde(default)]
    pub reason: String,
}

pub async fn nominate(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<NominateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.crawlers.nominate(
        &identity.uid,
        &payload.name,
        &payload.reason,
        Utc::now().timestamp(),
    )?;
    Ok(Json(json!({"success": true})))
}

#[derive(Deserialize)]
pub struct ReportRequest {
    pub reason: String,
}

pub async fn report(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(name): Path<String>,
    Json(payload): Json<ReportRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .crawlers
        .report(&identity.uid, &name, &payload.reason, Utc::now().timestamp())?;
    Ok(Json(json!({"success": true})))
}

#[derive(Deserialize)]
pub struct ProductRequest {
    pub product_id: String,
}

pub async fn buy_sp_pack(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let new_sp = state.shop.buy_sp_pack(&identity.uid, &payload.product_id)?;
    Ok(Json(json!({"success": true, "sp": new_sp})))
}

pub async fn buy_spin_attempts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<ProductRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let attempts = state
        .shop
        .buy_spin_attempts(&identity.uid, &payload.product_id)?;
    Ok(Json(json!({"success": true, "purchased_attempts": attempts})))
}

#[derive(Deserialize)]
pub struct PointsProductRequest {
    pub product_id: String,
    pub crawler: String,
}

pub async fn buy_points_product(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<PointsProductRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let points = state.shop.buy_points_product(
        &identity.uid,
        &payload.product_id,
        &payload.crawler,
        Utc::now().timestamp(),
    )?;
    Ok(Json(json!({"success": true, "points": points})))
}
