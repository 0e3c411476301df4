//! HTTP surface.
//!
//! Handlers are thin: resolve identity, call the engine, return JSON. All
//! engine failures funnel through [`ApiError`] into a
//! `{success: false, message}` body with a mapped status code.

pub mod admin;
pub mod economy;
pub mod games;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;

use crate::auth::{self, AuthState};
use crate::config::SettingsStore;
use crate::economy::{
    admin::AdminOps, contest::ContestEngine, crawlers::CrawlerDirectory, gamble::GambleEngine,
    investment::InvestmentEngine, rps::RpsEngine, shop::ShopEngine, spin::SpinEngine,
    volatility::VolatilityEngine,
};
use crate::errors::EngineError;
use crate::feed::ActivityLog;
use crate::store::LedgerStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub settings: SettingsStore,
    pub feed: ActivityLog,
    pub investments: InvestmentEngine,
    pub volatility: VolatilityEngine,
    pub contest: ContestEngine,
    pub rps: RpsEngine,
    pub spin: SpinEngine,
    pub gamble: GambleEngine,
    pub shop: ShopEngine,
    pub crawlers: CrawlerDirectory,
    pub admin: AdminOps,
}

impl AppState {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        let settings = SettingsStore::new(ledger.clone());
        let feed = ActivityLog::new(ledger.clone());
        Self {
            investments: InvestmentEngine::new(ledger.clone(), settings.clone(), feed.clone()),
            volatility: VolatilityEngine::new(ledger.clone(), settings.clone(), feed.clone()),
            contest: ContestEngine::new(ledger.clone(), settings.clone(), feed.clone()),
            rps: RpsEngine::new(ledger.clone(), settings.clone(), feed.clone()),
            spin: SpinEngine::new(ledger.clone(), settings.clone(), feed.clone()),
            gamble: GambleEngine::new(ledger.clone(), settings.clone(), feed.clone()),
            shop: ShopEngine::new(ledger.clone(), settings.clone(), feed.clone()),
            crawlers: CrawlerDirectory::new(ledger.clone(), settings.clone(), feed.clone()),
            admin: AdminOps::new(ledger.clone(), settings.clone(), feed.clone()),
            ledger,
            settings,
            feed,
        }
    }
}

/// Build the full router: public reads, an authenticated economy surface,
/// and the admin surface (role-checked per handler).
pub fn create_router(state: AppState, auth_state: AuthState) -> Router {
    let public = Router::new()
        .route("/health", get(health_check))
        .route("/api/crawlers", get(economy::list_crawlers))
        .route("/api/crawlers/:name", get(economy::get_crawler))
        .route("/api/crawlers/:name/history", get(economy::crawler_history))
        .route("/api/feed", get(economy::live_feed))
        .route("/api/contest", get(games::current_contest))
        .route("/api/rps/open", get(games::open_challenges));

    let protected = Router::new()
        .route("/api/wallet", get(economy::my_wallet))
        .route("/api/messages", get(economy::my_messages))
        .route("/api/invest/buy", post(economy::invest_buy))
        .route("/api/invest/sell", post(economy::invest_sell))
        .route("/api/invest/portfolio", get(economy::portfolio))
        .route("/api/crawlers/:name/like", post(economy::like_crawler))
        .route("/api/crawlers/:name/unlike", post(economy::unlike_crawler))
        .route("/api/crawlers/:name/donate", post(economy::donate_points))
        .route("/api/crawlers/nominate", post(economy::nominate))
        .route("/api/crawlers/:name/report", post(economy::report))
        .route("/api/shop/sp-pack", post(economy::buy_sp_pack))
        .route("/api/shop/spin-attempts", post(economy::buy_spin_attempts))
        .route("/api/shop/points-product", post(economy::buy_points_product))
        .route("/api/contest/vote", post(games::vote))
        .route("/api/rps/create", post(games::rps_create))
        .route("/api/rps/:id/join", post(games::rps_join))
        .route("/api/rps/:id/play", post(games::rps_play))
        .route("/api/rps/:id/surrender", post(games::rps_surrender))
        .route("/api/rps/:id/cancel", post(games::rps_cancel))
        .route("/api/spin/state", get(games::spin_state))
        .route("/api/spin", post(games::spin))
        .route("/api/gamble/flip", post(games::coin_flip))
        .route("/api/gamble/prediction/start", post(games::prediction_start))
        .route("/api/gamble/prediction/play", post(games::prediction_play))
        .route("/api/gamble/prediction/cashout", post(games::prediction_cashout))
        .route("/api/admin/crawlers", post(admin::upsert_crawler))
        .route("/api/admin/crawlers/:name/delete", post(admin::remove_crawler))
        .route("/api/admin/wallet", post(admin::set_wallet))
        .route("/api/admin/spin/purchased", post(admin::set_purchased_attempts))
        .route("/api/admin/spin/reset-free", post(admin::reset_free_spins))
        .route("/api/admin/ban", post(admin::ban_user))
        .route("/api/admin/unban", post(admin::unban_user))
        .route("/api/admin/candidates", get(admin::list_candidates))
        .route("/api/admin/candidates/:name/delete", post(admin::remove_candidate))
        .route("/api/admin/settings/:section", post(admin::save_settings))
        .route("/api/admin/message", post(admin::send_message))
        .route("/api/admin/invest/force-sell", post(admin::force_sell))
        .route("/api/admin/invest/multiplier", post(admin::set_multiplier))
        .layer(middleware::from_fn_with_state(
            auth_state.clone(),
            auth::auth_middleware,
        ));

    let auth_routes = Router::new()
        .route("/api/auth/login", post(auth::login))
        .with_state(auth_state);

    Router::new()
        .merge(public.with_state(state.clone()))
        .merge(protected.with_state(state))
        .merge(auth_routes)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ===== Error Handling =====

#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::Validation(_) | EngineError::InsufficientFunds { .. } => {
                StatusCode::BAD_REQUEST
            }
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::Disabled(_) => StatusCode::FORBIDDEN,
            EngineError::Store(err) => {
                tracing::error!("ledger error: {err}");
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        let message = match &self.0 {
            EngineError::Store(_) => "the ledger is temporarily unavailable".to_string(),
            other => other.to_string(),
        };
        let body = Json(json!({"success": false, "message": message}));
        (status, body).into_response()
    }
}

/// Admin gate used inside admin handlers.
pub fn require_admin(identity: &crate::auth::Identity) -> Result<(), ApiError> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(ApiError(EngineError::Disabled("admin access")))
    }
}
