//! Crawlex - crawler economy backend
//!
//! Wires the sqlite ledger, the economy engines, the HTTP surface and the
//! background scheduler together and serves the API.

use std::sync::Arc;

use anyhow::{Context, Result};
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crawlex_backend::{
    api::{create_router, AppState},
    auth::{AuthState, JwtHandler},
    config::Config,
    scheduler,
    store::SqliteLedger,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    info!(port = config.port, ledger = %config.ledger_path, "starting crawlex backend");

    let ledger = Arc::new(
        SqliteLedger::new(&config.ledger_path)
            .with_context(|| format!("failed to open ledger at {}", config.ledger_path))?,
    );
    let state = AppState::new(ledger);

    let auth_state = AuthState {
        jwt: Arc::new(JwtHandler::new(config.jwt_secret.clone())),
        admin_ops: state.admin.clone(),
        admin_password: config.admin_password.clone(),
    };

    scheduler::spawn_all(state.clone(), &config);

    let app = create_router(state, auth_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("API server listening on {addr}");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crawlex_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
