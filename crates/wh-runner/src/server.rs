//! Webhook listener.
//!
//! One route: `POST` takes alert text (one alert per line) and answers with
//! one outcome line per alert; `GET` serves the account status snapshot.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use tracing::info;
use wh_engine::AccountStore;
use wh_engine::account::AccountStatus;

/// Shared state for the handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<AccountStore>,
}

impl AppState {
    pub fn new(store: Arc<AccountStore>) -> Self {
        Self { store }
    }
}

pub fn create_router(path: &str, state: AppState) -> Router {
    Router::new()
        .route(path, get(get_status).post(post_alerts))
        .with_state(state)
}

async fn post_alerts(State(state): State<AppState>, body: String) -> String {
    info!("alert received:\n{}", body.trim_end());
    let outcomes = state.store.dispatch(&body).await;
    outcomes.iter().map(|o| format!("{}: {}\n", o.line, o.outcome)).collect()
}

async fn get_status(State(state): State<AppState>) -> Json<Vec<AccountStatus>> {
    Json(state.store.status().await)
}

/// Serve until ctrl-c.
pub async fn serve(bind: &str, path: &str, state: AppState) -> anyhow::Result<()> {
    let app = create_router(path, state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("listening on {bind}{path}");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
