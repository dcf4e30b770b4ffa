// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Rewatt.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

mod ws;

use std::path::PathBuf;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::get,
};
use rewatt_core::{CommandSender, EventHub, QuerySender};
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;

/// Application state for web handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub hub: EventHub,
    pub commands: CommandSender,
    pub queries: QuerySender,
}

/// Start the web server: the `/ws` streaming transport, the snapshot API,
/// a health probe and the static dashboard.
///
/// # Errors
/// Returns an error if the server fails to bind or serve.
pub async fn start_web_server(
    addr: &str,
    frontend_dir: PathBuf,
    hub: EventHub,
    commands: CommandSender,
    queries: QuerySender,
) -> Result<(), Box<dyn std::error::Error>> {
    let app_state = AppState {
        hub,
        commands,
        queries,
    };

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/summary", get(summary_handler))
        .route("/health", get(health_handler))
        .fallback_service(ServeDir::new(frontend_dir))
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    info!("🌐 Starting web server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Full engine snapshot as JSON (state, summary, ledgers, batteries).
async fn summary_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    match app_state.queries.query_summary().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            tracing::error!("Summary query failed: {e}");
            (axum::http::StatusCode::SERVICE_UNAVAILABLE, "ENGINE DOWN").into_response()
        }
    }
}

/// Health check endpoint: the engine answering its query channel is the
/// liveness signal.
async fn health_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    match app_state.queries.query_summary().await {
        Ok(_) => (axum::http::StatusCode::OK, "OK"),
        Err(_) => (axum::http::StatusCode::SERVICE_UNAVAILABLE, "DEGRADED"),
    }
}
