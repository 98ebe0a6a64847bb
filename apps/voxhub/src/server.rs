// SPDX-FileCopyrightText: © 2025 VoxHub Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Application assembly and the HTTP server lifecycle.

use axum::extract::{DefaultBodyLimit, MatchedPath};
use axum::Router;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::info;

use crate::config::Config;
use crate::routes;
use crate::state::AppState;

/// Creates the Axum application with all routes and middleware.
pub fn create_app(config: Config) -> (Router, AppState) {
    let state = AppState::from_config(config);
    let max_body = state.config.server.max_body_mb * 1024 * 1024;

    let router = routes::root_router(&state)
        .layer(DefaultBodyLimit::max(max_body))
        .with_state(state.clone())
        .layer(ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let route = request
                        .extensions()
                        .get::<MatchedPath>()
                        .map_or_else(|| request.uri().path(), |matched| matched.as_str());
                    tracing::info_span!("http_request", http_method = %request.method(), http_route = %route)
                })
                // Keep per-request logs out of INFO hot paths; surface failures at WARN.
                .on_response(DefaultOnResponse::new().level(tracing::Level::DEBUG))
                .on_failure(DefaultOnFailure::new().level(tracing::Level::WARN)),
        ))
        // Browser SPAs on other LAN hosts talk to this API directly.
        .layer(CorsLayer::permissive());

    (router, state)
}

/// Starts the HTTP server with graceful shutdown on Ctrl+C / SIGTERM.
///
/// # Errors
///
/// Returns an error if the address cannot be parsed or the bind fails.
///
/// # Panics
///
/// Panics if the Ctrl+C or SIGTERM handler cannot be installed (critical
/// OS failure).
pub async fn start_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let (app, state) = create_app(config.clone());
    let addr: SocketAddr = config.server.address.parse()?;

    info!(
        address = %addr,
        output_dir = %state.config.paths.output_dir.display(),
        default_engine = %state.config.engines.default,
        "Starting VoxHub API server"
    );

    #[allow(clippy::expect_used)]
    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {
                info!("Received CTRL-C signal, initiating graceful shutdown");
            },
            () = terminate => {
                info!("Received SIGTERM signal, initiating graceful shutdown");
            },
        }
    };

    let handle = axum_server::Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown_signal.await;
            handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
        }
    });

    axum_server::bind(addr).handle(handle).serve(app.into_make_service()).await.map_err(|e| {
        tracing::error!(error = %e, "API server error");
        e.into()
    })
}
