pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/config", get(routes::get_config))
        // Campaigns
        .route("/api/campaigns", get(routes::campaigns::list_campaigns))
        .route("/api/campaigns/{id}", get(routes::campaigns::get_campaign))
        .route(
            "/api/campaigns/{id}/leads",
            get(routes::campaigns::list_leads),
        )
        .route(
            "/api/campaigns/{id}/leads/{lead_id}",
            get(routes::campaigns::get_lead),
        )
        .route(
            "/api/campaigns/{id}/attempts",
            get(routes::campaigns::list_attempts),
        )
        .route(
            "/api/campaigns/{id}/pause",
            post(routes::campaigns::pause_campaign),
        )
        .route(
            "/api/campaigns/{id}/resume",
            post(routes::campaigns::resume_campaign),
        )
        .route(
            "/api/campaigns/{id}/kill",
            post(routes::campaigns::kill_campaign),
        )
        // Ticks
        .route(
            "/api/campaigns/{id}/tick",
            post(routes::campaigns::tick_campaign),
        )
        .route("/api/tick", post(routes::campaigns::tick_all))
        // Signals
        .route(
            "/api/campaigns/{id}/signals",
            post(routes::signals::post_signal),
        )
        // Suppressions
        .route(
            "/api/suppressions",
            get(routes::suppressions::list_suppressions)
                .post(routes::suppressions::add_suppression),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Serve the outreach API on `0.0.0.0:port`.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(app_state, listener, std::future::pending()).await
}

/// Serve on a pre-bound listener until `shutdown` resolves.
///
/// Binding first lets the caller read the actual port when `port = 0`.
pub async fn serve_on(
    app_state: AppState,
    listener: tokio::net::TcpListener,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app = build_router(app_state);

    tracing::info!("outreach API listening on http://localhost:{actual_port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
