pub mod campaigns;
pub mod signals;
pub mod suppressions;

use axum::extract::State;
use axum::Json;
use outreach_core::config::Config;
use outreach_core::OutreachError;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/config: project configuration plus validation warnings.
pub async fn get_config(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let root = app.root.clone();
    let result = tokio::task::spawn_blocking(move || {
        let config = Config::load(&root)?;
        let warnings = config.validate();
        Ok::<_, OutreachError>(serde_json::json!({ "config": config, "warnings": warnings }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}
