use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use outreach_core::orchestrator::control;
use outreach_core::suppression::{SuppressionEntry, SuppressionKind};
use outreach_core::OutreachError;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/suppressions
pub async fn list_suppressions(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let result = tokio::task::spawn_blocking(move || {
        Ok::<_, OutreachError>(serde_json::to_value(db.list_suppressions()?)?)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct SuppressionBody {
    pub kind: String,
    pub value: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/suppressions: 201 when added, 200 when already present.
pub async fn add_suppression(
    State(app): State<AppState>,
    Json(body): Json<SuppressionBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let kind: SuppressionKind = body.kind.parse()?;
    let entry = SuppressionEntry::new(
        kind,
        &body.value,
        body.reason,
        Some("api".to_string()),
        app.orchestrator.now(),
    )?;

    let db = app.db.clone();
    let (added, entry) = tokio::task::spawn_blocking(move || {
        let added = control::add_suppression(&db, &entry)?;
        Ok::<_, OutreachError>((added, entry))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    let status = if added { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(serde_json::json!({ "added": added, "entry": entry })),
    ))
}
