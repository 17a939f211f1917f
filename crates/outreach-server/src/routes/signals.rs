use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use outreach_core::signal::{self, LeadSignal, SignalKind};
use outreach_core::OutreachError;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignalBody {
    pub lead_id: String,
    pub kind: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// POST /api/campaigns/:id/signals: queue a lead signal.
///
/// Signals are applied by the next tick, so the response is 202 with the
/// queued signal and its sequence number.
pub async fn post_signal(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SignalBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let kind: SignalKind = body.kind.parse()?;
    let mut sig = LeadSignal::new(&id, &body.lead_id, kind, app.orchestrator.now());
    sig.idempotency_key = body.idempotency_key;
    sig.attributes = body.attributes;
    sig.note = body.note;

    let db = app.db.clone();
    let result = tokio::task::spawn_blocking(move || {
        let seq = signal::enqueue(&db, &sig)?;
        Ok::<_, OutreachError>(serde_json::json!({ "seq": seq, "signal": sig }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok((StatusCode::ACCEPTED, Json(result)))
}
