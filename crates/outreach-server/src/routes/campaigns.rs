use axum::extract::{Path, Query, State};
use axum::Json;
use outreach_core::orchestrator::control;
use outreach_core::types::LeadState;
use outreach_core::OutreachError;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/campaigns: every campaign with its status block.
pub async fn list_campaigns(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let now = app.orchestrator.now();
    let result = tokio::task::spawn_blocking(move || {
        let mut list = Vec::new();
        for campaign in db.list_campaigns()? {
            list.push(control::campaign_status(&db, &campaign.id, now)?);
        }
        Ok::<_, OutreachError>(serde_json::to_value(list)?)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

/// GET /api/campaigns/:id
pub async fn get_campaign(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let now = app.orchestrator.now();
    let result = tokio::task::spawn_blocking(move || {
        let status = control::campaign_status(&db, &id, now)?;
        Ok::<_, OutreachError>(serde_json::to_value(status)?)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadFilter {
    pub state: Option<String>,
}

/// GET /api/campaigns/:id/leads?state=contacted
pub async fn list_leads(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(filter): Query<LeadFilter>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let result = tokio::task::spawn_blocking(move || {
        let state: Option<LeadState> = filter.state.as_deref().map(str::parse).transpose()?;
        db.require_campaign(&id)?;
        let leads: Vec<_> = db
            .list_leads(&id)?
            .into_iter()
            .filter(|l| state.map_or(true, |s| l.state == s))
            .collect();
        Ok::<_, OutreachError>(serde_json::to_value(leads)?)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

/// GET /api/campaigns/:id/leads/:lead_id
pub async fn get_lead(
    State(app): State<AppState>,
    Path((id, lead_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let result = tokio::task::spawn_blocking(move || {
        let lead = db
            .lead(&id, &lead_id)?
            .ok_or_else(|| OutreachError::LeadNotFound {
                campaign: id.clone(),
                lead: lead_id.clone(),
            })?;
        Ok::<_, OutreachError>(serde_json::to_value(lead)?)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

/// GET /api/campaigns/:id/attempts: the campaign's ledger.
pub async fn list_attempts(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let result = tokio::task::spawn_blocking(move || {
        db.require_campaign(&id)?;
        let attempts = db.list_attempts(Some(&id))?;
        Ok::<_, OutreachError>(serde_json::to_value(attempts)?)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

/// POST /api/campaigns/:id/pause
pub async fn pause_campaign(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let now = app.orchestrator.now();
    let result = tokio::task::spawn_blocking(move || {
        let status = control::pause(&db, &id, now)?;
        Ok::<_, OutreachError>(serde_json::to_value(status)?)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResumeParams {
    #[serde(default)]
    pub clear_kill: bool,
}

/// POST /api/campaigns/:id/resume?clear_kill=true
pub async fn resume_campaign(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ResumeParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let now = app.orchestrator.now();
    let result = tokio::task::spawn_blocking(move || {
        let status = control::resume(&db, &id, params.clear_kill, now)?;
        Ok::<_, OutreachError>(serde_json::to_value(status)?)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

/// POST /api/campaigns/:id/kill
pub async fn kill_campaign(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let db = app.db.clone();
    let now = app.orchestrator.now();
    let result = tokio::task::spawn_blocking(move || {
        let status = control::kill(&db, &id, now)?;
        Ok::<_, OutreachError>(serde_json::to_value(status)?)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

/// POST /api/campaigns/:id/tick: run one tick now.
///
/// Reports `lease_held` when the background scheduler owns the campaign.
pub async fn tick_campaign(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let summary = app.orchestrator.run_tick(&id).await?;
    Ok(Json(serde_json::to_value(summary)?))
}

/// POST /api/tick: one tick for every campaign.
pub async fn tick_all(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let summary = app.orchestrator.run_all().await?;
    Ok(Json(serde_json::to_value(summary)?))
}
