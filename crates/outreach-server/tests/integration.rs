use std::sync::Arc;

use axum::http::StatusCode;
use http_body_util::BodyExt;
use outreach_core::campaign::{CampaignDefinition, NoReplyDisposition, SequenceStep};
use outreach_core::config::Config;
use outreach_core::lead::LeadInput;
use outreach_core::orchestrator::{control, OutreachDb};
use outreach_core::paths;
use outreach_core::types::Channel;
use outreach_server::{build_router, AppState};
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Project {
    dir: TempDir,
    state: AppState,
}

/// A project with one campaign ("spring"), one email template and outbox
/// delivery.
fn project() -> Project {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    std::fs::create_dir_all(paths::templates_dir(&root)).unwrap();
    std::fs::write(
        paths::template_path(&root, "intro"),
        "subject: Hello {{ first_name | there }}\nbody: Hi {{ first_name | there }}.\n",
    )
    .unwrap();

    let config = Config::default();
    config.save(&root).unwrap();
    let db = Arc::new(OutreachDb::open(&paths::db_path(&root)).unwrap());
    control::create_campaign(
        &db,
        CampaignDefinition {
            id: "spring".into(),
            name: Some("Spring".into()),
            daily_cap: 100,
            batch_cap: 25,
            enabled_channels: vec![],
            steps: vec![SequenceStep {
                channel: Channel::Email,
                template_ref: "intro".into(),
                delay_secs: 0,
            }],
            reply_window_secs: 3600,
            no_reply_disposition: NoReplyDisposition::Lose,
            variables: Default::default(),
        },
        chrono::Utc::now(),
    )
    .unwrap();

    let orchestrator = outreach_channels::orchestrator_for(&root, db, &config).unwrap();
    let state = AppState::new(root, Arc::new(orchestrator));
    Project { dir, state }
}

/// Import one lead and return its id.
fn import_lead(p: &Project, email: &str) -> String {
    let summary = control::import_leads(
        &p.state.db,
        "spring",
        vec![LeadInput {
            email: Some(email.into()),
            first_name: Some("Ada".into()),
            ..Default::default()
        }],
        chrono::Utc::now(),
    )
    .unwrap();
    assert_eq!(summary.imported, 1);
    p.state.db.list_leads("spring").unwrap()[0].id.clone()
}

/// Send a GET request via `oneshot` and return (status, parsed JSON body).
async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// Send a POST request with a JSON body via `oneshot` and return (status, parsed JSON body).
async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn post(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    post_json(app, uri, serde_json::json!({})).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_is_ok() {
    let p = project();
    let (status, body) = get(build_router(p.state.clone()), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn list_and_show_campaigns() {
    let p = project();
    let (status, body) = get(build_router(p.state.clone()), "/api/campaigns").await;
    assert_eq!(status, StatusCode::OK);
    let list = body.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["campaign"]["id"], "spring");

    let (status, body) = get(build_router(p.state.clone()), "/api/campaigns/spring").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["campaign"]["name"], "Spring");
    assert_eq!(body["lead_counts"]["new"], 0);
    assert_eq!(body["sent_today"], 0);
}

#[tokio::test]
async fn unknown_campaign_is_404() {
    let p = project();
    let (status, body) = get(build_router(p.state.clone()), "/api/campaigns/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));

    let (status, _) = post(build_router(p.state.clone()), "/api/campaigns/nope/tick").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn signals_then_tick_sends_to_outbox() {
    let p = project();
    let lead_id = import_lead(&p, "ada@example.com");

    for kind in ["enriched", "qualified"] {
        let (status, body) = post_json(
            build_router(p.state.clone()),
            "/api/campaigns/spring/signals",
            serde_json::json!({ "lead_id": lead_id, "kind": kind }),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED, "{body}");
        assert_eq!(body["signal"]["kind"], kind);
    }

    let (status, body) = post(build_router(p.state.clone()), "/api/campaigns/spring/tick").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["outcome"]["status"], "completed");
    assert_eq!(body["signals_applied"], 2);
    assert_eq!(body["sent"], 1);

    let (_, lead) = get(
        build_router(p.state.clone()),
        &format!("/api/campaigns/spring/leads/{lead_id}"),
    )
    .await;
    assert_eq!(lead["state"], "contacted");

    let (_, attempts) = get(build_router(p.state.clone()), "/api/campaigns/spring/attempts").await;
    let attempts = attempts.as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["status"], "sent");

    let outbox = p.dir.path().join(".outreach/outbox/email.jsonl");
    let data = std::fs::read_to_string(outbox).unwrap();
    assert_eq!(data.lines().count(), 1);
    assert!(data.contains("ada@example.com"));
}

#[tokio::test]
async fn leads_can_be_filtered_by_state() {
    let p = project();
    import_lead(&p, "ada@example.com");

    let (status, body) = get(
        build_router(p.state.clone()),
        "/api/campaigns/spring/leads?state=new",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = get(
        build_router(p.state.clone()),
        "/api/campaigns/spring/leads?state=contacted",
    )
    .await;
    assert!(body.as_array().unwrap().is_empty());

    let (status, _) = get(
        build_router(p.state.clone()),
        "/api/campaigns/spring/leads?state=bogus",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_signal_kind_is_400() {
    let p = project();
    let lead_id = import_lead(&p, "ada@example.com");
    let (status, _) = post_json(
        build_router(p.state.clone()),
        "/api/campaigns/spring/signals",
        serde_json::json!({ "lead_id": lead_id, "kind": "teleported" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signal_for_unknown_lead_is_404() {
    let p = project();
    let (status, _) = post_json(
        build_router(p.state.clone()),
        "/api/campaigns/spring/signals",
        serde_json::json!({ "lead_id": "missing", "kind": "qualified" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn kill_requires_clear_kill_to_resume() {
    let p = project();

    let (status, body) = post(build_router(p.state.clone()), "/api/campaigns/spring/kill").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["campaign"]["killed"], true);

    let (status, _) = post(build_router(p.state.clone()), "/api/campaigns/spring/resume").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = post(
        build_router(p.state.clone()),
        "/api/campaigns/spring/resume?clear_kill=true",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["campaign"]["killed"], false);
}

#[tokio::test]
async fn paused_campaign_tick_reports_paused() {
    let p = project();
    let (status, body) = post(build_router(p.state.clone()), "/api/campaigns/spring/pause").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["campaign"]["paused"], true);

    let (status, body) = post(build_router(p.state.clone()), "/api/campaigns/spring/tick").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["status"], "paused");
}

#[tokio::test]
async fn tick_all_reports_each_campaign() {
    let p = project();
    let (status, body) = post(build_router(p.state.clone()), "/api/tick").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["campaigns"].as_array().unwrap().len(), 1);
    assert!(body["errors"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn suppressions_add_and_list() {
    let p = project();
    let entry = serde_json::json!({ "kind": "domain", "value": "Example.COM", "reason": "opt-out" });

    let (status, body) = post_json(build_router(p.state.clone()), "/api/suppressions", entry.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["added"], true);
    assert_eq!(body["entry"]["value"], "example.com");

    let (status, body) = post_json(build_router(p.state.clone()), "/api/suppressions", entry).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], false);

    let (status, body) = get(build_router(p.state.clone()), "/api/suppressions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn invalid_suppression_kind_is_400() {
    let p = project();
    let (status, _) = post_json(
        build_router(p.state.clone()),
        "/api/suppressions",
        serde_json::json!({ "kind": "planet", "value": "mars" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn config_includes_default_channels() {
    let p = project();
    let (status, body) = get(build_router(p.state.clone()), "/api/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config"]["channels"]["email"]["type"], "outbox");
    assert!(body["warnings"].as_array().unwrap().is_empty());
}
