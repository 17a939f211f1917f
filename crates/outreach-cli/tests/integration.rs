#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn outreach(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("outreach").unwrap();
    cmd.current_dir(dir.path())
        .env("OUTREACH_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn json_out(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.arg("--json").assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

fn init_project(dir: &TempDir) {
    outreach(dir).arg("init").assert().success();
}

/// Init, create the example campaign, import two leads (plus one invalid
/// record) and return the lead ids.
fn project_with_leads(dir: &TempDir) -> Vec<String> {
    init_project(dir);
    outreach(dir)
        .args(["campaign", "create", "--file", ".outreach/example-campaign.yaml"])
        .assert()
        .success();

    let feed = dir.path().join("leads.json");
    std::fs::write(
        &feed,
        r#"[
  {"email": "Ada@Example.com", "first_name": "Ada", "company": "Engines Ltd"},
  {"email": "grace@navy.example", "first_name": "Grace"},
  {"first_name": "Nobody"}
]"#,
    )
    .unwrap();
    outreach(dir)
        .args(["lead", "import", "example", "--file"])
        .arg(&feed)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 lead(s)"))
        .stdout(predicate::str::contains("1 rejected"));

    let leads = json_out(outreach(dir).args(["lead", "list", "example"]));
    leads
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["id"].as_str().unwrap().to_string())
        .collect()
}

fn qualify(dir: &TempDir, lead_id: &str) {
    for kind in ["enriched", "qualified"] {
        outreach(dir)
            .args(["lead", "signal", "example", lead_id, kind])
            .assert()
            .success();
    }
}

// ---------------------------------------------------------------------------
// outreach init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_directory_tree() {
    let dir = TempDir::new().unwrap();
    outreach(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .outreach/config.yaml"));

    assert!(dir.path().join(".outreach/config.yaml").exists());
    assert!(dir.path().join(".outreach/outreach.db").exists());
    assert!(dir.path().join(".outreach/templates/intro.yaml").exists());
    assert!(dir.path().join(".outreach/templates/follow-up.yaml").exists());
    assert!(dir.path().join(".outreach/example-campaign.yaml").exists());
    assert!(dir.path().join(".outreach/outbox").is_dir());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    outreach(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .outreach/config.yaml"));
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    outreach(&dir)
        .args(["campaign", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// outreach campaign
// ---------------------------------------------------------------------------

#[test]
fn campaign_create_list_show() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    outreach(&dir)
        .args(["campaign", "create", "--file", ".outreach/example-campaign.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created campaign 'example' (2 steps)"));

    outreach(&dir)
        .args(["campaign", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("example"))
        .stdout(predicate::str::contains("active"));

    outreach(&dir)
        .args(["campaign", "show", "example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("example - Example campaign"));

    let status = json_out(outreach(&dir).args(["campaign", "show", "example"]));
    assert_eq!(status["campaign"]["daily_cap"], 100);
    assert_eq!(status["campaign"]["steps"].as_array().unwrap().len(), 2);
    assert_eq!(status["lease_active"], false);
}

#[test]
fn campaign_create_twice_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let create = ["campaign", "create", "--file", ".outreach/example-campaign.yaml"];
    outreach(&dir).args(create).assert().success();
    outreach(&dir)
        .args(create)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn campaign_update_freezes_sent_steps() {
    let dir = TempDir::new().unwrap();
    let ids = project_with_leads(&dir);
    qualify(&dir, &ids[0]);
    outreach(&dir).args(["run-tick", "example"]).assert().success();

    let changed = dir.path().join("changed.yaml");
    std::fs::write(
        &changed,
        "id: example\nsteps:\n  - channel: email\n    template_ref: follow-up\n",
    )
    .unwrap();
    outreach(&dir)
        .args(["campaign", "update", "--file"])
        .arg(&changed)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot change"));
}

// ---------------------------------------------------------------------------
// outreach lead
// ---------------------------------------------------------------------------

#[test]
fn lead_list_filters_by_state() {
    let dir = TempDir::new().unwrap();
    let ids = project_with_leads(&dir);
    assert_eq!(ids.len(), 2);

    let new = json_out(outreach(&dir).args(["lead", "list", "example", "--state", "new"]));
    assert_eq!(new.as_array().unwrap().len(), 2);

    outreach(&dir)
        .args(["lead", "list", "example", "--state", "sideways"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid lead state"));
}

#[test]
fn lead_show_accepts_id_prefix() {
    let dir = TempDir::new().unwrap();
    let ids = project_with_leads(&dir);
    let prefix = &ids[0][..12];

    let lead = json_out(outreach(&dir).args(["lead", "show", "example", prefix]));
    assert_eq!(lead["id"], ids[0].as_str());
    assert_eq!(lead["state"], "new");
}

#[test]
fn unknown_signal_kind_fails() {
    let dir = TempDir::new().unwrap();
    let ids = project_with_leads(&dir);
    outreach(&dir)
        .args(["lead", "signal", "example", &ids[0], "teleported"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown signal kind"));
}

// ---------------------------------------------------------------------------
// ticks
// ---------------------------------------------------------------------------

#[test]
fn qualified_lead_is_sent_on_tick() {
    let dir = TempDir::new().unwrap();
    let ids = project_with_leads(&dir);
    qualify(&dir, &ids[0]);

    let summary = json_out(outreach(&dir).args(["run-tick", "example"]));
    assert_eq!(summary["outcome"]["status"], "completed");
    assert_eq!(summary["signals_applied"], 2);
    assert_eq!(summary["sent"], 1);
    assert_eq!(summary["failed"], 0);

    let lead = json_out(outreach(&dir).args(["lead", "show", "example", &ids[0]]));
    assert_eq!(lead["state"], "contacted");
    assert_eq!(lead["sequence_index"], 1);

    let attempts = json_out(outreach(&dir).args(["attempts", "example"]));
    let attempts = attempts.as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["status"], "sent");

    let outbox = std::fs::read_to_string(dir.path().join(".outreach/outbox/email.jsonl")).unwrap();
    assert_eq!(outbox.lines().count(), 1);

    // Nothing is due any more: a second tick sends nothing.
    let again = json_out(outreach(&dir).args(["run-tick", "example"]));
    assert_eq!(again["sent"], 0);
}

#[test]
fn run_tick_unknown_campaign_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    outreach(&dir)
        .args(["run-tick", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("campaign not found: ghost"));
}

#[test]
fn run_all_reports_every_campaign() {
    let dir = TempDir::new().unwrap();
    project_with_leads(&dir);
    let summary = json_out(outreach(&dir).arg("run-all"));
    assert_eq!(summary["campaigns"].as_array().unwrap().len(), 1);
    assert!(summary["errors"].as_array().unwrap().is_empty());
}

#[test]
fn suppressed_domain_is_never_sent() {
    let dir = TempDir::new().unwrap();
    let ids = project_with_leads(&dir);
    outreach(&dir)
        .args(["suppress", "add", "domain", "Example.com", "--reason", "opt-out"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Suppressed domain:example.com"));

    let ada = json_out(outreach(&dir).args(["lead", "show", "example", &ids[0]]));
    let target = if ada["email"] == "ada@example.com" { &ids[0] } else { &ids[1] };
    qualify(&dir, target);

    let summary = json_out(outreach(&dir).args(["run-tick", "example"]));
    assert_eq!(summary["sent"], 0);
    assert_eq!(summary["suppressed"], 1);

    let lead = json_out(outreach(&dir).args(["lead", "show", "example", target]));
    assert_eq!(lead["state"], "suppressed");
}

// ---------------------------------------------------------------------------
// pause / resume / kill
// ---------------------------------------------------------------------------

#[test]
fn paused_campaign_does_not_send() {
    let dir = TempDir::new().unwrap();
    let ids = project_with_leads(&dir);
    qualify(&dir, &ids[0]);

    outreach(&dir)
        .args(["pause", "example"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Paused campaign 'example'"));
    let summary = json_out(outreach(&dir).args(["run-tick", "example"]));
    assert_eq!(summary["outcome"]["status"], "paused");
    assert_eq!(summary["sent"], 0);

    outreach(&dir).args(["resume", "example"]).assert().success();
    let summary = json_out(outreach(&dir).args(["run-tick", "example"]));
    assert_eq!(summary["sent"], 1);
}

#[test]
fn killed_campaign_needs_clear_kill() {
    let dir = TempDir::new().unwrap();
    project_with_leads(&dir);

    outreach(&dir).args(["kill", "example"]).assert().success();
    let summary = json_out(outreach(&dir).args(["run-tick", "example"]));
    assert_eq!(summary["outcome"]["status"], "killed");

    outreach(&dir)
        .args(["resume", "example"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--clear-kill"));

    let status = json_out(outreach(&dir).args(["resume", "example", "--clear-kill"]));
    assert_eq!(status["killed"], false);
    assert_eq!(status["paused"], false);
}

// ---------------------------------------------------------------------------
// outreach suppress
// ---------------------------------------------------------------------------

#[test]
fn suppress_add_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    outreach(&dir)
        .args(["suppress", "add", "email", "ada@example.com"])
        .assert()
        .success();
    outreach(&dir)
        .args(["suppress", "add", "email", "ADA@example.com"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Already suppressed"));

    let list = json_out(outreach(&dir).args(["suppress", "list"]));
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["source"], "cli");
}

#[test]
fn suppress_rejects_unknown_kind() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    outreach(&dir)
        .args(["suppress", "add", "planet", "mars"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown kind"));
}
