use crate::output::print_json;
use outreach_core::orchestrator::{control, CampaignStatus};
use std::path::Path;

use super::open_db;

pub fn pause(root: &Path, campaign: &str, json: bool) -> anyhow::Result<()> {
    let db = open_db(root)?;
    let status = control::pause(&db, campaign, chrono::Utc::now())?;
    report(&status, "Paused", json)
}

pub fn resume(root: &Path, campaign: &str, clear_kill: bool, json: bool) -> anyhow::Result<()> {
    let db = open_db(root)?;
    let status = control::resume(&db, campaign, clear_kill, chrono::Utc::now())?;
    report(&status, "Resumed", json)
}

pub fn kill(root: &Path, campaign: &str, json: bool) -> anyhow::Result<()> {
    let db = open_db(root)?;
    let status = control::kill(&db, campaign, chrono::Utc::now())?;
    report(&status, "Killed", json)
}

fn report(status: &CampaignStatus, verb: &str, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&serde_json::json!({
            "campaign_id": status.campaign.id,
            "paused": status.campaign.paused,
            "killed": status.campaign.killed,
            "lead_counts": status.lead_counts,
            "sent_today": status.sent_today,
        }));
    }
    let active: u64 = ["qualified", "contacted"]
        .iter()
        .filter_map(|s| status.lead_counts.get(*s))
        .sum();
    println!(
        "{verb} campaign '{}' ({active} lead(s) in sequence, {} sent today)",
        status.campaign.id, status.sent_today
    );
    Ok(())
}
