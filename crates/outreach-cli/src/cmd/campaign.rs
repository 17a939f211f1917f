use crate::output::{fmt_time, print_fields, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use outreach_core::campaign::CampaignDefinition;
use outreach_core::orchestrator::{control, CampaignStatus};
use std::path::{Path, PathBuf};

use super::open_db;

#[derive(Subcommand)]
pub enum CampaignSubcommand {
    /// Create a campaign from a YAML definition
    Create {
        #[arg(long)]
        file: PathBuf,
    },
    /// Replace a campaign's settings from a YAML definition
    ///
    /// Steps that leads have already been sent are frozen; new steps may be
    /// appended.
    Update {
        #[arg(long)]
        file: PathBuf,
    },
    /// List campaigns
    List,
    /// Show a campaign with its lease and lead counts
    Show { id: String },
}

pub fn run(root: &Path, subcmd: CampaignSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CampaignSubcommand::Create { file } => create(root, &file, json),
        CampaignSubcommand::Update { file } => update(root, &file, json),
        CampaignSubcommand::List => list(root, json),
        CampaignSubcommand::Show { id } => show(root, &id, json),
    }
}

fn read_definition(file: &Path) -> anyhow::Result<CampaignDefinition> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    CampaignDefinition::from_yaml(&data).with_context(|| format!("invalid campaign file {}", file.display()))
}

fn create(root: &Path, file: &Path, json: bool) -> anyhow::Result<()> {
    let def = read_definition(file)?;
    let db = open_db(root)?;
    let campaign = control::create_campaign(&db, def, chrono::Utc::now())?;

    if json {
        print_json(&campaign)?;
    } else {
        println!(
            "Created campaign '{}' ({} step{})",
            campaign.id,
            campaign.steps.len(),
            if campaign.steps.len() == 1 { "" } else { "s" }
        );
    }
    Ok(())
}

fn update(root: &Path, file: &Path, json: bool) -> anyhow::Result<()> {
    let def = read_definition(file)?;
    let db = open_db(root)?;
    let campaign = control::update_campaign(&db, def, chrono::Utc::now())?;

    if json {
        print_json(&campaign)?;
    } else {
        println!("Updated campaign '{}'", campaign.id);
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let db = open_db(root)?;
    let now = chrono::Utc::now();
    let statuses = db
        .list_campaigns()?
        .iter()
        .map(|c| control::campaign_status(&db, &c.id, now))
        .collect::<Result<Vec<_>, _>>()?;

    if json {
        return print_json(&statuses);
    }
    if statuses.is_empty() {
        println!("No campaigns.");
        return Ok(());
    }
    let rows = statuses
        .iter()
        .map(|s| {
            let total: u64 = s.lead_counts.values().sum();
            vec![
                s.campaign.id.clone(),
                flag_label(s),
                s.campaign.steps.len().to_string(),
                total.to_string(),
                format!("{}/{}", s.sent_today, s.campaign.daily_cap),
            ]
        })
        .collect();
    print_table(&["ID", "STATE", "STEPS", "LEADS", "SENT TODAY"], rows);
    Ok(())
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let db = open_db(root)?;
    let status = control::campaign_status(&db, id, chrono::Utc::now())?;
    if json {
        return print_json(&status);
    }

    let c = &status.campaign;
    let lease = match &status.lease {
        Some(l) if status.lease_active => {
            format!("{} (fence {}, until {})", l.holder_id, l.fence, fmt_time(Some(l.expires_at)))
        }
        Some(l) => format!("none (last fence {})", l.fence),
        None => "none".to_string(),
    };
    print_fields(&[
        ("Campaign", format!("{} - {}", c.id, c.name)),
        ("State", flag_label(&status)),
        ("Channels", c.enabled_channels.iter().map(|ch| ch.as_str()).collect::<Vec<_>>().join(", ")),
        ("Daily cap", format!("{} (sent today: {})", c.daily_cap, status.sent_today)),
        ("Batch cap", c.batch_cap.to_string()),
        ("Reply window", format!("{}s, then {}", c.reply_window_secs, c.no_reply_disposition)),
        ("Lease", lease),
    ]);

    println!("\nSteps:");
    for (i, step) in c.steps.iter().enumerate() {
        println!("  {i}. {} via {} after {}s", step.template_ref, step.channel, step.delay_secs);
    }

    println!("\nLeads:");
    for (state, count) in status.lead_counts.iter().filter(|(_, n)| **n > 0) {
        println!("  {state:<12} {count}");
    }
    Ok(())
}

fn flag_label(status: &CampaignStatus) -> String {
    match (status.campaign.killed, status.campaign.paused) {
        (true, _) => "killed".into(),
        (false, true) => "paused".into(),
        (false, false) => "active".into(),
    }
}
