use crate::output::{dash, fmt_time, print_fields, print_json, print_table};
use anyhow::{bail, Context};
use clap::Subcommand;
use outreach_core::lead::{parse_inputs, Lead};
use outreach_core::orchestrator::{control, OutreachDb};
use outreach_core::signal::{self, LeadSignal, SignalKind};
use outreach_core::types::LeadState;
use outreach_core::OutreachError;
use std::path::{Path, PathBuf};

use super::open_db;

#[derive(Subcommand)]
pub enum LeadSubcommand {
    /// Import leads from a JSON, JSON lines or YAML file as NEW leads
    Import {
        campaign: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// List a campaign's leads
    List {
        campaign: String,
        /// Only leads in this state
        #[arg(long)]
        state: Option<String>,
    },
    /// Show one lead and its history (id or unique id prefix)
    Show { campaign: String, lead: String },
    /// Queue a signal for a lead; the next tick applies it
    Signal {
        campaign: String,
        lead: String,
        /// enriched, qualified, rejected, replied_positive, replied_negative,
        /// won, lost, nurture, unsubscribed, bounced
        kind: String,
        /// Attribute to merge into the lead, as key=value (repeatable)
        #[arg(long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
        /// Idempotency key of the attempt a bounce refers to
        #[arg(long)]
        key: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: LeadSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        LeadSubcommand::Import { campaign, file } => import(root, &campaign, &file, json),
        LeadSubcommand::List { campaign, state } => list(root, &campaign, state.as_deref(), json),
        LeadSubcommand::Show { campaign, lead } => show(root, &campaign, &lead, json),
        LeadSubcommand::Signal {
            campaign,
            lead,
            kind,
            attrs,
            key,
            note,
        } => signal(root, &campaign, &lead, &kind, &attrs, key, note, json),
    }
}

/// Find a lead by full id or by an unambiguous id prefix.
fn resolve_lead(db: &OutreachDb, campaign: &str, id: &str) -> anyhow::Result<Lead> {
    if let Some(lead) = db.lead(campaign, id)? {
        return Ok(lead);
    }
    db.require_campaign(campaign)?;
    let mut matches: Vec<Lead> = db
        .list_leads(campaign)?
        .into_iter()
        .filter(|l| l.id.starts_with(id))
        .collect();
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err(OutreachError::LeadNotFound {
            campaign: campaign.to_string(),
            lead: id.to_string(),
        }
        .into()),
        n => bail!("lead id prefix '{id}' is ambiguous ({n} matches)"),
    }
}

fn import(root: &Path, campaign: &str, file: &Path, json: bool) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let name = file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let inputs = parse_inputs(&name, &data)
        .with_context(|| format!("failed to parse {}", file.display()))?;

    let db = open_db(root)?;
    let summary = control::import_leads(&db, campaign, inputs, chrono::Utc::now())?;

    if json {
        return print_json(&summary);
    }
    println!(
        "Imported {} lead(s) into '{campaign}' ({} duplicate, {} rejected)",
        summary.imported,
        summary.duplicates,
        summary.rejected.len()
    );
    for r in &summary.rejected {
        println!("  record {}: {}", r.index, r.reason);
    }
    Ok(())
}

fn list(root: &Path, campaign: &str, state: Option<&str>, json: bool) -> anyhow::Result<()> {
    let state: Option<LeadState> = state.map(str::parse).transpose()?;
    let db = open_db(root)?;
    db.require_campaign(campaign)?;
    let leads: Vec<Lead> = db
        .list_leads(campaign)?
        .into_iter()
        .filter(|l| state.map_or(true, |s| l.state == s))
        .collect();

    if json {
        return print_json(&leads);
    }
    if leads.is_empty() {
        println!("No leads.");
        return Ok(());
    }
    let rows = leads
        .iter()
        .map(|l| {
            vec![
                l.short_id().to_string(),
                l.state.to_string(),
                dash(l.email.as_deref().or(l.phone.as_deref())),
                l.sequence_index.to_string(),
                fmt_time(l.next_action_at),
                l.retry_count.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "STATE", "ADDRESS", "STEP", "NEXT ACTION", "RETRIES"], rows);
    Ok(())
}

fn show(root: &Path, campaign: &str, id: &str, json: bool) -> anyhow::Result<()> {
    let db = open_db(root)?;
    let lead = resolve_lead(&db, campaign, id)?;
    if json {
        return print_json(&lead);
    }

    let name = [lead.first_name.as_deref(), lead.last_name.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    print_fields(&[
        ("Lead", lead.id.clone()),
        ("State", lead.state.to_string()),
        ("Name", if name.is_empty() { "-".into() } else { name }),
        ("Email", dash(lead.email.as_deref())),
        ("Phone", dash(lead.phone.as_deref())),
        ("Company", dash(lead.company.as_deref())),
        ("Next step", lead.sequence_index.to_string()),
        ("Next action", fmt_time(lead.next_action_at)),
        ("Retries", lead.retry_count.to_string()),
        ("Last contact", fmt_time(lead.last_contacted_at)),
        ("Last error", dash(lead.last_error.as_deref())),
    ]);
    if !lead.tags.is_empty() {
        println!("Tags: {}", lead.tags.iter().cloned().collect::<Vec<_>>().join(", "));
    }

    println!("\nHistory:");
    for change in &lead.history {
        println!(
            "  {}  {} -> {}  ({})",
            fmt_time(Some(change.at)),
            change.from,
            change.to,
            change.event
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn signal(
    root: &Path,
    campaign: &str,
    id: &str,
    kind: &str,
    attrs: &[String],
    key: Option<String>,
    note: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let kind: SignalKind = kind.parse()?;
    let db = open_db(root)?;
    let lead = resolve_lead(&db, campaign, id)?;

    let mut sig = LeadSignal::new(campaign, &lead.id, kind, chrono::Utc::now());
    for attr in attrs {
        let (k, v) = attr
            .split_once('=')
            .with_context(|| format!("attribute '{attr}' must be KEY=VALUE"))?;
        sig.attributes.insert(k.trim().to_string(), v.trim().to_string());
    }
    sig.idempotency_key = key;
    sig.note = note;
    let seq = signal::enqueue(&db, &sig)?;

    if json {
        print_json(&serde_json::json!({ "seq": seq, "signal": sig }))?;
    } else {
        println!("Queued '{kind}' for lead {} (applied on the next tick)", lead.short_id());
    }
    Ok(())
}
