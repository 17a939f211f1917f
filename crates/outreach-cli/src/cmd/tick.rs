use crate::output::{print_json, print_table};
use anyhow::bail;
use outreach_core::orchestrator::{TickOutcome, TickSummary};
use std::path::Path;

use super::{load_config, open_db, orchestrator};

pub fn run_tick(root: &Path, campaign: &str, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let db = open_db(root)?;
    let orch = orchestrator(root, db, &config)?;

    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(orch.run_tick(campaign))?;

    if json {
        print_json(&summary)?;
    } else {
        print_summaries(std::slice::from_ref(&summary));
    }
    Ok(())
}

/// Tick every campaign. Exits non-zero when any campaign failed, after
/// reporting the ones that succeeded.
pub fn run_all(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let db = open_db(root)?;
    let orch = orchestrator(root, db, &config)?;

    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(orch.run_all())?;

    if json {
        print_json(&summary)?;
    } else if summary.campaigns.is_empty() && summary.errors.is_empty() {
        println!("No campaigns.");
    } else {
        print_summaries(&summary.campaigns);
        let t = &summary.totals;
        println!(
            "\nTotal: {} processed, {} sent, {} deferred, {} retrying, {} failed, {} suppressed",
            t.processed, t.sent, t.deferred, t.retrying, t.failed, t.suppressed
        );
        for e in &summary.errors {
            eprintln!("  {}: {}", e.campaign_id, e.error);
        }
    }

    if !summary.errors.is_empty() {
        bail!("{} campaign(s) failed to tick", summary.errors.len());
    }
    Ok(())
}

fn outcome_label(outcome: &TickOutcome) -> String {
    match outcome {
        TickOutcome::Completed => "completed".into(),
        TickOutcome::Paused => "paused".into(),
        TickOutcome::Killed => "killed".into(),
        TickOutcome::LeaseLost => "lease lost".into(),
        TickOutcome::LeaseHeld { holder, .. } => format!("held by {holder}"),
    }
}

fn print_summaries(summaries: &[TickSummary]) {
    let rows = summaries
        .iter()
        .map(|s| {
            let c = &s.counts;
            vec![
                s.campaign_id.clone(),
                outcome_label(&s.outcome),
                c.processed.to_string(),
                c.sent.to_string(),
                c.deferred.to_string(),
                c.retrying.to_string(),
                c.failed.to_string(),
                c.suppressed.to_string(),
                c.duplicates.to_string(),
                c.timed_out.to_string(),
                format!("{}/{}", s.signals_applied, s.signals_rejected),
            ]
        })
        .collect();
    print_table(
        &[
            "CAMPAIGN", "OUTCOME", "PROCESSED", "SENT", "DEFERRED", "RETRYING", "FAILED",
            "SUPPRESSED", "DUPLICATES", "TIMED OUT", "SIGNALS OK/REJ",
        ],
        rows,
    );
}
