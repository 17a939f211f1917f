use crate::output::{dash, fmt_time, print_json, print_table};
use outreach_core::types::AttemptStatus;
use std::path::Path;

use super::open_db;

pub fn run(root: &Path, campaign: &str, status: Option<&str>, json: bool) -> anyhow::Result<()> {
    let status: Option<AttemptStatus> = status.map(str::parse).transpose()?;
    let db = open_db(root)?;
    db.require_campaign(campaign)?;
    let attempts: Vec<_> = db
        .list_attempts(Some(campaign))?
        .into_iter()
        .filter(|a| status.map_or(true, |s| a.status == s))
        .collect();

    if json {
        return print_json(&attempts);
    }
    if attempts.is_empty() {
        println!("No attempts.");
        return Ok(());
    }
    let rows = attempts
        .iter()
        .map(|a| {
            let key: String = a.idempotency_key.chars().take(12).collect();
            let lead: String = a.lead_id.chars().take(12).collect();
            let status = match a.failure {
                Some(kind) => format!("{} ({kind})", a.status),
                None => a.status.to_string(),
            };
            vec![
                key,
                lead,
                a.sequence_number.to_string(),
                a.channel.to_string(),
                status,
                a.attempt_count.to_string(),
                fmt_time(a.completed_at.or(a.queued_at)),
                dash(a.provider_message_id.as_deref().or(a.error.as_deref())),
            ]
        })
        .collect();
    print_table(
        &["KEY", "LEAD", "STEP", "CHANNEL", "STATUS", "TRIES", "AT", "DETAIL"],
        rows,
    );
    Ok(())
}
