use crate::output::{dash, fmt_time, print_json, print_table};
use clap::Subcommand;
use outreach_core::orchestrator::control;
use outreach_core::suppression::{SuppressionEntry, SuppressionKind};
use std::path::Path;

use super::open_db;

#[derive(Subcommand)]
pub enum SuppressSubcommand {
    /// Add an entry; matching leads are never contacted again
    Add {
        /// email, domain, phone or identity
        kind: String,
        value: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// List every suppression entry
    List,
}

pub fn run(root: &Path, subcmd: SuppressSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SuppressSubcommand::Add {
            kind,
            value,
            reason,
        } => add(root, &kind, &value, reason, json),
        SuppressSubcommand::List => list(root, json),
    }
}

fn add(root: &Path, kind: &str, value: &str, reason: Option<String>, json: bool) -> anyhow::Result<()> {
    let kind: SuppressionKind = kind.parse()?;
    let entry = SuppressionEntry::new(kind, value, reason, Some("cli".into()), chrono::Utc::now())?;
    let db = open_db(root)?;
    let added = control::add_suppression(&db, &entry)?;

    if json {
        print_json(&serde_json::json!({ "added": added, "entry": entry }))?;
    } else if added {
        println!("Suppressed {}", entry.key());
    } else {
        println!("Already suppressed: {}", entry.key());
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let db = open_db(root)?;
    let entries = db.list_suppressions()?;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("Suppression list is empty.");
        return Ok(());
    }
    let rows = entries
        .iter()
        .map(|e| {
            vec![
                e.kind.to_string(),
                e.value.clone(),
                dash(e.reason.as_deref()),
                dash(e.source.as_deref()),
                fmt_time(Some(e.created_at)),
            ]
        })
        .collect();
    print_table(&["KIND", "VALUE", "REASON", "SOURCE", "ADDED"], rows);
    Ok(())
}
