//! Operator-facing campaign operations: create, update, import, pause, resume,
//! kill and status.
//!
//! These run outside the tick loop and never take the campaign lease. Flag
//! changes are single-row writes; the tick loop reads the flags fresh before
//! every lead and again before every dispatch, so a kill lands within one
//! lead of being issued.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::campaign::{Campaign, CampaignDefinition};
use crate::error::{OutreachError, Result};
use crate::lead::{Lead, LeadInput};
use crate::policy::quota_day;
use crate::suppression::SuppressionEntry;
use crate::types::LeadState;

use super::db::{OutreachDb, WriteTxn};
use super::lease::Lease;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CampaignStatus {
    pub campaign: Campaign,
    /// Current lease row, if any holder ever took one.
    pub lease: Option<Lease>,
    pub lease_active: bool,
    /// Lead count per state; every state is present.
    pub lead_counts: BTreeMap<String, u64>,
    pub sent_today: u64,
}

pub fn campaign_status(db: &OutreachDb, campaign_id: &str, now: DateTime<Utc>) -> Result<CampaignStatus> {
    let campaign = db.require_campaign(campaign_id)?;
    let lease = db.lease(campaign_id)?;
    let mut lead_counts: BTreeMap<String, u64> = LeadState::all()
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for lead in db.list_leads(campaign_id)? {
        *lead_counts.entry(lead.state.as_str().to_string()).or_insert(0) += 1;
    }
    Ok(CampaignStatus {
        lease_active: lease.as_ref().is_some_and(|l| l.is_active(now)),
        lease,
        lead_counts,
        sent_today: db.send_count(campaign_id, &quota_day(now))?,
        campaign,
    })
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

fn update_flags(
    db: &OutreachDb,
    campaign_id: &str,
    now: DateTime<Utc>,
    f: impl FnOnce(&mut Campaign) -> Result<()>,
) -> Result<CampaignStatus> {
    db.write(|t| {
        let mut campaign = require(t, campaign_id)?;
        f(&mut campaign)?;
        campaign.updated_at = now;
        t.put_campaign(&campaign)
    })?;
    campaign_status(db, campaign_id, now)
}

/// Stop processing new leads. Lead and ledger state are left as they are.
pub fn pause(db: &OutreachDb, campaign_id: &str, now: DateTime<Utc>) -> Result<CampaignStatus> {
    let status = update_flags(db, campaign_id, now, |c| {
        c.paused = true;
        Ok(())
    })?;
    info!(campaign_id, "campaign paused");
    Ok(status)
}

/// Clear the pause flag. A killed campaign stays killed unless `clear_kill`.
pub fn resume(
    db: &OutreachDb,
    campaign_id: &str,
    clear_kill: bool,
    now: DateTime<Utc>,
) -> Result<CampaignStatus> {
    let status = update_flags(db, campaign_id, now, |c| {
        if c.killed && !clear_kill {
            return Err(OutreachError::CampaignKilled(c.id.clone()));
        }
        c.paused = false;
        if clear_kill {
            c.killed = false;
        }
        Ok(())
    })?;
    info!(campaign_id, clear_kill, "campaign resumed");
    Ok(status)
}

/// Emergency stop. The running tick sees the flag before its next dispatch.
pub fn kill(db: &OutreachDb, campaign_id: &str, now: DateTime<Utc>) -> Result<CampaignStatus> {
    let status = update_flags(db, campaign_id, now, |c| {
        c.killed = true;
        Ok(())
    })?;
    warn!(campaign_id, "campaign killed");
    Ok(status)
}

// ---------------------------------------------------------------------------
// Campaign definitions
// ---------------------------------------------------------------------------

fn require(t: &WriteTxn, campaign_id: &str) -> Result<Campaign> {
    t.campaign(campaign_id)?
        .ok_or_else(|| OutreachError::CampaignNotFound(campaign_id.to_string()))
}

pub fn create_campaign(db: &OutreachDb, def: CampaignDefinition, now: DateTime<Utc>) -> Result<Campaign> {
    let campaign = Campaign::from_definition(def, now)?;
    db.write(|t| {
        if t.campaign(&campaign.id)?.is_some() {
            return Err(OutreachError::CampaignExists(campaign.id.clone()));
        }
        t.put_campaign(&campaign)
    })?;
    info!(campaign_id = %campaign.id, steps = campaign.steps.len(), "campaign created");
    Ok(campaign)
}

/// Replace a campaign's settings. Once any attempt references the campaign
/// its existing steps are frozen and only appends are accepted.
pub fn update_campaign(db: &OutreachDb, def: CampaignDefinition, now: DateTime<Utc>) -> Result<Campaign> {
    let campaign = db.write(|t| {
        let mut campaign = require(t, &def.id)?;
        let steps_locked = !t.attempts_for(&campaign.id)?.is_empty();
        campaign.apply_update(def, steps_locked, now)?;
        t.put_campaign(&campaign)?;
        Ok(campaign)
    })?;
    info!(campaign_id = %campaign.id, "campaign updated");
    Ok(campaign)
}

// ---------------------------------------------------------------------------
// Lead import
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct RejectedLead {
    /// Position in the input, starting at 0.
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub imported: u64,
    /// Already present in the campaign (same identity).
    pub duplicates: u64,
    pub rejected: Vec<RejectedLead>,
}

/// Create `New` leads from source records, deduplicated by identity. Invalid
/// records are reported and skipped; the rest commit together.
pub fn import_leads(
    db: &OutreachDb,
    campaign_id: &str,
    inputs: Vec<LeadInput>,
    now: DateTime<Utc>,
) -> Result<ImportSummary> {
    let summary = db.write(|t| {
        require(t, campaign_id)?;
        let mut summary = ImportSummary::default();
        for (index, input) in inputs.into_iter().enumerate() {
            let lead = match Lead::from_input(campaign_id, input, now) {
                Ok(l) => l,
                Err(e) => {
                    summary.rejected.push(RejectedLead {
                        index,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if t.insert_lead(&lead)? {
                summary.imported += 1;
            } else {
                summary.duplicates += 1;
            }
        }
        Ok(summary)
    })?;
    info!(
        campaign_id,
        imported = summary.imported,
        duplicates = summary.duplicates,
        rejected = summary.rejected.len(),
        "leads imported"
    );
    Ok(summary)
}

/// Add a suppression entry. Returns false when the same key was already
/// present (the existing entry is kept).
pub fn add_suppression(db: &OutreachDb, entry: &SuppressionEntry) -> Result<bool> {
    let added = db.write(|t| t.put_suppression(entry))?;
    if added {
        info!(key = %entry.key(), "suppression added");
    }
    Ok(added)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
