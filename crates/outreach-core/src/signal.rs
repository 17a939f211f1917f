//! Externally reported lead events.
//!
//! Enrichment, reply classification, bounce webhooks and unsubscribe links
//! report what happened to a lead. Signals are queued per campaign and applied
//! by the tick loop while it holds the campaign lease, so a lead only ever has
//! one writer.

use crate::campaign::Campaign;
use crate::error::{OutreachError, Result};
use crate::ledger::{self, AttemptOutcome};
use crate::orchestrator::db::{OutreachDb, WriteTxn};
use crate::state_machine::LeadEvent;
use crate::suppression::{SuppressionEntry, SuppressionKind};
use crate::types::LeadState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// SignalKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Enriched,
    /// Qualified for outreach; schedules the first step.
    Qualified,
    Rejected,
    RepliedPositive,
    RepliedNegative,
    Won,
    Lost,
    Nurture,
    Unsubscribed,
    Bounced,
}

impl SignalKind {
    pub fn all() -> &'static [SignalKind] {
        &[
            SignalKind::Enriched,
            SignalKind::Qualified,
            SignalKind::Rejected,
            SignalKind::RepliedPositive,
            SignalKind::RepliedNegative,
            SignalKind::Won,
            SignalKind::Lost,
            SignalKind::Nurture,
            SignalKind::Unsubscribed,
            SignalKind::Bounced,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Enriched => "enriched",
            SignalKind::Qualified => "qualified",
            SignalKind::Rejected => "rejected",
            SignalKind::RepliedPositive => "replied_positive",
            SignalKind::RepliedNegative => "replied_negative",
            SignalKind::Won => "won",
            SignalKind::Lost => "lost",
            SignalKind::Nurture => "nurture",
            SignalKind::Unsubscribed => "unsubscribed",
            SignalKind::Bounced => "bounced",
        }
    }

    pub fn event(self) -> LeadEvent {
        match self {
            SignalKind::Enriched => LeadEvent::Enrich,
            SignalKind::Qualified => LeadEvent::Qualify,
            SignalKind::Rejected => LeadEvent::Reject,
            SignalKind::RepliedPositive => LeadEvent::ReplyPositive,
            SignalKind::RepliedNegative => LeadEvent::ReplyNegative,
            SignalKind::Won => LeadEvent::Win,
            SignalKind::Lost => LeadEvent::Lose,
            SignalKind::Nurture => LeadEvent::Nurture,
            SignalKind::Unsubscribed => LeadEvent::Suppress,
            SignalKind::Bounced => LeadEvent::DeliveryFailed,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignalKind {
    type Err = OutreachError;

    fn from_str(s: &str) -> Result<Self> {
        SignalKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| OutreachError::InvalidSignal(format!("unknown signal kind '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// LeadSignal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSignal {
    pub id: String,
    pub campaign_id: String,
    pub lead_id: String,
    pub kind: SignalKind,
    /// Attempt the signal refers to (bounces).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Extra lead attributes, merged on apply (enrichment data).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl LeadSignal {
    pub fn new(campaign_id: &str, lead_id: &str, kind: SignalKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            campaign_id: campaign_id.to_string(),
            lead_id: lead_id.to_string(),
            kind,
            idempotency_key: None,
            attributes: BTreeMap::new(),
            note: None,
            received_at: now,
        }
    }
}

/// Queue a signal after checking that its campaign and lead exist.
pub fn enqueue(db: &OutreachDb, signal: &LeadSignal) -> Result<u64> {
    db.write(|t| {
        if t.campaign(&signal.campaign_id)?.is_none() {
            return Err(OutreachError::CampaignNotFound(signal.campaign_id.clone()));
        }
        if t.lead(&signal.campaign_id, &signal.lead_id)?.is_none() {
            return Err(OutreachError::LeadNotFound {
                campaign: signal.campaign_id.clone(),
                lead: signal.lead_id.clone(),
            });
        }
        if signal.kind == SignalKind::Bounced {
            if let Some(key) = &signal.idempotency_key {
                if t.attempt(key)?.is_none() {
                    return Err(OutreachError::AttemptNotFound(key.clone()));
                }
            }
        }
        t.push_signal(signal)
    })
}

/// Apply one signal to its lead inside `txn`. Returns the lead's new state.
///
/// An `Err` leaves the transaction to be aborted by the caller; the signal is
/// then discarded as rejected.
pub fn apply(
    txn: &WriteTxn,
    signal: &LeadSignal,
    campaign: &Campaign,
    now: DateTime<Utc>,
) -> Result<LeadState> {
    let mut lead = txn
        .lead(&signal.campaign_id, &signal.lead_id)?
        .ok_or_else(|| OutreachError::LeadNotFound {
            campaign: signal.campaign_id.clone(),
            lead: signal.lead_id.clone(),
        })?;
    lead.attributes
        .extend(signal.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));

    match signal.kind {
        SignalKind::Unsubscribed => {
            let entry = SuppressionEntry::new(
                SuppressionKind::Identity,
                &lead.id,
                Some(signal.note.clone().unwrap_or_else(|| "unsubscribed".into())),
                Some(format!("signal:{}", signal.id)),
                now,
            )?;
            txn.put_suppression(&entry)?;
            lead.tags.insert("unsubscribed".into());
            // Unsubscribes are honored even for leads that already finished.
            if !lead.state.is_terminal() {
                lead.apply(LeadEvent::Suppress, now)?;
            }
        }
        SignalKind::Bounced => {
            if let Some(key) = &signal.idempotency_key {
                ledger::record_outcome(
                    txn,
                    key,
                    AttemptOutcome::Bounced {
                        error: signal.note.clone(),
                    },
                    now,
                )?;
            }
            lead.last_error = Some(signal.note.clone().unwrap_or_else(|| "bounced".into()));
            lead.apply(LeadEvent::DeliveryFailed, now)?;
        }
        SignalKind::Qualified => {
            lead.apply(LeadEvent::Qualify, now)?;
            lead.sequence_index = 0;
            lead.retry_count = 0;
            lead.next_action_at = campaign.step_due_at(0, now);
        }
        SignalKind::RepliedPositive | SignalKind::RepliedNegative => {
            lead.apply(signal.kind.event(), now)?;
            lead.next_action_at = None;
        }
        kind => {
            lead.apply(kind.event(), now)?;
        }
    }

    lead.updated_at = now;
    txn.put_lead(&lead)?;
    Ok(lead.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kinds_parse() {
        for k in SignalKind::all() {
            assert_eq!(SignalKind::from_str(k.as_str()).unwrap(), *k);
        }
        assert!(matches!(
            SignalKind::from_str("opened"),
            Err(OutreachError::InvalidSignal(_))
        ));
    }

    #[test]
    fn signal_events_follow_lifecycle() {
        assert_eq!(SignalKind::Unsubscribed.event(), LeadEvent::Suppress);
        assert_eq!(SignalKind::Bounced.event(), LeadEvent::DeliveryFailed);
        assert_eq!(SignalKind::Lost.event(), LeadEvent::Lose);
    }
}
