//! Idempotency ledger.
//!
//! Every dispatch is recorded under an [`IdempotencyKey`] derived from the
//! lead, a fingerprint of the content inputs and the sequence number. The row
//! is written `Queued` *before* the external call, so a crash between dispatch
//! and bookkeeping leaves evidence that the next tick reconciles instead of
//! sending blind.
//!
//! All mutating functions take a [`WriteTxn`] so the caller can combine the
//! ledger change with the lead update in one commit.

use crate::campaign::Campaign;
use crate::error::{OutreachError, Result};
use crate::lead::Lead;
use crate::orchestrator::db::WriteTxn;
use crate::policy::quota_day;
use crate::types::{AttemptStatus, Channel, FailureKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

const SEP: char = '\u{1f}';

// ---------------------------------------------------------------------------
// Keys and fingerprints
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn derive(lead_id: &str, content_hash: &str, sequence_number: u32) -> Self {
        let material = format!("{lead_id}{SEP}{content_hash}{SEP}{sequence_number}");
        Self(format!("{:x}", Sha256::digest(material.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint of everything that determines a message's content, computed
/// before rendering.
pub fn content_fingerprint(
    template_ref: &str,
    step_index: u32,
    channel: Channel,
    variables: &BTreeMap<String, String>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{template_ref}{SEP}{step_index}{SEP}{channel}").as_bytes());
    for (k, v) in variables {
        hasher.update(format!("{SEP}{k}={v}").as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Campaign variables overlaid with the lead's own.
pub fn template_variables(lead: &Lead, campaign: &Campaign) -> BTreeMap<String, String> {
    let mut vars = campaign.variables.clone();
    vars.extend(lead.variables());
    vars
}

// ---------------------------------------------------------------------------
// OutreachAttempt
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachAttempt {
    pub idempotency_key: String,
    pub campaign_id: String,
    pub lead_id: String,
    pub sequence_number: u32,
    pub content_hash: String,
    pub channel: Channel,
    pub status: AttemptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of times this key was queued for dispatch or failed rendering.
    pub attempt_count: u32,
    /// Set when the outcome was decided by in-doubt reconciliation.
    #[serde(default)]
    pub reconciled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl OutreachAttempt {
    fn from_draft(draft: &AttemptDraft, status: AttemptStatus, now: DateTime<Utc>) -> Self {
        Self {
            idempotency_key: draft.key.as_str().to_string(),
            campaign_id: draft.campaign_id.clone(),
            lead_id: draft.lead_id.clone(),
            sequence_number: draft.sequence_number,
            content_hash: draft.content_hash.clone(),
            channel: draft.channel,
            status,
            failure: None,
            provider_message_id: None,
            error: None,
            attempt_count: 0,
            reconciled: false,
            created_at: now,
            queued_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self.status, AttemptStatus::Sent | AttemptStatus::Bounced)
    }
}

// ---------------------------------------------------------------------------
// AttemptDraft
// ---------------------------------------------------------------------------

/// Everything needed to key and record one step for one lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptDraft {
    pub key: IdempotencyKey,
    pub campaign_id: String,
    pub lead_id: String,
    pub sequence_number: u32,
    pub content_hash: String,
    pub channel: Channel,
    pub template_ref: String,
    pub variables: BTreeMap<String, String>,
}

impl AttemptDraft {
    /// Draft for the lead's next step, or `None` once the sequence is done.
    pub fn next_step(lead: &Lead, campaign: &Campaign) -> Option<Self> {
        let index = lead.sequence_index;
        let step = campaign.step(index)?;
        let variables = template_variables(lead, campaign);
        let content_hash = content_fingerprint(&step.template_ref, index, step.channel, &variables);
        Some(Self {
            key: IdempotencyKey::derive(&lead.id, &content_hash, index),
            campaign_id: campaign.id.clone(),
            lead_id: lead.id.clone(),
            sequence_number: index,
            content_hash,
            channel: step.channel,
            template_ref: step.template_ref.clone(),
            variables,
        })
    }
}

// ---------------------------------------------------------------------------
// Prior state classification
// ---------------------------------------------------------------------------

/// What an existing ledger row means for a new dispatch of the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prior {
    /// No row yet.
    Fresh,
    /// Earlier transient or render failure; a new attempt is allowed.
    Retryable,
    AlreadySent,
    /// Queued with no recorded outcome: a dispatch may or may not have
    /// happened.
    InDoubt,
    PermanentlyFailed,
}

pub fn classify(existing: Option<&OutreachAttempt>) -> Prior {
    let Some(a) = existing else {
        return Prior::Fresh;
    };
    match a.status {
        AttemptStatus::Sent | AttemptStatus::Bounced => Prior::AlreadySent,
        AttemptStatus::Queued => Prior::InDoubt,
        AttemptStatus::Failed => match a.failure {
            Some(kind) if kind.is_permanent() => Prior::PermanentlyFailed,
            _ => Prior::Retryable,
        },
    }
}

// ---------------------------------------------------------------------------
// Ledger operations
// ---------------------------------------------------------------------------

pub fn has_been_sent(txn: &WriteTxn, key: &IdempotencyKey) -> Result<bool> {
    Ok(txn.attempt(key.as_str())?.is_some_and(|a| a.is_sent()))
}

#[derive(Debug)]
pub enum Begin {
    /// Row is now `Queued`; the caller may dispatch.
    Queued(OutreachAttempt),
    AlreadySent,
    InDoubt,
    PermanentlyFailed,
}

/// Record the intent to dispatch. Must commit before the external call.
pub fn begin_attempt(txn: &WriteTxn, draft: &AttemptDraft, now: DateTime<Utc>) -> Result<Begin> {
    let existing = txn.attempt(draft.key.as_str())?;
    let mut attempt = match classify(existing.as_ref()) {
        Prior::AlreadySent => return Ok(Begin::AlreadySent),
        Prior::InDoubt => return Ok(Begin::InDoubt),
        Prior::PermanentlyFailed => return Ok(Begin::PermanentlyFailed),
        Prior::Fresh => OutreachAttempt::from_draft(draft, AttemptStatus::Queued, now),
        Prior::Retryable => match existing {
            Some(a) => a,
            None => OutreachAttempt::from_draft(draft, AttemptStatus::Queued, now),
        },
    };
    attempt.status = AttemptStatus::Queued;
    attempt.failure = None;
    attempt.attempt_count += 1;
    attempt.queued_at = Some(now);
    attempt.completed_at = None;
    attempt.updated_at = now;
    txn.put_attempt(&attempt)?;
    Ok(Begin::Queued(attempt))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Sent { provider_message_id: Option<String> },
    Failed { kind: FailureKind, error: String },
    Bounced { error: Option<String> },
}

/// Record the result of a dispatch (or a later bounce report).
pub fn record_outcome(
    txn: &WriteTxn,
    key: &str,
    outcome: AttemptOutcome,
    now: DateTime<Utc>,
) -> Result<OutreachAttempt> {
    let mut attempt = txn
        .attempt(key)?
        .ok_or_else(|| OutreachError::AttemptNotFound(key.to_string()))?;
    match outcome {
        AttemptOutcome::Sent {
            provider_message_id,
        } => {
            attempt.status = AttemptStatus::Sent;
            attempt.failure = None;
            attempt.error = None;
            attempt.provider_message_id = provider_message_id;
        }
        AttemptOutcome::Failed { kind, error } => {
            attempt.status = AttemptStatus::Failed;
            attempt.failure = Some(kind);
            attempt.error = Some(error);
        }
        AttemptOutcome::Bounced { error } => {
            attempt.status = AttemptStatus::Bounced;
            attempt.failure = Some(FailureKind::Permanent);
            attempt.error = error;
        }
    }
    attempt.completed_at = Some(now);
    attempt.updated_at = now;
    txn.put_attempt(&attempt)?;
    Ok(attempt)
}

/// Record a failure for `draft` that happened before or instead of a
/// provider call (render errors, render timeouts, unreachable leads).
pub fn record_failure(
    txn: &WriteTxn,
    draft: &AttemptDraft,
    kind: FailureKind,
    error: &str,
    now: DateTime<Utc>,
) -> Result<OutreachAttempt> {
    let mut attempt = txn
        .attempt(draft.key.as_str())?
        .unwrap_or_else(|| OutreachAttempt::from_draft(draft, AttemptStatus::Failed, now));
    attempt.status = AttemptStatus::Failed;
    attempt.failure = Some(kind);
    attempt.error = Some(error.to_string());
    attempt.attempt_count += 1;
    attempt.completed_at = Some(now);
    attempt.updated_at = now;
    txn.put_attempt(&attempt)?;
    Ok(attempt)
}

/// Record that the content for `draft` could not be rendered. Nothing was
/// dispatched.
pub fn record_render_failure(
    txn: &WriteTxn,
    draft: &AttemptDraft,
    error: &str,
    now: DateTime<Utc>,
) -> Result<OutreachAttempt> {
    record_failure(txn, draft, FailureKind::Render, error, now)
}

/// How to resolve attempts left `Queued` by a holder that died mid-dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InDoubtPolicy {
    /// Treat as delivered. Never sends twice; may drop one message.
    #[default]
    AssumeSent,
    /// Treat as a transient failure. Never drops; may send twice.
    Retry,
}

/// Resolve every `Queued` attempt of `campaign_id`. Returns the resolved rows.
///
/// Attempts assumed sent count against the daily quota of the day they were
/// queued.
pub fn reconcile_in_doubt(
    txn: &WriteTxn,
    campaign_id: &str,
    policy: InDoubtPolicy,
    now: DateTime<Utc>,
) -> Result<Vec<OutreachAttempt>> {
    let mut resolved = Vec::new();
    for mut attempt in txn.attempts_for(campaign_id)? {
        if attempt.status != AttemptStatus::Queued {
            continue;
        }
        match policy {
            InDoubtPolicy::AssumeSent => {
                attempt.status = AttemptStatus::Sent;
                attempt.failure = None;
                attempt.error = Some("in doubt after interrupted dispatch; assumed sent".into());
                let day = quota_day(attempt.queued_at.unwrap_or(now));
                txn.increment_send_count(campaign_id, &day)?;
            }
            InDoubtPolicy::Retry => {
                attempt.status = AttemptStatus::Failed;
                attempt.failure = Some(FailureKind::Transient);
                attempt.error = Some("in doubt after interrupted dispatch; will retry".into());
            }
        }
        attempt.reconciled = true;
        attempt.completed_at = Some(now);
        attempt.updated_at = now;
        txn.put_attempt(&attempt)?;
        resolved.push(attempt);
    }
    Ok(resolved)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
