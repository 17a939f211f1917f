//! The per-campaign tick.
//!
//! One tick processes a bounded batch of due leads under the campaign lease.
//! For each lead: lease check, campaign flags, policy, ledger check, render,
//! lease and kill re-check, ledger `Queued`, dispatch, then the outcome and
//! the lead transition in a single commit.
//!
//! The only suspension points are render and dispatch, both bounded by
//! `tokio::time::timeout`. No redb transaction is open across either.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backoff::next_retry_at;
use crate::campaign::{Campaign, NoReplyDisposition};
use crate::clock::{Clock, SystemClock};
use crate::config::OrchestratorConfig;
use crate::dispatch::{ChannelRegistry, DispatchFailure, DispatchResult, OutboundMessage};
use crate::error::{OutreachError, Result};
use crate::lead::Lead;
use crate::ledger::{self, AttemptDraft, AttemptOutcome, Begin, Prior};
use crate::policy::{self, Decision, DenyReason, PolicyContext, SendUsage};
use crate::render::ContentRenderer;
use crate::signal;
use crate::state_machine::LeadEvent;
use crate::suppression;
use crate::types::FailureKind;

use super::db::OutreachDb;
use super::lease::{Lease, LeaseManager};

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickCounts {
    pub processed: u64,
    pub sent: u64,
    /// Quota, batch cap or in-doubt skips; the lead stays scheduled.
    pub deferred: u64,
    pub retrying: u64,
    pub failed: u64,
    pub suppressed: u64,
    /// Already in the ledger as sent; advanced without dispatch.
    pub duplicates: u64,
    /// Reply window closed without a reply.
    pub timed_out: u64,
}

impl TickCounts {
    pub fn add(&mut self, other: &TickCounts) {
        self.processed += other.processed;
        self.sent += other.sent;
        self.deferred += other.deferred;
        self.retrying += other.retrying;
        self.failed += other.failed;
        self.suppressed += other.suppressed;
        self.duplicates += other.duplicates;
        self.timed_out += other.timed_out;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickOutcome {
    Completed,
    Paused,
    Killed,
    /// The lease expired or was taken over mid-tick; the tick stopped.
    LeaseLost,
    /// Another holder owns the campaign; nothing was done.
    LeaseHeld {
        holder: String,
        expires_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct TickSummary {
    pub campaign_id: String,
    pub outcome: TickOutcome,
    #[serde(flatten)]
    pub counts: TickCounts,
    pub signals_applied: u64,
    pub signals_rejected: u64,
    pub reconciled: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TickSummary {
    /// A summary with nothing processed yet.
    pub fn empty(campaign_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            campaign_id: campaign_id.to_string(),
            outcome: TickOutcome::Completed,
            counts: TickCounts::default(),
            signals_applied: 0,
            signals_rejected: 0,
            reconciled: 0,
            started_at: now,
            finished_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignError {
    pub campaign_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunAllSummary {
    pub campaigns: Vec<TickSummary>,
    pub totals: TickCounts,
    pub errors: Vec<CampaignError>,
}

impl RunAllSummary {
    pub fn push(&mut self, summary: TickSummary) {
        self.totals.add(&summary.counts);
        self.campaigns.push(summary);
    }

    pub fn push_error(&mut self, campaign_id: &str, error: &OutreachError) {
        self.errors.push(CampaignError {
            campaign_id: campaign_id.to_string(),
            error: error.to_string(),
        });
    }
}

/// Result of processing one lead.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LeadOutcome {
    Sent,
    Duplicate,
    Deferred,
    Retrying,
    Failed,
    Suppressed,
    TimedOut,
    /// Not due any more, or not in an active sequence.
    Skipped,
    /// Campaign was killed or paused; stop the tick here.
    Halt(DenyReason),
}

/// Errors that end the tick instead of being scoped to one lead.
fn is_tick_fatal(e: &OutreachError) -> bool {
    matches!(
        e,
        OutreachError::LeaseLost(_)
            | OutreachError::Store(_)
            | OutreachError::Io(_)
            | OutreachError::CampaignNotFound(_)
            | OutreachError::ChannelNotConfigured(_)
            | OutreachError::ChannelConfig(_)
    )
}

pub fn default_holder_id() -> String {
    format!("outreach-{}-{}", std::process::id(), Uuid::new_v4().simple())
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    db: Arc<OutreachDb>,
    config: OrchestratorConfig,
    renderer: Arc<dyn ContentRenderer>,
    channels: ChannelRegistry,
    clock: Arc<dyn Clock>,
    holder_id: String,
}

impl Orchestrator {
    pub fn new(
        db: Arc<OutreachDb>,
        config: OrchestratorConfig,
        renderer: Arc<dyn ContentRenderer>,
        channels: ChannelRegistry,
    ) -> Self {
        Self {
            db,
            config,
            renderer,
            channels,
            clock: Arc::new(SystemClock),
            holder_id: default_holder_id(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_holder_id(mut self, holder_id: impl Into<String>) -> Self {
        self.holder_id = holder_id.into();
        self
    }

    pub fn db(&self) -> &Arc<OutreachDb> {
        &self.db
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn leases(&self) -> LeaseManager {
        LeaseManager::new(self.db.clone(), self.clock.clone(), self.config.lease_ttl())
    }

    /// Acquire the campaign lease, run one tick and release the lease.
    pub async fn run_tick(&self, campaign_id: &str) -> Result<TickSummary> {
        self.db.require_campaign(campaign_id)?;
        let leases = self.leases();
        let mut lease = match leases.acquire(campaign_id, &self.holder_id) {
            Ok(l) => l,
            Err(OutreachError::AlreadyHeld {
                holder, expires_at, ..
            }) => {
                info!(campaign_id, holder = %holder, "campaign lease held elsewhere; skipping");
                let mut summary = TickSummary::empty(campaign_id, self.clock.now());
                summary.outcome = TickOutcome::LeaseHeld { holder, expires_at };
                return Ok(summary);
            }
            Err(e) => return Err(e),
        };

        let result = self.tick(&mut lease).await;
        if !matches!(&result, Ok(s) if s.outcome == TickOutcome::LeaseLost) {
            if let Err(e) = leases.release(&lease) {
                warn!(campaign_id, error = %e, "failed to release lease");
            }
        }
        result
    }

    /// `run_tick` for every campaign. A failing campaign is recorded in the
    /// summary and does not stop the others.
    pub async fn run_all(&self) -> Result<RunAllSummary> {
        let mut out = RunAllSummary::default();
        for campaign in self.db.list_campaigns()? {
            match self.run_tick(&campaign.id).await {
                Ok(summary) => out.push(summary),
                Err(e) => {
                    error!(campaign_id = %campaign.id, error = %e, "tick failed");
                    out.push_error(&campaign.id, &e);
                }
            }
        }
        Ok(out)
    }

    /// Run one tick with an already-held lease. The lease is renewed on
    /// success and released if the campaign turns out to be killed.
    pub async fn tick(&self, lease: &mut Lease) -> Result<TickSummary> {
        let mut summary = TickSummary::empty(&lease.campaign_id, self.clock.now());
        summary.outcome = match self.tick_campaign(lease, &mut summary).await {
            Ok(outcome) => outcome,
            Err(OutreachError::LeaseLost(_)) => {
                warn!(campaign_id = %lease.campaign_id, fence = lease.fence, "lease lost; tick aborted");
                TickOutcome::LeaseLost
            }
            Err(e) => return Err(e),
        };
        summary.finished_at = self.clock.now();
        let c = &summary.counts;
        info!(
            campaign_id = %summary.campaign_id,
            outcome = ?summary.outcome,
            processed = c.processed,
            sent = c.sent,
            deferred = c.deferred,
            retrying = c.retrying,
            failed = c.failed,
            suppressed = c.suppressed,
            "tick finished"
        );
        Ok(summary)
    }

    async fn tick_campaign(&self, lease: &mut Lease, summary: &mut TickSummary) -> Result<TickOutcome> {
        let leases = self.leases();
        leases.validate(lease)?;
        let campaign_id = lease.campaign_id.clone();
        let c = campaign_id.as_str();

        let campaign = self.db.require_campaign(c)?;
        match policy::campaign_gate(&campaign) {
            Some(DenyReason::Killed) => {
                leases.release(lease)?;
                info!(campaign_id = c, "campaign killed; lease released");
                return Ok(TickOutcome::Killed);
            }
            Some(_) => {
                leases.renew(lease)?;
                debug!(campaign_id = c, "campaign paused");
                return Ok(TickOutcome::Paused);
            }
            None => {}
        }

        let now = self.clock.now();
        let policy = self.config.in_doubt;
        let resolved = self
            .db
            .write(|t| ledger::reconcile_in_doubt(t, c, policy, now))?;
        for a in &resolved {
            warn!(
                campaign_id = c,
                lead_id = %a.lead_id,
                idempotency_key = %a.idempotency_key,
                resolution = %a.status,
                "reconciled in-doubt attempt"
            );
        }
        summary.reconciled = resolved.len() as u64;

        self.apply_signals(lease, &campaign, summary)?;

        let due = self
            .db
            .due_leads(c, self.clock.now(), self.config.batch_size)?;
        let mut sent_in_batch = 0u64;
        for lead in due {
            leases.validate(lease)?;
            let outcome = match self.process_lead(lease, &lead.id, sent_in_batch).await {
                Ok(o) => o,
                Err(e) if is_tick_fatal(&e) => return Err(e),
                Err(e) => {
                    error!(campaign_id = c, lead_id = lead.short_id(), error = %e, "lead processing failed");
                    summary.counts.processed += 1;
                    summary.counts.failed += 1;
                    continue;
                }
            };

            let counts = &mut summary.counts;
            match outcome {
                LeadOutcome::Halt(DenyReason::Killed) => {
                    leases.release(lease)?;
                    info!(campaign_id = c, "campaign killed mid-tick; lease released");
                    return Ok(TickOutcome::Killed);
                }
                LeadOutcome::Halt(_) => {
                    info!(campaign_id = c, "campaign paused mid-tick");
                    return Ok(TickOutcome::Paused);
                }
                LeadOutcome::Skipped => continue,
                LeadOutcome::Sent => {
                    sent_in_batch += 1;
                    counts.sent += 1;
                }
                LeadOutcome::Duplicate => counts.duplicates += 1,
                LeadOutcome::Deferred => counts.deferred += 1,
                LeadOutcome::Retrying => counts.retrying += 1,
                LeadOutcome::Failed => counts.failed += 1,
                LeadOutcome::Suppressed => counts.suppressed += 1,
                LeadOutcome::TimedOut => counts.timed_out += 1,
            }
            counts.processed += 1;
        }

        leases.renew(lease)?;
        Ok(TickOutcome::Completed)
    }

    /// Apply queued signals, each in its own transaction. A signal that
    /// cannot be applied is logged and dropped.
    fn apply_signals(&self, lease: &Lease, campaign: &Campaign, summary: &mut TickSummary) -> Result<()> {
        let c = campaign.id.as_str();
        let leases = self.leases();
        for (seq, sig) in self.db.pending_signals(c)? {
            leases.validate(lease)?;
            let now = self.clock.now();
            let applied = self.db.write(|t| {
                let state = signal::apply(t, &sig, campaign, now)?;
                t.remove_signal(c, seq)?;
                Ok(state)
            });
            match applied {
                Ok(state) => {
                    info!(campaign_id = c, lead_id = %sig.lead_id, signal = %sig.kind, state = %state, "signal applied");
                    summary.signals_applied += 1;
                }
                Err(e) if matches!(e, OutreachError::Store(_) | OutreachError::Io(_)) => return Err(e),
                Err(e) => {
                    error!(campaign_id = c, lead_id = %sig.lead_id, signal = %sig.kind, error = %e, "signal rejected");
                    self.db.write(|t| t.remove_signal(c, seq))?;
                    summary.signals_rejected += 1;
                }
            }
        }
        Ok(())
    }

    async fn process_lead(&self, lease: &Lease, lead_id: &str, sent_in_batch: u64) -> Result<LeadOutcome> {
        let c = lease.campaign_id.as_str();
        let now = self.clock.now();

        let campaign = self.db.require_campaign(c)?;
        if let Some(reason) = policy::campaign_gate(&campaign) {
            return Ok(LeadOutcome::Halt(reason));
        }
        let Some(mut lead) = self.db.lead(c, lead_id)? else {
            return Ok(LeadOutcome::Skipped);
        };
        if !lead.is_due(now) {
            return Ok(LeadOutcome::Skipped);
        }
        if !lead.state.is_dispatchable() {
            warn!(campaign_id = c, lead_id = lead.short_id(), state = %lead.state, "due lead has no active sequence; unscheduling");
            lead.next_action_at = None;
            self.db.write(|t| t.put_lead(&lead))?;
            return Ok(LeadOutcome::Skipped);
        }

        // Suppression is looked up for every lead: retries and leads waiting
        // out the reply window included.
        let entry = self
            .db
            .suppression_for(&suppression::candidate_keys(&lead))?;
        if let Some(reason) = policy::suppression_gate(&lead, entry.as_ref()) {
            return self.on_deny(lead, reason, now);
        }

        let Some(draft) = AttemptDraft::next_step(&lead, &campaign) else {
            return self.close_reply_window(&campaign, lead, now);
        };
        let key = draft.key.as_str();

        let ctx = PolicyContext {
            suppression: entry.as_ref(),
            usage: SendUsage {
                sent_today: self.db.send_count(c, &policy::quota_day(now))?,
                sent_in_batch,
            },
        };
        if let Decision::Deny { reason } = policy::check_can_send(&lead, &campaign, &ctx, now) {
            return self.on_deny(lead, reason, now);
        }

        match ledger::classify(self.db.attempt(key)?.as_ref()) {
            Prior::AlreadySent => return self.advance_duplicate(lead, &campaign, &draft, now),
            Prior::InDoubt => {
                warn!(campaign_id = c, lead_id = lead.short_id(), idempotency_key = key, "attempt in doubt; skipping lead");
                return Ok(LeadOutcome::Deferred);
            }
            Prior::PermanentlyFailed => {
                return self.fail_permanently(lead, None, "earlier attempt failed permanently", now)
            }
            Prior::Fresh | Prior::Retryable => {}
        }

        let Some(recipient) = lead.address_for(draft.channel).map(str::to_string) else {
            let msg = format!("lead has no {} address", draft.channel);
            return self.fail_permanently(lead, Some(&draft), &msg, now);
        };
        let port = self.channels.get(draft.channel)?;

        let rendered = timeout(
            self.config.render_timeout(),
            self.renderer.render(&draft.template_ref, &draft.variables),
        )
        .await;
        let content = match rendered {
            Ok(Ok(content)) => content,
            Ok(Err(e)) => {
                let msg = e.to_string();
                error!(campaign_id = c, lead_id = lead.short_id(), idempotency_key = key, error = %msg, "render failed; lead lost");
                let now = self.clock.now();
                self.db.write(|t| {
                    ledger::record_render_failure(t, &draft, &msg, now)?;
                    mark_lost(&mut lead, &msg, now)?;
                    t.put_lead(&lead)
                })?;
                return Ok(LeadOutcome::Failed);
            }
            Err(_) => {
                let msg = format!("render timed out after {}s", self.config.render_timeout_secs);
                warn!(campaign_id = c, lead_id = lead.short_id(), idempotency_key = key, "{msg}");
                let now = self.clock.now();
                return self.db.write(|t| {
                    ledger::record_failure(t, &draft, FailureKind::Transient, &msg, now)?;
                    let outcome = self.schedule_retry(&mut lead, &msg, now)?;
                    t.put_lead(&lead)?;
                    Ok(outcome)
                });
            }
        };

        // Last look before the irreversible step.
        self.leases().validate(lease)?;
        let campaign = self.db.require_campaign(c)?;
        if let Some(reason) = policy::campaign_gate(&campaign) {
            return Ok(LeadOutcome::Halt(reason));
        }

        let now = self.clock.now();
        match self.db.write(|t| ledger::begin_attempt(t, &draft, now))? {
            Begin::Queued(_) => {}
            Begin::AlreadySent => return self.advance_duplicate(lead, &campaign, &draft, now),
            Begin::InDoubt => return Ok(LeadOutcome::Deferred),
            Begin::PermanentlyFailed => {
                return self.fail_permanently(lead, None, "earlier attempt failed permanently", now)
            }
        }

        let message = OutboundMessage {
            idempotency_key: key.to_string(),
            campaign_id: c.to_string(),
            lead_id: lead.id.clone(),
            channel: draft.channel,
            recipient,
            subject: content.subject,
            body: content.body,
        };
        let result = match timeout(self.config.dispatch_timeout(), port.send(&message)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                let now = self.clock.now();
                let failure = AttemptOutcome::Failed {
                    kind: FailureKind::Transient,
                    error: format!("dispatcher error: {e}"),
                };
                self.db.write(|t| ledger::record_outcome(t, key, failure, now))?;
                return Err(e);
            }
            Err(_) => DispatchResult::Failed(DispatchFailure::transient(format!(
                "dispatch timed out after {}s",
                self.config.dispatch_timeout_secs
            ))),
        };

        // The message may have left already, so the outcome is recorded even
        // if the lease expired during the call.
        let now = self.clock.now();
        match result {
            DispatchResult::Delivered {
                provider_message_id,
            } => {
                self.db.write(|t| {
                    ledger::record_outcome(t, key, AttemptOutcome::Sent { provider_message_id }, now)?;
                    t.increment_send_count(c, &policy::quota_day(now))?;
                    advance_after_send(&mut lead, &campaign, draft.sequence_number, now)?;
                    t.put_lead(&lead)
                })?;
                info!(campaign_id = c, lead_id = lead.short_id(), idempotency_key = key, step = draft.sequence_number, "sent");
                Ok(LeadOutcome::Sent)
            }
            DispatchResult::Failed(f) if f.kind == FailureKind::Transient => {
                warn!(campaign_id = c, lead_id = lead.short_id(), idempotency_key = key, error = %f.message, "transient dispatch failure");
                self.db.write(|t| {
                    let failure = AttemptOutcome::Failed {
                        kind: FailureKind::Transient,
                        error: f.message.clone(),
                    };
                    ledger::record_outcome(t, key, failure, now)?;
                    let outcome = self.schedule_retry(&mut lead, &f.message, now)?;
                    t.put_lead(&lead)?;
                    Ok(outcome)
                })
            }
            DispatchResult::Failed(f) => {
                warn!(campaign_id = c, lead_id = lead.short_id(), idempotency_key = key, error = %f.message, "permanent dispatch failure");
                self.db.write(|t| {
                    let failure = AttemptOutcome::Failed {
                        kind: FailureKind::Permanent,
                        error: f.message.clone(),
                    };
                    ledger::record_outcome(t, key, failure, now)?;
                    mark_lost(&mut lead, &f.message, now)?;
                    t.put_lead(&lead)
                })?;
                Ok(LeadOutcome::Failed)
            }
        }
    }

    fn on_deny(&self, mut lead: Lead, reason: DenyReason, now: DateTime<Utc>) -> Result<LeadOutcome> {
        match reason {
            DenyReason::Killed | DenyReason::Paused => Ok(LeadOutcome::Halt(reason)),
            DenyReason::Suppressed { detail } => {
                info!(campaign_id = %lead.campaign_id, lead_id = lead.short_id(), detail = %detail, "lead suppressed");
                lead.last_error = Some(format!("suppressed: {detail}"));
                lead.apply(LeadEvent::Suppress, now)?;
                self.db.write(|t| t.put_lead(&lead))?;
                Ok(LeadOutcome::Suppressed)
            }
            DenyReason::QuotaExceeded { resume_at } => {
                debug!(campaign_id = %lead.campaign_id, lead_id = lead.short_id(), %resume_at, "daily quota reached; deferring");
                lead.next_action_at = Some(resume_at);
                lead.updated_at = now;
                self.db.write(|t| t.put_lead(&lead))?;
                Ok(LeadOutcome::Deferred)
            }
            DenyReason::BatchCap => Ok(LeadOutcome::Deferred),
        }
    }

    /// Move a lead whose step is already recorded as sent forward without
    /// dispatching again.
    fn advance_duplicate(
        &self,
        mut lead: Lead,
        campaign: &Campaign,
        draft: &AttemptDraft,
        now: DateTime<Utc>,
    ) -> Result<LeadOutcome> {
        info!(campaign_id = %campaign.id, lead_id = lead.short_id(), idempotency_key = %draft.key, "already sent; advancing without dispatch");
        self.db.write(|t| {
            advance_after_send(&mut lead, campaign, draft.sequence_number, now)?;
            t.put_lead(&lead)
        })?;
        Ok(LeadOutcome::Duplicate)
    }

    fn fail_permanently(
        &self,
        mut lead: Lead,
        draft: Option<&AttemptDraft>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<LeadOutcome> {
        warn!(campaign_id = %lead.campaign_id, lead_id = lead.short_id(), reason, "lead failed permanently");
        self.db.write(|t| {
            if let Some(d) = draft {
                ledger::record_failure(t, d, FailureKind::Permanent, reason, now)?;
            }
            mark_lost(&mut lead, reason, now)?;
            t.put_lead(&lead)
        })?;
        Ok(LeadOutcome::Failed)
    }

    /// The lead finished its sequence and the reply window has passed.
    fn close_reply_window(&self, campaign: &Campaign, mut lead: Lead, now: DateTime<Utc>) -> Result<LeadOutcome> {
        lead.apply(LeadEvent::ReplyTimeout, now)?;
        let disposition = match campaign.no_reply_disposition {
            NoReplyDisposition::Nurture => LeadEvent::Nurture,
            NoReplyDisposition::Lose => LeadEvent::Lose,
        };
        lead.apply(disposition, now)?;
        lead.next_action_at = None;
        self.db.write(|t| t.put_lead(&lead))?;
        info!(campaign_id = %campaign.id, lead_id = lead.short_id(), state = %lead.state, "reply window closed");
        Ok(LeadOutcome::TimedOut)
    }

    /// Count a transient failure and either schedule the retry or give up.
    fn schedule_retry(&self, lead: &mut Lead, error: &str, now: DateTime<Utc>) -> Result<LeadOutcome> {
        lead.retry_count += 1;
        lead.last_error = Some(error.to_string());
        lead.updated_at = now;
        if lead.retry_count > self.config.max_retries {
            warn!(campaign_id = %lead.campaign_id, lead_id = lead.short_id(), retries = lead.retry_count - 1, "retries exhausted");
            lead.apply(LeadEvent::DeliveryFailed, now)?;
            return Ok(LeadOutcome::Failed);
        }
        lead.next_action_at = Some(next_retry_at(
            now,
            lead.retry_count - 1,
            &self.config.backoff,
        ));
        Ok(LeadOutcome::Retrying)
    }
}

fn advance_after_send(
    lead: &mut Lead,
    campaign: &Campaign,
    sent_index: u32,
    now: DateTime<Utc>,
) -> Result<()> {
    lead.apply(LeadEvent::Contact, now)?;
    lead.sequence_index = sent_index + 1;
    lead.retry_count = 0;
    lead.last_contacted_at = Some(now);
    lead.last_error = None;
    lead.next_action_at = Some(campaign.next_action_after(sent_index, now));
    Ok(())
}

fn mark_lost(lead: &mut Lead, reason: &str, now: DateTime<Utc>) -> Result<()> {
    lead.last_error = Some(reason.to_string());
    lead.apply(LeadEvent::DeliveryFailed, now)?;
    Ok(())
}
