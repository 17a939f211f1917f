//! Pre-dispatch safety policy.
//!
//! [`check_can_send`] is a pure function over a lead, its campaign and the
//! facts the tick loop looked up for it. A denial is a normal outcome, not an
//! error: the caller decides whether to skip, defer or transition the lead.

use crate::campaign::Campaign;
use crate::lead::Lead;
use crate::suppression::SuppressionEntry;
use chrono::{DateTime, Days, NaiveTime, Utc};
use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny { reason: DenyReason },
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyReason {
    Killed,
    Paused,
    /// On the suppression list or tagged do-not-contact.
    Suppressed { detail: String },
    /// Daily cap reached; sending may resume at `resume_at`.
    QuotaExceeded { resume_at: DateTime<Utc> },
    BatchCap,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Killed => f.write_str("campaign killed"),
            DenyReason::Paused => f.write_str("campaign paused"),
            DenyReason::Suppressed { detail } => write!(f, "suppressed ({detail})"),
            DenyReason::QuotaExceeded { resume_at } => {
                write!(f, "daily quota exceeded until {resume_at}")
            }
            DenyReason::BatchCap => f.write_str("batch cap reached"),
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyContext
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SendUsage {
    /// Messages sent for the campaign on the current UTC day.
    pub sent_today: u64,
    /// Messages sent by the tick in progress.
    pub sent_in_batch: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyContext<'a> {
    pub suppression: Option<&'a SuppressionEntry>,
    pub usage: SendUsage,
}

// ---------------------------------------------------------------------------
// check_can_send
// ---------------------------------------------------------------------------

/// Evaluate the send policy. First failing check wins:
/// killed, paused, suppressed, daily quota, batch cap.
pub fn check_can_send(
    lead: &Lead,
    campaign: &Campaign,
    ctx: &PolicyContext<'_>,
    now: DateTime<Utc>,
) -> Decision {
    let deny = |reason| Decision::Deny { reason };

    if let Some(reason) = campaign_gate(campaign) {
        return deny(reason);
    }
    if let Some(reason) = suppression_gate(lead, ctx.suppression) {
        return deny(reason);
    }
    if ctx.usage.sent_today >= u64::from(campaign.daily_cap) {
        return deny(DenyReason::QuotaExceeded {
            resume_at: next_quota_window(now),
        });
    }
    if ctx.usage.sent_in_batch >= u64::from(campaign.batch_cap) {
        return deny(DenyReason::BatchCap);
    }
    Decision::Allow
}

/// Campaign-wide stop: kill first, then pause.
pub fn campaign_gate(campaign: &Campaign) -> Option<DenyReason> {
    if campaign.killed {
        Some(DenyReason::Killed)
    } else if campaign.paused {
        Some(DenyReason::Paused)
    } else {
        None
    }
}

/// Suppression list entry or do-not-contact tag. Applies to every
/// non-terminal lead, including ones only waiting out a reply window.
pub fn suppression_gate(lead: &Lead, entry: Option<&SuppressionEntry>) -> Option<DenyReason> {
    if let Some(entry) = entry {
        Some(DenyReason::Suppressed {
            detail: entry.key(),
        })
    } else if lead.has_dnc_marker() {
        Some(DenyReason::Suppressed {
            detail: "do-not-contact tag".into(),
        })
    } else {
        None
    }
}

/// Start of the next UTC day, when the daily counter rolls over.
pub fn next_quota_window(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    today
        .checked_add_days(Days::new(1))
        .unwrap_or(today)
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// Key of the daily send counter for `now`.
pub fn quota_day(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{CampaignDefinition, SequenceStep};
    use crate::lead::LeadInput;
    use crate::suppression::SuppressionKind;
    use crate::types::Channel;
    use chrono::TimeZone;

    fn fixtures() -> (Lead, Campaign, DateTime<Utc>) {
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        let lead = Lead::from_input(
            "c",
            LeadInput {
                email: Some("lead@example.com".into()),
                ..Default::default()
            },
            now,
        )
        .unwrap();
        let campaign = Campaign::from_definition(
            CampaignDefinition {
                id: "c".into(),
                name: None,
                daily_cap: 1,
                batch_cap: 1,
                enabled_channels: vec![],
                steps: vec![SequenceStep {
                    channel: Channel::Email,
                    template_ref: "intro".into(),
                    delay_secs: 0,
                }],
                reply_window_secs: 60,
                no_reply_disposition: Default::default(),
                variables: Default::default(),
            },
            now,
        )
        .unwrap();
        (lead, campaign, now)
    }

    #[test]
    fn allows_clean_lead() {
        let (lead, campaign, now) = fixtures();
        assert!(check_can_send(&lead, &campaign, &PolicyContext::default(), now).is_allow());
    }

    #[test]
    fn kill_wins_over_everything() {
        let (lead, mut campaign, now) = fixtures();
        campaign.killed = true;
        campaign.paused = true;
        let entry =
            SuppressionEntry::new(SuppressionKind::Identity, &lead.id, None, None, now).unwrap();
        let ctx = PolicyContext {
            suppression: Some(&entry),
            usage: SendUsage {
                sent_today: 10,
                sent_in_batch: 10,
            },
        };
        assert_eq!(
            check_can_send(&lead, &campaign, &ctx, now),
            Decision::Deny {
                reason: DenyReason::Killed
            }
        );
        campaign.killed = false;
        assert_eq!(
            check_can_send(&lead, &campaign, &ctx, now),
            Decision::Deny {
                reason: DenyReason::Paused
            }
        );
    }

    #[test]
    fn suppression_beats_quota() {
        let (mut lead, campaign, now) = fixtures();
        lead.tags.insert("unsubscribed".into());
        let ctx = PolicyContext {
            suppression: None,
            usage: SendUsage {
                sent_today: 5,
                sent_in_batch: 0,
            },
        };
        assert!(matches!(
            check_can_send(&lead, &campaign, &ctx, now),
            Decision::Deny {
                reason: DenyReason::Suppressed { .. }
            }
        ));
    }

    #[test]
    fn quota_resumes_at_next_utc_midnight() {
        let (lead, campaign, now) = fixtures();
        let ctx = PolicyContext {
            suppression: None,
            usage: SendUsage {
                sent_today: 1,
                sent_in_batch: 0,
            },
        };
        let expected = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(
            check_can_send(&lead, &campaign, &ctx, now),
            Decision::Deny {
                reason: DenyReason::QuotaExceeded {
                    resume_at: expected
                }
            }
        );
    }

    #[test]
    fn batch_cap_checked_last() {
        let (lead, mut campaign, now) = fixtures();
        campaign.daily_cap = 100;
        let ctx = PolicyContext {
            suppression: None,
            usage: SendUsage {
                sent_today: 1,
                sent_in_batch: 1,
            },
        };
        assert_eq!(
            check_can_send(&lead, &campaign, &ctx, now),
            Decision::Deny {
                reason: DenyReason::BatchCap
            }
        );
    }

    #[test]
    fn quota_day_is_utc_date() {
        let (_, _, now) = fixtures();
        assert_eq!(quota_day(now), "2026-03-14");
    }
}
