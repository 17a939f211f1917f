//! Lead lifecycle state machine.
//!
//! Pure transition logic: no I/O and no clock. Every state change a lead goes
//! through is one of the edges in [`transition`]; anything else is an
//! [`OutreachError::InvalidTransition`].
//!
//! ```text
//! NEW ─enrich─▶ ENRICHED ─qualify─▶ QUALIFIED ─contact─▶ CONTACTED ⟲ contact
//!                  └─reject─▶ REJECTED          │             ├─reply_positive─▶ REPLIED_POSITIVE ─win─▶ WON
//!                                               │             ├─reply_negative─▶ REPLIED_NEGATIVE ─┬─nurture─▶ NURTURING
//!                                               │             └─reply_timeout──▶ NO_REPLY_TIMEOUT ─┴─lose────▶ LOST
//!                                               └─delivery_failed (QUALIFIED | CONTACTED) ─▶ LOST
//! any non-terminal ─suppress─▶ SUPPRESSED
//! ```

use crate::error::{OutreachError, Result};
use crate::types::LeadState;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// LeadEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadEvent {
    Enrich,
    Qualify,
    Reject,
    /// A sequence step was delivered. Applies to the first step and to
    /// follow-ups alike.
    Contact,
    ReplyPositive,
    ReplyNegative,
    ReplyTimeout,
    Nurture,
    Lose,
    Win,
    Suppress,
    /// Permanent dispatch failure or retries exhausted.
    DeliveryFailed,
}

impl LeadEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadEvent::Enrich => "enrich",
            LeadEvent::Qualify => "qualify",
            LeadEvent::Reject => "reject",
            LeadEvent::Contact => "contact",
            LeadEvent::ReplyPositive => "reply_positive",
            LeadEvent::ReplyNegative => "reply_negative",
            LeadEvent::ReplyTimeout => "reply_timeout",
            LeadEvent::Nurture => "nurture",
            LeadEvent::Lose => "lose",
            LeadEvent::Win => "win",
            LeadEvent::Suppress => "suppress",
            LeadEvent::DeliveryFailed => "delivery_failed",
        }
    }
}

impl fmt::Display for LeadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// transition
// ---------------------------------------------------------------------------

/// Compute the state reached from `from` on `event`.
pub fn transition(from: LeadState, event: LeadEvent) -> Result<LeadState> {
    use LeadEvent as E;
    use LeadState as S;

    let to = match (from, event) {
        (s, E::Suppress) if !s.is_terminal() => S::Suppressed,
        (S::New, E::Enrich) => S::Enriched,
        (S::Enriched, E::Qualify) => S::Qualified,
        (S::Enriched, E::Reject) => S::Rejected,
        (S::Qualified | S::Contacted, E::Contact) => S::Contacted,
        (S::Contacted, E::ReplyPositive) => S::RepliedPositive,
        (S::Contacted, E::ReplyNegative) => S::RepliedNegative,
        (S::Contacted, E::ReplyTimeout) => S::NoReplyTimeout,
        (S::RepliedPositive, E::Win) => S::Won,
        (S::RepliedNegative | S::NoReplyTimeout, E::Nurture) => S::Nurturing,
        (S::RepliedNegative | S::NoReplyTimeout, E::Lose) => S::Lost,
        (S::Qualified | S::Contacted, E::DeliveryFailed) => S::Lost,
        _ => {
            return Err(OutreachError::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            })
        }
    };
    Ok(to)
}

/// True if `event` has an edge out of `from`.
pub fn can_transition(from: LeadState, event: LeadEvent) -> bool {
    transition(from, event).is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
