use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// LeadState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadState {
    New,
    Enriched,
    Qualified,
    Rejected,
    Contacted,
    RepliedPositive,
    RepliedNegative,
    NoReplyTimeout,
    Nurturing,
    Won,
    Lost,
    Suppressed,
}

impl LeadState {
    pub fn all() -> &'static [LeadState] {
        &[
            LeadState::New,
            LeadState::Enriched,
            LeadState::Qualified,
            LeadState::Rejected,
            LeadState::Contacted,
            LeadState::RepliedPositive,
            LeadState::RepliedNegative,
            LeadState::NoReplyTimeout,
            LeadState::Nurturing,
            LeadState::Won,
            LeadState::Lost,
            LeadState::Suppressed,
        ]
    }

    /// Terminal leads are retained for audit and never processed again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LeadState::Rejected | LeadState::Suppressed | LeadState::Lost | LeadState::Won
        )
    }

    /// States in which the tick loop may send the next sequence step.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, LeadState::Qualified | LeadState::Contacted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeadState::New => "new",
            LeadState::Enriched => "enriched",
            LeadState::Qualified => "qualified",
            LeadState::Rejected => "rejected",
            LeadState::Contacted => "contacted",
            LeadState::RepliedPositive => "replied_positive",
            LeadState::RepliedNegative => "replied_negative",
            LeadState::NoReplyTimeout => "no_reply_timeout",
            LeadState::Nurturing => "nurturing",
            LeadState::Won => "won",
            LeadState::Lost => "lost",
            LeadState::Suppressed => "suppressed",
        }
    }
}

impl fmt::Display for LeadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadState {
    type Err = crate::error::OutreachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadState::all()
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| crate::error::OutreachError::InvalidState(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn all() -> &'static [Channel] {
        &[Channel::Email, Channel::Sms]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = crate::error::OutreachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            _ => Err(crate::error::OutreachError::InvalidChannel(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// AttemptStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Queued,
    Sent,
    Failed,
    Bounced,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::Queued => "queued",
            AttemptStatus::Sent => "sent",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Bounced => "bounced",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = crate::error::OutreachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(AttemptStatus::Queued),
            "sent" => Ok(AttemptStatus::Sent),
            "failed" => Ok(AttemptStatus::Failed),
            "bounced" => Ok(AttemptStatus::Bounced),
            _ => Err(crate::error::OutreachError::InvalidState(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// FailureKind
// ---------------------------------------------------------------------------

/// Why an attempt ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network or provider hiccup (including timeouts); retried with backoff.
    Transient,
    /// Invalid recipient or hard rejection; never retried.
    Permanent,
    /// Content could not be rendered; never dispatched.
    Render,
}

impl FailureKind {
    pub fn is_permanent(self) -> bool {
        !matches!(self, FailureKind::Transient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
            FailureKind::Render => "render",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
