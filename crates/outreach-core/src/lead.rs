use crate::error::{OutreachError, Result};
use crate::state_machine::{self, LeadEvent};
use crate::types::{Channel, LeadState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Tags that mark a lead as do-not-contact regardless of the suppression list.
pub const DNC_TAGS: &[&str] = &["dnc", "do-not-contact", "unsubscribed"];

// ---------------------------------------------------------------------------
// Normalization and identity
// ---------------------------------------------------------------------------

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Keep digits only, preserving a leading `+`.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if trimmed.starts_with('+') {
        format!("+{digits}")
    } else {
        digits
    }
}

/// Stable identity: hex SHA-256 of the normalized primary contact address.
pub fn identity_hash(normalized_address: &str) -> String {
    format!("{:x}", Sha256::digest(normalized_address.as_bytes()))
}

/// Domain part of a normalized email address.
pub fn email_domain(email: &str) -> Option<&str> {
    email.rsplit_once('@').map(|(_, d)| d).filter(|d| !d.is_empty())
}

// ---------------------------------------------------------------------------
// StateChange
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: LeadState,
    pub to: LeadState,
    pub event: LeadEvent,
    pub at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// LeadInput
// ---------------------------------------------------------------------------

/// One record produced by the lead source feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadInput {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub campaign_id: String,
    pub state: LeadState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Index of the next sequence step to send.
    #[serde(default)]
    pub sequence_index: u32,
    #[serde(default)]
    pub next_action_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_contacted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub history: Vec<StateChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Build a `New` lead from an import record.
    ///
    /// The identity comes from the email when present, otherwise the phone.
    pub fn from_input(campaign_id: &str, input: LeadInput, now: DateTime<Utc>) -> Result<Self> {
        let email = input
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty());
        let phone = input
            .phone
            .as_deref()
            .map(normalize_phone)
            .filter(|p| !p.is_empty() && p != "+");

        if let Some(ref e) = email {
            if !e.contains('@') || email_domain(e).is_none() {
                return Err(OutreachError::InvalidLead(format!(
                    "malformed email address '{e}'"
                )));
            }
        }

        let address = email
            .clone()
            .or_else(|| phone.clone())
            .ok_or_else(|| OutreachError::InvalidLead("lead has no email or phone".into()))?;

        Ok(Self {
            id: identity_hash(&address),
            campaign_id: campaign_id.to_string(),
            state: LeadState::New,
            email,
            phone,
            first_name: input.first_name,
            last_name: input.last_name,
            company: input.company,
            title: input.title,
            attributes: input.attributes,
            tags: input.tags.into_iter().map(|t| t.trim().to_lowercase()).collect(),
            sequence_index: 0,
            next_action_at: None,
            retry_count: 0,
            last_contacted_at: None,
            last_error: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Short form of the identity hash for logs and tables.
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }

    pub fn has_dnc_marker(&self) -> bool {
        DNC_TAGS.iter().any(|t| self.tags.contains(*t))
    }

    /// Address used to reach the lead on `channel`, if it has one.
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms => self.phone.as_deref(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.state.is_terminal() && self.next_action_at.is_some_and(|at| at <= now)
    }

    /// Template variables contributed by the lead. Attributes override the
    /// built-in profile fields when names collide.
    pub fn variables(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        let mut put = |k: &str, v: &Option<String>| {
            if let Some(v) = v {
                vars.insert(k.to_string(), v.clone());
            }
        };
        put("email", &self.email);
        put("phone", &self.phone);
        put("first_name", &self.first_name);
        put("last_name", &self.last_name);
        put("company", &self.company);
        put("title", &self.title);
        if let (Some(first), Some(last)) = (&self.first_name, &self.last_name) {
            vars.insert("full_name".to_string(), format!("{first} {last}"));
        }
        for (k, v) in &self.attributes {
            vars.insert(k.clone(), v.clone());
        }
        vars
    }

    /// Apply `event` through the state machine and record it in the history.
    pub fn apply(&mut self, event: LeadEvent, now: DateTime<Utc>) -> Result<LeadState> {
        let from = self.state;
        let to = state_machine::transition(from, event)?;
        self.state = to;
        self.history.push(StateChange {
            from,
            to,
            event,
            at: now,
        });
        if to.is_terminal() {
            self.next_action_at = None;
        }
        self.updated_at = now;
        Ok(to)
    }
}

// ---------------------------------------------------------------------------
// Import parsing
// ---------------------------------------------------------------------------

/// Parse a lead feed file. JSON arrays, JSON lines and YAML lists are accepted;
/// the format is chosen from the file extension.
pub fn parse_inputs(filename: &str, data: &str) -> Result<Vec<LeadInput>> {
    let lower = filename.to_lowercase();
    if lower.ends_with(".jsonl") || lower.ends_with(".ndjson") {
        let mut out = Vec::new();
        for line in data.lines().map(str::trim).filter(|l| !l.is_empty()) {
            out.push(serde_json::from_str(line)?);
        }
        Ok(out)
    } else if lower.ends_with(".json") {
        Ok(serde_json::from_str(data)?)
    } else {
        Ok(serde_yaml::from_str(data)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
