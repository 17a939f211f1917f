//! Global do-not-contact list.
//!
//! Entries are stored under `"<kind>:<normalized value>"`. A lead matches when
//! any of its candidate keys is present; the tick loop checks this before
//! every dispatch.

use crate::error::{OutreachError, Result};
use crate::lead::{email_domain, normalize_email, normalize_phone, Lead};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionKind {
    Email,
    Domain,
    Phone,
    /// Lead identity hash.
    Identity,
}

impl SuppressionKind {
    pub fn all() -> &'static [SuppressionKind] {
        &[
            SuppressionKind::Email,
            SuppressionKind::Domain,
            SuppressionKind::Phone,
            SuppressionKind::Identity,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SuppressionKind::Email => "email",
            SuppressionKind::Domain => "domain",
            SuppressionKind::Phone => "phone",
            SuppressionKind::Identity => "identity",
        }
    }

    /// Normalize a raw value the same way lead identity is normalized.
    pub fn normalize(self, raw: &str) -> Result<String> {
        let value = match self {
            SuppressionKind::Email => {
                let e = normalize_email(raw);
                if email_domain(&e).is_none() {
                    return Err(OutreachError::InvalidSuppression(format!(
                        "'{raw}' is not an email address"
                    )));
                }
                e
            }
            SuppressionKind::Domain => raw.trim().trim_start_matches('@').to_lowercase(),
            SuppressionKind::Phone => normalize_phone(raw),
            SuppressionKind::Identity => raw.trim().to_lowercase(),
        };
        if value.is_empty() || value == "+" {
            return Err(OutreachError::InvalidSuppression(format!(
                "empty {} value",
                self.as_str()
            )));
        }
        Ok(value)
    }
}

impl fmt::Display for SuppressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SuppressionKind {
    type Err = OutreachError;

    fn from_str(s: &str) -> Result<Self> {
        SuppressionKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| OutreachError::InvalidSuppression(format!("unknown kind '{s}'")))
    }
}

pub fn suppression_key(kind: SuppressionKind, value: &str) -> String {
    format!("{}:{}", kind.as_str(), value)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionEntry {
    pub kind: SuppressionKind,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SuppressionEntry {
    pub fn new(
        kind: SuppressionKind,
        raw_value: &str,
        reason: Option<String>,
        source: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            value: kind.normalize(raw_value)?,
            kind,
            reason,
            source,
            created_at: now,
        })
    }

    pub fn key(&self) -> String {
        suppression_key(self.kind, &self.value)
    }
}

/// Every suppression key that would block `lead`, most specific first.
pub fn candidate_keys(lead: &Lead) -> Vec<String> {
    let mut keys = vec![suppression_key(SuppressionKind::Identity, &lead.id)];
    if let Some(email) = &lead.email {
        keys.push(suppression_key(SuppressionKind::Email, email));
        if let Some(domain) = email_domain(email) {
            keys.push(suppression_key(SuppressionKind::Domain, domain));
        }
    }
    if let Some(phone) = &lead.phone {
        keys.push(suppression_key(SuppressionKind::Phone, phone));
    }
    keys
}
