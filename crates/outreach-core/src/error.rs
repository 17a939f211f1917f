use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutreachError {
    #[error("not initialized: run 'outreach init'")]
    NotInitialized,

    #[error("campaign not found: {0}")]
    CampaignNotFound(String),

    #[error("campaign already exists: {0}")]
    CampaignExists(String),

    #[error("invalid campaign '{campaign}': {reason}")]
    InvalidCampaign { campaign: String, reason: String },

    #[error("campaign '{campaign}' step {index} is referenced by attempts and cannot change")]
    StepImmutable { campaign: String, index: usize },

    #[error("campaign '{0}' is killed; resume with --clear-kill to re-enable it")]
    CampaignKilled(String),

    #[error("lead not found: {lead} in campaign {campaign}")]
    LeadNotFound { campaign: String, lead: String },

    #[error("invalid lead: {0}")]
    InvalidLead(String),

    #[error("invalid slug '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSlug(String),

    #[error("invalid transition from {from} on '{event}'")]
    InvalidTransition { from: String, event: String },

    #[error("invalid lead state: {0}")]
    InvalidState(String),

    #[error("invalid channel: {0}")]
    InvalidChannel(String),

    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("invalid suppression entry: {0}")]
    InvalidSuppression(String),

    #[error("no dispatcher configured for channel '{0}'")]
    ChannelNotConfigured(String),

    #[error("channel configuration error: {0}")]
    ChannelConfig(String),

    #[error("lease for campaign '{campaign}' is held by {holder} until {expires_at}")]
    AlreadyHeld {
        campaign: String,
        holder: String,
        expires_at: DateTime<Utc>,
    },

    #[error("lease for campaign '{0}' was lost")]
    LeaseLost(String),

    #[error("attempt not found: {0}")]
    AttemptNotFound(String),

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OutreachError>;
