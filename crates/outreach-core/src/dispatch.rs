//! Dispatch port: the boundary where a message leaves the system.
//!
//! A provider rejecting or failing a message is a normal
//! [`DispatchResult::Failed`]; `Err` is reserved for misconfiguration and
//! aborts the tick.

use crate::error::{OutreachError, Result};
use crate::types::{Channel, FailureKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub idempotency_key: String,
    pub campaign_id: String,
    pub lead_id: String,
    pub channel: Channel,
    /// Email address or phone number.
    pub recipient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFailure {
    /// `Transient` or `Permanent`.
    pub kind: FailureKind,
    pub message: String,
}

impl DispatchFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Delivered { provider_message_id: Option<String> },
    Failed(DispatchFailure),
}

#[async_trait]
pub trait DispatchPort: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<DispatchResult>;
}

/// Dispatchers keyed by the channel they deliver on.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    ports: HashMap<Channel, Arc<dyn DispatchPort>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, channel: Channel, port: Arc<dyn DispatchPort>) -> &mut Self {
        self.ports.insert(channel, port);
        self
    }

    pub fn with(mut self, channel: Channel, port: Arc<dyn DispatchPort>) -> Self {
        self.register(channel, port);
        self
    }

    pub fn get(&self, channel: Channel) -> Result<Arc<dyn DispatchPort>> {
        self.ports
            .get(&channel)
            .cloned()
            .ok_or_else(|| OutreachError::ChannelNotConfigured(channel.to_string()))
    }

    pub fn channels(&self) -> Vec<Channel> {
        let mut c: Vec<Channel> = self.ports.keys().copied().collect();
        c.sort();
        c
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}
