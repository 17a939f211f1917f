//! Local delivery: every message becomes one JSON line in a file.
//!
//! Used for dry runs and for operators who hand the file to another system.
//! Write failures are reported as transient so the lead is retried.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use outreach_core::dispatch::{DispatchFailure, DispatchPort, DispatchResult, OutboundMessage};
use outreach_core::io::append_line;
use outreach_core::Result;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct OutboxDispatcher {
    path: PathBuf,
}

impl OutboxDispatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DispatchPort for OutboxDispatcher {
    async fn send(&self, message: &OutboundMessage) -> Result<DispatchResult> {
        let line = serde_json::to_string(message)?;
        let path = self.path.clone();
        let written = tokio::task::spawn_blocking(move || append_line(&path, &line)).await;
        let failure = match written {
            Ok(Ok(())) => {
                let id: String = message.idempotency_key.chars().take(16).collect();
                return Ok(DispatchResult::Delivered {
                    provider_message_id: Some(format!("outbox-{id}")),
                });
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("outbox writer panicked: {e}"),
        };
        warn!(path = %self.path.display(), error = %failure, "outbox write failed");
        Ok(DispatchResult::Failed(DispatchFailure::transient(failure)))
    }
}
