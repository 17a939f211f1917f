//! `outreach-channels`: concrete [`DispatchPort`] implementations.
//!
//! ```text
//! Config.channels
//!     │
//!     ▼
//! registry_from_config ─┬─ HttpDispatcher    ← JSON POST to a provider
//!                       └─ OutboxDispatcher  ← JSON line appended to a file
//!     │
//!     ▼
//! ChannelRegistry (outreach-core), keyed by Channel
//! ```
//!
//! Provider failures come back as [`DispatchResult::Failed`] with a transient
//! or permanent kind; only misconfiguration is an `Err`.
//!
//! [`DispatchPort`]: outreach_core::dispatch::DispatchPort
//! [`DispatchResult::Failed`]: outreach_core::dispatch::DispatchResult::Failed

pub mod http;
pub mod outbox;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use outreach_core::config::{ChannelBackend, Config};
use outreach_core::dispatch::{ChannelRegistry, DispatchPort};
use outreach_core::orchestrator::{Orchestrator, OutreachDb};
use outreach_core::paths;
use outreach_core::render::FileTemplateRenderer;
use outreach_core::{OutreachError, Result};

pub use http::HttpDispatcher;
pub use outbox::OutboxDispatcher;

/// Build one dispatcher per configured channel.
///
/// HTTP clients get the orchestrator's dispatch timeout. A bearer token
/// variable that is named but not set is an error here rather than a
/// failure on first send.
pub fn registry_from_config(root: &Path, config: &Config) -> Result<ChannelRegistry> {
    let timeout = config.orchestrator.dispatch_timeout();
    let mut registry = ChannelRegistry::new();
    for (channel, backend) in config.channel_backends() {
        let port = build_port(root, backend, timeout)?;
        tracing::debug!(%channel, ?backend, "dispatcher registered");
        registry.register(channel, port);
    }
    Ok(registry)
}

/// An orchestrator wired to the project's templates and configured channels.
pub fn orchestrator_for(root: &Path, db: Arc<OutreachDb>, config: &Config) -> Result<Orchestrator> {
    let channels = registry_from_config(root, config)?;
    Ok(Orchestrator::new(
        db,
        config.orchestrator.clone(),
        Arc::new(FileTemplateRenderer::for_root(root)),
        channels,
    ))
}

fn build_port(root: &Path, backend: &ChannelBackend, timeout: Duration) -> Result<Arc<dyn DispatchPort>> {
    match backend {
        ChannelBackend::Http {
            endpoint,
            token_env,
            from,
        } => {
            let token = match token_env {
                Some(var) => Some(std::env::var(var).map_err(|_| {
                    OutreachError::ChannelConfig(format!(
                        "environment variable {var} is not set (token for {endpoint})"
                    ))
                })?),
                None => None,
            };
            let dispatcher = HttpDispatcher::new(endpoint, token, from.clone(), timeout)?;
            Ok(Arc::new(dispatcher))
        }
        ChannelBackend::Outbox { path } => Ok(Arc::new(OutboxDispatcher::new(paths::resolve(root, path)))),
    }
}
