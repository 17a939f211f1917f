pub mod attempts;
pub mod campaign;
pub mod control;
pub mod init;
pub mod lead;
pub mod orchestrate;
pub mod serve;
pub mod suppress;
pub mod tick;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use outreach_core::config::{Config, WarnLevel};
use outreach_core::orchestrator::{Orchestrator, OutreachDb};
use outreach_core::{paths, OutreachError};

/// Load `.outreach/config.yaml`, logging any validation warnings.
pub fn load_config(root: &Path) -> anyhow::Result<Config> {
    let config = Config::load(root).context("failed to load .outreach/config.yaml")?;
    for w in config.validate() {
        match w.level {
            WarnLevel::Error => tracing::error!("config: {}", w.message),
            WarnLevel::Warning => tracing::warn!("config: {}", w.message),
        }
    }
    Ok(config)
}

/// Open the project database. The project must have been initialized.
pub fn open_db(root: &Path) -> anyhow::Result<Arc<OutreachDb>> {
    if !paths::config_path(root).exists() {
        return Err(OutreachError::NotInitialized.into());
    }
    let path = paths::db_path(root);
    let db = OutreachDb::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(Arc::new(db))
}

/// An orchestrator wired to the configured channels and templates.
pub fn orchestrator(root: &Path, db: Arc<OutreachDb>, config: &Config) -> anyhow::Result<Orchestrator> {
    outreach_channels::orchestrator_for(root, db, config)
        .context("failed to configure dispatch channels")
}
