use std::path::PathBuf;
use std::sync::Arc;

use outreach_core::orchestrator::{Orchestrator, OutreachDb};

/// Shared state for every handler.
///
/// The database handle is opened once per process; redb refuses a second
/// open of the same file.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub db: Arc<OutreachDb>,
    /// Used by the tick endpoints. Its holder id is distinct from any
    /// background scheduler, so a manual tick on a campaign the scheduler
    /// owns reports `lease_held` instead of stealing the lease.
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(root: PathBuf, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            root,
            db: orchestrator.db().clone(),
            orchestrator,
        }
    }
}
