//! Long-running interval loop.
//!
//! Unlike `Orchestrator::run_tick`, which takes and gives back the lease
//! around every tick, the scheduler keeps one lease per campaign across ticks
//! and renews it as it goes. All held leases are released on shutdown.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::error::{OutreachError, Result};

use super::lease::Lease;
use super::tick::{Orchestrator, RunAllSummary, TickOutcome, TickSummary};

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    leases: HashMap<String, Lease>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            leases: HashMap::new(),
        }
    }

    /// Campaign ids this scheduler currently holds a lease for.
    pub fn held(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.leases.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// One pass over every campaign.
    pub async fn run_once(&mut self) -> Result<RunAllSummary> {
        let mut out = RunAllSummary::default();
        for campaign in self.orchestrator.db().list_campaigns()? {
            match self.tick_campaign(&campaign.id).await {
                Ok(summary) => out.push(summary),
                Err(e) => {
                    error!(campaign_id = %campaign.id, error = %e, "tick failed");
                    out.push_error(&campaign.id, &e);
                }
            }
        }
        Ok(out)
    }

    async fn tick_campaign(&mut self, campaign_id: &str) -> Result<TickSummary> {
        let leases = self.orchestrator.leases();
        let mut lease = match self.leases.remove(campaign_id) {
            Some(mut held) => match leases.renew(&mut held) {
                Ok(()) => held,
                Err(OutreachError::LeaseLost(_)) => {
                    warn!(campaign_id, fence = held.fence, "held lease lost; re-acquiring");
                    match self.acquire(campaign_id)? {
                        Some(l) => l,
                        None => return self.held_elsewhere(campaign_id),
                    }
                }
                Err(e) => return Err(e),
            },
            None => match self.acquire(campaign_id)? {
                Some(l) => l,
                None => return self.held_elsewhere(campaign_id),
            },
        };

        let summary = self.orchestrator.tick(&mut lease).await?;
        match summary.outcome {
            TickOutcome::Killed | TickOutcome::LeaseLost => {}
            _ => {
                self.leases.insert(campaign_id.to_string(), lease);
            }
        }
        Ok(summary)
    }

    fn acquire(&self, campaign_id: &str) -> Result<Option<Lease>> {
        match self
            .orchestrator
            .leases()
            .acquire(campaign_id, self.orchestrator.holder_id())
        {
            Ok(l) => Ok(Some(l)),
            Err(OutreachError::AlreadyHeld { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn held_elsewhere(&self, campaign_id: &str) -> Result<TickSummary> {
        let current = self.orchestrator.db().lease(campaign_id)?;
        let now = self.orchestrator.now();
        let mut summary = TickSummary::empty(campaign_id, now);
        if let Some(l) = current {
            summary.outcome = TickOutcome::LeaseHeld {
                holder: l.holder_id,
                expires_at: l.expires_at,
            };
        }
        Ok(summary)
    }

    /// Tick every `interval` until `shutdown` resolves, then release all
    /// leases.
    pub async fn run(&mut self, interval: Duration, shutdown: impl Future<Output = ()>) -> Result<()> {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(holder_id = %self.orchestrator.holder_id(), interval_secs = interval.as_secs(), "scheduler started");
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = timer.tick() => {
                    match self.run_once().await {
                        Ok(summary) => {
                            if !summary.errors.is_empty() {
                                warn!(errors = summary.errors.len(), "scheduler pass finished with errors");
                            }
                        }
                        Err(e) => error!(error = %e, "scheduler pass failed"),
                    }
                }
            }
        }
        self.shutdown();
        Ok(())
    }

    /// Release every held lease.
    pub fn shutdown(&mut self) {
        let leases = self.orchestrator.leases();
        for (campaign_id, lease) in self.leases.drain() {
            match leases.release(&lease) {
                Ok(true) => info!(campaign_id = %campaign_id, "lease released on shutdown"),
                Ok(false) => {}
                Err(e) => warn!(campaign_id = %campaign_id, error = %e, "failed to release lease"),
            }
        }
    }
}
