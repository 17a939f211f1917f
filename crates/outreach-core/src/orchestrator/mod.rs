//! Tick-driven campaign orchestrator.
//!
//! `db` is the redb data layer, `lease` the per-campaign single-writer lease,
//! `tick` the batch loop that moves due leads through their sequence, and
//! `scheduler` the interval loop that keeps leases across ticks. `control`
//! holds the operator commands that run outside any tick.

pub mod control;
pub mod db;
pub mod lease;
pub mod scheduler;
pub mod tick;


pub use control::{CampaignStatus, ImportSummary};
pub use db::{OutreachDb, WriteTxn};
pub use lease::{Lease, LeaseManager};
pub use scheduler::Scheduler;
pub use tick::{Orchestrator, RunAllSummary, TickCounts, TickOutcome, TickSummary};
