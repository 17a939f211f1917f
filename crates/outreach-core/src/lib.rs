pub mod backoff;
pub mod campaign;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod io;
pub mod lead;
pub mod ledger;
pub mod orchestrator;
pub mod paths;
pub mod policy;
pub mod render;
pub mod signal;
pub mod state_machine;
pub mod suppression;
pub mod types;

pub use error::{OutreachError, Result};
