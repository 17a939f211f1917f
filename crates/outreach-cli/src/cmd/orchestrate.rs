use outreach_core::orchestrator::Scheduler;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{load_config, open_db, orchestrator};

pub fn run(root: &Path, tick_rate: Option<u64>) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let db = open_db(root)?;
    let orch = Arc::new(orchestrator(root, db, &config)?);
    let interval = tick_rate
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.orchestrator.tick_interval());
    if interval.is_zero() {
        anyhow::bail!("--tick-rate must be at least 1 second");
    }

    println!(
        "Orchestrating every {}s as {} (Ctrl-C to stop)",
        interval.as_secs(),
        orch.holder_id()
    );
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let mut scheduler = Scheduler::new(orch);
        scheduler.run(interval, shutdown_signal()).await
    })?;
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed, never resolves.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
