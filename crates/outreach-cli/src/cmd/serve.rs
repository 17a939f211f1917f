use outreach_core::orchestrator::Scheduler;
use outreach_server::AppState;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::orchestrate::shutdown_signal;
use super::{load_config, open_db, orchestrator};

/// Serve the HTTP API, optionally with the interval loop in the same process.
///
/// The API and the loop get separate orchestrators over the one database
/// handle, so each has its own lease holder id.
pub fn run(root: &Path, port: u16, tick_rate: Option<u64>) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let db = open_db(root)?;
    let api = Arc::new(orchestrator(root, db.clone(), &config)?);
    let state = AppState::new(root.to_path_buf(), api);

    let scheduler = match tick_rate {
        Some(0) => anyhow::bail!("--tick-rate must be at least 1 second"),
        Some(secs) => Some((
            Scheduler::new(Arc::new(orchestrator(root, db, &config)?)),
            Duration::from_secs(secs),
        )),
        None => None,
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual_port = listener.local_addr()?.port();
        println!("outreach API → http://localhost:{actual_port}");

        let server = outreach_server::serve_on(state, listener, shutdown_signal());
        match scheduler {
            Some((mut scheduler, interval)) => {
                let (served, ticked) =
                    tokio::join!(server, scheduler.run(interval, shutdown_signal()));
                served?;
                ticked?;
            }
            None => server.await?,
        }
        Ok(())
    })
}
