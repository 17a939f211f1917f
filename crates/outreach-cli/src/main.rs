mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    campaign::CampaignSubcommand, lead::LeadSubcommand, suppress::SuppressSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "outreach",
    about = "Campaign outreach orchestrator: schedule, dispatch and track multi-step lead contact",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .outreach/)
    #[arg(long, global = true, env = "OUTREACH_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize .outreach/ in the current directory
    Init,

    /// Manage campaign definitions
    Campaign {
        #[command(subcommand)]
        subcommand: CampaignSubcommand,
    },

    /// Import, inspect and signal leads
    Lead {
        #[command(subcommand)]
        subcommand: LeadSubcommand,
    },

    /// Manage the suppression list
    Suppress {
        #[command(subcommand)]
        subcommand: SuppressSubcommand,
    },

    /// Show the attempt ledger for a campaign
    Attempts {
        campaign: String,
        /// Only attempts with this status (queued, sent, failed, bounced)
        #[arg(long)]
        status: Option<String>,
    },

    /// Run one tick for a campaign
    RunTick { campaign: String },

    /// Run one tick for every campaign
    RunAll,

    /// Stop processing a campaign; lead and ledger state are kept
    Pause { campaign: String },

    /// Clear a campaign's pause flag
    Resume {
        campaign: String,
        /// Also clear the kill flag
        #[arg(long)]
        clear_kill: bool,
    },

    /// Emergency stop: no dispatch happens after the flag is seen
    Kill { campaign: String },

    /// Tick every campaign on an interval until interrupted
    Orchestrate {
        /// Seconds between passes (default: orchestrator.tick_interval_secs)
        #[arg(long)]
        tick_rate: Option<u64>,
    },

    /// Serve the HTTP API
    Serve {
        /// Port to listen on (0 = OS-assigned)
        #[arg(long, default_value = "7410")]
        port: u16,

        /// Also run the interval loop, ticking every N seconds
        #[arg(long)]
        tick_rate: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Orchestrate { .. } | Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Campaign { subcommand } => cmd::campaign::run(&root, subcommand, cli.json),
        Commands::Lead { subcommand } => cmd::lead::run(&root, subcommand, cli.json),
        Commands::Suppress { subcommand } => cmd::suppress::run(&root, subcommand, cli.json),
        Commands::Attempts { campaign, status } => {
            cmd::attempts::run(&root, &campaign, status.as_deref(), cli.json)
        }
        Commands::RunTick { campaign } => cmd::tick::run_tick(&root, &campaign, cli.json),
        Commands::RunAll => cmd::tick::run_all(&root, cli.json),
        Commands::Pause { campaign } => cmd::control::pause(&root, &campaign, cli.json),
        Commands::Resume {
            campaign,
            clear_kill,
        } => cmd::control::resume(&root, &campaign, clear_kill, cli.json),
        Commands::Kill { campaign } => cmd::control::kill(&root, &campaign, cli.json),
        Commands::Orchestrate { tick_rate } => cmd::orchestrate::run(&root, tick_rate),
        Commands::Serve { port, tick_rate } => cmd::serve::run(&root, port, tick_rate),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
