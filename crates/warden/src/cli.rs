use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Warden - admission control and lifecycle hooks for agent invocations", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new config file
    Init {
        /// Path for new config file
        #[arg(default_value = "warden.toml")]
        path: PathBuf,
    },
    /// Print configured budgets and rate limits as JSON
    Status {
        /// Only show budgets for this scope ("global" or "agent:<id>")
        #[arg(long)]
        scope: Option<String>,
    },
    /// Ask for a single admission decision
    Admit {
        #[arg(long, default_value = "global")]
        scope: String,
        /// Estimated tokens for the invocation
        #[arg(long, default_value = "0")]
        tokens: f64,
        /// Estimated cost for the invocation
        #[arg(long, default_value = "0")]
        cost: f64,
    },
    /// Drive simulated invocations through the control plane
    Simulate {
        #[arg(long, default_value = "global")]
        scope: String,
        /// Tool name reported to hooks and telemetry
        #[arg(long, default_value = "echo")]
        target: String,
        /// Number of invocations to attempt
        #[arg(long, default_value = "20")]
        calls: u32,
        /// Tokens each invocation consumes
        #[arg(long, default_value = "100")]
        tokens: u64,
        /// Cost each invocation consumes
        #[arg(long, default_value = "0.01")]
        cost: f64,
        /// Pause between invocations
        #[arg(long, default_value = "0")]
        interval_ms: u64,
    },
}
