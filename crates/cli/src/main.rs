//! Edge Plugin Profiler CLI
//!
//! A command-line tool for listing plugin executions on a fleet node,
//! building their resource profiles, and bulk-downloading raw telemetry.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{download, jobs, profile, Context};
use profiler_lib::telemetry::DownloadKind;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Edge Plugin Profiler CLI
#[derive(Parser)]
#[command(name = "edgeprof")]
#[command(author, version, about = "CLI for Edge Plugin Profiler", long_about = None)]
pub struct Cli {
    /// Telemetry query endpoint (overrides config and EDGEPROF_API_URL)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Root directory of the query cache (default: ~/.waggle)
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Always query the telemetry API, never the cache
    #[arg(long)]
    pub no_cache: bool,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List plugin executions of a node
    Jobs {
        /// Node VSN, e.g. W023
        #[arg(long)]
        vsn: String,

        /// Range start (ISO-8601 or relative, e.g. 2h, 7d)
        #[arg(long)]
        start: String,

        /// Range end (default: now)
        #[arg(long)]
        end: Option<String>,

        /// Write execution records to this file (.csv or .json)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Build resource profiles for plugin executions
    Profile {
        /// Node VSN, e.g. W023
        #[arg(long)]
        vsn: String,

        /// Range start (ISO-8601 or relative, e.g. 2h, 7d)
        #[arg(long)]
        start: String,

        /// Range end (default: now)
        #[arg(long)]
        end: Option<String>,

        /// Only profile executions of this plugin
        #[arg(long, short)]
        plugin: Option<String>,

        /// Write profile rows to this file (.csv or .json)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Write batch counters in Prometheus text format to this file
        #[arg(long)]
        metrics_file: Option<PathBuf>,
    },

    /// Download raw telemetry one day at a time
    Download {
        /// Node VSN, e.g. W023
        #[arg(long)]
        vsn: String,

        /// What to download (job, perf)
        #[arg(long)]
        kind: DownloadKind,

        /// Range start (ISO-8601 or relative, e.g. 2h, 7d)
        #[arg(long)]
        start: String,

        /// Range end (default: now)
        #[arg(long)]
        end: Option<String>,

        /// Output file path (.csv or .json)
        #[arg(long, short)]
        output: PathBuf,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    // Flags override the config file and environment
    let mut config = config::Config::load()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if let Some(cache_dir) = cli.cache_dir {
        config.cache_root = Some(cache_dir);
    }

    debug!(
        api_url = %config.api_url,
        cache = !cli.no_cache,
        window_padding_secs = config.window_padding_secs,
        "Resolved configuration"
    );

    let ctx = Context::new(config, !cli.no_cache, cli.format)?;

    match cli.command {
        Commands::Jobs {
            vsn,
            start,
            end,
            output,
        } => {
            jobs::list_jobs(&ctx, &vsn, &start, end.as_deref(), output.as_deref()).await?;
        }
        Commands::Profile {
            vsn,
            start,
            end,
            plugin,
            output,
            metrics_file,
        } => {
            profile::build_profiles(
                &ctx,
                profile::ProfileArgs {
                    vsn: &vsn,
                    start: &start,
                    end: end.as_deref(),
                    plugin: plugin.as_deref(),
                    output: output.as_deref(),
                    metrics_file: metrics_file.as_deref(),
                },
            )
            .await?;
        }
        Commands::Download {
            vsn,
            kind,
            start,
            end,
            output,
        } => {
            download::download(&ctx, &vsn, kind, &start, end.as_deref(), &output).await?;
        }
    }

    Ok(())
}
