//! RoleSync entry point.
//!
//! Loads configuration, initializes logging and the two API clients, runs a
//! single reconciliation pass, and exits. Scheduling is left to cron or a
//! systemd timer.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter};

use rolesync_core::config::AppConfig;
use rolesync_core::discord::{DiscordClient, GuildPlatform};
use rolesync_core::models::RunReport;
use rolesync_core::reconciler::Reconciler;
use rolesync_core::sheets::SheetsClient;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// Reconcile Discord guild roles against Google Sheets rows.
#[derive(Parser, Debug)]
#[command(
    name = "rolesync",
    version,
    about = "Reconcile Discord guild roles against Google Sheets rows"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Log the planned changes without applying them.
    #[arg(long)]
    dry_run: bool,
}

/// Exit status when the run finished but some members could not be updated.
const EXIT_PARTIAL_FAILURE: u8 = 2;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing before the config is read so load errors are
    // logged; the config's level is swapped in once it is known.
    let bootstrap_level = args.log_level.as_deref().unwrap_or("info");
    let (filter, filter_handle) = reload::Layer::new(env_filter(bootstrap_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false),
        )
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("startup failed: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.run.log_level.clone());
    if let Err(e) = filter_handle.reload(env_filter(&log_level)) {
        warn!(error = %e, "could not apply configured log level");
    }

    match run(&args, config, &log_level).await {
        Ok(report) if report.has_failures() => {
            warn!(
                failed = report.failures.len(),
                "run finished with member failures"
            );
            ExitCode::from(EXIT_PARTIAL_FAILURE)
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("run failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Load, resolve, and validate the config file, applying CLI overrides.
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load_and_resolve(&args.config)
        .with_context(|| format!("failed to load configuration from {}", args.config.display()))?;
    if args.dry_run {
        config.run.dry_run = true;
    }
    Ok(config)
}

async fn run(args: &Args, config: AppConfig, log_level: &str) -> Result<RunReport> {
    // Clients
    let sheets = SheetsClient::new(
        &config.sheets.api_url,
        config.sheets.api_key.as_deref().unwrap_or_default(),
        Duration::from_secs(config.sheets.request_timeout_secs),
    )
    .context("failed to build Sheets client")?;
    let discord = DiscordClient::new(
        &config.discord.api_url,
        config.discord.token.as_deref().unwrap_or_default(),
        Duration::from_secs(config.discord.request_timeout_secs),
    )
    .context("failed to build Discord client")?;
    let platform = GuildPlatform::connect(discord, config.discord.guild_id.as_deref())
        .await
        .context("failed to bind to a Discord guild")?;

    // Startup banner
    info!("========================================");
    info!("  RoleSync v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file       : {}", args.config.display());
    info!("Builders sheet    : {}", config.sheets.builders_spreadsheet_id);
    info!("Builders range    : {}", config.sheets.builders_range);
    info!("Others sheet      : {}", config.sheets.others_spreadsheet_id);
    info!("Others range      : {}", config.sheets.others_range);
    info!("Coworkers range   : {}", config.sheets.coworkers_range);
    info!("Banned range      : {}", config.sheets.banned_range);
    info!("Builder role      : {}", config.roles.builder_role);
    info!("Server            : {} ({})", platform.guild_name(), platform.guild_id());
    info!("Dry run           : {}", config.run.dry_run);
    info!("Log level         : {}", log_level);
    info!("========================================");

    let reconciler = Reconciler::new(config, sheets, platform);
    let report = reconciler.run().await.context("reconciliation failed")?;

    info!("Done");
    Ok(report)
}
