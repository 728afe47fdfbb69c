//! Subreddit-Harvest main entry point
//!
//! This is the command-line interface for the tiered community harvester.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use subreddit_harvest::config::{load_config_with_hash, Config, TraversalOrder};
use subreddit_harvest::crawler::run_harvest;
use subreddit_harvest::output::{
    generate_markdown_summary, generate_summary, load_statistics, print_statistics,
};
use subreddit_harvest::records::RecordType;
use subreddit_harvest::storage::{open_ledger, RunLedger};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Subreddit-Harvest: a tiered community crawler
///
/// Harvests communities, their newest submissions, the comment trees under
/// those submissions and optionally the authors, pacing itself against the
/// upstream quota and streaming everything into per-type CSV files.
#[derive(Parser, Debug)]
#[command(name = "harvest")]
#[command(version)]
#[command(about = "A tiered community harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the planned traversal without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics of the latest run from the ledger and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Write the markdown summary of the latest run and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Credentials may live in a .env file next to the config
    dotenvy::dotenv().ok();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else {
        handle_harvest(config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("subreddit_harvest=info,warn"),
            1 => EnvFilter::new("subreddit_harvest=debug,info"),
            2 => EnvFilter::new("subreddit_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: validates config and shows the planned traversal
fn handle_dry_run(config: &Config) {
    let harvest = &config.harvest;

    println!("=== Subreddit-Harvest Dry Run ===\n");

    println!("Traversal:");
    println!(
        "  Order: {}",
        match harvest.traversal_order {
            TraversalOrder::Breadth => "breadth (all communities before any comment tree)",
            TraversalOrder::Depth => "depth (one community at a time)",
        }
    );
    println!(
        "  Submissions per community: {}",
        harvest.submissions_per_community
    );
    println!("  Ordering: {}", harvest.submission_ordering);
    println!("  Time filter: {}", harvest.time_filter);
    println!(
        "  Comment expansion depth: {}",
        harvest.comment_expansion_depth
    );
    println!(
        "  Authors: {}",
        if harvest.fetch_authors {
            "fetched"
        } else {
            "skipped"
        }
    );

    println!("\nCommunities ({}):", harvest.communities.len());
    for (index, community) in harvest.communities.iter().enumerate() {
        println!("  {}. r/{}", index + 1, community);
    }

    println!("\nClient:");
    println!("  User agent: {}", config.client.user_agent);
    println!("  API base: {}", config.client.api_base);
    println!("  Max retries: {}", config.client.max_retries);
    println!("  Quota reserve: {}", config.governor.reserve);

    println!("\nOutput:");
    println!("  Data directory: {}", config.output.data_dir);
    for record_type in RecordType::ALL {
        println!(
            "    {}/{}/<run start>.csv",
            config.output.data_dir,
            record_type.as_str()
        );
    }
    println!("  Ledger: {}", config.output.ledger_path);
    if let Some(summary) = &config.output.summary_path {
        println!("  Summary: {}", summary);
    }

    let max_fetches = harvest.communities.len() as u64
        * (1 + u64::from(harvest.submissions_per_community));
    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would issue at most {} community and comment tree fetches",
        max_fetches
    );
}

/// Handles the --stats mode: shows statistics of the latest run
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Ledger: {}\n", config.output.ledger_path);

    let ledger = open_ledger(Path::new(&config.output.ledger_path))?;
    let Some(run) = ledger.get_latest_run()? else {
        println!("No harvest runs recorded.");
        return Ok(());
    };

    println!(
        "Run {} ({}), started {}\n",
        run.id,
        run.status.to_db_string(),
        run.started_at
    );
    let stats = load_statistics(&ledger, run.id)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-summary mode: writes the markdown summary
fn handle_export_summary(config: &Config) -> anyhow::Result<()> {
    let output = config
        .output
        .summary_path
        .as_deref()
        .context("summary-path is not set in the [output] section")?;

    println!("=== Exporting Harvest Summary ===\n");
    println!("Ledger: {}", config.output.ledger_path);
    println!("Output: {}", output);
    println!();

    let ledger = open_ledger(Path::new(&config.output.ledger_path))?;

    tracing::info!("Loading run data from ledger...");
    let summary = generate_summary(&ledger, None)?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, Path::new(output))
        .with_context(|| format!("failed to write {}", output))?;

    println!("✓ Summary exported to: {}", output);

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config, config_hash: &str) -> anyhow::Result<()> {
    tracing::info!(
        "Communities: {}, submissions per community: {}, ordering: {}",
        config.harvest.communities.len(),
        config.harvest.submissions_per_community,
        config.harvest.submission_ordering
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    match run_harvest(config, config_hash, cancel).await {
        Ok(stats) => {
            if stats.cancelled {
                tracing::warn!("Harvest interrupted; partial output was kept");
            } else {
                tracing::info!("Harvest completed successfully");
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Harvest failed: {}", e);
            Err(e.into())
        }
    }
}

/// Cancels the run on Ctrl+C or SIGTERM
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, finishing the current record");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, finishing the current record");
        },
    }

    cancel.cancel();
}
