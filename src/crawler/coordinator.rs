//! Harvest coordinator - main run orchestration logic
//!
//! This module wires the pieces of a run together:
//! - Registering the run in the ledger
//! - Pulling records from the scheduler and appending them to the sink
//! - Halting on the first persistence error
//! - Closing partitions and recording the outcome of the run

use crate::client::{RedditClient, ResourceClient};
use crate::config::Config;
use crate::crawler::governor::RateGovernor;
use crate::crawler::scheduler::Scheduler;
use crate::output::{
    generate_markdown_summary, generate_summary, PartitionStore, RecordSink, RunStatistics,
};
use crate::storage::{open_ledger, RunLedger, RunStatus};
use crate::HarvestError;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Records between progress log lines
const PROGRESS_INTERVAL: u64 = 100;

/// Main harvest coordinator structure
pub struct Coordinator<C: ResourceClient, S: RecordSink, L: RunLedger> {
    config: Config,
    scheduler: Scheduler<C>,
    sink: S,
    ledger: L,
    run_id: i64,
}

impl<C: ResourceClient, S: RecordSink, L: RunLedger> Coordinator<C, S, L> {
    /// Creates a new coordinator and registers the run in the ledger
    ///
    /// # Arguments
    ///
    /// * `config` - The harvest configuration
    /// * `client` - The resource client used for every fetch
    /// * `governor` - The rate governor, shared with the client when it meters requests
    /// * `sink` - Destination of the record stream
    /// * `ledger` - Run ledger
    /// * `cancel` - Token that stops the run when cancelled
    /// * `config_hash` - Hash of the configuration file, stored with the run
    /// * `run_started_at` - Unix timestamp of the run start
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(HarvestError)` - Failed to register the run
    pub fn new(
        config: Config,
        client: Arc<C>,
        governor: Arc<RateGovernor>,
        sink: S,
        mut ledger: L,
        cancel: CancellationToken,
        config_hash: &str,
        run_started_at: i64,
    ) -> Result<Self, HarvestError> {
        let run_id = ledger.create_run(config_hash)?;
        let scheduler = Scheduler::new(&config, client, governor, cancel, run_started_at);

        Ok(Self {
            config,
            scheduler,
            sink,
            ledger,
            run_id,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Runs the harvest until the frontier drains or the run is cancelled
    ///
    /// Every record is appended to the sink before the next one is pulled.
    /// Partitions are closed on every exit path.
    ///
    /// # Returns
    ///
    /// * `Ok(RunStatistics)` - The run finished or was cancelled cleanly
    /// * `Err(HarvestError)` - A record could not be persisted
    pub async fn run(&mut self) -> Result<RunStatistics, HarvestError> {
        info!(
            "Starting harvest run {} over {} communities",
            self.run_id,
            self.config.harvest.communities.len()
        );

        let start_time = Instant::now();
        let mut written = 0u64;

        while let Some(record) = self.scheduler.next_record().await {
            if let Err(e) = self.sink.append(&record) {
                error!("Halting run {}: {}", self.run_id, e);
                if let Err(close_err) = self.sink.close() {
                    warn!("Error closing partitions: {}", close_err);
                }
                self.record_outcome(RunStatus::Failed)?;
                return Err(e.into());
            }

            written += 1;
            if written % PROGRESS_INTERVAL == 0 {
                info!(
                    "Progress: {} records written, {} fetches pending, {:.2} records/sec",
                    written,
                    self.scheduler.frontier_size(),
                    written as f64 / start_time.elapsed().as_secs_f64()
                );
            }
        }

        let close_result = self.sink.close();
        let status = if close_result.is_err() {
            RunStatus::Failed
        } else if self.scheduler.statistics().cancelled {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        self.record_outcome(status)?;
        close_result?;

        let stats = self.scheduler.statistics().clone();
        info!(
            "Harvest run {} {}: {} records written, {} dropped, {} failed fetches in {:?}",
            self.run_id,
            status.to_db_string(),
            stats.total_emitted(),
            stats.total_dropped(),
            stats.failures.len(),
            start_time.elapsed()
        );

        self.write_summary();

        Ok(stats)
    }

    /// Stores statistics and partitions, then sets the terminal status
    fn record_outcome(&mut self, status: RunStatus) -> Result<(), HarvestError> {
        self.ledger
            .record_statistics(self.run_id, self.scheduler.statistics())?;
        self.ledger
            .record_partitions(self.run_id, &self.sink.partitions())?;
        self.ledger.finish_run(self.run_id, status)?;
        Ok(())
    }

    /// Writes the markdown summary when a summary path is configured
    fn write_summary(&self) {
        let Some(path) = self.config.output.summary_path.as_deref() else {
            return;
        };

        let result = generate_summary(&self.ledger, Some(self.run_id)).and_then(|summary| {
            generate_markdown_summary(&summary, Path::new(path)).map_err(HarvestError::from)
        });
        match result {
            Ok(()) => info!("Summary written to {}", path),
            Err(e) => warn!("Failed to write summary to {}: {}", path, e),
        }
    }
}

/// Runs a complete harvest against the live API
///
/// This function:
/// 1. Authenticates the client
/// 2. Opens the run ledger
/// 3. Creates the partition store for this run
/// 4. Drives the coordinator to completion or cancellation
///
/// # Arguments
///
/// * `config` - The validated harvest configuration
/// * `config_hash` - Hash of the configuration file
/// * `cancel` - Token cancelled on operator interrupt
///
/// # Returns
///
/// * `Ok(RunStatistics)` - The run finished or was cancelled cleanly
/// * `Err(HarvestError)` - Authentication, ledger or persistence failure
///
/// # Example
///
/// ```no_run
/// use subreddit_harvest::config::load_config_with_hash;
/// use subreddit_harvest::crawler::run_harvest;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// run_harvest(config, &hash, CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_harvest(
    config: Config,
    config_hash: &str,
    cancel: CancellationToken,
) -> Result<RunStatistics, HarvestError> {
    let governor = Arc::new(RateGovernor::new(&config.governor));
    let client = RedditClient::new(
        &config.client,
        &config.credentials,
        governor.clone(),
        cancel.clone(),
    )?;
    client.authenticate().await?;

    let ledger = open_ledger(Path::new(&config.output.ledger_path))?;
    let run_started_at = Utc::now().timestamp();
    let sink = PartitionStore::new(&config.output.data_dir, run_started_at);

    let mut coordinator = Coordinator::new(
        config,
        Arc::new(client),
        governor,
        sink,
        ledger,
        cancel,
        config_hash,
        run_started_at,
    )?;
    coordinator.run().await
}
