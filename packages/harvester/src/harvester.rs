//! Main harvester service that ties all components together.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::HarvestConfig;
use crate::credentials::{ChallengeSolver, CredentialProvider};
use crate::error::Result;
use crate::http::{Connector, ReqwestConnector};
use crate::output::{CsvDestinations, Destinations};
use crate::pagination::PaginationEngine;
use crate::session::HarvestSession;
use crate::types::{PartitionSummary, TerminalReason};

/// Exit code when a partition was abandoned or could not be written.
pub const EXIT_PARTIAL: i32 = 2;

/// Exit code when the operator cancelled the run.
pub const EXIT_CANCELLED: i32 = 130;

/// Per-partition outcomes of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestReport {
    pub partitions: Vec<PartitionSummary>,
}

impl HarvestReport {
    pub fn total_rows(&self) -> u64 {
        self.partitions.iter().map(|p| p.rows_written).sum()
    }

    pub fn was_cancelled(&self) -> bool {
        self.partitions
            .iter()
            .any(|p| p.reason == TerminalReason::Cancelled)
    }

    /// Partitions that ended in something other than a normal stop.
    pub fn failures(&self) -> impl Iterator<Item = &PartitionSummary> {
        self.partitions.iter().filter(|p| !p.reason.is_normal())
    }

    /// Process exit code for this report.
    pub fn exit_code(&self) -> i32 {
        if self.was_cancelled() {
            EXIT_CANCELLED
        } else if self.failures().next().is_some() {
            EXIT_PARTIAL
        } else {
            0
        }
    }
}

/// Harvest every configured partition, one after another.
///
/// Only the initial credential acquisition can fail the run: without a
/// session no partition can start. Every later failure is confined to the
/// partition it happened in.
///
/// # Arguments
/// * `config` - Validated before anything else runs
/// * `provider` - Solves the challenge for the initial and every renewed session
/// * `connector` - Builds a transport for each credential set
/// * `destinations` - Opens one output per partition
/// * `cancel` - Stops the run between requests
///
/// # Returns
/// One summary per configured partition, in order
pub fn harvest(
    config: &HarvestConfig,
    provider: CredentialProvider,
    connector: Box<dyn Connector>,
    destinations: &dyn Destinations,
    cancel: &CancellationToken,
) -> Result<HarvestReport> {
    config.validate()?;

    let mut session = HarvestSession::establish(provider, connector, &config.challenge_url)?;
    let engine = PaginationEngine::new(config, cancel);
    let mut report = HarvestReport::default();

    for partition in config.partitions() {
        if cancel.is_cancelled() {
            report.partitions.push(PartitionSummary {
                partition,
                rows_written: 0,
                pages_accepted: 0,
                final_offset: 0,
                renewals: 0,
                reason: TerminalReason::Cancelled,
            });
            continue;
        }

        tracing::info!(partition = %partition, "starting partition");
        report
            .partitions
            .push(engine.run(&partition, &mut session, destinations));
    }

    tracing::info!(
        partitions = report.partitions.len(),
        rows = report.total_rows(),
        renewals = session.renewals(),
        "harvest finished"
    );
    Ok(report)
}

/// Harvest with the real clock, `reqwest` transport and CSV output.
pub fn harvest_to_csv(
    config: &HarvestConfig,
    solver: Box<dyn ChallengeSolver>,
    cancel: &CancellationToken,
) -> Result<HarvestReport> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let provider = CredentialProvider::new(solver, clock, config.cookie_domain.clone());
    let destinations = CsvDestinations::new(config.output_dir.clone());
    harvest(
        config,
        provider,
        Box::new(ReqwestConnector),
        &destinations,
        cancel,
    )
}
