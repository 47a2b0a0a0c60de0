//! Offset pagination over a single partition.

use tokio_util::sync::CancellationToken;

use crate::config::HarvestConfig;
use crate::error::Result;
use crate::output::{Destinations, RowSink};
use crate::retry::{FetchOutcome, RetryController};
use crate::session::HarvestSession;
use crate::transform::transform_record;
use crate::types::{NormalizedRow, Partition, PartitionSummary, RawRecord, TerminalReason};

/// Walks one partition from offset 0 until a terminal outcome.
pub struct PaginationEngine<'a> {
    config: &'a HarvestConfig,
    cancel: &'a CancellationToken,
}

impl<'a> PaginationEngine<'a> {
    pub fn new(config: &'a HarvestConfig, cancel: &'a CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Harvest `partition` into a freshly opened destination.
    ///
    /// The session is renewed in place as needed and stays usable for the
    /// next partition.
    ///
    /// # Arguments
    /// * `partition` - Year and region to walk
    /// * `session` - Session shared with the other partitions
    /// * `destinations` - Where the partition's output is opened
    ///
    /// # Returns
    /// Summary of the partition; failures are folded into its terminal reason
    pub fn run(
        &self,
        partition: &Partition,
        session: &mut HarvestSession,
        destinations: &dyn Destinations,
    ) -> PartitionSummary {
        let renewals_before = session.renewals();
        let mut summary = PartitionSummary {
            partition: partition.clone(),
            rows_written: 0,
            pages_accepted: 0,
            final_offset: 0,
            renewals: 0,
            reason: TerminalReason::Exhausted,
        };

        let reason = match destinations.open(partition) {
            Ok(mut sink) => self.paginate(partition, session, sink.as_mut(), &mut summary),
            Err(e) => {
                tracing::error!(partition = %partition, error = %e, "cannot open output");
                TerminalReason::OutputFailed(e.to_string())
            }
        };
        summary.reason = reason;
        summary.renewals = session.renewals() - renewals_before;

        tracing::info!(
            partition = %partition,
            rows = summary.rows_written,
            pages = summary.pages_accepted,
            final_offset = summary.final_offset,
            reason = %summary.reason,
            "partition done"
        );
        summary
    }

    fn paginate(
        &self,
        partition: &Partition,
        session: &mut HarvestSession,
        sink: &mut dyn RowSink,
        summary: &mut PartitionSummary,
    ) -> TerminalReason {
        let controller = RetryController::new(self.config, self.cancel);
        let mut offset = 0;

        loop {
            summary.final_offset = offset;
            if self.cancel.is_cancelled() {
                return TerminalReason::Cancelled;
            }

            let records = match controller.fetch_page(session, partition, offset) {
                FetchOutcome::Accepted(records) => records,
                FetchOutcome::Stop(reason) => return reason,
            };

            match write_page(sink, &records) {
                Ok(written) => summary.rows_written += written as u64,
                Err(e) => {
                    tracing::error!(partition = %partition, offset, error = %e, "writing rows failed");
                    return TerminalReason::OutputFailed(e.to_string());
                }
            }
            summary.pages_accepted += 1;
            offset += self.config.page_size;

            if self.cancel.is_cancelled() {
                summary.final_offset = offset;
                return TerminalReason::Cancelled;
            }
            session.clock().sleep(self.config.request_interval);
        }
    }
}

/// Transform one accepted page and hand it to the sink as a unit.
fn write_page(sink: &mut dyn RowSink, records: &[RawRecord]) -> Result<usize> {
    let rows: Vec<NormalizedRow> = records.iter().map(transform_record).collect();
    sink.append_page(&rows)?;
    Ok(rows.len())
}
