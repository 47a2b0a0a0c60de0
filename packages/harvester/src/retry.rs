//! Per-offset fetch, classification and retry.
//!
//! Every page request ends in exactly one [`PageOutcome`]. Blocked (403),
//! rate-limited (202) and transport failures are retried on the same offset
//! until the attempt budget runs out; everything else is final.

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::HarvestConfig;
use crate::error::{HarvesterError, Result};
use crate::session::HarvestSession;
use crate::types::{Partition, RawRecord, RawResponse, TerminalReason};

/// Classification of a single fetch.
#[derive(Debug)]
pub enum PageOutcome {
    /// 200 with records.
    Accepted(Vec<RawRecord>),
    /// 202: the server wants us to slow down.
    RateLimited,
    /// 403: the challenge credentials were rejected.
    Blocked,
    /// The partition is over (empty page, API error, other status).
    Terminated(TerminalReason),
    /// Timeout, connection failure or an undecodable body.
    TransportError(HarvesterError),
}

#[derive(Deserialize)]
struct PageBody {
    #[serde(default)]
    data: Option<Vec<RawRecord>>,
    #[serde(default)]
    error: Option<Value>,
}

/// Classify the result of one fetch.
pub fn classify(result: Result<RawResponse>) -> PageOutcome {
    let response = match result {
        Ok(response) => response,
        Err(e) => return PageOutcome::TransportError(e),
    };

    match response.status {
        200 => classify_body(&response.body),
        202 => PageOutcome::RateLimited,
        403 => PageOutcome::Blocked,
        other => PageOutcome::Terminated(TerminalReason::UnexpectedStatus(other)),
    }
}

fn classify_body(body: &str) -> PageOutcome {
    let page: PageBody = match serde_json::from_str(body) {
        Ok(page) => page,
        Err(e) => return PageOutcome::TransportError(e.into()),
    };

    if let Some(error) = page.error {
        let message = match error {
            Value::String(s) => s,
            other => other.to_string(),
        };
        return PageOutcome::Terminated(TerminalReason::ApiError(message));
    }

    match page.data {
        Some(records) if !records.is_empty() => PageOutcome::Accepted(records),
        _ => PageOutcome::Terminated(TerminalReason::Exhausted),
    }
}

/// Final result of fetching one offset.
#[derive(Debug)]
pub enum FetchOutcome {
    Accepted(Vec<RawRecord>),
    /// The partition must stop; includes abandonment and cancellation.
    Stop(TerminalReason),
}

/// Drives the attempts for one offset.
pub struct RetryController<'a> {
    config: &'a HarvestConfig,
    cancel: &'a CancellationToken,
}

impl<'a> RetryController<'a> {
    pub fn new(config: &'a HarvestConfig, cancel: &'a CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Fetch the page at `offset`, retrying recoverable failures.
    ///
    /// The attempt counter lives only for this call, so it starts at zero
    /// for every offset.
    ///
    /// # Arguments
    /// * `session` - Session to fetch through; renewed in place on 403,
    ///   transport errors and staleness
    /// * `partition` - Year and region of the page
    /// * `offset` - Record offset of the page
    ///
    /// # Returns
    /// The page's records, or the reason the partition has to stop
    pub fn fetch_page(
        &self,
        session: &mut HarvestSession,
        partition: &Partition,
        offset: u64,
    ) -> FetchOutcome {
        let query = self.config.page_query(partition, offset);
        let max_attempts = self.config.max_attempts;
        let mut attempts = 0;

        loop {
            if self.cancel.is_cancelled() {
                return FetchOutcome::Stop(TerminalReason::Cancelled);
            }

            self.renew_if_stale(session);

            tracing::info!(year = partition.year, offset, "requesting page");
            let result = session.fetch(
                &self.config.api_url,
                &query,
                &self.config.headers,
                self.config.request_timeout,
            );

            let failure = match classify(result) {
                PageOutcome::Accepted(records) => {
                    tracing::debug!(year = partition.year, offset, records = records.len(), "page accepted");
                    return FetchOutcome::Accepted(records);
                }
                PageOutcome::Terminated(reason) => {
                    tracing::info!(year = partition.year, offset, reason = %reason, "partition finished");
                    return FetchOutcome::Stop(reason);
                }
                PageOutcome::Blocked => {
                    tracing::warn!(year = partition.year, offset, "HTTP 403, renewing credentials");
                    self.renew_after_failure(session);
                    "HTTP 403".to_string()
                }
                PageOutcome::RateLimited => {
                    tracing::warn!(year = partition.year, offset, "HTTP 202, backing off");
                    "HTTP 202".to_string()
                }
                PageOutcome::TransportError(e) => {
                    tracing::warn!(
                        year = partition.year,
                        offset,
                        attempt = attempts + 1,
                        max_attempts,
                        error = %e,
                        "request failed, renewing credentials"
                    );
                    self.renew_after_failure(session);
                    e.to_string()
                }
            };

            attempts += 1;
            if attempts >= max_attempts {
                tracing::error!(
                    year = partition.year,
                    offset,
                    attempts,
                    last_failure = %failure,
                    "retry budget exhausted, abandoning partition"
                );
                return FetchOutcome::Stop(TerminalReason::Abandoned {
                    attempts,
                    last_failure: failure,
                });
            }

            if self.cancel.is_cancelled() {
                return FetchOutcome::Stop(TerminalReason::Cancelled);
            }
            session.clock().sleep(self.config.retry_delay);
        }
    }

    /// Time-driven renewal, independent of failures.
    fn renew_if_stale(&self, session: &mut HarvestSession) {
        let now = session.clock().now();
        if !session.is_stale(now, self.config.renewal_interval) {
            return;
        }

        tracing::info!(
            age_secs = (now - session.acquired_at()).num_seconds(),
            "credentials are stale, renewing"
        );
        if let Err(e) = session.renew(&self.config.challenge_url) {
            tracing::warn!(error = %e, "proactive renewal failed, keeping current credentials");
        }
    }

    /// Runs on the final failed attempt too; the fresh session then serves
    /// the next partition.
    fn renew_after_failure(&self, session: &mut HarvestSession) {
        if let Err(e) = session.renew(&self.config.challenge_url) {
            tracing::warn!(error = %e, "renewal failed, retrying with current credentials");
        }
    }
}
