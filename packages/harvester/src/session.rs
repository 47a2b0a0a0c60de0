//! The harvest session: a transport handle bound to one credential set.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::Clock;
use crate::credentials::CredentialProvider;
use crate::error::Result;
use crate::http::{Connector, Transport};
use crate::types::{CredentialSet, RawResponse};

/// Transport and credentials that belong together.
///
/// Always constructed as a whole and swapped in as a whole.
struct SessionState {
    transport: Box<dyn Transport>,
    credentials: CredentialSet,
    acquired_at: DateTime<Utc>,
}

/// Owns the current transport handle and the credentials it was built with.
pub struct HarvestSession {
    provider: CredentialProvider,
    connector: Box<dyn Connector>,
    state: SessionState,
    renewals: u32,
}

impl HarvestSession {
    /// Perform the initial credential acquisition and build the first transport.
    pub fn establish(
        provider: CredentialProvider,
        connector: Box<dyn Connector>,
        target_url: &str,
    ) -> Result<Self> {
        let state = build_state(&provider, connector.as_ref(), target_url)?;
        Ok(Self {
            provider,
            connector,
            state,
            renewals: 0,
        })
    }

    /// Replace credentials and transport with freshly acquired ones.
    ///
    /// On failure the previous state is left untouched.
    pub fn renew(&mut self, target_url: &str) -> Result<()> {
        let state = build_state(&self.provider, self.connector.as_ref(), target_url)?;
        self.state = state;
        self.renewals += 1;
        Ok(())
    }

    /// Whether the credentials are at least `max_age` old at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match TimeDelta::from_std(max_age) {
            Ok(max_age) => now.signed_duration_since(self.state.acquired_at) >= max_age,
            // Longer than chrono can represent: never stale.
            Err(_) => false,
        }
    }

    /// Issue a GET request through the current transport.
    pub fn fetch(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<RawResponse> {
        self.state.transport.get(url, query, headers, timeout)
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.state.acquired_at
    }

    pub fn credentials(&self) -> &CredentialSet {
        &self.state.credentials
    }

    /// Number of renewals since the session was established.
    pub fn renewals(&self) -> u32 {
        self.renewals
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.provider.clock()
    }
}

fn build_state(
    provider: &CredentialProvider,
    connector: &dyn Connector,
    target_url: &str,
) -> Result<SessionState> {
    let acquisition = provider.acquire(target_url)?;
    let transport = connector.connect(&acquisition.credentials)?;
    Ok(SessionState {
        transport,
        credentials: acquisition.credentials,
        acquired_at: acquisition.acquired_at,
    })
}
