//! Credential acquisition through an external challenge solver.
//!
//! How the challenge is actually defeated is not this crate's business:
//! a [`ChallengeSolver`] is handed the challenge page URL and returns the
//! session cookies that prove the challenge was passed.

use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::error::{HarvesterError, Result};
use crate::types::{Credential, CredentialSet};

/// Capability that solves the anti-bot challenge for a target URL.
///
/// Implementations block until the challenge has resolved, which may take
/// tens of seconds.
pub trait ChallengeSolver: Send {
    fn solve(&self, target_url: &str) -> Result<CredentialSet>;
}

/// Solver that delegates to an external program.
///
/// The program is invoked as `<program> <args...> <target_url> <dwell_secs>`
/// and must print the resulting cookies to stdout as a JSON array of
/// `{"name", "value", "domain"}` objects, the format browsers and
/// automation drivers export cookies in. Extra keys are ignored.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    program: String,
    args: Vec<String>,
    dwell: Duration,
}

impl CommandSolver {
    pub fn new(program: impl Into<String>, args: Vec<String>, dwell: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            dwell,
        }
    }

    /// Build a solver from a whitespace-separated command line.
    pub fn from_command_line(command_line: &str, dwell: Duration) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(String::from);
        let program = parts.next().ok_or_else(|| {
            HarvesterError::InvalidConfig("challenge solver command is empty".to_string())
        })?;
        Ok(Self::new(program, parts.collect(), dwell))
    }
}

impl ChallengeSolver for CommandSolver {
    fn solve(&self, target_url: &str) -> Result<CredentialSet> {
        let failure = |message: String| HarvesterError::AcquisitionFailure {
            target_url: target_url.to_string(),
            message,
        };

        tracing::debug!(program = %self.program, target_url, "running challenge solver");

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(target_url)
            .arg(self.dwell.as_secs().to_string())
            .output()
            .map_err(|e| failure(format!("cannot run '{}': {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failure(format!(
                "solver exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let credentials: Vec<Credential> = serde_json::from_slice(&output.stdout)
            .map_err(|e| failure(format!("solver output is not a cookie list: {e}")))?;

        Ok(CredentialSet::new(credentials))
    }
}

/// A credential set together with the moment it was obtained.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub credentials: CredentialSet,
    pub acquired_at: DateTime<Utc>,
}

/// Wraps the challenge solver and timestamps every acquisition.
///
/// Performs no retries; a solver failure is returned to the caller.
pub struct CredentialProvider {
    solver: Box<dyn ChallengeSolver>,
    clock: Arc<dyn Clock>,
    fallback_domain: String,
}

impl CredentialProvider {
    pub fn new(
        solver: Box<dyn ChallengeSolver>,
        clock: Arc<dyn Clock>,
        fallback_domain: impl Into<String>,
    ) -> Self {
        Self {
            solver,
            clock,
            fallback_domain: fallback_domain.into(),
        }
    }

    /// Solve the challenge at `target_url` and return fresh credentials.
    pub fn acquire(&self, target_url: &str) -> Result<Acquisition> {
        tracing::info!(target_url, "solving challenge for fresh credentials");

        let credentials = self
            .solver
            .solve(target_url)?
            .with_fallback_domain(&self.fallback_domain);
        let acquired_at = self.clock.now();

        tracing::info!(cookies = credentials.len(), "credentials acquired");
        Ok(Acquisition {
            credentials,
            acquired_at,
        })
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
