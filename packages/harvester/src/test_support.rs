//! In-memory stand-ins for the solver, transport, clock and output.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::credentials::{ChallengeSolver, CredentialProvider};
use crate::error::{HarvesterError, Result};
use crate::http::{Connector, Transport};
use crate::output::{Destinations, RowSink};
use crate::session::HarvestSession;
use crate::types::{Credential, CredentialSet, NormalizedRow, Partition, RawResponse};

/// Clock that only moves when slept on or advanced.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
    cancel_on_sleep: Mutex<Option<CancellationToken>>,
}

impl ManualClock {
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
            .single()
            .unwrap_or_default();
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
            cancel_on_sleep: Mutex::new(None),
        }
    }

    /// Cancel `token` the first time anything sleeps on this clock.
    pub fn cancel_on_sleep(&self, token: CancellationToken) {
        *self.cancel_on_sleep.lock().unwrap() = Some(token);
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += TimeDelta::from_std(duration).unwrap();
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
        if let Some(token) = self.cancel_on_sleep.lock().unwrap().take() {
            token.cancel();
        }
    }
}

/// Shared knobs for a [`StaticSolver`].
#[derive(Clone, Default)]
pub struct SolverControl {
    inner: Arc<Mutex<(u32, u32)>>,
}

impl SolverControl {
    /// Make the next `n` solves fail.
    pub fn fail_next(&self, n: u32) {
        self.inner.lock().unwrap().0 = n;
    }

    /// Number of solve calls so far, failed ones included.
    pub fn solves(&self) -> u32 {
        self.inner.lock().unwrap().1
    }
}

/// Solver returning the same credentials every time.
pub struct StaticSolver {
    credentials: Vec<Credential>,
    control: SolverControl,
}

impl StaticSolver {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self {
            credentials,
            control: SolverControl::default(),
        }
    }

    pub fn failures(&self) -> SolverControl {
        self.control.clone()
    }
}

impl ChallengeSolver for StaticSolver {
    fn solve(&self, target_url: &str) -> Result<CredentialSet> {
        let mut state = self.control.inner.lock().unwrap();
        state.1 += 1;
        if state.0 > 0 {
            state.0 -= 1;
            return Err(HarvesterError::AcquisitionFailure {
                target_url: target_url.to_string(),
                message: "scripted failure".to_string(),
            });
        }
        Ok(CredentialSet::new(self.credentials.clone()))
    }
}

/// One scripted transport reply.
pub enum Reply {
    Status(u16, String),
    TransportError,
}

/// 200 reply carrying `count` records whose names start with `prefix`.
pub fn page(prefix: &str, count: usize) -> Reply {
    let data: Vec<_> = (0..count)
        .map(|i| {
            json!({
                "linkDetalhamento": format!("/beneficios?municipio=33{i:05}"),
                "uf": "RJ",
                "nomeBeneficiario": format!("{prefix}-{i}"),
                "linguagemCidada": "Não",
                "nisBeneficio": format!("{i:011}"),
                "cpfBeneficiario": "***.000.000-**",
                "municipio": "RIO DE JANEIRO",
                "ano": 2021,
                "valor": "1.234,50",
                "skBeneficiario": i,
            })
        })
        .collect();
    Reply::Status(200, json!({ "data": data }).to_string())
}

pub fn empty_page() -> Reply {
    Reply::Status(200, r#"{"data":[]}"#.to_string())
}

pub fn status(code: u16) -> Reply {
    Reply::Status(code, String::new())
}

#[derive(Default)]
struct ConnectorState {
    replies: VecDeque<Reply>,
    offsets: Vec<String>,
    connections: u32,
    served: usize,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// Connector whose transports all pop from one shared reply script.
///
/// Once the script runs out every request gets an empty page.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl ScriptedConnector {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConnectorState {
                replies: replies.into(),
                ..ConnectorState::default()
            })),
        }
    }

    /// Offsets requested so far, in order.
    pub fn offsets(&self) -> Vec<String> {
        self.state.lock().unwrap().offsets.clone()
    }

    pub fn connections(&self) -> u32 {
        self.state.lock().unwrap().connections
    }

    /// Cancel `token` while serving request number `requests`, as if the
    /// operator stopped the run mid-request.
    pub fn cancel_after(&self, requests: usize, token: CancellationToken) {
        self.state.lock().unwrap().cancel_after = Some((requests, token));
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, _credentials: &CredentialSet) -> Result<Box<dyn Transport>> {
        self.state.lock().unwrap().connections += 1;
        Ok(Box::new(self.clone()))
    }
}

impl Transport for ScriptedConnector {
    fn get(
        &self,
        _url: &str,
        query: &[(String, String)],
        _headers: &[(String, String)],
        _timeout: Duration,
    ) -> Result<RawResponse> {
        let mut state = self.state.lock().unwrap();
        if let Some((_, offset)) = query.iter().find(|(k, _)| k == "offset") {
            state.offsets.push(offset.clone());
        }
        state.served += 1;
        if let Some((requests, token)) = &state.cancel_after {
            if state.served >= *requests {
                token.cancel();
            }
        }
        match state.replies.pop_front() {
            Some(Reply::Status(code, body)) => Ok(RawResponse::new(code, body)),
            Some(Reply::TransportError) => Err(HarvesterError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "scripted timeout",
            ))),
            None => Ok(RawResponse::new(200, r#"{"data":[]}"#)),
        }
    }
}

/// Destinations kept in memory, keyed by partition.
#[derive(Clone, Default)]
pub struct MemoryDestinations {
    rows: Arc<Mutex<HashMap<Partition, Vec<NormalizedRow>>>>,
    fail_after: Option<usize>,
}

impl MemoryDestinations {
    /// Destinations whose sinks reject any page that would take them past
    /// `rows` rows.
    pub fn failing_after(rows: usize) -> Self {
        Self {
            fail_after: Some(rows),
            ..Self::default()
        }
    }

    pub fn rows(&self, partition: &Partition) -> Vec<NormalizedRow> {
        self.rows
            .lock()
            .unwrap()
            .get(partition)
            .cloned()
            .unwrap_or_default()
    }
}

struct MemorySink {
    partition: Partition,
    rows: Arc<Mutex<HashMap<Partition, Vec<NormalizedRow>>>>,
    fail_after: Option<usize>,
}

impl RowSink for MemorySink {
    fn append_page(&mut self, page: &[NormalizedRow]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let entry = rows.entry(self.partition.clone()).or_default();
        if self
            .fail_after
            .is_some_and(|limit| entry.len() + page.len() > limit)
        {
            return Err(HarvesterError::Io(std::io::Error::other("disk full")));
        }
        entry.extend_from_slice(page);
        Ok(())
    }
}

impl Destinations for MemoryDestinations {
    fn open(&self, partition: &Partition) -> Result<Box<dyn RowSink>> {
        self.rows
            .lock()
            .unwrap()
            .insert(partition.clone(), Vec::new());
        Ok(Box::new(MemorySink {
            partition: partition.clone(),
            rows: self.rows.clone(),
            fail_after: self.fail_after,
        }))
    }
}

/// An established session over a scripted connector.
pub fn session_with(
    clock: Arc<ManualClock>,
    replies: Vec<Reply>,
) -> (HarvestSession, ScriptedConnector) {
    let connector = ScriptedConnector::new(replies);
    let solver = StaticSolver::new(vec![Credential::new("sid", "token", "portal.example")]);
    let provider = CredentialProvider::new(Box::new(solver), clock, "portal.example");
    let session = HarvestSession::establish(
        provider,
        Box::new(connector.clone()),
        "https://portal.example/challenge",
    )
    .unwrap();
    (session, connector)
}
