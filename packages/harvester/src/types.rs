//! Core data types for the harvester.
//!
//! These types represent the beneficiary records of the Portal da
//! Transparência, the harvesting units they are fetched in, and the
//! session tokens needed to get past the portal's challenge.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One raw beneficiary-year entry as received from the API.
///
/// Loosely typed: any key may be missing and values may be strings,
/// numbers or null.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A normalized output row.
///
/// Field order is the output column order. Serialized names are the
/// column headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRow {
    /// Region (state) code, e.g. "RJ".
    #[serde(rename = "uf")]
    pub region_code: String,

    /// Municipality name.
    #[serde(rename = "municipio")]
    pub municipality: String,

    /// Reference year.
    #[serde(rename = "ano")]
    pub year: String,

    /// Amount, already converted from the locale format.
    #[serde(rename = "valor")]
    pub amount: f64,

    /// Beneficiary surrogate key.
    #[serde(rename = "skBeneficiario")]
    pub beneficiary_key: String,

    /// Beneficiary name.
    #[serde(rename = "nomeBeneficiario")]
    pub beneficiary_name: String,

    /// Benefit identifier (NIS).
    #[serde(rename = "nisBeneficio")]
    pub benefit_id: String,

    /// Beneficiary document identifier (masked CPF).
    #[serde(rename = "cpfBeneficiario")]
    pub document_id: String,

    /// Accessibility-format flag.
    #[serde(rename = "linguagemCidada")]
    pub accessible_format: String,

    /// Numeric municipality id extracted from the detail link, or empty.
    #[serde(rename = "idMunicipio")]
    pub municipality_id: String,
}

/// Output column headers, in order.
pub const OUTPUT_COLUMNS: [&str; 10] = [
    "uf",
    "municipio",
    "ano",
    "valor",
    "skBeneficiario",
    "nomeBeneficiario",
    "nisBeneficio",
    "cpfBeneficiario",
    "linguagemCidada",
    "idMunicipio",
];

/// One unit of harvesting work: a single year within a fixed region.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Partition {
    /// Partition key (reference year).
    pub year: i32,

    /// Region filter (state code).
    pub region: String,
}

impl Partition {
    /// Create a new partition.
    #[must_use]
    pub fn new(year: i32, region: impl Into<String>) -> Self {
        Self {
            year,
            region: region.into(),
        }
    }

    /// Deterministic output file name for this partition.
    ///
    /// # Examples
    /// ```
    /// use transparencia_harvester::types::Partition;
    ///
    /// assert_eq!(Partition::new(2021, "RJ").file_name(), "bolsafamilia_2021_RJ.csv");
    /// ```
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("bolsafamilia_{}_{}.csv", self.year, self.region)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.year, self.region)
    }
}

/// A single session-proof token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    pub name: String,
    pub value: String,
    /// Cookie domain; solvers may omit it, in which case the configured
    /// fallback domain is used.
    #[serde(default)]
    pub domain: Option<String>,
}

impl Credential {
    /// Create a credential bound to a domain.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: Some(domain.into()),
        }
    }
}

/// The full set of tokens produced by one challenge solve.
///
/// Replaced wholesale on renewal, never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    credentials: Vec<Credential>,
}

impl CredentialSet {
    #[must_use]
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    /// Fill in `fallback_domain` for every credential without a domain.
    #[must_use]
    pub fn with_fallback_domain(mut self, fallback_domain: &str) -> Self {
        for credential in &mut self.credentials {
            if credential.domain.as_deref().map_or(true, str::is_empty) {
                credential.domain = Some(fallback_domain.to_string());
            }
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

/// Raw response descriptor returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Why a partition stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalReason {
    /// An empty page was returned: the dataset is exhausted.
    Exhausted,

    /// The API returned an explicit `error` field.
    ApiError(String),

    /// A status code other than 200, 202 or 403 was returned.
    UnexpectedStatus(u16),

    /// The retry budget for one offset was used up.
    Abandoned { attempts: u32, last_failure: String },

    /// Rows could not be written to the partition's destination.
    OutputFailed(String),

    /// The operator cancelled the run.
    Cancelled,
}

impl TerminalReason {
    /// Whether this is a normal stopping condition rather than a failure.
    #[must_use]
    pub fn is_normal(&self) -> bool {
        matches!(
            self,
            Self::Exhausted | Self::ApiError(_) | Self::UnexpectedStatus(_)
        )
    }
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "exhausted"),
            Self::ApiError(msg) => write!(f, "api error: {msg}"),
            Self::UnexpectedStatus(code) => write!(f, "HTTP {code}"),
            Self::Abandoned {
                attempts,
                last_failure,
            } => write!(f, "abandoned after {attempts} attempts ({last_failure})"),
            Self::OutputFailed(msg) => write!(f, "output failed: {msg}"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of harvesting one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub partition: Partition,
    pub rows_written: u64,
    pub pages_accepted: u64,
    /// Offset the partition stopped at.
    pub final_offset: u64,
    /// Session renewals performed while this partition was active.
    pub renewals: u32,
    pub reason: TerminalReason,
}
