//! Configuration constants and the immutable harvest configuration.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{HarvesterError, Result};
use crate::types::Partition;

/// Paginated beneficiary query endpoint.
pub const API_URL: &str =
    "https://portaldatransparencia.gov.br/beneficios/beneficiario/consulta/resultado";

/// Page that triggers (and, once solved, clears) the anti-bot challenge.
pub const CHALLENGE_URL: &str = "https://portaldatransparencia.gov.br/beneficios/beneficiario/consulta?ordenarPor=nomeBeneficiario&direcao=asc";

/// Domain assigned to solver cookies that carry none.
pub const COOKIE_DOMAIN: &str = "portaldatransparencia.gov.br";

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: u64 = 20_000;

/// HTTP timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Columns requested from the API, comma-joined.
pub const SELECTED_COLUMNS: &str = "linkDetalhamento,uf,nomeBeneficiario,linguagemCidada,nisBeneficio,cpfBeneficiario,municipio,ano,valor";

/// Browser-like User-Agent; the portal rejects obvious automation clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36";

/// Region filter: two uppercase letters.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static REGION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{2}$").expect("valid regex"));

/// Validate a region (state code) filter.
///
/// # Examples
/// ```
/// use transparencia_harvester::config::validate_region;
///
/// assert!(validate_region("RJ").is_ok());
/// assert!(validate_region("rj").is_err());
/// ```
pub fn validate_region(region: &str) -> Result<()> {
    if REGION_PATTERN.is_match(region) {
        Ok(())
    } else {
        Err(HarvesterError::InvalidConfig(format!(
            "region '{region}' must be a two-letter uppercase state code (e.g. RJ)"
        )))
    }
}

/// Immutable harvest configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub api_url: String,
    pub challenge_url: String,
    pub cookie_domain: String,
    pub page_size: u64,
    pub sort_column: String,
    pub sort_direction: String,
    pub region: String,
    pub years: RangeInclusive<i32>,
    pub selected_columns: String,
    pub headers: Vec<(String, String)>,
    /// Pause after every accepted page.
    pub request_interval: Duration,
    /// Pause before retrying a blocked, rate-limited or failed request.
    pub retry_delay: Duration,
    /// Credentials older than this are renewed before the next request.
    pub renewal_interval: Duration,
    pub max_attempts: u32,
    pub request_timeout: Duration,
    /// How long the challenge solver should dwell on the challenge page.
    pub challenge_dwell: Duration,
    pub output_dir: PathBuf,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            api_url: API_URL.to_string(),
            challenge_url: CHALLENGE_URL.to_string(),
            cookie_domain: COOKIE_DOMAIN.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            sort_column: "nomeBeneficiario".to_string(),
            sort_direction: "asc".to_string(),
            region: "RJ".to_string(),
            years: 2019..=2024,
            selected_columns: SELECTED_COLUMNS.to_string(),
            headers: default_headers(),
            request_interval: Duration::from_secs(1),
            retry_delay: Duration::from_secs(5),
            renewal_interval: Duration::from_secs(60),
            max_attempts: 3,
            request_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            challenge_dwell: Duration::from_secs(15),
            output_dir: PathBuf::from("downloads"),
        }
    }
}

fn default_headers() -> Vec<(String, String)> {
    [
        ("User-Agent", USER_AGENT),
        ("Accept", "application/json, text/plain, */*"),
        ("Accept-Language", "pt-BR,pt;q=0.9"),
        ("X-Requested-With", "XMLHttpRequest"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl HarvestConfig {
    /// Build a configuration from `HARVEST_*` environment variables.
    ///
    /// Missing or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let from_year = env_parse("HARVEST_FROM_YEAR").unwrap_or(*defaults.years.start());
        let to_year = env_parse("HARVEST_TO_YEAR").unwrap_or(*defaults.years.end());
        let secs = |key: &str, default: Duration| {
            env_parse::<u64>(key).map_or(default, Duration::from_secs)
        };

        Self {
            api_url: std::env::var("HARVEST_API_URL").unwrap_or(defaults.api_url),
            challenge_url: std::env::var("HARVEST_CHALLENGE_URL")
                .unwrap_or(defaults.challenge_url),
            cookie_domain: std::env::var("HARVEST_COOKIE_DOMAIN")
                .unwrap_or(defaults.cookie_domain),
            page_size: env_parse("HARVEST_PAGE_SIZE").unwrap_or(defaults.page_size),
            sort_column: std::env::var("HARVEST_SORT_COLUMN").unwrap_or(defaults.sort_column),
            sort_direction: std::env::var("HARVEST_SORT_DIRECTION")
                .unwrap_or(defaults.sort_direction),
            region: std::env::var("HARVEST_REGION").unwrap_or(defaults.region),
            years: from_year..=to_year,
            selected_columns: defaults.selected_columns,
            headers: defaults.headers,
            request_interval: secs("HARVEST_REQUEST_INTERVAL_SECS", defaults.request_interval),
            retry_delay: secs("HARVEST_RETRY_DELAY_SECS", defaults.retry_delay),
            renewal_interval: secs("HARVEST_RENEWAL_INTERVAL_SECS", defaults.renewal_interval),
            max_attempts: env_parse("HARVEST_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),
            request_timeout: secs("HARVEST_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            challenge_dwell: secs("HARVEST_CHALLENGE_DWELL_SECS", defaults.challenge_dwell),
            output_dir: std::env::var("HARVEST_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
        }
    }

    pub fn with_years(mut self, years: RangeInclusive<i32>) -> Self {
        self.years = years;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Set every wait (inter-request, retry, dwell) to the same duration.
    pub fn with_delays(mut self, delay: Duration) -> Self {
        self.request_interval = delay;
        self.retry_delay = delay;
        self.challenge_dwell = delay;
        self
    }

    pub fn with_renewal_interval(mut self, renewal_interval: Duration) -> Self {
        self.renewal_interval = renewal_interval;
        self
    }

    /// Check the configuration for values the harvest cannot work with.
    pub fn validate(&self) -> Result<()> {
        validate_region(&self.region)?;

        if self.years.is_empty() {
            return Err(HarvesterError::InvalidConfig(format!(
                "year range {}..={} is empty",
                self.years.start(),
                self.years.end()
            )));
        }
        if self.page_size == 0 {
            return Err(HarvesterError::InvalidConfig(
                "page size must be positive".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(HarvesterError::InvalidConfig(
                "max attempts must be at least 1".to_string(),
            ));
        }
        if !matches!(self.sort_direction.as_str(), "asc" | "desc") {
            return Err(HarvesterError::InvalidConfig(format!(
                "sort direction '{}' must be 'asc' or 'desc'",
                self.sort_direction
            )));
        }

        Ok(())
    }

    /// Partitions to harvest, in order.
    pub fn partitions(&self) -> Vec<Partition> {
        self.years
            .clone()
            .map(|year| Partition::new(year, self.region.clone()))
            .collect()
    }

    /// Query parameters for one page of a partition.
    pub fn page_query(&self, partition: &Partition, offset: u64) -> Vec<(String, String)> {
        vec![
            ("paginacaoSimples".to_string(), "true".to_string()),
            ("tamanhoPagina".to_string(), self.page_size.to_string()),
            ("offset".to_string(), offset.to_string()),
            ("direcaoOrdenacao".to_string(), self.sort_direction.clone()),
            ("colunaOrdenacao".to_string(), self.sort_column.clone()),
            ("ano".to_string(), partition.year.to_string()),
            ("uf".to_string(), partition.region.clone()),
            (
                "colunasSelecionadas".to_string(),
                self.selected_columns.clone(),
            ),
        ]
    }

    /// Output path for a partition.
    pub fn output_path(&self, partition: &Partition) -> PathBuf {
        self.output_dir.join(partition.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        assert!(HarvestConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_region() {
        assert!(validate_region("RJ").is_ok());
        assert!(validate_region("SP").is_ok());
        assert!(validate_region("").is_err());
        assert!(validate_region("R").is_err());
        assert!(validate_region("RJX").is_err());
        assert!(validate_region("r j").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        #[allow(clippy::reversed_empty_ranges)]
        let inverted = HarvestConfig::default().with_years(2024..=2019);
        assert!(inverted.validate().is_err());

        assert!(HarvestConfig::default()
            .with_page_size(0)
            .validate()
            .is_err());
        assert!(HarvestConfig::default()
            .with_max_attempts(0)
            .validate()
            .is_err());

        let mut config = HarvestConfig::default();
        config.sort_direction = "up".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partitions_follow_year_range() {
        let config = HarvestConfig::default()
            .with_years(2020..=2022)
            .with_region("BA");
        assert_eq!(
            config.partitions(),
            vec![
                Partition::new(2020, "BA"),
                Partition::new(2021, "BA"),
                Partition::new(2022, "BA"),
            ]
        );
    }

    #[test]
    fn test_page_query() {
        let config = HarvestConfig::default().with_page_size(500);
        let query = config.page_query(&Partition::new(2021, "RJ"), 1000);
        let query: Vec<(&str, &str)> = query
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        assert_eq!(
            query,
            vec![
                ("paginacaoSimples", "true"),
                ("tamanhoPagina", "500"),
                ("offset", "1000"),
                ("direcaoOrdenacao", "asc"),
                ("colunaOrdenacao", "nomeBeneficiario"),
                ("ano", "2021"),
                ("uf", "RJ"),
                ("colunasSelecionadas", SELECTED_COLUMNS),
            ]
        );
    }

    #[test]
    fn test_output_path() {
        let config = HarvestConfig::default().with_output_dir("/tmp/out");
        assert_eq!(
            config.output_path(&Partition::new(2019, "RJ")),
            PathBuf::from("/tmp/out/bolsafamilia_2019_RJ.csv")
        );
    }
}
