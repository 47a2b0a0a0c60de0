//! HTTP transport for the beneficiary API.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::cookie::Jar;

use crate::config::HTTP_TIMEOUT_SECS;
use crate::error::{HarvesterError, Result};
use crate::types::{Credential, CredentialSet, RawResponse};

/// A handle that can issue GET requests carrying session credentials.
pub trait Transport: Send {
    /// Issue a GET request and return the status and body.
    ///
    /// Timeouts, connection failures and unreadable bodies are errors.
    fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<RawResponse>;
}

/// Builds a fresh transport handle for a credential set.
pub trait Connector: Send {
    fn connect(&self, credentials: &CredentialSet) -> Result<Box<dyn Transport>>;
}

/// Connector producing `reqwest` blocking clients with a cookie jar.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestConnector;

impl Connector for ReqwestConnector {
    fn connect(&self, credentials: &CredentialSet) -> Result<Box<dyn Transport>> {
        let jar = load_credentials_into_jar(credentials);
        let client = create_client(jar)?;
        Ok(Box::new(ReqwestTransport { client }))
    }
}

/// Create a configured HTTP client backed by `jar`.
pub fn create_client(jar: Arc<Jar>) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .cookie_provider(jar)
        .build()?;
    Ok(client)
}

/// Load every credential into a fresh cookie jar.
pub fn load_credentials_into_jar(credentials: &CredentialSet) -> Arc<Jar> {
    let jar = Arc::new(Jar::default());

    for credential in credentials.iter() {
        let Some(domain) = credential.domain.as_deref() else {
            tracing::warn!(name = %credential.name, "skipping credential without domain");
            continue;
        };

        match origin_url(domain).parse::<url::Url>() {
            Ok(url) => {
                jar.add_cookie_str(&set_cookie_string(credential, domain), &url);
                tracing::debug!(domain, name = %credential.name, "loaded credential into jar");
            }
            Err(_) => {
                tracing::warn!(
                    domain,
                    name = %credential.name,
                    "skipping credential with unparseable domain"
                );
            }
        }
    }

    jar
}

fn set_cookie_string(credential: &Credential, domain: &str) -> String {
    format!(
        "{}={}; Domain={}; Path=/",
        credential.name, credential.value, domain
    )
}

fn origin_url(domain: &str) -> String {
    let host = domain.strip_prefix('.').unwrap_or(domain);
    format!("https://{host}/")
}

/// Transport over a `reqwest` blocking client.
pub struct ReqwestTransport {
    client: Client,
}

impl Transport for ReqwestTransport {
    fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: &[(String, String)],
        timeout: Duration,
    ) -> Result<RawResponse> {
        let url = url::Url::parse_with_params(url, query)
            .map_err(|e| HarvesterError::InvalidConfig(format!("invalid API URL {url}: {e}")))?;
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(RawResponse { status, body })
    }
}
