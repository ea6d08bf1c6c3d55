use std::time::Duration;

use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::redirect::Policy;
use thiserror::Error;

/// User agent sent with every probe unless configured otherwise
pub const DEFAULT_USER_AGENT: &str =
    concat!("sitewatch/", env!("CARGO_PKG_VERSION"), " (uptime monitor)");

/// Accept header sent with every probe unless configured otherwise
pub const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Reason a probe produced no HTTP status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("timeout")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("too many redirects")]
    Redirect,

    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for CheckError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CheckError::Timeout
        } else if err.is_builder() {
            CheckError::InvalidAddress(root_cause(&err))
        } else if err.is_redirect() {
            CheckError::Redirect
        } else if err.is_connect() {
            CheckError::Connect(root_cause(&err))
        } else {
            CheckError::Request(root_cause(&err))
        }
    }
}

/// reqwest wraps hyper and io errors; the innermost one is the useful part
fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

/// Transport performing one request against an address.
///
/// Implementations return the HTTP status code when a response arrived,
/// whatever its class. Only the absence of a response is an error.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, address: &str) -> Result<u16, CheckError>;
}

/// Settings for the HTTP transport
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub user_agent: String,
    pub accept: String,
    pub max_redirects: usize,
    /// Skip TLS certificate validation. Off unless explicitly enabled.
    pub accept_invalid_certs: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            max_redirects: 10,
            accept_invalid_certs: false,
        }
    }
}

/// HTTP/HTTPS checker issuing a GET and following redirects
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(options: &HttpOptions) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_str(&options.accept)?);

        if options.accept_invalid_certs {
            tracing::warn!("TLS certificate validation is disabled for probes");
        }

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .redirect(Policy::limited(options.max_redirects))
            .user_agent(options.user_agent.as_str())
            .default_headers(headers)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, address: &str) -> Result<u16, CheckError> {
        let response = self.client.get(address).send().await?;
        Ok(response.status().as_u16())
    }
}
