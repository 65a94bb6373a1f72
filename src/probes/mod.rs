//! Endpoint probes: reachability and keyword search, each behind a retry loop.
//!
//! A [`Prober`] never fails. Every transport, timeout, status or body problem
//! is folded into the [`ProbeResult`] it returns, so one bad endpoint cannot
//! abort a run.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ProbeSettings;
use crate::endpoints::Endpoint;

pub mod http;
pub mod retry;
pub mod search;

pub use self::http::ReqwestTransport;
pub use self::retry::RetryPolicy;
pub use self::search::SearchTest;

/// Why a single probe attempt failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("malformed body: {0}")]
    MalformedBody(String),
}

/// Outcome of the keyword search sub-probe.
///
/// The aliases accept the glyphs written by the older shell-era reports so
/// their embedded history still decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    #[serde(alias = "✅")]
    Match,
    #[serde(alias = "不匹配")]
    NoMatch,
    #[serde(alias = "无结果")]
    Empty,
    #[serde(alias = "❌")]
    Error,
    #[serde(alias = "-")]
    Skipped,
    #[serde(alias = "禁用")]
    Disabled,
}

impl std::fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchOutcome::Match => write!(f, "✓"),
            SearchOutcome::NoMatch => write!(f, "no match"),
            SearchOutcome::Empty => write!(f, "no results"),
            SearchOutcome::Error => write!(f, "✗"),
            SearchOutcome::Skipped => write!(f, "-"),
            SearchOutcome::Disabled => write!(f, "disabled"),
        }
    }
}

/// Result of probing one endpoint once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    #[serde(default)]
    pub name: String,
    /// Base URL of the endpoint; the identity key used by the history.
    #[serde(alias = "api")]
    pub endpoint: String,
    #[serde(alias = "success")]
    pub reachable: bool,
    #[serde(alias = "searchStatus")]
    pub search: SearchOutcome,
}

impl ProbeResult {
    pub fn disabled(endpoint: &Endpoint) -> Self {
        Self {
            name: endpoint.name.clone(),
            endpoint: endpoint.base_url.clone(),
            reachable: false,
            search: SearchOutcome::Disabled,
        }
    }

    /// Result recorded when the probe task itself could not finish.
    pub fn failed(endpoint: &Endpoint) -> Self {
        Self {
            name: endpoint.name.clone(),
            endpoint: endpoint.base_url.clone(),
            reachable: false,
            search: SearchOutcome::Error,
        }
    }
}

/// Minimal response handed back by an [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

/// One HTTP GET with a per-attempt timeout. The seam between probe logic and
/// the network.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, ProbeError>;
}

/// Runs the reachability and (optional) search checks for an endpoint.
pub struct Prober {
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    search: Option<SearchTest>,
}

impl Prober {
    pub fn new(transport: Arc<dyn HttpTransport>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            search: None,
        }
    }

    pub fn with_search(mut self, search: SearchTest) -> Self {
        self.search = Some(search);
        self
    }

    /// Build a prober backed by reqwest from the `[probe]` settings.
    pub fn from_settings(settings: &ProbeSettings) -> Result<Self, ProbeError> {
        let transport = ReqwestTransport::new(&settings.user_agent)?;
        let prober = Self::new(Arc::new(transport), RetryPolicy::from(settings));
        Ok(match SearchTest::from_settings(settings) {
            Some(test) => prober.with_search(test),
            None => prober,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Probe one endpoint. Both sub-probes run concurrently and independently;
    /// a failed reachability check does not skip the search check.
    pub async fn probe(&self, endpoint: &Endpoint) -> ProbeResult {
        if endpoint.disabled {
            debug!(endpoint = %endpoint.base_url, "endpoint disabled, not probing");
            return ProbeResult::disabled(endpoint);
        }

        let transport = self.transport.as_ref();
        let reachability = http::check_reachable(transport, &endpoint.base_url, &self.policy);
        let search = async {
            match &self.search {
                Some(test) => test.run(transport, &endpoint.base_url, &self.policy).await,
                None => SearchOutcome::Skipped,
            }
        };
        let (reachable, search) = tokio::join!(reachability, search);

        info!(
            endpoint = %endpoint.base_url,
            name = %endpoint.name,
            reachable,
            search = ?search,
            "probe finished"
        );

        ProbeResult {
            name: endpoint.name.clone(),
            endpoint: endpoint.base_url.clone(),
            reachable,
            search,
        }
    }
}
