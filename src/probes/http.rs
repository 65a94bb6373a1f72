use super::{HttpResponse, HttpTransport, ProbeError, RetryPolicy};
use reqwest::Client;
use std::time::Duration;

/// HTTP transport backed by a shared reqwest client.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| ProbeError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, ProbeError> {
        // The deadline covers the body as well as the headers.
        let fetch = async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await?;
            Ok::<_, reqwest::Error>(HttpResponse { status, body })
        };

        match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) if e.is_timeout() => Err(ProbeError::Timeout(timeout)),
            Ok(Err(e)) => Err(ProbeError::Transport(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(timeout)),
        }
    }
}

/// Reachability sub-probe: true iff some attempt answers exactly 200.
pub async fn check_reachable(transport: &dyn HttpTransport, url: &str, policy: &RetryPolicy) -> bool {
    policy
        .run(url, |_| async move {
            let resp = transport.get(url, policy.timeout).await?;
            if resp.status == 200 {
                Ok(())
            } else {
                Err(ProbeError::UnexpectedStatus(resp.status))
            }
        })
        .await
        .is_ok()
}
