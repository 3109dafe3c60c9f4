use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::app::ports::{FetchedPage, WebFetchPort};

const USER_AGENT: &str = concat!("event-fusion/", env!("CARGO_PKG_VERSION"));

/// HTTP page fetcher backed by a shared reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebFetchPort for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        headers: &[(String, String)],
    ) -> Result<FetchedPage, String> {
        let mut request = self.client.get(url).timeout(timeout);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", url, e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if !(200..300).contains(&status) {
            return Err(format!("request to {} returned status {}", url, status));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read body from {}: {}", url, e))?;

        debug!(url, status, bytes = body.len(), "page fetched");
        Ok(FetchedPage {
            body,
            content_type,
            status,
        })
    }
}
