//! HTTP probe used for every request the harness makes

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Response;

use crate::error::Result;

const APPLICATION_JSON: &str = "application/json";

/// Issues GET/POST requests and returns bodies as optional strings.
///
/// An empty response body (including a 204) is reported as `None`: the
/// harness does not distinguish "no entity" from "empty entity". Transport
/// failures are returned as errors and never retried.
#[derive(Clone, Debug)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// GET `url` with `accept: application/json`
    pub async fn get(&self, url: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .get(url)
            .header(ACCEPT, APPLICATION_JSON)
            .send()
            .await?;
        body_of(resp).await
    }

    /// POST a raw JSON string to `url`
    pub async fn post_json(&self, url: &str, body: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT, APPLICATION_JSON)
            .body(body.to_string())
            .send()
            .await?;
        body_of(resp).await
    }

    /// Whether a GET on `url` answers with a 2xx status
    pub async fn is_success(&self, url: &str) -> Result<bool> {
        let resp = self.client.get(url).send().await?;
        Ok(resp.status().is_success())
    }
}

async fn body_of(resp: Response) -> Result<Option<String>> {
    let status = resp.status();
    let url = resp.url().to_string();
    let text = resp.text().await?;
    tracing::debug!("{} -> {} ({} bytes)", url, status, text.len());

    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(text))
    }
}
