//! The webhook round trip: read, deliver through the tunnel, read again

use hookcheck_protocol::{LAST_REQUEST_PATH, REGISTER_REQUEST_PATH};

use crate::error::Result;
use crate::probe::HttpProbe;
use crate::resolver::TunnelApi;

/// Body delivered by the round-trip scenario
pub const GREETING_BODY: &str = r#"{"greet":"hi"}"#;

/// Drives the target directly and through its public tunnel
#[derive(Clone, Debug)]
pub struct WebhookScenario {
    probe: HttpProbe,
    target_url: String,
    tunnel: TunnelApi,
}

impl WebhookScenario {
    /// `target_url` reaches the target without the tunnel (mapped port)
    pub fn new(probe: HttpProbe, target_url: impl Into<String>, tunnel: TunnelApi) -> Self {
        Self {
            probe,
            target_url: target_url.into().trim_end_matches('/').to_string(),
            tunnel,
        }
    }

    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    pub fn tunnel(&self) -> &TunnelApi {
        &self.tunnel
    }

    /// Last request body recorded by the target, read directly
    pub async fn fetch_last_request(&self) -> Result<Option<String>> {
        tracing::info!("Retrieving last request made to our server...");
        self.probe
            .get(&format!("{}{}", self.target_url, LAST_REQUEST_PATH))
            .await
    }

    /// Deliver `body` to the target through the tunnel's public URL
    pub async fn register_request(&self, body: &str) -> Result<Option<String>> {
        tracing::info!("Making a request simulating a webhook notification...");
        let public_url = self.tunnel.public_url().await?;
        let response = self
            .probe
            .post_json(
                &format!(
                    "{}{}",
                    public_url.trim_end_matches('/'),
                    REGISTER_REQUEST_PATH
                ),
                body,
            )
            .await?;
        tracing::info!("{}", response.as_deref().unwrap_or(""));
        Ok(response)
    }
}
