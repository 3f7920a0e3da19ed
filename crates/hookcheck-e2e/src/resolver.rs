//! Resolves the tunnel's public URL from the agent's local API

use hookcheck_protocol::{TunnelDescriptor, TUNNELS_API_PATH};

use crate::error::{HarnessError, Result};
use crate::probe::HttpProbe;

/// Extract `tunnels[0].public_url` from an `/api/tunnels` document
pub fn resolve_public_url(json: &str) -> Result<String> {
    let descriptor = TunnelDescriptor::from_json(json)?;
    Ok(descriptor.first_public_url()?.to_string())
}

/// Client for the tunnel agent's local API
#[derive(Clone, Debug)]
pub struct TunnelApi {
    probe: HttpProbe,
    base_url: String,
}

impl TunnelApi {
    /// `base_url` is the agent API root, e.g. `http://localhost:49160`
    pub fn new(probe: HttpProbe, base_url: impl Into<String>) -> Self {
        Self {
            probe,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn tunnels_url(&self) -> String {
        format!("{}{}", self.base_url, TUNNELS_API_PATH)
    }

    /// Current public URL of the first tunnel
    pub async fn public_url(&self) -> Result<String> {
        let body = self
            .probe
            .get(&self.tunnels_url())
            .await?
            .ok_or(HarnessError::NoPublicUrl)?;
        let public_url = resolve_public_url(&body)?;
        tracing::info!("Public URL = [{}]", public_url);
        Ok(public_url)
    }
}
