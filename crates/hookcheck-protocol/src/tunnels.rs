use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Document served by the tunnel agent on `/api/tunnels`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TunnelDescriptor {
    /// Active tunnels, in the order the agent reports them
    #[serde(default)]
    pub tunnels: Vec<TunnelInfo>,
}

/// A single tunnel entry. Only `public_url` is relied upon; everything else
/// the agent reports (proto, config, metrics) is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TunnelInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proto: Option<String>,
}

impl TunnelDescriptor {
    /// Describe a single tunnel reachable at `public_url`
    pub fn single(public_url: impl Into<String>) -> Self {
        Self {
            tunnels: vec![TunnelInfo {
                name: Some("command_line".to_string()),
                public_url: Some(public_url.into()),
                proto: Some("http".to_string()),
            }],
        }
    }

    /// Parse the agent's JSON document
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Public URL of the first tunnel. Later entries are never consulted.
    pub fn first_public_url(&self) -> Result<&str, ProtocolError> {
        self.tunnels
            .first()
            .and_then(|t| t.public_url.as_deref())
            .filter(|url| !url.is_empty())
            .ok_or(ProtocolError::NoPublicUrl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_public_url() {
        let json = r#"{
            "tunnels": [
                {
                    "name": "command_line",
                    "uri": "/api/tunnels/command_line",
                    "public_url": "https://1a2b-3c4d.ngrok-free.app",
                    "proto": "https",
                    "config": { "addr": "http://web:8081", "inspect": true }
                },
                { "name": "second", "public_url": "https://other.ngrok-free.app" }
            ],
            "uri": "/api/tunnels"
        }"#;

        let descriptor = TunnelDescriptor::from_json(json).unwrap();
        assert_eq!(
            descriptor.first_public_url().unwrap(),
            "https://1a2b-3c4d.ngrok-free.app"
        );
    }

    #[test]
    fn test_empty_tunnels() {
        let descriptor = TunnelDescriptor::from_json(r#"{"tunnels": []}"#).unwrap();
        assert!(matches!(
            descriptor.first_public_url(),
            Err(ProtocolError::NoPublicUrl)
        ));
    }

    #[test]
    fn test_missing_fields() {
        let descriptor = TunnelDescriptor::from_json("{}").unwrap();
        assert!(descriptor.first_public_url().is_err());

        let descriptor = TunnelDescriptor::from_json(r#"{"tunnels": [{"name": "x"}]}"#).unwrap();
        assert!(descriptor.first_public_url().is_err());

        let descriptor =
            TunnelDescriptor::from_json(r#"{"tunnels": [{"public_url": ""}]}"#).unwrap();
        assert!(descriptor.first_public_url().is_err());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            TunnelDescriptor::from_json("not json"),
            Err(ProtocolError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_single() {
        let descriptor = TunnelDescriptor::single("http://127.0.0.1:9000");
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains(r#""public_url":"http://127.0.0.1:9000""#));
        assert_eq!(
            descriptor.first_public_url().unwrap(),
            "http://127.0.0.1:9000"
        );
    }
}
