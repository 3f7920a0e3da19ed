//! Harness configuration with environment variable priority
//!
//! Configuration is resolved in this order (first found wins):
//! 1. Environment variables (HOOKCHECK_*, plus NGROK_AUTHTOKEN)
//! 2. Config file (hookcheck.toml)
//! 3. Default values

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{HarnessError, Result};

/// Environment variable prefix
const ENV_PREFIX: &str = "HOOKCHECK";

/// Config file looked up at the workspace root
pub const DEFAULT_CONFIG_FILE: &str = "hookcheck.toml";

/// How the harness decides the tunnel agent is up
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TunnelWait {
    /// Poll the agent API until it reports a public URL
    #[default]
    Api,
    /// Scan the agent's log for the "started tunnel" line
    LogLine,
}

impl FromStr for TunnelWait {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(TunnelWait::Api),
            "log_line" | "log-line" | "log" => Ok(TunnelWait::LogLine),
            other => Err(HarnessError::Config(format!(
                "Unknown tunnel wait strategy: {}",
                other
            ))),
        }
    }
}

/// Harness configuration (parsed from TOML, can be overridden by env)
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct HarnessConfig {
    /// Port the target service listens on inside its container
    pub web_port: Option<u16>,

    /// Port of the tunnel agent's local API inside its container
    pub tunnel_api_port: Option<u16>,

    /// Network alias of the target service
    pub web_alias: Option<String>,

    /// Network alias of the tunnel agent
    pub tunnel_alias: Option<String>,

    /// Image tag for the target service
    pub server_image: Option<String>,

    /// Image tag for the tunnel agent
    pub tunnel_image: Option<String>,

    /// Build both images from `docker/` before starting
    pub build_images: Option<bool>,

    /// Build context for the target service image (the workspace root)
    pub build_context: Option<PathBuf>,

    pub tunnel_wait: Option<TunnelWait>,

    pub startup_timeout_secs: Option<u64>,

    pub poll_interval_ms: Option<u64>,

    pub request_timeout_secs: Option<u64>,

    /// ngrok agent auth token, forwarded to the tunnel container
    pub ngrok_authtoken: Option<String>,

    /// Explicit path to the docker binary
    pub docker_bin: Option<PathBuf>,
}

/// Fully resolved harness configuration
#[derive(Clone)]
pub struct ResolvedHarnessConfig {
    pub web_port: u16,
    pub tunnel_api_port: u16,
    pub web_alias: String,
    pub tunnel_alias: String,
    pub server_image: String,
    pub tunnel_image: String,
    pub build_images: bool,
    pub build_context: PathBuf,
    pub tunnel_wait: TunnelWait,
    pub startup_timeout: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub ngrok_authtoken: Option<String>,
    pub docker_bin: Option<PathBuf>,
}

impl fmt::Debug for ResolvedHarnessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedHarnessConfig")
            .field("web_port", &self.web_port)
            .field("tunnel_api_port", &self.tunnel_api_port)
            .field("web_alias", &self.web_alias)
            .field("tunnel_alias", &self.tunnel_alias)
            .field("server_image", &self.server_image)
            .field("tunnel_image", &self.tunnel_image)
            .field("build_images", &self.build_images)
            .field("build_context", &self.build_context)
            .field("tunnel_wait", &self.tunnel_wait)
            .field("startup_timeout", &self.startup_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .field(
                "ngrok_authtoken",
                &self.ngrok_authtoken.as_ref().map(|_| "<redacted>"),
            )
            .field("docker_bin", &self.docker_bin)
            .finish()
    }
}

/// Workspace root, two levels above this crate's manifest
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

fn parse_var<T: FromStr>(name: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={}", name, value);
            None
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file (optional)
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match Self::from_toml(&content) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                }
            }
        }
        Self::default()
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| HarnessError::Config(e.to_string()))
    }

    /// Resolve against the process environment
    pub fn resolve(self) -> Result<ResolvedHarnessConfig> {
        self.resolve_with(|name| env::var(name).ok())
    }

    /// Resolve using `lookup` for environment variables
    pub fn resolve_with<F>(self, lookup: F) -> Result<ResolvedHarnessConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}_{}", ENV_PREFIX, name));
        let get_parsed = |name: &str| {
            let full = format!("{}_{}", ENV_PREFIX, name);
            let value = lookup(&full);
            (full, value)
        };

        let (name, value) = get_parsed("WEB_PORT");
        let web_port = parse_var(&name, value).or(self.web_port).unwrap_or(8081);

        let (name, value) = get_parsed("TUNNEL_API_PORT");
        let tunnel_api_port = parse_var(&name, value)
            .or(self.tunnel_api_port)
            .unwrap_or(4040);

        let web_alias = get("WEB_ALIAS")
            .or(self.web_alias)
            .unwrap_or_else(|| "web".to_string());
        let tunnel_alias = get("TUNNEL_ALIAS")
            .or(self.tunnel_alias)
            .unwrap_or_else(|| "ngrok".to_string());

        let server_image = get("SERVER_IMAGE")
            .or(self.server_image)
            .unwrap_or_else(|| "webhook-server".to_string());
        let tunnel_image = get("TUNNEL_IMAGE")
            .or(self.tunnel_image)
            .unwrap_or_else(|| "webhook-ngrok".to_string());

        let (name, value) = get_parsed("BUILD_IMAGES");
        let build_images = parse_var(&name, value)
            .or(self.build_images)
            .unwrap_or(true);

        let build_context = get("BUILD_CONTEXT")
            .map(PathBuf::from)
            .or(self.build_context)
            .unwrap_or_else(workspace_root);

        let tunnel_wait = match get("TUNNEL_WAIT") {
            Some(v) => v.parse()?,
            None => self.tunnel_wait.unwrap_or_default(),
        };

        let (name, value) = get_parsed("STARTUP_TIMEOUT_SECS");
        let startup_timeout_secs: u64 = parse_var(&name, value)
            .or(self.startup_timeout_secs)
            .unwrap_or(60);

        let (name, value) = get_parsed("POLL_INTERVAL_MS");
        let poll_interval_ms: u64 = parse_var(&name, value)
            .or(self.poll_interval_ms)
            .unwrap_or(500);

        let (name, value) = get_parsed("REQUEST_TIMEOUT_SECS");
        let request_timeout_secs: u64 = parse_var(&name, value)
            .or(self.request_timeout_secs)
            .unwrap_or(30);

        if startup_timeout_secs == 0 {
            return Err(HarnessError::Config(
                "startup_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if poll_interval_ms == 0 {
            return Err(HarnessError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        // Token: NGROK_AUTHTOKEN > HOOKCHECK_NGROK_AUTHTOKEN > config
        let ngrok_authtoken = lookup("NGROK_AUTHTOKEN")
            .or_else(|| get("NGROK_AUTHTOKEN"))
            .or(self.ngrok_authtoken)
            .filter(|t| !t.trim().is_empty());

        let docker_bin = get("DOCKER_BIN").map(PathBuf::from).or(self.docker_bin);

        Ok(ResolvedHarnessConfig {
            web_port,
            tunnel_api_port,
            web_alias,
            tunnel_alias,
            server_image,
            tunnel_image,
            build_images,
            build_context,
            tunnel_wait,
            startup_timeout: Duration::from_secs(startup_timeout_secs),
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
            ngrok_authtoken,
            docker_bin,
        })
    }
}

impl ResolvedHarnessConfig {
    /// Load `HOOKCHECK_CONFIG` (or `hookcheck.toml` at the workspace root) and resolve it
    pub fn load_default() -> Result<Self> {
        let path = env::var(format!("{}_CONFIG", ENV_PREFIX))
            .map(PathBuf::from)
            .unwrap_or_else(|_| workspace_root().join(DEFAULT_CONFIG_FILE));
        HarnessConfig::load(path).resolve()
    }

    /// Address of the target service as seen from inside the network
    pub fn web_internal_addr(&self) -> String {
        format!("{}:{}", self.web_alias, self.web_port)
    }

    /// Arguments handed to the tunnel agent's entrypoint
    pub fn tunnel_command(&self) -> Vec<String> {
        vec![
            "http".to_string(),
            self.web_internal_addr(),
            "--log".to_string(),
            "stdout".to_string(),
            "--log-format".to_string(),
            "logfmt".to_string(),
        ]
    }

    pub fn server_dockerfile(&self) -> PathBuf {
        self.build_context
            .join("docker")
            .join("webhook-server")
            .join("Dockerfile")
    }

    pub fn tunnel_build_dir(&self) -> PathBuf {
        self.build_context.join("docker").join("webhook-ngrok")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(ENV_PREFIX, "HOOKCHECK");
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default().resolve_with(env_of(&[])).unwrap();
        assert_eq!(config.web_port, 8081);
        assert_eq!(config.tunnel_api_port, 4040);
        assert_eq!(config.web_alias, "web");
        assert_eq!(config.tunnel_alias, "ngrok");
        assert_eq!(config.tunnel_wait, TunnelWait::Api);
        assert!(config.build_images);
        assert_eq!(config.startup_timeout, Duration::from_secs(60));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert!(config.ngrok_authtoken.is_none());
        assert_eq!(config.web_internal_addr(), "web:8081");
        assert_eq!(&config.tunnel_command()[..2], ["http", "web:8081"]);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = HarnessConfig::from_toml(
            r#"
            web_port = 9000
            tunnel_alias = "agent"
            tunnel_wait = "log_line"
            ngrok_authtoken = "from-file"
            "#,
        )
        .unwrap();

        let config = file
            .resolve_with(env_of(&[
                ("HOOKCHECK_WEB_PORT", "9100"),
                ("NGROK_AUTHTOKEN", "from-env"),
            ]))
            .unwrap();

        assert_eq!(config.web_port, 9100);
        assert_eq!(config.tunnel_alias, "agent");
        assert_eq!(config.tunnel_wait, TunnelWait::LogLine);
        assert_eq!(config.ngrok_authtoken.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_unparsable_env_falls_back() {
        let config = HarnessConfig::default()
            .resolve_with(env_of(&[("HOOKCHECK_WEB_PORT", "eighty")]))
            .unwrap();
        assert_eq!(config.web_port, 8081);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = HarnessConfig::default()
            .resolve_with(env_of(&[("HOOKCHECK_POLL_INTERVAL_MS", "0")]));
        assert!(matches!(result, Err(HarnessError::Config(_))));

        let result =
            HarnessConfig::default().resolve_with(env_of(&[("HOOKCHECK_TUNNEL_WAIT", "sniff")]));
        assert!(matches!(result, Err(HarnessError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "server_image = \"custom-server\"\nbuild_images = false\n").unwrap();

        let config = HarnessConfig::load(&path);
        assert_eq!(config.server_image.as_deref(), Some("custom-server"));
        assert_eq!(config.build_images, Some(false));

        let missing = HarnessConfig::load(dir.path().join("missing.toml"));
        assert!(missing.server_image.is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = HarnessConfig::default()
            .resolve_with(env_of(&[("NGROK_AUTHTOKEN", "s3cret")]))
            .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("<redacted>"));
    }
}
