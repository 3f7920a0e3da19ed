//! Docker-backed webhook environment
//!
//! Starts the target service and the ngrok agent on a private network, the
//! agent pointed at `web:<port>`. Both containers and the network live as long
//! as the [`WebhookEnvironment`]; tear them down with
//! [`WebhookEnvironment::shutdown`] or by dropping it.

use hookcheck_protocol::{HEALTH_PATH, PORT_ENV};

use crate::config::{ResolvedHarnessConfig, TunnelWait};
use crate::docker::{Container, ContainerSpec, DockerCli, Network};
use crate::error::Result;
use crate::probe::HttpProbe;
use crate::readiness::{
    is_tunnel_started_line, wait_until_ready, HttpReady, LogLineReady, Readiness, TunnelReady,
};
use crate::resolver::TunnelApi;
use crate::scenario::WebhookScenario;

const LOCALHOST: &str = "http://localhost";

/// A running target service and tunnel agent
pub struct WebhookEnvironment {
    // Field order is drop order: containers go before their network
    tunnel: Container,
    web: Container,
    network: Network,
    probe: HttpProbe,
    target_url: String,
    tunnel_api_url: String,
}

impl WebhookEnvironment {
    /// Build images (if configured), start both containers and wait until
    /// the tunnel has a public URL
    pub async fn start(config: &ResolvedHarnessConfig) -> Result<Self> {
        tracing::info!("Starting webhook environment: {:?}", config);

        let docker = DockerCli::from_override(config.docker_bin.as_deref())?;
        let probe = HttpProbe::new(config.request_timeout)?;

        if config.build_images {
            docker
                .build_image(
                    &config.server_image,
                    &config.server_dockerfile(),
                    &config.build_context,
                )
                .await?;
            let tunnel_dir = config.tunnel_build_dir();
            docker
                .build_image(
                    &config.tunnel_image,
                    &tunnel_dir.join("Dockerfile"),
                    &tunnel_dir,
                )
                .await?;
        }

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let suffix = &suffix[..8];
        let network = Network::create(&docker, format!("hookcheck-{}", suffix)).await?;

        let web_spec = ContainerSpec::new(&config.server_image)
            .with_name(format!("hookcheck-web-{}", suffix))
            .with_network(network.name())
            .with_network_alias(&config.web_alias)
            .with_env(PORT_ENV, config.web_port.to_string())
            .with_exposed_port(config.web_port);
        let mut web = Container::start(&docker, &web_spec).await?;
        web.follow_logs("webhook-server")?;

        let target_url = format!("{}:{}", LOCALHOST, web.mapped_port(config.web_port).await?);
        wait_until_ready(
            &HttpReady::new(probe.clone(), format!("{}{}", target_url, HEALTH_PATH)),
            config.startup_timeout,
            config.poll_interval,
        )
        .await?;

        let mut tunnel_spec = ContainerSpec::new(&config.tunnel_image)
            .with_name(format!("hookcheck-ngrok-{}", suffix))
            .with_network(network.name())
            .with_network_alias(&config.tunnel_alias)
            .with_exposed_port(config.tunnel_api_port)
            .with_command(config.tunnel_command());
        match &config.ngrok_authtoken {
            Some(token) => tunnel_spec = tunnel_spec.with_secret_env("NGROK_AUTHTOKEN", token),
            None => tracing::warn!("NGROK_AUTHTOKEN not set, the agent may refuse to start"),
        }

        let mut tunnel = Container::start(&docker, &tunnel_spec).await?;
        tunnel.follow_logs("webhook-ngrok")?;

        let tunnel_api_url = format!(
            "{}:{}",
            LOCALHOST,
            tunnel.mapped_port(config.tunnel_api_port).await?
        );

        let check: Box<dyn Readiness> = match config.tunnel_wait {
            TunnelWait::Api => Box::new(TunnelReady::new(TunnelApi::new(
                probe.clone(),
                tunnel_api_url.clone(),
            ))),
            TunnelWait::LogLine => Box::new(LogLineReady::new(
                docker.clone(),
                tunnel.id(),
                is_tunnel_started_line,
            )),
        };
        wait_until_ready(check.as_ref(), config.startup_timeout, config.poll_interval).await?;

        tracing::info!(
            "Webhook environment ready: target {}, tunnel API {}",
            target_url,
            tunnel_api_url
        );

        Ok(Self {
            tunnel,
            web,
            network,
            probe,
            target_url,
            tunnel_api_url,
        })
    }

    /// Target service via its mapped host port
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// Tunnel agent API via its mapped host port
    pub fn tunnel_api_url(&self) -> &str {
        &self.tunnel_api_url
    }

    pub fn tunnel_api(&self) -> TunnelApi {
        TunnelApi::new(self.probe.clone(), self.tunnel_api_url.clone())
    }

    pub fn scenario(&self) -> WebhookScenario {
        WebhookScenario::new(self.probe.clone(), self.target_url.clone(), self.tunnel_api())
    }

    /// Combined logs of the target container
    pub async fn target_logs(&self) -> Result<String> {
        self.web.logs().await
    }

    /// Remove both containers, then the network
    pub async fn shutdown(mut self) -> Result<()> {
        self.tunnel.stop().await?;
        self.web.stop().await?;
        self.network.remove().await?;
        Ok(())
    }
}
