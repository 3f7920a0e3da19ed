//! End-to-end harness for the hookcheck webhook target
//!
//! Runs the target service behind an ngrok tunnel in Docker, delivers a
//! webhook through the tunnel's public URL and reads it back from the target.
//! The same scenario runs fully in-process against [`TargetService`] and
//! [`MockTunnel`] when Docker is not available.

pub mod config;
pub mod docker;
pub mod environment;
pub mod error;
pub mod mock_tunnel;
pub mod probe;
pub mod readiness;
pub mod resolver;
pub mod scenario;
pub mod target;

pub use config::{HarnessConfig, ResolvedHarnessConfig, TunnelWait};
pub use docker::{Container, ContainerSpec, DockerCli, Network};
pub use environment::WebhookEnvironment;
pub use error::{HarnessError, Result};
pub use mock_tunnel::MockTunnel;
pub use probe::HttpProbe;
pub use readiness::{wait_until_ready, HttpReady, LogLineReady, Readiness, TunnelReady};
pub use resolver::{resolve_public_url, TunnelApi};
pub use scenario::{WebhookScenario, GREETING_BODY};
pub use target::TargetService;
