use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hookcheck_server::{WebhookServer, DEFAULT_PORT};

/// Webhook target - remembers the last request body it was sent
#[derive(Parser, Debug)]
#[command(name = "hookcheck-server")]
#[command(about = "Webhook receiver that replays the last request it got")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: IpAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("hookcheck_server=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let addr = SocketAddr::new(args.bind, args.port);

    WebhookServer::new()
        .run(addr)
        .await
        .with_context(|| format!("Webhook server on {} failed", addr))
}
