//! In-process target service for tests that run without Docker

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use hookcheck_server::{LastRequestStore, WebhookServer};

use crate::error::Result;

/// A webhook server bound to an ephemeral localhost port
pub struct TargetService {
    addr: SocketAddr,
    server: Arc<WebhookServer>,
    handle: JoinHandle<()>,
}

impl TargetService {
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = WebhookServer::new();

        let serving = server.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = serving.run_with_listener(listener).await {
                tracing::error!("Target service error: {}", e);
            }
        });

        Ok(Self {
            addr,
            server,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Direct access to the last-request slot for assertions
    pub fn store(&self) -> &LastRequestStore {
        self.server.store()
    }
}

impl Drop for TargetService {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
