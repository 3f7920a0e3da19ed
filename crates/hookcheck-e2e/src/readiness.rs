//! Readiness checks and bounded polling
//!
//! Startup blocks on a [`Readiness`] check instead of sleeping. A check that
//! errors counts as "not ready yet"; only the overall timeout is fatal.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::docker::DockerCli;
use crate::error::{HarnessError, Result};
use crate::probe::HttpProbe;
use crate::resolver::TunnelApi;

#[async_trait]
pub trait Readiness: Send + Sync {
    /// Human readable name used in logs and timeout errors
    fn describe(&self) -> String;

    async fn is_ready(&self) -> Result<bool>;
}

/// Poll `check` every `interval` until it reports ready or `timeout` elapses
pub async fn wait_until_ready(
    check: &dyn Readiness,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    let what = check.describe();
    // `None` when the timeout is too large to represent: wait without bound
    let deadline = Instant::now().checked_add(timeout);
    let mut attempts: u32 = 0;

    tracing::info!("Waiting for {} (timeout {:?})", what, timeout);

    loop {
        attempts += 1;
        match check.is_ready().await {
            Ok(true) => {
                tracing::info!("{} ready after {} attempt(s)", what, attempts);
                return Ok(());
            }
            Ok(false) => tracing::debug!("{} not ready (attempt {})", what, attempts),
            Err(e) => tracing::debug!("{} not ready (attempt {}): {}", what, attempts, e),
        }

        let pause = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(HarnessError::NotReady { what, timeout });
                }
                interval.min(deadline - now)
            }
            None => interval,
        };
        tokio::time::sleep(pause).await;
    }
}

/// Ready once a GET on `url` answers 2xx
pub struct HttpReady {
    probe: HttpProbe,
    url: String,
}

impl HttpReady {
    pub fn new(probe: HttpProbe, url: impl Into<String>) -> Self {
        Self {
            probe,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Readiness for HttpReady {
    fn describe(&self) -> String {
        format!("HTTP endpoint {}", self.url)
    }

    async fn is_ready(&self) -> Result<bool> {
        self.probe.is_success(&self.url).await
    }
}

/// Ready once the tunnel agent reports a public URL
pub struct TunnelReady {
    api: TunnelApi,
}

impl TunnelReady {
    pub fn new(api: TunnelApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Readiness for TunnelReady {
    fn describe(&self) -> String {
        format!("tunnel API {}", self.api.tunnels_url())
    }

    async fn is_ready(&self) -> Result<bool> {
        match self.api.public_url().await {
            Ok(_) => Ok(true),
            Err(HarnessError::NoPublicUrl) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Ready once any line of a container's log satisfies `matcher`
pub struct LogLineReady {
    docker: DockerCli,
    container_id: String,
    matcher: fn(&str) -> bool,
}

impl LogLineReady {
    pub fn new(
        docker: DockerCli,
        container_id: impl Into<String>,
        matcher: fn(&str) -> bool,
    ) -> Self {
        Self {
            docker,
            container_id: container_id.into(),
            matcher,
        }
    }
}

#[async_trait]
impl Readiness for LogLineReady {
    fn describe(&self) -> String {
        format!("log line in container {}", self.container_id)
    }

    async fn is_ready(&self) -> Result<bool> {
        let logs = self.docker.logs(&self.container_id).await?;
        Ok(logs.lines().any(self.matcher))
    }
}

/// Matches the agent's "started tunnel" line, i.e. `^.*addr=.* url=http.*`
pub fn is_tunnel_started_line(line: &str) -> bool {
    line.find("addr=")
        .map(|i| line[i + "addr=".len()..].contains(" url=http"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ReadyAfter {
        calls: AtomicU32,
        ready_on: u32,
    }

    #[async_trait]
    impl Readiness for ReadyAfter {
        fn describe(&self) -> String {
            "counter".to_string()
        }

        async fn is_ready(&self) -> Result<bool> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                return Err(HarnessError::NoPublicUrl);
            }
            Ok(n >= self.ready_on)
        }
    }

    #[tokio::test]
    async fn test_wait_until_ready_retries() {
        let check = ReadyAfter {
            calls: AtomicU32::new(0),
            ready_on: 3,
        };
        wait_until_ready(&check, Duration::from_secs(5), Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(check.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_wait_until_ready_unbounded_timeout() {
        let check = ReadyAfter {
            calls: AtomicU32::new(0),
            ready_on: 2,
        };
        wait_until_ready(&check, Duration::MAX, Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(check.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_wait_until_ready_times_out() {
        let check = ReadyAfter {
            calls: AtomicU32::new(0),
            ready_on: u32::MAX,
        };
        let result =
            wait_until_ready(&check, Duration::from_millis(50), Duration::from_millis(10)).await;

        match result {
            Err(HarnessError::NotReady { what, timeout }) => {
                assert_eq!(what, "counter");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("expected NotReady, got {:?}", other),
        }
        assert!(check.calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_tunnel_started_line() {
        assert!(is_tunnel_started_line(
            r#"t=2024-03-01T10:00:00+0000 lvl=info msg="started tunnel" obj=tunnels name=command_line addr=http://web:8081 url=https://1a2b.ngrok-free.app"#
        ));
        assert!(is_tunnel_started_line("addr= url=http"));
        assert!(!is_tunnel_started_line(
            r#"t=2024-03-01T10:00:00+0000 lvl=info msg="starting web service" obj=web addr=0.0.0.0:4040"#
        ));
        assert!(!is_tunnel_started_line("url=https://x addr=web:8081"));
        assert!(!is_tunnel_started_line(""));
    }
}
