//! Thin wrapper over the docker CLI
//!
//! Networks and containers are owned values: dropping them removes the
//! underlying docker object (best effort), so a failed startup never leaves
//! stray containers behind.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::{HarnessError, Result};

/// Handle to the docker binary
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: PathBuf,
}

impl DockerCli {
    /// Locate `docker` on PATH
    pub fn detect() -> Result<Self> {
        which::which("docker")
            .map(Self::with_binary)
            .map_err(|_| HarnessError::DockerNotFound)
    }

    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    /// Use the configured binary, falling back to PATH lookup
    pub fn from_override(bin: Option<&Path>) -> Result<Self> {
        match bin {
            Some(path) => Ok(Self::with_binary(path)),
            None => Self::detect(),
        }
    }

    fn describe<I, S>(args: I) -> String
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let parts: Vec<String> = args
            .into_iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .collect();
        format!("docker {}", parts.join(" "))
    }

    /// Run a docker subcommand and return its trimmed stdout
    pub async fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.run_with_env(args, &[]).await
    }

    /// Run a docker subcommand with extra variables in the CLI's environment.
    /// Used with `-e NAME` so values never show up on the command line.
    pub async fn run_with_env<I, S>(&self, args: I, envs: &[(String, String)]) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        tracing::debug!("{}", Self::describe(&args));

        let output = Command::new(&self.bin)
            .args(&args)
            .envs(envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(HarnessError::Docker {
                command: Self::describe(&args),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Fire-and-forget removal used from `Drop`
    fn run_detached_blocking(&self, args: &[&str]) {
        let result = std::process::Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = result {
            tracing::warn!("{} failed: {}", Self::describe(args), e);
        }
    }

    /// `docker build -t <tag> -f <dockerfile> <context>`
    pub async fn build_image(&self, tag: &str, dockerfile: &Path, context: &Path) -> Result<()> {
        tracing::info!("Building image {} from {}", tag, dockerfile.display());
        self.run([
            OsString::from("build"),
            OsString::from("-t"),
            OsString::from(tag),
            OsString::from("-f"),
            dockerfile.as_os_str().to_owned(),
            context.as_os_str().to_owned(),
        ])
        .await?;
        Ok(())
    }

    /// Combined stdout and stderr of a container
    pub async fn logs(&self, container: &str) -> Result<String> {
        let output = Command::new(&self.bin)
            .args(["logs", container])
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            return Err(HarnessError::Docker {
                command: Self::describe(["logs", container]),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }
}

/// A user-defined bridge network, removed on drop
pub struct Network {
    docker: DockerCli,
    name: String,
    removed: bool,
}

impl Network {
    pub async fn create(docker: &DockerCli, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        docker.run(["network", "create", name.as_str()]).await?;
        tracing::info!("Created network {}", name);
        Ok(Self {
            docker: docker.clone(),
            name,
            removed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn remove(&mut self) -> Result<()> {
        if !self.removed {
            self.docker.run(["network", "rm", self.name.as_str()]).await?;
            self.removed = true;
            tracing::debug!("Removed network {}", self.name);
        }
        Ok(())
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        if !self.removed {
            self.docker
                .run_detached_blocking(&["network", "rm", self.name.as_str()]);
        }
    }
}

/// Everything needed to `docker run` a service
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub image: String,
    pub name: Option<String>,
    pub network: Option<String>,
    pub network_aliases: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Passed as `-e NAME`; the value only travels through the CLI's environment
    pub secret_env: Vec<(String, String)>,
    pub exposed_ports: Vec<u16>,
    pub command: Vec<String>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_network_alias(mut self, alias: impl Into<String>) -> Self {
        self.network_aliases.push(alias.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    pub fn with_secret_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secret_env.push((name.into(), value.into()));
        self
    }

    /// Publish a container port on a random host port
    pub fn with_exposed_port(mut self, port: u16) -> Self {
        self.exposed_ports.push(port);
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Arguments for `docker run`
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-d".to_string()];

        if let Some(name) = &self.name {
            args.push("--name".to_string());
            args.push(name.clone());
        }
        if let Some(network) = &self.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        for alias in &self.network_aliases {
            args.push("--network-alias".to_string());
            args.push(alias.clone());
        }
        for (name, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", name, value));
        }
        for (name, _) in &self.secret_env {
            args.push("-e".to_string());
            args.push(name.clone());
        }
        for port in &self.exposed_ports {
            args.push("-p".to_string());
            args.push(port.to_string());
        }

        args.push(self.image.clone());
        args.extend(self.command.iter().cloned());
        args
    }
}

/// A running container, force-removed on drop
pub struct Container {
    docker: DockerCli,
    id: String,
    label: String,
    removed: bool,
    log_task: Option<JoinHandle<()>>,
}

impl Container {
    /// `docker run -d` the spec and return the started container
    pub async fn start(docker: &DockerCli, spec: &ContainerSpec) -> Result<Self> {
        let id = docker
            .run_with_env(spec.run_args(), &spec.secret_env)
            .await?;
        let label = spec.name.clone().unwrap_or_else(|| spec.image.clone());
        tracing::info!("Started container {} ({})", label, short_id(&id));

        Ok(Self {
            docker: docker.clone(),
            id,
            label,
            removed: false,
            log_task: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Host port bound to `port/tcp`
    pub async fn mapped_port(&self, port: u16) -> Result<u16> {
        let output = self
            .docker
            .run(["port".to_string(), self.id.clone(), format!("{}/tcp", port)])
            .await?;
        parse_mapped_port(&output).ok_or_else(|| HarnessError::PortNotMapped {
            container: self.label.clone(),
            port,
        })
    }

    pub async fn logs(&self) -> Result<String> {
        self.docker.logs(&self.id).await
    }

    /// Forward every log line of the container into tracing, tagged with `label`
    pub fn follow_logs(&mut self, label: impl Into<String>) -> Result<()> {
        let label = label.into();
        let mut child = Command::new(&self.docker.bin)
            .args(["logs", "-f", self.id.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let handle = tokio::spawn(async move {
            let out_label = label.clone();
            let out = async {
                if let Some(stdout) = stdout {
                    forward_lines(stdout, &out_label).await;
                }
            };
            let err = async {
                if let Some(stderr) = stderr {
                    forward_lines(stderr, &label).await;
                }
            };
            tokio::join!(out, err);
            let _ = child.wait().await;
        });

        if let Some(previous) = self.log_task.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Force-remove the container
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.log_task.take() {
            task.abort();
        }
        if !self.removed {
            self.docker.run(["rm", "-f", self.id.as_str()]).await?;
            self.removed = true;
            tracing::info!("Removed container {}", self.label);
        }
        Ok(())
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Some(task) = self.log_task.take() {
            task.abort();
        }
        if !self.removed {
            self.docker
                .run_detached_blocking(&["rm", "-f", self.id.as_str()]);
        }
    }
}

async fn forward_lines<R>(reader: R, label: &str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!(container = %label, "{}", line);
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Parse `docker port` output such as `0.0.0.0:49153\n[::]:49153`
pub fn parse_mapped_port(output: &str) -> Option<u16> {
    output
        .lines()
        .filter_map(|line| line.trim().rsplit(':').next())
        .find_map(|port| port.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mapped_port() {
        assert_eq!(parse_mapped_port("0.0.0.0:49153\n[::]:49153"), Some(49153));
        assert_eq!(parse_mapped_port("[::]:32768\n"), Some(32768));
        assert_eq!(parse_mapped_port(""), None);
        assert_eq!(parse_mapped_port("garbage"), None);
    }

    #[test]
    fn test_run_args() {
        let spec = ContainerSpec::new("webhook-ngrok")
            .with_name("hookcheck-ngrok")
            .with_network("hookcheck-net")
            .with_network_alias("ngrok")
            .with_env("PORT", "8081")
            .with_secret_env("NGROK_AUTHTOKEN", "s3cret")
            .with_exposed_port(4040)
            .with_command(["http", "web:8081"]);

        let args = spec.run_args();
        assert_eq!(
            args,
            vec![
                "run",
                "-d",
                "--name",
                "hookcheck-ngrok",
                "--network",
                "hookcheck-net",
                "--network-alias",
                "ngrok",
                "-e",
                "PORT=8081",
                "-e",
                "NGROK_AUTHTOKEN",
                "-p",
                "4040",
                "webhook-ngrok",
                "http",
                "web:8081",
            ]
        );
        assert!(!args.iter().any(|a| a.contains("s3cret")));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
