//! SSH port-forwarding for nodes whose admin port is not reachable directly
//!
//! The tunnel is a child `ssh -N -L` process. Authentication is left to the
//! user's ssh agent and configuration. The child is killed when the tunnel
//! is stopped or dropped, whichever comes first.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::config::TunnelConfig;

/// Local bind address when none is configured
pub const DEFAULT_LOCAL_BIND_HOST: &str = "127.0.0.1";

/// Address the forward targets on the remote side
pub const DEFAULT_REMOTE_BIND_HOST: &str = "127.0.0.1";

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to allocate a local port: {0}")]
    PortAllocation(#[source] std::io::Error),

    #[error("Invalid local bind address: {0}")]
    InvalidAddress(String),

    #[error("Tunnel on {addr} not ready after {timeout:?}")]
    NotReady { addr: SocketAddr, timeout: Duration },

    #[error("ssh exited before the tunnel was ready: {status}")]
    Exited { status: ExitStatus },

    #[error("Tunnel process error: {0}")]
    Process(#[from] std::io::Error),
}

/// A local port that forwards to the node's admin port
#[async_trait]
pub trait PortForward: Send + Sync + std::fmt::Debug {
    /// Establish the forward and wait until it accepts connections
    async fn start(&mut self) -> Result<SocketAddr, TunnelError>;

    /// Local address to dial, once started
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Tear the forward down; calling it again is a no-op
    async fn stop(&mut self) -> Result<(), TunnelError>;
}

/// Port-forward through the system `ssh` client
#[derive(Debug)]
pub struct SshTunnel {
    config: TunnelConfig,
    child: Option<Child>,
    local_addr: Option<SocketAddr>,
}

impl SshTunnel {
    pub fn new(config: TunnelConfig) -> Self {
        Self {
            config,
            child: None,
            local_addr: None,
        }
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// `[user@]host`
    fn destination(&self) -> String {
        match &self.config.ssh_username {
            Some(user) => format!("{user}@{}", self.config.remote_host),
            None => self.config.remote_host.clone(),
        }
    }

    /// Arguments passed to ssh for a forward bound on `local`
    pub fn command_args(&self, local: SocketAddr) -> Vec<String> {
        vec![
            "-N".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
            "-L".to_string(),
            format!(
                "{}:{}:{}:{}",
                local.ip(),
                local.port(),
                DEFAULT_REMOTE_BIND_HOST,
                self.config.remote_port
            ),
            self.destination(),
        ]
    }

    async fn resolve_local_addr(&self) -> Result<SocketAddr, TunnelError> {
        let host = self
            .config
            .local_host
            .as_deref()
            .unwrap_or(DEFAULT_LOCAL_BIND_HOST);

        let port = match self.config.local_port {
            Some(port) => port,
            None => {
                // Let the OS pick a free port, then release it for ssh
                let listener = TcpListener::bind((host, 0))
                    .await
                    .map_err(TunnelError::PortAllocation)?;
                listener
                    .local_addr()
                    .map_err(TunnelError::PortAllocation)?
                    .port()
            }
        };

        format!("{host}:{port}")
            .parse()
            .map_err(|_| TunnelError::InvalidAddress(format!("{host}:{port}")))
    }

    async fn wait_until_ready(
        child: &mut Child,
        addr: SocketAddr,
        timeout: Duration,
    ) -> Result<(), TunnelError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Err(TunnelError::Exited { status });
            }
            if TcpStream::connect(addr).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TunnelError::NotReady { addr, timeout });
            }
            sleep(READY_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PortForward for SshTunnel {
    async fn start(&mut self) -> Result<SocketAddr, TunnelError> {
        if let Some(addr) = self.local_addr {
            return Ok(addr);
        }

        let local = self.resolve_local_addr().await?;
        let args = self.command_args(local);
        debug!("Spawning {} {}", self.config.ssh_program, args.join(" "));

        let mut child = Command::new(&self.config.ssh_program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| TunnelError::Spawn {
                program: self.config.ssh_program.clone(),
                source,
            })?;

        if let Err(e) = Self::wait_until_ready(&mut child, local, self.config.ready_timeout).await {
            let _ = child.kill().await;
            return Err(e);
        }

        info!(
            "Started ssh tunnel to {}:{} on {}",
            self.config.remote_host, self.config.remote_port, local
        );
        self.child = Some(child);
        self.local_addr = Some(local);
        Ok(local)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    async fn stop(&mut self) -> Result<(), TunnelError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        if let Some(addr) = self.local_addr.take() {
            info!("Stopping ssh tunnel {}", addr);
        }

        if child.try_wait()?.is_none() {
            child.kill().await?;
        }
        Ok(())
    }
}
