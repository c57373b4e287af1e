// rethinksync/src/tunnel/mod.rs
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use which::which;

use crate::config::TunnelConfig;
use crate::errors::{AppError, Result};

const ESTABLISH_ATTEMPTS: u32 = 40;
const ESTABLISH_INTERVAL: Duration = Duration::from_millis(250);

fn find_ssh_executable(host: &str) -> Result<PathBuf> {
    which("ssh").map_err(|_| AppError::Tunnel {
        host: host.to_string(),
        reason: "ssh executable not found in PATH".to_string(),
    })
}

/// Live port forward owned for the duration of one pull run. Closing
/// consumes the handle, so a handle cannot be closed twice; if `open`
/// itself fails, `kill_on_drop` reaps the partially-established process.
#[derive(Debug)]
pub struct TunnelHandle {
    child: Child,
}

impl TunnelHandle {
    pub async fn close(mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        println!("🔌 SSH tunnel closed");
    }
}

/// Opens and closes the port forward for one pull run. A trait seam so
/// orchestrator tests can fail the establishment and count closes.
#[async_trait]
pub trait TunnelOpener: Send + Sync {
    type Forward: Send;

    async fn open(&self, cfg: &TunnelConfig) -> Result<Self::Forward>;
    async fn close(&self, forward: Self::Forward);
}

/// Production opener backed by the system `ssh` binary.
pub struct SshOpener;

#[async_trait]
impl TunnelOpener for SshOpener {
    type Forward = TunnelHandle;

    async fn open(&self, cfg: &TunnelConfig) -> Result<TunnelHandle> {
        open(cfg).await
    }

    async fn close(&self, forward: TunnelHandle) {
        forward.close().await;
    }
}

fn build_ssh_args(cfg: &TunnelConfig) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "ExitOnForwardFailure=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
    ];
    if cfg.keep_alive {
        args.push("-o".to_string());
        args.push("ServerAliveInterval=30".to_string());
    }
    args.push("-N".to_string());
    args.push("-L".to_string());
    args.push(format!(
        "{}:{}:{}:{}",
        cfg.local_host, cfg.local_port, cfg.dst_host, cfg.dst_port
    ));
    args.push("-p".to_string());
    args.push(cfg.port.to_string());
    args.push(format!("{}@{}", cfg.username, cfg.host));
    args
}

/// Establishes the SSH port forward and waits until the forwarded local
/// port accepts a TCP connection. On failure the spawned process is reaped
/// before the error is returned.
pub async fn open(cfg: &TunnelConfig) -> Result<TunnelHandle> {
    let ssh_path = find_ssh_executable(&cfg.host)?;
    println!(
        "🔐 Opening SSH tunnel {}:{} -> {}:{} via {}@{}...",
        cfg.local_host, cfg.local_port, cfg.dst_host, cfg.dst_port, cfg.username, cfg.host
    );

    let mut child = Command::new(ssh_path)
        .args(build_ssh_args(cfg))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| AppError::Tunnel {
            host: cfg.host.clone(),
            reason: format!("failed to spawn ssh: {e}"),
        })?;

    for _ in 0..ESTABLISH_ATTEMPTS {
        if let Some(status) = child.try_wait()? {
            return Err(AppError::Tunnel {
                host: cfg.host.clone(),
                reason: format!("ssh exited during establishment: {status}"),
            });
        }
        if TcpStream::connect((cfg.local_host.as_str(), cfg.local_port))
            .await
            .is_ok()
        {
            println!("✓ SSH tunnel established");
            return Ok(TunnelHandle { child });
        }
        tokio::time::sleep(ESTABLISH_INTERVAL).await;
    }

    let _ = child.start_kill();
    let _ = child.wait().await;
    Err(AppError::Tunnel {
        host: cfg.host.clone(),
        reason: "forwarded local port never became reachable".to_string(),
    })
}
