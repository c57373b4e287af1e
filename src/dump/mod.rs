// rethinksync/src/dump/mod.rs
use async_trait::async_trait;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use which::which;

use crate::errors::{AppError, Result};

/// A `host:port` pair the dump utility connects to. Either the tunnel's
/// local forward or a direct loopback endpoint for local sync runs.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Finds the rethinkdb executable, shared by the dump and import stages.
pub fn find_rethinkdb_executable() -> Result<PathBuf> {
    which("rethinkdb").map_err(|_| {
        AppError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "rethinkdb executable not found in PATH. Please ensure the RethinkDB client tools are installed and in your PATH.",
        ))
    })
}

fn build_dump_args(
    endpoint: &Endpoint,
    source_db: &str,
    archive_path: &Path,
    pwd_file: &Path,
) -> Vec<String> {
    vec![
        "dump".to_string(),
        "-c".to_string(),
        endpoint.to_string(),
        "-e".to_string(),
        source_db.to_string(),
        "-f".to_string(),
        archive_path.display().to_string(),
        "--password-file".to_string(),
        pwd_file.display().to_string(),
    ]
}

/// The dump stage. A trait seam so the orchestrator can be tested without
/// spawning real processes.
#[async_trait]
pub trait DumpRunner: Send + Sync {
    async fn dump(
        &self,
        endpoint: &Endpoint,
        source_db: &str,
        archive_path: &Path,
        pwd_file: &Path,
    ) -> Result<()>;
}

/// Production dump runner spawning `rethinkdb dump`.
pub struct RethinkDump {
    rethinkdb_path: PathBuf,
}

impl RethinkDump {
    pub fn new(rethinkdb_path: PathBuf) -> Self {
        RethinkDump { rethinkdb_path }
    }
}

/// Invokes `rethinkdb dump` against `endpoint`, streaming its progress
/// output to the console. The password travels through a file, never an
/// argument or environment variable. A non-zero exit becomes
/// `AppError::Process { stage: "dump", .. }`; cleanup is the caller's job.
#[async_trait]
impl DumpRunner for RethinkDump {
    async fn dump(
        &self,
        endpoint: &Endpoint,
        source_db: &str,
        archive_path: &Path,
        pwd_file: &Path,
    ) -> Result<()> {
        println!("⬇️  Dumping '{source_db}' from {endpoint}...");

        let mut child = Command::new(&self.rethinkdb_path)
            .args(build_dump_args(endpoint, source_db, archive_path, pwd_file))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout_task = child.stdout.take().map(|out| tokio::spawn(stream_progress(out)));
        let stderr_task = child.stderr.take().map(|err| tokio::spawn(relay_stderr(err)));

        let status = child.wait().await?;
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        if !status.success() {
            return Err(AppError::Process {
                stage: "dump",
                table: None,
                code: status.code().unwrap_or(-1),
            });
        }

        println!("✓ Dump complete: {}", archive_path.display());
        Ok(())
    }
}

/// The dump tool emits bracketed progress bars; those lines overwrite the
/// previous console line instead of scrolling. Cosmetic only.
async fn stream_progress(out: ChildStdout) {
    let mut lines = BufReader::new(out).lines();
    let mut overwriting = false;
    while let Ok(Some(line)) = lines.next_line().await {
        if line.starts_with('[') {
            print!("\r\x1b[2K{line}");
            let _ = std::io::stdout().flush();
            overwriting = true;
        } else {
            if overwriting {
                println!();
                overwriting = false;
            }
            println!("{line}");
        }
    }
    if overwriting {
        println!();
    }
}

pub(crate) async fn relay_stderr(err: ChildStderr) {
    let mut lines = BufReader::new(err).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        eprintln!("stderr: {line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dump_args_use_password_file_not_inline_secret() {
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port: 9999,
        };
        let args = build_dump_args(
            &endpoint,
            "prod",
            Path::new("/tmp/ws/rethink_dump.tar.gz"),
            Path::new("/tmp/ws/prod-remote.txt"),
        );
        assert_eq!(
            args,
            vec![
                "dump",
                "-c",
                "127.0.0.1:9999",
                "-e",
                "prod",
                "-f",
                "/tmp/ws/rethink_dump.tar.gz",
                "--password-file",
                "/tmp/ws/prod-remote.txt",
            ]
        );
    }

    #[test]
    fn test_endpoint_formats_as_host_port() {
        let endpoint = Endpoint {
            host: "localhost".to_string(),
            port: 28015,
        };
        assert_eq!(endpoint.to_string(), "localhost:28015");
    }
}
