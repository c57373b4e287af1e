// rethinksync/src/config/mod.rs
use std::env;
use std::path::PathBuf;

use crate::errors::{AppError, Result};

pub const DEFAULT_SSH_PORT: u16 = 22;
pub const DEFAULT_DB_PORT: u16 = 28015;
pub const DEFAULT_LOCAL_FORWARD_PORT: u16 = 9999;
pub const LOCAL_LOOPBACK: &str = "127.0.0.1";

/// Name of the archive produced by the dump stage inside the workspace.
pub const ARCHIVE_FILE_NAME: &str = "rethink_dump.tar.gz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Tunnel to the remote host, dump the remote database and replay it
    /// into the local database.
    Pull,
    /// Dump one local database and replay it into another local database.
    Sync,
}

/// SSH port-forward parameters for the pull task.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub username: String,
    pub host: String,
    pub port: u16,
    pub dst_host: String,
    pub dst_port: u16,
    pub local_host: String,
    pub local_port: u16,
    pub keep_alive: bool,
}

/// Explicit caller-supplied settings. These take precedence over the
/// environment, which takes precedence over built-in defaults. Interactive
/// prompting (where it exists) feeds its answers in through this struct.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub remote_db: Option<String>,
    /// Candidate list of remote databases. A single-element list narrows to
    /// that element; a longer list still needs an explicit `remote_db`.
    pub remote_db_choices: Vec<String>,
    pub local_db: Option<String>,
    pub remote_pwd: Option<String>,
    pub local_pwd: Option<String>,
    pub tunnel_username: Option<String>,
    pub tunnel_host: Option<String>,
    pub tunnel_port: Option<u16>,
    pub local_forward_port: Option<u16>,
    pub temp_root: Option<PathBuf>,
    pub include_tables: Vec<String>,
    pub exclude_tables: Vec<String>,
    pub fetch_only: Option<bool>,
    pub fetch_to: Option<PathBuf>,
    pub force: Option<bool>,
    pub merge: Option<bool>,
}

/// Immutable-after-resolution description of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub task: Task,
    pub remote_db: String,
    pub local_db: String,
    pub remote_pwd: String,
    pub local_pwd: String,
    pub tunnel: TunnelConfig,
    pub include_tables: Vec<String>,
    pub exclude_tables: Vec<String>,
    pub temp_root: PathBuf,
    pub fetch_only: bool,
    pub fetch_to: Option<PathBuf>,
    pub force: bool,
    pub merge: bool,
}

/// Resolves the run configuration from overrides and the process
/// environment. All missing required settings are reported together in a
/// single `AppError::Config`.
pub fn resolve(task: Task, overrides: &Overrides) -> Result<RunConfig> {
    resolve_with(task, overrides, |name| env::var(name).ok())
}

fn resolve_with<F>(task: Task, overrides: &Overrides, lookup: F) -> Result<RunConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env_string = |name: &str| -> Option<String> {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let env_bool = |name: &str| -> Option<bool> {
        env_string(name).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    };
    let env_port = |name: &str| -> Option<u16> { env_string(name).and_then(|v| v.parse().ok()) };
    let env_list = |name: &str| -> Vec<String> {
        env_string(name)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut missing: Vec<String> = Vec::new();

    let remote_db = overrides
        .remote_db
        .clone()
        .or_else(|| {
            if overrides.remote_db_choices.len() == 1 {
                Some(overrides.remote_db_choices[0].clone())
            } else {
                None
            }
        })
        .or_else(|| env_string("REMOTE_DB_NAME"));
    if remote_db.is_none() {
        if overrides.remote_db_choices.len() > 1 {
            println!(
                "Multiple remote database candidates given ({:?}); one must be selected explicitly.",
                overrides.remote_db_choices
            );
        }
        missing.push("remote_db".to_string());
    }

    let local_db = overrides.local_db.clone().or_else(|| env_string("DB_NAME"));
    if local_db.is_none() {
        missing.push("local_db".to_string());
    }

    let remote_pwd = overrides
        .remote_pwd
        .clone()
        .or_else(|| env_string("REMOTE_DB_ADMIN_PASSWORD"));
    if remote_pwd.is_none() {
        missing.push("remote_pwd".to_string());
    }

    let local_pwd = overrides
        .local_pwd
        .clone()
        .or_else(|| env_string("LOCAL_DB_ADMIN_PASSWORD"));
    if local_pwd.is_none() {
        missing.push("local_pwd".to_string());
    }

    let tunnel_username = overrides
        .tunnel_username
        .clone()
        .or_else(|| env_string("SSH_TUNNEL_USER"));
    let tunnel_host = overrides
        .tunnel_host
        .clone()
        .or_else(|| env_string("SSH_TUNNEL_HOST"));
    // The tunnel is only established for pulls; sync runs stay on loopback.
    if task == Task::Pull {
        if tunnel_username.is_none() {
            missing.push("tunnel.username".to_string());
        }
        if tunnel_host.is_none() {
            missing.push("tunnel.host".to_string());
        }
    }

    let fetch_only = overrides
        .fetch_only
        .or_else(|| env_bool("FETCH_ONLY"))
        .unwrap_or(false);
    let fetch_to = overrides
        .fetch_to
        .clone()
        .or_else(|| env_string("FETCH_TO").map(PathBuf::from));
    if fetch_only && fetch_to.is_none() {
        missing.push("fetch_to".to_string());
    }

    if !missing.is_empty() {
        return Err(AppError::Config(missing));
    }

    let mut include_tables = if overrides.include_tables.is_empty() {
        env_list("INCLUDE_TABLES")
    } else {
        overrides.include_tables.clone()
    };
    let mut exclude_tables = if overrides.exclude_tables.is_empty() {
        env_list("EXCLUDE_TABLES")
    } else {
        overrides.exclude_tables.clone()
    };
    if !include_tables.is_empty() && !exclude_tables.is_empty() {
        println!(
            "Both include and exclude table lists were given; the include list wins and {:?} is ignored.",
            exclude_tables
        );
        exclude_tables.clear();
    }
    include_tables.sort();
    include_tables.dedup();
    exclude_tables.sort();
    exclude_tables.dedup();

    let tunnel = TunnelConfig {
        username: tunnel_username.unwrap_or_default(),
        host: tunnel_host.unwrap_or_default(),
        port: overrides
            .tunnel_port
            .or_else(|| env_port("SSH_TUNNEL_PORT"))
            .unwrap_or(DEFAULT_SSH_PORT),
        dst_host: env_string("TUNNEL_DST_HOST").unwrap_or_else(|| LOCAL_LOOPBACK.to_string()),
        dst_port: env_port("TUNNEL_DST_PORT").unwrap_or(DEFAULT_DB_PORT),
        local_host: LOCAL_LOOPBACK.to_string(),
        local_port: overrides
            .local_forward_port
            .or_else(|| env_port("TUNNEL_LOCAL_PORT"))
            .unwrap_or(DEFAULT_LOCAL_FORWARD_PORT),
        keep_alive: env_bool("TUNNEL_KEEP_ALIVE").unwrap_or(true),
    };

    Ok(RunConfig {
        task,
        remote_db: remote_db.unwrap_or_default(),
        local_db: local_db.unwrap_or_default(),
        remote_pwd: remote_pwd.unwrap_or_default(),
        local_pwd: local_pwd.unwrap_or_default(),
        tunnel,
        include_tables,
        exclude_tables,
        temp_root: overrides
            .temp_root
            .clone()
            .or_else(|| env_string("TEMP_DIR").map(PathBuf::from))
            .unwrap_or_else(env::temp_dir),
        fetch_only,
        fetch_to,
        force: overrides.force.or_else(|| env_bool("FORCE")).unwrap_or(false),
        merge: overrides
            .merge
            .or_else(|| env_bool("MERGE_TABLES"))
            .unwrap_or(false),
    })
}
