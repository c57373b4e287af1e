// rethinksync/src/pipeline/mod.rs
use std::fmt;
use std::fs;
use std::path::Path;

use crate::config::{DEFAULT_DB_PORT, LOCAL_LOOPBACK, RunConfig};
use crate::db::{self, Connector, ControlPlane, ReqlConnector};
use crate::dump::{self, DumpRunner, Endpoint, RethinkDump};
use crate::errors::{AppError, Result};
use crate::restore::{self, RethinkImporter, TableImporter};
use crate::tunnel::{SshOpener, TunnelOpener};
use crate::workspace::Workspace;

/// Named stages of one pipeline run. Every run, however it fails, reaches
/// `CleaningUp` before terminating in `Succeeded` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TunnelOpening,
    Dumping,
    Provisioning,
    Expanding,
    Importing,
    CleaningUp,
    Succeeded,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::TunnelOpening => "opening tunnel",
            Stage::Dumping => "dumping",
            Stage::Provisioning => "provisioning",
            Stage::Expanding => "expanding",
            Stage::Importing => "importing",
            Stage::CleaningUp => "cleaning up",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn announce(stage: Stage) {
    println!("⚙️ {stage}...");
}

/// Terminal announcement after teardown. `Failed` carries the originating
/// error for user-visible reporting; `Succeeded` carries nothing.
fn conclude(result: &Result<()>) {
    match result {
        Ok(()) => println!("🏁 Run {}", Stage::Succeeded),
        Err(e) => println!("🏁 Run {}: {e}", Stage::Failed),
    }
}

/// Pull flow: tunnel, dump the remote database through it, then restore
/// into the local database (or just copy the archive out when fetch-only).
pub async fn run_pull(cfg: &RunConfig) -> Result<()> {
    let rethinkdb_path = dump::find_rethinkdb_executable()?;
    run_pull_with(
        cfg,
        &SshOpener,
        &RethinkDump::new(rethinkdb_path.clone()),
        &ReqlConnector,
        &RethinkImporter::new(rethinkdb_path),
    )
    .await
}

pub(crate) async fn run_pull_with<T, D, F, I>(
    cfg: &RunConfig,
    opener: &T,
    dumper: &D,
    connector: &F,
    importer: &I,
) -> Result<()>
where
    T: TunnelOpener,
    D: DumpRunner,
    F: Connector,
    I: TableImporter + ?Sized,
{
    let mut workspace = Workspace::create(&cfg.temp_root)?;
    if let Err(e) = stage_credentials(cfg, &workspace) {
        teardown(opener, None, None::<&mut F::Conn>, &mut workspace).await;
        let result = Err(e);
        conclude(&result);
        return result;
    }

    announce(Stage::TunnelOpening);
    let tunnel = match opener.open(&cfg.tunnel).await {
        Ok(forward) => forward,
        Err(e) => {
            teardown(opener, None, None::<&mut F::Conn>, &mut workspace).await;
            let result = Err(e);
            conclude(&result);
            return result;
        }
    };

    let endpoint = Endpoint {
        host: cfg.tunnel.local_host.clone(),
        port: cfg.tunnel.local_port,
    };
    let (result, mut ctl) = dump_and_restore(cfg, &endpoint, &workspace, dumper, connector, importer).await;
    teardown(opener, Some(tunnel), ctl.as_mut(), &mut workspace).await;
    conclude(&result);
    result
}

/// Local sync/backup flow: same stages as a pull against a direct loopback
/// endpoint, with no tunnel to open or close.
pub async fn run_local_sync(cfg: &RunConfig) -> Result<()> {
    let rethinkdb_path = dump::find_rethinkdb_executable()?;
    run_local_sync_with(
        cfg,
        &RethinkDump::new(rethinkdb_path.clone()),
        &ReqlConnector,
        &RethinkImporter::new(rethinkdb_path),
    )
    .await
}

pub(crate) async fn run_local_sync_with<D, F, I>(
    cfg: &RunConfig,
    dumper: &D,
    connector: &F,
    importer: &I,
) -> Result<()>
where
    D: DumpRunner,
    F: Connector,
    I: TableImporter + ?Sized,
{
    let mut workspace = Workspace::create(&cfg.temp_root)?;
    if let Err(e) = stage_credentials(cfg, &workspace) {
        teardown(&SshOpener, None, None::<&mut F::Conn>, &mut workspace).await;
        let result = Err(e);
        conclude(&result);
        return result;
    }

    let endpoint = Endpoint {
        host: LOCAL_LOOPBACK.to_string(),
        port: DEFAULT_DB_PORT,
    };
    let (result, mut ctl) = dump_and_restore(cfg, &endpoint, &workspace, dumper, connector, importer).await;
    teardown(&SshOpener, None, ctl.as_mut(), &mut workspace).await;
    conclude(&result);
    result
}

fn stage_credentials(cfg: &RunConfig, workspace: &Workspace) -> Result<()> {
    workspace.stage_credential(&workspace.remote_pwd_file(&cfg.remote_db), &cfg.remote_pwd)?;
    workspace.stage_credential(&workspace.local_pwd_file(&cfg.local_db), &cfg.local_pwd)?;
    Ok(())
}

/// The fallible middle of a run. Returns the control connection alongside
/// the result so teardown can close it on the failure paths too.
async fn dump_and_restore<D, F, I>(
    cfg: &RunConfig,
    endpoint: &Endpoint,
    workspace: &Workspace,
    dumper: &D,
    connector: &F,
    importer: &I,
) -> (Result<()>, Option<F::Conn>)
where
    D: DumpRunner,
    F: Connector,
    I: TableImporter + ?Sized,
{
    announce(Stage::Dumping);
    let archive_path = workspace.archive_path();
    if let Err(e) = dumper
        .dump(
            endpoint,
            &cfg.remote_db,
            &archive_path,
            &workspace.remote_pwd_file(&cfg.remote_db),
        )
        .await
    {
        return (Err(e), None);
    }

    if cfg.fetch_only {
        let result = match &cfg.fetch_to {
            Some(dest) => finish_fetch_only(&archive_path, dest),
            None => Err(AppError::Config(vec!["fetch_to".to_string()])),
        };
        return (result, None);
    }

    announce(Stage::Provisioning);
    let mut ctl = match connector
        .connect(LOCAL_LOOPBACK, DEFAULT_DB_PORT, &cfg.local_pwd)
        .await
    {
        Ok(ctl) => ctl,
        Err(e) => return (Err(e), None),
    };

    let result = restore_into_local(&mut ctl, importer, cfg, workspace).await;
    (result, Some(ctl))
}

/// Provision the local database, expand the archive and import every
/// selected table. Generic over the control plane and importer seams.
pub(crate) async fn restore_into_local<C, I>(
    ctl: &mut C,
    importer: &I,
    cfg: &RunConfig,
    workspace: &Workspace,
) -> Result<()>
where
    C: ControlPlane + ?Sized,
    I: TableImporter + ?Sized,
{
    db::ensure_database(ctl, &cfg.local_db).await?;

    announce(Stage::Expanding);
    restore::expand_archive(&workspace.archive_path(), workspace.path())?;
    let units = restore::discover_table_exports(workspace.path())?;
    let units = restore::select_tables(units, &cfg.include_tables, &cfg.exclude_tables);

    announce(Stage::Importing);
    restore::import_all(
        ctl,
        importer,
        &units,
        &cfg.local_db,
        &workspace.local_pwd_file(&cfg.local_db),
        cfg.merge,
    )
    .await
}

/// Fetch-only runs stop after the dump: the archive is copied to the
/// requested destination and the restore stages are skipped entirely.
pub(crate) fn finish_fetch_only(archive_path: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::copy(archive_path, dest)?;
    println!("✓ Archive copied to {}", dest.display());
    Ok(())
}

/// The single funnel every run exits through: close the tunnel, close the
/// control connection, remove the workspace, in that order. Cleanup
/// failures are logged and never override the run's primary result.
async fn teardown<T, C>(
    opener: &T,
    tunnel: Option<T::Forward>,
    ctl: Option<&mut C>,
    workspace: &mut Workspace,
) where
    T: TunnelOpener,
    C: ControlPlane + ?Sized,
{
    announce(Stage::CleaningUp);
    if let Some(forward) = tunnel {
        opener.close(forward).await;
    }
    if let Some(ctl) = ctl {
        if let Err(e) = ctl.close().await {
            println!(
                "⚠ {}",
                AppError::Cleanup(format!("closing control connection: {e}"))
            );
        }
    }
    if let Err(e) = workspace.remove() {
        println!(
            "⚠ {}",
            AppError::Cleanup(format!(
                "removing workspace {}: {e}",
                workspace.path().display()
            ))
        );
    }
}
