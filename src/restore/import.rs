// rethinksync/src/restore/import.rs
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::db::ControlPlane;
use crate::dump::relay_stderr;
use crate::errors::{AppError, Result};
use crate::restore::archive::TableExportUnit;

/// Filters discovered units by the include-list, or failing that the
/// exclude-list. At most one of the two lists is consulted.
pub fn select_tables(
    units: Vec<TableExportUnit>,
    include: &[String],
    exclude: &[String],
) -> Vec<TableExportUnit> {
    if !include.is_empty() {
        units
            .into_iter()
            .filter(|u| include.contains(&u.table))
            .collect()
    } else if !exclude.is_empty() {
        units
            .into_iter()
            .filter(|u| !exclude.contains(&u.table))
            .collect()
    } else {
        units
    }
}

/// Drops the table before import unless merge mode is requested. The drop
/// is best-effort: a missing table already satisfies the postcondition, so
/// failures are logged and swallowed rather than failing the run.
pub async fn apply_replacement_policy<C: ControlPlane + ?Sized>(
    ctl: &mut C,
    local_db: &str,
    table: &str,
    merge: bool,
) {
    if merge {
        return;
    }
    match ctl.table_drop(local_db, table).await {
        Ok(()) => println!("Dropped table {local_db}.{table} before import"),
        Err(e) => println!("⚠ Could not drop {local_db}.{table} (continuing): {e}"),
    }
}

pub fn build_import_args(unit: &TableExportUnit, local_db: &str, pwd_file: &Path) -> Vec<String> {
    let mut args = vec![
        "import".to_string(),
        "-f".to_string(),
        unit.data_path.display().to_string(),
        "--password-file".to_string(),
        pwd_file.display().to_string(),
        "--table".to_string(),
        format!("{local_db}.{}", unit.table),
        "--format".to_string(),
        "json".to_string(),
    ];
    if let Some(pk) = &unit.primary_key {
        args.push("--pkey".to_string());
        args.push(pk.clone());
    }
    args.push("--force".to_string());
    args
}

/// One table import. A trait seam so the sequencer can be tested without
/// spawning real processes.
#[async_trait]
pub trait TableImporter: Send + Sync {
    async fn import_table(
        &self,
        unit: &TableExportUnit,
        local_db: &str,
        pwd_file: &Path,
    ) -> Result<()>;
}

/// Production importer spawning `rethinkdb import` per table.
pub struct RethinkImporter {
    rethinkdb_path: PathBuf,
}

impl RethinkImporter {
    pub fn new(rethinkdb_path: PathBuf) -> Self {
        RethinkImporter { rethinkdb_path }
    }
}

#[async_trait]
impl TableImporter for RethinkImporter {
    async fn import_table(
        &self,
        unit: &TableExportUnit,
        local_db: &str,
        pwd_file: &Path,
    ) -> Result<()> {
        let mut child = Command::new(&self.rethinkdb_path)
            .args(build_import_args(unit, local_db, pwd_file))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout_task = child.stdout.take().map(|out| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    println!("{line}");
                }
            })
        });
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
                stage: "import",
                table: Some(unit.table.clone()),
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

/// Imports the selected tables strictly one at a time: replacement policy,
/// then the import subprocess. The loop fails fast on the first non-zero
/// exit; later tables are not attempted.
pub async fn import_all<C, I>(
    ctl: &mut C,
    importer: &I,
    units: &[TableExportUnit],
    local_db: &str,
    local_pwd_file: &Path,
    merge: bool,
) -> Result<()>
where
    C: ControlPlane + ?Sized,
    I: TableImporter + ?Sized,
{
    for unit in units {
        apply_replacement_policy(ctl, local_db, &unit.table, merge).await;
        importer.import_table(unit, local_db, local_pwd_file).await?;
        println!("✓ Imported {} into {local_db}", unit.table);
    }
    println!("✓ Updates complete: {} table(s) imported into '{local_db}'", units.len());
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::MockImporter;
    use super::*;
    use crate::db::testing::MockControl;

    fn unit(table: &str, pk: Option<&str>) -> TableExportUnit {
        TableExportUnit {
            table: table.to_string(),
            data_path: PathBuf::from(format!("/tmp/ws/{table}.json")),
            info_path: pk.map(|_| PathBuf::from(format!("/tmp/ws/{table}.info"))),
            primary_key: pk.map(|s| s.to_string()),
        }
    }

    fn names(units: &[TableExportUnit]) -> Vec<&str> {
        units.iter().map(|u| u.table.as_str()).collect()
    }

    #[test]
    fn test_include_list_selects_exact_intersection() {
        let units = vec![unit("users", None), unit("orders", None), unit("logs", None)];
        let include = vec!["orders".to_string(), "missing".to_string()];
        // The exclude list is irrelevant once an include list is present.
        let exclude = vec!["orders".to_string()];
        let selected = select_tables(units, &include, &exclude);
        assert_eq!(names(&selected), vec!["orders"]);
    }

    #[test]
    fn test_exclude_list_drops_members() {
        let units = vec![unit("users", None), unit("orders", None), unit("logs", None)];
        let selected = select_tables(units, &[], &["logs".to_string()]);
        assert_eq!(names(&selected), vec!["users", "orders"]);
    }

    #[test]
    fn test_empty_lists_pass_through_unchanged() {
        let units = vec![unit("users", None), unit("orders", None)];
        let selected = select_tables(units, &[], &[]);
        assert_eq!(names(&selected), vec!["users", "orders"]);
    }

    #[tokio::test]
    async fn test_merge_mode_never_issues_a_drop() {
        let mut ctl = MockControl::default();
        apply_replacement_policy(&mut ctl, "staging", "users", true).await;
        apply_replacement_policy(&mut ctl, "staging", "no_such_table", true).await;
        assert!(ctl.drops_attempted.is_empty());
    }

    #[tokio::test]
    async fn test_replace_mode_tolerates_missing_table() {
        let mut ctl = MockControl::default();
        // Table does not exist; the drop failure must not escalate.
        apply_replacement_policy(&mut ctl, "staging", "ghosts", false).await;
        assert_eq!(ctl.drops_attempted, vec!["staging.ghosts"]);
        assert!(ctl.drops_succeeded.is_empty());
    }

    #[tokio::test]
    async fn test_import_fails_fast_and_names_the_table() {
        let mut ctl = MockControl {
            tables: vec!["users".to_string(), "orders".to_string(), "logs".to_string()],
            ..MockControl::default()
        };
        let importer = MockImporter {
            fail_on: vec!["orders".to_string()],
            ..MockImporter::default()
        };
        let units = vec![unit("users", None), unit("orders", None), unit("logs", None)];

        let err = import_all(
            &mut ctl,
            &importer,
            &units,
            "staging",
            Path::new("/tmp/ws/staging-local.txt"),
            false,
        )
        .await
        .unwrap_err();

        match err {
            AppError::Process { stage, table, code } => {
                assert_eq!(stage, "import");
                assert_eq!(table.as_deref(), Some("orders"));
                assert_eq!(code, 1);
            }
            other => panic!("expected Process error, got {other:?}"),
        }
        // logs was never attempted, neither its drop nor its import.
        assert_eq!(importer.imported_tables(), vec!["staging.users", "staging.orders"]);
        assert_eq!(ctl.drops_attempted, vec!["staging.users", "staging.orders"]);
    }

    #[test]
    fn test_primary_key_hint_propagates_to_import_args() {
        let with_pk = build_import_args(
            &unit("orders", Some("id")),
            "staging",
            Path::new("/tmp/ws/staging-local.txt"),
        );
        let pk_at = with_pk.iter().position(|a| a == "--pkey").unwrap();
        assert_eq!(with_pk[pk_at + 1], "id");
        assert_eq!(with_pk.last().map(String::as_str), Some("--force"));
        assert!(with_pk.contains(&"--table".to_string()));
        assert!(with_pk.contains(&"staging.orders".to_string()));

        let without_pk = build_import_args(
            &unit("orders", None),
            "staging",
            Path::new("/tmp/ws/staging-local.txt"),
        );
        assert!(!without_pk.iter().any(|a| a == "--pkey"));
        assert_eq!(without_pk.last().map(String::as_str), Some("--force"));
    }
}
