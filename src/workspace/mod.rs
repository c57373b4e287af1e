// rethinksync/src/workspace/mod.rs
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ARCHIVE_FILE_NAME;
use crate::errors::Result;

/// Per-run temporary working directory holding the staged credential files,
/// the dumped archive and its expanded contents. The directory name carries
/// a millisecond timestamp so concurrent invocations on the same host do not
/// collide.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Creates the workspace directory. Must happen before any subprocess
    /// that writes into it is spawned.
    pub fn create(temp_root: &Path) -> Result<Self> {
        let root = temp_root.join(Utc::now().timestamp_millis().to_string());
        fs::create_dir_all(&root)?;
        println!("📂 Workspace created at: {}", root.display());
        Ok(Workspace {
            root,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn archive_path(&self) -> PathBuf {
        self.root.join(ARCHIVE_FILE_NAME)
    }

    pub fn remote_pwd_file(&self, db_name: &str) -> PathBuf {
        self.root.join(format!("{db_name}-remote.txt"))
    }

    pub fn local_pwd_file(&self, db_name: &str) -> PathBuf {
        self.root.join(format!("{db_name}-local.txt"))
    }

    /// Writes a password file containing exactly the password bytes,
    /// readable only by the owner. Consumed by subprocess
    /// `--password-file` arguments so the secret never shows up in a
    /// process listing.
    pub fn stage_credential(&self, path: &Path, password: &str) -> Result<()> {
        fs::write(path, password.as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Recursively removes the workspace. Safe to call more than once;
    /// removal failure is reported to the caller for logging, never
    /// escalated past teardown.
    pub fn remove(&mut self) -> Result<()> {
        if self.removed {
            return Ok(());
        }
        fs::remove_dir_all(&self.root)?;
        self.removed = true;
        println!("🗑 Removed workspace {}", self.root.display());
        Ok(())
    }

}
