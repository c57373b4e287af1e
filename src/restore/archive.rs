// rethinksync/src/restore/archive.rs
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::errors::{AppError, Result};

/// One discovered table export: the data file, the optional sidecar
/// metadata file and the table name derived from the file basename.
#[derive(Debug, Clone)]
pub struct TableExportUnit {
    pub table: String,
    pub data_path: PathBuf,
    pub info_path: Option<PathBuf>,
    pub primary_key: Option<String>,
}

/// The only field consulted in the sidecar `.info` file.
#[derive(Debug, Deserialize)]
struct TableInfo {
    primary_key: Option<String>,
}

/// Extracts the gzip-compressed tar archive produced by the dump stage
/// into `extract_to_dir`.
pub fn expand_archive(archive_path: &Path, extract_to_dir: &Path) -> Result<()> {
    if !archive_path.is_file() {
        return Err(AppError::Io(std::io::Error::other(format!(
            "Archive for extraction is not a file: {}",
            archive_path.display()
        ))));
    }
    if !extract_to_dir.exists() {
        std::fs::create_dir_all(extract_to_dir)?;
    }

    println!(
        "Extracting {} to {}",
        archive_path.display(),
        extract_to_dir.display()
    );

    let archive_file = File::open(archive_path)?;
    let gz_decoder = flate2::read::GzDecoder::new(archive_file);
    let mut archive = tar::Archive::new(gz_decoder);
    archive.unpack(extract_to_dir)?;

    println!("✓ Decompressed {}", archive_path.display());
    Ok(())
}

/// Walks `dir` for `*.json` table exports. The sidecar read is
/// best-effort: a missing or unparsable `.info` file only means no
/// primary-key hint is passed to the import tool.
pub fn discover_table_exports(dir: &Path) -> Result<Vec<TableExportUnit>> {
    let mut units = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("json")
        {
            continue;
        }
        let table = match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => continue,
        };
        let info_path = path.with_extension("info");
        let (info_path, primary_key) = if info_path.is_file() {
            let pk = read_primary_key(&info_path);
            (Some(info_path), pk)
        } else {
            (None, None)
        };
        units.push(TableExportUnit {
            table,
            data_path: path.to_path_buf(),
            info_path,
            primary_key,
        });
    }
    let with_sidecar = units.iter().filter(|u| u.info_path.is_some()).count();
    println!(
        "Discovered {} table export(s) under {} ({with_sidecar} with sidecar metadata)",
        units.len(),
        dir.display()
    );
    Ok(units)
}

fn read_primary_key(info_path: &Path) -> Option<String> {
    let bytes = std::fs::read(info_path).ok()?;
    match serde_json::from_slice::<TableInfo>(&bytes) {
        Ok(info) => info.primary_key,
        Err(e) => {
            println!(
                "Note: could not parse sidecar {} ({e}); importing without a primary-key hint",
                info_path.display()
            );
            None
        }
    }
}
