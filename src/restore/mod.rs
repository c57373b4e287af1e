// rethinksync/src/restore/mod.rs
pub mod archive;
pub mod import;

pub use archive::{TableExportUnit, discover_table_exports, expand_archive};
pub use import::{RethinkImporter, TableImporter, import_all, select_tables};
