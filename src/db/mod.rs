// rethinksync/src/db/mod.rs
use async_trait::async_trait;
use futures::TryStreamExt;
use reql::cmd::connect::Options;
use reql::{Session, r};

use crate::errors::Result;

/// Control-plane operations the pipeline needs from the local database
/// engine. Kept as a trait so the import sequencing and provisioning logic
/// can be exercised against a recording mock.
#[async_trait]
pub trait ControlPlane: Send {
    async fn db_list(&mut self) -> Result<Vec<String>>;
    async fn db_create(&mut self, name: &str) -> Result<()>;
    async fn table_drop(&mut self, db: &str, table: &str) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Opens the control connection for one restore. A trait seam matching
/// `ControlPlane`, so orchestrator tests can refuse the connection.
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: ControlPlane;

    async fn connect(&self, host: &str, port: u16, password: &str) -> Result<Self::Conn>;
}

pub struct ReqlConnector;

#[async_trait]
impl Connector for ReqlConnector {
    type Conn = ReqlControl;

    async fn connect(&self, host: &str, port: u16, password: &str) -> Result<ReqlControl> {
        ReqlControl::connect(host, port, password).await
    }
}

/// Control connection backed by the RethinkDB driver, opened once per
/// restore and closed exactly once at teardown.
pub struct ReqlControl {
    session: Session,
}

impl ReqlControl {
    pub async fn connect(host: &str, port: u16, password: &str) -> Result<Self> {
        let options = Options::new()
            .host(host.to_string())
            .port(port)
            .user("admin".to_string())
            .password(password.to_string());
        let session = r.connect(options).await?;
        println!("✓ Control connection to {host}:{port} established");
        Ok(ReqlControl { session })
    }
}

#[async_trait]
impl ControlPlane for ReqlControl {
    async fn db_list(&mut self) -> Result<Vec<String>> {
        let mut query = r.db_list().run(&self.session);
        let names: Option<Vec<String>> = query.try_next().await?;
        Ok(names.unwrap_or_default())
    }

    async fn db_create(&mut self, name: &str) -> Result<()> {
        let mut query = r.db_create(name).run(&self.session);
        let _: Option<serde_json::Value> = query.try_next().await?;
        Ok(())
    }

    async fn table_drop(&mut self, db: &str, table: &str) -> Result<()> {
        let mut query = r.db(db).table_drop(table).run(&self.session);
        let _: Option<serde_json::Value> = query.try_next().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // The driver tears the connection down on drop; nothing to flush.
        Ok(())
    }
}

/// Lists the existing databases and creates `name` if it is absent.
/// "Already exists" is the common case, not an error. There is no
///// active-database switch here: every later operation qualifies its
/// database explicitly (`r.db(..)`), which subsumes it.
pub async fn ensure_database<C: ControlPlane + ?Sized>(ctl: &mut C, name: &str) -> Result<()> {
    let existing = ctl.db_list().await?;
    if existing.iter().any(|db| db == name) {
        println!("Database '{name}' already exists on the local server.");
    } else {
        ctl.db_create(name).await?;
        println!("✓ Database '{name}' created.");
    }
    Ok(())
}
