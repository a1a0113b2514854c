use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection};

pub mod alert;
pub mod channel;
pub mod config;
pub mod datasource;
pub mod rule;
pub mod send_record;
pub mod silence;
pub mod template;
pub mod ticket;

pub use alert::AlertRow;
pub use channel::ChannelRow;
pub use datasource::DatasourceRow;
pub use rule::RuleRow;
pub use send_record::SendRecordRow;
pub use template::TemplateRow;

/// Unified access layer over the alert database.
///
/// Wraps a SeaORM connection pool; every operation checks out its own
/// connection, so concurrent scheduler tasks, notification workers and
/// webhook handlers never share session state.
pub struct AlertStore {
    pub(crate) db: DatabaseConnection,
}

impl AlertStore {
    /// Connect and run pending migrations. `url` is a SeaORM connection
    /// string, e.g. `sqlite://data/alerthub.db?mode=rwc` or
    /// `sqlite::memory:`.
    pub async fn new(url: &str) -> Result<Self> {
        let db = Database::connect(url).await?;

        if url.starts_with("sqlite") {
            db.execute_unprepared("PRAGMA journal_mode=WAL;").await?;
        }

        Migrator::up(&db, None).await?;

        tracing::info!(url = %redact_url(url), "alert store initialized");
        Ok(Self { db })
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

/// Strip userinfo from a connection URL before logging it.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
