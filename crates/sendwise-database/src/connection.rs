//! Database connection management

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sendwise_migrations::{Migrator, MigratorTrait};
use std::sync::Arc;
use tracing::info;

pub type DbConnection = DatabaseConnection;

/// Connects to `database_url` and brings the schema up to date.
pub async fn establish_connection(database_url: &str) -> Result<Arc<DbConnection>, DbErr> {
    let mut opt = ConnectOptions::new(database_url);
    if database_url.starts_with("sqlite:") {
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(20).min_connections(2);
    }
    opt.sqlx_logging(false);

    let db = Database::connect(opt).await?;

    Migrator::up(&db, None).await?;
    info!("Database ready, migrations applied");

    Ok(Arc::new(db))
}
