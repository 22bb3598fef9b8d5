//! Test utilities for database integration tests
//!
//! Every [`TestDatabase`] is a private in-memory SQLite database, so tests
//! never share state and need no external services.

use crate::DbConnection;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseBackend, Statement};
use sea_orm_migration::MigratorTrait;
use sendwise_migrations::Migrator;
use std::sync::Arc;

pub struct TestDatabase {
    pub db: Arc<DbConnection>,
}

impl TestDatabase {
    /// Empty database without any tables
    pub async fn new() -> anyhow::Result<Self> {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        // A second pooled connection would open a different in-memory database
        opt.max_connections(1).min_connections(1).sqlx_logging(false);

        let db = Database::connect(opt).await?;
        let test_db = Self { db: Arc::new(db) };
        test_db.test_connection().await?;
        Ok(test_db)
    }

    /// Database with the full schema applied
    pub async fn with_migrations() -> anyhow::Result<Self> {
        let test_db = Self::new().await?;
        Migrator::up(test_db.db.as_ref(), None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
        Ok(test_db)
    }

    pub fn connection(&self) -> Arc<DbConnection> {
        self.db.clone()
    }

    async fn test_connection(&self) -> anyhow::Result<()> {
        self.db
            .execute(Statement::from_string(
                DatabaseBackend::Sqlite,
                "SELECT 1".to_owned(),
            ))
            .await?;
        Ok(())
    }
}
