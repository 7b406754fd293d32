//! Database configuration module for `petro-ledger`.
//!
//! This module handles the database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust
//! models without hand-written DDL. Production runs against `MySQL`; tests use
//! in-memory `SQLite` through the same code path.

use crate::config::DatabaseConfig;
use crate::entities::{
    AuditLog, CustomerBalance, DealPrice, FillingHistory, FillingRequest, Voucher,
    VoucherHistory, VoucherItem,
};
use crate::errors::Result;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Returns true when the server refused the connection because it ran out of
/// connection slots (`ER_CON_COUNT_ERROR`, code 1040).
#[must_use]
pub fn is_connection_exhausted(err: &DbErr) -> bool {
    let message = err.to_string();
    message.contains("1040")
        || message.contains("ER_CON_COUNT_ERROR")
        || message.contains("Too many connections")
}

/// Establishes a pooled connection, retrying with a fixed backoff while the
/// server reports connection exhaustion. Other errors fail immediately.
#[instrument(skip(config), fields(retries = config.connect_retries))]
pub async fn create_connection(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .sqlx_logging(false);

    let mut attempt = 0;
    loop {
        match Database::connect(options.clone()).await {
            Ok(db) => {
                info!("Database connection established");
                return Ok(db);
            }
            Err(e) if is_connection_exhausted(&e) && attempt < config.connect_retries => {
                attempt += 1;
                warn!(
                    "Database refused connection ({}), retry {}/{} in {}ms",
                    e, attempt, config.connect_retries, config.retry_backoff_ms
                );
                tokio::time::sleep(Duration::from_millis(config.retry_backoff_ms)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn create_table<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables that do not exist yet.
///
/// Parents are created before the tables holding foreign keys to them.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let schema = Schema::new(db.get_database_backend());

    create_table(db, &schema, DealPrice).await?;
    create_table(db, &schema, CustomerBalance).await?;
    create_table(db, &schema, FillingRequest).await?;
    create_table(db, &schema, FillingHistory).await?;
    create_table(db, &schema, AuditLog).await?;
    create_table(db, &schema, Voucher).await?;
    create_table(db, &schema, VoucherItem).await?;
    create_table(db, &schema, VoucherHistory).await?;

    info!("Database tables ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        audit_log::Model as AuditLogModel, customer_balance::Model as CustomerBalanceModel,
        deal_price::Model as DealPriceModel, voucher::Model as VoucherModel,
    };
    use sea_orm::{QuerySelect, RuntimeErr};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Tables exist when they can be queried
        let _: Vec<DealPriceModel> = DealPrice::find().limit(1).all(&db).await?;
        let _: Vec<CustomerBalanceModel> = CustomerBalance::find().limit(1).all(&db).await?;
        let _: Vec<AuditLogModel> = AuditLog::find().limit(1).all(&db).await?;
        let _: Vec<VoucherModel> = Voucher::find().limit(1).all(&db).await?;

        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_connection_sqlite() -> Result<()> {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            connect_retries: 0,
            retry_backoff_ms: 0,
        };
        let db = create_connection(&config).await?;
        create_tables(&db).await?;
        Ok(())
    }

    #[test]
    fn test_is_connection_exhausted() {
        let exhausted = DbErr::Conn(RuntimeErr::Internal(
            "error returned from database: 1040 (08004): Too many connections".to_string(),
        ));
        assert!(is_connection_exhausted(&exhausted));

        let other = DbErr::Conn(RuntimeErr::Internal("access denied".to_string()));
        assert!(!is_connection_exhausted(&other));
    }
}
