/// SQLite persistence layer for customer records
///
/// Every write runs in its own short transaction (begin, one statement,
/// commit) and rolls back on any statement failure. Reads go straight to the
/// pool and only ever see what the connection's isolation level allows.

use crate::customer::types::{CustomerRecord, NewCustomer, MAX_NAME_LEN, PHONE_NUMBER_LEN};
use sqlx::{
    sqlite::{SqlitePool, SqliteRow},
    Row, Sqlite, Transaction,
};

/// Store-level failures surfaced to callers
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with the same id already exists; the existing row is untouched
    #[error("customer '{id}' already exists: {cause}")]
    Duplicate { id: String, cause: String },
    /// A CHECK / NOT NULL constraint rejected the row
    #[error("constraint failed: {0}")]
    Constraint(String),
    /// Any other database failure (unavailable, locked, decode, ...)
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// SQLite-based customer record store
///
/// Cheap to clone; all clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct CustomerStorage {
    /// SQLite connection pool shared across handlers and notification tasks
    pool: SqlitePool,
}

impl CustomerStorage {
    /// Create new storage instance with database connection
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the customers schema
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        let schema = format!(
            r#"
            CREATE TABLE IF NOT EXISTS customers (
                id TEXT NOT NULL PRIMARY KEY,
                name TEXT NOT NULL CHECK(length(name) <= {MAX_NAME_LEN}),
                phone_number TEXT NOT NULL CHECK(length(phone_number) = {PHONE_NUMBER_LEN}),
                sms_sent BOOLEAN
            )
            "#
        );

        sqlx::query(&schema).execute(&self.pool).await?;

        Ok(())
    }

    /// Insert a new customer atomically
    ///
    /// Duplicate ids and constraint violations roll the transaction back and
    /// are returned as `StoreError::Duplicate` / `StoreError::Constraint`.
    pub async fn insert_customer(&self, customer: &NewCustomer) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query("INSERT INTO customers (id, name, phone_number) VALUES (?, ?, ?)")
            .bind(&customer.id)
            .bind(&customer.name)
            .bind(&customer.phone_number)
            .execute(&mut *tx)
            .await;

        if let Err(e) = inserted {
            rollback(tx, &customer.id).await;
            return Err(classify(&customer.id, e));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Retrieve a customer by id
    ///
    /// An unset `sms_sent` column reads back as `false`.
    pub async fn get_customer(&self, id: &str) -> Result<Option<CustomerRecord>, StoreError> {
        let row = sqlx::query("SELECT id, name, phone_number, sms_sent FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(record_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Flip `sms_sent` to true for one customer
    ///
    /// Returns the number of rows touched. Zero is not an error: the commit
    /// still happens and the caller decides what to make of it.
    pub async fn mark_sms_sent(&self, id: &str) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE customers SET sms_sent = TRUE WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await;

        match updated {
            Ok(result) => {
                tx.commit().await?;
                Ok(result.rows_affected())
            }
            Err(e) => {
                rollback(tx, id).await;
                Err(e.into())
            }
        }
    }

    /// Access the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every pooled connection, waiting for in-use ones to be returned
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn record_from_row(row: &SqliteRow) -> Result<CustomerRecord, sqlx::Error> {
    Ok(CustomerRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        phone_number: row.try_get("phone_number")?,
        sms_sent: row.try_get::<Option<bool>, _>("sms_sent")?.unwrap_or(false),
    })
}

async fn rollback(tx: Transaction<'_, Sqlite>, id: &str) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!("⚠️ Rollback failed for customer {}: {}", id, e);
    }
}

fn classify(id: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Duplicate {
                id: id.to_string(),
                cause: db_err.message().to_string(),
            };
        }
        if db_err.is_check_violation() {
            return StoreError::Constraint(db_err.message().to_string());
        }
    }
    StoreError::Database(err)
}
