// --- File: src/storage.rs ---

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::systempay::transaction::{NewTransaction, SystemPayTransaction, TransactionMode};

#[derive(Error, Debug)]
pub enum StorageError {
    #[cfg(feature = "sqlite")]
    #[error("Database query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Record #{0} not found")]
    NotFound(i64),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Audit log of every form exchanged with the gateway.
pub trait TransactionStore: Send + Sync {
    fn save_transaction<'a>(
        &'a self,
        txn: NewTransaction,
    ) -> BoxFuture<'a, Result<SystemPayTransaction, StorageError>>;

    fn set_error_message<'a>(
        &'a self,
        id: i64,
        message: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    fn get_transaction<'a>(
        &'a self,
        id: i64,
    ) -> BoxFuture<'a, Result<Option<SystemPayTransaction>, StorageError>>;

    /// Most recently created transaction of `mode` for the order.
    fn latest_for_order<'a>(
        &'a self,
        mode: TransactionMode,
        order_number: &'a str,
    ) -> BoxFuture<'a, Result<Option<SystemPayTransaction>, StorageError>>;
}

#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    transactions: RwLock<Vec<SystemPayTransaction>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransactionStore for InMemoryTransactionStore {
    fn save_transaction<'a>(
        &'a self,
        txn: NewTransaction,
    ) -> BoxFuture<'a, Result<SystemPayTransaction, StorageError>> {
        async move {
            let mut transactions = self.transactions.write().await;
            let id = transactions.len() as i64 + 1;
            let saved = SystemPayTransaction::from_new(id, txn, Utc::now());
            transactions.push(saved.clone());
            Ok(saved)
        }
        .boxed()
    }

    fn set_error_message<'a>(
        &'a self,
        id: i64,
        message: &'a str,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        async move {
            let mut transactions = self.transactions.write().await;
            let txn = transactions
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(StorageError::NotFound(id))?;
            txn.error_message = Some(message.to_string());
            Ok(())
        }
        .boxed()
    }

    fn get_transaction<'a>(
        &'a self,
        id: i64,
    ) -> BoxFuture<'a, Result<Option<SystemPayTransaction>, StorageError>> {
        async move {
            let transactions = self.transactions.read().await;
            Ok(transactions.iter().find(|t| t.id == id).cloned())
        }
        .boxed()
    }

    fn latest_for_order<'a>(
        &'a self,
        mode: TransactionMode,
        order_number: &'a str,
    ) -> BoxFuture<'a, Result<Option<SystemPayTransaction>, StorageError>> {
        async move {
            let transactions = self.transactions.read().await;
            // Ids grow with creation time, so the last match is the newest.
            Ok(transactions
                .iter()
                .rev()
                .find(|t| t.mode == mode && t.order_number.as_deref() == Some(order_number))
                .cloned())
        }
        .boxed()
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::{create_sqlite_transaction_store, SqliteTransactionStore};

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use crate::systempay::transaction::OperationType;
    use chrono::DateTime;
    use rust_decimal::Decimal;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
    use sqlx::Row;

    const CREATE_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS systempay_transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            mode TEXT NOT NULL,
            operation_type TEXT,
            trans_id TEXT,
            trans_date TEXT,
            order_number TEXT,
            amount TEXT NOT NULL,
            currency TEXT,
            auth_result TEXT,
            result TEXT,
            error_message TEXT,
            raw_request TEXT NOT NULL,
            date_created TEXT NOT NULL
        )
    "#;

    #[derive(Clone, Debug)]
    pub struct SqliteTransactionStore {
        pool: SqlitePool,
    }

    pub async fn create_sqlite_transaction_store(
        database_url: &str,
    ) -> Result<SqliteTransactionStore, StorageError> {
        // Every connection to `:memory:` opens its own empty database.
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = options.connect(database_url).await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        Ok(SqliteTransactionStore { pool })
    }

    fn from_row(row: &SqliteRow) -> Result<SystemPayTransaction, StorageError> {
        let mode: String = row.try_get("mode")?;
        let amount: String = row.try_get("amount")?;
        let date_created: String = row.try_get("date_created")?;
        Ok(SystemPayTransaction {
            id: row.try_get("id")?,
            mode: TransactionMode::parse(&mode)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown mode '{mode}'")))?,
            operation_type: row
                .try_get::<Option<String>, _>("operation_type")?
                .map(|op| OperationType::parse(&op)),
            trans_id: row.try_get("trans_id")?,
            trans_date: row.try_get("trans_date")?,
            order_number: row.try_get("order_number")?,
            amount: amount
                .parse::<Decimal>()
                .map_err(|e| StorageError::Corrupt(format!("amount '{amount}': {e}")))?,
            currency: row.try_get("currency")?,
            auth_result: row.try_get("auth_result")?,
            result: row.try_get("result")?,
            error_message: row.try_get("error_message")?,
            raw_request: row.try_get("raw_request")?,
            date_created: DateTime::parse_from_rfc3339(&date_created)
                .map_err(|e| StorageError::Corrupt(format!("date '{date_created}': {e}")))?
                .with_timezone(&Utc),
        })
    }

    impl TransactionStore for SqliteTransactionStore {
        fn save_transaction<'a>(
            &'a self,
            txn: NewTransaction,
        ) -> BoxFuture<'a, Result<SystemPayTransaction, StorageError>> {
            async move {
                let now = Utc::now();
                let result = sqlx::query(
                    r#"
                    INSERT INTO systempay_transactions (
                        mode, operation_type, trans_id, trans_date, order_number,
                        amount, currency, auth_result, result, raw_request, date_created
                    )
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(txn.mode.as_str())
                .bind(txn.operation_type.as_ref().map(|op| op.as_str().to_string()))
                .bind(&txn.trans_id)
                .bind(&txn.trans_date)
                .bind(&txn.order_number)
                .bind(txn.amount.to_string())
                .bind(&txn.currency)
                .bind(&txn.auth_result)
                .bind(&txn.result)
                .bind(&txn.raw_request)
                .bind(now.to_rfc3339())
                .execute(&self.pool)
                .await;

                match result {
                    Ok(done) => Ok(SystemPayTransaction::from_new(
                        done.last_insert_rowid(),
                        txn,
                        now,
                    )),
                    Err(e) => {
                        tracing::error!(
                            "DB Error saving transaction for order {:?}: {}",
                            txn.order_number,
                            e
                        );
                        Err(StorageError::Database(e))
                    }
                }
            }
            .boxed()
        }

        fn set_error_message<'a>(
            &'a self,
            id: i64,
            message: &'a str,
        ) -> BoxFuture<'a, Result<(), StorageError>> {
            async move {
                let done = sqlx::query(
                    "UPDATE systempay_transactions SET error_message = ? WHERE id = ?",
                )
                .bind(message)
                .bind(id)
                .execute(&self.pool)
                .await?;
                if done.rows_affected() == 0 {
                    return Err(StorageError::NotFound(id));
                }
                Ok(())
            }
            .boxed()
        }

        fn get_transaction<'a>(
            &'a self,
            id: i64,
        ) -> BoxFuture<'a, Result<Option<SystemPayTransaction>, StorageError>> {
            async move {
                let row = sqlx::query("SELECT * FROM systempay_transactions WHERE id = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?;
                row.as_ref().map(from_row).transpose()
            }
            .boxed()
        }

        fn latest_for_order<'a>(
            &'a self,
            mode: TransactionMode,
            order_number: &'a str,
        ) -> BoxFuture<'a, Result<Option<SystemPayTransaction>, StorageError>> {
            async move {
                let row = sqlx::query(
                    r#"
                    SELECT * FROM systempay_transactions
                    WHERE mode = ? AND order_number = ?
                    ORDER BY id DESC
                    LIMIT 1
                    "#,
                )
                .bind(mode.as_str())
                .bind(order_number)
                .fetch_optional(&self.pool)
                .await?;
                row.as_ref().map(from_row).transpose()
            }
            .boxed()
        }
    }
}
