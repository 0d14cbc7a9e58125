/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Serializable transactions with bounded retry.
//!
//! [`TransactionManager::run_with_retry`] runs a unit of work inside a
//! serializable transaction. When the database aborts it with a
//! serialization failure or a deadlock, the whole unit of work is rolled back
//! and executed again from scratch, so a retry redoes every row it writes.
//! Other errors propagate on the first occurrence.
//!
//! On PostgreSQL the transaction is opened with `SERIALIZABLE` isolation. On
//! SQLite an immediate transaction already serializes writers; lock
//! contention ("database is locked") is treated as the retryable class.

use std::sync::Arc;

use diesel::result::{DatabaseErrorKind, Error as DieselError};
#[cfg(feature = "postgres")]
use diesel::PgConnection;
#[cfg(feature = "sqlite")]
use diesel::SqliteConnection;
use tracing::{debug, warn};

use crate::database::Database;
use crate::error::StorageError;
use crate::metrics;

/// Default number of attempts for a serializable unit of work.
pub const DEFAULT_MAX_SERIALIZATION_RETRIES: u32 = 10;

/// A connection borrowed for the duration of one transaction attempt.
pub enum TxConn<'a> {
    #[cfg(feature = "postgres")]
    Postgres(&'a mut PgConnection),
    #[cfg(feature = "sqlite")]
    Sqlite(&'a mut SqliteConnection),
}

impl std::fmt::Debug for TxConn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            TxConn::Postgres(_) => write!(f, "TxConn::Postgres(...)"),
            #[cfg(feature = "sqlite")]
            TxConn::Sqlite(_) => write!(f, "TxConn::Sqlite(...)"),
        }
    }
}

/// Runs units of work in serializable transactions, retrying conflicts.
#[derive(Clone, Debug)]
pub struct TransactionManager {
    database: Database,
    max_attempts: u32,
}

impl TransactionManager {
    /// Creates a manager that makes at most `max_serialization_retries`
    /// attempts per unit of work (at least one).
    pub fn new(database: Database, max_serialization_retries: u32) -> Self {
        Self {
            database,
            max_attempts: max_serialization_retries.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Executes `work` inside a serializable transaction, retrying it on
    /// serialization failures and deadlocks.
    ///
    /// `work` may run several times; it must not have side effects outside
    /// the connection it is given.
    pub async fn run_with_retry<T, F>(&self, label: &str, work: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: Fn(&mut TxConn<'_>) -> Result<T, StorageError> + Send + Sync + 'static,
    {
        let work = Arc::new(work);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match self.attempt(Arc::clone(&work)).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Serializable transaction committed after retry");
                    }
                    return Ok(value);
                }
                Err(StorageError::Database(err)) if is_retryable(&err) => {
                    metrics::record_serialization_failure(label);

                    if attempt >= self.max_attempts {
                        metrics::record_serialization_exhaustion(label);
                        warn!(
                            label,
                            attempts = attempt,
                            error = %err,
                            "Serializable transaction exhausted its retries"
                        );
                        return Err(StorageError::RetriesExhausted {
                            label: label.to_string(),
                            attempts: attempt,
                            source: err,
                        });
                    }

                    debug!(label, attempt, error = %err, "Serialization conflict, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt<T, F>(&self, work: Arc<F>) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: Fn(&mut TxConn<'_>) -> Result<T, StorageError> + Send + Sync + 'static,
    {
        match self.database.backend() {
            #[cfg(feature = "postgres")]
            crate::database::BackendType::Postgres => {
                let conn = self.database.get_postgres_connection().await?;
                conn.interact(move |conn| {
                    conn.build_transaction().serializable().run(|conn| {
                        let mut tx = TxConn::Postgres(conn);
                        (*work)(&mut tx)
                    })
                })
                .await
                .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            }
            #[cfg(feature = "sqlite")]
            crate::database::BackendType::Sqlite => {
                let conn = self.database.get_sqlite_connection().await?;
                conn.interact(move |conn| {
                    conn.immediate_transaction(|conn| {
                        let mut tx = TxConn::Sqlite(conn);
                        (*work)(&mut tx)
                    })
                })
                .await
                .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            }
            #[allow(unreachable_patterns)]
            disabled => Err(StorageError::BackendNotEnabled(disabled.as_str().to_string())),
        }
    }
}

/// Serialization failures (40001), deadlocks (40P01) and SQLite lock
/// contention are retryable; everything else is not.
pub fn is_retryable(err: &DieselError) -> bool {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => true,
        DieselError::DatabaseError(_, info) => {
            let message = info.message();
            message.contains("deadlock detected") || message.contains("database is locked")
        }
        _ => false,
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use diesel::prelude::*;
    use diesel::sql_types::BigInt;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn serialization_failure() -> StorageError {
        StorageError::Database(DieselError::DatabaseError(
            DatabaseErrorKind::SerializationFailure,
            Box::new(String::from("could not serialize access")),
        ))
    }

    async fn test_database(name: &str) -> Database {
        let url = format!("file:{}_{}?mode=memory&cache=shared", name, uuid::Uuid::new_v4());
        let db = Database::try_new(&url, 1).unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    #[derive(QueryableByName)]
    struct Count {
        #[diesel(sql_type = BigInt)]
        count: i64,
    }

    fn insert_marker(conn: &mut TxConn<'_>) -> Result<(), StorageError> {
        let conn = match conn {
            TxConn::Sqlite(conn) => conn,
            #[allow(unreachable_patterns)]
            _ => unreachable!("tests run on sqlite"),
        };
        diesel::sql_query(
            "INSERT INTO outbox_events (id, aggregatetype, aggregateid, operation, txid, payload, created_at) \
             VALUES (randomblob(16), 'kessel.tuples', 'agg', 'created', 'tx', '{}', '2025-01-01T00:00:00Z')",
        )
        .execute(&mut **conn)?;
        Ok(())
    }

    async fn outbox_count(db: &Database) -> i64 {
        let conn = db.get_sqlite_connection().await.unwrap();
        conn.interact(|conn| {
            diesel::sql_query("SELECT COUNT(*) AS count FROM outbox_events")
                .get_result::<Count>(conn)
                .map(|c| c.count)
        })
        .await
        .unwrap()
        .unwrap()
    }

    #[test]
    fn test_retryable_classification() {
        let StorageError::Database(err) = serialization_failure() else {
            unreachable!()
        };
        assert!(is_retryable(&err));

        let deadlock = DieselError::DatabaseError(
            DatabaseErrorKind::Unknown,
            Box::new(String::from("deadlock detected")),
        );
        assert!(is_retryable(&deadlock));

        let unique = DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new(String::from("duplicate key value")),
        );
        assert!(!is_retryable(&unique));
        assert!(!is_retryable(&DieselError::NotFound));
    }

    #[tokio::test]
    async fn test_conflicts_before_success_leave_one_committed_set() {
        let db = test_database("tx_retry").await;
        let manager = TransactionManager::new(db.clone(), 5);
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = manager
            .run_with_retry("test", move |conn| {
                insert_marker(conn)?;
                insert_marker(conn)?;
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    return Err(serialization_failure());
                }
                Ok("committed")
            })
            .await;

        assert_eq!(result.unwrap(), "committed");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(outbox_count(&db).await, 2);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts_and_rolls_back() {
        let db = test_database("tx_exhaust").await;
        let manager = TransactionManager::new(db.clone(), 3);
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result: Result<(), _> = manager
            .run_with_retry("exhaust", move |conn| {
                counter.fetch_add(1, Ordering::SeqCst);
                insert_marker(conn)?;
                Err(serialization_failure())
            })
            .await;

        match result {
            Err(StorageError::RetriesExhausted { label, attempts, .. }) => {
                assert_eq!(label, "exhaust");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(outbox_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let db = test_database("tx_fatal").await;
        let manager = TransactionManager::new(db, 5);
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result: Result<(), _> = manager
            .run_with_retry("fatal", move |_conn| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::Database(DieselError::DatabaseError(
                    DatabaseErrorKind::UniqueViolation,
                    Box::new(String::from("duplicate key value")),
                )))
            })
            .await;

        assert!(matches!(result, Err(StorageError::Database(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_retries_still_attempts_once() {
        let db = Database::try_new("file:tx_zero?mode=memory&cache=shared", 1).unwrap();
        assert_eq!(TransactionManager::new(db, 0).max_attempts(), 1);
    }
}
