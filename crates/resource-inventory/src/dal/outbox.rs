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

//! Outbox DAL.
//!
//! Outbox rows are inserted by [`ResourceRepository::save`](super::ResourceRepository::save)
//! inside the business transaction. This DAL covers the pooled operations
//! around them: inspection and age-based cleanup once the relay has
//! published the rows.

#[cfg(feature = "postgres")]
use super::postgres_dal;
#[cfg(feature = "sqlite")]
use super::sqlite_dal;
use super::DAL;
use crate::database::universal_types::UniversalTimestamp;
use crate::error::StorageError;
use crate::models::outbox_event::OutboxEvent;

#[derive(Clone)]
pub struct OutboxDAL<'a> {
    dal: &'a DAL,
}

impl<'a> OutboxDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Lists outbox rows in id (creation) order.
    pub async fn list(&self, limit: i64) -> Result<Vec<OutboxEvent>, StorageError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            {
                let conn = self.dal.database.get_postgres_connection().await?;
                conn.interact(move |conn| postgres_dal::list_outbox_events(conn, limit))
                    .await
                    .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            },
            {
                let conn = self.dal.database.get_sqlite_connection().await?;
                conn.interact(move |conn| sqlite_dal::list_outbox_events(conn, limit))
                    .await
                    .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            }
        )
    }

    /// Counts rows created before `cutoff`.
    pub async fn count_older_than(&self, cutoff: UniversalTimestamp) -> Result<i64, StorageError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            {
                let conn = self.dal.database.get_postgres_connection().await?;
                conn.interact(move |conn| postgres_dal::count_outbox_older_than(conn, cutoff))
                    .await
                    .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            },
            {
                let conn = self.dal.database.get_sqlite_connection().await?;
                conn.interact(move |conn| sqlite_dal::count_outbox_older_than(conn, cutoff))
                    .await
                    .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            }
        )
    }

    /// Deletes at most `batch_size` rows created before `cutoff`, oldest first.
    pub async fn delete_batch_older_than(
        &self,
        cutoff: UniversalTimestamp,
        batch_size: i64,
    ) -> Result<usize, StorageError> {
        crate::dispatch_backend!(
            self.dal.backend(),
            {
                let conn = self.dal.database.get_postgres_connection().await?;
                conn.interact(move |conn| {
                    postgres_dal::delete_outbox_batch_older_than(conn, cutoff, batch_size)
                })
                .await
                .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            },
            {
                let conn = self.dal.database.get_sqlite_connection().await?;
                conn.interact(move |conn| {
                    sqlite_dal::delete_outbox_batch_older_than(conn, cutoff, batch_size)
                })
                .await
                .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            }
        )
    }
}
