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

//! Batch-oriented maintenance operations.
//!
//! Bulk deletes run in fixed-size batches with a pause between batches so
//! they do not hold long locks on tables that request handlers are writing
//! to concurrently.

use std::time::Duration;

use tracing::{debug, info};

#[cfg(feature = "postgres")]
use super::postgres_dal;
#[cfg(feature = "sqlite")]
use super::sqlite_dal;
use super::{ResourceFilter, DAL};
use crate::database::universal_types::UniversalTimestamp;
use crate::error::StorageError;

/// Default number of rows deleted per batch.
pub const DEFAULT_BATCH_SIZE: i64 = 5000;

/// Default pause between batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Batch sizing for maintenance jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: i64,
    pub batch_delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

#[derive(Clone)]
pub struct MaintenanceDAL<'a> {
    dal: &'a DAL,
}

impl<'a> MaintenanceDAL<'a> {
    pub fn new(dal: &'a DAL) -> Self {
        Self { dal }
    }

    /// Counts reporter resources matching `filter`.
    pub async fn count_resources(&self, filter: &ResourceFilter) -> Result<i64, StorageError> {
        let filter = filter.clone();
        crate::dispatch_backend!(
            self.dal.backend(),
            {
                let conn = self.dal.database.get_postgres_connection().await?;
                conn.interact(move |conn| postgres_dal::count_resources(conn, &filter))
                    .await
                    .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            },
            {
                let conn = self.dal.database.get_sqlite_connection().await?;
                conn.interact(move |conn| sqlite_dal::count_resources(conn, &filter))
                    .await
                    .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            }
        )
    }

    async fn delete_resources_batch(
        &self,
        filter: &ResourceFilter,
        batch_size: i64,
    ) -> Result<usize, StorageError> {
        let filter = filter.clone();
        crate::dispatch_backend!(
            self.dal.backend(),
            {
                let conn = self.dal.database.get_postgres_connection().await?;
                conn.interact(move |conn| {
                    use diesel::Connection;
                    conn.transaction(|conn| {
                        postgres_dal::delete_resources_batch(conn, &filter, batch_size)
                    })
                })
                .await
                .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            },
            {
                let conn = self.dal.database.get_sqlite_connection().await?;
                conn.interact(move |conn| {
                    use diesel::Connection;
                    conn.transaction(|conn| {
                        sqlite_dal::delete_resources_batch(conn, &filter, batch_size)
                    })
                })
                .await
                .map_err(|e| StorageError::ConnectionPool(e.to_string()))?
            }
        )
    }

    /// Deletes every resource matching `filter`, batch by batch.
    ///
    /// Returns the number of reporter resources deleted.
    pub async fn delete_resources(
        &self,
        filter: &ResourceFilter,
        settings: BatchSettings,
    ) -> Result<u64, StorageError> {
        let batch_size = settings.batch_size.max(1);
        let mut total: u64 = 0;
        let mut batch_number: u64 = 0;

        loop {
            let deleted = self.delete_resources_batch(filter, batch_size).await?;
            batch_number += 1;
            total += deleted as u64;
            debug!(batch_number, deleted, total, "Deleted resource batch");

            if (deleted as i64) < batch_size {
                break;
            }
            tokio::time::sleep(settings.batch_delay).await;
        }

        info!(
            resource_type = %filter.resource_type,
            reporter_type = %filter.reporter_type,
            total,
            batches = batch_number,
            "Resource deletion complete"
        );
        Ok(total)
    }

    /// Deletes every outbox row created before `cutoff`, batch by batch.
    pub async fn purge_outbox_older_than(
        &self,
        cutoff: UniversalTimestamp,
        settings: BatchSettings,
    ) -> Result<u64, StorageError> {
        let batch_size = settings.batch_size.max(1);
        let outbox = self.dal.outbox();
        let mut total: u64 = 0;

        loop {
            let deleted = outbox.delete_batch_older_than(cutoff, batch_size).await?;
            total += deleted as u64;
            debug!(deleted, total, "Deleted outbox batch");

            if (deleted as i64) < batch_size {
                break;
            }
            tokio::time::sleep(settings.batch_delay).await;
        }

        info!(total, %cutoff, "Outbox cleanup complete");
        Ok(total)
    }
}
