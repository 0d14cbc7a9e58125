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

//! Data Access Layer with runtime backend selection.
//!
//! Queries are written once per backend in [`postgres_dal`] and
//! [`sqlite_dal`]. The [`ResourceRepository`] composes them into units of
//! work that run inside the [`TransactionManager`]; [`OutboxDAL`] and
//! [`MaintenanceDAL`] expose pooled, non-transactional operations.
//!
//! ```rust,ignore
//! use resource_inventory::dal::DAL;
//! use resource_inventory::database::Database;
//!
//! let db = Database::try_new("postgres://localhost/inventory", 10)?;
//! let dal = DAL::new(db);
//! let pending = dal.outbox().list(100).await?;
//! ```

use crate::database::{BackendType, Database};

pub mod maintenance;
pub mod outbox;
#[cfg(feature = "postgres")]
pub mod postgres_dal;
pub mod resource_repository;
#[cfg(feature = "sqlite")]
pub mod sqlite_dal;
pub mod transaction;

pub use maintenance::MaintenanceDAL;
pub use outbox::OutboxDAL;
pub use resource_repository::{ResourceChange, ResourceRepository, SaveOutcome};
pub use transaction::{TransactionManager, TxConn};

/// Helper macro for dispatching an operation based on backend type.
///
/// Arms for backends whose feature is disabled are compiled out; such a
/// backend yields [`StorageError::BackendNotEnabled`](crate::error::StorageError).
///
/// ```rust,ignore
/// dispatch_backend!(self.dal.backend(), self.list_postgres().await, self.list_sqlite().await)
/// ```
#[macro_export]
macro_rules! dispatch_backend {
    ($backend:expr, $pg:expr, $sqlite:expr) => {
        match $backend {
            #[cfg(feature = "postgres")]
            $crate::database::BackendType::Postgres => $pg,
            #[cfg(feature = "sqlite")]
            $crate::database::BackendType::Sqlite => $sqlite,
            #[allow(unreachable_patterns)]
            disabled => Err($crate::error::StorageError::BackendNotEnabled(
                disabled.as_str().to_string(),
            )),
        }
    };
}

/// Helper macro for matching on transaction connection variants.
///
/// ```rust,ignore
/// tx_match!(conn, pg => postgres_dal::find_by_key(pg, &key), sqlite => sqlite_dal::find_by_key(sqlite, &key))
/// ```
#[macro_export]
macro_rules! tx_match {
    ($conn:expr, $pg:ident => $pg_expr:expr, $sqlite:ident => $sqlite_expr:expr) => {
        match $conn {
            #[cfg(feature = "postgres")]
            $crate::dal::TxConn::Postgres($pg) => $pg_expr,
            #[cfg(feature = "sqlite")]
            $crate::dal::TxConn::Sqlite($sqlite) => $sqlite_expr,
        }
    };
}

/// Selects the resources a bulk maintenance job operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFilter {
    pub resource_type: String,
    pub reporter_type: String,
}

/// The unified Data Access Layer.
///
/// `DAL` is `Clone`; clones share the underlying pool.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        DAL { database }
    }

    pub fn backend(&self) -> BackendType {
        self.database.backend()
    }

    pub fn outbox(&self) -> OutboxDAL<'_> {
        OutboxDAL::new(self)
    }

    pub fn maintenance(&self) -> MaintenanceDAL<'_> {
        MaintenanceDAL::new(self)
    }

    /// Builds a transaction manager over this DAL's pool.
    pub fn transaction_manager(&self, max_serialization_retries: u32) -> TransactionManager {
        TransactionManager::new(self.database.clone(), max_serialization_retries)
    }
}
