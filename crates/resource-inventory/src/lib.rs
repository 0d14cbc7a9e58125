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

//! # Resource Inventory
//!
//! Storage and coordination for a resource inventory whose authorization
//! side effects are applied asynchronously by a downstream consumer.
//!
//! Every resource write commits, in the same serializable transaction, the
//! resource rows and a pair of outbox events tagged with a transaction id.
//! The consumer replays the tuple event into the authorization store and
//! then issues a database notification carrying that transaction id. A
//! request that asked for immediate visibility subscribes to the id before
//! writing and blocks on the notification after committing, bounded by a
//! timeout and guarded by a circuit breaker.
//!
//! ## Modules
//!
//! - [`database`]: connection pools, schema and embedded migrations
//! - [`dal`]: repository, outbox and the retrying [`dal::TransactionManager`]
//! - [`pubsub`]: LISTEN/NOTIFY driver, [`pubsub::ListenManager`] and subscriptions
//! - [`resilience`]: the [`resilience::CircuitBreaker`] guarding waits
//! - [`usecase`]: the read-after-write gate around resource writes
//! - [`consumer`]: the outbox consumer that triggers notifications
//! - [`eventing`]: legacy event producers
//! - [`config`]: TOML configuration loading
//!
//! ## Example
//!
//! ```rust,ignore
//! use resource_inventory::prelude::*;
//!
//! let db = Database::try_new("postgres://localhost/inventory", 10)?;
//! db.run_migrations().await?;
//! let dal = DAL::new(db);
//! let repository = ResourceRepository::new(dal.transaction_manager(10));
//!
//! let listen_manager = ListenManager::new(Arc::new(PgDriver::new(url)));
//! let usecase = ResourceUsecase::new(repository, UsecaseConfig::default())
//!     .with_listen_manager(listen_manager);
//! ```

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
compile_error!("enable at least one database backend: the `postgres` or `sqlite` feature");

pub mod config;
pub mod consumer;
pub mod dal;
pub mod database;
pub mod error;
pub mod eventing;
pub mod metrics;
pub mod models;
pub mod pubsub;
pub mod resilience;
pub mod usecase;

pub use dal::{ResourceRepository, TransactionManager, DAL};
pub use database::Database;
pub use config::{ConfigError, ConfigLoader, InventoryConfig};
pub use error::{ConsumerError, EventingError, PubSubError, StorageError, UsecaseError};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `level` is used, defaulting to
/// `info`. Calling this more than once is harmless.
pub fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}

/// Commonly used types.
pub mod prelude {
    pub use crate::dal::{ResourceChange, ResourceRepository, TransactionManager, DAL};
    pub use crate::database::Database;
    pub use crate::models::{EventOperation, ReporterResourceKey};
    #[cfg(feature = "postgres")]
    pub use crate::pubsub::{PgDriver, PgNotifier};
    pub use crate::pubsub::{ListenManager, Notifier, Subscription};
    pub use crate::resilience::{BreakerError, CircuitBreaker, CircuitBreakerConfig};
    pub use crate::usecase::{ReportResource, ResourceUsecase, UsecaseConfig, WriteVisibility};
}
