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

//! Error types for the resource inventory crate.
//!
//! Each subsystem owns an error enum. Conversions between them are provided
//! with `#[from]` so `?` composes across layer boundaries:
//!
//! - [`StorageError`] covers the pool, diesel and migration failures.
//! - [`PubSubError`] covers the LISTEN/NOTIFY driver and subscription waits.
//! - [`UsecaseError`] is what request handlers see.
//! - [`ConsumerError`] covers the outbox-replaying consumer.
//! - [`EventingError`] covers the legacy event producers.
//!
//! Configuration loading errors live with the loader in
//! [`crate::config::ConfigError`].

use thiserror::Error;

/// Errors raised by the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failure obtaining or driving a pooled connection.
    #[error("Database connection pool error: {0}")]
    ConnectionPool(String),

    /// A query failed.
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// A serializable unit of work kept conflicting until its attempt budget ran out.
    #[error("{label}: transaction failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        label: String,
        attempts: u32,
        #[source]
        source: diesel::result::Error,
    },

    /// The connection string does not name a supported backend.
    #[error("Unable to detect database backend from URL '{0}'")]
    UnsupportedUrl(String),

    /// The URL names a backend this build was compiled without.
    #[error("Database backend '{0}' is not enabled in this build")]
    BackendNotEnabled(String),

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    /// A stored row could not be converted into its domain type.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Returns true when the failure came from the database itself rather
    /// than from the pool or from local data conversion.
    pub fn is_database_error(&self) -> bool {
        matches!(
            self,
            StorageError::Database(_) | StorageError::RetriesExhausted { .. }
        )
    }
}

/// Errors raised by the notification driver and the subscription registry.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// The waiter's cancellation token fired or its deadline elapsed.
    #[error("context cancelled while waiting for notification")]
    WaitCancelled,

    /// The listen loop's parent token was cancelled.
    #[error("listen manager cancelled")]
    Cancelled,

    #[error("driver is not connected")]
    NotConnected,

    /// The notification stream ended.
    #[error("notification channel closed")]
    ChannelClosed,

    #[error("driver error: {0}")]
    Driver(String),
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for PubSubError {
    fn from(err: tokio_postgres::Error) -> Self {
        PubSubError::Driver(err.to_string())
    }
}

/// Errors surfaced by the resource usecase.
///
/// Consistency-wait outcomes never appear here; only the business write can
/// fail a request.
#[derive(Debug, Error)]
pub enum UsecaseError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("resource not found")]
    NotFound,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors raised by the outbox consumer.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("required message headers missing or invalid: {0}")]
    InvalidHeaders(String),

    #[error("failed to parse message payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("max retries reached: {0}")]
    MaxRetries(String),

    #[error("consumer closed")]
    Closed,

    #[error("failed to commit offsets: {0}")]
    Commit(String),

    /// A broker error the client recovers from on its own.
    #[error("broker error: {0}")]
    Broker(String),

    #[error("fatal broker error: {0}")]
    FatalBroker(String),

    #[error("authorizer error: {0}")]
    Authorizer(String),

    #[error("failed to acquire lock: {0}")]
    Lock(String),

    #[error("invalid consumer configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    PubSub(#[from] PubSubError),
}

/// Errors raised by the legacy event producers.
#[derive(Debug, Error)]
pub enum EventingError {
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to produce event: {0}")]
    Produce(String),

    #[error("event manager is shut down")]
    ShutDown,

    #[error("invalid eventing configuration: {0}")]
    Config(String),
}
