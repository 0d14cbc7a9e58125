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

//! Resource repository and transactional outbox writer.
//!
//! The synchronous functions here operate on a [`TxConn`] and are meant to be
//! composed inside [`TransactionManager::run_with_retry`]. A single call to
//! [`ResourceRepository::report`] or [`ResourceRepository::tombstone`] writes
//! the resource rows, a new representation version tagged with the
//! transaction id, and both outbox events, so a retry redoes all of it.

use tracing::debug;

use super::transaction::{TransactionManager, TxConn};
#[cfg(feature = "postgres")]
use super::postgres_dal;
#[cfg(feature = "sqlite")]
use super::sqlite_dal;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::StorageError;
use crate::models::outbox_event::{AggregateType, EventOperation, NewOutboxEvent};
use crate::models::resource::{
    ReporterRepresentation, ReporterResource, ReporterResourceKey, Resource, ResourceSnapshot,
};
use crate::tx_match;

/// The data a reporter sends for one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceChange {
    pub key: ReporterResourceKey,
    pub api_href: String,
    pub console_href: Option<String>,
    pub workspace_id: String,
    pub data: serde_json::Value,
    /// Caller-supplied idempotency key. A change whose key is already
    /// recorded on a representation is not applied again.
    pub transaction_id: Option<String>,
}

/// Result of a repository write.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    pub snapshot: ResourceSnapshot,
    pub operation: EventOperation,
    /// Aggregate types of the outbox rows written; empty when the
    /// transaction id had already been applied.
    pub outbox_events: Vec<AggregateType>,
}

impl SaveOutcome {
    /// Whether this call wrote anything.
    pub fn applied(&self) -> bool {
        !self.outbox_events.is_empty()
    }
}

/// Repository over resources and their outbox events.
#[derive(Clone, Debug)]
pub struct ResourceRepository {
    transaction_manager: TransactionManager,
}

impl ResourceRepository {
    pub fn new(transaction_manager: TransactionManager) -> Self {
        Self {
            transaction_manager,
        }
    }

    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.transaction_manager
    }

    /// Looks up the current state of a resource by its reporter key.
    pub fn find_by_key(
        conn: &mut TxConn<'_>,
        key: &ReporterResourceKey,
    ) -> Result<Option<ResourceSnapshot>, StorageError> {
        tx_match!(conn,
            pg => postgres_dal::find_by_key(pg, key),
            sqlite => sqlite_dal::find_by_key(sqlite, key))
    }

    /// Whether a write with this transaction id has already been committed.
    pub fn has_transaction_id_been_processed(
        conn: &mut TxConn<'_>,
        txid: &str,
    ) -> Result<bool, StorageError> {
        if txid.is_empty() {
            return Ok(false);
        }
        tx_match!(conn,
            pg => postgres_dal::transaction_id_exists(pg, txid),
            sqlite => sqlite_dal::transaction_id_exists(sqlite, txid))
    }

    /// Creates or updates a resource and writes its outbox events tagged
    /// with `txid`.
    ///
    /// Re-delivery of a change whose idempotency key already committed is a
    /// no-op that returns the current snapshot.
    pub fn report(
        conn: &mut TxConn<'_>,
        change: &ResourceChange,
        txid: &str,
    ) -> Result<SaveOutcome, StorageError> {
        let idempotency_key = change
            .transaction_id
            .as_deref()
            .filter(|key| !key.is_empty());

        if let Some(key) = idempotency_key {
            if Self::has_transaction_id_been_processed(conn, key)? {
                let snapshot = Self::find_by_key(conn, &change.key)?.ok_or_else(|| {
                    StorageError::InvalidData(format!(
                        "transaction {} was applied but its resource is missing",
                        key
                    ))
                })?;
                debug!(transaction_id = key, "Transaction already processed, skipping write");
                return Ok(SaveOutcome {
                    snapshot,
                    operation: EventOperation::Updated,
                    outbox_events: Vec::new(),
                });
            }
        }

        let existing = Self::find_by_key(conn, &change.key)?;
        let now = UniversalTimestamp::now();
        let (snapshot, operation, previous_workspace_id) = match existing {
            None => {
                let resource = Resource {
                    id: UniversalUuid::new_v7(),
                    resource_type: change.key.resource_type.clone(),
                    common_version: 0,
                    workspace_id: change.workspace_id.clone(),
                    consistency_token: None,
                    created_at: now,
                    updated_at: now,
                };
                let reporter_resource = ReporterResource {
                    id: UniversalUuid::new_v7(),
                    resource_id: resource.id,
                    key: change.key.clone(),
                    api_href: change.api_href.clone(),
                    console_href: change.console_href.clone(),
                    representation_version: 0,
                    tombstone: false,
                    created_at: now,
                    updated_at: now,
                };
                insert_resource(conn, &resource)?;
                insert_reporter_resource(conn, &reporter_resource)?;
                (
                    ResourceSnapshot {
                        resource,
                        reporter_resource,
                    },
                    EventOperation::Created,
                    None,
                )
            }
            Some(mut snapshot) => {
                let previous_workspace_id = (snapshot.resource.workspace_id
                    != change.workspace_id)
                    .then(|| snapshot.resource.workspace_id.clone());

                snapshot.resource.common_version += 1;
                snapshot.resource.workspace_id = change.workspace_id.clone();
                snapshot.resource.updated_at = now;

                let rr = &mut snapshot.reporter_resource;
                rr.representation_version += 1;
                rr.api_href = change.api_href.clone();
                rr.console_href = change.console_href.clone();
                rr.tombstone = false;
                rr.updated_at = now;

                update_resource(conn, &snapshot.resource)?;
                update_reporter_resource(conn, &snapshot.reporter_resource)?;
                (snapshot, EventOperation::Updated, previous_workspace_id)
            }
        };

        Self::write_version(
            conn,
            snapshot,
            operation,
            &change.data,
            txid,
            idempotency_key.unwrap_or(txid),
            previous_workspace_id,
        )
    }

    /// Marks a resource deleted and writes `deleted` outbox events.
    ///
    /// Returns `None` when the resource does not exist or is already deleted.
    pub fn tombstone(
        conn: &mut TxConn<'_>,
        key: &ReporterResourceKey,
        txid: &str,
    ) -> Result<Option<SaveOutcome>, StorageError> {
        let Some(mut snapshot) = Self::find_by_key(conn, key)? else {
            return Ok(None);
        };
        if snapshot.reporter_resource.tombstone {
            return Ok(None);
        }

        let now = UniversalTimestamp::now();
        snapshot.resource.updated_at = now;
        snapshot.reporter_resource.representation_version += 1;
        snapshot.reporter_resource.tombstone = true;
        snapshot.reporter_resource.updated_at = now;

        update_resource(conn, &snapshot.resource)?;
        update_reporter_resource(conn, &snapshot.reporter_resource)?;

        Self::write_version(
            conn,
            snapshot,
            EventOperation::Deleted,
            &serde_json::json!({}),
            txid,
            txid,
            None,
        )
        .map(Some)
    }

    fn write_version(
        conn: &mut TxConn<'_>,
        snapshot: ResourceSnapshot,
        operation: EventOperation,
        data: &serde_json::Value,
        txid: &str,
        transaction_id: &str,
        previous_workspace_id: Option<String>,
    ) -> Result<SaveOutcome, StorageError> {
        let representation = ReporterRepresentation {
            reporter_resource_id: snapshot.reporter_resource.id,
            version: snapshot.reporter_resource.representation_version,
            data: data.clone(),
            common_version: snapshot.resource.common_version,
            transaction_id: (!transaction_id.is_empty()).then(|| transaction_id.to_string()),
            tombstone: snapshot.reporter_resource.tombstone,
            created_at: snapshot.resource.updated_at,
        };
        insert_representation(conn, &representation)?;

        let resource_event = NewOutboxEvent::resource_event(&snapshot, data, operation);
        let tuple_event =
            NewOutboxEvent::tuple_event(&snapshot, operation, txid, previous_workspace_id)?;
        insert_outbox_event(conn, &resource_event)?;
        insert_outbox_event(conn, &tuple_event)?;

        Ok(SaveOutcome {
            snapshot,
            operation,
            outbox_events: vec![resource_event.aggregate_type, tuple_event.aggregate_type],
        })
    }

    /// Stores the authorization store's consistency token on the resource
    /// identified by `key`. Returns false when the resource does not exist.
    pub fn update_consistency_token(
        conn: &mut TxConn<'_>,
        key: &ReporterResourceKey,
        token: &str,
    ) -> Result<bool, StorageError> {
        let Some(snapshot) = Self::find_by_key(conn, key)? else {
            return Ok(false);
        };
        let updated = tx_match!(conn,
            pg => postgres_dal::set_consistency_token(pg, snapshot.resource.id, token),
            sqlite => sqlite_dal::set_consistency_token(sqlite, snapshot.resource.id, token))?;
        Ok(updated > 0)
    }

    /// Returns the latest representation of a reporter resource.
    pub fn latest_representation(
        conn: &mut TxConn<'_>,
        reporter_resource_id: UniversalUuid,
    ) -> Result<Option<ReporterRepresentation>, StorageError> {
        tx_match!(conn,
            pg => postgres_dal::latest_representation(pg, reporter_resource_id),
            sqlite => sqlite_dal::latest_representation(sqlite, reporter_resource_id))
    }

    /// Reads the current state of a resource in its own transaction.
    pub async fn find_resource(
        &self,
        key: &ReporterResourceKey,
    ) -> Result<Option<ResourceSnapshot>, StorageError> {
        let key = key.clone();
        self.transaction_manager
            .run_with_retry("find_resource", move |conn| Self::find_by_key(conn, &key))
            .await
    }

    /// Stores a consistency token in its own transaction.
    pub async fn set_consistency_token(
        &self,
        key: &ReporterResourceKey,
        token: &str,
    ) -> Result<bool, StorageError> {
        let key = key.clone();
        let token = token.to_string();
        self.transaction_manager
            .run_with_retry("update_consistency_token", move |conn| {
                Self::update_consistency_token(conn, &key, &token)
            })
            .await
    }
}

fn insert_resource(conn: &mut TxConn<'_>, resource: &Resource) -> Result<(), StorageError> {
    tx_match!(conn,
        pg => postgres_dal::insert_resource(pg, resource),
        sqlite => sqlite_dal::insert_resource(sqlite, resource))
}

fn update_resource(conn: &mut TxConn<'_>, resource: &Resource) -> Result<(), StorageError> {
    tx_match!(conn,
        pg => postgres_dal::update_resource(pg, resource),
        sqlite => sqlite_dal::update_resource(sqlite, resource))
}

fn insert_reporter_resource(
    conn: &mut TxConn<'_>,
    reporter_resource: &ReporterResource,
) -> Result<(), StorageError> {
    tx_match!(conn,
        pg => postgres_dal::insert_reporter_resource(pg, reporter_resource),
        sqlite => sqlite_dal::insert_reporter_resource(sqlite, reporter_resource))
}

fn update_reporter_resource(
    conn: &mut TxConn<'_>,
    reporter_resource: &ReporterResource,
) -> Result<(), StorageError> {
    tx_match!(conn,
        pg => postgres_dal::update_reporter_resource(pg, reporter_resource),
        sqlite => sqlite_dal::update_reporter_resource(sqlite, reporter_resource))
}

fn insert_representation(
    conn: &mut TxConn<'_>,
    representation: &ReporterRepresentation,
) -> Result<(), StorageError> {
    tx_match!(conn,
        pg => postgres_dal::insert_representation(pg, representation),
        sqlite => sqlite_dal::insert_representation(sqlite, representation))
}

fn insert_outbox_event(conn: &mut TxConn<'_>, event: &NewOutboxEvent) -> Result<(), StorageError> {
    tx_match!(conn,
        pg => postgres_dal::insert_outbox_event(pg, event),
        sqlite => sqlite_dal::insert_outbox_event(sqlite, event))
}
