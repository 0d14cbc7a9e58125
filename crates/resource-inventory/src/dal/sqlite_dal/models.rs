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

//! SQLite-specific database models
//!
//! SQLite has no native uuid, timestamp or JSON column types. UUIDs are stored
//! as 16-byte BLOBs, timestamps as RFC3339 TEXT and JSON documents as TEXT.
//! Reading a row back therefore can fail, so conversions into domain types
//! are fallible.

use crate::database::schema::sqlite::*;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::StorageError;
use crate::models::outbox_event::{AggregateType, EventOperation, NewOutboxEvent, OutboxEvent};
use crate::models::resource::{
    ReporterRepresentation, ReporterResource, ReporterResourceKey, Resource,
};
use diesel::prelude::*;

fn uuid_from_blob(bytes: &[u8]) -> Result<UniversalUuid, StorageError> {
    UniversalUuid::from_bytes(bytes).map_err(|e| StorageError::InvalidData(e.to_string()))
}

fn timestamp_from_text(text: &str) -> Result<UniversalTimestamp, StorageError> {
    UniversalTimestamp::from_rfc3339(text).map_err(|e| StorageError::InvalidData(e.to_string()))
}

// ============================================================================
// Resource Models
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = resources)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteResource {
    pub id: Vec<u8>,
    pub resource_type: String,
    pub common_version: i64,
    pub workspace_id: String,
    pub consistency_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<SqliteResource> for Resource {
    type Error = StorageError;

    fn try_from(row: SqliteResource) -> Result<Self, Self::Error> {
        Ok(Resource {
            id: uuid_from_blob(&row.id)?,
            resource_type: row.resource_type,
            common_version: row.common_version,
            workspace_id: row.workspace_id,
            consistency_token: row.consistency_token,
            created_at: timestamp_from_text(&row.created_at)?,
            updated_at: timestamp_from_text(&row.updated_at)?,
        })
    }
}

impl From<&Resource> for SqliteResource {
    fn from(resource: &Resource) -> Self {
        SqliteResource {
            id: resource.id.as_bytes().to_vec(),
            resource_type: resource.resource_type.clone(),
            common_version: resource.common_version,
            workspace_id: resource.workspace_id.clone(),
            consistency_token: resource.consistency_token.clone(),
            created_at: resource.created_at.to_rfc3339(),
            updated_at: resource.updated_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Reporter Resource Models
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = reporter_resources)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteReporterResource {
    pub id: Vec<u8>,
    pub resource_id: Vec<u8>,
    pub local_resource_id: String,
    pub reporter_type: String,
    pub resource_type: String,
    pub reporter_instance_id: String,
    pub api_href: String,
    pub console_href: Option<String>,
    pub representation_version: i64,
    pub tombstone: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<SqliteReporterResource> for ReporterResource {
    type Error = StorageError;

    fn try_from(row: SqliteReporterResource) -> Result<Self, Self::Error> {
        Ok(ReporterResource {
            id: uuid_from_blob(&row.id)?,
            resource_id: uuid_from_blob(&row.resource_id)?,
            key: ReporterResourceKey {
                local_resource_id: row.local_resource_id,
                reporter_type: row.reporter_type,
                resource_type: row.resource_type,
                reporter_instance_id: row.reporter_instance_id,
            },
            api_href: row.api_href,
            console_href: row.console_href,
            representation_version: row.representation_version,
            tombstone: row.tombstone,
            created_at: timestamp_from_text(&row.created_at)?,
            updated_at: timestamp_from_text(&row.updated_at)?,
        })
    }
}

impl From<&ReporterResource> for SqliteReporterResource {
    fn from(rr: &ReporterResource) -> Self {
        SqliteReporterResource {
            id: rr.id.as_bytes().to_vec(),
            resource_id: rr.resource_id.as_bytes().to_vec(),
            local_resource_id: rr.key.local_resource_id.clone(),
            reporter_type: rr.key.reporter_type.clone(),
            resource_type: rr.key.resource_type.clone(),
            reporter_instance_id: rr.key.reporter_instance_id.clone(),
            api_href: rr.api_href.clone(),
            console_href: rr.console_href.clone(),
            representation_version: rr.representation_version,
            tombstone: rr.tombstone,
            created_at: rr.created_at.to_rfc3339(),
            updated_at: rr.updated_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Reporter Representation Models
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = reporter_representations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteReporterRepresentation {
    pub reporter_resource_id: Vec<u8>,
    pub version: i64,
    pub data: String,
    pub common_version: i64,
    pub transaction_id: Option<String>,
    pub tombstone: bool,
    pub created_at: String,
}

impl TryFrom<SqliteReporterRepresentation> for ReporterRepresentation {
    type Error = StorageError;

    fn try_from(row: SqliteReporterRepresentation) -> Result<Self, Self::Error> {
        Ok(ReporterRepresentation {
            reporter_resource_id: uuid_from_blob(&row.reporter_resource_id)?,
            version: row.version,
            data: serde_json::from_str(&row.data)?,
            common_version: row.common_version,
            transaction_id: row.transaction_id,
            tombstone: row.tombstone,
            created_at: timestamp_from_text(&row.created_at)?,
        })
    }
}

impl TryFrom<&ReporterRepresentation> for SqliteReporterRepresentation {
    type Error = StorageError;

    fn try_from(rep: &ReporterRepresentation) -> Result<Self, Self::Error> {
        Ok(SqliteReporterRepresentation {
            reporter_resource_id: rep.reporter_resource_id.as_bytes().to_vec(),
            version: rep.version,
            data: serde_json::to_string(&rep.data)?,
            common_version: rep.common_version,
            transaction_id: rep.transaction_id.clone(),
            tombstone: rep.tombstone,
            created_at: rep.created_at.to_rfc3339(),
        })
    }
}

// ============================================================================
// Outbox Event Models
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = outbox_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SqliteOutboxEvent {
    pub id: Vec<u8>,
    pub aggregatetype: String,
    pub aggregateid: String,
    pub operation: String,
    pub txid: Option<String>,
    pub payload: String,
    pub created_at: String,
}

impl TryFrom<&NewOutboxEvent> for SqliteOutboxEvent {
    type Error = StorageError;

    fn try_from(event: &NewOutboxEvent) -> Result<Self, Self::Error> {
        Ok(SqliteOutboxEvent {
            id: event.id.as_bytes().to_vec(),
            aggregatetype: event.aggregate_type.as_str().to_string(),
            aggregateid: event.aggregate_id.clone(),
            operation: event.operation.as_str().to_string(),
            txid: (!event.txid.is_empty()).then(|| event.txid.clone()),
            payload: serde_json::to_string(&event.payload)?,
            created_at: UniversalTimestamp::now().to_rfc3339(),
        })
    }
}

impl TryFrom<SqliteOutboxEvent> for OutboxEvent {
    type Error = StorageError;

    fn try_from(row: SqliteOutboxEvent) -> Result<Self, Self::Error> {
        Ok(OutboxEvent {
            id: uuid_from_blob(&row.id)?,
            aggregate_type: AggregateType::from_str(&row.aggregatetype).ok_or_else(|| {
                StorageError::InvalidData(format!("unknown aggregate type '{}'", row.aggregatetype))
            })?,
            aggregate_id: row.aggregateid,
            operation: EventOperation::from_str(&row.operation).ok_or_else(|| {
                StorageError::InvalidData(format!("unknown operation '{}'", row.operation))
            })?,
            txid: row.txid.unwrap_or_default(),
            payload: serde_json::from_str(&row.payload)?,
            created_at: timestamp_from_text(&row.created_at)?,
        })
    }
}
