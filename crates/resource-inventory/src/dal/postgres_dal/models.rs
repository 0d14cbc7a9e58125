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

//! PostgreSQL-specific database models
//!
//! These models use native PostgreSQL types (`uuid`, `TIMESTAMP`, `JSONB`)
//! and are converted to/from domain types at the DAL boundary.

use crate::database::schema::postgres::*;
use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::error::StorageError;
use crate::models::outbox_event::{AggregateType, EventOperation, NewOutboxEvent, OutboxEvent};
use crate::models::resource::{
    ReporterRepresentation, ReporterResource, ReporterResourceKey, Resource,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use uuid::Uuid;

// ============================================================================
// Resource Models
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = resources)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgResource {
    pub id: Uuid,
    pub resource_type: String,
    pub common_version: i64,
    pub workspace_id: String,
    pub consistency_token: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<PgResource> for Resource {
    fn from(row: PgResource) -> Self {
        Resource {
            id: row.id.into(),
            resource_type: row.resource_type,
            common_version: row.common_version,
            workspace_id: row.workspace_id,
            consistency_token: row.consistency_token,
            created_at: UniversalTimestamp::from_naive(row.created_at),
            updated_at: UniversalTimestamp::from_naive(row.updated_at),
        }
    }
}

impl From<&Resource> for PgResource {
    fn from(resource: &Resource) -> Self {
        PgResource {
            id: resource.id.as_uuid(),
            resource_type: resource.resource_type.clone(),
            common_version: resource.common_version,
            workspace_id: resource.workspace_id.clone(),
            consistency_token: resource.consistency_token.clone(),
            created_at: resource.created_at.to_naive(),
            updated_at: resource.updated_at.to_naive(),
        }
    }
}

// ============================================================================
// Reporter Resource Models
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = reporter_resources)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgReporterResource {
    pub id: Uuid,
    pub resource_id: Uuid,
    pub local_resource_id: String,
    pub reporter_type: String,
    pub resource_type: String,
    pub reporter_instance_id: String,
    pub api_href: String,
    pub console_href: Option<String>,
    pub representation_version: i64,
    pub tombstone: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<PgReporterResource> for ReporterResource {
    fn from(row: PgReporterResource) -> Self {
        ReporterResource {
            id: row.id.into(),
            resource_id: row.resource_id.into(),
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
            created_at: UniversalTimestamp::from_naive(row.created_at),
            updated_at: UniversalTimestamp::from_naive(row.updated_at),
        }
    }
}

impl From<&ReporterResource> for PgReporterResource {
    fn from(rr: &ReporterResource) -> Self {
        PgReporterResource {
            id: rr.id.as_uuid(),
            resource_id: rr.resource_id.as_uuid(),
            local_resource_id: rr.key.local_resource_id.clone(),
            reporter_type: rr.key.reporter_type.clone(),
            resource_type: rr.key.resource_type.clone(),
            reporter_instance_id: rr.key.reporter_instance_id.clone(),
            api_href: rr.api_href.clone(),
            console_href: rr.console_href.clone(),
            representation_version: rr.representation_version,
            tombstone: rr.tombstone,
            created_at: rr.created_at.to_naive(),
            updated_at: rr.updated_at.to_naive(),
        }
    }
}

// ============================================================================
// Reporter Representation Models
// ============================================================================

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = reporter_representations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgReporterRepresentation {
    pub reporter_resource_id: Uuid,
    pub version: i64,
    pub data: serde_json::Value,
    pub common_version: i64,
    pub transaction_id: Option<String>,
    pub tombstone: bool,
    pub created_at: NaiveDateTime,
}

impl From<PgReporterRepresentation> for ReporterRepresentation {
    fn from(row: PgReporterRepresentation) -> Self {
        ReporterRepresentation {
            reporter_resource_id: row.reporter_resource_id.into(),
            version: row.version,
            data: row.data,
            common_version: row.common_version,
            transaction_id: row.transaction_id,
            tombstone: row.tombstone,
            created_at: UniversalTimestamp::from_naive(row.created_at),
        }
    }
}

impl From<&ReporterRepresentation> for PgReporterRepresentation {
    fn from(rep: &ReporterRepresentation) -> Self {
        PgReporterRepresentation {
            reporter_resource_id: rep.reporter_resource_id.as_uuid(),
            version: rep.version,
            data: rep.data.clone(),
            common_version: rep.common_version,
            transaction_id: rep.transaction_id.clone(),
            tombstone: rep.tombstone,
            created_at: rep.created_at.to_naive(),
        }
    }
}

// ============================================================================
// Outbox Event Models
// ============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = outbox_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct PgOutboxEvent {
    pub id: Uuid,
    pub aggregatetype: String,
    pub aggregateid: String,
    pub operation: String,
    pub txid: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = outbox_events)]
pub struct NewPgOutboxEvent {
    pub id: Uuid,
    pub aggregatetype: String,
    pub aggregateid: String,
    pub operation: String,
    pub txid: Option<String>,
    pub payload: serde_json::Value,
    pub created_at: NaiveDateTime,
}

impl From<&NewOutboxEvent> for NewPgOutboxEvent {
    fn from(event: &NewOutboxEvent) -> Self {
        NewPgOutboxEvent {
            id: event.id.as_uuid(),
            aggregatetype: event.aggregate_type.as_str().to_string(),
            aggregateid: event.aggregate_id.clone(),
            operation: event.operation.as_str().to_string(),
            txid: (!event.txid.is_empty()).then(|| event.txid.clone()),
            payload: event.payload.clone(),
            created_at: UniversalTimestamp::now().to_naive(),
        }
    }
}

impl TryFrom<PgOutboxEvent> for OutboxEvent {
    type Error = StorageError;

    fn try_from(row: PgOutboxEvent) -> Result<Self, Self::Error> {
        Ok(OutboxEvent {
            id: UniversalUuid(row.id),
            aggregate_type: AggregateType::from_str(&row.aggregatetype).ok_or_else(|| {
                StorageError::InvalidData(format!("unknown aggregate type '{}'", row.aggregatetype))
            })?,
            aggregate_id: row.aggregateid,
            operation: EventOperation::from_str(&row.operation).ok_or_else(|| {
                StorageError::InvalidData(format!("unknown operation '{}'", row.operation))
            })?,
            txid: row.txid.unwrap_or_default(),
            payload: row.payload,
            created_at: UniversalTimestamp::from_naive(row.created_at),
        })
    }
}
