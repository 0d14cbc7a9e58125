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

//! Outbox event model.
//!
//! Outbox rows are written in the same transaction as the resource mutation
//! they describe and are never updated afterwards. An external relay turns
//! them into broker messages; the consumer replays the tuple events into the
//! authorization store and signals completion by transaction id.
//!
//! Every resource write produces two rows:
//!
//! - a resource event (`kessel.resources`) carrying a CloudEvents 1.0 style
//!   envelope, with an empty transaction id;
//! - a tuple event (`kessel.tuples`) carrying the reporter key and versions
//!   the consumer needs, tagged with the write's transaction id.

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use crate::models::resource::{ReporterResourceKey, ResourceSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Discriminates the two kinds of outbox rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateType {
    #[serde(rename = "kessel.resources")]
    Resources,
    #[serde(rename = "kessel.tuples")]
    Tuples,
}

impl AggregateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateType::Resources => "kessel.resources",
            AggregateType::Tuples => "kessel.tuples",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "kessel.resources" => Some(AggregateType::Resources),
            "kessel.tuples" => Some(AggregateType::Tuples),
            _ => None,
        }
    }
}

impl std::fmt::Display for AggregateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of change an outbox event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOperation {
    Created,
    Updated,
    Deleted,
}

impl EventOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOperation::Created => "created",
            EventOperation::Updated => "updated",
            EventOperation::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "created" => Some(EventOperation::Created),
            "updated" => Some(EventOperation::Updated),
            "deleted" => Some(EventOperation::Deleted),
            _ => None,
        }
    }
}

impl From<EventOperation> for String {
    fn from(op: EventOperation) -> Self {
        op.as_str().to_string()
    }
}

impl std::fmt::Display for EventOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored outbox row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: UniversalUuid,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    pub operation: EventOperation,
    /// Empty for resource events, set for tuple events.
    pub txid: String,
    pub payload: serde_json::Value,
    pub created_at: UniversalTimestamp,
}

/// An outbox row ready to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOutboxEvent {
    pub id: UniversalUuid,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    pub operation: EventOperation,
    pub txid: String,
    pub payload: serde_json::Value,
}

/// Payload of a `kessel.tuples` outbox event.
///
/// This is the contract between the outbox writer and the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleEvent {
    pub reporter_resource_key: ReporterResourceKey,
    pub operation_type: EventOperation,
    pub common_version: i64,
    pub reporter_representation_version: i64,
    pub workspace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_workspace_id: Option<String>,
}

impl TupleEvent {
    pub fn resource_id_hint(&self) -> String {
        format!(
            "{}/{}/{}",
            self.reporter_resource_key.reporter_type,
            self.reporter_resource_key.resource_type,
            self.reporter_resource_key.local_resource_id
        )
    }
}

fn event_type(resource_type: &str, operation: EventOperation) -> String {
    format!(
        "redhat.inventory.resources.{}.{}",
        resource_type,
        operation.as_str()
    )
}

fn event_subject(resource_type: &str, resource_id: &UniversalUuid) -> String {
    format!("/resources/{}/{}", resource_type, resource_id)
}

impl NewOutboxEvent {
    /// Builds the `kessel.resources` event for a write.
    ///
    /// Deletes carry an empty payload object.
    pub fn resource_event(
        snapshot: &ResourceSnapshot,
        reporter_data: &serde_json::Value,
        operation: EventOperation,
    ) -> Self {
        let resource = &snapshot.resource;
        let reporter = &snapshot.reporter_resource;

        let payload = if operation == EventOperation::Deleted {
            json!({})
        } else {
            let reported_at = match operation {
                EventOperation::Created => resource.created_at,
                _ => resource.updated_at,
            };
            let mut metadata = json!({
                "id": resource.id.to_string(),
                "resource_type": resource.resource_type,
                "workspace_id": resource.workspace_id,
            });
            let stamp_field = match operation {
                EventOperation::Created => "created_at",
                _ => "updated_at",
            };
            metadata[stamp_field] = json!(reported_at.to_rfc3339());

            json!({
                "specversion": "1.0",
                "type": event_type(&resource.resource_type, operation),
                "source": "",
                "id": UniversalUuid::new_v4().to_string(),
                "subject": event_subject(&resource.resource_type, &resource.id),
                "time": reported_at.to_rfc3339(),
                "datacontenttype": "application/json",
                "data": {
                    "metadata": metadata,
                    "reporter_data": {
                        "reporter_instance_id": reporter.key.reporter_instance_id,
                        "reporter_type": reporter.key.reporter_type,
                        "console_href": reporter.console_href.clone().unwrap_or_default(),
                        "api_href": reporter.api_href,
                        "local_resource_id": reporter.key.local_resource_id,
                    },
                    "resource_data": reporter_data,
                },
            })
        };

        Self {
            id: UniversalUuid::new_v7(),
            aggregate_type: AggregateType::Resources,
            aggregate_id: resource.id.to_string(),
            operation,
            txid: String::new(),
            payload,
        }
    }

    /// Builds the `kessel.tuples` event for a write, tagged with `txid`.
    pub fn tuple_event(
        snapshot: &ResourceSnapshot,
        operation: EventOperation,
        txid: &str,
        previous_workspace_id: Option<String>,
    ) -> Result<Self, serde_json::Error> {
        let tuple = TupleEvent {
            reporter_resource_key: snapshot.reporter_resource.key.clone(),
            operation_type: operation,
            common_version: snapshot.resource.common_version,
            reporter_representation_version: snapshot.reporter_resource.representation_version,
            workspace_id: snapshot.resource.workspace_id.clone(),
            previous_workspace_id,
        };

        Ok(Self {
            id: UniversalUuid::new_v7(),
            aggregate_type: AggregateType::Tuples,
            aggregate_id: snapshot.resource.id.to_string(),
            operation,
            txid: txid.to_string(),
            payload: serde_json::to_value(tuple)?,
        })
    }
}
