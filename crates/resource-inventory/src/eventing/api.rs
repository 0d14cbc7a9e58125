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

//! Event envelope and producer capabilities.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::EventingError;
use crate::models::{EventOperation, ResourceSnapshot};

const SPEC_VERSION: &str = "1.0";
const CONTENT_TYPE: &str = "application/json";
const RESOURCE_EVENT_KIND: &str = "resources";

/// A CloudEvents-shaped envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub specversion: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub id: String,
    pub subject: String,
    pub time: DateTime<Utc>,
    pub datacontenttype: String,
    pub data: serde_json::Value,
}

impl Event {
    /// Builds the event announcing a resource write.
    pub fn resource(
        operation: EventOperation,
        snapshot: &ResourceSnapshot,
        reporter_data: &serde_json::Value,
    ) -> Self {
        let resource = &snapshot.resource;
        let reporter = &snapshot.reporter_resource;
        let reported_at = *resource.updated_at.as_datetime();

        Self {
            specversion: SPEC_VERSION.to_string(),
            event_type: format!(
                "redhat.inventory.{}.{}.{}",
                RESOURCE_EVENT_KIND,
                resource.resource_type,
                operation.as_str()
            ),
            source: String::new(),
            id: uuid::Uuid::new_v4().to_string(),
            subject: format!(
                "/{}/{}/{}",
                RESOURCE_EVENT_KIND, resource.resource_type, resource.id
            ),
            time: reported_at,
            datacontenttype: CONTENT_TYPE.to_string(),
            data: json!({
                "metadata": {
                    "id": resource.id.to_string(),
                    "resource_type": resource.resource_type,
                    "last_reported": reported_at,
                    "workspace": resource.workspace_id,
                },
                "reporter_data": {
                    "reporter_instance_id": reporter.key.reporter_instance_id,
                    "last_reported": reported_at,
                    "reporter_type": reporter.key.reporter_type,
                    "console_href": reporter.console_href.clone().unwrap_or_default(),
                    "api_href": reporter.api_href,
                    "local_resource_id": reporter.key.local_resource_id,
                },
                "resource_data": reporter_data,
            }),
        }
    }
}

/// Sends events to one destination.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(&self, event: &Event) -> Result<(), EventingError>;
}

/// Chooses a producer for a caller and resource, and owns the producers'
/// lifecycle.
#[async_trait]
pub trait EventManager: Send + Sync {
    fn lookup(
        &self,
        principal: &str,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Arc<dyn Producer>, EventingError>;

    /// Flushes outstanding events. Producers fail after this returns.
    async fn shutdown(&self) -> Result<(), EventingError>;
}
