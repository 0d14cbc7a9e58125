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

//! Resource domain types.
//!
//! A resource has one row in `resources` holding cross-reporter state, one
//! `reporter_resources` row per reporter that reports it, and an append-only
//! history of `reporter_representations`, one per write.

use crate::database::universal_types::{UniversalTimestamp, UniversalUuid};
use serde::{Deserialize, Serialize};

/// Natural key identifying a single resource as reported by one reporter instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReporterResourceKey {
    pub local_resource_id: String,
    pub reporter_type: String,
    pub resource_type: String,
    pub reporter_instance_id: String,
}

impl ReporterResourceKey {
    pub fn new(
        local_resource_id: impl Into<String>,
        reporter_type: impl Into<String>,
        resource_type: impl Into<String>,
        reporter_instance_id: impl Into<String>,
    ) -> Self {
        Self {
            local_resource_id: local_resource_id.into(),
            reporter_type: reporter_type.into(),
            resource_type: resource_type.into(),
            reporter_instance_id: reporter_instance_id.into(),
        }
    }

    /// Returns the first empty field name, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.local_resource_id.is_empty() {
            Some("local_resource_id")
        } else if self.reporter_type.is_empty() {
            Some("reporter_type")
        } else if self.resource_type.is_empty() {
            Some("resource_type")
        } else if self.reporter_instance_id.is_empty() {
            Some("reporter_instance_id")
        } else {
            None
        }
    }
}

/// Cross-reporter resource state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: UniversalUuid,
    pub resource_type: String,
    pub common_version: i64,
    pub workspace_id: String,
    /// Token returned by the authorization store for the latest applied change.
    pub consistency_token: Option<String>,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

/// Latest state of a resource as seen by a single reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterResource {
    pub id: UniversalUuid,
    pub resource_id: UniversalUuid,
    pub key: ReporterResourceKey,
    pub api_href: String,
    pub console_href: Option<String>,
    pub representation_version: i64,
    pub tombstone: bool,
    pub created_at: UniversalTimestamp,
    pub updated_at: UniversalTimestamp,
}

/// One immutable version of the data a reporter sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterRepresentation {
    pub reporter_resource_id: UniversalUuid,
    pub version: i64,
    pub data: serde_json::Value,
    pub common_version: i64,
    pub transaction_id: Option<String>,
    pub tombstone: bool,
    pub created_at: UniversalTimestamp,
}

/// The current state of a resource together with the reporter's view of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub resource: Resource,
    pub reporter_resource: ReporterResource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_reports_first_empty() {
        let key = ReporterResourceKey::new("host-1", "hbi", "host", "");
        assert_eq!(key.missing_field(), Some("reporter_instance_id"));

        let key = ReporterResourceKey::new("", "", "host", "i-1");
        assert_eq!(key.missing_field(), Some("local_resource_id"));

        let key = ReporterResourceKey::new("host-1", "hbi", "host", "i-1");
        assert_eq!(key.missing_field(), None);
    }
}
