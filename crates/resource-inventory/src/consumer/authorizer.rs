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

//! Authorization store the consumer replicates tuple events into.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::offsets::FencingCheck;
use crate::error::ConsumerError;
use crate::models::{EventOperation, TupleEvent};

pub const WORKSPACE_RELATION: &str = "workspace";
pub const WORKSPACE_SUBJECT_TYPE: &str = "rbac/workspace";

/// One relationship between a resource and its workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationTuple {
    pub resource_namespace: String,
    pub resource_type: String,
    pub resource_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
}

impl RelationTuple {
    fn workspace(event: &TupleEvent, workspace_id: &str) -> Self {
        let key = &event.reporter_resource_key;
        Self {
            resource_namespace: key.reporter_type.to_lowercase(),
            resource_type: key.resource_type.clone(),
            resource_id: key.local_resource_id.clone(),
            relation: WORKSPACE_RELATION.to_string(),
            subject_type: WORKSPACE_SUBJECT_TYPE.to_string(),
            subject_id: workspace_id.to_string(),
        }
    }
}

/// Tuples to write and remove for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuplesToReplicate {
    pub create: Vec<RelationTuple>,
    pub delete: Vec<RelationTuple>,
}

impl TuplesToReplicate {
    /// Derives the workspace relationship changes carried by `event`.
    pub fn for_event(event: &TupleEvent) -> Self {
        let current = (!event.workspace_id.is_empty())
            .then(|| RelationTuple::workspace(event, &event.workspace_id));
        let previous = event
            .previous_workspace_id
            .as_deref()
            .filter(|previous| !previous.is_empty() && *previous != event.workspace_id)
            .map(|previous| RelationTuple::workspace(event, previous));

        match event.operation_type {
            EventOperation::Created => Self {
                create: current.into_iter().collect(),
                delete: Vec::new(),
            },
            EventOperation::Updated => Self {
                create: current.into_iter().collect(),
                delete: previous.into_iter().collect(),
            },
            EventOperation::Deleted => Self {
                create: Vec::new(),
                delete: current.into_iter().chain(previous).collect(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty()
    }
}

/// Writes relationships to the authorization store.
///
/// Write calls return the store's consistency token when it issues one.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Whether tuple events should be replicated at all.
    fn relations_enabled(&self) -> bool;

    /// Acquires the fencing lock named `lock_id` and returns its token.
    async fn acquire_lock(&self, lock_id: &str) -> Result<String, ConsumerError>;

    async fn create_tuples(
        &self,
        tuples: &[RelationTuple],
        fencing: Option<&FencingCheck>,
    ) -> Result<Option<String>, ConsumerError>;

    async fn delete_tuples(
        &self,
        tuples: &[RelationTuple],
        fencing: Option<&FencingCheck>,
    ) -> Result<Option<String>, ConsumerError>;
}

/// Authorizer for deployments without a relationship store. Nothing is
/// replicated.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
    fn relations_enabled(&self) -> bool {
        false
    }

    async fn acquire_lock(&self, _lock_id: &str) -> Result<String, ConsumerError> {
        Ok(String::new())
    }

    async fn create_tuples(
        &self,
        _tuples: &[RelationTuple],
        _fencing: Option<&FencingCheck>,
    ) -> Result<Option<String>, ConsumerError> {
        Ok(None)
    }

    async fn delete_tuples(
        &self,
        _tuples: &[RelationTuple],
        _fencing: Option<&FencingCheck>,
    ) -> Result<Option<String>, ConsumerError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReporterResourceKey;

    fn event(operation: EventOperation, previous: Option<&str>) -> TupleEvent {
        TupleEvent {
            reporter_resource_key: ReporterResourceKey::new("host-1", "HBI", "host", "i-1"),
            operation_type: operation,
            common_version: 1,
            reporter_representation_version: 1,
            workspace_id: "ws-2".to_string(),
            previous_workspace_id: previous.map(str::to_string),
        }
    }

    #[test]
    fn test_created_writes_workspace_tuple() {
        let tuples = TuplesToReplicate::for_event(&event(EventOperation::Created, None));
        assert_eq!(tuples.create.len(), 1);
        assert_eq!(tuples.create[0].resource_namespace, "hbi");
        assert_eq!(tuples.create[0].subject_id, "ws-2");
        assert!(tuples.delete.is_empty());
    }

    #[test]
    fn test_workspace_move_replaces_tuple() {
        let tuples = TuplesToReplicate::for_event(&event(EventOperation::Updated, Some("ws-1")));
        assert_eq!(tuples.create[0].subject_id, "ws-2");
        assert_eq!(tuples.delete[0].subject_id, "ws-1");

        let unchanged = TuplesToReplicate::for_event(&event(EventOperation::Updated, Some("ws-2")));
        assert!(unchanged.delete.is_empty());
    }

    #[test]
    fn test_deleted_removes_tuples() {
        let tuples = TuplesToReplicate::for_event(&event(EventOperation::Deleted, None));
        assert!(tuples.create.is_empty());
        assert_eq!(tuples.delete.len(), 1);
    }
}
