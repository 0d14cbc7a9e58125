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

//! In-process stand-ins for the broker and the authorization store.
//!
//! [`OutboxRelay`] plays the part of the connector that publishes outbox
//! rows: it polls the outbox table and hands each tuple event to the
//! consumer as a message, with the headers and envelope the connector
//! produces.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use resource_inventory::consumer::{
    Authorizer, ConsumerMessage, EventConsumer, FencingCheck, OffsetCommitter, RelationTuple,
    TopicPartitionOffset,
};
use resource_inventory::models::AggregateType;
use resource_inventory::{ConsumerError, DAL};
use serde_json::json;

pub const TOPIC: &str = "outbox.event.kessel.tuples";

pub struct OutboxRelay {
    dal: DAL,
    delivered: Mutex<HashSet<String>>,
    next_offset: AtomicI64,
    commits: Mutex<Vec<Vec<TopicPartitionOffset>>>,
    closed: AtomicBool,
}

impl OutboxRelay {
    pub fn new(dal: DAL) -> Self {
        Self {
            dal,
            delivered: Mutex::new(HashSet::new()),
            next_offset: AtomicI64::new(0),
            commits: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn commits(&self) -> Vec<Vec<TopicPartitionOffset>> {
        self.commits.lock().clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().len()
    }
}

impl OffsetCommitter for OutboxRelay {
    fn commit_offsets(&self, offsets: &[TopicPartitionOffset]) -> Result<(), ConsumerError> {
        self.commits.lock().push(offsets.to_vec());
        Ok(())
    }
}

#[async_trait]
impl EventConsumer for OutboxRelay {
    fn subscribe(&self, _topics: &[&str]) -> Result<(), ConsumerError> {
        Ok(())
    }

    async fn recv(&self) -> Result<ConsumerMessage, ConsumerError> {
        loop {
            if self.is_closed() {
                return Err(ConsumerError::Closed);
            }
            let events = self.dal.outbox().list(100).await.unwrap_or_default();
            let next = events.into_iter().find(|event| {
                event.aggregate_type == AggregateType::Tuples
                    && !self.delivered.lock().contains(&event.id.to_string())
            });
            if let Some(event) = next {
                self.delivered.lock().insert(event.id.to_string());
                return Ok(ConsumerMessage {
                    topic: TOPIC.to_string(),
                    partition: 0,
                    offset: self.next_offset.fetch_add(1, Ordering::SeqCst),
                    key: Some(
                        json!({"schema": {}, "payload": event.aggregate_id})
                            .to_string()
                            .into_bytes(),
                    ),
                    payload: Some(
                        json!({"schema": {}, "payload": event.payload})
                            .to_string()
                            .into_bytes(),
                    ),
                    headers: vec![
                        (
                            "operation".to_string(),
                            event.operation.as_str().as_bytes().to_vec(),
                        ),
                        ("txid".to_string(), event.txid.into_bytes()),
                    ],
                });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn close(&self) -> Result<(), ConsumerError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn assignment_lost(&self) -> bool {
        false
    }
}

/// Authorization store that accepts every write and hands out increasing
/// tokens.
#[derive(Default)]
pub struct TokenIssuingAuthorizer {
    issued: AtomicI64,
    written: Mutex<Vec<RelationTuple>>,
}

impl TokenIssuingAuthorizer {
    pub fn written(&self) -> Vec<RelationTuple> {
        self.written.lock().clone()
    }

    fn next_token(&self) -> String {
        format!("token-{}", self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl Authorizer for TokenIssuingAuthorizer {
    fn relations_enabled(&self) -> bool {
        true
    }

    async fn acquire_lock(&self, lock_id: &str) -> Result<String, ConsumerError> {
        Ok(format!("{}-lock", lock_id))
    }

    async fn create_tuples(
        &self,
        tuples: &[RelationTuple],
        fencing: Option<&FencingCheck>,
    ) -> Result<Option<String>, ConsumerError> {
        if fencing.is_none() {
            return Err(ConsumerError::Lock("write without fencing".to_string()));
        }
        self.written.lock().extend_from_slice(tuples);
        Ok(Some(self.next_token()))
    }

    async fn delete_tuples(
        &self,
        tuples: &[RelationTuple],
        fencing: Option<&FencingCheck>,
    ) -> Result<Option<String>, ConsumerError> {
        if fencing.is_none() {
            return Err(ConsumerError::Lock("write without fencing".to_string()));
        }
        self.written.lock().retain(|t| !tuples.contains(t));
        Ok(Some(self.next_token()))
    }
}
