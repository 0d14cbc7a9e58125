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

//! The outbox consumer loop.
//!
//! For every tuple event the consumer replicates the relationship changes
//! into the authorization store, records the returned consistency token on
//! the resource and notifies waiters with the event's transaction id. Only
//! then is the message's offset buffered for the next batch commit.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::authorizer::{Authorizer, TuplesToReplicate};
use super::config::ConsumerConfig;
use super::message::{parse_tuple_event, ConsumerMessage, EventConsumer, MessageHeaders};
use super::offsets::OffsetCoordinator;
use super::retry::retry;
use crate::dal::ResourceRepository;
use crate::error::ConsumerError;
use crate::metrics;
use crate::models::{EventOperation, ReporterResourceKey};
use crate::pubsub::Notifier;

/// Result of replicating one tuple event.
#[derive(Debug, Clone)]
struct Replicated {
    key: ReporterResourceKey,
    token: Option<String>,
}

pub struct InventoryConsumer {
    client: Arc<dyn EventConsumer>,
    config: ConsumerConfig,
    coordinator: Arc<OffsetCoordinator>,
    repository: ResourceRepository,
    authorizer: Arc<dyn Authorizer>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl InventoryConsumer {
    /// `coordinator` must be the rebalance handler `client` was built with.
    pub fn new(
        client: Arc<dyn EventConsumer>,
        config: ConsumerConfig,
        coordinator: Arc<OffsetCoordinator>,
        repository: ResourceRepository,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            client,
            config,
            coordinator,
            repository,
            authorizer,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn coordinator(&self) -> &Arc<OffsetCoordinator> {
        &self.coordinator
    }

    /// Consumes until `cancel` fires or processing fails, then shuts the
    /// client down.
    pub async fn consume(&self, cancel: CancellationToken) -> Result<(), ConsumerError> {
        if let Err(e) = self.client.subscribe(&[self.config.topic()]) {
            metrics::record_consumer_error("subscribe");
            error!("failed to subscribe to topic: {}", e);
            return Err(e);
        }
        info!(topic = %self.config.topic(), "Consumer ready: waiting for messages...");

        let result = loop {
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                received = self.client.recv() => received,
            };

            match received {
                Ok(message) => {
                    if let Err(e) = self.handle_message(&message).await {
                        error!(
                            topic = %message.topic,
                            partition = message.partition,
                            offset = message.offset,
                            "error processing message: {}",
                            e
                        );
                        break Err(e);
                    }
                }
                Err(ConsumerError::Broker(e)) => {
                    metrics::record_consumer_error("broker");
                    error!("recoverable consumer error: {} -- will retry", e);
                }
                Err(e) => {
                    metrics::record_consumer_error("fatal");
                    break Err(e);
                }
            }
        };

        if let Err(e) = self.shutdown() {
            error!("error in consumer shutdown: {}", e);
            return result.and(Err(e));
        }
        result
    }

    /// Processes one message end to end and buffers its offset.
    pub async fn handle_message(&self, message: &ConsumerMessage) -> Result<(), ConsumerError> {
        let headers = MessageHeaders::parse(&message.headers).inspect_err(|_| {
            metrics::record_consumer_error("parse_headers");
        })?;

        let replicated = self.process_message(&headers, message).await?;

        if headers.operation != EventOperation::Deleted.as_str() {
            if let Some(Replicated {
                key,
                token: Some(token),
            }) = &replicated
            {
                self.update_consistency_token(key, token).await;
            }
        }

        self.notify(&headers.txid).await;

        let should_commit =
            self.coordinator
                .store(&message.topic, message.partition, message.offset);
        if should_commit {
            if let Err(e) = self.coordinator.commit(self.client.as_ref()) {
                metrics::record_consumer_error("commit");
                error!("failed to commit offsets: {}", e);
                return Ok(());
            }
        }

        metrics::record_message_processed(&headers.operation);
        info!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "consumed event"
        );
        Ok(())
    }

    async fn process_message(
        &self,
        headers: &MessageHeaders,
        message: &ConsumerMessage,
    ) -> Result<Option<Replicated>, ConsumerError> {
        let Some(operation) = EventOperation::from_str(&headers.operation) else {
            metrics::record_consumer_error("unknown_operation");
            error!(
                offset = message.offset,
                operation = %headers.operation,
                "unknown operation type, message cannot be processed and will be dropped"
            );
            return Ok(None);
        };
        if !self.authorizer.relations_enabled() {
            return Ok(None);
        }

        info!(operation = %operation.as_str(), txid = %headers.txid, "processing message");
        let value = message.payload.as_deref().unwrap_or_default();
        let event = parse_tuple_event(value).inspect_err(|e| {
            metrics::record_consumer_error("parse_message");
            error!("failed to parse message for tuple: {}", e);
        })?;

        let tuples = TuplesToReplicate::for_event(&event);
        if tuples.is_empty() {
            return Ok(Some(Replicated {
                key: event.reporter_resource_key,
                token: None,
            }));
        }

        self.ensure_lock_token().await?;
        let fencing = self.coordinator.fencing();
        let fencing = fencing.as_ref();
        let tuples = &tuples;
        let authorizer = self.authorizer.as_ref();
        let token = retry(self.config.retry(), operation.as_str(), || async move {
            let mut token = None;
            if !tuples.create.is_empty() {
                token = authorizer.create_tuples(&tuples.create, fencing).await?;
            }
            if !tuples.delete.is_empty() {
                let deleted = authorizer.delete_tuples(&tuples.delete, fencing).await?;
                token = token.or(deleted);
            }
            Ok(token)
        })
        .await
        .inspect_err(|e| {
            metrics::record_consumer_error("replicate_tuples");
            error!(operation = %operation.as_str(), "failed to replicate tuples: {}", e);
        })?;

        Ok(Some(Replicated {
            key: event.reporter_resource_key,
            token,
        }))
    }

    /// Acquires the fencing token for the current assignment if it is
    /// still missing.
    async fn ensure_lock_token(&self) -> Result<(), ConsumerError> {
        let Some(lock_id) = self.coordinator.lock_needing_token() else {
            return Ok(());
        };
        info!(%lock_id, "Attempting to acquire lock");

        let authorizer = &self.authorizer;
        let token = retry(self.config.retry(), "acquire_lock", || {
            authorizer.acquire_lock(&lock_id)
        })
        .await
        .map_err(|e| {
            error!(%lock_id, "failed to acquire lock token: {}", e);
            ConsumerError::Lock(e.to_string())
        })?;

        if self.coordinator.set_lock_token(&lock_id, token) {
            info!(%lock_id, "Successfully acquired lock token");
        }
        Ok(())
    }

    async fn update_consistency_token(&self, key: &ReporterResourceKey, token: &str) {
        match self.repository.set_consistency_token(key, token).await {
            Ok(true) => debug!(resource = %key.local_resource_id, "Updated consistency token"),
            Ok(false) => debug!(
                resource = %key.local_resource_id,
                "Resource not found, consistency token not stored"
            ),
            Err(e) => {
                metrics::record_consumer_error("update_consistency_token");
                error!("failed to update consistency token: {}", e);
            }
        }
    }

    async fn notify(&self, txid: &str) {
        let Some(notifier) = self.notifier.as_ref().filter(|_| !txid.is_empty()) else {
            debug!("skipping notification to producer: txid not present or notifier not initialized");
            return;
        };
        match notifier.notify(txid).await {
            Ok(()) => debug!(%txid, "notified producer of processed message"),
            Err(e) => {
                metrics::record_consumer_error("notify");
                error!(%txid, "failed to notify producer: {}", e);
            }
        }
    }

    /// Commits buffered offsets and closes the client. Revocations that
    /// race with this skip their own commit.
    pub fn shutdown(&self) -> Result<(), ConsumerError> {
        if self.client.is_closed() {
            return Ok(());
        }
        info!("shutting down consumer...");
        if let Err(e) = self.coordinator.shutdown(self.client.as_ref()) {
            error!("failed to commit offsets before shutting down: {}", e);
        }
        self.client.close().inspect_err(|e| {
            error!("Error closing consumer: {}", e);
        })
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::consumer::authorizer::RelationTuple;
    use crate::consumer::authorizer::AllowAllAuthorizer;
    use crate::consumer::offsets::{
        FencingCheck, OffsetCommitter, RebalanceHandler, TopicPartitionOffset,
    };
    use crate::dal::{ResourceChange, DAL};
    use crate::database::Database;
    use crate::error::PubSubError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedClient {
        messages: Mutex<VecDeque<Result<ConsumerMessage, ConsumerError>>>,
        commits: Mutex<Vec<Vec<TopicPartitionOffset>>>,
        closed: AtomicBool,
    }

    impl OffsetCommitter for ScriptedClient {
        fn commit_offsets(&self, offsets: &[TopicPartitionOffset]) -> Result<(), ConsumerError> {
            self.commits.lock().push(offsets.to_vec());
            Ok(())
        }
    }

    #[async_trait]
    impl EventConsumer for ScriptedClient {
        fn subscribe(&self, _topics: &[&str]) -> Result<(), ConsumerError> {
            Ok(())
        }

        async fn recv(&self) -> Result<ConsumerMessage, ConsumerError> {
            let next = self.messages.lock().pop_front();
            match next {
                Some(next) => next,
                None => std::future::pending().await,
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

    #[derive(Default)]
    struct RecordingAuthorizer {
        created: Mutex<Vec<RelationTuple>>,
        fencing: Mutex<Vec<Option<FencingCheck>>>,
        locks: AtomicUsize,
    }

    #[async_trait]
    impl Authorizer for RecordingAuthorizer {
        fn relations_enabled(&self) -> bool {
            true
        }

        async fn acquire_lock(&self, lock_id: &str) -> Result<String, ConsumerError> {
            self.locks.fetch_add(1, Ordering::SeqCst);
            Ok(format!("token-for-{}", lock_id))
        }

        async fn create_tuples(
            &self,
            tuples: &[RelationTuple],
            fencing: Option<&FencingCheck>,
        ) -> Result<Option<String>, ConsumerError> {
            self.created.lock().extend_from_slice(tuples);
            self.fencing.lock().push(fencing.cloned());
            Ok(Some("zed-1".to_string()))
        }

        async fn delete_tuples(
            &self,
            _tuples: &[RelationTuple],
            _fencing: Option<&FencingCheck>,
        ) -> Result<Option<String>, ConsumerError> {
            Ok(Some("zed-2".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        payloads: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, payload: &str) -> Result<(), PubSubError> {
            if self.fail {
                return Err(PubSubError::NotConnected);
            }
            self.payloads.lock().push(payload.to_string());
            Ok(())
        }
    }

    async fn repository(name: &str) -> ResourceRepository {
        let url = format!("file:{}_{}?mode=memory&cache=shared", name, uuid::Uuid::new_v4());
        let db = Database::try_new(&url, 1).unwrap();
        db.run_migrations().await.unwrap();
        ResourceRepository::new(DAL::new(db).transaction_manager(3))
    }

    fn key() -> ReporterResourceKey {
        ReporterResourceKey::new("host-1", "hbi", "host", "instance-1")
    }

    async fn seed(repository: &ResourceRepository) {
        let change = ResourceChange {
            key: key(),
            api_href: "https://api/hosts/1".to_string(),
            console_href: None,
            workspace_id: "ws-1".to_string(),
            data: json!({}),
            transaction_id: None,
        };
        repository
            .transaction_manager()
            .run_with_retry("seed", move |conn| {
                ResourceRepository::report(conn, &change, "tx-seed")
            })
            .await
            .unwrap();
    }

    fn message(offset: i64, operation: &str, txid: &str) -> ConsumerMessage {
        let payload = json!({
            "schema": {},
            "payload": {
                "reporter_resource_key": key(),
                "operation_type": operation,
                "common_version": 0,
                "reporter_representation_version": 0,
                "workspace_id": "ws-1"
            }
        });
        ConsumerMessage {
            topic: "outbox.event.kessel.tuples".to_string(),
            partition: 0,
            offset,
            key: None,
            payload: Some(payload.to_string().into_bytes()),
            headers: vec![
                ("operation".to_string(), operation.as_bytes().to_vec()),
                ("txid".to_string(), txid.as_bytes().to_vec()),
            ],
        }
    }

    fn config() -> ConsumerConfig {
        ConsumerConfig::builder()
            .bootstrap_servers(vec!["localhost:9092".to_string()])
            .commit_modulo(2)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_message_replicates_stores_token_and_notifies() {
        let repository = repository("consumer_process").await;
        seed(&repository).await;
        let client = Arc::new(ScriptedClient::default());
        let authorizer = Arc::new(RecordingAuthorizer::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = Arc::new(OffsetCoordinator::new("inventory-consumer", 2));
        coordinator.on_assigned(&[0]);

        let consumer = InventoryConsumer::new(
            client.clone(),
            config(),
            coordinator.clone(),
            repository.clone(),
            authorizer.clone(),
        )
        .with_notifier(notifier.clone());

        consumer
            .handle_message(&message(1, "created", "tx-1"))
            .await
            .unwrap();

        assert_eq!(authorizer.created.lock().len(), 1);
        assert_eq!(authorizer.locks.load(Ordering::SeqCst), 1);
        assert_eq!(
            authorizer.fencing.lock()[0].as_ref().map(|f| f.lock_id.as_str()),
            Some("inventory-consumer/0")
        );
        assert_eq!(notifier.payloads.lock().as_slice(), ["tx-1"]);
        assert_eq!(coordinator.pending_count(), 1);

        let found = repository.find_resource(&key()).await.unwrap().unwrap();
        assert_eq!(found.resource.consistency_token.as_deref(), Some("zed-1"));

        consumer
            .handle_message(&message(2, "updated", ""))
            .await
            .unwrap();
        assert_eq!(client.commits.lock().len(), 1);
        assert_eq!(coordinator.pending_count(), 0);
        assert_eq!(notifier.payloads.lock().len(), 1);
        assert_eq!(authorizer.locks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_notify_still_stores_offset() {
        let repository = repository("consumer_notify_fail").await;
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        let coordinator = Arc::new(OffsetCoordinator::new("inventory-consumer", 100));
        let consumer = InventoryConsumer::new(
            Arc::new(ScriptedClient::default()),
            config(),
            coordinator.clone(),
            repository,
            Arc::new(AllowAllAuthorizer),
        )
        .with_notifier(notifier);

        consumer
            .handle_message(&message(1, "created", "tx-1"))
            .await
            .unwrap();
        assert_eq!(coordinator.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_headers_stop_the_loop_and_commit() {
        let repository = repository("consumer_headers").await;
        let client = Arc::new(ScriptedClient::default());
        let mut bad = message(1, "created", "tx-1");
        bad.headers.retain(|(k, _)| k != "txid");
        {
            let mut queue = client.messages.lock();
            queue.push_back(Ok(message(0, "created", "tx-0")));
            queue.push_back(Err(ConsumerError::Broker("transient".to_string())));
            queue.push_back(Ok(bad));
        }
        let coordinator = Arc::new(OffsetCoordinator::new("inventory-consumer", 100));
        let consumer = InventoryConsumer::new(
            client.clone(),
            config(),
            coordinator.clone(),
            repository,
            Arc::new(AllowAllAuthorizer),
        );

        let result = consumer.consume(CancellationToken::new()).await;
        assert!(matches!(result, Err(ConsumerError::InvalidHeaders(_))));
        assert!(client.is_closed());
        assert!(coordinator.is_shutting_down());
        assert_eq!(client.commits.lock().as_slice(), [vec![TopicPartitionOffset {
            topic: "outbox.event.kessel.tuples".to_string(),
            partition: 0,
            offset: 1,
        }]]);
    }

    #[tokio::test]
    async fn test_cancel_shuts_down_cleanly() {
        let repository = repository("consumer_cancel").await;
        let client = Arc::new(ScriptedClient::default());
        let consumer = InventoryConsumer::new(
            client.clone(),
            config(),
            Arc::new(OffsetCoordinator::new("inventory-consumer", 10)),
            repository,
            Arc::new(AllowAllAuthorizer),
        );

        let cancel = CancellationToken::new();
        cancel.cancel();
        consumer.consume(cancel).await.unwrap();
        assert!(client.is_closed());
        assert!(client.commits.lock().is_empty());
        consumer.shutdown().unwrap();
    }
}
