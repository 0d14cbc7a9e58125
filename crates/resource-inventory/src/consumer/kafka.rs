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

//! rdkafka-backed [`EventConsumer`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Headers, Message};
use rdkafka::statistics::Statistics;
use rdkafka::{ClientConfig, ClientContext, Offset, TopicPartitionList};
use tracing::{debug, error};

use super::config::ConsumerConfig;
use super::message::{ConsumerMessage, EventConsumer};
use super::offsets::{OffsetCommitter, RebalanceHandler, TopicPartitionOffset};
use crate::error::ConsumerError;
use crate::metrics;

/// Forwards rebalances to the handler and statistics to the metrics gauges.
pub struct InventoryContext {
    handler: Arc<dyn RebalanceHandler>,
}

impl ClientContext for InventoryContext {
    fn stats(&self, statistics: Statistics) {
        let lag: i64 = statistics
            .topics
            .values()
            .flat_map(|topic| topic.partitions.values())
            .filter(|partition| partition.partition >= 0)
            .map(|partition| partition.consumer_lag.max(0))
            .sum();
        metrics::set_consumer_statistics(statistics.msg_cnt as i64, lag);
    }
}

impl ConsumerContext for InventoryContext {
    fn pre_rebalance(&self, base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(assigned) => {
                let partitions: Vec<i32> = assigned
                    .elements()
                    .iter()
                    .map(|element| element.partition())
                    .collect();
                self.handler.on_assigned(&partitions);
            }
            Rebalance::Revoke(revoked) => {
                debug!(count = revoked.count(), "partition(s) revoked");
                let committer = BaseCommitter(base_consumer);
                if let Err(e) = self
                    .handler
                    .on_revoked(&committer, base_consumer.assignment_lost())
                {
                    error!("failed to commit offsets during rebalance: {}", e);
                }
            }
            Rebalance::Error(e) => error!("rebalance error: {}", e),
        }
    }
}

struct BaseCommitter<'a>(&'a BaseConsumer<InventoryContext>);

impl OffsetCommitter for BaseCommitter<'_> {
    fn commit_offsets(&self, offsets: &[TopicPartitionOffset]) -> Result<(), ConsumerError> {
        self.0
            .commit(&partition_list(offsets)?, CommitMode::Sync)
            .map_err(|e| ConsumerError::Commit(e.to_string()))
    }
}

/// Collapses `offsets` to the highest offset per partition.
fn partition_list(offsets: &[TopicPartitionOffset]) -> Result<TopicPartitionList, ConsumerError> {
    let mut latest: BTreeMap<(&str, i32), i64> = BTreeMap::new();
    for tpo in offsets {
        let entry = latest
            .entry((tpo.topic.as_str(), tpo.partition))
            .or_insert(tpo.offset);
        *entry = (*entry).max(tpo.offset);
    }

    let mut list = TopicPartitionList::new();
    for ((topic, partition), offset) in latest {
        list.add_partition_offset(topic, partition, Offset::Offset(offset))
            .map_err(|e| ConsumerError::Commit(e.to_string()))?;
    }
    Ok(list)
}

pub struct KafkaEventConsumer {
    consumer: StreamConsumer<InventoryContext>,
    closed: AtomicBool,
}

impl KafkaEventConsumer {
    /// Creates the client. Rebalances are delivered to `handler`.
    pub fn new(
        config: &ConsumerConfig,
        handler: Arc<dyn RebalanceHandler>,
    ) -> Result<Self, ConsumerError> {
        let mut client_config = ClientConfig::new();
        for (key, value) in config.client_properties() {
            client_config.set(key, value);
        }
        debug!(group_id = %config.group_id(), "Setting up kafka consumer");

        let consumer: StreamConsumer<InventoryContext> = client_config
            .create_with_context(InventoryContext { handler })
            .map_err(|e| ConsumerError::Config(e.to_string()))?;

        Ok(Self {
            consumer,
            closed: AtomicBool::new(false),
        })
    }
}

impl OffsetCommitter for KafkaEventConsumer {
    fn commit_offsets(&self, offsets: &[TopicPartitionOffset]) -> Result<(), ConsumerError> {
        self.consumer
            .commit(&partition_list(offsets)?, CommitMode::Sync)
            .map_err(|e| ConsumerError::Commit(e.to_string()))
    }
}

fn classify(err: KafkaError) -> ConsumerError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::Fatal) => ConsumerError::FatalBroker(err.to_string()),
        _ => ConsumerError::Broker(err.to_string()),
    }
}

#[async_trait]
impl EventConsumer for KafkaEventConsumer {
    fn subscribe(&self, topics: &[&str]) -> Result<(), ConsumerError> {
        self.consumer.subscribe(topics).map_err(classify)
    }

    async fn recv(&self) -> Result<ConsumerMessage, ConsumerError> {
        if self.is_closed() {
            return Err(ConsumerError::Closed);
        }
        let message = self.consumer.recv().await.map_err(classify)?;

        let headers = message
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|header| {
                        (
                            header.key.to_string(),
                            header.value.map(<[u8]>::to_vec).unwrap_or_default(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ConsumerMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec),
            headers,
        })
    }

    fn close(&self) -> Result<(), ConsumerError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.consumer.unsubscribe();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn assignment_lost(&self) -> bool {
        self.consumer.assignment_lost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_list_keeps_highest_offset() {
        let offsets = [
            TopicPartitionOffset {
                topic: "t".to_string(),
                partition: 0,
                offset: 5,
            },
            TopicPartitionOffset {
                topic: "t".to_string(),
                partition: 0,
                offset: 9,
            },
            TopicPartitionOffset {
                topic: "t".to_string(),
                partition: 1,
                offset: 2,
            },
        ];
        let list = partition_list(&offsets).unwrap();
        assert_eq!(list.count(), 2);
        assert_eq!(
            list.find_partition("t", 0).map(|p| p.offset()),
            Some(Offset::Offset(9))
        );
    }
}
