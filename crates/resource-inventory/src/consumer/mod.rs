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

//! Outbox consumer.
//!
//! Reads tuple events published from the outbox table, replicates them into
//! the authorization store and notifies read-after-write waiters. Offsets
//! are committed in batches through the [`OffsetCoordinator`], which also
//! owns the partition lock used to fence authorization writes.

pub mod authorizer;
pub mod config;
pub mod inventory_consumer;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod message;
pub mod offsets;
pub mod retry;

pub use authorizer::{AllowAllAuthorizer, Authorizer, RelationTuple, TuplesToReplicate};
pub use config::{AuthOptions, ConsumerConfig, ConsumerConfigBuilder};
pub use inventory_consumer::InventoryConsumer;
#[cfg(feature = "kafka")]
pub use kafka::KafkaEventConsumer;
pub use message::{ConsumerMessage, EventConsumer, MessageHeaders};
pub use offsets::{
    FencingCheck, OffsetCommitter, OffsetCoordinator, RebalanceHandler, TopicPartitionOffset,
};
pub use retry::{retry, RetryOptions};
