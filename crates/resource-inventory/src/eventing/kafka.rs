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

//! Event manager backed by a Kafka producer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use tracing::{debug, error, info};

use super::api::{Event, EventManager, Producer};
use crate::error::EventingError;

pub const DEFAULT_EVENT_TOPIC: &str = "kessel-inventory";
pub const DEFAULT_CLIENT_ID: &str = "inventory-api";
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for [`KafkaEventManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaEventingOptions {
    pub bootstrap_servers: String,
    pub default_topic: String,
    pub client_id: String,
    pub delivery_timeout: Duration,
}

impl KafkaEventingOptions {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            default_topic: DEFAULT_EVENT_TOPIC.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }

    fn client_config(&self) -> Result<ClientConfig, EventingError> {
        if self.bootstrap_servers.is_empty() {
            return Err(EventingError::Config(
                "bootstrap servers must be set".to_string(),
            ));
        }
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("client.id", &self.client_id)
            .set(
                "message.timeout.ms",
                self.delivery_timeout.as_millis().to_string(),
            );
        Ok(config)
    }
}

struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
    key: String,
    delivery_timeout: Duration,
    shut_down: Arc<AtomicBool>,
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn produce(&self, event: &Event) -> Result<(), EventingError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(EventingError::ShutDown);
        }
        let payload = serde_json::to_vec(event)?;
        let record = FutureRecord::to(&self.topic)
            .key(&self.key)
            .payload(&payload);

        match self.producer.send(record, self.delivery_timeout).await {
            Ok(_) => {
                debug!(topic = %self.topic, event_id = %event.id, "Delivered event");
                Ok(())
            }
            Err((err, _)) => {
                error!(topic = %self.topic, event_id = %event.id, "Delivery failed: {}", err);
                Err(EventingError::Produce(err.to_string()))
            }
        }
    }
}

/// Produces every event to the configured default topic, keyed by resource id.
pub struct KafkaEventManager {
    options: KafkaEventingOptions,
    producer: FutureProducer,
    shut_down: Arc<AtomicBool>,
}

impl KafkaEventManager {
    pub fn new(options: KafkaEventingOptions) -> Result<Self, EventingError> {
        let producer: FutureProducer = options
            .client_config()?
            .create()
            .map_err(|e| EventingError::Config(e.to_string()))?;
        info!(topic = %options.default_topic, "Using eventing: kafka");

        Ok(Self {
            options,
            producer,
            shut_down: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl EventManager for KafkaEventManager {
    fn lookup(
        &self,
        _principal: &str,
        _resource_type: &str,
        resource_id: &str,
    ) -> Result<Arc<dyn Producer>, EventingError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(EventingError::ShutDown);
        }
        Ok(Arc::new(KafkaProducer {
            producer: self.producer.clone(),
            topic: self.options.default_topic.clone(),
            key: resource_id.to_string(),
            delivery_timeout: self.options.delivery_timeout,
            shut_down: self.shut_down.clone(),
        }))
    }

    async fn shutdown(&self) -> Result<(), EventingError> {
        self.shut_down.store(true, Ordering::Release);
        let producer = self.producer.clone();
        let timeout = self.options.delivery_timeout;
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| EventingError::Produce(e.to_string()))?
            .map_err(|e| EventingError::Produce(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_bootstrap_servers_is_rejected() {
        let options = KafkaEventingOptions::new("");
        assert!(matches!(
            KafkaEventManager::new(options),
            Err(EventingError::Config(_))
        ));
    }

    #[test]
    fn test_option_defaults() {
        let options = KafkaEventingOptions::new("localhost:9092");
        assert_eq!(options.default_topic, "kessel-inventory");
        assert_eq!(options.client_id, "inventory-api");
        assert_eq!(options.delivery_timeout, Duration::from_secs(5));
    }
}
