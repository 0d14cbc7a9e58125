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

//! Configuration file schema.
//!
//! Every section and field is optional in the file; missing values take the
//! defaults from [`super::defaults`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::consumer::{AuthOptions, ConsumerConfig, RetryOptions};
use crate::dal::maintenance::BatchSettings;
use crate::resilience::CircuitBreakerConfig;
use crate::usecase::UsecaseConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    pub storage: StorageSettings,
    pub consistency: ConsistencySettings,
    pub consumer: ConsumerSettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub maintenance: MaintenanceSettings,
    pub eventing: EventingSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub pool_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencySettings {
    pub read_after_write_enabled: bool,
    pub read_after_write_allowlist: Vec<String>,
    pub wait_timeout_secs: u64,
    pub listen_timeout_secs: u64,
    pub max_serialization_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerSettings {
    pub enabled: bool,
    pub bootstrap_servers: Vec<String>,
    pub group_id: String,
    pub topic: String,
    pub commit_modulo: i64,
    pub session_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub enable_auto_commit: bool,
    pub auto_offset_reset: String,
    pub statistics_interval_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
    pub operation_max_retries: i64,
    pub backoff_factor: u32,
    pub max_backoff_secs: u64,
    pub consumer_max_retries: i64,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub enabled: bool,
    pub security_protocol: Option<String>,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub ca_cert_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSettings {
    pub batch_size: i64,
    pub batch_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventingBackend {
    #[default]
    None,
    Stdout,
    Kafka,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventingSettings {
    pub backend: EventingBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_servers: Option<String>,
    pub topic: String,
}

impl InventoryConfig {
    /// Checks the values that have no meaningful interpretation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        if self.storage.pool_size == 0 {
            errors.push("storage.pool_size must be at least 1".to_string());
        }
        if self.consistency.wait_timeout_secs == 0 {
            errors.push("consistency.wait_timeout_secs must be positive".to_string());
        }
        if self.consistency.listen_timeout_secs == 0 {
            errors.push("consistency.listen_timeout_secs must be positive".to_string());
        }
        if self.circuit_breaker.failure_threshold == 0 {
            errors.push("circuit_breaker.failure_threshold must be at least 1".to_string());
        }
        if self.maintenance.batch_size <= 0 {
            errors.push("maintenance.batch_size must be positive".to_string());
        }
        if self.eventing.backend == EventingBackend::Kafka
            && self
                .eventing
                .bootstrap_servers
                .as_deref()
                .unwrap_or_default()
                .is_empty()
        {
            errors.push("eventing.bootstrap_servers is required for the kafka backend".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(errors.join("; ")))
        }
    }

    pub fn usecase_config(&self) -> UsecaseConfig {
        UsecaseConfig::builder()
            .read_after_write_enabled(self.consistency.read_after_write_enabled)
            .read_after_write_allowlist(self.consistency.read_after_write_allowlist.clone())
            .consumer_enabled(self.consumer.enabled)
            .wait_timeout(Duration::from_secs(self.consistency.wait_timeout_secs))
            .build()
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_secs(self.consistency.listen_timeout_secs)
    }

    pub fn consumer_config(&self) -> Result<ConsumerConfig, ConfigError> {
        let consumer = &self.consumer;
        let auth = &consumer.auth;
        ConsumerConfig::builder()
            .enabled(consumer.enabled)
            .bootstrap_servers(consumer.bootstrap_servers.clone())
            .group_id(consumer.group_id.as_str())
            .topic(consumer.topic.as_str())
            .commit_modulo(consumer.commit_modulo)
            .session_timeout(Duration::from_millis(consumer.session_timeout_ms))
            .heartbeat_interval(Duration::from_millis(consumer.heartbeat_interval_ms))
            .max_poll_interval(Duration::from_millis(consumer.max_poll_interval_ms))
            .enable_auto_commit(consumer.enable_auto_commit)
            .auto_offset_reset(consumer.auto_offset_reset.as_str())
            .statistics_interval(Duration::from_millis(consumer.statistics_interval_ms))
            .debug(consumer.debug.clone())
            .auth(AuthOptions {
                enabled: auth.enabled,
                security_protocol: auth.security_protocol.clone(),
                sasl_mechanism: auth.sasl_mechanism.clone(),
                sasl_username: auth.sasl_username.clone(),
                sasl_password: auth.sasl_password.clone(),
                ca_cert_location: auth.ca_cert_location.clone(),
            })
            .retry(RetryOptions {
                operation_max_retries: consumer.operation_max_retries,
                backoff_factor: consumer.backoff_factor,
                max_backoff: Duration::from_secs(consumer.max_backoff_secs),
            })
            .consumer_max_retries(consumer.consumer_max_retries)
            .build()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::builder()
            .failure_threshold(self.circuit_breaker.failure_threshold)
            .cooldown(Duration::from_secs(self.circuit_breaker.cooldown_secs))
            .build()
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            batch_size: self.maintenance.batch_size,
            batch_delay: Duration::from_millis(self.maintenance.batch_delay_ms),
        }
    }
}
