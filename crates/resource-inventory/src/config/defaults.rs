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

use super::types::*;
use crate::consumer::config::{DEFAULT_GROUP_ID, DEFAULT_TOPIC};
use crate::dal::maintenance::{DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE};
#[cfg(feature = "kafka")]
use crate::eventing::kafka::DEFAULT_EVENT_TOPIC;
#[cfg(not(feature = "kafka"))]
const DEFAULT_EVENT_TOPIC: &str = "kessel-inventory";

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            storage: StorageSettings::default(),
            consistency: ConsistencySettings::default(),
            consumer: ConsumerSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            maintenance: MaintenanceSettings::default(),
            eventing: EventingSettings::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: 10,
        }
    }
}

impl Default for ConsistencySettings {
    fn default() -> Self {
        Self {
            read_after_write_enabled: false,
            read_after_write_allowlist: Vec::new(),
            wait_timeout_secs: 10,
            listen_timeout_secs: 30,
            max_serialization_retries: 10,
        }
    }
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bootstrap_servers: Vec::new(),
            group_id: DEFAULT_GROUP_ID.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            commit_modulo: 10,
            session_timeout_ms: 45_000,
            heartbeat_interval_ms: 3_000,
            max_poll_interval_ms: 300_000,
            enable_auto_commit: false,
            auto_offset_reset: "earliest".to_string(),
            statistics_interval_ms: 60_000,
            debug: None,
            operation_max_retries: 3,
            backoff_factor: 5,
            max_backoff_secs: 30,
            consumer_max_retries: 2,
            auth: AuthSettings::default(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            security_protocol: None,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            ca_cert_location: None,
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay_ms: DEFAULT_BATCH_DELAY.as_millis() as u64,
        }
    }
}

impl Default for EventingSettings {
    fn default() -> Self {
        Self {
            backend: EventingBackend::None,
            bootstrap_servers: None,
            topic: DEFAULT_EVENT_TOPIC.to_string(),
        }
    }
}
