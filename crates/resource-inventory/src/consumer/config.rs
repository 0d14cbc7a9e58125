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

//! Consumer settings and their broker client properties.

use std::time::Duration;

use super::retry::RetryOptions;
use crate::error::ConsumerError;

pub const DEFAULT_GROUP_ID: &str = "inventory-consumer";
pub const DEFAULT_TOPIC: &str = "outbox.event.kessel.tuples";
pub const CLIENT_ID: &str = "inventory-consumer";

/// SASL/TLS settings for the broker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOptions {
    pub enabled: bool,
    pub security_protocol: Option<String>,
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    pub ca_cert_location: Option<String>,
}

impl Default for AuthOptions {
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

/// Outbox consumer configuration.
///
/// ```rust,ignore
/// let config = ConsumerConfig::builder()
///     .bootstrap_servers(vec!["localhost:9092".to_string()])
///     .commit_modulo(10)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    enabled: bool,
    bootstrap_servers: Vec<String>,
    group_id: String,
    topic: String,
    commit_modulo: i64,
    session_timeout: Duration,
    heartbeat_interval: Duration,
    max_poll_interval: Duration,
    enable_auto_commit: bool,
    auto_offset_reset: String,
    statistics_interval: Duration,
    debug: Option<String>,
    auth: AuthOptions,
    retry: RetryOptions,
    consumer_max_retries: i64,
}

impl ConsumerConfig {
    pub fn builder() -> ConsumerConfigBuilder {
        ConsumerConfigBuilder::default()
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn bootstrap_servers(&self) -> &[String] {
        &self.bootstrap_servers
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Offsets are committed whenever a processed message's offset is a
    /// multiple of this value.
    pub fn commit_modulo(&self) -> i64 {
        self.commit_modulo
    }

    pub fn auth(&self) -> &AuthOptions {
        &self.auth
    }

    pub fn retry(&self) -> &RetryOptions {
        &self.retry
    }

    /// Restarts of the consume loop before giving up; `-1` is unbounded.
    pub fn consumer_max_retries(&self) -> i64 {
        self.consumer_max_retries
    }

    /// librdkafka properties for this configuration.
    pub fn client_properties(&self) -> Vec<(&'static str, String)> {
        let mut properties = vec![
            ("client.id", CLIENT_ID.to_string()),
            ("bootstrap.servers", self.bootstrap_servers.join(",")),
            ("group.id", self.group_id.clone()),
            (
                "session.timeout.ms",
                self.session_timeout.as_millis().to_string(),
            ),
            (
                "heartbeat.interval.ms",
                self.heartbeat_interval.as_millis().to_string(),
            ),
            (
                "max.poll.interval.ms",
                self.max_poll_interval.as_millis().to_string(),
            ),
            ("enable.auto.commit", self.enable_auto_commit.to_string()),
            ("auto.offset.reset", self.auto_offset_reset.clone()),
            (
                "statistics.interval.ms",
                self.statistics_interval.as_millis().to_string(),
            ),
        ];
        if let Some(debug) = self.debug.as_ref().filter(|d| !d.is_empty()) {
            properties.push(("debug", debug.clone()));
        }

        if self.auth.enabled {
            let auth = [
                ("security.protocol", &self.auth.security_protocol),
                ("sasl.mechanism", &self.auth.sasl_mechanism),
                ("sasl.username", &self.auth.sasl_username),
                ("sasl.password", &self.auth.sasl_password),
                ("ssl.ca.location", &self.auth.ca_cert_location),
            ];
            properties.extend(
                auth.into_iter()
                    .filter_map(|(key, value)| value.clone().map(|v| (key, v))),
            );
        }
        properties
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfigBuilder {
    config: ConsumerConfig,
}

impl Default for ConsumerConfigBuilder {
    fn default() -> Self {
        Self {
            config: ConsumerConfig {
                enabled: true,
                bootstrap_servers: Vec::new(),
                group_id: DEFAULT_GROUP_ID.to_string(),
                topic: DEFAULT_TOPIC.to_string(),
                commit_modulo: 10,
                session_timeout: Duration::from_millis(45_000),
                heartbeat_interval: Duration::from_millis(3_000),
                max_poll_interval: Duration::from_millis(300_000),
                enable_auto_commit: false,
                auto_offset_reset: "earliest".to_string(),
                statistics_interval: Duration::from_millis(60_000),
                debug: None,
                auth: AuthOptions::default(),
                retry: RetryOptions::default(),
                consumer_max_retries: 2,
            },
        }
    }
}

impl ConsumerConfigBuilder {
    pub fn enabled(mut self, value: bool) -> Self {
        self.config.enabled = value;
        self
    }

    pub fn bootstrap_servers(mut self, value: Vec<String>) -> Self {
        self.config.bootstrap_servers = value;
        self
    }

    pub fn group_id(mut self, value: impl Into<String>) -> Self {
        self.config.group_id = value.into();
        self
    }

    pub fn topic(mut self, value: impl Into<String>) -> Self {
        self.config.topic = value.into();
        self
    }

    pub fn commit_modulo(mut self, value: i64) -> Self {
        self.config.commit_modulo = value;
        self
    }

    pub fn session_timeout(mut self, value: Duration) -> Self {
        self.config.session_timeout = value;
        self
    }

    pub fn heartbeat_interval(mut self, value: Duration) -> Self {
        self.config.heartbeat_interval = value;
        self
    }

    pub fn max_poll_interval(mut self, value: Duration) -> Self {
        self.config.max_poll_interval = value;
        self
    }

    pub fn enable_auto_commit(mut self, value: bool) -> Self {
        self.config.enable_auto_commit = value;
        self
    }

    pub fn auto_offset_reset(mut self, value: impl Into<String>) -> Self {
        self.config.auto_offset_reset = value.into();
        self
    }

    pub fn statistics_interval(mut self, value: Duration) -> Self {
        self.config.statistics_interval = value;
        self
    }

    pub fn debug(mut self, value: Option<String>) -> Self {
        self.config.debug = value;
        self
    }

    pub fn auth(mut self, value: AuthOptions) -> Self {
        self.config.auth = value;
        self
    }

    pub fn retry(mut self, value: RetryOptions) -> Self {
        self.config.retry = value;
        self
    }

    pub fn consumer_max_retries(mut self, value: i64) -> Self {
        self.config.consumer_max_retries = value;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<ConsumerConfig, ConsumerError> {
        let config = self.config;
        if config.enabled && config.bootstrap_servers.iter().all(|s| s.is_empty()) {
            return Err(ConsumerError::Config(
                "bootstrap servers can not be empty".to_string(),
            ));
        }
        if config.commit_modulo <= 0 {
            return Err(ConsumerError::Config(
                "commit modulo must be positive".to_string(),
            ));
        }
        if config.heartbeat_interval >= config.session_timeout {
            return Err(ConsumerError::Config(
                "heartbeat interval must be lower than the session timeout".to_string(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn servers() -> Vec<String> {
        vec!["localhost:9092".to_string()]
    }

    #[test]
    fn test_defaults() {
        let config = ConsumerConfig::builder()
            .bootstrap_servers(servers())
            .build()
            .unwrap();
        assert_eq!(config.group_id(), "inventory-consumer");
        assert_eq!(config.topic(), "outbox.event.kessel.tuples");
        assert_eq!(config.commit_modulo(), 10);
        assert_eq!(config.consumer_max_retries(), 2);
        assert_eq!(config.retry().operation_max_retries, 3);

        let properties = config.client_properties();
        let get = |key: &str| {
            properties
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("session.timeout.ms"), Some("45000"));
        assert_eq!(get("heartbeat.interval.ms"), Some("3000"));
        assert_eq!(get("max.poll.interval.ms"), Some("300000"));
        assert_eq!(get("enable.auto.commit"), Some("false"));
        assert_eq!(get("auto.offset.reset"), Some("earliest"));
        assert_eq!(get("client.id"), Some("inventory-consumer"));
        assert_eq!(get("debug"), None);
        assert_eq!(get("security.protocol"), None);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            ConsumerConfig::builder().build(),
            Err(ConsumerError::Config(_))
        ));
        assert!(ConsumerConfig::builder().enabled(false).build().is_ok());
        assert!(ConsumerConfig::builder()
            .bootstrap_servers(servers())
            .commit_modulo(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_auth_properties() {
        let config = ConsumerConfig::builder()
            .bootstrap_servers(servers())
            .auth(AuthOptions {
                security_protocol: Some("SASL_SSL".to_string()),
                sasl_mechanism: Some("SCRAM-SHA-512".to_string()),
                sasl_username: Some("inventory".to_string()),
                sasl_password: Some("secret".to_string()),
                ..AuthOptions::default()
            })
            .build()
            .unwrap();

        let properties = config.client_properties();
        assert!(properties.contains(&("security.protocol", "SASL_SSL".to_string())));
        assert!(properties.contains(&("sasl.username", "inventory".to_string())));
        assert!(!properties.iter().any(|(k, _)| *k == "ssl.ca.location"));
    }
}
