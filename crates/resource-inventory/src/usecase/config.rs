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

//! Read-after-write policy for the resource usecase.

use std::time::Duration;

/// Allowlist entry matching every caller.
pub const ALLOWLIST_WILDCARD: &str = "*";

/// Default bound on a single consistency wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-process read-after-write policy.
///
/// # Construction
///
/// ```rust,ignore
/// let config = UsecaseConfig::builder()
///     .read_after_write_enabled(true)
///     .read_after_write_allowlist(vec!["SP1".to_string()])
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct UsecaseConfig {
    read_after_write_enabled: bool,
    read_after_write_allowlist: Vec<String>,
    consumer_enabled: bool,
    wait_timeout: Duration,
}

impl UsecaseConfig {
    pub fn builder() -> UsecaseConfigBuilder {
        UsecaseConfigBuilder::default()
    }

    pub fn read_after_write_enabled(&self) -> bool {
        self.read_after_write_enabled
    }

    pub fn read_after_write_allowlist(&self) -> &[String] {
        &self.read_after_write_allowlist
    }

    /// Whether a consumer is running to deliver notifications at all.
    pub fn consumer_enabled(&self) -> bool {
        self.consumer_enabled
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Whether `principal` is on the allowlist, directly or via the wildcard.
    pub fn is_allowlisted(&self, principal: &str) -> bool {
        self.read_after_write_allowlist
            .iter()
            .any(|entry| entry == ALLOWLIST_WILDCARD || entry == principal)
    }
}

impl Default for UsecaseConfig {
    fn default() -> Self {
        UsecaseConfigBuilder::default().build()
    }
}

#[derive(Debug, Clone)]
pub struct UsecaseConfigBuilder {
    config: UsecaseConfig,
}

impl Default for UsecaseConfigBuilder {
    fn default() -> Self {
        Self {
            config: UsecaseConfig {
                read_after_write_enabled: false,
                read_after_write_allowlist: Vec::new(),
                consumer_enabled: true,
                wait_timeout: DEFAULT_WAIT_TIMEOUT,
            },
        }
    }
}

impl UsecaseConfigBuilder {
    pub fn read_after_write_enabled(mut self, value: bool) -> Self {
        self.config.read_after_write_enabled = value;
        self
    }

    pub fn read_after_write_allowlist(mut self, value: Vec<String>) -> Self {
        self.config.read_after_write_allowlist = value;
        self
    }

    pub fn consumer_enabled(mut self, value: bool) -> Self {
        self.config.consumer_enabled = value;
        self
    }

    pub fn wait_timeout(mut self, value: Duration) -> Self {
        self.config.wait_timeout = value;
        self
    }

    pub fn build(self) -> UsecaseConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UsecaseConfig::default();
        assert!(!config.read_after_write_enabled());
        assert!(config.read_after_write_allowlist().is_empty());
        assert!(config.consumer_enabled());
        assert_eq!(config.wait_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_allowlist_matching() {
        let config = UsecaseConfig::builder()
            .read_after_write_allowlist(vec!["SP1".to_string()])
            .build();
        assert!(config.is_allowlisted("SP1"));
        assert!(!config.is_allowlisted("SP2"));

        let config = UsecaseConfig::builder()
            .read_after_write_allowlist(vec![ALLOWLIST_WILDCARD.to_string()])
            .build();
        assert!(config.is_allowlisted("anyone"));
    }
}
