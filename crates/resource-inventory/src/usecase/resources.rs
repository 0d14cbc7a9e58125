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

//! Resource writes with optional read-after-write consistency.
//!
//! A caller that asks for [`WriteVisibility::Immediate`] and passes the
//! policy check gets a response only after the consumer has applied the
//! write's tuple event downstream, or after the wait gives up. The wait is:
//!
//! 1. subscribe to the write's transaction id before the transaction starts;
//! 2. commit the resource rows and outbox events tagged with that id;
//! 3. block on the subscription through the circuit breaker, bounded by the
//!    configured timeout;
//! 4. release the subscription on every path.
//!
//! Nothing about the wait can fail the request. Only the write itself can.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::UsecaseConfig;
use crate::dal::{ResourceChange, ResourceRepository, SaveOutcome};
use crate::database::universal_types::UniversalUuid;
use crate::error::{PubSubError, UsecaseError};
use crate::eventing::{Event, EventManager};
use crate::metrics::{self, wait_outcome};
use crate::models::{EventOperation, ReporterResourceKey, ResourceSnapshot};
use crate::pubsub::{ListenManager, Subscription};
use crate::resilience::{BreakerError, CircuitBreaker, CircuitState};

const REPORT_LABEL: &str = "report_resource";
const DELETE_LABEL: &str = "delete_resource";

/// Name of the breaker guarding consistency waits.
pub const CONSISTENCY_BREAKER: &str = "read_after_write";

/// How soon the caller needs to observe the effects of its write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteVisibility {
    #[default]
    Unspecified,
    MinimizeLatency,
    Immediate,
}

impl FromStr for WriteVisibility {
    type Err = UsecaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "unspecified" | "write_visibility_unspecified" => Ok(WriteVisibility::Unspecified),
            "minimize_latency" => Ok(WriteVisibility::MinimizeLatency),
            "immediate" => Ok(WriteVisibility::Immediate),
            other => Err(UsecaseError::InvalidRequest(format!(
                "unknown write visibility '{}'",
                other
            ))),
        }
    }
}

/// A reporter's create-or-update request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportResource {
    pub local_resource_id: String,
    pub reporter_type: String,
    pub resource_type: String,
    pub reporter_instance_id: String,
    pub api_href: String,
    pub console_href: Option<String>,
    pub reporter_data: serde_json::Value,
    /// Must carry a string `workspace_id`.
    pub common_data: serde_json::Value,
    /// Caller-supplied idempotency key.
    pub transaction_id: Option<String>,
    pub write_visibility: WriteVisibility,
}

impl ReportResource {
    pub fn key(&self) -> ReporterResourceKey {
        ReporterResourceKey::new(
            &self.local_resource_id,
            &self.reporter_type,
            &self.resource_type,
            &self.reporter_instance_id,
        )
    }

    fn into_change(self) -> Result<ResourceChange, UsecaseError> {
        let key = self.key();
        if let Some(field) = key.missing_field() {
            return Err(UsecaseError::InvalidRequest(format!("{} is required", field)));
        }
        if self.api_href.is_empty() {
            return Err(UsecaseError::InvalidRequest("api_href is required".to_string()));
        }
        let workspace_id = self
            .common_data
            .get("workspace_id")
            .and_then(|v| v.as_str())
            .filter(|ws| !ws.is_empty())
            .ok_or_else(|| {
                UsecaseError::InvalidRequest("common_data.workspace_id is required".to_string())
            })?
            .to_string();

        Ok(ResourceChange {
            key,
            api_href: self.api_href,
            console_href: self.console_href,
            workspace_id,
            data: self.reporter_data,
            transaction_id: self.transaction_id,
        })
    }
}

/// What happened to the consistency wait of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyOutcome {
    /// The caller did not ask for, or is not eligible for, a wait.
    NotRequested,
    /// The consumer confirmed the write.
    Confirmed,
    /// The wait timed out or was cancelled.
    Unconfirmed,
    /// The breaker rejected the wait.
    BreakerOpen,
    /// The request replayed an already-applied transaction; nothing to wait for.
    AlreadyApplied,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOutcome {
    pub snapshot: ResourceSnapshot,
    pub operation: EventOperation,
    pub consistency: ConsistencyOutcome,
}

/// Entry point for resource writes.
pub struct ResourceUsecase {
    repository: ResourceRepository,
    config: UsecaseConfig,
    listen_manager: Option<ListenManager>,
    breaker: Arc<CircuitBreaker>,
    event_manager: Option<Arc<dyn EventManager>>,
}

impl std::fmt::Debug for ResourceUsecase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceUsecase")
            .field("config", &self.config)
            .field("listen_manager", &self.listen_manager)
            .field("breaker", &self.breaker.state())
            .field("event_manager", &self.event_manager.is_some())
            .finish()
    }
}

impl ResourceUsecase {
    pub fn new(repository: ResourceRepository, config: UsecaseConfig) -> Self {
        Self {
            repository,
            config,
            listen_manager: None,
            breaker: Arc::new(CircuitBreaker::new(CONSISTENCY_BREAKER)),
            event_manager: None,
        }
    }

    pub fn with_listen_manager(mut self, listen_manager: ListenManager) -> Self {
        self.listen_manager = Some(listen_manager);
        self
    }

    /// Shares `breaker` with other usecase instances in the process.
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_event_manager(mut self, event_manager: Arc<dyn EventManager>) -> Self {
        self.event_manager = Some(event_manager);
        self
    }

    pub fn config(&self) -> &UsecaseConfig {
        &self.config
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn listen_manager(&self) -> Option<&ListenManager> {
        self.listen_manager.as_ref()
    }

    /// Whether a write with `visibility` from `principal` should wait for
    /// consumer confirmation.
    pub fn compute_read_after_write(&self, visibility: WriteVisibility, principal: &str) -> bool {
        if visibility != WriteVisibility::Immediate {
            return false;
        }
        self.listen_manager.is_some()
            && self.config.read_after_write_enabled()
            && self.config.consumer_enabled()
            && self.config.is_allowlisted(principal)
    }

    /// Creates or updates a resource.
    ///
    /// Returns an error only when the write fails; the outcome of the
    /// consistency wait is reported in [`ReportOutcome::consistency`].
    pub async fn report_resource(
        &self,
        request: ReportResource,
        principal: &str,
        cancel: &CancellationToken,
    ) -> Result<ReportOutcome, UsecaseError> {
        let read_after_write = self.compute_read_after_write(request.write_visibility, principal);
        let change = request.into_change()?;
        let txid = UniversalUuid::new_v7().to_string();

        let mut subscription = match &self.listen_manager {
            Some(manager) if read_after_write && self.breaker.state() != CircuitState::Open => {
                Some(manager.subscribe(&txid))
            }
            _ => None,
        };

        let saved = {
            let change = change.clone();
            let txid = txid.clone();
            self.repository
                .transaction_manager()
                .run_with_retry(REPORT_LABEL, move |conn| {
                    ResourceRepository::report(conn, &change, &txid)
                })
                .await?
        };
        self.after_commit(principal, &saved, &change.data).await;

        let consistency = match (read_after_write, saved.applied(), subscription.as_mut()) {
            (false, _, _) => ConsistencyOutcome::NotRequested,
            (true, false, _) => {
                debug!(%txid, "Write already applied, skipping consistency wait");
                metrics::record_consistency_wait(wait_outcome::SKIPPED);
                ConsistencyOutcome::AlreadyApplied
            }
            (true, true, None) => {
                debug!(%txid, "Circuit breaker open, skipping consistency wait");
                metrics::record_consistency_wait(wait_outcome::BREAKER_OPEN);
                ConsistencyOutcome::BreakerOpen
            }
            (true, true, Some(subscription)) => {
                self.wait_for_consistency(subscription, cancel).await
            }
        };

        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }

        info!(
            %txid,
            resource_id = %saved.snapshot.resource.id,
            operation = %saved.operation.as_str(),
            ?consistency,
            "Reported resource"
        );

        Ok(ReportOutcome {
            snapshot: saved.snapshot,
            operation: saved.operation,
            consistency,
        })
    }

    /// Marks a resource deleted. Deletes never wait for consistency.
    pub async fn delete_resource(
        &self,
        key: &ReporterResourceKey,
        principal: &str,
    ) -> Result<ResourceSnapshot, UsecaseError> {
        if let Some(field) = key.missing_field() {
            return Err(UsecaseError::InvalidRequest(format!("{} is required", field)));
        }
        let txid = UniversalUuid::new_v7().to_string();

        let saved = {
            let key = key.clone();
            let txid = txid.clone();
            self.repository
                .transaction_manager()
                .run_with_retry(DELETE_LABEL, move |conn| {
                    ResourceRepository::tombstone(conn, &key, &txid)
                })
                .await?
                .ok_or(UsecaseError::NotFound)?
        };
        self.after_commit(principal, &saved, &serde_json::json!({}))
            .await;

        info!(%txid, resource_id = %saved.snapshot.resource.id, "Deleted resource");
        Ok(saved.snapshot)
    }

    async fn wait_for_consistency(
        &self,
        subscription: &mut Subscription,
        cancel: &CancellationToken,
    ) -> ConsistencyOutcome {
        let timeout = self.config.wait_timeout();
        let txid = subscription.txid().to_string();

        match self
            .breaker
            .execute(subscription.block_for_notification(cancel, timeout))
            .await
        {
            Ok(()) => {
                debug!(%txid, "Write confirmed by consumer");
                metrics::record_consistency_wait(wait_outcome::NOTIFIED);
                ConsistencyOutcome::Confirmed
            }
            Err(err) if err.is_rejected() => {
                debug!(%txid, "Consistency wait rejected: {}", err);
                metrics::record_consistency_wait(wait_outcome::BREAKER_OPEN);
                ConsistencyOutcome::BreakerOpen
            }
            Err(BreakerError::Inner(PubSubError::WaitCancelled)) => {
                metrics::record_consistency_wait(wait_outcome::TIMEOUT);
                ConsistencyOutcome::Unconfirmed
            }
            Err(err) => {
                warn!(%txid, "Consistency wait failed: {}", err);
                metrics::record_consistency_wait(wait_outcome::TIMEOUT);
                ConsistencyOutcome::Unconfirmed
            }
        }
    }

    /// Records outbox metrics and publishes the legacy event for a
    /// committed write. Publish failures are logged only.
    async fn after_commit(&self, principal: &str, saved: &SaveOutcome, data: &serde_json::Value) {
        for aggregate in &saved.outbox_events {
            metrics::record_outbox_write(aggregate.as_str());
        }
        if !saved.applied() {
            return;
        }
        let Some(event_manager) = &self.event_manager else {
            return;
        };

        let resource = &saved.snapshot.resource;
        let event = Event::resource(saved.operation, &saved.snapshot, data);
        let published = match event_manager.lookup(
            principal,
            &resource.resource_type,
            &resource.id.to_string(),
        ) {
            Ok(producer) => producer.produce(&event).await,
            Err(e) => Err(e),
        };
        if let Err(e) = published {
            warn!(resource_id = %resource.id, "Failed to publish resource event: {}", e);
        }
    }
}
