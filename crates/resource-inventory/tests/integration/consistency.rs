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

//! Read-after-write from the writer's side: a write that asked for
//! immediate visibility returns only once the consumer has replicated it.

use std::sync::Arc;
use std::time::Duration;

use resource_inventory::consumer::{
    ConsumerConfig, InventoryConsumer, OffsetCoordinator, RebalanceHandler,
};
use resource_inventory::pubsub::{ListenManager, LocalDriver};
use resource_inventory::resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use resource_inventory::usecase::{
    ConsistencyOutcome, ReportResource, ResourceUsecase, UsecaseConfig, WriteVisibility,
    CONSISTENCY_BREAKER,
};
use serde_json::json;
use serial_test::serial;
use tokio_util::sync::CancellationToken;

use crate::fixtures::get_or_init_fixture;
use crate::relay::{OutboxRelay, TokenIssuingAuthorizer};

fn request(local_resource_id: &str) -> ReportResource {
    ReportResource {
        local_resource_id: local_resource_id.to_string(),
        reporter_type: "hbi".to_string(),
        resource_type: "host".to_string(),
        reporter_instance_id: "instance-1".to_string(),
        api_href: format!("https://api/hosts/{}", local_resource_id),
        console_href: None,
        reporter_data: json!({"insights_id": local_resource_id}),
        common_data: json!({"workspace_id": "ws-1"}),
        transaction_id: None,
        write_visibility: WriteVisibility::Immediate,
    }
}

fn read_after_write_config(wait_timeout: Duration) -> UsecaseConfig {
    UsecaseConfig::builder()
        .read_after_write_enabled(true)
        .read_after_write_allowlist(vec!["SP1".to_string()])
        .wait_timeout(wait_timeout)
        .build()
}

#[tokio::test]
#[serial]
async fn test_immediate_write_waits_for_consumer() {
    let fixture = get_or_init_fixture().await;
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;

    let driver = LocalDriver::new();
    let manager =
        ListenManager::with_listen_timeout(Arc::new(driver.clone()), Duration::from_millis(50));
    let usecase = ResourceUsecase::new(
        guard.get_repository(),
        read_after_write_config(Duration::from_secs(10)),
    )
    .with_listen_manager(manager.clone());

    let config = ConsumerConfig::builder()
        .bootstrap_servers(vec!["unused:9092".to_string()])
        .build()
        .unwrap();
    let coordinator = Arc::new(OffsetCoordinator::new(config.group_id(), config.commit_modulo()));
    coordinator.on_assigned(&[0]);
    let relay = Arc::new(OutboxRelay::new(guard.get_dal()));
    let authorizer = Arc::new(TokenIssuingAuthorizer::default());
    let consumer = InventoryConsumer::new(
        relay.clone(),
        config,
        coordinator,
        guard.get_repository(),
        authorizer.clone(),
    )
    .with_notifier(Arc::new(driver.clone()));

    let cancel = CancellationToken::new();
    let listener = tokio::spawn({
        let manager = manager.clone();
        let cancel = cancel.clone();
        async move { manager.run(cancel).await }
    });
    let consumer_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { consumer.consume(cancel).await }
    });

    let outcome = usecase
        .report_resource(request("host-1"), "SP1", &cancel)
        .await
        .expect("write failed");
    assert_eq!(outcome.consistency, ConsistencyOutcome::Confirmed);
    assert_eq!(manager.subscription_count(), 0);

    // The token is stored before the notification is sent.
    let snapshot = guard
        .get_repository()
        .find_resource(&request("host-1").key())
        .await
        .unwrap()
        .expect("resource missing");
    assert_eq!(snapshot.resource.consistency_token.as_deref(), Some("token-1"));

    let written = authorizer.written();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].resource_id, "host-1");
    assert_eq!(written[0].subject_id, "ws-1");

    cancel.cancel();
    consumer_task.await.unwrap().unwrap();
    listener.await.unwrap().unwrap();
    assert!(relay.delivered_count() >= 1);
}

#[tokio::test]
#[serial]
async fn test_missing_consumer_times_out_then_opens_breaker() {
    let fixture = get_or_init_fixture().await;
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;

    let manager = ListenManager::with_listen_timeout(
        Arc::new(LocalDriver::new()),
        Duration::from_millis(50),
    );
    let breaker = Arc::new(CircuitBreaker::with_config(
        CONSISTENCY_BREAKER,
        CircuitBreakerConfig::builder()
            .failure_threshold(2)
            .cooldown(Duration::from_secs(60))
            .build(),
    ));
    let usecase = ResourceUsecase::new(
        guard.get_repository(),
        read_after_write_config(Duration::from_millis(100)),
    )
    .with_listen_manager(manager.clone())
    .with_circuit_breaker(breaker.clone());

    let cancel = CancellationToken::new();
    let listener = tokio::spawn({
        let manager = manager.clone();
        let cancel = cancel.clone();
        async move { manager.run(cancel).await }
    });

    for id in ["host-1", "host-2"] {
        let outcome = usecase
            .report_resource(request(id), "SP1", &cancel)
            .await
            .expect("write failed");
        assert_eq!(outcome.consistency, ConsistencyOutcome::Unconfirmed);
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    // With the breaker open the write still commits but does not wait.
    let outcome = usecase
        .report_resource(request("host-3"), "SP1", &cancel)
        .await
        .expect("write failed");
    assert_eq!(outcome.consistency, ConsistencyOutcome::BreakerOpen);
    assert_eq!(manager.subscription_count(), 0);

    let outbox = guard.get_dal().outbox().list(100).await.unwrap();
    assert_eq!(outbox.len(), 6);

    cancel.cancel();
    listener.await.unwrap().unwrap();
}

#[tokio::test]
#[serial]
async fn test_caller_outside_allowlist_does_not_wait() {
    let fixture = get_or_init_fixture().await;
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;

    let manager = ListenManager::new(Arc::new(LocalDriver::new()));
    let usecase = ResourceUsecase::new(
        guard.get_repository(),
        read_after_write_config(Duration::from_secs(10)),
    )
    .with_listen_manager(manager.clone());

    let cancel = CancellationToken::new();
    let outcome = usecase
        .report_resource(request("host-1"), "SP2", &cancel)
        .await
        .expect("write failed");
    assert_eq!(outcome.consistency, ConsistencyOutcome::NotRequested);
    assert_eq!(manager.subscription_count(), 0);
}
