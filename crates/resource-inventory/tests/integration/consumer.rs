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

//! The consumer replaying real outbox rows.

use std::sync::Arc;
use std::time::Duration;

use resource_inventory::consumer::{
    ConsumerConfig, InventoryConsumer, OffsetCoordinator, RebalanceHandler,
};
use resource_inventory::pubsub::{ListenManager, LocalDriver};
use resource_inventory::usecase::{ReportResource, ResourceUsecase, UsecaseConfig, WriteVisibility};
use serde_json::json;
use serial_test::serial;
use tokio_util::sync::CancellationToken;

use crate::fixtures::get_or_init_fixture;
use crate::relay::{OutboxRelay, TokenIssuingAuthorizer, TOPIC};

fn request(local_resource_id: &str, workspace_id: &str) -> ReportResource {
    ReportResource {
        local_resource_id: local_resource_id.to_string(),
        reporter_type: "hbi".to_string(),
        resource_type: "host".to_string(),
        reporter_instance_id: "instance-1".to_string(),
        api_href: format!("https://api/hosts/{}", local_resource_id),
        console_href: None,
        reporter_data: json!({}),
        common_data: json!({"workspace_id": workspace_id}),
        transaction_id: None,
        write_visibility: WriteVisibility::MinimizeLatency,
    }
}

async fn wait_for_pending(coordinator: &OffsetCoordinator, expected: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while coordinator.pending_count() < expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("consumer did not process the messages in time");
}

#[tokio::test]
#[serial]
async fn test_offsets_are_committed_on_shutdown() {
    let fixture = get_or_init_fixture().await;
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;

    let usecase = ResourceUsecase::new(guard.get_repository(), UsecaseConfig::default());
    let cancel = CancellationToken::new();
    for id in ["host-1", "host-2", "host-3"] {
        usecase
            .report_resource(request(id, "ws-1"), "SP1", &cancel)
            .await
            .expect("write failed");
    }

    let config = ConsumerConfig::builder()
        .bootstrap_servers(vec!["unused:9092".to_string()])
        .commit_modulo(10)
        .build()
        .unwrap();
    let coordinator = Arc::new(OffsetCoordinator::new(config.group_id(), config.commit_modulo()));
    coordinator.on_assigned(&[0]);
    let relay = Arc::new(OutboxRelay::new(guard.get_dal()));
    let consumer = InventoryConsumer::new(
        relay.clone(),
        config,
        coordinator.clone(),
        guard.get_repository(),
        Arc::new(TokenIssuingAuthorizer::default()),
    );

    let consumer_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { consumer.consume(cancel).await }
    });

    // Offset 0 hits the commit modulo straight away; 1 and 2 stay buffered.
    wait_for_pending(&coordinator, 2).await;
    let commits = relay.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0][0].offset, 1);

    cancel.cancel();
    consumer_task.await.unwrap().unwrap();

    let commits = relay.commits();
    assert_eq!(commits.len(), 2);
    let last = commits[1].iter().map(|tpo| tpo.offset).max();
    assert_eq!(last, Some(3));
    assert!(commits[1].iter().all(|tpo| tpo.topic == TOPIC));
    assert_eq!(coordinator.pending_count(), 0);
}

#[tokio::test]
#[serial]
async fn test_workspace_move_and_delete_are_replicated() {
    let fixture = get_or_init_fixture().await;
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;

    let driver = LocalDriver::new();
    let manager =
        ListenManager::with_listen_timeout(Arc::new(driver.clone()), Duration::from_millis(50));
    let usecase = ResourceUsecase::new(guard.get_repository(), UsecaseConfig::default())
        .with_listen_manager(manager);
    let cancel = CancellationToken::new();

    usecase
        .report_resource(request("host-1", "ws-1"), "SP1", &cancel)
        .await
        .unwrap();
    usecase
        .report_resource(request("host-1", "ws-2"), "SP1", &cancel)
        .await
        .unwrap();
    let key = request("host-1", "ws-2").key();
    usecase.delete_resource(&key, "SP1").await.unwrap();

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
        coordinator.clone(),
        guard.get_repository(),
        authorizer.clone(),
    )
    .with_notifier(Arc::new(driver));

    let consumer_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { consumer.consume(cancel).await }
    });
    // Offset 0 is committed immediately, leaving the update and the delete.
    wait_for_pending(&coordinator, 2).await;
    cancel.cancel();
    consumer_task.await.unwrap().unwrap();

    assert_eq!(relay.delivered_count(), 3);
    assert!(authorizer.written().is_empty());
    assert_eq!(coordinator.lock_id().as_deref(), Some("inventory-consumer/0"));
    assert_eq!(
        coordinator.lock_token().as_deref(),
        Some("inventory-consumer/0-lock")
    );
}
