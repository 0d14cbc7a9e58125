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

//! Concurrent writers against one resource.

use std::sync::Arc;

use futures::future::join_all;
use resource_inventory::models::{AggregateType, EventOperation};
use resource_inventory::usecase::{ReportResource, ResourceUsecase, UsecaseConfig, WriteVisibility};
use serde_json::json;
use serial_test::serial;
use tokio_util::sync::CancellationToken;

use crate::fixtures::get_or_init_fixture;

fn request(revision: usize) -> ReportResource {
    ReportResource {
        local_resource_id: "shared-host".to_string(),
        reporter_type: "hbi".to_string(),
        resource_type: "host".to_string(),
        reporter_instance_id: "instance-1".to_string(),
        api_href: "https://api/hosts/shared".to_string(),
        console_href: None,
        reporter_data: json!({"revision": revision}),
        common_data: json!({"workspace_id": "ws-1"}),
        transaction_id: None,
        write_visibility: WriteVisibility::Unspecified,
    }
}

#[tokio::test]
#[serial]
async fn test_concurrent_updates_all_commit_once() {
    let fixture = get_or_init_fixture().await;
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;
    tracing::info!(backend = guard.get_current_backend(), "concurrent update test");

    let usecase = Arc::new(ResourceUsecase::new(
        guard.get_repository(),
        UsecaseConfig::default(),
    ));
    let cancel = CancellationToken::new();

    usecase
        .report_resource(request(0), "SP1", &cancel)
        .await
        .expect("initial write failed");

    const WRITERS: usize = 8;
    let writes = (1..=WRITERS).map(|revision| {
        let usecase = usecase.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            usecase
                .report_resource(request(revision), "SP1", &cancel)
                .await
        })
    });
    for result in join_all(writes).await {
        let outcome = result.unwrap().expect("concurrent write failed");
        assert_eq!(outcome.operation, EventOperation::Updated);
    }

    let snapshot = guard
        .get_repository()
        .find_resource(&request(0).key())
        .await
        .unwrap()
        .expect("resource missing");
    assert_eq!(
        snapshot.reporter_resource.representation_version,
        WRITERS as i64
    );

    // Retried attempts leave nothing behind: one pair of events per write.
    let outbox = guard.get_dal().outbox().list(100).await.unwrap();
    assert_eq!(outbox.len(), 2 * (WRITERS + 1));
    let tuple_txids: std::collections::HashSet<_> = outbox
        .iter()
        .filter(|event| event.aggregate_type == AggregateType::Tuples)
        .map(|event| event.txid.clone())
        .collect();
    assert_eq!(tuple_txids.len(), WRITERS + 1);
}

#[tokio::test]
#[serial]
async fn test_replayed_transaction_id_is_a_no_op() {
    let fixture = get_or_init_fixture().await;
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    guard.reset_database().await;

    let usecase = ResourceUsecase::new(guard.get_repository(), UsecaseConfig::default());
    let cancel = CancellationToken::new();
    let mut replayed = request(1);
    replayed.transaction_id = Some("client-tx-1".to_string());

    let first = usecase
        .report_resource(replayed.clone(), "SP1", &cancel)
        .await
        .unwrap();
    let second = usecase
        .report_resource(replayed, "SP1", &cancel)
        .await
        .unwrap();

    assert_eq!(first.snapshot.resource.id, second.snapshot.resource.id);
    assert_eq!(
        second.snapshot.reporter_resource.representation_version,
        first.snapshot.reporter_resource.representation_version
    );
    assert_eq!(guard.get_dal().outbox().list(100).await.unwrap().len(), 2);
}
