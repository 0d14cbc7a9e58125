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

//! LISTEN/NOTIFY over a live PostgreSQL server.
//!
//! These tests need `TEST_DATABASE_BACKEND=postgres`; against the default
//! SQLite fixture they return without asserting anything.

use std::sync::Arc;
use std::time::Duration;

use diesel::RunQueryDsl;
use resource_inventory::pubsub::{Driver, ListenManager, Notifier, PgDriver, PgNotifier};
use serial_test::serial;
use tokio_util::sync::CancellationToken;

use crate::fixtures::get_or_init_fixture;

/// Returns the PostgreSQL URL, or `None` when the fixture runs on SQLite.
async fn postgres_url() -> Option<String> {
    let fixture = get_or_init_fixture().await;
    let mut guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
    if guard.get_current_backend() != "postgres" {
        return None;
    }
    guard.initialize().await;
    Some(guard.get_database_url().to_string())
}

/// Connects and issues LISTEN before the manager starts, so nothing sent
/// after this returns can be missed.
async fn listening_manager(
    url: &str,
) -> (ListenManager, CancellationToken, tokio::task::JoinHandle<()>) {
    let driver = Arc::new(PgDriver::new(url));
    driver.connect().await.expect("connect failed");
    driver.listen().await.expect("listen failed");

    let manager = ListenManager::new(driver);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let manager = manager.clone();
        let cancel = cancel.clone();
        async move {
            manager.run(cancel).await.expect("listen manager failed");
        }
    });
    (manager, cancel, handle)
}

#[tokio::test]
#[serial]
async fn test_pg_notifier_releases_only_the_matching_subscription() {
    let Some(url) = postgres_url().await else {
        return;
    };
    let (manager, cancel, handle) = listening_manager(&url).await;
    let mut waiting = manager.subscribe("pg-tx-1");
    let mut other = manager.subscribe("pg-tx-2");
    let notifier = PgNotifier::new(url.as_str());

    notifier.notify("pg-tx-2").await.unwrap();
    other
        .block_for_notification(&cancel, Duration::from_secs(5))
        .await
        .expect("pg-tx-2 was not delivered");

    // pg-tx-1 has seen pg-tx-2 by now and must still be blocked.
    assert!(waiting
        .block_for_notification(&cancel, Duration::from_millis(300))
        .await
        .is_err());

    notifier.notify("pg-tx-1").await.unwrap();
    waiting
        .block_for_notification(&cancel, Duration::from_secs(5))
        .await
        .expect("pg-tx-1 was not delivered");

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_notifier_does_not_wait_on_the_listening_connection() {
    let Some(url) = postgres_url().await else {
        return;
    };
    // The listener parks in a 30 second wait on its own connection.
    let (manager, cancel, handle) = listening_manager(&url).await;
    let mut subscription = manager.subscribe("pg-tx-dedicated");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let notifier = PgNotifier::new(url.as_str());
    tokio::time::timeout(Duration::from_secs(5), notifier.notify("pg-tx-dedicated"))
        .await
        .expect("notify blocked behind the listener")
        .unwrap();
    subscription
        .block_for_notification(&cancel, Duration::from_secs(5))
        .await
        .expect("notification was not delivered");

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_listener_survives_a_terminated_connection() {
    let Some(url) = postgres_url().await else {
        return;
    };
    let (manager, cancel, handle) = listening_manager(&url).await;
    let mut subscription = manager.subscribe("pg-tx-reconnect");

    let database = {
        let fixture = get_or_init_fixture().await;
        let guard = fixture.lock().unwrap_or_else(|e| e.into_inner());
        guard.get_database()
    };
    let conn = database.get_postgres_connection().await.unwrap();
    let terminated = conn
        .interact(|conn| {
            diesel::sql_query(
                "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                 WHERE datname = current_database() AND query LIKE 'LISTEN %' \
                 AND pid <> pg_backend_pid()",
            )
            .execute(conn)
        })
        .await
        .unwrap()
        .unwrap();
    assert!(terminated >= 1);

    // Notifications sent before LISTEN is re-issued are lost, so keep sending.
    let notifier = PgNotifier::new(url.as_str());
    let mut delivered = false;
    for _ in 0..50 {
        notifier.notify("pg-tx-reconnect").await.unwrap();
        if subscription
            .block_for_notification(&cancel, Duration::from_millis(200))
            .await
            .is_ok()
        {
            delivered = true;
            break;
        }
    }
    assert!(delivered, "listener did not recover from the dropped connection");
    assert!(!handle.is_finished());

    cancel.cancel();
    handle.await.unwrap();
}
