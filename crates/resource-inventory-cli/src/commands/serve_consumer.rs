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

//! Implementation of the `serve-consumer` command.
//!
//! Runs the notification listener and the outbox consumer side by side.
//! A consumer loop that stops on an error is rebuilt, up to the configured
//! number of restarts.
//!
//! This binary builds no request layer, so nothing here subscribes to the
//! listener. It keeps a LISTEN session open on the notification channel for
//! a request layer embedded in the same process, which shares it by cloning
//! the [`ListenManager`](resource_inventory::pubsub::ListenManager). Every
//! delivered notification is logged at debug level by the driver, which
//! also makes this the quickest end-to-end check that the consumer's
//! notifications reach PostgreSQL.

use anyhow::Result;
use resource_inventory::InventoryConfig;

#[cfg(all(feature = "kafka", feature = "postgres"))]
pub async fn run(database_url: &str, config: &InventoryConfig) -> Result<()> {
    use std::sync::Arc;

    use anyhow::Context;
    use resource_inventory::consumer::{
        AllowAllAuthorizer, InventoryConsumer, KafkaEventConsumer, OffsetCoordinator,
    };
    use resource_inventory::pubsub::{ListenManager, Notifier, PgDriver, PgNotifier};
    use resource_inventory::{metrics, ResourceRepository};
    use tokio_util::sync::CancellationToken;
    use tracing::{error, info, warn};

    let consumer_config = config.consumer_config()?;
    if !consumer_config.enabled() {
        info!("Consumer is disabled in configuration; nothing to do");
        return Ok(());
    }

    metrics::register_metrics();

    let dal = super::open_dal(database_url, config)?;
    let repository = ResourceRepository::new(
        dal.transaction_manager(config.consistency.max_serialization_retries),
    );
    let notifier: Arc<dyn Notifier> = Arc::new(PgNotifier::new(database_url));
    let listen_manager = ListenManager::with_listen_timeout(
        Arc::new(PgDriver::new(database_url)),
        config.listen_timeout(),
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl-C, shutting down");
                cancel.cancel();
            }
        });
    }

    let listener = {
        let listen_manager = listen_manager.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { listen_manager.run(cancel).await })
    };

    let max_restarts = consumer_config.consumer_max_retries();
    let mut restarts: i64 = 0;
    let outcome = loop {
        let coordinator = Arc::new(OffsetCoordinator::new(
            consumer_config.group_id(),
            consumer_config.commit_modulo(),
        ));
        let client = Arc::new(
            KafkaEventConsumer::new(&consumer_config, coordinator.clone())
                .context("Failed to create kafka consumer")?,
        );
        let consumer = InventoryConsumer::new(
            client,
            consumer_config.clone(),
            coordinator,
            repository.clone(),
            Arc::new(AllowAllAuthorizer),
        )
        .with_notifier(notifier.clone());

        let result = consumer.consume(cancel.clone()).await;
        if cancel.is_cancelled() {
            break Ok(());
        }
        match result {
            Ok(()) => warn!("Consumer loop exited"),
            Err(e) => error!("Consumer loop failed: {}", e),
        }

        restarts += 1;
        if max_restarts >= 0 && restarts > max_restarts {
            break Err(anyhow::anyhow!(
                "consumer stopped after {} restart(s)",
                max_restarts
            ));
        }
        let delay = consumer_config
            .retry()
            .backoff(u32::try_from(restarts).unwrap_or(u32::MAX));
        info!(restarts, ?delay, "Restarting consumer");
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    };

    cancel.cancel();
    match listener.await {
        Ok(Err(e)) => warn!("Listen manager stopped with error: {}", e),
        Err(e) => warn!("Listen manager task failed: {}", e),
        Ok(Ok(())) => {}
    }
    info!(
        pending_subscriptions = listen_manager.subscription_count(),
        "Consumer stopped"
    );
    outcome
}

#[cfg(not(all(feature = "kafka", feature = "postgres")))]
pub async fn run(_database_url: &str, _config: &InventoryConfig) -> Result<()> {
    anyhow::bail!("serve-consumer requires the `kafka` and `postgres` features")
}
