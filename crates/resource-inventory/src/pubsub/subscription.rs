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

//! A single waiter's handle on the listen manager.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::listen_manager::ListenManager;
use crate::error::PubSubError;

/// Interest in the notification for one transaction id.
///
/// The registry entry is released exactly once, either by an explicit
/// [`Subscription::unsubscribe`] or when the handle is dropped.
pub struct Subscription {
    txid: String,
    id: u64,
    receiver: mpsc::Receiver<Vec<u8>>,
    manager: ListenManager,
    unsubscribed: AtomicBool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("txid", &self.txid)
            .field("unsubscribed", &self.unsubscribed.load(Ordering::SeqCst))
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(
        txid: String,
        id: u64,
        receiver: mpsc::Receiver<Vec<u8>>,
        manager: ListenManager,
    ) -> Self {
        Self {
            txid,
            id,
            receiver,
            manager,
            unsubscribed: AtomicBool::new(false),
        }
    }

    pub fn txid(&self) -> &str {
        &self.txid
    }

    /// Blocks until a notification equal to this subscription's transaction
    /// id arrives.
    ///
    /// Other payloads are discarded. Returns [`PubSubError::WaitCancelled`]
    /// when `cancel` fires or `timeout` elapses first; an already-cancelled
    /// token returns immediately.
    pub async fn block_for_notification(
        &mut self,
        cancel: &CancellationToken,
        timeout: Duration,
    ) -> Result<(), PubSubError> {
        debug!(txid = %self.txid, "Blocking for notification");
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = &mut deadline => break,
                received = self.receiver.recv() => match received {
                    Some(payload) if payload == self.txid.as_bytes() => return Ok(()),
                    Some(_) => continue,
                    None => return Err(PubSubError::ChannelClosed),
                },
            }
        }

        error!(txid = %self.txid, "{}", PubSubError::WaitCancelled);
        Err(PubSubError::WaitCancelled)
    }

    /// Releases the registry entry. Only the first call has an effect.
    pub fn unsubscribe(&self) {
        if self
            .unsubscribed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.manager.unsubscribe(&self.txid, self.id);
        }
    }

    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Result<Vec<u8>, mpsc::error::TryRecvError> {
        self.receiver.try_recv()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubsub::{Driver, LocalDriver};
    use std::sync::Arc;

    fn manager() -> (LocalDriver, ListenManager) {
        let driver = LocalDriver::new();
        let manager = ListenManager::new(Arc::new(driver.clone()));
        (driver, manager)
    }

    #[tokio::test]
    async fn test_matching_payload_unblocks() {
        let (driver, manager) = manager();
        let cancel = CancellationToken::new();
        let mut subscription = manager.subscribe("tx-1");

        driver.notify("tx-1").await.unwrap();
        manager.wait_and_distribute(&cancel).await.unwrap();

        let result = subscription
            .block_for_notification(&cancel, Duration::from_secs(1))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_other_payload_does_not_unblock() {
        let (driver, manager) = manager();
        let cancel = CancellationToken::new();
        let mut subscription = manager.subscribe("tx-1");

        driver.notify("tx-2").await.unwrap();
        manager.wait_and_distribute(&cancel).await.unwrap();

        let result = subscription
            .block_for_notification(&cancel, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(PubSubError::WaitCancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_token_returns_immediately() {
        let (_driver, manager) = manager();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut subscription = manager.subscribe("tx-1");

        let started = std::time::Instant::now();
        let result = subscription
            .block_for_notification(&cancel, Duration::from_secs(30))
            .await;
        assert!(matches!(result, Err(PubSubError::WaitCancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let (_driver, manager) = manager();
        let subscription = Arc::new(manager.subscribe("tx-1"));
        let _other = manager.subscribe("tx-2");
        assert_eq!(manager.subscription_count(), 2);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let subscription = Arc::clone(&subscription);
                tokio::spawn(async move { subscription.unsubscribe() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        subscription.unsubscribe();

        assert_eq!(manager.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_entry() {
        let (_driver, manager) = manager();
        {
            let _subscription = manager.subscribe("tx-1");
            assert_eq!(manager.subscription_count(), 1);
        }
        assert_eq!(manager.subscription_count(), 0);
    }
}
