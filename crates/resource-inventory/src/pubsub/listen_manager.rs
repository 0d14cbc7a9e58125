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

//! Notification fan-out to per-transaction subscriptions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::driver::Driver;
use super::subscription::Subscription;
use crate::error::PubSubError;

/// Buffered notifications per subscription.
pub const SUBSCRIPTION_BUFFER: usize = 2;

/// Upper bound on a single wait for a notification.
pub const LISTEN_TIMEOUT: Duration = Duration::from_secs(30);

pub const RECONNECT_BACKOFF_STEP: Duration = Duration::from_millis(300);

pub const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

struct Entry {
    id: u64,
    sender: mpsc::Sender<Vec<u8>>,
}

struct Inner {
    driver: Arc<dyn Driver>,
    subscriptions: RwLock<HashMap<String, Entry>>,
    next_id: AtomicU64,
    listen_timeout: Duration,
}

/// Owns the subscription registry and the loop that feeds it.
///
/// Cheap to clone; clones share the registry and the driver.
#[derive(Clone)]
pub struct ListenManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ListenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenManager")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl ListenManager {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self::with_listen_timeout(driver, LISTEN_TIMEOUT)
    }

    pub fn with_listen_timeout(driver: Arc<dyn Driver>, listen_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                subscriptions: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                listen_timeout,
            }),
        }
    }

    /// Registers interest in `txid`.
    ///
    /// Must be called before the write tagged with `txid` commits, otherwise
    /// the notification can arrive before anyone is listening for it. A
    /// second subscription for the same id replaces the first.
    pub fn subscribe(&self, txid: &str) -> Subscription {
        let (sender, receiver) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .subscriptions
            .write()
            .insert(txid.to_string(), Entry { id, sender });

        Subscription::new(txid.to_string(), id, receiver, self.clone())
    }

    /// Removes the registry entry for `txid` if it still belongs to
    /// subscription `id`.
    pub(crate) fn unsubscribe(&self, txid: &str, id: u64) {
        let mut subscriptions = self.inner.subscriptions.write();
        if subscriptions.get(txid).is_some_and(|entry| entry.id == id) {
            subscriptions.remove(txid);
            debug!(txid, "Removed subscription");
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Waits for one notification and offers it to every subscription.
    ///
    /// A wait that times out is a normal, silent iteration. Returns
    /// [`PubSubError::Cancelled`] once `cancel` fires.
    pub async fn wait_and_distribute(&self, cancel: &CancellationToken) -> Result<(), PubSubError> {
        let notification = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PubSubError::Cancelled),
            waited = tokio::time::timeout(
                self.inner.listen_timeout,
                self.inner.driver.wait_for_notification(),
            ) => match waited {
                Err(_) => return Ok(()),
                Ok(result) => result?,
            },
        };

        let subscriptions = self.inner.subscriptions.read();
        for (txid, entry) in subscriptions.iter() {
            match entry.sender.try_send(notification.payload.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    error!(
                        subscription = %txid,
                        payload = %String::from_utf8_lossy(&notification.payload),
                        "dropped notification due to full buffer"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }

        Ok(())
    }

    /// Connects the driver, starts listening and distributes notifications
    /// until `cancel` fires.
    ///
    /// Driver failures do not end the loop. Each one is followed by a
    /// backoff of [`RECONNECT_BACKOFF_STEP`] per consecutive failure, capped
    /// at [`MAX_RECONNECT_BACKOFF`], after which the driver is reconnected and
    /// LISTEN is issued again.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), PubSubError> {
        let mut listening = false;
        let mut failures: u32 = 0;

        while !cancel.is_cancelled() {
            let step = if listening {
                self.wait_and_distribute(&cancel).await
            } else {
                self.start_listening().await
            };

            match step {
                Ok(()) => {
                    if !listening {
                        info!("Listen manager started");
                        listening = true;
                    }
                    failures = 0;
                }
                Err(PubSubError::Cancelled) => break,
                Err(e) => {
                    listening = false;
                    failures = failures.saturating_add(1);
                    let delay = reconnect_backoff(failures);
                    warn!(
                        attempt = failures,
                        ?delay,
                        "Notification driver failed, reconnecting: {}",
                        e
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if let Err(e) = self.inner.driver.close().await {
            debug!("Error closing notification driver: {}", e);
        }
        info!("Listen manager stopped");
        Ok(())
    }

    async fn start_listening(&self) -> Result<(), PubSubError> {
        self.inner.driver.connect().await?;
        self.inner.driver.listen().await
    }
}

/// Delay after the `failures`-th consecutive driver failure.
fn reconnect_backoff(failures: u32) -> Duration {
    RECONNECT_BACKOFF_STEP
        .saturating_mul(failures)
        .min(MAX_RECONNECT_BACKOFF)
}
