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

//! In-process notification driver.
//!
//! SQLite has no LISTEN/NOTIFY, so a single-process deployment (and the test
//! suite) wires the consumer's notifier and the listen manager to the same
//! `LocalDriver`. Clones share one queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::driver::{Driver, Notification};
use super::notifier::Notifier;
use super::NOTIFICATION_CHANNEL;
use crate::error::PubSubError;

#[derive(Clone, Debug)]
pub struct LocalDriver {
    sender: mpsc::UnboundedSender<Notification>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Notification>>>,
    connected: Arc<AtomicBool>,
}

impl LocalDriver {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    fn ensure_connected(&self) -> Result<(), PubSubError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PubSubError::NotConnected)
        }
    }
}

impl Default for LocalDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for LocalDriver {
    async fn connect(&self) -> Result<(), PubSubError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), PubSubError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn listen(&self) -> Result<(), PubSubError> {
        self.ensure_connected()
    }

    async fn ping(&self) -> Result<(), PubSubError> {
        self.ensure_connected()
    }

    async fn wait_for_notification(&self) -> Result<Notification, PubSubError> {
        self.ensure_connected()?;
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.ok_or(PubSubError::ChannelClosed)
    }

    async fn notify(&self, payload: &str) -> Result<(), PubSubError> {
        self.ensure_connected()?;
        debug!(payload, "Local notify");
        self.sender
            .send(Notification::new(NOTIFICATION_CHANNEL, payload.as_bytes()))
            .map_err(|_| PubSubError::ChannelClosed)
    }
}

#[async_trait]
impl Notifier for LocalDriver {
    async fn notify(&self, payload: &str) -> Result<(), PubSubError> {
        Driver::notify(self, payload).await
    }
}
