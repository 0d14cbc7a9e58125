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

//! Notification transport abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PubSubError;

/// A notification received on a channel. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: String,
    pub payload: Vec<u8>,
}

impl Notification {
    pub fn new(channel: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// A connection that can LISTEN for and NOTIFY on the notification channel.
///
/// A driver used for listening must not be shared with a notifier; the
/// listening connection issues no other commands.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Establishes the connection. Connecting an open driver is a no-op.
    async fn connect(&self) -> Result<(), PubSubError>;

    /// Closes the connection. Closing a closed driver is a no-op.
    async fn close(&self) -> Result<(), PubSubError>;

    /// Starts listening on the notification channel.
    async fn listen(&self) -> Result<(), PubSubError>;

    async fn ping(&self) -> Result<(), PubSubError>;

    /// Waits for the next notification.
    ///
    /// Must be cancel safe: dropping the future before it completes loses
    /// no notification.
    async fn wait_for_notification(&self) -> Result<Notification, PubSubError>;

    /// Sends `payload` on the notification channel.
    async fn notify(&self, payload: &str) -> Result<(), PubSubError>;
}
