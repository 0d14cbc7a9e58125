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

//! Completion notifier used by the consumer.

use async_trait::async_trait;

use crate::error::PubSubError;

/// Signals that the change tagged with a transaction id has been applied
/// downstream.
///
/// Delivery is at most once. Waiters bound their wait with a timeout, so a
/// lost notification only weakens the visibility guarantee of one request.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &str) -> Result<(), PubSubError>;
}
