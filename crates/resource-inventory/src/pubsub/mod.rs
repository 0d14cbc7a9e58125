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

//! Completion notifications over database LISTEN/NOTIFY.
//!
//! The consumer calls a [`Notifier`] with a write's transaction id once the
//! change is applied downstream. A single [`ListenManager`] loop receives
//! those notifications on a dedicated connection and fans each one out to
//! every registered [`Subscription`]; a subscription only unblocks on a
//! payload equal to its own transaction id.
//!
//! ```rust,ignore
//! let manager = ListenManager::new(Arc::new(PgDriver::new(url)));
//! tokio::spawn({
//!     let manager = manager.clone();
//!     let cancel = cancel.clone();
//!     async move { manager.run(cancel).await }
//! });
//!
//! let mut subscription = manager.subscribe(&txid);
//! // ... commit the write tagged with txid ...
//! subscription.block_for_notification(&cancel, Duration::from_secs(10)).await?;
//! ```

pub mod driver;
pub mod listen_manager;
pub mod local;
pub mod notifier;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod subscription;

pub use driver::{Driver, Notification};
pub use listen_manager::ListenManager;
pub use local::LocalDriver;
pub use notifier::Notifier;
#[cfg(feature = "postgres")]
pub use postgres::{PgDriver, PgNotifier};
pub use subscription::Subscription;

/// Channel the consumer notifies on and the listen manager listens to.
pub const NOTIFICATION_CHANNEL: &str = "consumer_notifications";
