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

//! Legacy resource events.
//!
//! After a write commits, the usecase can publish a CloudEvents-shaped
//! [`Event`] through an [`EventManager`]. Publishing is best effort and
//! independent of the outbox.

pub mod api;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod stdout;

pub use api::{Event, EventManager, Producer};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaEventManager, KafkaEventingOptions};
pub use stdout::StdoutEventManager;
