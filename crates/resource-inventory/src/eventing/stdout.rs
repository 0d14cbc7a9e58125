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

//! Event manager that writes JSON lines to stdout.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use super::api::{Event, EventManager, Producer};
use crate::error::EventingError;

struct StdoutProducer {
    writer: Mutex<Box<dyn Write + Send>>,
    shut_down: AtomicBool,
}

#[async_trait]
impl Producer for StdoutProducer {
    async fn produce(&self, event: &Event) -> Result<(), EventingError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(EventingError::ShutDown);
        }
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut writer = self.writer.lock();
        writer
            .write_all(&line)
            .and_then(|_| writer.flush())
            .map_err(|e| EventingError::Produce(e.to_string()))
    }
}

/// Every caller and resource shares the same stdout producer.
pub struct StdoutEventManager {
    producer: Arc<StdoutProducer>,
}

impl StdoutEventManager {
    pub fn new() -> Self {
        info!("Using eventing: stdout");
        Self::with_writer(Box::new(std::io::stdout()))
    }

    /// Writes to `writer` instead of stdout.
    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            producer: Arc::new(StdoutProducer {
                writer: Mutex::new(writer),
                shut_down: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for StdoutEventManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventManager for StdoutEventManager {
    fn lookup(
        &self,
        _principal: &str,
        _resource_type: &str,
        _resource_id: &str,
    ) -> Result<Arc<dyn Producer>, EventingError> {
        Ok(self.producer.clone())
    }

    async fn shutdown(&self) -> Result<(), EventingError> {
        self.producer.shut_down.store(true, Ordering::Release);
        let mut writer = self.producer.writer.lock();
        writer
            .flush()
            .map_err(|e| EventingError::Produce(e.to_string()))
    }
}
