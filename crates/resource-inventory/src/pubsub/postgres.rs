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

//! PostgreSQL LISTEN/NOTIFY driver.
//!
//! Each driver owns one `tokio-postgres` connection outside the diesel pool.
//! A background task polls the connection and forwards asynchronous messages
//! into a channel, which [`PgDriver::wait_for_notification`] reads from. A
//! closed connection is reopened on the next call, and LISTEN is re-issued if
//! the driver was listening.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_postgres::{AsyncMessage, Client, NoTls};
use tracing::{debug, error, info, warn};

use super::driver::{Driver, Notification};
use super::notifier::Notifier;
use super::NOTIFICATION_CHANNEL;
use crate::error::PubSubError;

struct PgSession {
    client: Client,
    messages: mpsc::UnboundedReceiver<AsyncMessage>,
    connection_task: JoinHandle<()>,
}

impl PgSession {
    async fn open(database_url: &str) -> Result<Self, PubSubError> {
        let (client, mut connection) = tokio_postgres::connect(database_url, NoTls).await?;
        let (tx, messages) = mpsc::unbounded_channel();

        let connection_task = tokio::spawn(async move {
            let stream = futures::stream::poll_fn(move |cx| connection.poll_message(cx));
            futures::pin_mut!(stream);

            while let Some(message) = stream.next().await {
                match message {
                    Ok(msg) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("PostgreSQL notification connection error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            client,
            messages,
            connection_task,
        })
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        self.connection_task.abort();
    }
}

pub struct PgDriver {
    database_url: String,
    session: Mutex<Option<PgSession>>,
    listening: AtomicBool,
}

impl PgDriver {
    /// Creates a driver for `database_url`. No connection is opened until
    /// [`Driver::connect`] or the first call that needs one.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            session: Mutex::new(None),
            listening: AtomicBool::new(false),
        }
    }

    async fn ensure_session<'a>(
        &self,
        session: &'a mut Option<PgSession>,
    ) -> Result<&'a mut PgSession, PubSubError> {
        let needs_connect = session.as_ref().map_or(true, PgSession::is_closed);
        if needs_connect {
            if session.take().is_some() {
                warn!("PostgreSQL notification connection lost, reconnecting");
            }
            let fresh = PgSession::open(&self.database_url).await?;
            if self.listening.load(Ordering::SeqCst) {
                fresh
                    .client
                    .batch_execute(&format!("LISTEN {}", NOTIFICATION_CHANNEL))
                    .await?;
            }
            *session = Some(fresh);
        }
        session.as_mut().ok_or(PubSubError::NotConnected)
    }
}

impl std::fmt::Debug for PgDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgDriver")
            .field("listening", &self.listening.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl Driver for PgDriver {
    async fn connect(&self) -> Result<(), PubSubError> {
        let mut session = self.session.lock().await;
        self.ensure_session(&mut session).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), PubSubError> {
        let mut session = self.session.lock().await;
        if session.take().is_some() {
            debug!("Closed PostgreSQL notification connection");
        }
        self.listening.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn listen(&self) -> Result<(), PubSubError> {
        let mut session = self.session.lock().await;
        let session = session.as_mut().ok_or(PubSubError::NotConnected)?;
        session
            .client
            .batch_execute(&format!("LISTEN {}", NOTIFICATION_CHANNEL))
            .await?;
        self.listening.store(true, Ordering::SeqCst);
        info!(
            "PostgreSQL LISTEN started on channel '{}'",
            NOTIFICATION_CHANNEL
        );
        Ok(())
    }

    async fn ping(&self) -> Result<(), PubSubError> {
        let mut session = self.session.lock().await;
        let session = session.as_mut().ok_or(PubSubError::NotConnected)?;
        session.client.simple_query("SELECT 1").await?;
        Ok(())
    }

    async fn wait_for_notification(&self) -> Result<Notification, PubSubError> {
        let mut guard = self.session.lock().await;
        let session = self.ensure_session(&mut guard).await?;

        loop {
            match session.messages.recv().await {
                Some(AsyncMessage::Notification(n)) => {
                    debug!(channel = n.channel(), payload = n.payload(), "Received NOTIFY");
                    return Ok(Notification::new(n.channel(), n.payload().as_bytes()));
                }
                Some(_) => continue,
                None => {
                    *guard = None;
                    return Err(PubSubError::ChannelClosed);
                }
            }
        }
    }

    async fn notify(&self, payload: &str) -> Result<(), PubSubError> {
        let mut guard = self.session.lock().await;
        let session = self.ensure_session(&mut guard).await?;
        session
            .client
            .execute("SELECT pg_notify($1, $2)", &[&NOTIFICATION_CHANNEL, &payload])
            .await?;
        Ok(())
    }
}

/// Notifier backed by its own PostgreSQL connection.
#[derive(Debug)]
pub struct PgNotifier {
    driver: PgDriver,
}

impl PgNotifier {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            driver: PgDriver::new(database_url),
        }
    }
}

#[async_trait]
impl Notifier for PgNotifier {
    async fn notify(&self, payload: &str) -> Result<(), PubSubError> {
        self.driver.notify(payload).await
    }
}
