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

//! Implementation of the `notify` command.
//!
//! Sends the same notification the consumer sends after replicating an
//! event. Useful for releasing a request stuck waiting on a lost message.

use anyhow::{bail, Context, Result};
use resource_inventory::database::BackendType;
use tracing::info;

pub async fn run(database_url: &str, txid: &str) -> Result<()> {
    if txid.trim().is_empty() {
        bail!("Transaction id cannot be empty");
    }

    let backend = BackendType::from_url(database_url).context("Invalid database URL")?;
    match backend {
        #[cfg(feature = "postgres")]
        BackendType::Postgres => {
            use resource_inventory::pubsub::{Notifier, PgNotifier};

            PgNotifier::new(database_url)
                .notify(txid)
                .await
                .context("Failed to send notification")?;
            info!(%txid, "Notification sent");
            Ok(())
        }
        other => bail!(
            "Notifications require PostgreSQL; '{}' has no LISTEN/NOTIFY support",
            other.as_str()
        ),
    }
}
