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

pub mod cleanup_outbox;
pub mod delete_resources;
pub mod migrate;
pub mod notify;
pub mod serve_consumer;

use anyhow::{Context, Result};
use resource_inventory::{Database, InventoryConfig, DAL};

/// Opens the pool, sized from the configuration.
pub fn open_dal(database_url: &str, config: &InventoryConfig) -> Result<DAL> {
    let database = Database::try_new(database_url, config.storage.pool_size)
        .context("Failed to connect to database")?;
    Ok(DAL::new(database))
}
