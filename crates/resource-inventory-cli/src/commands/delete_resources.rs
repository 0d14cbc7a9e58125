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

//! Implementation of the `admin delete-resources` command.

use anyhow::{bail, Context, Result};
use resource_inventory::dal::ResourceFilter;
use resource_inventory::InventoryConfig;
use tracing::info;

pub async fn run(
    database_url: &str,
    config: &InventoryConfig,
    resource_type: &str,
    reporter_type: &str,
    dry_run: bool,
) -> Result<()> {
    if resource_type.trim().is_empty() || reporter_type.trim().is_empty() {
        bail!("Both --resource-type and --reporter-type are required");
    }
    let filter = ResourceFilter {
        resource_type: resource_type.to_string(),
        reporter_type: reporter_type.to_string(),
    };

    let dal = super::open_dal(database_url, config)?;
    let maintenance = dal.maintenance();

    if dry_run {
        let count = maintenance
            .count_resources(&filter)
            .await
            .context("Failed to count resources")?;
        info!(
            "[DRY RUN] Would delete {} {} resource(s) reported by {}",
            count, resource_type, reporter_type
        );
        return Ok(());
    }

    let settings = config.batch_settings();
    info!(
        batch_size = settings.batch_size,
        batch_delay_ms = settings.batch_delay.as_millis() as u64,
        "Deleting {} resources reported by {}",
        resource_type,
        reporter_type
    );
    let deleted = maintenance
        .delete_resources(&filter, settings)
        .await
        .context("Failed to delete resources")?;
    info!("Deleted {} resource(s)", deleted);

    Ok(())
}
