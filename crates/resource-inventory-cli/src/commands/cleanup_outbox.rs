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

//! Implementation of the `admin cleanup-outbox` command.
//!
//! Outbox rows are only read by the connector that publishes them; once
//! published they are dead weight. This removes rows older than a
//! retention window, in batches.

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use resource_inventory::database::UniversalTimestamp;
use resource_inventory::InventoryConfig;
use tracing::info;

/// Parses a duration like "7d", "24h" or "1h30m".
///
/// Units are `d`, `h`, `m` and `s`; units may be combined.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err(anyhow!("Duration string cannot be empty"));
    }

    let mut total = Duration::zero();
    let mut current_num = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            current_num.push(c);
            continue;
        }
        if current_num.is_empty() {
            return Err(anyhow!(
                "Invalid duration format: expected number before '{}'",
                c
            ));
        }

        let num: i64 = current_num
            .parse()
            .with_context(|| format!("Invalid number in duration: {}", current_num))?;
        current_num.clear();

        let duration = match c {
            'd' => Duration::days(num),
            'h' => Duration::hours(num),
            'm' => Duration::minutes(num),
            's' => Duration::seconds(num),
            _ => return Err(anyhow!("Unknown duration unit: '{}'. Use d, h, m, or s", c)),
        };
        total = total + duration;
    }

    if !current_num.is_empty() {
        return Err(anyhow!(
            "Duration '{}' is missing a unit. Use d (days), h (hours), m (minutes), or s (seconds)",
            s
        ));
    }
    if total == Duration::zero() {
        return Err(anyhow!("Duration must be greater than zero"));
    }

    Ok(total)
}

pub async fn run(
    database_url: &str,
    config: &InventoryConfig,
    older_than: &str,
    dry_run: bool,
) -> Result<()> {
    let duration = parse_duration(older_than)
        .with_context(|| format!("Invalid duration: '{}'", older_than))?;

    let cutoff = Utc::now() - duration;
    let cutoff_ts = UniversalTimestamp(cutoff);

    info!(
        "Cleaning up outbox events older than {} (cutoff: {})",
        older_than, cutoff
    );

    let dal = super::open_dal(database_url, config)?;

    if dry_run {
        let count = dal
            .outbox()
            .count_older_than(cutoff_ts)
            .await
            .context("Failed to count outbox events")?;

        if count == 0 {
            info!("No outbox events found older than {}", cutoff);
        } else {
            info!(
                "[DRY RUN] Would delete {} outbox event(s) older than {}",
                count, cutoff
            );
        }
    } else {
        let deleted = dal
            .maintenance()
            .purge_outbox_older_than(cutoff_ts, config.batch_settings())
            .await
            .context("Failed to delete outbox events")?;

        if deleted == 0 {
            info!("No outbox events found older than {}", cutoff);
        } else {
            info!("Deleted {} outbox event(s) older than {}", deleted, cutoff);
        }
    }

    Ok(())
}
