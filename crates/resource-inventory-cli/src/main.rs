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

//! Inventory CLI - operator surface for the resource inventory consistency services.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use resource_inventory::{init_logging, ConfigLoader, InventoryConfig};

mod commands;

/// Resource inventory - outbox consumer, notifications and maintenance jobs
#[derive(Parser)]
#[command(name = "inventory")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (can also be set via DATABASE_URL environment variable)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Configuration file (defaults to INVENTORY_CONFIG or the search paths)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,

    /// Run the outbox consumer and the notification listener until Ctrl-C
    ServeConsumer,

    /// Send a consistency notification for a transaction id
    Notify {
        /// Transaction id carried by the outbox event
        txid: String,
    },

    /// Administrative maintenance commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Delete outbox rows left behind after they were published
    CleanupOutbox {
        /// Delete rows older than this duration (e.g., "7d", "24h", "1h30m")
        #[arg(long, default_value = "7d")]
        older_than: String,

        /// Preview what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Bulk delete resources reported by one reporter type
    DeleteResources {
        #[arg(long)]
        resource_type: String,

        #[arg(long)]
        reporter_type: String,

        /// Preview what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },
}

fn database_url(cli_url: Option<String>, config: &InventoryConfig) -> Result<String> {
    cli_url.or_else(|| config.storage.url.clone()).context(
        "Database URL is required. Set --database-url, DATABASE_URL or storage.url in the config file",
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(Some(if cli.verbose { "debug" } else { "info" }));

    let config = ConfigLoader::new()
        .load_config_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Migrate => {
            let url = database_url(cli.database_url, &config)?;
            commands::migrate::run(&url, &config).await?;
        }
        Commands::ServeConsumer => {
            let url = database_url(cli.database_url, &config)?;
            commands::serve_consumer::run(&url, &config).await?;
        }
        Commands::Notify { txid } => {
            let url = database_url(cli.database_url, &config)?;
            commands::notify::run(&url, &txid).await?;
        }
        Commands::Admin { command } => {
            let url = database_url(cli.database_url, &config)?;
            match command {
                AdminCommands::CleanupOutbox {
                    older_than,
                    dry_run,
                } => {
                    commands::cleanup_outbox::run(&url, &config, &older_than, dry_run).await?;
                }
                AdminCommands::DeleteResources {
                    resource_type,
                    reporter_type,
                    dry_run,
                } => {
                    commands::delete_resources::run(
                        &url,
                        &config,
                        &resource_type,
                        &reporter_type,
                        dry_run,
                    )
                    .await?;
                }
            }
        }
    }

    Ok(())
}
