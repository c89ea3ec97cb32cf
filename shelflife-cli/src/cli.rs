//! Command-line parser and command implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use shelflife::config::validate_config;
use shelflife::db::default_database_path;
use shelflife::{
    load_config, Config, Database, IngestService, ItemStatus, NewReceipt, Pipeline, SqliteStore,
};

#[derive(Parser)]
#[command(name = "shelflife")]
#[command(about = "Receipt ingestion for a household food inventory")]
#[command(version)]
pub struct Cli {
    /// Config file path (defaults are used when omitted)
    #[arg(short, long, global = true, env = "SHELFLIFE_CONFIG")]
    config: Option<PathBuf>,

    /// Database file (overrides config)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a receipt image and run the pipeline on it
    Ingest {
        /// Receipt image file
        image: PathBuf,
        /// Owner of the receipt
        #[arg(short, long)]
        user: String,
        /// Store name, if known
        #[arg(long)]
        store: Option<String>,
        /// Purchase date (YYYY-MM-DD), if known
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Receipt total, if known
        #[arg(long)]
        total: Option<f64>,
        /// ISO currency code
        #[arg(long)]
        currency: Option<String>,
    },

    /// Run the pipeline again on a completed or failed receipt
    Reprocess {
        receipt_id: String,
    },

    /// Show a receipt's processing status and items
    Status {
        receipt_id: String,
    },

    /// List a user's receipts, newest first
    Receipts {
        #[arg(short, long)]
        user: String,
        #[arg(short, long, default_value = "20")]
        limit: u64,
        #[arg(short, long, default_value = "0")]
        offset: u64,
    },

    /// List a user's inventory, soonest expiry first
    Inventory {
        #[arg(short, long)]
        user: String,
        /// Only items in this status (fresh, nearing, expired, used)
        #[arg(short, long)]
        status: Option<ItemStatus>,
    },

    /// Mark an inventory item as used
    MarkUsed {
        item_id: String,
        #[arg(short, long)]
        user: String,
    },

    /// Move items to nearing/expired based on their predicted expiry
    Sweep,

    /// Delete a receipt, its items and its image
    Delete {
        receipt_id: String,
        #[arg(short, long)]
        user: String,
    },

    /// Receipt and inventory counters for a user
    Stats {
        #[arg(short, long)]
        user: String,
    },
}

struct App {
    config: Config,
    store: SqliteStore,
}

impl App {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config = match &cli.config {
            Some(path) => load_config(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => {
                let config = Config::default();
                validate_config(&config)?;
                config
            }
        };

        let db_path = match (&cli.database, &config.database_path) {
            (Some(path), _) => path.clone(),
            (None, Some(path)) => PathBuf::from(path),
            (None, None) => default_database_path()
                .context("could not determine home directory for the database")?,
        };
        let store = SqliteStore::new(Database::open(&db_path)?);

        Ok(Self { config, store })
    }

    fn service(&self) -> anyhow::Result<IngestService> {
        let pipeline = Pipeline::from_config(&self.config, Arc::new(self.store.clone()))?;
        let service = IngestService::new(pipeline, self.config.pipeline.max_concurrent)?;
        service.recover_interrupted()?;
        Ok(service)
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let app = App::open(&cli)?;

    match cli.command {
        Commands::Ingest {
            image,
            user,
            store,
            date,
            total,
            currency,
        } => {
            let stored = copy_upload(&image, Path::new(&app.config.upload_directory))?;
            let receipt = app.store.create_receipt(
                NewReceipt {
                    user_id: user,
                    file_path: stored,
                    original_filename: image
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string()),
                    store_name: store,
                    receipt_date: date,
                    total_amount: total,
                    currency,
                },
                Utc::now(),
            )?;

            let service = app.service()?;
            service.ingest(&receipt.id)?.await??;
            print_json(&service.get_pipeline_result(&receipt.id)?)
        }
        Commands::Reprocess { receipt_id } => {
            let service = app.service()?;
            service.reprocess(&receipt_id)?.await??;
            print_json(&service.get_pipeline_result(&receipt_id)?)
        }
        Commands::Status { receipt_id } => {
            let service = app.service()?;
            print_json(&service.get_pipeline_result(&receipt_id)?)
        }
        Commands::Receipts {
            user,
            limit,
            offset,
        } => {
            let (receipts, total) = app.store.list_receipts(&user, limit, offset)?;
            print_json(&ReceiptPage { total, receipts })
        }
        Commands::Inventory { user, status } => {
            print_json(&app.store.inventory_for_user(&user, status)?)
        }
        Commands::MarkUsed { item_id, user } => {
            if !app.store.mark_used(&item_id, &user, Utc::now())? {
                bail!("no inventory item {} for user {}", item_id, user);
            }
            println!("Marked {} as used", item_id);
            Ok(())
        }
        Commands::Sweep => {
            let report = app
                .store
                .sweep(Utc::now(), app.config.inventory.nearing_days)?;
            print_json(&report)
        }
        Commands::Delete { receipt_id, user } => {
            if !app.store.delete_receipt(&receipt_id, &user)? {
                bail!("no receipt {} for user {}", receipt_id, user);
            }
            println!("Deleted receipt {}", receipt_id);
            Ok(())
        }
        Commands::Stats { user } => {
            let stats = UserStats {
                receipts: app.store.receipt_stats(&user)?,
                inventory: app.store.inventory_stats(&user)?,
            };
            print_json(&stats)
        }
    }
}

#[derive(Serialize)]
struct ReceiptPage {
    total: u64,
    receipts: Vec<shelflife::Receipt>,
}

#[derive(Serialize)]
struct UserStats {
    receipts: shelflife::db::store::ReceiptStats,
    inventory: shelflife::inventory::InventoryStats,
}

/// Copies an image into the upload directory under a fresh unique name.
fn copy_upload(image: &Path, upload_dir: &Path) -> anyhow::Result<PathBuf> {
    if !image.is_file() {
        bail!("{} is not a file", image.display());
    }
    std::fs::create_dir_all(upload_dir)
        .with_context(|| format!("creating upload directory {}", upload_dir.display()))?;

    let extension = image
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg")
        .to_lowercase();
    let target = upload_dir.join(format!("{}.{}", uuid::Uuid::new_v4(), extension));
    std::fs::copy(image, &target)
        .with_context(|| format!("copying {} to {}", image.display(), target.display()))?;

    tracing::debug!(target = %target.display(), "Receipt image stored");
    Ok(target)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
