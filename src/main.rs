use anyhow::Result;
use clap::Parser;
use log::{info, LevelFilter};
use std::path::Path;

use inkstore::core::config::Config;
use inkstore::storage::{ensure_default_admin, Record, Storage};

#[derive(Parser)]
#[clap(author, version, about = "Initialize the blog storage directory and seed the admin account")]
struct Cli {
    /// Path to config file
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    /// Override the data directory from the config file
    #[clap(long)]
    data_dir: Option<String>,

    /// Debug mode
    #[clap(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logger
    let log_level = if cli.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .init();

    // Load configuration, falling back to defaults when no file is present
    let config = if Path::new(&cli.config).exists() {
        Config::from_file(&cli.config)?
    } else {
        info!("No config file at {}, using defaults", cli.config);
        Config::default()
    };

    let data_dir = cli.data_dir.unwrap_or_else(|| config.storage.data_dir.clone());
    info!("Opening storage at {}", data_dir);

    let storage = Storage::open(&data_dir)?;

    if ensure_default_admin(&storage.users(), &config).await? {
        info!("Seeded default administrator into empty users collection");
    }

    for (name, store) in storage.collections() {
        let count = store.count(&Record::new()).await?;
        info!("Collection {}: {} records", name, count);
    }

    info!("File storage initialized");

    Ok(())
}
