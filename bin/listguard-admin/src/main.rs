//! Listguard Admin - metastore operator CLI
//!
//! Inspects and repairs the metastore behind a consistency layer, and
//! verifies a local copy of a directory against the paths it tracks.

mod verify;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use listguard_common::config::keys;
use listguard_common::{ConsistencyConfig, MetastoreSettings, Properties, StorePath};
use listguard_meta_store::{Metastore, MetastoreFactory, cutoff_before};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "listguard-admin")]
#[command(about = "Listguard metastore administration")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "LISTGUARD_CONFIG", default_value = "/etc/listguard/listguard.toml")]
    config: PathBuf,

    /// Metastore location, overriding the configuration file
    #[arg(long)]
    metastore: Option<String>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Metastore record operations
    Meta {
        #[command(subcommand)]
        action: MetaCommands,
    },
    /// Compare a local directory against the metastore children of a path
    Verify {
        /// Local directory holding a copy of the listing
        local_dir: PathBuf,
        /// Store path whose tracked children are expected
        path: String,
    },
    /// Print the resolved configuration as JSON
    Config,
}

#[derive(Subcommand, Debug)]
enum MetaCommands {
    /// List the records directly under a path
    List { path: String },
    /// Add (or revive) a record
    Add {
        path: String,
        /// Record the path as a directory
        #[arg(long)]
        dir: bool,
    },
    /// Delete (or tombstone) a record
    Delete { path: String },
    /// Remove tombstones older than the given age
    Purge {
        #[arg(long)]
        older_than_secs: u64,
    },
}

fn load_properties(path: &Path) -> Result<Properties> {
    if !path.exists() {
        debug!("No configuration file at {}, using defaults", path.display());
        return Ok(Properties::new());
    }
    let document =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Properties::from_toml_str(&document).with_context(|| format!("parsing {}", path.display()))
}

async fn open_metastore(settings: &MetastoreSettings) -> Result<Arc<dyn Metastore>> {
    let metastore = MetastoreFactory::new().create(settings)?;
    metastore
        .initialize(&settings.location)
        .await
        .with_context(|| {
            format!("opening {} metastore at {}", settings.implementation, settings.location)
        })?;
    info!("Using {} metastore at {}", metastore.name(), settings.location);
    Ok(metastore)
}

fn parse_path(raw: &str) -> Result<StorePath> {
    StorePath::parse(raw).with_context(|| format!("invalid path '{raw}'"))
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis).map_or_else(
        || millis.to_string(),
        |t| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
    )
}

async fn run_meta(metastore: &dyn Metastore, action: MetaCommands) -> Result<()> {
    match action {
        MetaCommands::List { path } => {
            let path = parse_path(&path)?;
            let records = metastore.list(std::slice::from_ref(&path)).await?;
            println!("Records under {path}");
            println!("{}", "=".repeat(14 + path.to_string().len()));
            for record in &records {
                println!(
                    "{:<4} {:<7} {}  {}",
                    if record.is_directory { "dir" } else { "file" },
                    if record.deleted { "deleted" } else { "live" },
                    format_millis(record.updated_at),
                    record.path
                );
            }
            println!("{} record(s)", records.len());
        }
        MetaCommands::Add { path, dir } => {
            let path = parse_path(&path)?;
            metastore.add(&path, dir).await?;
            println!("Added {path}");
        }
        MetaCommands::Delete { path } => {
            let path = parse_path(&path)?;
            metastore.delete(&path).await?;
            println!("Deleted {path}");
        }
        MetaCommands::Purge { older_than_secs } => {
            let cutoff = cutoff_before(Duration::from_secs(older_than_secs));
            let purged = metastore.purge_tombstones(cutoff).await?;
            println!("Purged {purged} tombstone(s) older than {}", format_millis(cutoff));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let properties = load_properties(&args.config)?;
    if let Some(location) = &args.metastore {
        properties.set(keys::METASTORE_PATH, location.as_str());
    }

    match args.command {
        Commands::Config => {
            let config = ConsistencyConfig::from_properties(&properties)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Meta { action } => {
            let settings = MetastoreSettings::from_properties(&properties)?;
            let metastore = open_metastore(&settings).await?;
            let result = run_meta(metastore.as_ref(), action).await;
            metastore.close().await?;
            result?;
        }
        Commands::Verify { local_dir, path } => {
            let settings = MetastoreSettings::from_properties(&properties)?;
            let metastore = open_metastore(&settings).await?;
            let path = parse_path(&path)?;
            let report = verify::verify(metastore.as_ref(), &local_dir, &path).await;
            metastore.close().await?;
            let report = report?;

            for missing in &report.missing {
                println!("MISSING {missing}");
            }
            println!(
                "{} tracked, {} present locally, {} missing",
                report.tracked,
                report.present,
                report.missing.len()
            );
            if !report.missing.is_empty() {
                bail!(
                    "{} tracked path(s) missing from {}",
                    report.missing.len(),
                    local_dir.display()
                );
            }
        }
    }

    Ok(())
}
