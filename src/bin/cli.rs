//! readsync CLI
//!
//! Command-line interface for the progress store and shared-folder sync.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use sha2::{Digest, Sha256};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use readsync::sync::{
    AlwaysOnline, Collaborators, FolderTransport, Notifier, ReaderPosition, StaticDigest,
    StaticPosition, SyncOrchestrator, SyncOutcome, SyncRequest, SystemClock,
};
use readsync::{DeviceIdentity, Storage, StorageMode, SyncConfig};

#[derive(Parser)]
#[command(name = "readsync")]
#[command(about = "Reading progress sync over a shared folder")]
#[command(version)]
struct Cli {
    /// TOML config file (flags below override it)
    #[arg(long, env = "READSYNC_CONFIG")]
    config: Option<String>,

    /// Local progress store
    #[arg(long, env = "READSYNC_STORE")]
    store: Option<String>,

    /// Shared folder to sync through
    #[arg(long, env = "READSYNC_DESTINATION")]
    destination: Option<String>,

    /// Device model recorded in pushed progress
    #[arg(long, env = "READSYNC_DEVICE_MODEL")]
    device_model: Option<String>,

    /// Storage mode (cloud-safe, local)
    #[arg(long, env = "READSYNC_STORAGE_MODE")]
    storage_mode: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DocumentArgs {
    /// Document digest
    #[arg(long, conflicts_with = "document")]
    digest: Option<String>,
    /// Document file; its SHA-256 is used as digest
    #[arg(long)]
    document: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a reading position and push it
    Push {
        #[command(flatten)]
        doc: DocumentArgs,
        /// Position cursor (page number or pointer)
        #[arg(long)]
        cursor: String,
        /// Completion (0-1)
        #[arg(long)]
        percentage: f64,
    },
    /// Pull the latest position for a document
    Pull {
        #[command(flatten)]
        doc: DocumentArgs,
        /// Current local cursor
        #[arg(long, default_value = "")]
        cursor: String,
        /// Current local completion (0-1)
        #[arg(long, default_value_t = 0.0)]
        percentage: f64,
    },
    /// Show the stored record for a digest
    Show {
        digest: String,
    },
    /// List every stored record
    List,
    /// Merge a snapshot file into a store file
    Merge {
        local: String,
        remote: String,
    },
    /// Print this device's identity
    Device,
}

/// Prints notices and asks on stdin
struct StdioNotifier;

#[async_trait]
impl Notifier for StdioNotifier {
    fn info(&self, message: &str) {
        println!("{}", message);
    }

    fn error(&self, message: &str) {
        eprintln!("{}", message);
    }

    async fn confirm(&self, message: &str) -> bool {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            print!("{} [y/N] ", message);
            if io::stdout().flush().is_err() {
                return false;
            }
            let mut line = String::new();
            io::stdin().read_line(&mut line).is_ok() && line.trim().eq_ignore_ascii_case("y")
        })
        .await
        .unwrap_or(false)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let identity_path = data_dir(&config).join("device.json");
    let identity = DeviceIdentity::load_or_create(&identity_path, config.device_model.as_deref())
        .context("loading device identity")?;

    match cli.command {
        Commands::Push {
            doc,
            cursor,
            percentage,
        } => {
            let reader = Arc::new(StaticPosition::new(cursor, percentage));
            let orchestrator = orchestrator(config, identity, &doc, reader)?;
            report(orchestrator.push(SyncRequest::INTERACTIVE).await)?;
        }

        Commands::Pull {
            doc,
            cursor,
            percentage,
        } => {
            let reader = Arc::new(StaticPosition::new(cursor, percentage));
            let orchestrator = orchestrator(config, identity, &doc, reader.clone())?;
            report(orchestrator.pull(SyncRequest::INTERACTIVE).await)?;
            println!(
                "Position: {} ({:.0}%)",
                reader.current_progress(),
                reader.current_percentage() * 100.0
            );
        }

        Commands::Show { digest } => {
            let storage = Storage::open(&config)?;
            match storage.read(&digest)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("No progress recorded for {}", digest),
            }
        }

        Commands::List => {
            let storage = Storage::open(&config)?;
            for record in storage.list()? {
                println!(
                    "{} {:>5} {} [{}] @{}",
                    record.doc_digest,
                    record.percent_label(),
                    record.progress_cursor,
                    record.origin_device,
                    chrono::DateTime::from_timestamp(record.timestamp, 0)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| record.timestamp.to_string())
                );
            }
            println!("{} record(s)", storage.count()?);
        }

        Commands::Merge { local, remote } => {
            let local = shellexpand::tilde(&local).to_string();
            let remote = shellexpand::tilde(&remote).to_string();
            let report = readsync::sync::merge_snapshot(Path::new(&local), Path::new(&remote))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Device => {
            println!("{}", serde_json::to_string_pretty(&identity)?);
        }
    }

    Ok(())
}

fn build_config(cli: &Cli) -> anyhow::Result<SyncConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = shellexpand::tilde(path).to_string();
            SyncConfig::load(Path::new(&path)).with_context(|| format!("reading {}", path))?
        }
        None => SyncConfig::new(default_store_path()),
    };

    if let Some(store) = &cli.store {
        config.store_path = store.clone();
    }
    config.store_path = shellexpand::tilde(&config.store_path).to_string();

    if let Some(destination) = &cli.destination {
        config.destination = Some(shellexpand::tilde(destination).to_string());
    }
    if let Some(model) = &cli.device_model {
        config.device_model = Some(model.clone());
    }
    if let Some(mode) = &cli.storage_mode {
        config.storage_mode = mode.parse::<StorageMode>().map_err(anyhow::Error::msg)?;
    }
    Ok(config)
}

fn default_store_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("readsync")
        .join("progress.sqlite3")
        .to_string_lossy()
        .into_owned()
}

fn data_dir(config: &SyncConfig) -> PathBuf {
    Path::new(&config.store_path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn document_digest(doc: &DocumentArgs) -> anyhow::Result<Option<String>> {
    if let Some(digest) = &doc.digest {
        return Ok(Some(digest.clone()));
    }
    match &doc.document {
        Some(path) => {
            let path = shellexpand::tilde(path).to_string();
            let bytes = std::fs::read(&path).with_context(|| format!("reading {}", path))?;
            Ok(Some(hex::encode(Sha256::digest(&bytes))))
        }
        None => Ok(None),
    }
}

fn orchestrator(
    config: SyncConfig,
    identity: DeviceIdentity,
    doc: &DocumentArgs,
    reader: Arc<dyn ReaderPosition>,
) -> anyhow::Result<SyncOrchestrator> {
    let cache_dir = dirs::cache_dir()
        .map(|d| d.join("readsync"))
        .unwrap_or_else(|| data_dir(&config).join("cache"));

    let deps = Collaborators {
        transport: Arc::new(FolderTransport::new(cache_dir)),
        digest: Arc::new(StaticDigest(document_digest(doc)?)),
        reader,
        network: Arc::new(AlwaysOnline),
        notifier: Arc::new(StdioNotifier),
        clock: Arc::new(SystemClock),
    };
    Ok(SyncOrchestrator::open(config, identity, deps)?)
}

fn report(outcome: SyncOutcome) -> anyhow::Result<()> {
    tracing::debug!("Outcome: {:?}", outcome);
    match outcome {
        SyncOutcome::Failed(message) => anyhow::bail!(message),
        SyncOutcome::Skipped(reason) => anyhow::bail!("sync skipped: {:?}", reason),
        _ => Ok(()),
    }
}
