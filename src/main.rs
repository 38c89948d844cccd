//! # kb-sync CLI (`kbsync`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbsync upload <folder>` | Upload every new or changed supported file |
//! | `kbsync ledger list` | Print the upload ledger |
//! | `kbsync ledger forget <name>` | Drop a ledger record so the file uploads again |
//! | `kbsync collections` | Log in and list remote collections |
//!
//! ## Examples
//!
//! ```bash
//! # Upload ./docs into "Docs", pausing half a second between files
//! kbsync upload ./docs --collection Docs --delay 0.5
//!
//! # Preview without touching the network
//! kbsync upload ./docs --dry-run
//!
//! # Settings from a file, password from the environment
//! KBSYNC_PASSWORD=... kbsync --config ./kbsync.toml upload ./docs
//! ```

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use kb_sync::client::{HttpKnowledgeBase, KnowledgeBase};
use kb_sync::config::{self, Config};
use kb_sync::ledger::LedgerStore;
use kb_sync::logging;
use kb_sync::pipeline::{self, BatchReport, UploadJob};
use kb_sync::progress::ProgressMode;
use kb_sync::scan::ScanOptions;

const DEFAULT_CONFIG: &str = "./kbsync.toml";

/// Upload a local document folder into a knowledge-base collection, once per file content.
///
/// Settings come from built-in defaults, then the TOML config file, then flags.
#[derive(Parser)]
#[command(name = "kbsync", version, about)]
struct Cli {
    /// Path to a TOML configuration file.
    ///
    /// Defaults to `./kbsync.toml`, which is optional; an explicitly given
    /// file must exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs (without colors) to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Connection flags shared by commands that talk to the service.
#[derive(Args)]
struct ServerArgs {
    /// Service base URL, e.g. `http://localhost:6185`.
    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    username: Option<String>,

    /// Password (falls back to server.password, then KBSYNC_PASSWORD).
    #[arg(long)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload new or changed files from a folder.
    ///
    /// Files whose content is already in the ledger are skipped without any
    /// network call. A failed file is reported and retried on the next run.
    Upload {
        /// Folder to scan recursively.
        folder: PathBuf,

        #[command(flatten)]
        server: ServerArgs,

        /// Target collection name (created if missing).
        #[arg(long)]
        collection: Option<String>,

        #[arg(long)]
        chunk_size: Option<u32>,

        #[arg(long)]
        chunk_overlap: Option<u32>,

        /// Seconds to wait between uploads.
        #[arg(long)]
        delay: Option<f64>,

        /// Upload ledger file.
        #[arg(long)]
        ledger: Option<PathBuf>,

        /// Scan and filter only; print what would be uploaded.
        #[arg(long)]
        dry_run: bool,

        /// Progress output: `off`, `human`, or `json` (default: human on a TTY).
        #[arg(long)]
        progress: Option<String>,
    },

    /// Inspect or edit the upload ledger.
    Ledger {
        /// Upload ledger file.
        #[arg(long)]
        ledger: Option<PathBuf>,

        #[command(subcommand)]
        action: LedgerAction,
    },

    /// List the collections on the service.
    Collections {
        #[command(flatten)]
        server: ServerArgs,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Print every record.
    List,
    /// Remove the record for a file name.
    Forget {
        /// Base file name as stored in the ledger.
        name: String,
    },
}

impl ServerArgs {
    fn apply(self, cfg: &mut Config) {
        if let Some(url) = self.url {
            cfg.server.url = url;
        }
        if let Some(username) = self.username {
            cfg.server.username = username;
        }
        if self.password.is_some() {
            cfg.server.password = self.password;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = logging::init_logging(cli.verbose, cli.log_file.as_deref())?;

    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path, true)?,
        None => config::load_config(Path::new(DEFAULT_CONFIG), false)?,
    };

    match cli.command {
        Commands::Upload {
            folder,
            server,
            collection,
            chunk_size,
            chunk_overlap,
            delay,
            ledger,
            dry_run,
            progress,
        } => {
            server.apply(&mut cfg);
            if let Some(c) = collection {
                cfg.upload.collection = c;
            }
            if chunk_size.is_some() {
                cfg.upload.chunk_size = chunk_size;
            }
            if chunk_overlap.is_some() {
                cfg.upload.chunk_overlap = chunk_overlap;
            }
            if let Some(d) = delay {
                cfg.upload.delay_secs = d;
            }
            if let Some(l) = ledger {
                cfg.ledger.path = l;
            }
            config::validate(&cfg)?;

            if !folder.is_dir() {
                bail!("Source folder does not exist: {}", folder.display());
            }

            if dry_run {
                return run_dry_run(&cfg, &folder);
            }

            let mode = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some(s) => match ProgressMode::parse(s) {
                    Some(m) => m,
                    None => bail!("Unknown progress mode: '{}'. Must be off, human, or json.", s),
                },
            };

            let job = UploadJob::from_config(&cfg, &folder)?;
            let report = pipeline::run_upload(&cfg, &job, mode.reporter().as_ref()).await?;
            print_report(&folder, &report);
        }
        Commands::Ledger { ledger, action } => {
            if let Some(l) = ledger {
                cfg.ledger.path = l;
            }
            let mut store = LedgerStore::load(&cfg.ledger.path);
            match action {
                LedgerAction::List => print_ledger(&store),
                LedgerAction::Forget { name } => {
                    if store.forget(&name)? {
                        println!("forgot {}", name);
                    } else {
                        bail!("No ledger record for '{}'", name);
                    }
                }
            }
        }
        Commands::Collections { server } => {
            server.apply(&mut cfg);
            config::validate(&cfg)?;
            let password = cfg.server.resolve_password()?;
            let kb = HttpKnowledgeBase::new(&cfg.server)?;
            let result = async {
                let session = kb.login(&cfg.server.username, &password).await?;
                kb.list_collections(&session).await
            }
            .await;
            kb.close();
            let collections = result?;
            println!("collections ({})", collections.len());
            for c in &collections {
                match &c.emoji {
                    Some(e) if !e.is_empty() => println!("  {} {}", e, c.collection_name),
                    _ => println!("  {}", c.collection_name),
                }
            }
        }
    }

    Ok(())
}

fn run_dry_run(cfg: &Config, folder: &Path) -> Result<()> {
    let ledger = LedgerStore::load(&cfg.ledger.path);
    let report = pipeline::dry_run(folder, &ScanOptions::from(&cfg.upload), &ledger)?;
    println!("upload {} (dry-run)", folder.display());
    println!("  scanned: {} files", report.scanned);
    println!("  would upload: {}", report.would_upload.len());
    for path in &report.would_upload {
        println!("    {}", path.display());
    }
    println!("  skipped (already uploaded): {}", report.skipped);
    Ok(())
}

fn print_report(folder: &Path, report: &BatchReport) {
    println!("upload {}", folder.display());
    println!(
        "  collection: {} ({})",
        report.collection,
        report.match_kind.as_str()
    );
    println!("  scanned: {} files", report.scanned);
    println!("  uploaded: {}", report.uploaded);
    println!("  skipped (already uploaded): {}", report.skipped);
    println!("  failed: {}", report.failed);
    for path in &report.failed_files {
        println!("    {}", path.display());
    }
    println!("{}", if report.is_success() { "ok" } else { "partial" });
}

fn print_ledger(store: &LedgerStore) {
    println!("ledger {} ({} records)", store.path().display(), store.len());
    for (name, rec) in store.records() {
        println!(
            "  {}  {}  {} bytes  {}",
            name, rec.collection_name, rec.size_bytes, rec.uploaded_at
        );
    }
}
