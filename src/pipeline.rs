//! Batch upload pipeline.
//!
//! One batch walks these stages strictly in order:
//!
//! ```text
//! Start → Authenticated → CollectionResolved → Scanned → Filtered → Uploading → Done
//! ```
//!
//! Any stage may end the run early with an error (missing folder, failed
//! login, no resolvable collection). Past that point nothing is fatal: each
//! file is uploaded in scan order, one at a time, and a failure is counted
//! and skipped. Successful uploads are written to the ledger immediately, so
//! an interrupted batch resumes where it stopped on the next run.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::client::{HttpKnowledgeBase, KnowledgeBase, Session};
use crate::config::Config;
use crate::ledger::{ledger_key, LedgerStore};
use crate::models::UploadRequest;
use crate::progress::{UploadProgressEvent, UploadProgressReporter};
use crate::resolver::{resolve_collection, CollectionRequest, MatchKind};
use crate::scan::{scan_folder, ScanOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Start,
    Authenticated,
    CollectionResolved,
    Scanned,
    Filtered,
    Uploading,
    Done,
}

/// Everything one batch needs to know.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub folder: PathBuf,
    pub username: String,
    pub password: String,
    pub collection: CollectionRequest,
    pub chunk_size: Option<u32>,
    pub chunk_overlap: Option<u32>,
    /// Pause between consecutive uploads.
    pub delay: Duration,
    /// Pause after creating a collection before listing again.
    pub provision_wait: Duration,
    pub scan: ScanOptions,
}

impl UploadJob {
    /// Build a job from config; the password comes from config or environment.
    pub fn from_config(config: &Config, folder: &Path) -> Result<Self> {
        let upload = &config.upload;
        Ok(Self {
            folder: folder.to_path_buf(),
            username: config.server.username.clone(),
            password: config.server.resolve_password()?,
            collection: CollectionRequest {
                name: upload.collection.clone(),
                emoji: upload.emoji.clone(),
                description: upload.description.clone(),
            },
            chunk_size: upload.chunk_size,
            chunk_overlap: upload.chunk_overlap,
            delay: Duration::try_from_secs_f64(upload.delay_secs)
                .with_context(|| format!("Invalid upload.delay_secs: {}", upload.delay_secs))?,
            provision_wait: Duration::try_from_secs_f64(upload.provision_wait_secs).with_context(
                || format!("Invalid upload.provision_wait_secs: {}", upload.provision_wait_secs),
            )?,
            scan: ScanOptions::from(upload),
        })
    }
}

/// Outcome of a batch that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub collection: String,
    pub match_kind: MatchKind,
    pub scanned: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_files: Vec<PathBuf>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Files split by whether the ledger already holds their content.
#[derive(Debug, Default)]
pub struct Partition {
    pub new: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Split scanned files against the ledger. Never touches the network.
pub fn partition(files: Vec<PathBuf>, ledger: &LedgerStore) -> Partition {
    let mut out = Partition::default();
    for file in files {
        if ledger.is_uploaded(&file) {
            out.skipped.push(file);
        } else {
            out.new.push(file);
        }
    }
    out
}

/// Warn about files that would share one ledger key.
fn warn_on_key_collisions(files: &[PathBuf]) {
    let mut seen: HashMap<String, &Path> = HashMap::new();
    for file in files {
        let key = ledger_key(file);
        if let Some(prev) = seen.insert(key.clone(), file.as_path()) {
            warn!(
                "{} and {} share the ledger key '{}'; only the last upload is remembered",
                prev.display(),
                file.display(),
                key
            );
        }
    }
}

fn enter(stage: BatchStage) {
    debug!(stage = ?stage, "batch stage");
}

/// Run one batch against `kb`, recording successes in `ledger`.
pub async fn run_batch(
    kb: &dyn KnowledgeBase,
    ledger: &mut LedgerStore,
    job: &UploadJob,
    reporter: &dyn UploadProgressReporter,
) -> Result<BatchReport> {
    enter(BatchStage::Start);
    if !job.folder.is_dir() {
        bail!("Source folder does not exist: {}", job.folder.display());
    }

    let session: Session = kb
        .login(&job.username, &job.password)
        .await
        .context("Authentication failed")?;
    info!("Logged in as {}", job.username);
    enter(BatchStage::Authenticated);

    let resolved = resolve_collection(kb, &session, &job.collection, job.provision_wait)
        .await
        .context("Could not resolve target collection")?;
    info!("Uploading into collection '{}'", resolved.name);
    enter(BatchStage::CollectionResolved);

    reporter.report(UploadProgressEvent::Scanning {
        folder: job.folder.display().to_string(),
    });
    let files = scan_folder(&job.folder, &job.scan)?;
    let scanned = files.len();
    info!("Found {} supported file(s) in {}", scanned, job.folder.display());
    if files.is_empty() {
        warn!("No supported files in {}", job.folder.display());
    }
    warn_on_key_collisions(&files);
    enter(BatchStage::Scanned);

    let Partition { new, skipped } = partition(files, ledger);
    info!(
        "{} to upload, {} already uploaded",
        new.len(),
        skipped.len()
    );
    enter(BatchStage::Filtered);

    enter(BatchStage::Uploading);
    let total = new.len() as u64;
    let mut uploaded = 0usize;
    let mut failed_files = Vec::new();

    for (i, path) in new.iter().enumerate() {
        if i > 0 && !job.delay.is_zero() {
            tokio::time::sleep(job.delay).await;
        }

        let file_name = ledger_key(path);
        reporter.report(UploadProgressEvent::Uploading {
            file: file_name.clone(),
            n: i as u64 + 1,
            total,
        });

        match upload_one(kb, &session, path, &file_name, &resolved.name, job).await {
            Ok(()) => {
                uploaded += 1;
                info!("Uploaded {}", file_name);
                if let Err(e) = ledger.mark_uploaded(path, &resolved.name) {
                    error!("Uploaded {} but could not record it: {:#}", file_name, e);
                }
                reporter.report(UploadProgressEvent::Finished {
                    file: file_name,
                    ok: true,
                });
            }
            Err(e) => {
                error!("Upload failed for {}: {:#}", file_name, e);
                failed_files.push(path.clone());
                reporter.report(UploadProgressEvent::Finished {
                    file: file_name,
                    ok: false,
                });
            }
        }
    }
    enter(BatchStage::Done);

    let report = BatchReport {
        collection: resolved.name,
        match_kind: resolved.kind,
        scanned,
        uploaded,
        skipped: skipped.len(),
        failed: failed_files.len(),
        failed_files,
    };
    info!(
        "Batch finished: {} uploaded, {} skipped, {} failed",
        report.uploaded, report.skipped, report.failed
    );
    Ok(report)
}

async fn upload_one(
    kb: &dyn KnowledgeBase,
    session: &Session,
    path: &Path,
    file_name: &str,
    collection: &str,
    job: &UploadJob,
) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let request = UploadRequest {
        file_name: file_name.to_string(),
        bytes,
        collection_name: collection.to_string(),
        chunk_size: job.chunk_size,
        chunk_overlap: job.chunk_overlap,
    };
    kb.upload_file(session, &request).await?;
    Ok(())
}

/// Run a batch over HTTP using `config`.
///
/// The HTTP client lives only for this call and is closed on every exit path.
pub async fn run_upload(
    config: &Config,
    job: &UploadJob,
    reporter: &dyn UploadProgressReporter,
) -> Result<BatchReport> {
    let mut ledger = LedgerStore::load(&config.ledger.path);
    let kb = HttpKnowledgeBase::new(&config.server)?;
    let outcome = run_batch(&kb, &mut ledger, job, reporter).await;
    kb.close();
    outcome
}

/// Counts for `--dry-run`: scan and filter only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunReport {
    pub scanned: usize,
    pub would_upload: Vec<PathBuf>,
    pub skipped: usize,
}

pub fn dry_run(folder: &Path, scan: &ScanOptions, ledger: &LedgerStore) -> Result<DryRunReport> {
    let files = scan_folder(folder, scan)?;
    let scanned = files.len();
    warn_on_key_collisions(&files);
    let Partition { new, skipped } = partition(files, ledger);
    Ok(DryRunReport {
        scanned,
        would_upload: new,
        skipped: skipped.len(),
    })
}
