//! Upload progress reporting.
//!
//! Progress is emitted on **stderr** so the stdout summary stays parseable
//! for scripts.

use std::io::Write;

/// A single progress event for a batch.
#[derive(Clone, Debug)]
pub enum UploadProgressEvent {
    /// Walking the source folder. Total unknown.
    Scanning { folder: String },
    /// Starting upload `n` of `total`.
    Uploading { file: String, n: u64, total: u64 },
    /// Upload finished for `file`.
    Finished { file: String, ok: bool },
}

/// Reports batch progress. Implementations write to stderr (human or JSON).
pub trait UploadProgressReporter: Send + Sync {
    fn report(&self, event: UploadProgressEvent);
}

/// Human-friendly progress on stderr: "[ 3/12] report.pdf".
pub struct StderrProgress;

fn human_line(event: &UploadProgressEvent) -> String {
    match event {
        UploadProgressEvent::Scanning { folder } => format!("scanning {}\n", folder),
        UploadProgressEvent::Uploading { file, n, total } => {
            let width = total.to_string().len();
            format!("[{:>width$}/{}] {}\n", n, total, file, width = width)
        }
        UploadProgressEvent::Finished { ok: true, .. } => String::new(),
        UploadProgressEvent::Finished { file, ok: false } => format!("  FAILED {}\n", file),
    }
}

impl UploadProgressReporter for StderrProgress {
    fn report(&self, event: UploadProgressEvent) {
        let line = human_line(&event);
        if line.is_empty() {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

fn event_json(event: &UploadProgressEvent) -> serde_json::Value {
    match event {
        UploadProgressEvent::Scanning { folder } => serde_json::json!({
            "event": "scanning",
            "folder": folder
        }),
        UploadProgressEvent::Uploading { file, n, total } => serde_json::json!({
            "event": "uploading",
            "file": file,
            "n": n,
            "total": total
        }),
        UploadProgressEvent::Finished { file, ok } => serde_json::json!({
            "event": "finished",
            "file": file,
            "ok": ok
        }),
    }
}

impl UploadProgressReporter for JsonProgress {
    fn report(&self, event: UploadProgressEvent) {
        if let Ok(line) = serde_json::to_string(&event_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl UploadProgressReporter for NoProgress {
    fn report(&self, _event: UploadProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn UploadProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
