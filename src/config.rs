//! TOML configuration for the batch uploader.
//!
//! Every key has a built-in default, so the config file is optional. CLI
//! flags in `main` are applied on top of the loaded values.
//!
//! ```toml
//! [server]
//! url = "http://localhost:6185"
//! username = "admin"
//!
//! [upload]
//! collection = "Docs"
//! delay_secs = 1.0
//!
//! [ledger]
//! path = "upload_record.json"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable consulted when no password is configured.
pub const PASSWORD_ENV: &str = "KBSYNC_PASSWORD";

/// Upper bound for `delay_secs` and `provision_wait_secs` (one day).
pub const MAX_PAUSE_SECS: f64 = 86_400.0;

/// File extensions the remote service can ingest.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "md", "rtf", "csv",
];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Path prefix of the knowledge-base routes (`/collections`, `/create_collection`, ...).
    #[serde(default = "default_kb_api_prefix")]
    pub kb_api_prefix: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: default_username(),
            password: None,
            kb_api_prefix: default_kb_api_prefix(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:6185".to_string()
}
fn default_username() -> String {
    "admin".to_string()
}
fn default_kb_api_prefix() -> String {
    "/api/plug/alkaid/kb".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_emoji")]
    pub emoji: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub chunk_size: Option<u32>,
    #[serde(default)]
    pub chunk_overlap: Option<u32>,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: f64,
    #[serde(default = "default_provision_wait_secs")]
    pub provision_wait_secs: f64,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            emoji: default_emoji(),
            description: String::new(),
            chunk_size: None,
            chunk_overlap: None,
            delay_secs: default_delay_secs(),
            provision_wait_secs: default_provision_wait_secs(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_collection() -> String {
    "Batch Upload".to_string()
}
fn default_emoji() -> String {
    "📚".to_string()
}
fn default_delay_secs() -> f64 {
    1.0
}
fn default_provision_wait_secs() -> f64 {
    2.0
}

/// One `**/*.<ext>` pattern per supported extension.
pub fn default_include_globs() -> Vec<String> {
    SUPPORTED_EXTENSIONS
        .iter()
        .map(|ext| format!("**/*.{}", ext))
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("upload_record.json")
}

impl ServerConfig {
    /// Configured password, falling back to [`PASSWORD_ENV`].
    pub fn resolve_password(&self) -> Result<String> {
        if let Some(p) = &self.password {
            return Ok(p.clone());
        }
        std::env::var(PASSWORD_ENV).map_err(|_| {
            anyhow::anyhow!(
                "No password configured: pass --password, set server.password, or export {}",
                PASSWORD_ENV
            )
        })
    }
}

/// Load the config file at `path`.
///
/// When `required` is false a missing file yields the defaults; this is how
/// the implicit `./kbsync.toml` is treated.
pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    if !path.exists() && !required {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check invariants that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    let url = &config.server.url;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("server.url must start with http:// or https:// (got '{}')", url);
    }

    let upload = &config.upload;
    if upload.collection.trim().is_empty() {
        bail!("upload.collection must not be empty");
    }
    check_pause("upload.delay_secs", upload.delay_secs)?;
    check_pause("upload.provision_wait_secs", upload.provision_wait_secs)?;
    if upload.chunk_size == Some(0) {
        bail!("upload.chunk_size must be > 0");
    }
    if let (Some(size), Some(overlap)) = (upload.chunk_size, upload.chunk_overlap) {
        if overlap >= size {
            bail!(
                "upload.chunk_overlap ({}) must be smaller than upload.chunk_size ({})",
                overlap,
                size
            );
        }
    }

    Ok(())
}

fn check_pause(key: &str, secs: f64) -> Result<()> {
    if !secs.is_finite() || !(0.0..=MAX_PAUSE_SECS).contains(&secs) {
        bail!("{} must be between 0 and {} (got {})", key, MAX_PAUSE_SECS, secs);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("kbsync.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn missing_optional_file_yields_defaults() {
        let tmp = TempDir::new().unwrap();
        let cfg = load_config(&tmp.path().join("nope.toml"), false).unwrap();
        assert_eq!(cfg.server.url, "http://localhost:6185");
        assert_eq!(cfg.upload.collection, "Batch Upload");
        assert_eq!(cfg.upload.delay_secs, 1.0);
        assert_eq!(cfg.ledger.path, PathBuf::from("upload_record.json"));
        assert_eq!(cfg.upload.include_globs.len(), SUPPORTED_EXTENSIONS.len());
    }

    #[test]
    fn missing_required_file_errors() {
        let tmp = TempDir::new().unwrap();
        assert!(load_config(&tmp.path().join("nope.toml"), true).is_err());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[server]
url = "https://kb.example.com/"
password = "secret"

[upload]
collection = "Docs"
chunk_size = 512
chunk_overlap = 64
"#,
        );
        let cfg = load_config(&path, true).unwrap();
        assert_eq!(cfg.server.url, "https://kb.example.com/");
        assert_eq!(cfg.server.username, "admin");
        assert_eq!(cfg.server.resolve_password().unwrap(), "secret");
        assert_eq!(cfg.upload.collection, "Docs");
        assert_eq!(cfg.upload.chunk_size, Some(512));
        assert_eq!(cfg.upload.emoji, "📚");
        assert_eq!(cfg.server.kb_api_prefix, "/api/plug/alkaid/kb");
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            "[upload]\nchunk_size = 100\nchunk_overlap = 100\n",
        );
        let err = load_config(&path, true).unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn rejects_negative_delay_and_bad_url() {
        let mut cfg = Config::default();
        cfg.upload.delay_secs = -1.0;
        assert!(validate(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.server.url = "localhost:6185".to_string();
        assert!(validate(&cfg).is_err());
    }

    #[test]
    fn rejects_pauses_beyond_one_day() {
        let mut cfg = Config::default();
        cfg.upload.delay_secs = 1e20;
        let err = validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("upload.delay_secs"));

        let mut cfg = Config::default();
        cfg.upload.provision_wait_secs = MAX_PAUSE_SECS + 1.0;
        assert!(validate(&cfg).is_err());

        let mut cfg = Config::default();
        cfg.upload.delay_secs = MAX_PAUSE_SECS;
        assert!(validate(&cfg).is_ok());
    }
}
