//! Data types shared across the uploader.
//!
//! [`FingerprintRecord`] is what the ledger persists. The remaining types
//! mirror the JSON bodies exchanged with the knowledge-base service; every
//! response field defaults when absent so a slightly different server build
//! does not break deserialization.

use serde::{Deserialize, Deserializer, Serialize};

/// Ledger entry for one file name that was acknowledged by the service.
///
/// Field names on disk (`hash`, `size`, `upload_time`, ...) are kept stable so
/// existing ledger files stay readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    /// Hex-encoded SHA-256 of the file bytes.
    #[serde(rename = "hash", default)]
    pub content_hash: String,
    /// Informational only; equality is decided by `content_hash`.
    #[serde(rename = "size", default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub collection_name: String,
    /// Local time of the last successful upload, `%Y-%m-%d %H:%M:%S`.
    #[serde(rename = "upload_time", default)]
    pub uploaded_at: String,
    #[serde(rename = "file_path", default)]
    pub source_path: String,
}

/// Envelope wrapping every service response: `{status, message, data}`.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::DeserializeOwned"))]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_ok(&self) -> bool {
        self.status.as_deref() == Some("ok")
    }
}

/// Accept any JSON for `data`, keeping it only if it has the expected shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub token: Option<String>,
}

/// A remote collection as listed by the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub collection_name: String,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Collection {
    pub fn named(name: &str) -> Self {
        Self {
            collection_name: name.to_string(),
            emoji: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmbeddingProvider {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
}

/// Provider ids are strings on current servers; older ones sent integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateCollectionRequest {
    pub collection_name: String,
    pub emoji: String,
    pub description: String,
    pub embedding_provider_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatedCollection {
    #[serde(default)]
    pub collection_name: Option<String>,
}

/// One multipart upload into a collection.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub collection_name: String,
    pub chunk_size: Option<u32>,
    pub chunk_overlap: Option<u32>,
}
