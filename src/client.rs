//! Knowledge-base service client.
//!
//! [`KnowledgeBase`] is the seam between the pipeline and the remote service;
//! [`HttpKnowledgeBase`] implements it over HTTP with `reqwest`. Tests swap in
//! in-memory fakes.
//!
//! # Endpoints
//!
//! | Operation | Method | Path |
//! |-----------|--------|------|
//! | login | `POST` | `/api/auth/login` |
//! | list collections | `GET` | `{prefix}/collections` |
//! | list embedding providers | `GET` | `/api/config/provider/list?provider_type=embedding` |
//! | create collection | `POST` | `{prefix}/create_collection` |
//! | upload file | `POST` | `{prefix}/collection/add_file` (multipart) |
//!
//! Every call except login carries `Authorization: Bearer <token>`. A response
//! is a success only when the HTTP status is 200 **and** the body's `status`
//! field is `"ok"`; anything else becomes an [`ApiError`] carrying the body's
//! `message` when one is present.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::config::ServerConfig;
use crate::models::{
    ApiEnvelope, Collection, CreateCollectionRequest, CreatedCollection, EmbeddingProvider,
    LoginData, LoginRequest, UploadRequest,
};

/// Errors from the knowledge-base service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request failed with HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request rejected: {message}")]
    Rejected { message: String },

    #[error("login failed: {message}")]
    Auth { message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Bearer credential for one run. Not persisted; dropped with the run.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: String,
}

impl Session {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("token", &"<redacted>").finish()
    }
}

/// Operations the uploader needs from the remote service.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Exchange credentials for a [`Session`]. No retry and no expiry tracking.
    async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError>;

    async fn list_collections(&self, session: &Session) -> Result<Vec<Collection>, ApiError>;

    async fn list_embedding_providers(
        &self,
        session: &Session,
    ) -> Result<Vec<EmbeddingProvider>, ApiError>;

    /// Create a collection and return the name the service actually assigned.
    async fn create_collection(
        &self,
        session: &Session,
        request: &CreateCollectionRequest,
    ) -> Result<String, ApiError>;

    async fn upload_file(&self, session: &Session, request: &UploadRequest)
        -> Result<(), ApiError>;
}

/// HTTP implementation of [`KnowledgeBase`] over a single connection pool.
pub struct HttpKnowledgeBase {
    http: reqwest::Client,
    base_url: String,
    kb_prefix: String,
}

impl HttpKnowledgeBase {
    pub fn new(config: &ServerConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            kb_prefix: format!("/{}", config.kb_api_prefix.trim_matches('/')),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Release the connection pool. Consumes the client so no call can follow.
    pub fn close(self) {
        debug!("closing HTTP session to {}", self.base_url);
        drop(self.http);
    }

    fn kb_url(&self, endpoint: &str) -> String {
        format!("{}{}{}", self.base_url, self.kb_prefix, endpoint)
    }

    fn bearer(session: &Session) -> String {
        format!("Bearer {}", session.token())
    }
}

/// Decode a response into its envelope, mapping non-200 statuses and
/// non-`"ok"` bodies to errors.
async fn read_envelope<T: DeserializeOwned>(resp: Response) -> Result<ApiEnvelope<T>, ApiError> {
    let status = resp.status();
    let body = resp.text().await?;

    if status != StatusCode::OK {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: failure_message(&body, status),
        });
    }

    let envelope: ApiEnvelope<T> = serde_json::from_str(&body)
        .map_err(|e| ApiError::MalformedResponse(format!("{}: {}", e, truncate(&body))))?;
    if !envelope.is_ok() {
        return Err(ApiError::Rejected {
            message: envelope
                .message
                .clone()
                .unwrap_or_else(|| format!("status {:?}", envelope.status)),
        });
    }
    Ok(envelope)
}

/// List endpoints answer with `data` only; a missing `status` is accepted.
async fn read_list<T: DeserializeOwned>(resp: Response) -> Result<Vec<T>, ApiError> {
    let status = resp.status();
    let body = resp.text().await?;

    if status != StatusCode::OK {
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: failure_message(&body, status),
        });
    }

    let envelope: ApiEnvelope<Vec<T>> = serde_json::from_str(&body)
        .map_err(|e| ApiError::MalformedResponse(format!("{}: {}", e, truncate(&body))))?;
    if let Some(s) = envelope.status.as_deref() {
        if s != "ok" {
            return Err(ApiError::Rejected {
                message: envelope.message.unwrap_or_else(|| format!("status {:?}", s)),
            });
        }
    }
    Ok(envelope.data.unwrap_or_default())
}

/// Human-readable reason for a failed response: the body's `message` field
/// if it parses, else the raw body, else the status text.
fn failure_message(body: &str, status: StatusCode) -> String {
    if let Ok(env) = serde_json::from_str::<ApiEnvelope<serde_json::Value>>(body) {
        if let Some(m) = env.message {
            return m;
        }
    }
    if !body.trim().is_empty() {
        return truncate(body);
    }
    status
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string()
}

fn truncate(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}

#[async_trait]
impl KnowledgeBase for HttpKnowledgeBase {
    async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let url = format!("{}/api/auth/login", self.base_url);
        debug!("POST {}", url);
        let resp = self
            .http
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let envelope = match read_envelope::<LoginData>(resp).await {
            Ok(env) => env,
            Err(ApiError::Status { status, message }) => {
                return Err(ApiError::Auth {
                    message: format!("HTTP {}: {}", status, message),
                })
            }
            Err(ApiError::Rejected { message }) => return Err(ApiError::Auth { message }),
            Err(e) => return Err(e),
        };

        envelope
            .data
            .and_then(|d| d.token)
            .filter(|t| !t.is_empty())
            .map(Session::new)
            .ok_or_else(|| ApiError::Auth {
                message: "response did not contain a token".to_string(),
            })
    }

    async fn list_collections(&self, session: &Session) -> Result<Vec<Collection>, ApiError> {
        let url = self.kb_url("/collections");
        debug!("GET {}", url);
        let resp = self
            .http
            .get(&url)
            .header(AUTHORIZATION, Self::bearer(session))
            .send()
            .await?;
        read_list(resp).await
    }

    async fn list_embedding_providers(
        &self,
        session: &Session,
    ) -> Result<Vec<EmbeddingProvider>, ApiError> {
        let url = format!("{}/api/config/provider/list", self.base_url);
        debug!("GET {}?provider_type=embedding", url);
        let resp = self
            .http
            .get(&url)
            .query(&[("provider_type", "embedding")])
            .header(AUTHORIZATION, Self::bearer(session))
            .send()
            .await?;
        read_list(resp).await
    }

    async fn create_collection(
        &self,
        session: &Session,
        request: &CreateCollectionRequest,
    ) -> Result<String, ApiError> {
        let url = self.kb_url("/create_collection");
        debug!("POST {} ({})", url, request.collection_name);
        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, Self::bearer(session))
            .json(request)
            .send()
            .await?;

        let envelope = read_envelope::<CreatedCollection>(resp).await?;
        Ok(envelope
            .data
            .and_then(|d| d.collection_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| request.collection_name.clone()))
    }

    async fn upload_file(
        &self,
        session: &Session,
        request: &UploadRequest,
    ) -> Result<(), ApiError> {
        let url = self.kb_url("/collection/add_file");
        debug!("POST {} ({})", url, request.file_name);

        let part = Part::bytes(request.bytes.clone()).file_name(request.file_name.clone());
        let mut form = Form::new()
            .part("file", part)
            .text("collection_name", request.collection_name.clone());
        if let Some(size) = request.chunk_size.filter(|v| *v > 0) {
            form = form.text("chunk_size", size.to_string());
        }
        if let Some(overlap) = request.chunk_overlap.filter(|v| *v > 0) {
            form = form.text("chunk_overlap", overlap.to_string());
        }

        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, Self::bearer(session))
            .multipart(form)
            .send()
            .await?;

        read_envelope::<serde_json::Value>(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_prefers_body_message() {
        let msg = failure_message(
            r#"{"status":"error","message":"token expired"}"#,
            StatusCode::UNAUTHORIZED,
        );
        assert_eq!(msg, "token expired");
    }

    #[test]
    fn failure_message_falls_back_to_body_then_reason() {
        assert_eq!(
            failure_message("upstream down", StatusCode::BAD_GATEWAY),
            "upstream down"
        );
        assert_eq!(
            failure_message("", StatusCode::INTERNAL_SERVER_ERROR),
            "Internal Server Error"
        );
    }

    #[test]
    fn urls_are_normalized() {
        let cfg = ServerConfig {
            url: "http://kb.local:6185/".to_string(),
            kb_api_prefix: "api/plug/alkaid/kb/".to_string(),
            ..ServerConfig::default()
        };
        let kb = HttpKnowledgeBase::new(&cfg).unwrap();
        assert_eq!(kb.base_url(), "http://kb.local:6185");
        assert_eq!(
            kb.kb_url("/collections"),
            "http://kb.local:6185/api/plug/alkaid/kb/collections"
        );
    }

    #[test]
    fn session_debug_hides_token() {
        let s = Session::new("abc123");
        assert!(!format!("{:?}", s).contains("abc123"));
        assert_eq!(s.token(), "abc123");
    }
}
