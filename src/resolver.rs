//! Target collection resolution.
//!
//! Guarantees a usable collection exists before any upload starts. The
//! service may rename a collection on creation (for example by appending a
//! uniqueness suffix), so after creating one the list is fetched again and
//! the target is picked with a fixed tie-break order:
//!
//! 1. **Exact**: a collection named exactly as requested, or exactly as the
//!    create call reported.
//! 2. **Prefix**: the first collection whose name starts with the requested name.
//! 3. **Fallback**: the first collection in the list. Uploads may land in the
//!    wrong place, so this branch is logged as a warning.
//!
//! An empty list after all of this fails the batch.

use std::time::Duration;
use tracing::{info, warn};

use crate::client::{ApiError, KnowledgeBase, Session};
use crate::models::{Collection, CreateCollectionRequest};

/// Which branch of the tie-break order picked the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
    Fallback,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Prefix => "prefix",
            MatchKind::Fallback => "fallback",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("no embedding provider is configured on the service; cannot create a collection")]
    NoEmbeddingProvider,

    #[error("no collection available (requested '{requested}')")]
    NoCollection { requested: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// What the caller asked for.
#[derive(Debug, Clone)]
pub struct CollectionRequest {
    pub name: String,
    pub emoji: String,
    pub description: String,
}

/// The collection uploads will go into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCollection {
    pub name: String,
    pub kind: MatchKind,
    /// Whether this run created a collection.
    pub created: bool,
}

/// Apply the tie-break order to a collection list.
///
/// `created` is the name returned by a create call in this run, if any.
pub fn select_collection(
    collections: &[Collection],
    requested: &str,
    created: Option<&str>,
) -> Option<(String, MatchKind)> {
    let exact = collections.iter().find(|c| {
        c.collection_name == requested || created.is_some_and(|n| c.collection_name == n)
    });
    if let Some(c) = exact {
        return Some((c.collection_name.clone(), MatchKind::Exact));
    }

    if let Some(c) = collections
        .iter()
        .find(|c| c.collection_name.starts_with(requested))
    {
        return Some((c.collection_name.clone(), MatchKind::Prefix));
    }

    collections
        .first()
        .map(|c| (c.collection_name.clone(), MatchKind::Fallback))
}

/// Find or create the target collection.
pub async fn resolve_collection(
    kb: &dyn KnowledgeBase,
    session: &Session,
    request: &CollectionRequest,
    provision_wait: Duration,
) -> Result<ResolvedCollection, ResolveError> {
    let existing = kb.list_collections(session).await?;
    if existing.iter().any(|c| c.collection_name == request.name) {
        info!("Using existing collection '{}'", request.name);
        return Ok(ResolvedCollection {
            name: request.name.clone(),
            kind: MatchKind::Exact,
            created: false,
        });
    }

    let providers = kb.list_embedding_providers(session).await?;
    let provider = providers
        .into_iter()
        .find(|p| !p.id.is_empty())
        .ok_or(ResolveError::NoEmbeddingProvider)?;

    let create = CreateCollectionRequest {
        collection_name: request.name.clone(),
        emoji: request.emoji.clone(),
        description: request.description.clone(),
        embedding_provider_id: provider.id,
    };
    let created_name = kb.create_collection(session, &create).await?;
    info!(
        "Created collection '{}' (service reported '{}')",
        request.name, created_name
    );

    if !provision_wait.is_zero() {
        tokio::time::sleep(provision_wait).await;
    }

    let collections = kb.list_collections(session).await?;
    let (name, kind) = select_collection(&collections, &request.name, Some(&created_name))
        .ok_or_else(|| ResolveError::NoCollection {
            requested: request.name.clone(),
        })?;

    match kind {
        MatchKind::Exact => info!("Resolved collection '{}' by exact match", name),
        MatchKind::Prefix => info!(
            "Resolved collection '{}' by prefix match on '{}'",
            name, request.name
        ),
        MatchKind::Fallback => {
            let names: Vec<&str> = collections
                .iter()
                .map(|c| c.collection_name.as_str())
                .collect();
            warn!(
                "Could not confirm collection '{}'; falling back to '{}' (available: {:?})",
                request.name, name, names
            );
        }
    }

    Ok(ResolvedCollection {
        name,
        kind,
        created: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmbeddingProvider, UploadRequest};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn names(list: &[&str]) -> Vec<Collection> {
        list.iter().map(|n| Collection::named(n)).collect()
    }

    #[test]
    fn exact_beats_prefix_regardless_of_order() {
        let cols = names(&["Docs-old", "Docs"]);
        assert_eq!(
            select_collection(&cols, "Docs", None),
            Some(("Docs".to_string(), MatchKind::Exact))
        );
    }

    #[test]
    fn created_name_counts_as_exact() {
        let cols = names(&["Other", "Docs-1", "Docs-7f3a"]);
        assert_eq!(
            select_collection(&cols, "Docs", Some("Docs-7f3a")),
            Some(("Docs-7f3a".to_string(), MatchKind::Exact))
        );
    }

    #[test]
    fn prefix_then_fallback_then_none() {
        let cols = names(&["Other", "Docs-7f3a"]);
        assert_eq!(
            select_collection(&cols, "Docs", None),
            Some(("Docs-7f3a".to_string(), MatchKind::Prefix))
        );

        let cols = names(&["Other", "Misc"]);
        assert_eq!(
            select_collection(&cols, "Docs", None),
            Some(("Other".to_string(), MatchKind::Fallback))
        );

        assert_eq!(select_collection(&[], "Docs", None), None);
    }

    /// Service stub whose create call registers `rename(requested)`.
    struct StubService {
        collections: Mutex<Vec<Collection>>,
        providers: Vec<EmbeddingProvider>,
        rename: fn(&str) -> String,
        reported: fn(&str) -> String,
        creates: Mutex<Vec<CreateCollectionRequest>>,
    }

    impl StubService {
        fn new(existing: &[&str], providers: &[&str]) -> Self {
            Self {
                collections: Mutex::new(names(existing)),
                providers: providers
                    .iter()
                    .map(|id| EmbeddingProvider { id: id.to_string() })
                    .collect(),
                rename: |n| n.to_string(),
                reported: |n| n.to_string(),
                creates: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl KnowledgeBase for StubService {
        async fn login(&self, _u: &str, _p: &str) -> Result<Session, ApiError> {
            Ok(Session::new("t"))
        }

        async fn list_collections(&self, _s: &Session) -> Result<Vec<Collection>, ApiError> {
            Ok(self.collections.lock().unwrap().clone())
        }

        async fn list_embedding_providers(
            &self,
            _s: &Session,
        ) -> Result<Vec<EmbeddingProvider>, ApiError> {
            Ok(self.providers.clone())
        }

        async fn create_collection(
            &self,
            _s: &Session,
            request: &CreateCollectionRequest,
        ) -> Result<String, ApiError> {
            self.creates.lock().unwrap().push(request.clone());
            let actual = (self.rename)(&request.collection_name);
            self.collections
                .lock()
                .unwrap()
                .push(Collection::named(&actual));
            Ok((self.reported)(&request.collection_name))
        }

        async fn upload_file(&self, _s: &Session, _r: &UploadRequest) -> Result<(), ApiError> {
            Ok(())
        }
    }

    fn request(name: &str) -> CollectionRequest {
        CollectionRequest {
            name: name.to_string(),
            emoji: "📚".to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn existing_exact_collection_skips_creation() {
        let svc = StubService::new(&["Docs"], &[]);
        let resolved = resolve_collection(&svc, &Session::new("t"), &request("Docs"), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(resolved.name, "Docs");
        assert!(!resolved.created);
        assert!(svc.creates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_provider_is_fatal() {
        let svc = StubService::new(&["Other"], &[]);
        let err = resolve_collection(&svc, &Session::new("t"), &request("Docs"), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoEmbeddingProvider));
    }

    #[tokio::test]
    async fn suffixed_creation_resolves_by_prefix_not_fallback() {
        let mut svc = StubService::new(&["Unrelated"], &["bge-m3", "other"]);
        svc.rename = |n| format!("{}-7f3a", n);
        let resolved = resolve_collection(&svc, &Session::new("t"), &request("Docs"), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(resolved.name, "Docs-7f3a");
        assert_eq!(resolved.kind, MatchKind::Prefix);
        assert!(resolved.created);

        let creates = svc.creates.lock().unwrap();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].embedding_provider_id, "bge-m3");
        assert_eq!(creates[0].emoji, "📚");
    }

    #[tokio::test]
    async fn reported_name_resolves_exactly() {
        let mut svc = StubService::new(&[], &["p1"]);
        svc.rename = |_| "kb_0192".to_string();
        svc.reported = |_| "kb_0192".to_string();
        let resolved = resolve_collection(&svc, &Session::new("t"), &request("Docs"), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(resolved.name, "kb_0192");
        assert_eq!(resolved.kind, MatchKind::Exact);
    }

    #[tokio::test]
    async fn unconfirmed_creation_falls_back_to_first() {
        let mut svc = StubService::new(&["Unrelated"], &["p1"]);
        svc.rename = |_| "zz".to_string();
        let resolved = resolve_collection(&svc, &Session::new("t"), &request("Docs"), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(resolved.name, "Unrelated");
        assert_eq!(resolved.kind, MatchKind::Fallback);
    }
}
