//! Document store access
//!
//! The [`StoreConnector`] owns the single store handle of the process. It is
//! built once at startup and shared with the MCP handlers; when configuration
//! is missing or the client cannot be built it stays in an unavailable state
//! and every operation fails fast with [`StoreError::Unavailable`].

pub mod firestore;
pub mod memory;
pub mod query;
pub mod value;


use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::FirebaseConfig;
use crate::store::firestore::FirestoreClient;
pub use crate::store::memory::MemoryStore;
pub use crate::store::query::{Direction, FilterClause, FilterOp, OrderSpec, QuerySpec};
pub use crate::store::value::{DocumentValue, FieldMap};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store connection unavailable: {0}")]
    Unavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{status}: {message}")]
    Operation { status: String, message: String },

    #[error("Invalid response from store: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::Operation {
            status: "INVALID_ARGUMENT".to_string(),
            message: message.into(),
        }
    }
}

/// Normalize a collection path such as `users/ann/orders`.
///
/// Collection paths alternate collection and document ids, so they have an
/// odd number of segments; an even count names a document.
pub(crate) fn collection_path(path: &str) -> Result<&str, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.trim().is_empty() {
        return Err(StoreError::invalid_argument("Collection name must not be empty"));
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.iter().any(|segment| segment.trim().is_empty()) {
        return Err(StoreError::invalid_argument(format!(
            "Collection path '{}' has an empty segment",
            path
        )));
    }
    if segments.len() % 2 == 0 {
        return Err(StoreError::invalid_argument(format!(
            "'{}' is a document path, not a collection",
            path
        )));
    }
    Ok(trimmed)
}

/// A named collection of documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef {
    pub name: String,
}

/// A document read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: FieldMap,
}

impl Document {
    /// `{"id": ..., "data": {...}}` projection used in tool results
    #[inline]
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "data": value::fields_to_json(&self.fields),
        })
    }
}

/// Backend operations a document store has to provide
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_collections(&self) -> Result<Vec<CollectionRef>, StoreError>;

    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Write a new document, returning its id. The store picks the id when
    /// `document_id` is `None`.
    async fn create_document(
        &self,
        collection: &str,
        fields: FieldMap,
        document_id: Option<&str>,
    ) -> Result<String, StoreError>;

    async fn run_query(&self, query: &QuerySpec) -> Result<Vec<Document>, StoreError>;
}

enum Backend {
    Available(Arc<dyn DocumentStore>),
    Unavailable(String),
}

/// Process-wide handle to the document store
pub struct StoreConnector {
    backend: Backend,
}

impl StoreConnector {
    #[inline]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            backend: Backend::Available(store),
        }
    }

    #[inline]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            backend: Backend::Unavailable(reason.into()),
        }
    }

    /// Build the Firestore-backed connector from configuration.
    ///
    /// Never fails: problems are logged once and leave the connector
    /// unavailable so the server can keep answering protocol requests.
    #[inline]
    pub fn connect(config: &FirebaseConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("Firestore disabled: {}", e);
            return Self::unavailable(e.to_string());
        }

        match FirestoreClient::new(config) {
            Ok(client) => {
                info!(
                    "Firestore client ready for project {} (database {})",
                    client.project_id(),
                    client.database_id()
                );
                Self::new(Arc::new(client))
            }
            Err(e) => {
                error!("Error initializing Firestore client: {}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        matches!(self.backend, Backend::Available(_))
    }

    fn store(&self) -> Result<&dyn DocumentStore, StoreError> {
        match &self.backend {
            Backend::Available(store) => Ok(store.as_ref()),
            Backend::Unavailable(reason) => Err(StoreError::Unavailable(reason.clone())),
        }
    }

    #[inline]
    pub async fn list_collections(&self) -> Result<Vec<CollectionRef>, StoreError> {
        let store = self.store()?;
        let collections = store.list_collections().await?;
        debug!("Listed {} collections", collections.len());
        Ok(collections)
    }

    #[inline]
    pub async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let store = self.store()?;
        let documents = store.list_documents(collection).await?;
        debug!(
            "Read {} documents from collection {}",
            documents.len(),
            collection
        );
        Ok(documents)
    }

    #[inline]
    pub async fn create_document(
        &self,
        collection: &str,
        fields: FieldMap,
        document_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let store = self.store()?;
        let id = store.create_document(collection, fields, document_id).await?;
        info!("Created document {} in collection {}", id, collection);
        Ok(id)
    }

    #[inline]
    pub async fn run_query(&self, query: &QuerySpec) -> Result<Vec<Document>, StoreError> {
        let store = self.store()?;
        debug!(
            "Running query on {} with {} filters, order {:?}, limit {:?}",
            query.collection,
            query.filters.len(),
            query.order_by,
            query.limit
        );
        store.run_query(query).await
    }
}
