//! Firestore REST client
//!
//! Talks to the Firestore v1 REST API (or a local emulator) with a blocking
//! `ureq` agent. Every call is a single attempt; failures are reported to the
//! caller instead of being retried.

pub mod codec;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};
use ureq::http::Response;
use ureq::{Agent, Body};
use url::Url;

use self::codec::WireCodec;
use crate::config::{ConfigError, FirebaseConfig};
use crate::store::query::QuerySpec;
use crate::store::value::FieldMap;
use crate::store::{CollectionRef, Document, DocumentStore, StoreError, collection_path};

const PAGE_SIZE: u32 = 300;

#[derive(Debug, Clone)]
pub struct FirestoreClient {
    /// `{endpoint}projects/{project}/databases/{database}`
    database_url: Url,
    project_id: String,
    database_id: String,
    api_key: String,
    access_token: Option<String>,
    codec: WireCodec,
    agent: Agent,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<u16>,
    message: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionIdsPage {
    #[serde(default)]
    collection_ids: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentsPage {
    #[serde(default)]
    documents: Vec<Value>,
    next_page_token: Option<String>,
}

/// Split `users/abc/orders` into the parent document path and collection id
fn split_collection_path(collection: &str) -> Result<(Option<&str>, &str), StoreError> {
    let path = collection_path(collection)?;

    Ok(match path.rsplit_once('/') {
        Some((parent, id)) => (Some(parent), id),
        None => (None, path),
    })
}

fn non_empty_token(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

impl FirestoreClient {
    #[inline]
    pub fn new(config: &FirebaseConfig) -> Result<Self, ConfigError> {
        let project_id = config.project_id()?.to_string();
        let api_key = config.api_key()?.to_string();
        let database_id = config.database_id.clone();

        let mut database_url = config.endpoint()?;
        database_url
            .path_segments_mut()
            .map_err(|()| {
                ConfigError::InvalidEmulatorHost(config.emulator_host.clone().unwrap_or_default())
            })?
            .pop_if_empty()
            .extend(["projects", project_id.as_str(), "databases", database_id.as_str()]);

        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            codec: WireCodec::new(&project_id, &database_id),
            database_url,
            project_id,
            database_id,
            api_key,
            access_token: config.access_token.clone(),
            agent,
        })
    }

    #[inline]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    #[inline]
    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    /// URL below the database root, e.g. `["documents", "users"]`
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, StoreError> {
        let mut url = self.database_url.clone();
        url.path_segments_mut()
            .map_err(|()| StoreError::Transport("Endpoint URL cannot have a path".to_string()))?
            .extend(segments);
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("key", &self.api_key);
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    /// Segments of `documents/<parent path>` for a collection's parent
    fn parent_segments<'a>(parent: Option<&'a str>) -> Vec<&'a str> {
        let mut segments = vec!["documents"];
        if let Some(parent) = parent {
            segments.extend(parent.split('/'));
        }
        segments
    }

    fn get(&self, url: &Url) -> Result<Value, StoreError> {
        debug!("GET {}", url.path());
        let mut request = self.agent.get(url.as_str());
        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        read_response(request.call())
    }

    fn post(&self, url: &Url, body: &Value) -> Result<Value, StoreError> {
        debug!("POST {}", url.path());
        let payload = serde_json::to_string(body)
            .map_err(|e| StoreError::Transport(format!("Failed to serialize request: {}", e)))?;
        let mut request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        if let Some(token) = &self.access_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        read_response(request.send(&payload))
    }

    fn fetch_collection_ids(&self) -> Result<Vec<CollectionRef>, StoreError> {
        let url = self.url(&["documents:listCollectionIds"], &[])?;
        let mut collections = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut body = json!({ "pageSize": PAGE_SIZE });
            if let Some(token) = &page_token {
                body["pageToken"] = json!(token);
            }

            let page: CollectionIdsPage = parse_page(self.post(&url, &body)?)?;
            collections.extend(
                page.collection_ids
                    .into_iter()
                    .map(|name| CollectionRef { name }),
            );

            page_token = non_empty_token(page.next_page_token);
            if page_token.is_none() {
                break;
            }
        }

        Ok(collections)
    }

    fn fetch_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let (parent, collection_id) = split_collection_path(collection)?;
        let mut segments = Self::parent_segments(parent);
        segments.push(collection_id);

        let page_size = PAGE_SIZE.to_string();
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", page_size.as_str())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.as_str()));
            }

            let url = self.url(&segments, &query)?;
            let page: DocumentsPage = parse_page(self.get(&url)?)?;
            for document in &page.documents {
                documents.push(self.codec.decode_document(document)?);
            }

            page_token = non_empty_token(page.next_page_token);
            if page_token.is_none() {
                break;
            }
        }

        Ok(documents)
    }

    fn insert_document(
        &self,
        collection: &str,
        fields: &FieldMap,
        document_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let (parent, collection_id) = split_collection_path(collection)?;
        let mut segments = Self::parent_segments(parent);
        segments.push(collection_id);

        let query: Vec<(&str, &str)> = document_id.map(|id| ("documentId", id)).into_iter().collect();
        let url = self.url(&segments, &query)?;
        let body = json!({ "fields": self.codec.encode_fields(fields) });

        let created = self.codec.decode_document(&self.post(&url, &body)?)?;
        Ok(created.id)
    }

    fn execute_query(&self, query: &QuerySpec) -> Result<Vec<Document>, StoreError> {
        let (parent, collection_id) = split_collection_path(&query.collection)?;
        let mut segments = Self::parent_segments(parent);
        // `:runQuery` is appended to the last segment of the parent path
        let last = segments.pop().unwrap_or("documents");
        let run_query = format!("{}:runQuery", last);
        segments.push(&run_query);

        let url = self.url(&segments, &[])?;
        let body = self.codec.run_query_body(query, collection_id);

        let response = self.post(&url, &body)?;
        let entries = response
            .as_array()
            .ok_or_else(|| StoreError::InvalidResponse("runQuery did not return an array".to_string()))?;

        entries
            .iter()
            .filter_map(|entry| entry.get("document"))
            .map(|document| self.codec.decode_document(document))
            .collect()
    }

    async fn blocking<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T, StoreError> + Send + 'static,
    {
        let client = self.clone();
        tokio::task::spawn_blocking(move || operation(&client))
            .await
            .map_err(|e| StoreError::Transport(format!("Store task failed: {}", e)))?
    }
}

fn parse_page<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, StoreError> {
    // An empty page comes back as `{}` or an empty body
    let value = if value.is_null() { json!({}) } else { value };
    serde_json::from_value(value).map_err(|e| StoreError::InvalidResponse(e.to_string()))
}

fn read_response(response: Result<Response<Body>, ureq::Error>) -> Result<Value, StoreError> {
    let mut response = response.map_err(|e| StoreError::Transport(e.to_string()))?;
    let status = response.status();
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|e| StoreError::Transport(format!("Failed to read response body: {}", e)))?;

    if !status.is_success() {
        let error = error_from_body(status.as_u16(), &text);
        warn!("Firestore request failed: {}", error);
        return Err(error);
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    serde_json::from_str(&text).map_err(|e| StoreError::InvalidResponse(e.to_string()))
}

fn error_from_body(code: u16, body: &str) -> StoreError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => StoreError::Operation {
            status: envelope
                .error
                .status
                .unwrap_or_else(|| format!("HTTP {}", envelope.error.code.unwrap_or(code))),
            message: envelope.error.message,
        },
        Err(_) => StoreError::Operation {
            status: format!("HTTP {}", code),
            message: body.trim().to_string(),
        },
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    #[inline]
    async fn list_collections(&self) -> Result<Vec<CollectionRef>, StoreError> {
        self.blocking(Self::fetch_collection_ids).await
    }

    #[inline]
    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let collection = collection.to_string();
        self.blocking(move |client| client.fetch_documents(&collection))
            .await
    }

    #[inline]
    async fn create_document(
        &self,
        collection: &str,
        fields: FieldMap,
        document_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let collection = collection.to_string();
        let document_id = document_id.map(str::to_string);
        self.blocking(move |client| {
            client.insert_document(&collection, &fields, document_id.as_deref())
        })
        .await
    }

    #[inline]
    async fn run_query(&self, query: &QuerySpec) -> Result<Vec<Document>, StoreError> {
        let query = query.clone();
        self.blocking(move |client| client.execute_query(&query))
            .await
    }
}
