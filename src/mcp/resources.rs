//! Collections exposed as `firestore://<collection>` resources

use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::*;
use crate::mcp::server::ResourceHandler;
use crate::store::{Document, StoreConnector};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const URI_SCHEME: &str = "firestore://";
const MIME_TYPE: &str = "application/json";

/// Collection name addressed by a resource URI
#[inline]
pub fn collection_from_uri(uri: &str) -> McpResult<&str> {
    let collection = uri
        .strip_prefix(URI_SCHEME)
        .ok_or_else(|| McpError::UnsupportedResourceScheme {
            uri: uri.to_string(),
        })?
        .trim_end_matches('/');

    if collection.is_empty() {
        return Err(McpError::ResourceNotFound {
            uri: uri.to_string(),
        });
    }
    Ok(collection)
}

/// Resource handler listing and dumping collections
pub struct CollectionResources {
    connector: Arc<StoreConnector>,
}

impl CollectionResources {
    #[inline]
    pub fn new(connector: Arc<StoreConnector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl ResourceHandler for CollectionResources {
    #[inline]
    async fn list_resources(&self) -> Vec<Resource> {
        let collections = match self.connector.list_collections().await {
            Ok(collections) => collections,
            Err(e) => {
                warn!("Failed to list collections as resources: {}", e);
                return Vec::new();
            }
        };

        collections
            .into_iter()
            .map(|collection| Resource {
                uri: format!("{}{}", URI_SCHEME, collection.name),
                description: Some(format!("Documents in the '{}' collection", collection.name)),
                mime_type: Some(MIME_TYPE.to_string()),
                name: collection.name,
            })
            .collect()
    }

    #[inline]
    fn list_templates(&self) -> Vec<ResourceTemplate> {
        vec![ResourceTemplate {
            uri_template: format!("{}{{collection}}", URI_SCHEME),
            name: "Firestore collection".to_string(),
            description: Some("All documents of a collection as JSON".to_string()),
            mime_type: Some(MIME_TYPE.to_string()),
        }]
    }

    #[inline]
    async fn read_resource(&self, uri: &str) -> McpResult<ReadResourceResult> {
        let collection = collection_from_uri(uri)?;
        debug!("Reading collection resource {}", collection);

        let documents = self
            .connector
            .list_documents(collection)
            .await
            .map_err(|e| McpError::ResourceAccessFailed {
                uri: uri.to_string(),
                message: e.to_string(),
            })?;

        let values: Vec<Value> = documents.iter().map(Document::to_json).collect();
        let text = serde_json::to_string_pretty(&values).map_err(|e| McpError::InternalError {
            message: e.to_string(),
        })?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: uri.to_string(),
                mime_type: Some(MIME_TYPE.to_string()),
                text,
            }],
        })
    }
}
