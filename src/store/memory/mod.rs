//! In-process document store
//!
//! Backs `serve --in-memory` and the test suites. Query evaluation follows
//! Firestore's documented semantics: a filter never matches a document that
//! lacks the field, comparisons only match within a type class, ordering drops
//! documents without the order field, and the default order is by document id.

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::store::query::{Direction, FilterClause, FilterOp, QuerySpec};
use crate::store::value::{DocumentValue, FieldMap, lookup_path};
use crate::store::{CollectionRef, Document, DocumentStore, StoreError, collection_path};

const GENERATED_ID_LENGTH: usize = 20;

/// Collections keyed by name, documents keyed by id
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, BTreeMap<String, FieldMap>>>,
}

impl MemoryStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_id() -> String {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(GENERATED_ID_LENGTH);
        id
    }
}

fn into_documents<'a>(
    documents: impl Iterator<Item = (&'a String, &'a FieldMap)>,
) -> Vec<Document> {
    documents
        .map(|(id, fields)| Document {
            id: id.clone(),
            fields: fields.clone(),
        })
        .collect()
}

/// Whether a single filter clause accepts the given document fields
#[inline]
pub fn clause_matches(fields: &FieldMap, clause: &FilterClause) -> bool {
    let Some(actual) = lookup_path(fields, &clause.field) else {
        return false;
    };
    let expected = &clause.value;
    let list = match expected {
        DocumentValue::Array(items) => items.as_slice(),
        _ => &[],
    };

    match clause.op {
        FilterOp::Equal => actual.matches(expected),
        FilterOp::NotEqual => !actual.is_null() && !actual.matches(expected),
        FilterOp::LessThan => actual.compare(expected).is_some_and(|o| o.is_lt()),
        FilterOp::LessThanOrEqual => actual.compare(expected).is_some_and(|o| o.is_le()),
        FilterOp::GreaterThan => actual.compare(expected).is_some_and(|o| o.is_gt()),
        FilterOp::GreaterThanOrEqual => actual.compare(expected).is_some_and(|o| o.is_ge()),
        FilterOp::ArrayContains => match actual {
            DocumentValue::Array(items) => items.iter().any(|item| item.matches(expected)),
            _ => false,
        },
        FilterOp::In => list.iter().any(|candidate| actual.matches(candidate)),
        FilterOp::NotIn => {
            !actual.is_null() && !list.iter().any(|candidate| actual.matches(candidate))
        }
        FilterOp::ArrayContainsAny => match actual {
            DocumentValue::Array(items) => items
                .iter()
                .any(|item| list.iter().any(|candidate| item.matches(candidate))),
            _ => false,
        },
    }
}

/// Apply filters, then ordering, then the limit
#[inline]
pub fn evaluate(documents: Vec<Document>, query: &QuerySpec) -> Vec<Document> {
    let mut results: Vec<Document> = documents
        .into_iter()
        .filter(|doc| {
            query
                .filters
                .iter()
                .all(|clause| clause_matches(&doc.fields, clause))
        })
        .collect();

    if let Some(order) = &query.order_by {
        results.retain(|doc| lookup_path(&doc.fields, &order.field).is_some());
        results.sort_by(|a, b| {
            let ordering = match (
                lookup_path(&a.fields, &order.field),
                lookup_path(&b.fields, &order.field),
            ) {
                (Some(left), Some(right)) => left.total_cmp(right),
                _ => std::cmp::Ordering::Equal,
            }
            .then_with(|| a.id.cmp(&b.id));
            match order.direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        });
    }

    if let Some(limit) = query.limit {
        results.truncate(limit as usize);
    }

    results
}

#[async_trait]
impl DocumentStore for MemoryStore {
    #[inline]
    async fn list_collections(&self) -> Result<Vec<CollectionRef>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .iter()
            .filter(|(_, documents)| !documents.is_empty())
            .map(|(name, _)| CollectionRef { name: name.clone() })
            .collect())
    }

    #[inline]
    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let collection = collection_path(collection)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|documents| into_documents(documents.iter()))
            .unwrap_or_default())
    }

    #[inline]
    async fn create_document(
        &self,
        collection: &str,
        fields: FieldMap,
        document_id: Option<&str>,
    ) -> Result<String, StoreError> {
        let collection = collection_path(collection)?;
        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();

        let id = match document_id {
            Some(id) if documents.contains_key(id) => {
                return Err(StoreError::Operation {
                    status: "ALREADY_EXISTS".to_string(),
                    message: format!("Document already exists: {}/{}", collection, id),
                });
            }
            Some(id) if id.is_empty() || id.contains('/') => {
                return Err(StoreError::invalid_argument(format!(
                    "Invalid document id '{}'",
                    id
                )));
            }
            Some(id) => id.to_string(),
            None => Self::generate_id(),
        };

        documents.insert(id.clone(), fields);
        debug!("Stored document {}/{} in memory", collection, id);
        Ok(id)
    }

    #[inline]
    async fn run_query(&self, query: &QuerySpec) -> Result<Vec<Document>, StoreError> {
        let collection = collection_path(&query.collection)?;
        let documents = {
            let collections = self.collections.read().await;
            collections
                .get(collection)
                .map(|documents| into_documents(documents.iter()))
                .unwrap_or_default()
        };
        Ok(evaluate(documents, query))
    }
}
