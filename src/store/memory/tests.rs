use super::*;
use crate::store::value::fields_from_json;
use serde_json::{Value, json};

fn fields(value: Value) -> FieldMap {
    fields_from_json(value.as_object().cloned().expect("fixture is an object"))
}

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    let people = [
        ("ann", json!({"name": "Ann", "age": 34, "city": "NYC", "tags": ["admin", "ops"]})),
        ("bob", json!({"name": "Bob", "age": 17, "city": "NYC"})),
        ("cat", json!({"name": "Cat", "age": 25, "city": "LA", "tags": ["ops"]})),
        ("dan", json!({"name": "Dan", "age": 41, "city": "NYC"})),
        ("eve", json!({"name": "Eve", "city": "NYC", "address": {"zip": "10001"}})),
    ];
    for (id, data) in people {
        store
            .create_document("users", fields(data), Some(id))
            .await
            .expect("seed document");
    }
    store
}

async fn ids(store: &MemoryStore, query: &QuerySpec) -> Vec<String> {
    store
        .run_query(query)
        .await
        .expect("query should succeed")
        .into_iter()
        .map(|doc| doc.id)
        .collect()
}

#[tokio::test]
async fn generated_ids_are_unique_and_sized() {
    let store = MemoryStore::new();
    let first = store
        .create_document("notes", FieldMap::new(), None)
        .await
        .expect("create");
    let second = store
        .create_document("notes", FieldMap::new(), None)
        .await
        .expect("create");

    assert_eq!(first.len(), GENERATED_ID_LENGTH);
    assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
    assert_ne!(first, second);
    assert_eq!(
        store.list_documents("notes").await.expect("list").len(),
        2
    );
}

#[tokio::test]
async fn explicit_duplicate_id_is_rejected() {
    let store = seeded_store().await;
    let error = store
        .create_document("users", FieldMap::new(), Some("ann"))
        .await
        .expect_err("duplicate id");

    assert!(matches!(error, StoreError::Operation { ref status, .. } if status == "ALREADY_EXISTS"));
}

#[tokio::test]
async fn document_paths_are_not_collections() {
    let store = seeded_store().await;

    let error = store
        .list_documents("users/ann")
        .await
        .expect_err("even segment count names a document");
    assert_eq!(
        error.to_string(),
        "INVALID_ARGUMENT: 'users/ann' is a document path, not a collection"
    );
    assert!(store.run_query(&QuerySpec::new("users/ann")).await.is_err());
    assert!(
        store
            .create_document("users/ann", FieldMap::new(), None)
            .await
            .is_err()
    );

    store
        .create_document("/users/ann/orders/", FieldMap::new(), Some("o1"))
        .await
        .expect("subcollection create");
    let orders = store
        .list_documents("users/ann/orders")
        .await
        .expect("subcollection list");
    assert_eq!(orders.len(), 1);
}

#[tokio::test]
async fn collections_are_listed_by_name() {
    let store = seeded_store().await;
    store
        .create_document("audit", FieldMap::new(), None)
        .await
        .expect("create");

    let names: Vec<_> = store
        .list_collections()
        .await
        .expect("list")
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, ["audit", "users"]);
}

#[tokio::test]
async fn filters_are_anded() {
    let store = seeded_store().await;
    let query = QuerySpec::new("users")
        .filter("age", FilterOp::GreaterThan, DocumentValue::Integer(18))
        .filter(
            "city",
            FilterOp::Equal,
            DocumentValue::String("NYC".to_string()),
        );

    assert_eq!(ids(&store, &query).await, ["ann", "dan"]);
}

#[tokio::test]
async fn ordering_drops_documents_without_the_field() {
    let store = seeded_store().await;
    let descending = QuerySpec::new("users").order_by("age", Direction::Descending);
    let ascending = QuerySpec::new("users").order_by("age", Direction::Ascending);

    assert_eq!(ids(&store, &descending).await, ["dan", "ann", "cat", "bob"]);
    assert_eq!(ids(&store, &ascending).await, ["bob", "cat", "ann", "dan"]);
}

#[tokio::test]
async fn limit_applies_after_ordering() {
    let store = seeded_store().await;
    let query = QuerySpec::new("users")
        .order_by("age", Direction::Descending)
        .limit(2);
    assert_eq!(ids(&store, &query).await, ["dan", "ann"]);

    let unordered = QuerySpec::new("users").limit(2);
    assert_eq!(ids(&store, &unordered).await, ["ann", "bob"]);

    let none = QuerySpec::new("users").limit(0);
    assert!(ids(&store, &none).await.is_empty());
}

#[tokio::test]
async fn not_equal_skips_missing_fields() {
    let store = seeded_store().await;
    let query = QuerySpec::new("users").filter(
        "age",
        FilterOp::NotEqual,
        DocumentValue::Integer(17),
    );

    assert_eq!(ids(&store, &query).await, ["ann", "cat", "dan"]);
}

#[tokio::test]
async fn array_and_membership_operators() {
    let store = seeded_store().await;
    let ops = DocumentValue::String("ops".to_string());

    let contains = QuerySpec::new("users").filter("tags", FilterOp::ArrayContains, ops);
    assert_eq!(ids(&store, &contains).await, ["ann", "cat"]);

    let any = QuerySpec::new("users").filter(
        "tags",
        FilterOp::ArrayContainsAny,
        DocumentValue::Array(vec![DocumentValue::String("admin".to_string())]),
    );
    assert_eq!(ids(&store, &any).await, ["ann"]);

    let cities = DocumentValue::Array(vec![DocumentValue::String("LA".to_string())]);
    let within = QuerySpec::new("users").filter("city", FilterOp::In, cities.clone());
    assert_eq!(ids(&store, &within).await, ["cat"]);

    let outside = QuerySpec::new("users").filter("city", FilterOp::NotIn, cities);
    assert_eq!(ids(&store, &outside).await, ["ann", "bob", "dan", "eve"]);
}

#[tokio::test]
async fn nested_field_paths_filter() {
    let store = seeded_store().await;
    let query = QuerySpec::new("users").filter(
        "address.zip",
        FilterOp::Equal,
        DocumentValue::String("10001".to_string()),
    );

    assert_eq!(ids(&store, &query).await, ["eve"]);
}

#[tokio::test]
async fn type_mismatch_never_matches() {
    let store = seeded_store().await;
    let query = QuerySpec::new("users").filter(
        "age",
        FilterOp::GreaterThan,
        DocumentValue::String("18".to_string()),
    );

    assert!(ids(&store, &query).await.is_empty());
}
