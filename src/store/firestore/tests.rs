use super::*;
use crate::store::query::{Direction, FilterOp};
use crate::store::value::DocumentValue;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_partial_json, header, method, path, query_param},
};

const ROOT: &str = "/v1/projects/demo/databases/(default)/documents";
const NAME_PREFIX: &str = "projects/demo/databases/(default)/documents";

fn client_for(server: &MockServer) -> FirestoreClient {
    let config = FirebaseConfig {
        api_key: Some("test-key".to_string()),
        project_id: Some("demo".to_string()),
        emulator_host: Some(server.address().to_string()),
        timeout_secs: 5,
        ..FirebaseConfig::default()
    };
    FirestoreClient::new(&config).expect("client should build")
}

#[test]
fn collection_paths_split_at_the_last_segment() {
    assert_eq!(
        split_collection_path("users").expect("valid"),
        (None, "users")
    );
    assert_eq!(
        split_collection_path("/users/ann/orders/").expect("valid"),
        (Some("users/ann"), "orders")
    );
    assert!(split_collection_path("//").is_err());
    assert!(split_collection_path("users//orders").is_err());
    assert_eq!(
        split_collection_path("users/ann"),
        Err(StoreError::Operation {
            status: "INVALID_ARGUMENT".to_string(),
            message: "'users/ann' is a document path, not a collection".to_string(),
        })
    );
}

#[test]
fn error_bodies_are_parsed() {
    let envelope = r#"{"error": {"code": 404, "message": "no such database", "status": "NOT_FOUND"}}"#;
    assert_eq!(
        error_from_body(404, envelope),
        StoreError::Operation {
            status: "NOT_FOUND".to_string(),
            message: "no such database".to_string(),
        }
    );

    assert_eq!(
        error_from_body(502, " bad gateway\n"),
        StoreError::Operation {
            status: "HTTP 502".to_string(),
            message: "bad gateway".to_string(),
        }
    );
}

#[tokio::test]
async fn list_collections_follows_page_tokens() {
    let server = MockServer::start().await;
    let endpoint = format!("{}:listCollectionIds", ROOT);

    Mock::given(method("POST"))
        .and(path(endpoint.as_str()))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(json!({"pageToken": "page-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collectionIds": ["users"]
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(endpoint.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collectionIds": ["audit", "orders"],
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let names: Vec<String> = client_for(&server)
        .list_collections()
        .await
        .expect("listing should succeed")
        .into_iter()
        .map(|c| c.name)
        .collect();

    assert_eq!(names, ["audit", "orders", "users"]);
}

#[tokio::test]
async fn empty_project_lists_no_collections() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{}:listCollectionIds", ROOT).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let collections = client_for(&server)
        .list_collections()
        .await
        .expect("listing should succeed");
    assert!(collections.is_empty());
}

#[tokio::test]
async fn list_documents_decodes_every_page() {
    let server = MockServer::start().await;
    let users = format!("{}/users", ROOT);

    Mock::given(method("GET"))
        .and(path(users.as_str()))
        .and(query_param("pageToken", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [{
                "name": format!("{}/users/bob", NAME_PREFIX),
                "fields": {"age": {"integerValue": "17"}}
            }]
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(users.as_str()))
        .and(query_param("pageSize", "300"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [{
                "name": format!("{}/users/ann", NAME_PREFIX),
                "fields": {
                    "name": {"stringValue": "Ann"},
                    "manager": {"referenceValue": format!("{}/users/bob", NAME_PREFIX)}
                }
            }],
            "nextPageToken": "next"
        })))
        .mount(&server)
        .await;

    let documents = client_for(&server)
        .list_documents("users")
        .await
        .expect("listing should succeed");

    assert_eq!(documents.len(), 2);
    assert_eq!(
        documents[0].to_json(),
        json!({"id": "ann", "data": {"name": "Ann", "manager": "users/bob"}})
    );
    assert_eq!(documents[1].fields["age"], DocumentValue::Integer(17));
}

#[tokio::test]
async fn subcollections_are_addressed_by_path() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{}/users/ann/orders", ROOT).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let documents = client_for(&server)
        .list_documents("users/ann/orders")
        .await
        .expect("listing should succeed");
    assert!(documents.is_empty());
}

#[tokio::test]
async fn document_paths_are_rejected_before_any_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{}/users/ann", ROOT).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("{}/users/ann", NAME_PREFIX),
            "fields": {"name": {"stringValue": "Ann"}}
        })))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let error = client
        .list_documents("users/ann")
        .await
        .expect_err("a document path is not a collection");
    assert!(matches!(error, StoreError::Operation { ref status, .. } if status == "INVALID_ARGUMENT"));

    assert!(
        client
            .run_query(&QuerySpec::new("users/ann"))
            .await
            .is_err()
    );
    assert!(
        client
            .create_document("users/ann", FieldMap::new(), None)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn create_document_returns_the_server_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{}/notes", ROOT).as_str()))
        .and(body_json(json!({
            "fields": {"title": {"stringValue": "hello"}, "views": {"integerValue": "3"}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("{}/notes/Gx81kQ2mZ0pLr7aB4cDe", NAME_PREFIX),
            "fields": {"title": {"stringValue": "hello"}, "views": {"integerValue": "3"}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut fields = FieldMap::new();
    fields.insert("title".to_string(), DocumentValue::String("hello".to_string()));
    fields.insert("views".to_string(), DocumentValue::Integer(3));

    let id = client_for(&server)
        .create_document("notes", fields, None)
        .await
        .expect("create should succeed");
    assert_eq!(id, "Gx81kQ2mZ0pLr7aB4cDe");
}

#[tokio::test]
async fn create_document_with_explicit_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{}/notes", ROOT).as_str()))
        .and(query_param("documentId", "first"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("{}/notes/first", NAME_PREFIX)
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = client_for(&server)
        .create_document("notes", FieldMap::new(), Some("first"))
        .await
        .expect("create should succeed");
    assert_eq!(id, "first");
}

#[tokio::test]
async fn run_query_posts_structured_query() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{}:runQuery", ROOT).as_str()))
        .and(body_json(json!({
            "structuredQuery": {
                "from": [{"collectionId": "users"}],
                "where": {"fieldFilter": {
                    "field": {"fieldPath": "age"},
                    "op": "GREATER_THAN",
                    "value": {"integerValue": "18"}
                }},
                "orderBy": [{"field": {"fieldPath": "age"}, "direction": "DESCENDING"}],
                "limit": 5
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "document": {
                    "name": format!("{}/users/dan", NAME_PREFIX),
                    "fields": {"age": {"integerValue": "41"}}
                },
                "readTime": "2024-03-09T14:30:00Z"
            },
            {
                "document": {
                    "name": format!("{}/users/ann", NAME_PREFIX),
                    "fields": {"age": {"integerValue": "34"}}
                },
                "readTime": "2024-03-09T14:30:00Z"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let query = QuerySpec::new("users")
        .filter("age", FilterOp::GreaterThan, DocumentValue::Integer(18))
        .order_by("age", Direction::Descending)
        .limit(5);

    let ids: Vec<String> = client_for(&server)
        .run_query(&query)
        .await
        .expect("query should succeed")
        .into_iter()
        .map(|doc| doc.id)
        .collect();
    assert_eq!(ids, ["dan", "ann"]);
}

#[tokio::test]
async fn run_query_without_matches_skips_read_time_entries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{}/users/ann:runQuery", ROOT).as_str()))
        .and(body_partial_json(json!({
            "structuredQuery": {"from": [{"collectionId": "orders"}]}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"readTime": "2024-03-09T14:30:00Z"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let documents = client_for(&server)
        .run_query(&QuerySpec::new("users/ann/orders"))
        .await
        .expect("query should succeed");
    assert!(documents.is_empty());
}

#[tokio::test]
async fn error_envelope_becomes_operation_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!("{}/secrets", ROOT).as_str()))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": 403,
                "message": "Missing or insufficient permissions.",
                "status": "PERMISSION_DENIED"
            }
        })))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .list_documents("secrets")
        .await
        .expect_err("request should fail");

    assert_eq!(
        error,
        StoreError::Operation {
            status: "PERMISSION_DENIED".to_string(),
            message: "Missing or insufficient permissions.".to_string(),
        }
    );
    assert_eq!(
        error.to_string(),
        "PERMISSION_DENIED: Missing or insufficient permissions."
    );
}

#[tokio::test]
async fn access_token_is_sent_as_bearer() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("{}:listCollectionIds", ROOT).as_str()))
        .and(header("Authorization", "Bearer emulator-owner"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"collectionIds": ["users"]})))
        .expect(1)
        .mount(&server)
        .await;

    let config = FirebaseConfig {
        api_key: Some("test-key".to_string()),
        project_id: Some("demo".to_string()),
        emulator_host: Some(server.address().to_string()),
        access_token: Some("emulator-owner".to_string()),
        ..FirebaseConfig::default()
    };
    let client = FirestoreClient::new(&config).expect("client should build");

    let collections = client.list_collections().await.expect("listing should succeed");
    assert_eq!(collections.len(), 1);
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let config = FirebaseConfig {
        api_key: Some("test-key".to_string()),
        project_id: Some("demo".to_string()),
        // Port 9 (discard) is not expected to accept HTTP connections
        emulator_host: Some("127.0.0.1:9".to_string()),
        timeout_secs: 2,
        ..FirebaseConfig::default()
    };
    let client = FirestoreClient::new(&config).expect("client should build");

    let error = client
        .list_collections()
        .await
        .expect_err("request should fail");
    assert!(matches!(error, StoreError::Transport(_)));
}
