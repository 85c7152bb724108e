use std::path::PathBuf;

use serde_json::json;

use super::*;

fn test_config() -> MilvusConfig {
    MilvusConfig {
        protocol: "https".to_string(),
        host: "milvus.example.com".to_string(),
        port: 19530,
        username: "admin".to_string(),
        password: "secret".to_string(),
        cert_path: PathBuf::from("does-not-exist.crt"),
    }
}

#[test]
fn client_configuration() {
    let client = MilvusClient::new(&test_config()).expect("Failed to create client");

    assert_eq!(client.base_url.host_str(), Some("milvus.example.com"));
    assert_eq!(client.base_url.port(), Some(19530));
    assert_eq!(client.auth_token, "admin:secret");
    assert_eq!(client.collection, "wiki_articles");
}

#[test]
fn search_request_serialization() {
    // Dyadic values survive the f32-to-f64 widening in serde_json unchanged.
    let vector = vec![0.5_f32, 0.25, 1.0];
    let request = SearchRequest {
        collection_name: "wiki_articles",
        data: vec![vector.as_slice()],
        anns_field: VECTOR_FIELD,
        limit: 5,
        output_fields: [TEXT_FIELD],
        search_params: SearchParams {
            metric_type: "L2",
            params: NprobeParams { nprobe: NPROBE },
        },
    };

    let value = serde_json::to_value(&request).expect("request should serialize");
    assert_eq!(
        value,
        json!({
            "collectionName": "wiki_articles",
            "data": [[0.5, 0.25, 1.0]],
            "annsField": "vector",
            "limit": 5,
            "outputFields": ["article_text"],
            "searchParams": {
                "metricType": "L2",
                "params": { "nprobe": 5 },
            },
        })
    );
}

#[test]
fn search_response_parsing_preserves_order() {
    let response: SearchResponse = serde_json::from_str(
        r#"{
            "code": 0,
            "data": [
                {"distance": 0.12, "article_text": "Paris is the capital of France."},
                {"distance": 0.48, "article_text": "France is in Europe."}
            ]
        }"#,
    )
    .expect("response should parse");

    assert_eq!(response.code, 0);
    assert_eq!(response.data.len(), 2);
    assert_eq!(response.data[0].text, "Paris is the capital of France.");
    assert_eq!(response.data[1].text, "France is in Europe.");
    assert!(response.data[0].distance <= response.data[1].distance);
}

#[test]
fn search_response_without_data() {
    let response: SearchResponse =
        serde_json::from_str(r#"{"code": 1100, "message": "collection not found"}"#)
            .expect("response should parse");

    assert_eq!(response.code, 1100);
    assert_eq!(response.message.as_deref(), Some("collection not found"));
    assert!(response.data.is_empty());
}

#[test]
fn status_response_parsing() {
    let status: StatusResponse =
        serde_json::from_str(r#"{"code": 0}"#).expect("response should parse");

    assert_eq!(status.code, 0);
    assert!(status.message.is_none());
}
