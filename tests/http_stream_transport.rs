//! End-to-end streamable (NDJSON) HTTP transport scenario (spec.md §4.2.3):
//! multiple whitespace-separated JSON values in one response body decode
//! into one stream item each, and a single value collapses `call` to unary.

use std::collections::HashMap;

use utcp::model::{HttpStreamProvider, Provider};
use utcp::variables::VariableResolver;
use utcp::UtcpClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_stream_provider(name: &str, url: String) -> Provider {
    Provider::HttpStream(HttpStreamProvider {
        name: name.to_string(),
        url,
        auth: None,
        headers: HashMap::new(),
        body_field: None,
    })
}

#[tokio::test]
async fn call_stream_decodes_ndjson_sequence() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "version": "1.0",
            "tools": [{"name": "progress"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tools/progress"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "{\"pct\": 10}\n{\"pct\": 50}\n{\"pct\": 100}\n",
            "application/x-ndjson",
        ))
        .mount(&server)
        .await;

    let client = UtcpClient::new(VariableResolver::new());
    client
        .register_provider(http_stream_provider("demo", format!("{}/tools", server.uri())))
        .await
        .unwrap();

    let mut stream = client.call_stream("demo.progress", HashMap::new()).await.unwrap();
    let mut items = Vec::new();
    while let Some(item) = stream.next().await.unwrap() {
        items.push(item);
    }

    assert_eq!(
        items,
        vec![
            serde_json::json!({"pct": 10}),
            serde_json::json!({"pct": 50}),
            serde_json::json!({"pct": 100}),
        ]
    );
}

#[tokio::test]
async fn single_value_response_collapses_to_unary_call() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "version": "1.0",
            "tools": [{"name": "once"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tools/once"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("{\"ok\": true}\n", "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let client = UtcpClient::new(VariableResolver::new());
    client
        .register_provider(http_stream_provider("demo", format!("{}/tools", server.uri())))
        .await
        .unwrap();

    let result = client.call("demo.once", HashMap::new()).await.unwrap();
    assert_eq!(result, serde_json::json!({"ok": true}));
}
