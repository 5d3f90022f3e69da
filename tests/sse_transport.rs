//! End-to-end SSE transport scenario (spec.md §4.2.2 / §8): a `call_stream`
//! against an `text/event-stream` response yields one item per event, and a
//! non-streaming JSON response collapses to a single item.

use std::collections::HashMap;

use utcp::model::{Provider, SseProvider};
use utcp::variables::VariableResolver;
use utcp::UtcpClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sse_provider(name: &str, url: String) -> Provider {
    Provider::Sse(SseProvider {
        name: name.to_string(),
        url,
        auth: None,
        headers: HashMap::new(),
        body_field: None,
        reconnect: false,
    })
}

#[tokio::test]
async fn call_stream_yields_one_item_per_event() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "version": "1.0",
            "tools": [{"name": "ticks"}]
        })))
        .mount(&server)
        .await;

    let body = "id: 1\ndata: {\"n\": 1}\n\nid: 2\ndata: {\"n\": 2}\n\n";
    Mock::given(method("POST"))
        .and(path("/tools/ticks"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(body, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let client = UtcpClient::new(VariableResolver::new());
    client
        .register_provider(sse_provider("demo", format!("{}/tools", server.uri())))
        .await
        .unwrap();

    let mut stream = client.call_stream("demo.ticks", HashMap::new()).await.unwrap();
    let mut items = Vec::new();
    while let Some(item) = stream.next().await.unwrap() {
        items.push(item);
    }
    stream.close().await;

    assert_eq!(items, vec![serde_json::json!({"n": 1}), serde_json::json!({"n": 2})]);
}

#[tokio::test]
async fn non_event_stream_response_falls_back_to_single_decode() {
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
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    let client = UtcpClient::new(VariableResolver::new());
    client
        .register_provider(sse_provider("demo", format!("{}/tools", server.uri())))
        .await
        .unwrap();

    let result = client.call("demo.once", HashMap::new()).await.unwrap();
    assert_eq!(result, serde_json::json!({"ok": true}));
}
