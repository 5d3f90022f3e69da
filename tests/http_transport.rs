//! End-to-end HTTP transport scenario (spec.md §8, scenario 1: "HTTP echo
//! tool"): register against a discovery endpoint, then call the discovered
//! tool and confirm the request shape and the decoded response.

use std::collections::HashMap;

use utcp::model::{HttpProvider, Provider};
use utcp::variables::VariableResolver;
use utcp::UtcpClient;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http_provider(name: &str, url: String) -> Provider {
    Provider::Http(HttpProvider {
        name: name.to_string(),
        http_method: "POST".to_string(),
        url,
        content_type: "application/json".to_string(),
        auth: None,
        headers: HashMap::new(),
        body_field: None,
        header_fields: Vec::new(),
    })
}

#[tokio::test]
async fn registers_and_calls_through_discovery() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "version": "1.0",
            "tools": [{"name": "echo", "description": "echoes its input"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tools/echo"))
        .and(body_json(serde_json::json!({"msg": "hi"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"msg": "hi"})))
        .mount(&server)
        .await;

    let client = UtcpClient::new(VariableResolver::new());
    let tools = client
        .register_provider(http_provider("demo", format!("{}/tools", server.uri())))
        .await
        .unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "demo.echo");

    let mut args = HashMap::new();
    args.insert("msg".to_string(), serde_json::json!("hi"));
    let result = client.call("demo.echo", args).await.unwrap();
    assert_eq!(result["msg"], "hi");
}

#[tokio::test]
async fn unknown_provider_is_rejected_before_any_request() {
    let client = UtcpClient::new(VariableResolver::new());
    let err = client.call("nope.tool", HashMap::new()).await.unwrap_err();
    assert!(matches!(err, utcp::Error::ToolNotFound(_)));
}

#[tokio::test]
async fn non_2xx_discovery_status_surfaces_as_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = UtcpClient::new(VariableResolver::new());
    let err = client
        .register_provider(http_provider("broken", format!("{}/tools", server.uri())))
        .await
        .unwrap_err();
    assert!(matches!(err, utcp::Error::Http(_)));
}
