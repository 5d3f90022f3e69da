//! GraphQL transport scenario (spec.md §8, scenario 7: "GraphQL rejection"):
//! a non-HTTPS, non-localhost endpoint is rejected before any request is
//! sent; an allowed origin proceeds normally.

use std::collections::HashMap;

use utcp::model::{GraphQlOperation, GraphQlProvider, Provider};
use utcp::variables::VariableResolver;
use utcp::UtcpClient;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn graphql_provider(name: &str, url: String) -> Provider {
    Provider::GraphQl(GraphQlProvider {
        name: name.to_string(),
        url,
        operation_type: GraphQlOperation::Query,
        auth: None,
        headers: HashMap::new(),
    })
}

#[tokio::test]
async fn rejects_non_https_non_localhost_endpoint() {
    let client = UtcpClient::new(VariableResolver::new());
    let err = client
        .register_provider(graphql_provider("evil", "http://evil.example/graphql".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, utcp::Error::SecurityViolation(_)));
}

#[tokio::test]
async fn allows_localhost_endpoint_and_converts_schema_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "__schema": {
                    "queryType": {"fields": [{"name": "add", "description": "adds numbers"}]},
                    "mutationType": null,
                    "subscriptionType": null
                }
            }
        })))
        .mount(&server)
        .await;

    // wiremock binds to 127.0.0.1, which the transport explicitly allows.
    let client = UtcpClient::new(VariableResolver::new());
    let tools = client
        .register_provider(graphql_provider("local", server.uri()))
        .await
        .unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "local.add");
}
