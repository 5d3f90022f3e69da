//! GraphQL transport (spec.md §4.2.8).

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::auth::{apply_http_auth, OAuthTokenCache};
use crate::error::{Error, Result};
use crate::model::{GraphQlOperation, GraphQlProvider, Provider, Tool};
use crate::stream::{SliceStreamResult, StreamResult};

use super::Transport;

/// `graphql` transport.
pub struct GraphQlTransport {
    client: Client,
    oauth: OAuthTokenCache,
}

impl GraphQlTransport {
    /// Build a transport using a default reqwest client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            oauth: OAuthTokenCache::new(),
        }
    }

    fn as_graphql<'p>(provider: &'p Provider) -> Result<&'p GraphQlProvider> {
        match provider {
            Provider::GraphQl(p) => Ok(p),
            _ => Err(Error::WrongProviderKind("expected a graphql provider".to_string())),
        }
    }

    fn enforce_allowed_origin(url: &str) -> Result<()> {
        let allowed = url.starts_with("https://")
            || url.starts_with("http://localhost")
            || url.starts_with("http://127.0.0.1");
        if allowed {
            Ok(())
        } else {
            Err(Error::SecurityViolation(format!(
                "graphql endpoint must be https, localhost, or 127.0.0.1: {url}"
            )))
        }
    }

    async fn post_graphql(&self, p: &GraphQlProvider, query: &str, variables: Value) -> Result<Value> {
        let mut request = self
            .client
            .post(&p.url)
            .json(&serde_json::json!({ "query": query, "variables": variables }));
        for (k, v) in &p.headers {
            request = request.header(k, v);
        }
        if let Some(auth) = &p.auth {
            request = apply_http_auth(request, auth, &self.client, &self.oauth).await?;
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("HTTP {status}: {text}")));
        }
        let mut body: Value = response.json().await?;
        if let Some(errors) = body.get("errors") {
            if errors.as_array().is_some_and(|a| !a.is_empty()) {
                return Err(Error::Protocol(format!("graphql errors: {errors}")));
            }
        }
        Ok(body["data"].take())
    }

    fn infer_arg_type(value: &Value) -> &'static str {
        match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
            Value::Number(_) => "Float",
            Value::Bool(_) => "Boolean",
            Value::String(_) => "String",
            _ => "JSON",
        }
    }

    /// Build the operation document and its companion `variables` object.
    /// GraphQL variable references (`$name`) are useless without a
    /// `"variables"` map supplying their values alongside the query.
    fn build_operation(
        &self,
        local: &str,
        args: &HashMap<String, Value>,
        op: GraphQlOperation,
    ) -> (String, Value) {
        let keyword = match op {
            GraphQlOperation::Query => "query",
            GraphQlOperation::Mutation => "mutation",
            GraphQlOperation::Subscription => "subscription",
        };
        if args.is_empty() {
            return (format!("{keyword} {{ {local} }}"), Value::Null);
        }

        let mut var_decls = Vec::with_capacity(args.len());
        let mut variables = serde_json::Map::with_capacity(args.len());
        for (k, value) in args {
            let wrapper = value
                .as_object()
                .filter(|o| o.contains_key("graphql_type") && o.contains_key("value"));
            let (ty, actual) = wrapper.map_or_else(
                || (Self::infer_arg_type(value).to_string(), value.clone()),
                |o| {
                    (
                        o["graphql_type"].as_str().unwrap_or("JSON").to_string(),
                        o["value"].clone(),
                    )
                },
            );
            var_decls.push(format!("${k}: {ty}"));
            variables.insert(k.clone(), actual);
        }
        let call_args: Vec<String> = args.keys().map(|k| format!("{k}: ${k}")).collect();

        (
            format!(
                "{keyword}({vars}) {{ {local}({call_args}) }}",
                vars = var_decls.join(", "),
                call_args = call_args.join(", ")
            ),
            Value::Object(variables),
        )
    }
}

impl Default for GraphQlTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for GraphQlTransport {
    async fn register(&self, provider: &Provider) -> Result<Vec<Tool>> {
        let p = Self::as_graphql(provider)?;
        Self::enforce_allowed_origin(&p.url)?;

        let introspection = r#"query { __schema {
            queryType { fields { name description } }
            mutationType { fields { name description } }
            subscriptionType { fields { name description } }
        } }"#;
        let data = self.post_graphql(p, introspection, Value::Null).await?;
        let schema = &data["__schema"];
        let mut tools = Vec::new();
        for key in ["queryType", "mutationType", "subscriptionType"] {
            if let Some(fields) = schema[key]["fields"].as_array() {
                for field in fields {
                    let name = field["name"].as_str().unwrap_or_default();
                    let description = field["description"].as_str().unwrap_or_default();
                    tools.push(Tool::new(name, description));
                }
            }
        }
        Ok(tools)
    }

    async fn deregister(&self, provider: &Provider) -> Result<()> {
        Self::as_graphql(provider)?;
        Ok(())
    }

    async fn call(&self, name: &str, args: HashMap<String, Value>, provider: &Provider) -> Result<Value> {
        let p = Self::as_graphql(provider)?;
        Self::enforce_allowed_origin(&p.url)?;
        let local = name.split_once('.').map_or(name, |(_, l)| l);
        let (operation, variables) = self.build_operation(local, &args, p.operation_type);
        self.post_graphql(p, &operation, variables).await
    }

    async fn call_stream(
        &self,
        name: &str,
        args: HashMap<String, Value>,
        provider: &Provider,
    ) -> Result<Box<dyn StreamResult>> {
        let value = self.call(name, args, provider).await?;
        Ok(Box::new(SliceStreamResult::new(vec![value])))
    }
}
