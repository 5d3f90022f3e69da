//! Best-effort OpenAPI → [`Manual`] conversion (spec.md §4.1 registration
//! step 4, §4.2.1 "Discovery").
//!
//! Grounded on the teacher's `capability/openapi.rs` `OpenApiSpec`/
//! `OpenApiOperation`/`OpenApiParameter` deserialization shapes, repurposed
//! from "emit capability YAML" to "emit UTCP tools directly": each
//! `(path, method)` operation becomes one [`Tool`], `operationId` (or a
//! `method_path` fallback) becomes its name, and parameters/request body
//! become its input schema.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::model::{Manual, Schema, Tool};

#[derive(Debug, Deserialize)]
struct OpenApiSpec {
    #[serde(default)]
    openapi: Option<String>,
    #[serde(default)]
    swagger: Option<String>,
    #[serde(default)]
    paths: HashMap<String, HashMap<String, OpenApiOperation>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenApiOperation {
    #[serde(default)]
    operation_id: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    parameters: Vec<OpenApiParameter>,
    #[serde(default)]
    request_body: Option<OpenApiRequestBody>,
}

#[derive(Debug, Deserialize)]
struct OpenApiParameter {
    name: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenApiRequestBody {
    content: HashMap<String, OpenApiMediaType>,
}

#[derive(Debug, Deserialize)]
struct OpenApiMediaType {
    schema: Option<Value>,
}

const HTTP_METHODS: &[&str] = &["get", "put", "post", "delete", "patch", "head", "options"];

/// Try to parse `raw` (a provider's discovery-endpoint body) as an OpenAPI
/// 3.x / Swagger 2.x document and convert it into a [`Manual`]. Returns
/// `None` when `raw` doesn't look like an OpenAPI document at all (neither
/// an `openapi` nor `swagger` top-level key) so callers can fall back to
/// treating the response as a native UTCP manual.
#[must_use]
pub fn try_convert(raw: &[u8]) -> Option<Manual> {
    let spec: OpenApiSpec = serde_json::from_slice(raw).ok()?;
    if spec.openapi.is_none() && spec.swagger.is_none() {
        return None;
    }
    Some(convert_spec(&spec))
}

/// Fetch `url` and attempt an OpenAPI conversion, swallowing any transport
/// or parse failure into `None` — the client kernel's registration
/// algorithm treats this purely as a probe and falls back to the HTTP
/// transport's own discovery call on anything but a tool-bearing manual
/// (spec.md §4.1 registration step 4).
pub async fn discover(client: &reqwest::Client, url: &str) -> Option<Manual> {
    let body = client.get(url).send().await.ok()?.bytes().await.ok()?;
    try_convert(&body)
}

fn convert_spec(spec: &OpenApiSpec) -> Manual {
    let mut tools = Vec::new();
    for (path, methods) in &spec.paths {
        for (method, op) in methods {
            if !HTTP_METHODS.contains(&method.to_lowercase().as_str()) {
                continue;
            }
            tools.push(convert_operation(path, method, op));
        }
    }
    tools.sort_by(|a, b| a.name.cmp(&b.name));
    Manual {
        version: "1.0".to_string(),
        name: None,
        tools,
    }
}

fn convert_operation(path: &str, method: &str, op: &OpenApiOperation) -> Tool {
    let name = op.operation_id.clone().unwrap_or_else(|| {
        format!("{method}_{path}", path = path.trim_matches('/').replace('/', "_"))
    });
    let description = op
        .summary
        .clone()
        .or_else(|| op.description.clone())
        .unwrap_or_else(|| format!("{} {}", method.to_uppercase(), path));

    let mut tool = Tool::new(name, description);
    tool.tags = op.tags.clone();
    tool.inputs = build_input_schema(&op.parameters, op.request_body.as_ref());
    tool
}

fn build_input_schema(params: &[OpenApiParameter], body: Option<&OpenApiRequestBody>) -> Schema {
    let mut properties = HashMap::new();
    let mut required = Vec::new();

    for param in params {
        let mut prop = param
            .schema
            .clone()
            .unwrap_or_else(|| serde_json::json!({"type": "string"}));
        if let (Some(desc), Some(obj)) = (&param.description, prop.as_object_mut()) {
            obj.insert("description".to_string(), Value::String(desc.clone()));
        }
        properties.insert(param.name.clone(), prop);
        if param.required {
            required.push(param.name.clone());
        }
    }

    if let Some(body) = body {
        if let Some(schema) = body.content.get("application/json").and_then(|m| m.schema.as_ref()) {
            if let Some(body_props) = schema.get("properties").and_then(Value::as_object) {
                for (key, value) in body_props {
                    properties.insert(key.clone(), value.clone());
                }
            }
            if let Some(body_required) = schema.get("required").and_then(Value::as_array) {
                for r in body_required {
                    if let Some(s) = r.as_str() {
                        required.push(s.to_string());
                    }
                }
            }
        }
    }

    Schema {
        schema_type: Some("object".to_string()),
        properties,
        required,
        title: None,
    }
}
