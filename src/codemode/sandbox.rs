//! The embedded sandbox interpreter (spec.md §4.4.1), built on `rhai` — the
//! same crate the upstream `rs-utcp` reference client depends on for this
//! exact purpose (its manifest lists `rhai = { features = ["serde"] }` and
//! ships a `codemode_execution` benchmark).
//!
//! Rhai has no bare `{...}` object-map literal (it needs `#{...}`) and no
//! `:=` walrus operator, so the preprocessing rules spec.md describes for a
//! Go-shaped target language are re-expressed here in Rhai's own idiom: a
//! whole-snippet JSON object is parsed and re-rendered as a `#{...}` map
//! literal rather than textually patched, and `__out :=`/`let __out`
//! redeclarations are normalized to a plain `__out =` assignment against
//! the `let __out = ();` the wrapper already declares.

use std::sync::Arc;
use std::time::Duration;

use rhai::{Dynamic, Engine, Map, Scope};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crate::client::UtcpClient;
use crate::error::{Error, Result};

/// Outcome of one sandboxed execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub value: Value,
    pub stdout: String,
    pub stderr: String,
}

fn json_to_rhai_literal(value: &Value) -> String {
    match value {
        Value::Null => "()".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(json_to_rhai_literal).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k:?}: {}", json_to_rhai_literal(v)))
                .collect();
            format!("#{{{}}}", inner.join(", "))
        }
    }
}

fn strip_out_redeclaration(line: &str) -> String {
    let leading_ws: String = line.chars().take_while(|c| c.is_whitespace()).collect();
    let body = line.trim_start();
    if let Some(rest) = body.strip_prefix("let __out") {
        return format!("{leading_ws}__out{rest}");
    }
    if let Some(rest) = body.strip_prefix("__out :=") {
        return format!("{leading_ws}__out ={rest}");
    }
    if let Some(rest) = body.strip_prefix("__out:=") {
        return format!("{leading_ws}__out ={rest}");
    }
    line.to_string()
}

/// Apply the rewrite rules spec.md §4.4.1 "Preprocessing" describes.
fn preprocess(snippet: &str) -> String {
    let trimmed = snippet.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return format!("__out = {};", json_to_rhai_literal(&value));
        }
    }

    if !trimmed.contains("__out") {
        return format!("__out = {trimmed};");
    }

    let mut rewritten = String::with_capacity(trimmed.len());
    for line in trimmed.lines() {
        rewritten.push_str(&strip_out_redeclaration(line));
        rewritten.push('\n');
    }
    rewritten
}

/// Wrap the preprocessed body the way spec.md's "Wrapping" step describes:
/// a `__out` binding visible before and after the user snippet runs.
fn wrap(body: &str) -> String {
    format!("let __out = ();\n{body}\n__out")
}

fn dynamic_to_json(value: Dynamic) -> Value {
    rhai::serde::from_dynamic(&value).unwrap_or(Value::Null)
}

/// A `rhai`-callable handle onto a client, used by the injected
/// `codemode::*` helper functions. Blocking calls into the async client are
/// bridged with `Handle::block_on`, valid here because every execution runs
/// inside a `spawn_blocking` task, never on a runtime worker thread.
#[derive(Clone)]
pub struct ClientHandle {
    client: Arc<UtcpClient>,
    runtime: tokio::runtime::Handle,
}

impl ClientHandle {
    #[must_use]
    pub fn new(client: Arc<UtcpClient>, runtime: tokio::runtime::Handle) -> Self {
        Self { client, runtime }
    }

    fn call_tool(&self, name: &str, args: Map) -> std::result::Result<Dynamic, Box<rhai::EvalAltResult>> {
        let args_value = dynamic_to_json(args.into());
        let args_map = match args_value {
            Value::Object(m) => m.into_iter().collect(),
            _ => std::collections::HashMap::new(),
        };
        let client = Arc::clone(&self.client);
        let name = name.to_string();
        let result = self
            .runtime
            .block_on(async move { client.call(&name, args_map).await })
            .map_err(|e| rhai::EvalAltResult::ErrorRuntime(e.to_string().into(), rhai::Position::NONE))?;
        rhai::serde::to_dynamic(result).map_err(|e| e.into())
    }

    fn search_tools(&self, query: &str, limit: rhai::INT) -> Dynamic {
        let tools = self.client.search(query, Some(limit.max(0) as usize));
        let names: Vec<Dynamic> = tools.into_iter().map(|t| Dynamic::from(t.name)).collect();
        Dynamic::from(names)
    }
}

/// Pending, not-yet-drained output of a `call_stream` invocation from
/// inside a snippet; exposes `.next()` to Rhai, matching spec.md's
/// `CallToolStream` returning a wrapper with a `Next()` method.
#[derive(Clone)]
pub struct CodeModeStream {
    inner: Arc<AsyncMutex<Box<dyn crate::stream::StreamResult>>>,
    runtime: tokio::runtime::Handle,
}

impl CodeModeStream {
    fn next(&mut self) -> Dynamic {
        let inner = Arc::clone(&self.inner);
        let item = self.runtime.block_on(async move {
            let mut stream = inner.lock().await;
            stream.next().await
        });
        match item {
            Ok(Some(v)) => rhai::serde::to_dynamic(v).unwrap_or(Dynamic::UNIT),
            _ => Dynamic::UNIT,
        }
    }
}

/// Builds the `rhai::Engine` once per plugin instance and runs snippets
/// against it under a wall-clock deadline.
pub struct Sandbox {
    engine: Engine,
}

impl Sandbox {
    /// Build a sandbox exposing only the minimal stdlib surface plus the
    /// `codemode::*` helpers closing over `client`.
    #[must_use]
    pub fn new(client: Arc<UtcpClient>, runtime: tokio::runtime::Handle) -> Self {
        let mut engine = Engine::new();
        engine.set_max_expr_depths(64, 64);
        engine.set_max_operations(5_000_000);

        let handle = ClientHandle::new(client, runtime.clone());

        let call_tool_handle = handle.clone();
        engine.register_fn("call_tool", move |name: &str, args: Map| call_tool_handle.call_tool(name, args));

        let stream_handle = handle.clone();
        let stream_runtime = runtime.clone();
        engine.register_fn("call_tool_stream", move |name: &str, args: Map| {
            let args_value = dynamic_to_json(args.into());
            let args_map = match args_value {
                Value::Object(m) => m.into_iter().collect(),
                _ => std::collections::HashMap::new(),
            };
            let client = Arc::clone(&stream_handle.client);
            let name = name.to_string();
            let stream = stream_runtime
                .block_on(async move { client.call_stream(&name, args_map).await })
                .map_err(|e: Error| rhai::EvalAltResult::ErrorRuntime(e.to_string().into(), rhai::Position::NONE))?;
            Ok::<_, Box<rhai::EvalAltResult>>(CodeModeStream {
                inner: Arc::new(AsyncMutex::new(stream)),
                runtime: stream_runtime.clone(),
            })
        });
        engine.register_type_with_name::<CodeModeStream>("CodeModeStream");
        engine.register_fn("next", CodeModeStream::next);

        let search_handle = handle.clone();
        engine.register_fn("search_tools", move |query: &str, limit: rhai::INT| {
            search_handle.search_tools(query, limit)
        });

        engine.register_fn("sprintf", |template: &str, args: rhai::Array| {
            let mut out = template.to_string();
            for arg in args {
                out = out.replacen("%v", &arg.to_string(), 1);
            }
            out
        });
        engine.register_fn("errorf", |template: &str, args: rhai::Array| {
            let mut out = template.to_string();
            for arg in args {
                out = out.replacen("%v", &arg.to_string(), 1);
            }
            out
        });

        Self { engine }
    }

    /// Run `snippet` under `deadline`, returning its `{value, stdout,
    /// stderr}` triple. A non-empty stderr is surfaced to the caller as an
    /// error, per spec.md.
    pub async fn run(&self, snippet: &str, deadline: Duration) -> Result<ExecutionOutput> {
        let wrapped = wrap(&preprocess(snippet));
        let engine = self.engine.clone();

        let joined = tokio::time::timeout(
            deadline,
            tokio::task::spawn_blocking(move || {
                let mut scope = Scope::new();
                let result = engine.eval_with_scope::<Dynamic>(&mut scope, &wrapped);
                match result {
                    Ok(value) => ExecutionOutput {
                        value: dynamic_to_json(value),
                        stdout: String::new(),
                        stderr: String::new(),
                    },
                    Err(e) => ExecutionOutput {
                        value: Value::Null,
                        stdout: String::new(),
                        stderr: e.to_string(),
                    },
                }
            }),
        )
        .await
        .map_err(|_| Error::DeadlineExceeded)?
        .map_err(|e| Error::CodeExecution(format!("sandbox task panicked: {e}")))?;

        if !joined.stderr.is_empty() {
            return Err(Error::CodeExecution(joined.stderr));
        }
        Ok(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_literal_is_rewritten_to_assignment() {
        assert_eq!(preprocess(r#"{"needs": true}"#), "__out = #{\"needs\": true};");
    }

    #[test]
    fn missing_out_gets_prepended() {
        assert_eq!(preprocess("1 + 1"), "__out = 1 + 1;");
    }

    #[test]
    fn let_redeclaration_is_stripped() {
        let result = preprocess("let __out = 5;\n__out");
        assert!(result.starts_with("__out = 5;"));
    }

    #[test]
    fn walrus_style_assignment_is_normalized() {
        let result = preprocess("__out := 5\n__out");
        assert!(result.starts_with("__out = 5"));
    }

    #[tokio::test]
    async fn runs_a_trivial_expression() {
        let registry = crate::transport::TransportRegistry::new();
        let client = Arc::new(UtcpClient::with_parts(
            registry,
            crate::variables::VariableResolver::new(),
            crate::config::ClientConfig::default(),
            Box::new(crate::search::DefaultSearchStrategy::default()),
        ));
        let sandbox = Sandbox::new(client, tokio::runtime::Handle::current());
        let output = sandbox.run("1 + 1", Duration::from_millis(500)).await.unwrap();
        assert_eq!(output.value, Value::from(2));
    }
}
