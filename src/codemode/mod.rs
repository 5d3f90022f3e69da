//! LLM-driven orchestration plugin (spec.md §4.4): decides whether a prompt
//! needs tools, picks which ones, generates a sandboxed snippet calling
//! them, and executes it.

pub mod cache;
pub mod sandbox;

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::client::UtcpClient;
use crate::error::{Error, Result};
use crate::model::Tool;

use cache::TtlCache;
use sandbox::Sandbox;

/// Injected so the plugin is testable without a live model — tests supply a
/// scripted fake, the same role `wiremock` plays for the HTTP transports.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct NeedsCheck {
    #[serde(default)]
    needs: bool,
}

#[derive(Debug, Deserialize)]
struct Selection {
    #[serde(default)]
    tools: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SnippetPlan {
    code: String,
    #[serde(default)]
    stream: bool,
}

/// Scan `text` for the first balanced-brace JSON value, honoring string
/// literals and escape sequences, tolerating a fenced code block (` ```json`
/// or bare ` ``` `) and trailing prose after the closing brace (spec.md
/// §4.4 "LLM planner response robustness").
#[must_use]
pub fn extract_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Render the registered tool set as the compact listing used in prompt
/// templates.
fn render_tool_specs(tools: &[Tool]) -> String {
    tools
        .iter()
        .map(|t| format!("- {}: {}", t.name, t.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn selection_cache_key(query: &str, rendered_tools: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update(b"\n---\n");
    hasher.update(rendered_tools.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// `{value, stdout, stderr}` per spec.md §4.4.1, plus whether tools were
/// judged necessary at all.
#[derive(Debug, Clone)]
pub struct CodeModeResult {
    pub needs_tools: bool,
    pub value: Value,
    pub stdout: String,
    pub stderr: String,
}

/// One step of a `call_codemode_chain` execution (spec.md §4.4.1 "Support
/// for chained execution"): an inline sandbox snippet, an external-language
/// invocation, or a nested UTCP tool call.
#[derive(Debug, Clone)]
pub enum CodeModeStep {
    /// Run `code` through the sandbox interpreter, same as `call_tool`'s
    /// generated snippets.
    Code {
        code: String,
        #[allow(dead_code)]
        stream: bool,
    },
    /// Spawn `language` (e.g. `"python3"`, `"node"`) against `path/file` and
    /// capture its stdout, subject to the step's deadline.
    External { language: String, path: String, file: String },
    /// Call a registered UTCP tool directly, bypassing the LLM planner.
    ToolCall {
        tool_name: String,
        inputs: HashMap<String, Value>,
    },
}

/// Outcome of one `CodeModeStep`. External-language steps get two failure
/// modes distinct from an ordinary error: a step that looks like it started
/// a server instead of terminating, and one that simply ran out of time
/// (spec.md §4.4.1).
#[derive(Debug, Clone)]
pub enum ChainStepOutcome {
    /// The step completed and produced a value.
    Value(Value),
    /// The external process wrote a "Listening on"-shaped line on or past
    /// its deadline — almost always a hallucinated server instead of a
    /// one-shot script. The process was killed.
    ServerDetected,
    /// The step's deadline elapsed with no server-like output. The process
    /// was killed.
    TimeoutReached,
}

/// Marker substring spec.md §4.4.1 calls out as the heuristic for "this
/// external step accidentally started a server instead of finishing".
const SERVER_MARKER: &str = "Listening on";

async fn run_external_step(language: &str, path: &str, file: &str, deadline: Duration) -> Result<ChainStepOutcome> {
    let script = std::path::Path::new(path).join(file);
    let mut child = tokio::process::Command::new(language)
        .arg(&script)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::CodeExecution(format!("spawning external codemode step: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::CodeExecution("external codemode step has no stdout".to_string()))?;
    let mut lines = BufReader::new(stdout).lines();
    let mut collected = String::new();

    let sleep = tokio::time::sleep(deadline);
    tokio::pin!(sleep);

    let outcome = loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(text)) => {
                        if text.contains(SERVER_MARKER) {
                            break ChainStepOutcome::ServerDetected;
                        }
                        collected.push_str(&text);
                        collected.push('\n');
                    }
                    Ok(None) => {
                        let trimmed = collected.trim();
                        let value = serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()));
                        break ChainStepOutcome::Value(value);
                    }
                    Err(e) => return Err(Error::CodeExecution(format!("reading external step output: {e}"))),
                }
            }
            () = &mut sleep => {
                break ChainStepOutcome::TimeoutReached;
            }
        }
    };

    if matches!(outcome, ChainStepOutcome::ServerDetected | ChainStepOutcome::TimeoutReached) {
        let _ = child.kill().await;
    } else {
        let _ = child.wait().await;
    }
    Ok(outcome)
}

/// The orchestration plugin: one instance per client, holding its own TTL
/// caches and sandbox.
pub struct CodeModePlugin {
    client: Arc<UtcpClient>,
    llm: Arc<dyn LlmClient>,
    sandbox: Sandbox,
    tool_specs_cache: Arc<TtlCache<(), String>>,
    selection_cache: Arc<TtlCache<String, Vec<String>>>,
    snippet_deadline: Duration,
}

impl CodeModePlugin {
    /// Build a plugin, reading cache TTLs from `client`'s config and
    /// spawning the background sweep tasks for both caches.
    #[must_use]
    pub fn new(client: Arc<UtcpClient>, llm: Arc<dyn LlmClient>, runtime: tokio::runtime::Handle) -> Self {
        let tool_specs_cache = Arc::new(TtlCache::new(Duration::from_secs(5 * 60)));
        let selection_cache = Arc::new(TtlCache::new(Duration::from_secs(2 * 60)));
        cache::spawn_cleanup(Arc::clone(&tool_specs_cache), Duration::from_secs(60));
        cache::spawn_cleanup(Arc::clone(&selection_cache), Duration::from_secs(60));

        let sandbox = Sandbox::new(Arc::clone(&client), runtime);
        Self {
            client,
            llm,
            sandbox,
            tool_specs_cache,
            selection_cache,
            snippet_deadline: Duration::from_millis(5000),
        }
    }

    fn rendered_tool_specs(&self) -> String {
        if let Some(cached) = self.tool_specs_cache.get(&()) {
            return cached;
        }
        let rendered = render_tool_specs(&self.client.manual().tools);
        self.tool_specs_cache.insert((), rendered.clone());
        rendered
    }

    async fn needs_tools(&self, prompt: &str, tool_specs: &str) -> Result<bool> {
        let rendered = self
            .llm
            .complete(&format!(
                "Decide if the following request needs tool calls. Respond with JSON {{\"needs\": bool}}.\n\nAvailable tools:\n{tool_specs}\n\nRequest: {prompt}"
            ))
            .await?;
        Ok(extract_json(&rendered)
            .and_then(|v| serde_json::from_value::<NeedsCheck>(v).ok())
            .map(|n| n.needs)
            .unwrap_or(false))
    }

    async fn select_tools(&self, prompt: &str, tool_specs: &str) -> Result<Vec<String>> {
        let key = selection_cache_key(prompt, tool_specs);
        if let Some(cached) = self.selection_cache.get(&key) {
            return Ok(cached);
        }
        let rendered = self
            .llm
            .complete(&format!(
                "Select which tools (by name) are needed. Respond with JSON {{\"tools\": [names...]}}.\n\nAvailable tools:\n{tool_specs}\n\nRequest: {prompt}"
            ))
            .await?;
        let selection = extract_json(&rendered)
            .and_then(|v| serde_json::from_value::<Selection>(v).ok())
            .map(|s| s.tools)
            .unwrap_or_default();
        self.selection_cache.insert(key, selection.clone());
        Ok(selection)
    }

    async fn generate_snippet(&self, prompt: &str, selected: &[String]) -> Result<SnippetPlan> {
        let rendered = self
            .llm
            .complete(&format!(
                "Generate a snippet (assign the result to __out) calling these tools via codemode::call_tool(name, args), codemode::call_tool_stream(name, args), codemode::search_tools(query, limit). Respond with JSON {{\"code\": \"...\", \"stream\": bool}}.\n\nSelected tools: {selected:?}\n\nRequest: {prompt}"
            ))
            .await?;
        let plan: SnippetPlan = extract_json(&rendered)
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| Error::CodeExecution("planner did not return a parseable snippet".to_string()))?;

        if !plan.code.contains("__out") {
            return Err(Error::CodeExecution("generated snippet never assigns __out".to_string()));
        }
        if plan.code.contains("map[value:") {
            return Err(Error::CodeExecution(
                "generated snippet contains the `map[value:` hallucination marker".to_string(),
            ));
        }
        Ok(plan)
    }

    /// Run the full needs-check → selection → snippet-generation →
    /// execution pipeline for `prompt` (spec.md §4.4 `CallTool`).
    pub async fn call_tool(&self, prompt: &str) -> Result<CodeModeResult> {
        let tool_specs = self.rendered_tool_specs();

        if !self.needs_tools(prompt, &tool_specs).await? {
            return Ok(CodeModeResult {
                needs_tools: false,
                value: Value::Null,
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        let selected = self.select_tools(prompt, &tool_specs).await?;
        if selected.is_empty() {
            return Ok(CodeModeResult {
                needs_tools: true,
                value: Value::Null,
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        let plan = self.generate_snippet(prompt, &selected).await?;
        let output = self.sandbox.run(&plan.code, self.snippet_deadline).await?;

        Ok(CodeModeResult {
            needs_tools: true,
            value: output.value,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Run a sequence of `CodeModeStep`s, each under its own slice of
    /// `overall_timeout` (split evenly across the steps, matching the main
    /// kernel's `call_chain` per-step deadline derivation). A step's
    /// cancellation or deadline does not stop the remaining steps — each
    /// runs independently with its own outcome (spec.md §4.4.1).
    pub async fn call_codemode_chain(
        &self,
        steps: &[CodeModeStep],
        overall_timeout: Duration,
    ) -> Result<Vec<ChainStepOutcome>> {
        let per_step = overall_timeout
            .checked_div(steps.len().max(1) as u32)
            .unwrap_or(overall_timeout);

        let mut outcomes = Vec::with_capacity(steps.len());
        for step in steps {
            let outcome = match step {
                CodeModeStep::Code { code, .. } => match self.sandbox.run(code, per_step).await {
                    Ok(output) => ChainStepOutcome::Value(output.value),
                    Err(Error::DeadlineExceeded) => ChainStepOutcome::TimeoutReached,
                    Err(e) => return Err(e),
                },
                CodeModeStep::External { language, path, file } => {
                    match run_external_step(language, path, file, per_step).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(language, path, file, error = %e, "codemode external step failed");
                            return Err(e);
                        }
                    }
                }
                CodeModeStep::ToolCall { tool_name, inputs } => {
                    match tokio::time::timeout(per_step, self.client.call(tool_name, inputs.clone())).await {
                        Ok(Ok(value)) => ChainStepOutcome::Value(value),
                        Ok(Err(e)) => return Err(e),
                        Err(_) => ChainStepOutcome::TimeoutReached,
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
