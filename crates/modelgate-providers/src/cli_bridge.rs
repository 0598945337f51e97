//! Adapters that drive a locally installed agent CLI (`claude`, `codex`).
//!
//! The conversation is flattened to a text prompt, piped to the CLI on
//! stdin, and the JSON the CLI prints is turned back into an
//! [`LlmResponse`]. The CLI runs in the configured workspace directory.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use modelgate_core::types::{LlmResponse, Message, ToolCall, ToolDefinition, UsageInfo};
use modelgate_core::{Error, Result};

use crate::traits::{LlmProvider, LlmRequestConfig};

/// Upper bound on one CLI invocation.
pub const CLI_TIMEOUT: Duration = Duration::from_secs(300);

// ─────────────────────────────────────────────
// Prompt flattening
// ─────────────────────────────────────────────

/// Split messages into (system prompt, transcript).
fn flatten_messages(messages: &[Message]) -> (String, String) {
    let mut system = Vec::new();
    let mut lines = Vec::new();
    for msg in messages {
        match msg {
            Message::System { content } => system.push(content.clone()),
            Message::User { content } => lines.push(content.as_text()),
            Message::Assistant {
                content,
                tool_calls,
                ..
            } => {
                if let Some(text) = content.as_deref().filter(|t| !t.is_empty()) {
                    lines.push(format!("Assistant: {text}"));
                }
                for tc in tool_calls.iter().flatten() {
                    lines.push(format!(
                        "Assistant called tool {} ({}) with {}",
                        tc.function.name, tc.id, tc.function.arguments
                    ));
                }
            }
            Message::Tool {
                content,
                tool_call_id,
            } => lines.push(format!("[Tool Result for {tool_call_id}]: {content}")),
        }
    }
    (system.join("\n\n"), lines.join("\n"))
}

/// Describe the callable tools and the reply format the bridge parses back.
fn tools_prompt(tools: &[ToolDefinition]) -> String {
    let mut out = String::from(
        "## Available Tools\n\nWhen you need a tool, reply with ONLY a JSON object of the form \
         {\"tool_calls\":[{\"id\":\"call_1\",\"type\":\"function\",\"function\":\
         {\"name\":\"<tool>\",\"arguments\":\"<JSON-encoded args>\"}}]}\n",
    );
    for tool in tools {
        out.push_str(&format!(
            "\n### {}\n{}\nParameters:\n{}\n",
            tool.function.name, tool.function.description, tool.function.parameters
        ));
    }
    out
}

#[derive(Deserialize)]
struct ToolCallEnvelope {
    tool_calls: Vec<ToolCallEntry>,
}

#[derive(Deserialize)]
struct ToolCallEntry {
    #[serde(default)]
    id: String,
    function: ToolCallFunction,
}

#[derive(Deserialize)]
struct ToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Pull a `{"tool_calls":[...]}` object out of CLI text; the remaining
/// text becomes the message content.
fn extract_tool_calls(text: &str) -> (String, Vec<ToolCall>) {
    let Some(start) = text.find("{\"tool_calls\"") else {
        return (text.trim().to_string(), Vec::new());
    };
    let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<ToolCallEnvelope>();
    let Some(Ok(envelope)) = stream.next() else {
        return (text.trim().to_string(), Vec::new());
    };
    let end = start + stream.byte_offset();

    let calls = envelope
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let id = if entry.id.is_empty() {
                format!("call_{}", i + 1)
            } else {
                entry.id
            };
            let args = match entry.function.arguments {
                Value::String(raw) => raw,
                other => other.to_string(),
            };
            ToolCall::new(id, entry.function.name, args)
        })
        .collect();

    let rest = format!("{}{}", &text[..start], &text[end..])
        .trim()
        .trim_start_matches("```json")
        .trim_end_matches("```")
        .trim()
        .to_string();
    (rest, calls)
}

fn response_from_text(text: &str, usage: Option<UsageInfo>) -> LlmResponse {
    let (content, tool_calls) = extract_tool_calls(text);
    let finish_reason = if tool_calls.is_empty() { "stop" } else { "tool_calls" };
    LlmResponse {
        content,
        tool_calls,
        finish_reason: finish_reason.to_string(),
        usage,
        reasoning_content: None,
    }
}

fn usage_from(input: u32, output: u32) -> Option<UsageInfo> {
    (input > 0 || output > 0).then(|| UsageInfo {
        prompt_tokens: input,
        completion_tokens: output,
        total_tokens: input + output,
    })
}

// ─────────────────────────────────────────────
// Output parsing
// ─────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct CliUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ClaudeCliResult {
    #[serde(default)]
    result: String,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    usage: Option<CliUsage>,
}

fn parse_claude_output(stdout: &str) -> Result<LlmResponse> {
    let out: ClaudeCliResult = serde_json::from_str(stdout.trim())
        .map_err(|e| Error::Decode(format!("claude CLI output: {e}")))?;
    if out.is_error {
        return Err(Error::Network(format!("claude CLI reported an error: {}", out.result)));
    }
    let usage = out.usage.and_then(|u| usage_from(u.input_tokens, u.output_tokens));
    Ok(response_from_text(&out.result, usage))
}

/// `codex exec --json` prints one event per line.
fn parse_codex_output(stdout: &str) -> Result<LlmResponse> {
    let mut messages = Vec::new();
    let mut usage = None;
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(event) = serde_json::from_str::<Value>(line) else {
            continue;
        };
        match event.get("type").and_then(Value::as_str) {
            Some("item.completed") => {
                let item = &event["item"];
                if item.get("type").and_then(Value::as_str) == Some("agent_message") {
                    if let Some(text) = item.get("text").and_then(Value::as_str) {
                        messages.push(text.to_string());
                    }
                }
            }
            Some("turn.completed") => {
                let u: CliUsage = serde_json::from_value(event["usage"].clone()).unwrap_or_default();
                usage = usage_from(u.input_tokens, u.output_tokens);
            }
            Some("turn.failed") | Some("error") => {
                let msg = event
                    .pointer("/error/message")
                    .or_else(|| event.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(Error::Network(format!("codex CLI reported an error: {msg}")));
            }
            _ => {}
        }
    }
    if messages.is_empty() {
        return Err(Error::Decode("codex CLI produced no agent message".into()));
    }
    Ok(response_from_text(&messages.join("\n"), usage))
}

// ─────────────────────────────────────────────
// CliBridgeProvider
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CliKind {
    Claude,
    Codex,
}

impl CliKind {
    fn default_binary(self) -> &'static str {
        match self {
            CliKind::Claude => "claude",
            CliKind::Codex => "codex",
        }
    }

    fn args(self, model: &str, system: &str, workspace: &std::path::Path) -> Vec<String> {
        let mut args: Vec<String> = match self {
            CliKind::Claude => ["--print", "--output-format", "json"]
                .map(String::from)
                .to_vec(),
            CliKind::Codex => ["exec", "--json", "--skip-git-repo-check", "--color", "never"]
                .map(String::from)
                .to_vec(),
        };
        let model = model.trim();
        if !model.is_empty() && model != "default" {
            args.extend(["--model".to_string(), model.to_string()]);
        }
        match self {
            CliKind::Claude => {
                if !system.is_empty() {
                    args.extend(["--append-system-prompt".to_string(), system.to_string()]);
                }
            }
            CliKind::Codex => {
                args.extend(["-C".to_string(), workspace.display().to_string()]);
                args.push("-".to_string());
            }
        }
        args
    }

    fn parse(self, stdout: &str) -> Result<LlmResponse> {
        match self {
            CliKind::Claude => parse_claude_output(stdout),
            CliKind::Codex => parse_codex_output(stdout),
        }
    }
}

/// Chat through a spawned agent CLI.
pub struct CliBridgeProvider {
    kind: CliKind,
    binary: PathBuf,
    workspace: PathBuf,
    timeout: Duration,
}

/// `claude --print` bridge.
pub type ClaudeCliProvider = CliBridgeProvider;
/// `codex exec` bridge.
pub type CodexCliProvider = CliBridgeProvider;

impl CliBridgeProvider {
    pub fn claude(workspace: impl Into<PathBuf>) -> Self {
        Self::new(CliKind::Claude, workspace)
    }

    pub fn codex(workspace: impl Into<PathBuf>) -> Self {
        Self::new(CliKind::Codex, workspace)
    }

    pub fn new(kind: CliKind, workspace: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            binary: PathBuf::from(kind.default_binary()),
            workspace: workspace.into(),
            timeout: CLI_TIMEOUT,
        }
    }

    /// Override the executable (default: `claude` / `codex` on `PATH`).
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> CliKind {
        self.kind
    }

    pub fn workspace(&self) -> &std::path::Path {
        &self.workspace
    }

    async fn run_cli(&self, args: Vec<String>, prompt: String) -> Result<String> {
        let mut child = Command::new(&self.binary)
            .args(&args)
            .current_dir(&self.workspace)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::config(format!("failed to start {}: {e}", self.binary.display()))
            })?;

        // Feed stdin concurrently with draining stdout so neither pipe can fill up.
        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    warn!(error = %e, "Failed to write prompt to CLI stdin");
                }
            });
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::Network(format!(
                    "{} timed out after {}s",
                    self.binary.display(),
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Network(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            return Err(Error::Network(format!(
                "{} exited with {}: {detail}",
                self.binary.display(),
                output.status.code().unwrap_or(-1)
            )));
        }
        Ok(stdout)
    }
}

#[async_trait]
impl LlmProvider for CliBridgeProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse> {
        let (mut system, transcript) = flatten_messages(messages);
        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str(&tools_prompt(tools));
        }
        // codex has no system-prompt flag; prepend it to the prompt.
        let prompt = match self.kind {
            CliKind::Codex if !system.is_empty() => format!("{system}\n\n{transcript}"),
            _ => transcript,
        };
        let args = self.kind.args(model, &system, &self.workspace);

        debug!(
            provider = self.display_name(),
            model = %model,
            workspace = %self.workspace.display(),
            "Invoking CLI bridge"
        );

        let stdout = config.run(self.run_cli(args, prompt)).await?;
        self.kind.parse(&stdout)
    }

    fn display_name(&self) -> &str {
        match self.kind {
            CliKind::Claude => "Claude CLI",
            CliKind::Codex => "Codex CLI",
        }
    }
}
