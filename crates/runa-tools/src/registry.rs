// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use runa_model::{ConversationEntry, Message, ToolCall, ToolExecutionRecord};

use crate::executor::{rejection_text, ToolExecutor, ToolResult};

/// The result of running a tool implementation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub content: String,
    /// The tool failed non-fatally; the message is fed back to the model.
    pub is_error: bool,
    /// The run must not continue after this result.
    pub stop: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false, stop: false }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { content: msg.into(), is_error: true, stop: false }
    }

    pub fn stop(msg: impl Into<String>) -> Self {
        Self { content: msg.into(), is_error: false, stop: true }
    }
}

/// Trait that every tool available to the agent implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema of the parameters object
    fn parameters_schema(&self) -> Value;
    /// Execute the tool.  Failures should be wrapped in [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}

/// Name-keyed registry of tools; doubles as the default [`ToolExecutor`].
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    async fn run(&self, call: &ToolCall) -> ToolOutput {
        match self.get(&call.name) {
            Some(tool) => tool.execute(call).await,
            None => {
                warn!(tool_name = %call.name, "tool call for unknown tool");
                ToolOutput::err(format!("unknown tool: {}", call.name))
            }
        }
    }

    fn entry_for(&self, call: &ToolCall, output: &ToolOutput) -> ConversationEntry {
        ConversationEntry::new(Message::tool_result(&call.id, &output.content))
            .with_tool_execution(ToolExecutionRecord {
                tool_name: call.name.clone(),
                arguments: call.arguments.clone(),
                output: output.content.clone(),
                success: !output.is_error,
            })
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute_single(&self, call: &ToolCall, approved: bool) -> ConversationEntry {
        if !approved {
            let text = rejection_text(call);
            return ConversationEntry::new(Message::tool_result(&call.id, &text))
                .with_tool_execution(ToolExecutionRecord {
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                    output: text,
                    success: false,
                });
        }
        let output = self.run(call).await;
        self.entry_for(call, &output)
    }

    async fn execute_parallel(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        // Each call runs in its own task; tasks are isolated so one panic
        // does not cancel the others.  Results are joined in declared order
        // for correct conversation serialization.
        let mut tasks = Vec::with_capacity(calls.len());
        for call in calls.iter().cloned() {
            let tool = self.get(&call.name);
            tasks.push(tokio::spawn(async move {
                let output = match tool {
                    Some(t) => t.execute(&call).await,
                    None => ToolOutput::err(format!("unknown tool: {}", call.name)),
                };
                (call, output)
            }));
        }

        let mut results = Vec::with_capacity(calls.len());
        for (i, task) in tasks.into_iter().enumerate() {
            let (call, output) = match task.await {
                Ok(pair) => pair,
                Err(e) => (
                    calls[i].clone(),
                    ToolOutput::err(format!("tool execution panicked: {e}")),
                ),
            };
            results.push(ToolResult {
                call_id: call.id,
                tool_name: call.name,
                arguments: call.arguments,
                content: output.content,
                is_error: output.is_error,
                stop: output.stop,
            });
        }
        results
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its arguments"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(format!("echo: {}", call.arguments))
        }
    }

    struct StopTool;

    #[async_trait]
    impl Tool for StopTool {
        fn name(&self) -> &str {
            "halt"
        }
        fn description(&self) -> &str {
            "asks the run to stop"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        async fn execute(&self, _call: &ToolCall) -> ToolOutput {
            ToolOutput::stop("stopping per user request")
        }
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall { id: id.into(), name: name.into(), arguments: "{}".into() }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool);
        reg.register(StopTool);
        reg
    }

    #[tokio::test]
    async fn execute_single_runs_registered_tool() {
        let reg = registry();
        let entry = reg.execute_single(&call("c1", "echo"), true).await;
        assert_eq!(entry.message.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(entry.message.as_text(), Some("echo: {}"));
        assert!(entry.tool_execution.as_ref().unwrap().success);
    }

    #[tokio::test]
    async fn execute_single_unapproved_builds_rejection_entry() {
        let reg = registry();
        let entry = reg.execute_single(&call("c1", "echo"), false).await;
        assert_eq!(
            entry.message.as_text(),
            Some("Tool execution rejected by user: echo")
        );
        assert_eq!(entry.message.tool_call_id.as_deref(), Some("c1"));
        assert!(!entry.tool_execution.as_ref().unwrap().success);
    }

    #[tokio::test]
    async fn execute_single_unknown_tool_is_error_result() {
        let reg = registry();
        let entry = reg.execute_single(&call("c1", "nope"), true).await;
        assert!(entry.message.as_text().unwrap().contains("unknown tool"));
        assert!(!entry.tool_execution.as_ref().unwrap().success);
    }

    #[tokio::test]
    async fn execute_parallel_preserves_declared_order() {
        let reg = registry();
        let calls = vec![call("a", "echo"), call("b", "echo"), call("c", "echo")];
        let results = reg.execute_parallel(&calls).await;
        let ids: Vec<&str> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn stop_tool_sets_stop_flag_and_should_stop() {
        let reg = registry();
        let results = reg.execute_parallel(&[call("a", "echo"), call("b", "halt")]).await;
        assert!(!results[0].stop);
        assert!(results[1].stop);
        assert!(reg.should_stop(&results));
    }

    #[tokio::test]
    async fn should_stop_false_for_plain_errors() {
        let reg = registry();
        let results = reg.execute_parallel(&[call("a", "nope")]).await;
        assert!(results[0].is_error);
        assert!(!reg.should_stop(&results));
    }
}
