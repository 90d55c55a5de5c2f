// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

use runa_model::{ConversationEntry, ToolCall};

/// The outcome of one tool call in a parallel batch.
///
/// `is_error` marks an ordinary failure that is fed back to the model as a
/// tool-role message.  `stop` is the executor's fatal convention: the run
/// must not continue (user asked to stop, or the tool surfaced an
/// unrecoverable condition).
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: String,
    pub content: String,
    pub is_error: bool,
    pub stop: bool,
}

/// Executes tool calls on behalf of the agent core.
///
/// Two shapes: `execute_single` for the sequential approval path (one call
/// at a time, immediately after its approval decision) and
/// `execute_parallel` for batches that need no prompting.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute one call and return the conversation entry for its result.
    ///
    /// With `approved == false` no tool runs; the returned entry is the
    /// synthetic rejection message for the call, keyed by the same call id a
    /// real result would use.
    async fn execute_single(&self, call: &ToolCall, approved: bool) -> ConversationEntry;

    /// Execute all calls concurrently.  The returned results preserve the
    /// declared order of `calls` regardless of completion order.
    async fn execute_parallel(&self, calls: &[ToolCall]) -> Vec<ToolResult>;

    /// Whether a batch outcome demands that the run stop.
    fn should_stop(&self, results: &[ToolResult]) -> bool {
        results.iter().any(|r| r.stop)
    }
}

/// The synthetic tool-role message recorded in place of a result when the
/// user refuses a tool call.
pub(crate) fn rejection_text(call: &ToolCall) -> String {
    format!("Tool execution rejected by user: {}", call.name)
}
