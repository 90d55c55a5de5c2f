// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, warn};

use runa_model::{Delta, Message, ToolCall};

use crate::events::StreamOutcome;

/// Accumulates one streaming turn: assistant text, reasoning in both wire
/// dialects, and indexed tool-call fragments.
///
/// A fresh accumulator is created for every turn and owned by that turn's
/// worker task.
#[derive(Default)]
pub struct StreamAccumulator {
    content: String,
    reasoning: String,
    reasoning_content: String,
    tool_calls: HashMap<u32, PendingToolCall>,
    usage: Option<runa_model::Usage>,
}

#[derive(Default)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
    /// The accumulated arguments already parse as a complete JSON document.
    /// Further fragments for this index are duplicate or overlapping tails
    /// some models emit and must be ignored.
    arguments_complete: bool,
}

/// An arguments string is complete iff trimming whitespace yields non-empty
/// input that parses as any JSON value.
fn is_complete_json(s: &str) -> bool {
    let trimmed = s.trim();
    !trimmed.is_empty() && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta into the buffers.
    pub fn absorb(&mut self, delta: &Delta) {
        if let Some(text) = &delta.content {
            self.content.push_str(text);
        }
        if let Some(text) = &delta.reasoning {
            self.reasoning.push_str(text);
        }
        if let Some(text) = &delta.reasoning_content {
            self.reasoning_content.push_str(text);
        }
        if let Some(usage) = delta.usage {
            self.usage = Some(usage);
        }
        for chunk in &delta.tool_calls {
            let pending = self.tool_calls.entry(chunk.index).or_default();
            if !chunk.id.is_empty() {
                pending.id = chunk.id.clone();
            }
            // The name is set once; providers that repeat it never change it,
            // so the first non-empty occurrence wins.
            if pending.name.is_empty() && !chunk.name.is_empty() {
                pending.name = chunk.name.clone();
            }
            if chunk.arguments.is_empty() {
                continue;
            }
            if pending.arguments_complete {
                debug!(
                    index = chunk.index,
                    fragment = %chunk.arguments,
                    "ignoring argument fragment after complete JSON document"
                );
                continue;
            }
            pending.arguments.push_str(&chunk.arguments);
            if is_complete_json(&pending.arguments) {
                pending.arguments_complete = true;
            }
        }
    }

    /// Accumulated assistant text so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Finalize the turn: collect tool calls sorted by emitted index and
    /// build the assistant message.  Reasoning is duplicated into both
    /// message fields when the turn produced tool calls.
    pub fn finish(self, started_at: Instant) -> StreamOutcome {
        let mut pending: Vec<(u32, PendingToolCall)> = self.tool_calls.into_iter().collect();
        pending.sort_by_key(|(idx, _)| *idx);

        // Calls with an empty name cannot be dispatched and are dropped —
        // storing them would corrupt the history sent back to the model on
        // the next turn.  An empty id gets a synthetic fallback so the turn
        // can still complete.
        let mut tool_calls = Vec::with_capacity(pending.len());
        for (i, (_, ptc)) in pending.into_iter().enumerate() {
            if ptc.name.is_empty() {
                warn!(tool_call_id = %ptc.id, "dropping tool call with empty name from model");
                continue;
            }
            let id = if ptc.id.is_empty() {
                let synthetic = format!("tc_synthetic_{i}");
                warn!(
                    tool_name = %ptc.name,
                    tool_call_id = %synthetic,
                    "tool call from model had empty id; generated synthetic id"
                );
                synthetic
            } else {
                ptc.id
            };
            tool_calls.push(ToolCall { id, name: ptc.name, arguments: ptc.arguments });
        }

        // Providers speak one reasoning dialect at a time; prefer the plain
        // `reasoning` buffer when both happen to be populated.
        let reasoning = if !self.reasoning.is_empty() {
            self.reasoning
        } else {
            self.reasoning_content
        };

        let message = if tool_calls.is_empty() {
            Message::assistant(self.content)
        } else {
            Message::assistant_with_tools(self.content, tool_calls.clone(), reasoning.clone())
        };

        StreamOutcome {
            message,
            tool_calls,
            reasoning,
            usage: self.usage,
            started_at,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
