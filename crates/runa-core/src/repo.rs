// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::RwLock;

use runa_model::ConversationEntry;
use runa_tools::ToolResult;

/// Durable view of the conversation.
///
/// Append-only from the agent's perspective.  Implementations must be safe
/// for one writer plus many concurrent readers; the agent serializes its own
/// appends, so no write contention comes from the core.  Append failures are
/// treated as best-effort by the caller — the in-memory conversation stays
/// consistent either way.
pub trait ConversationRepository: Send + Sync {
    fn add_message(&self, entry: &ConversationEntry) -> anyhow::Result<()>;
    fn get_messages(&self) -> Vec<ConversationEntry>;

    /// Render a tool result the way the model should see it.
    fn format_tool_result_for_llm(&self, result: &ToolResult) -> String {
        if result.is_error {
            format!("Tool {} failed: {}", result.tool_name, result.content)
        } else {
            result.content.clone()
        }
    }
}

/// In-memory repository used by tests and embedded frontends.
#[derive(Default)]
pub struct InMemoryConversationLog {
    entries: RwLock<Vec<ConversationEntry>>,
}

impl InMemoryConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

impl ConversationRepository for InMemoryConversationLog {
    fn add_message(&self, entry: &ConversationEntry) -> anyhow::Result<()> {
        self.entries.write().unwrap().push(entry.clone());
        Ok(())
    }

    fn get_messages(&self) -> Vec<ConversationEntry> {
        self.entries.read().unwrap().clone()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
