// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use runa_model::{ConversationEntry, Message, Role, ToolCall};
use runa_tools::ApprovalPolicy;

use crate::queue::MessageQueue;

/// Mutable per-run state owned by the turn controller.
///
/// All mutation happens under the controller's handler lock; the guards of
/// the state machine only ever read it.
pub struct AgentContext {
    /// Opaque identifier, unique per run.
    pub request_id: String,
    /// The conversation as the model will see it, hidden entries included.
    pub conversation: Vec<ConversationEntry>,
    /// Handle to the cross-agent message queue.
    pub queue: Arc<dyn MessageQueue>,
    /// The current turn's pending tool calls (empty when none).
    pub tool_calls: Vec<ToolCall>,
    /// Streaming turns started so far; incremented at the start of each turn.
    pub turns: u32,
    pub max_turns: u32,
    /// Set after a tool batch finalizes; cleared when the next turn starts.
    /// While set, the next model call must include the appended results.
    pub has_tool_results: bool,
    pub approval_policy: Option<Arc<dyn ApprovalPolicy>>,
    /// When false, approval is bypassed regardless of policy.
    pub is_chat_mode: bool,
    /// An external producer asked the run to wrap up at the next arbitration.
    pub completion_requested: bool,
}

impl AgentContext {
    pub fn new(request_id: impl Into<String>, queue: Arc<dyn MessageQueue>, max_turns: u32) -> Self {
        Self {
            request_id: request_id.into(),
            conversation: Vec::new(),
            queue,
            tool_calls: Vec::new(),
            turns: 0,
            max_turns,
            has_tool_results: false,
            approval_policy: None,
            is_chat_mode: true,
            completion_requested: false,
        }
    }

    /// Whether the run can terminate naturally: at least one turn has
    /// streamed, no tool results are waiting for a model response, nothing is
    /// queued, and the conversation does not end on an unanswered user
    /// message.
    pub fn can_complete(&self) -> bool {
        self.turns > 0
            && !self.has_tool_results
            && self.queue.is_empty()
            && !self.awaiting_response()
    }

    pub fn max_turns_reached(&self) -> bool {
        self.turns >= self.max_turns
    }

    /// The conversation ends on a user message that has not been answered.
    pub fn awaiting_response(&self) -> bool {
        matches!(self.conversation.last(), Some(e) if e.message.role == Role::User)
    }

    /// Whether any of the current tool calls needs a user decision.
    pub fn requires_approval(&self) -> bool {
        let Some(policy) = &self.approval_policy else {
            return false;
        };
        if !self.is_chat_mode {
            return false;
        }
        self.tool_calls
            .iter()
            .any(|c| policy.should_require_approval(c, self.is_chat_mode))
    }

    /// Snapshot of the messages to send to the model.
    pub fn messages_for_model(&self) -> Vec<Message> {
        self.conversation.iter().map(|e| e.message.clone()).collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use runa_model::Message;

    use super::*;
    use crate::queue::InMemoryMessageQueue;

    fn ctx() -> AgentContext {
        AgentContext::new("req-1", Arc::new(InMemoryMessageQueue::new()), 10)
    }

    #[test]
    fn fresh_context_cannot_complete() {
        // No turn has streamed yet.
        assert!(!ctx().can_complete());
    }

    #[test]
    fn completes_after_assistant_reply() {
        let mut c = ctx();
        c.turns = 1;
        c.conversation
            .push(ConversationEntry::new(Message::user("hi")));
        c.conversation
            .push(ConversationEntry::new(Message::assistant("hello")));
        assert!(c.can_complete());
    }

    #[test]
    fn pending_tool_results_block_completion() {
        let mut c = ctx();
        c.turns = 1;
        c.has_tool_results = true;
        assert!(!c.can_complete());
    }

    #[test]
    fn queued_messages_block_completion() {
        let c = ctx();
        c.queue.enqueue_user("more work");
        let mut c = c;
        c.turns = 1;
        assert!(!c.can_complete());
    }

    #[test]
    fn trailing_user_message_blocks_completion() {
        let mut c = ctx();
        c.turns = 1;
        c.conversation
            .push(ConversationEntry::new(Message::user("still waiting")));
        assert!(!c.can_complete());
    }

    #[test]
    fn empty_conversation_with_a_turn_can_complete() {
        let mut c = ctx();
        c.turns = 1;
        assert!(c.can_complete());
    }

    #[test]
    fn max_turns_reached_at_bound() {
        let mut c = ctx();
        c.turns = 10;
        assert!(c.max_turns_reached());
        c.turns = 9;
        assert!(!c.max_turns_reached());
    }

    #[test]
    fn no_policy_means_no_approval() {
        let mut c = ctx();
        c.tool_calls.push(ToolCall {
            id: "a".into(),
            name: "rm".into(),
            arguments: "{}".into(),
        });
        assert!(!c.requires_approval());
    }

    #[test]
    fn non_chat_mode_bypasses_policy() {
        struct AlwaysAsk;
        impl ApprovalPolicy for AlwaysAsk {
            fn should_require_approval(&self, _: &ToolCall, _: bool) -> bool {
                true
            }
        }
        let mut c = ctx();
        c.approval_policy = Some(Arc::new(AlwaysAsk));
        c.is_chat_mode = false;
        c.tool_calls.push(ToolCall {
            id: "a".into(),
            name: "rm".into(),
            arguments: "{}".into(),
        });
        assert!(!c.requires_approval());
    }

    #[test]
    fn messages_for_model_include_hidden_entries() {
        let mut c = ctx();
        c.conversation
            .push(ConversationEntry::hidden(Message::user("reminder")));
        assert_eq!(c.messages_for_model().len(), 1);
    }
}
