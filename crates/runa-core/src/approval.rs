// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use runa_config::AgentMode;
use runa_model::ToolCall;
use runa_tools::{ApprovalRequester, ToolExecutor};

use crate::{
    agent::TurnState,
    bus::EventBus,
    collab::AgentModeSource,
    events::{AgentEvent, ChatEvent, ChatPublisher},
    repo::ConversationRepository,
};

/// The sequential approval episode, run as its own task.
///
/// Walks the pending tool calls in declared order: one approval prompt at a
/// time, execution immediately after each decision.  In auto-accept mode the
/// first prompt governs the whole batch — approval executes the remaining
/// calls without further prompts, rejection records rejections for them.
/// Conversation mutations take the handler lock; the lock is never held
/// across a prompt or a tool execution.
pub(crate) struct ApprovalWorker {
    pub requester: Option<Arc<dyn ApprovalRequester>>,
    pub executor: Arc<dyn ToolExecutor>,
    pub modes: Arc<dyn AgentModeSource>,
    pub repository: Arc<dyn ConversationRepository>,
    pub chat: ChatPublisher,
    pub bus: EventBus,
    pub state: Arc<Mutex<TurnState>>,
    pub cancel: CancellationToken,
    pub request_id: String,
}

impl ApprovalWorker {
    pub(crate) async fn run(self) {
        let Some(requester) = self.requester.clone() else {
            self.bus
                .send(AgentEvent::ApprovalFailed {
                    error: "approval required but no approval requester is configured".into(),
                })
                .await;
            return;
        };

        loop {
            let next = self.state.lock().await.next_pending_tool();
            let Some(call) = next else {
                self.bus.send(AgentEvent::AllToolsProcessed).await;
                return;
            };

            let decision = tokio::select! {
                biased;
                // The event loop drives the Cancelled transition; just stop.
                _ = self.cancel.cancelled() => return,
                d = requester.request_approval(&call) => d,
            };

            let approved = match decision {
                Err(e) => {
                    self.bus
                        .send(AgentEvent::ApprovalFailed { error: format!("{e:#}") })
                        .await;
                    return;
                }
                Ok(approved) => approved,
            };

            self.record_decision(&call, approved);
            self.execute_one(&call, approved).await;

            if self.modes.agent_mode() == AgentMode::AutoAccept {
                self.finish_remaining(approved).await;
                self.bus.send(AgentEvent::AllToolsProcessed).await;
                return;
            }
        }
    }

    fn record_decision(&self, call: &ToolCall, approved: bool) {
        let event = if approved {
            ChatEvent::ToolApproved {
                request_id: self.request_id.clone(),
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
            }
        } else {
            ChatEvent::ToolRejected {
                request_id: self.request_id.clone(),
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
            }
        };
        self.chat.publish(event);
    }

    /// Execute (or reject) one call and record its conversation entry.
    /// The rejection entry occupies the same positional slot a real result
    /// would, keyed by the same call id.
    async fn execute_one(&self, call: &ToolCall, approved: bool) {
        let entry = self.executor.execute_single(call, approved).await;
        let mut st = self.state.lock().await;
        st.append_entry(self.repository.as_ref(), entry.clone());
        st.ctx.has_tool_results = true;
        st.approval.results.push(entry);
        st.approval.index += 1;
    }

    /// Apply the governing auto-accept decision to every remaining call, in
    /// declared order, without prompting again.
    async fn finish_remaining(&self, approved: bool) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let next = self.state.lock().await.next_pending_tool();
            let Some(call) = next else { return };
            self.record_decision(&call, approved);
            self.execute_one(&call, approved).await;
        }
    }
}
