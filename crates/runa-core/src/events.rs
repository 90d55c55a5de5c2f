// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use runa_model::{Message, ToolCall, Usage};
use runa_tools::ToolResult;

use crate::collab::ChatMetrics;

/// Events carried by the agent's internal bus.
///
/// This is a closed set: handlers match exhaustively, and producers outside
/// the core are limited to wake-up `MessageReceived` and
/// `CompletionRequested`.
#[derive(Debug)]
pub enum AgentEvent {
    /// Something may have changed; the current state's handler should look.
    /// Re-emitted by the controller after most transitions and sent by
    /// external producers as a wake-up.
    MessageReceived,
    /// A streaming turn should start now
    StartStreaming,
    /// The streaming worker finished a turn
    StreamCompleted(StreamOutcome),
    /// The parallel tool batch finished
    ToolsCompleted { results: Vec<ToolResult> },
    /// The sequential approval episode processed every call
    AllToolsProcessed,
    /// Collecting an approval decision failed (not a rejection)
    ApprovalFailed { error: String },
    /// An external producer asked the run to wrap up
    CompletionRequested,
}

/// Payload of [`AgentEvent::StreamCompleted`].
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// The finalized assistant message for this turn
    pub message: Message,
    /// Tool calls accumulated from the stream, ordered by emitted index
    pub tool_calls: Vec<ToolCall>,
    /// Accumulated reasoning text ("" when the model emitted none)
    pub reasoning: String,
    pub usage: Option<Usage>,
    pub started_at: Instant,
}

/// Chat lifecycle events published to the external sink (TUI, API stream).
#[derive(Debug, Clone)]
pub enum ChatEvent {
    Start {
        request_id: String,
    },
    /// A text chunk streamed from the model
    Chunk {
        request_id: String,
        content: String,
    },
    ToolApproved {
        request_id: String,
        tool_call_id: String,
        tool_name: String,
    },
    ToolRejected {
        request_id: String,
        tool_call_id: String,
        tool_name: String,
    },
    /// A response cycle finished.  Mid-run completes carry the turn's tool
    /// calls; the final complete of a run carries none.
    Complete {
        request_id: String,
        content: String,
        tool_calls: Vec<ToolCall>,
        reasoning: String,
        usage: Option<Usage>,
        metrics: Option<ChatMetrics>,
    },
    Error {
        request_id: String,
        message: String,
    },
}

/// Best-effort, non-blocking publisher for [`ChatEvent`]s.
///
/// The agent never waits on its observers: a full or closed sink drops the
/// event with a log line and the run continues.
#[derive(Clone)]
pub struct ChatPublisher {
    tx: Option<mpsc::Sender<ChatEvent>>,
}

impl ChatPublisher {
    pub fn new(tx: mpsc::Sender<ChatEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Publisher that discards everything (headless runs, tests).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn publish(&self, event: ChatEvent) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(ev)) => {
                warn!(event = ?discriminant_name(&ev), "chat sink full; dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(ev)) => {
                debug!(event = ?discriminant_name(&ev), "chat sink closed; dropping event");
            }
        }
    }
}

fn discriminant_name(ev: &ChatEvent) -> &'static str {
    match ev {
        ChatEvent::Start { .. } => "start",
        ChatEvent::Chunk { .. } => "chunk",
        ChatEvent::ToolApproved { .. } => "tool-approved",
        ChatEvent::ToolRejected { .. } => "tool-rejected",
        ChatEvent::Complete { .. } => "complete",
        ChatEvent::Error { .. } => "error",
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
