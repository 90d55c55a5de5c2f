// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use tokio::sync::mpsc;
use tracing::warn;

use crate::events::AgentEvent;

/// Bounded FIFO of agent events, consumed by exactly one event loop.
///
/// Producers: the turn controller itself, the streaming worker, the tool
/// workers, and external wake-up sources.  The receiver half lives inside
/// the event loop; once the loop exits the bus is closed and further sends
/// are programming errors, logged and dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<AgentEvent>,
}

impl EventBus {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub async fn send(&self, event: AgentEvent) {
        if let Err(e) = self.tx.send(event).await {
            warn!(event = ?e.0, "event bus closed; dropping event");
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
