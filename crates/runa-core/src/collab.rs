// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Small collaborator contracts consumed by the turn controller.
//!
//! Everything here is a seam: production frontends plug in real trackers and
//! metric stores, tests plug in the provided no-op implementations.

use std::sync::{Arc, RwLock};

use runa_config::AgentMode;
use runa_model::Usage;

/// Source of the agent's current operating mode, queried per approval
/// episode so mid-run mode switches take effect at the next decision.
pub trait AgentModeSource: Send + Sync {
    fn agent_mode(&self) -> AgentMode;
}

/// Shared mode cell.  Clone it into whatever surface flips the mode (a TUI
/// keybinding, a mode-switch tool) and hand the same cell to the agent.
#[derive(Clone, Default)]
pub struct SharedMode(Arc<RwLock<AgentMode>>);

impl SharedMode {
    pub fn new(mode: AgentMode) -> Self {
        Self(Arc::new(RwLock::new(mode)))
    }

    pub fn set(&self, mode: AgentMode) {
        *self.0.write().unwrap() = mode;
    }

    pub fn get(&self) -> AgentMode {
        *self.0.read().unwrap()
    }
}

impl AgentModeSource for SharedMode {
    fn agent_mode(&self) -> AgentMode {
        self.get()
    }
}

/// Handle to one externally tracked asynchronous job.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: String,
    pub description: String,
}

/// Reports background jobs whose pending status keeps the agent alive in
/// idle awaiting a wake-up event.
pub trait TaskTracker: Send + Sync {
    fn polling_tasks(&self) -> Vec<TaskHandle>;
}

/// Tracker for frontends that run no background jobs.
#[derive(Default)]
pub struct NoBackgroundTasks;

impl TaskTracker for NoBackgroundTasks {
    fn polling_tasks(&self) -> Vec<TaskHandle> {
        Vec::new()
    }
}

/// Aggregated per-run statistics attached to the final completion event.
#[derive(Debug, Clone)]
pub struct ChatMetrics {
    pub usage: Usage,
    pub duration_ms: u64,
}

pub trait MetricsStore: Send + Sync {
    fn metrics_for(&self, request_id: &str) -> Option<ChatMetrics>;
}

#[derive(Default)]
pub struct NoMetrics;

impl MetricsStore for NoMetrics {
    fn metrics_for(&self, _request_id: &str) -> Option<ChatMetrics> {
        None
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
