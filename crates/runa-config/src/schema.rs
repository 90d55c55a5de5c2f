// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub system_reminders: SystemRemindersConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_max_turns() -> u32 {
    50
}
fn default_timeout_seconds() -> u64 {
    120
}
fn default_iteration_delay_ms() -> u64 {
    100
}
fn default_background_poll_delay_ms() -> u64 {
    1_000
}
fn default_event_buffer_size() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Provider identifier forwarded verbatim to the model layer.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model name forwarded verbatim to the model layer.
    #[serde(default = "default_model")]
    pub model: String,
    /// Upper bound on streaming turns per run.  When the bound is reached
    /// after a batch of tool results, the run wraps up instead of asking the
    /// model again.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Per-turn streaming deadline.  A turn that produces no terminal delta
    /// within this window fails the run with a timeout error.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Throttle between consecutive streaming turns, and the bound on the
    /// final queue check performed before the run settles back to idle.
    #[serde(default = "default_iteration_delay_ms")]
    pub iteration_delay_ms: u64,
    /// Wait between background-task re-checks while the queue is empty.
    #[serde(default = "default_background_poll_delay_ms")]
    pub background_poll_delay_ms: u64,
    /// Capacity of the agent event bus.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            max_turns: default_max_turns(),
            timeout_seconds: default_timeout_seconds(),
            iteration_delay_ms: default_iteration_delay_ms(),
            background_poll_delay_ms: default_background_poll_delay_ms(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

fn default_reminder_interval() -> u32 {
    5
}
fn default_reminder_text() -> String {
    "Reminder: stay focused on the user's original request. Re-read it \
     before responding and do not drift into unrelated work."
        .into()
}

/// Periodic hidden reminder injected into the conversation.
///
/// When enabled, a hidden user-role message carrying `reminder_text` is
/// appended before a streaming turn whenever `turns % interval == 0`.
/// Hidden entries are sent to the model but never rendered to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemRemindersConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_reminder_interval")]
    pub interval: u32,
    #[serde(default = "default_reminder_text")]
    pub reminder_text: String,
}

impl Default for SystemRemindersConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: default_reminder_interval(),
            reminder_text: default_reminder_text(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Glob patterns for tool names that never need user approval.
    /// Only `*` (match anything) and `?` (match one char) are supported.
    #[serde(default)]
    pub auto_approve_patterns: Vec<String>,
}

/// Operating mode of the agent, queried per approval episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AgentMode {
    /// Prompt for every tool call the policy flags
    #[default]
    Standard,
    /// One explicit approval covers the rest of the current tool batch
    AutoAccept,
    /// Planning mode – same approval protocol, restricted tool surface
    Plan,
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentMode::Standard => write!(f, "standard"),
            AgentMode::AutoAccept => write!(f, "auto-accept"),
            AgentMode::Plan => write!(f, "plan"),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
