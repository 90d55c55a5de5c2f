// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::RwLock;

use tracing::{debug, info};

use crate::context::AgentContext;

/// Execution states of one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentState {
    /// Resting state between runs
    Idle,
    /// Arbitrating the next action
    CheckingQueue,
    /// A streaming worker is talking to the model
    StreamingLlm,
    /// Deciding what to do with the turn's output
    PostStream,
    /// Deciding between the approval and parallel execution paths
    EvaluatingTools,
    /// Sequentially collecting per-tool approval decisions
    ApprovingTools,
    /// Waiting for the parallel tool batch
    ExecutingTools,
    /// Bookkeeping after a tool batch
    PostToolExecution,
    /// Final queue check before settling back to idle
    Completing,
    Cancelled,
    Error,
    Stopped,
}

impl AgentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Error | Self::Stopped)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::CheckingQueue => "checking-queue",
            Self::StreamingLlm => "streaming-llm",
            Self::PostStream => "post-stream",
            Self::EvaluatingTools => "evaluating-tools",
            Self::ApprovingTools => "approving-tools",
            Self::ExecutingTools => "executing-tools",
            Self::PostToolExecution => "post-tool-execution",
            Self::Completing => "completing",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
            Self::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// All non-terminal states, spelled out.  Universal edges into the terminal
/// states are registered from this list rather than derived from enum
/// arithmetic, so adding a state forces a conscious decision here.
const NON_TERMINAL: [AgentState; 9] = [
    AgentState::Idle,
    AgentState::CheckingQueue,
    AgentState::StreamingLlm,
    AgentState::PostStream,
    AgentState::EvaluatingTools,
    AgentState::ApprovingTools,
    AgentState::ExecutingTools,
    AgentState::PostToolExecution,
    AgentState::Completing,
];

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("no transition registered from {from} to {to}")]
    InvalidTransition { from: AgentState, to: AgentState },
    #[error("transition from {from} to {to} rejected by guard")]
    GuardFailed { from: AgentState, to: AgentState },
}

/// Side-effect-free predicate evaluated before an edge is taken.
pub type Guard = fn(&AgentContext) -> bool;
/// Callback run after an edge has been taken.
pub type Action = fn(&AgentContext);

struct Edge {
    from: AgentState,
    to: AgentState,
    guard: Option<Guard>,
    action: Option<Action>,
}

/// Table-driven state machine for one agent run.
///
/// The edge set is fixed at construction; `transition` succeeds iff an edge
/// from the current state to the target exists and its guard (if any) holds.
/// `(previous, current)` mutate atomically under the write lock.  Self-loops
/// are never registered, and no edge leaves a terminal state.
pub struct StateMachine {
    edges: Vec<Edge>,
    state: RwLock<(Option<AgentState>, AgentState)>,
}

fn guard_can_complete(ctx: &AgentContext) -> bool {
    ctx.can_complete()
}

fn guard_can_finish(ctx: &AgentContext) -> bool {
    ctx.can_complete() || ctx.max_turns_reached() || ctx.completion_requested
}

fn guard_has_tool_calls(ctx: &AgentContext) -> bool {
    !ctx.tool_calls.is_empty()
}

fn log_stopped(_ctx: &AgentContext) {
    info!("run stopped by tool results");
}

fn log_terminal(ctx: &AgentContext) {
    info!(request_id = %ctx.request_id, turns = ctx.turns, "run reached a terminal state");
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        use AgentState::*;
        let mut m = Self {
            edges: Vec::new(),
            state: RwLock::new((None, Idle)),
        };
        m.register(Idle, CheckingQueue, None, None);
        m.register(CheckingQueue, StreamingLlm, None, None);
        m.register(CheckingQueue, Completing, Some(guard_can_finish), None);
        m.register(StreamingLlm, PostStream, None, None);
        m.register(PostStream, CheckingQueue, None, None);
        m.register(PostStream, EvaluatingTools, Some(guard_has_tool_calls), None);
        m.register(PostStream, Completing, Some(guard_can_complete), None);
        m.register(EvaluatingTools, ApprovingTools, None, None);
        m.register(EvaluatingTools, ExecutingTools, None, None);
        m.register(ApprovingTools, PostToolExecution, None, None);
        m.register(ExecutingTools, PostToolExecution, None, None);
        m.register(ExecutingTools, Stopped, None, Some(log_stopped));
        m.register(PostToolExecution, CheckingQueue, None, None);
        m.register(PostToolExecution, Completing, Some(guard_can_finish), None);
        m.register(Completing, CheckingQueue, None, None);
        m.register(Completing, Idle, None, None);
        // Cancellation and failure must be reachable from anywhere.
        for from in NON_TERMINAL {
            m.register(from, Cancelled, None, Some(log_terminal));
            m.register(from, Error, None, Some(log_terminal));
        }
        m
    }

    fn register(
        &mut self,
        from: AgentState,
        to: AgentState,
        guard: Option<Guard>,
        action: Option<Action>,
    ) {
        debug_assert!(from != to, "self-loops are not registered");
        self.edges.push(Edge { from, to, guard, action });
    }

    pub fn current(&self) -> AgentState {
        self.state.read().unwrap().1
    }

    pub fn previous(&self) -> Option<AgentState> {
        self.state.read().unwrap().0
    }

    /// Move to `to` if a matching edge exists and its guard holds.
    /// Returns the state that was left.
    pub fn transition(
        &self,
        to: AgentState,
        ctx: &AgentContext,
    ) -> Result<AgentState, TransitionError> {
        let mut state = self.state.write().unwrap();
        let current = state.1;
        let edge = self
            .edges
            .iter()
            .find(|e| e.from == current && e.to == to)
            .ok_or(TransitionError::InvalidTransition { from: current, to })?;
        if let Some(guard) = edge.guard {
            if !guard(ctx) {
                return Err(TransitionError::GuardFailed { from: current, to });
            }
        }
        *state = (Some(current), to);
        drop(state);
        debug!(from = %current, to = %to, "state transition");
        if let Some(action) = edge.action {
            action(ctx);
        }
        Ok(current)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
