// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agent execution core: the event-driven state machine that drives one
//! conversational turn — and its recursive tool-use sub-turns — from user
//! message to terminal completion.
//!
//! The core coordinates a streaming model client, a tool executor with
//! human-in-the-loop approval, and an asynchronous message queue.  Terminal
//! UI, CLI parsing, model transport and individual tool implementations are
//! external collaborators wired in through [`Collaborators`].
mod accum;
mod agent;
mod approval;
mod bus;
mod collab;
mod context;
mod events;
mod machine;
mod queue;
mod repo;
mod stream;

pub use accum::StreamAccumulator;
pub use agent::{Agent, Collaborators};
pub use bus::EventBus;
pub use collab::{
    AgentModeSource, ChatMetrics, MetricsStore, NoBackgroundTasks, NoMetrics, SharedMode,
    TaskHandle, TaskTracker,
};
pub use context::AgentContext;
pub use events::{AgentEvent, ChatEvent, ChatPublisher, StreamOutcome};
pub use machine::{AgentState, StateMachine, TransitionError};
pub use queue::{InMemoryMessageQueue, MessageQueue};
pub use repo::{ConversationRepository, InMemoryConversationLog};
