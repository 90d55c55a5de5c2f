// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod mock;
mod provider;
mod types;

pub use mock::{FailingProvider, ScriptedProvider, StalledProvider};
pub use provider::{DeltaStream, GenerateRequest, ModelProvider};
pub use types::{
    ContentPart, ConversationEntry, Delta, Message, MessageContent, Role, ToolCall, ToolCallChunk,
    ToolExecutionRecord, Usage,
};
