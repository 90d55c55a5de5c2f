// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{Delta, Message};

pub type DeltaStream = Pin<Box<dyn Stream<Item = anyhow::Result<Delta>> + Send>>;

/// One streaming completion request.
///
/// The conversation is passed in full, hidden entries included — hiding is a
/// rendering concern, not a model-input concern.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// Provider identifier (routing hint for multi-backend implementations)
    pub provider: String,
    /// Model name forwarded to the provider API
    pub model: String,
    pub messages: Vec<Message>,
}

/// A streaming model source.
///
/// Implementations own transport, authentication and wire decoding; the core
/// only consumes the resulting lazy delta sequence.  Cancellation is
/// cooperative: dropping the stream (or the pending `generate` future) must
/// abort the underlying request.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Send a completion request and return the streaming response.
    async fn generate(&self, req: GenerateRequest) -> anyhow::Result<DeltaStream>;
}
