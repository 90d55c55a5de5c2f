// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{provider::DeltaStream, Delta, GenerateRequest, ModelProvider};

/// A pre-scripted provider.  Each call to `generate` pops the next delta
/// script from the front of the queue.  This lets tests specify exact
/// streaming sequences – including fragmented tool calls – without network
/// access.
pub struct ScriptedProvider {
    scripts: Arc<Mutex<Vec<Vec<Delta>>>>,
    /// The last `GenerateRequest` seen by this provider.
    /// Written on each `generate()` call so tests can inspect what was sent.
    pub last_request: Arc<Mutex<Option<GenerateRequest>>>,
}

impl ScriptedProvider {
    /// Build a provider from a list of delta scripts.  The outer `Vec` is the
    /// ordered list of calls; the inner `Vec` is the delta sequence streamed
    /// for that call.
    pub fn new(scripts: Vec<Vec<Delta>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Convenience: provider that always streams a single text reply with
    /// token usage.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![vec![Delta::content(reply), Delta::usage(5, 2)]])
    }

    /// Convenience: provider that emits one tool call, then a text reply on
    /// the following turn.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        let id: String = tool_id.into();
        let name: String = tool_name.into();
        let args: String = args_json.into();
        Self::new(vec![
            // Turn 1 – model emits a tool call
            vec![Delta::tool_chunk(0, &id, &name, &args)],
            // Turn 2 – model responds after the tool result
            vec![Delta::content(final_text), Delta::usage(5, 2)],
        ])
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    async fn generate(&self, req: GenerateRequest) -> anyhow::Result<DeltaStream> {
        *self.last_request.lock().unwrap() = Some(req);
        let deltas = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Default fallback when all scripts are consumed
                vec![Delta::content("[no more scripts]")]
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<Delta>> = deltas.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

/// A provider whose stream never yields.  Used to exercise the per-turn
/// deadline.
#[derive(Default)]
pub struct StalledProvider;

#[async_trait]
impl ModelProvider for StalledProvider {
    fn name(&self) -> &str {
        "stalled-mock"
    }

    async fn generate(&self, _req: GenerateRequest) -> anyhow::Result<DeltaStream> {
        Ok(Box::pin(stream::pending()))
    }
}

/// A provider that fails every request with a transport-shaped error.
#[derive(Default)]
pub struct FailingProvider;

#[async_trait]
impl ModelProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing-mock"
    }

    async fn generate(&self, _req: GenerateRequest) -> anyhow::Result<DeltaStream> {
        anyhow::bail!("connection refused")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::Message;

    fn req() -> GenerateRequest {
        GenerateRequest {
            provider: "mock".into(),
            model: "mock-model".into(),
            messages: vec![Message::user("hi")],
        }
    }

    #[tokio::test]
    async fn scripted_single_text_reply() {
        let p = ScriptedProvider::always_text("hello world");
        let mut stream = p.generate(req()).await.unwrap();
        let d = stream.next().await.unwrap().unwrap();
        assert_eq!(d.content.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn scripted_records_last_request() {
        let p = ScriptedProvider::always_text("ok");
        let _ = p.generate(req()).await.unwrap();
        let seen = p.last_request.lock().unwrap();
        assert_eq!(seen.as_ref().unwrap().messages.len(), 1);
    }

    #[tokio::test]
    async fn scripted_tool_then_text_two_turns() {
        let p = ScriptedProvider::tool_then_text("call-1", "shell", r#"{"command":"ls"}"#, "done");

        let mut first = Vec::new();
        let mut stream = p.generate(req()).await.unwrap();
        while let Some(d) = stream.next().await {
            first.push(d.unwrap());
        }
        assert!(first.iter().any(|d| d.tool_calls.iter().any(|c| c.name == "shell")));

        let mut second = Vec::new();
        let mut stream2 = p.generate(req()).await.unwrap();
        while let Some(d) = stream2.next().await {
            second.push(d.unwrap());
        }
        assert!(second.iter().any(|d| d.content.as_deref() == Some("done")));
    }

    #[tokio::test]
    async fn scripted_fallback_when_scripts_exhausted() {
        let p = ScriptedProvider::new(vec![]);
        let mut stream = p.generate(req()).await.unwrap();
        let d = stream.next().await.unwrap().unwrap();
        assert!(d.content.unwrap().contains("no more scripts"));
    }

    #[tokio::test]
    async fn failing_provider_errors_on_generate() {
        let p = FailingProvider;
        assert!(p.generate(req()).await.is_err());
    }
}
