// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use runa_model::{GenerateRequest, ModelProvider};

use crate::{
    accum::StreamAccumulator,
    agent::TurnState,
    bus::EventBus,
    events::{AgentEvent, ChatEvent, ChatPublisher, StreamOutcome},
    machine::{AgentState, StateMachine},
};

/// One streaming turn against the model, run as its own task.
///
/// The worker owns its accumulator; the only shared state it touches is the
/// turn state, and only on the failure path (to drive the machine into
/// `Error` under the handler lock).  On success it reports back through the
/// bus and lets the controller record the outcome.
pub(crate) struct StreamWorker {
    pub model: Arc<dyn ModelProvider>,
    pub req: GenerateRequest,
    pub timeout_seconds: u64,
    pub chat: ChatPublisher,
    pub bus: EventBus,
    pub machine: Arc<StateMachine>,
    pub state: Arc<Mutex<TurnState>>,
    pub cancel: CancellationToken,
    pub request_id: String,
}

impl StreamWorker {
    pub(crate) async fn run(self) {
        let started = Instant::now();
        let secs = self.timeout_seconds.max(1);
        let outcome = tokio::select! {
            biased;
            // Parent cancellation: drop the in-flight stream and let the
            // event loop drive the Cancelled transition.
            _ = self.cancel.cancelled() => return,
            r = tokio::time::timeout(Duration::from_secs(secs), self.consume(started)) => r,
        };
        match outcome {
            Err(_elapsed) => {
                self.fail(format!("streaming request timed out after {secs} seconds"))
                    .await;
            }
            Ok(Err(e)) => self.fail(format!("model stream failed: {e:#}")).await,
            Ok(Ok(outcome)) => {
                self.bus.send(AgentEvent::StreamCompleted(outcome)).await;
            }
        }
    }

    async fn consume(&self, started: Instant) -> anyhow::Result<StreamOutcome> {
        let mut stream = self.model.generate(self.req.clone()).await?;
        let mut acc = StreamAccumulator::new();
        while let Some(item) = stream.next().await {
            let delta = item?;
            if let Some(content) = &delta.content {
                if !content.is_empty() {
                    self.chat.publish(ChatEvent::Chunk {
                        request_id: self.request_id.clone(),
                        content: content.clone(),
                    });
                }
            }
            acc.absorb(&delta);
        }
        Ok(acc.finish(started))
    }

    /// Timeout or transport failure: surface a chat error, drive the machine
    /// into `Error`, and wake the event loop so it observes the terminal
    /// state.
    async fn fail(&self, message: String) {
        warn!(request_id = %self.request_id, %message, "streaming turn failed");
        self.chat.publish(ChatEvent::Error {
            request_id: self.request_id.clone(),
            message,
        });
        {
            let st = self.state.lock().await;
            if !self.machine.current().is_terminal() {
                let _ = self.machine.transition(AgentState::Error, &st.ctx);
            }
        }
        self.bus.send(AgentEvent::MessageReceived).await;
    }
}
