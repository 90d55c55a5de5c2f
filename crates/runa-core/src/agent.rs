// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use runa_config::Config;
use runa_model::{
    ConversationEntry, GenerateRequest, Message, ModelProvider, Role, ToolCall,
    ToolExecutionRecord, Usage,
};
use runa_tools::{ApprovalPolicy, ApprovalRequester, ToolExecutor};

use crate::{
    approval::ApprovalWorker,
    bus::EventBus,
    collab::{AgentModeSource, MetricsStore, TaskTracker},
    context::AgentContext,
    events::{AgentEvent, ChatEvent, ChatPublisher},
    machine::{AgentState, StateMachine},
    queue::MessageQueue,
    repo::ConversationRepository,
    stream::StreamWorker,
};

/// External collaborators wired into one agent instance.
///
/// The core never constructs these itself — frontends own transport, tool
/// implementations, persistence and UI, and hand the seams in here.
pub struct Collaborators {
    pub model: Arc<dyn ModelProvider>,
    pub repository: Arc<dyn ConversationRepository>,
    pub queue: Arc<dyn MessageQueue>,
    pub executor: Arc<dyn ToolExecutor>,
    /// Collects per-tool user decisions.  May be absent when the policy
    /// never requires approval.
    pub approval: Option<Arc<dyn ApprovalRequester>>,
    pub approval_policy: Option<Arc<dyn ApprovalPolicy>>,
    pub modes: Arc<dyn AgentModeSource>,
    pub tasks: Arc<dyn TaskTracker>,
    pub metrics: Arc<dyn MetricsStore>,
    pub chat: ChatPublisher,
}

/// Scratch state for one sequential approval episode.
#[derive(Default)]
pub(crate) struct ApprovalEpisode {
    pub pending: Vec<ToolCall>,
    pub index: usize,
    pub results: Vec<ConversationEntry>,
}

/// All mutable run state, guarded by the handler lock.
///
/// Exactly one task at a time holds this lock while running handler code or
/// mutating the context; the streaming and approval workers take it only for
/// short mutations and never across a prompt or a model read.
pub(crate) struct TurnState {
    pub ctx: AgentContext,
    pub approval: ApprovalEpisode,
    pub last_usage: Option<Usage>,
    pub last_reasoning: String,
    /// The final chat-complete for the current response cycle has been
    /// published.  Reset when a new cycle begins.
    pub final_complete_sent: bool,
    pub background_wait_scheduled: bool,
}

impl TurnState {
    pub fn append_entry(&mut self, repo: &dyn ConversationRepository, entry: ConversationEntry) {
        // Storage is best-effort: the in-memory conversation stays consistent
        // even when the repository write fails.
        if let Err(e) = repo.add_message(&entry) {
            warn!(error = %format!("{e:#}"), "failed to persist conversation entry");
        }
        self.ctx.conversation.push(entry);
    }

    pub fn next_pending_tool(&self) -> Option<ToolCall> {
        self.approval.pending.get(self.approval.index).cloned()
    }

    /// Move everything queued into the conversation, in enqueue order.
    pub fn drain_queue(&mut self, repo: &dyn ConversationRepository) -> usize {
        let drained = self.ctx.queue.drain();
        let count = drained.len();
        for entry in drained {
            self.append_entry(repo, entry);
        }
        if count > 0 {
            debug!(count, "drained queued messages into the conversation");
        }
        count
    }

    fn last_assistant_text(&self) -> String {
        self.ctx
            .conversation
            .iter()
            .rev()
            .find(|e| e.message.role == Role::Assistant)
            .and_then(|e| e.message.as_text())
            .unwrap_or_default()
            .to_string()
    }
}

type StateHandler = for<'a> fn(&'a Driver, AgentEvent) -> BoxFuture<'a, ()>;

fn h_idle<'a>(d: &'a Driver, ev: AgentEvent) -> BoxFuture<'a, ()> {
    d.on_idle(ev).boxed()
}
fn h_checking_queue<'a>(d: &'a Driver, ev: AgentEvent) -> BoxFuture<'a, ()> {
    d.on_checking_queue(ev).boxed()
}
fn h_streaming<'a>(d: &'a Driver, ev: AgentEvent) -> BoxFuture<'a, ()> {
    d.on_streaming(ev).boxed()
}
fn h_post_stream<'a>(d: &'a Driver, ev: AgentEvent) -> BoxFuture<'a, ()> {
    d.on_post_stream(ev).boxed()
}
fn h_evaluating<'a>(d: &'a Driver, ev: AgentEvent) -> BoxFuture<'a, ()> {
    d.on_evaluating_tools(ev).boxed()
}
fn h_approving<'a>(d: &'a Driver, ev: AgentEvent) -> BoxFuture<'a, ()> {
    d.on_approving_tools(ev).boxed()
}
fn h_executing<'a>(d: &'a Driver, ev: AgentEvent) -> BoxFuture<'a, ()> {
    d.on_executing_tools(ev).boxed()
}
fn h_post_tools<'a>(d: &'a Driver, ev: AgentEvent) -> BoxFuture<'a, ()> {
    d.on_post_tool_execution(ev).boxed()
}
fn h_completing<'a>(d: &'a Driver, ev: AgentEvent) -> BoxFuture<'a, ()> {
    d.on_completing(ev).boxed()
}
fn h_terminal<'a>(d: &'a Driver, ev: AgentEvent) -> BoxFuture<'a, ()> {
    d.on_terminal(ev).boxed()
}

fn register_handlers() -> HashMap<AgentState, StateHandler> {
    let mut handlers: HashMap<AgentState, StateHandler> = HashMap::new();
    handlers.insert(AgentState::Idle, h_idle);
    handlers.insert(AgentState::CheckingQueue, h_checking_queue);
    handlers.insert(AgentState::StreamingLlm, h_streaming);
    handlers.insert(AgentState::PostStream, h_post_stream);
    handlers.insert(AgentState::EvaluatingTools, h_evaluating);
    handlers.insert(AgentState::ApprovingTools, h_approving);
    handlers.insert(AgentState::ExecutingTools, h_executing);
    handlers.insert(AgentState::PostToolExecution, h_post_tools);
    handlers.insert(AgentState::Completing, h_completing);
    // Terminal handlers are deliberate no-ops; the loop exits right after.
    handlers.insert(AgentState::Cancelled, h_terminal);
    handlers.insert(AgentState::Error, h_terminal);
    handlers.insert(AgentState::Stopped, h_terminal);
    handlers
}

/// Shared innards of the agent: everything the event loop, the handlers and
/// the spawned workers need.
pub(crate) struct Driver {
    pub machine: Arc<StateMachine>,
    pub state: Arc<Mutex<TurnState>>,
    pub deps: Collaborators,
    pub cfg: Arc<Config>,
    pub bus: EventBus,
    pub cancel: CancellationToken,
    pub request_id: String,
    handlers: HashMap<AgentState, StateHandler>,
}

impl Driver {
    async fn dispatch(&self, event: AgentEvent) {
        let state = self.machine.current();
        match self.handlers.get(&state) {
            Some(handler) => handler(self, event).await,
            None => error!(%state, "no handler registered for state"),
        }
    }

    async fn emit(&self, event: AgentEvent) {
        self.bus.send(event).await;
    }

    fn try_transition(&self, ctx: &AgentContext, to: AgentState) -> bool {
        match self.machine.transition(to, ctx) {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "state transition rejected");
                false
            }
        }
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    async fn on_idle(&self, event: AgentEvent) {
        let mut st = self.state.lock().await;
        if matches!(event, AgentEvent::CompletionRequested) {
            st.ctx.completion_requested = true;
        }
        // A new response cycle begins.
        st.final_complete_sent = false;
        if self.try_transition(&st.ctx, AgentState::CheckingQueue) {
            drop(st);
            self.emit(AgentEvent::MessageReceived).await;
        }
    }

    async fn on_checking_queue(&self, event: AgentEvent) {
        let mut st = self.state.lock().await;
        if matches!(event, AgentEvent::CompletionRequested) {
            st.ctx.completion_requested = true;
        }

        // Pending tool results must reach the model before anything else,
        // unless the turn budget is already spent.
        if st.ctx.has_tool_results && !st.ctx.max_turns_reached() {
            self.begin_streaming(&mut st).await;
            return;
        }

        let drained = st.drain_queue(self.deps.repository.as_ref());
        let tasks_pending = !self.deps.tasks.polling_tasks().is_empty();
        if drained == 0
            && tasks_pending
            && !st.ctx.awaiting_response()
            && !st.ctx.has_tool_results
            && !st.ctx.completion_requested
        {
            // Nothing to respond to, but external jobs are still running:
            // stay here and re-check after a bounded delay.
            self.schedule_background_wait(&mut st);
            return;
        }

        if st.ctx.completion_requested || st.ctx.max_turns_reached() || st.ctx.can_complete() {
            match self.machine.transition(AgentState::Completing, &st.ctx) {
                Ok(_) => {}
                Err(e) => {
                    // A message landed between the check and the guard;
                    // stay and look again.
                    debug!(error = %e, "completion rejected; re-checking queue");
                }
            }
            drop(st);
            self.emit(AgentEvent::MessageReceived).await;
            return;
        }

        self.begin_streaming(&mut st).await;
    }

    async fn begin_streaming(&self, st: &mut TurnState) {
        // Throttle between consecutive turns.
        if st.ctx.turns > 0 && self.cfg.agent.iteration_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.cfg.agent.iteration_delay_ms)).await;
        }
        if self.try_transition(&st.ctx, AgentState::StreamingLlm) {
            self.emit(AgentEvent::StartStreaming).await;
        }
    }

    async fn on_streaming(&self, event: AgentEvent) {
        match event {
            AgentEvent::StartStreaming => {
                let mut st = self.state.lock().await;
                self.maybe_inject_reminder(&mut st);
                st.ctx.turns += 1;
                st.ctx.has_tool_results = false;
                st.ctx.tool_calls.clear();
                let req = GenerateRequest {
                    provider: self.cfg.agent.provider.clone(),
                    model: self.cfg.agent.model.clone(),
                    messages: st.ctx.messages_for_model(),
                };
                debug!(turn = st.ctx.turns, "starting streaming turn");
                drop(st);
                let worker = StreamWorker {
                    model: Arc::clone(&self.deps.model),
                    req,
                    timeout_seconds: self.cfg.agent.timeout_seconds,
                    chat: self.deps.chat.clone(),
                    bus: self.bus.clone(),
                    machine: Arc::clone(&self.machine),
                    state: Arc::clone(&self.state),
                    cancel: self.cancel.clone(),
                    request_id: self.request_id.clone(),
                };
                tokio::spawn(worker.run());
            }
            AgentEvent::StreamCompleted(outcome) => {
                let mut st = self.state.lock().await;
                st.ctx.tool_calls = outcome.tool_calls.clone();
                if outcome.usage.is_some() {
                    st.last_usage = outcome.usage;
                }
                st.last_reasoning = outcome.reasoning.clone();
                let entry = ConversationEntry::new(outcome.message)
                    .with_model(self.cfg.agent.model.clone());
                st.append_entry(self.deps.repository.as_ref(), entry);
                info!(
                    turn = st.ctx.turns,
                    elapsed_ms = outcome.started_at.elapsed().as_millis() as u64,
                    tool_calls = st.ctx.tool_calls.len(),
                    "streaming turn completed"
                );
                if self.try_transition(&st.ctx, AgentState::PostStream) {
                    drop(st);
                    self.emit(AgentEvent::MessageReceived).await;
                }
            }
            AgentEvent::CompletionRequested => {
                self.state.lock().await.ctx.completion_requested = true;
            }
            other => debug!(event = ?other, "ignoring event while streaming"),
        }
    }

    async fn on_post_stream(&self, event: AgentEvent) {
        let mut st = self.state.lock().await;
        if matches!(event, AgentEvent::CompletionRequested) {
            st.ctx.completion_requested = true;
        }
        if !st.ctx.queue.is_empty() {
            if self.try_transition(&st.ctx, AgentState::CheckingQueue) {
                drop(st);
                self.emit(AgentEvent::MessageReceived).await;
            }
            return;
        }
        if !st.ctx.tool_calls.is_empty() {
            if self.try_transition(&st.ctx, AgentState::EvaluatingTools) {
                drop(st);
                self.emit(AgentEvent::MessageReceived).await;
            }
            return;
        }
        if st.ctx.can_complete() {
            // The guard re-checks the queue: a message that landed since the
            // check above sends us back to the queue instead.
            match self.machine.transition(AgentState::Completing, &st.ctx) {
                Ok(_) => self.publish_final_complete(&mut st),
                Err(_) => {
                    let _ = self.machine.transition(AgentState::CheckingQueue, &st.ctx);
                }
            }
            drop(st);
            self.emit(AgentEvent::MessageReceived).await;
            return;
        }
        if self.try_transition(&st.ctx, AgentState::CheckingQueue) {
            drop(st);
            self.emit(AgentEvent::MessageReceived).await;
        }
    }

    async fn on_evaluating_tools(&self, event: AgentEvent) {
        let mut st = self.state.lock().await;
        let calls = st.ctx.tool_calls.clone();
        if calls.is_empty() {
            error!(event = ?event, "evaluating tools with no tool calls");
            if self.try_transition(&st.ctx, AgentState::CheckingQueue) {
                drop(st);
                self.emit(AgentEvent::MessageReceived).await;
            }
            return;
        }

        // Observers learn of the call set before anything executes.
        self.deps.chat.publish(ChatEvent::Complete {
            request_id: self.request_id.clone(),
            content: st.last_assistant_text(),
            tool_calls: calls.clone(),
            reasoning: st.last_reasoning.clone(),
            usage: st.last_usage,
            metrics: None,
        });

        if st.ctx.requires_approval() {
            st.approval = ApprovalEpisode {
                pending: calls,
                index: 0,
                results: Vec::new(),
            };
            if self.try_transition(&st.ctx, AgentState::ApprovingTools) {
                drop(st);
                let worker = ApprovalWorker {
                    requester: self.deps.approval.clone(),
                    executor: Arc::clone(&self.deps.executor),
                    modes: Arc::clone(&self.deps.modes),
                    repository: Arc::clone(&self.deps.repository),
                    chat: self.deps.chat.clone(),
                    bus: self.bus.clone(),
                    state: Arc::clone(&self.state),
                    cancel: self.cancel.clone(),
                    request_id: self.request_id.clone(),
                };
                tokio::spawn(worker.run());
            }
        } else if self.try_transition(&st.ctx, AgentState::ExecutingTools) {
            drop(st);
            let executor = Arc::clone(&self.deps.executor);
            let bus = self.bus.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let results = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    r = executor.execute_parallel(&calls) => r,
                };
                bus.send(AgentEvent::ToolsCompleted { results }).await;
            });
        }
    }

    async fn on_approving_tools(&self, event: AgentEvent) {
        match event {
            AgentEvent::AllToolsProcessed => {
                let st = self.state.lock().await;
                if self.try_transition(&st.ctx, AgentState::PostToolExecution) {
                    drop(st);
                    self.emit(AgentEvent::MessageReceived).await;
                }
            }
            AgentEvent::ApprovalFailed { error } => {
                let st = self.state.lock().await;
                warn!(error = %error, "approval collection failed");
                self.deps.chat.publish(ChatEvent::Error {
                    request_id: self.request_id.clone(),
                    message: format!("tool approval failed: {error}"),
                });
                let _ = self.try_transition(&st.ctx, AgentState::Error);
            }
            AgentEvent::CompletionRequested => {
                self.state.lock().await.ctx.completion_requested = true;
            }
            other => debug!(event = ?other, "ignoring event while approving tools"),
        }
    }

    async fn on_executing_tools(&self, event: AgentEvent) {
        match event {
            AgentEvent::ToolsCompleted { results } => {
                let mut st = self.state.lock().await;
                if self.deps.executor.should_stop(&results) {
                    self.try_transition(&st.ctx, AgentState::Stopped);
                    return;
                }
                for result in &results {
                    let content = self.deps.repository.format_tool_result_for_llm(result);
                    let entry = ConversationEntry::new(Message::tool_result(
                        &result.call_id,
                        &content,
                    ))
                    .with_tool_execution(ToolExecutionRecord {
                        tool_name: result.tool_name.clone(),
                        arguments: result.arguments.clone(),
                        output: result.content.clone(),
                        success: !result.is_error,
                    });
                    st.append_entry(self.deps.repository.as_ref(), entry);
                }
                st.ctx.has_tool_results = true;
                if self.try_transition(&st.ctx, AgentState::PostToolExecution) {
                    drop(st);
                    self.emit(AgentEvent::MessageReceived).await;
                }
            }
            AgentEvent::CompletionRequested => {
                self.state.lock().await.ctx.completion_requested = true;
            }
            other => debug!(event = ?other, "ignoring event while executing tools"),
        }
    }

    async fn on_post_tool_execution(&self, event: AgentEvent) {
        let mut st = self.state.lock().await;
        if matches!(event, AgentEvent::CompletionRequested) {
            st.ctx.completion_requested = true;
        }
        if !st.ctx.queue.is_empty() {
            st.drain_queue(self.deps.repository.as_ref());
            if self.try_transition(&st.ctx, AgentState::CheckingQueue) {
                drop(st);
                self.emit(AgentEvent::MessageReceived).await;
            }
            return;
        }
        if st.ctx.max_turns_reached() || st.ctx.completion_requested || st.ctx.can_complete() {
            match self.machine.transition(AgentState::Completing, &st.ctx) {
                Ok(_) => {}
                Err(_) => {
                    let _ = self.machine.transition(AgentState::CheckingQueue, &st.ctx);
                }
            }
            drop(st);
            self.emit(AgentEvent::MessageReceived).await;
            return;
        }
        if self.try_transition(&st.ctx, AgentState::CheckingQueue) {
            drop(st);
            self.emit(AgentEvent::MessageReceived).await;
        }
    }

    async fn on_completing(&self, _event: AgentEvent) {
        // Bounded final check: give late enqueues one delay's worth of time
        // to land before the run settles.
        tokio::time::sleep(Duration::from_millis(self.cfg.agent.iteration_delay_ms)).await;
        let mut st = self.state.lock().await;
        if !st.ctx.queue.is_empty() {
            st.final_complete_sent = false;
            if self.try_transition(&st.ctx, AgentState::CheckingQueue) {
                drop(st);
                self.emit(AgentEvent::MessageReceived).await;
            }
            return;
        }
        self.publish_final_complete(&mut st);
        self.try_transition(&st.ctx, AgentState::Idle);
        // No event here: the loop decides whether to exit or stay alive for
        // background tasks.
    }

    async fn on_terminal(&self, event: AgentEvent) {
        debug!(event = ?event, state = %self.machine.current(), "event ignored in terminal state");
    }

    // ── Support ───────────────────────────────────────────────────────────────

    fn maybe_inject_reminder(&self, st: &mut TurnState) {
        let cfg = &self.cfg.system_reminders;
        if !cfg.enabled || cfg.interval == 0 {
            return;
        }
        // Counted against completed turns, so the first turn never triggers.
        if st.ctx.turns == 0 || st.ctx.turns % cfg.interval != 0 {
            return;
        }
        let entry = ConversationEntry::hidden(Message::user(cfg.reminder_text.clone()));
        st.append_entry(self.deps.repository.as_ref(), entry);
        debug!(turn = st.ctx.turns, "injected hidden reminder");
    }

    fn schedule_background_wait(&self, st: &mut TurnState) {
        if st.background_wait_scheduled {
            return;
        }
        st.background_wait_scheduled = true;
        debug!("background tasks pending; scheduling wake-up");
        let delay = Duration::from_millis(self.cfg.agent.background_poll_delay_ms.max(1));
        let bus = self.bus.clone();
        let cancel = self.cancel.clone();
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                // Cancelled mid-wait: the wake-up must not fire.
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    state.lock().await.background_wait_scheduled = false;
                    bus.send(AgentEvent::MessageReceived).await;
                }
            }
        });
    }

    /// The final chat-complete for the current response cycle, at most once.
    fn publish_final_complete(&self, st: &mut TurnState) {
        if st.final_complete_sent {
            return;
        }
        st.final_complete_sent = true;
        self.deps.chat.publish(ChatEvent::Complete {
            request_id: self.request_id.clone(),
            content: st.last_assistant_text(),
            tool_calls: Vec::new(),
            reasoning: st.last_reasoning.clone(),
            usage: st.last_usage,
            metrics: self.deps.metrics.metrics_for(&self.request_id),
        });
    }

    /// The empty final chat-complete every terminal exit owes its observers.
    fn publish_empty_final(&self, st: &mut TurnState) {
        if st.final_complete_sent {
            return;
        }
        st.final_complete_sent = true;
        self.deps.chat.publish(ChatEvent::Complete {
            request_id: self.request_id.clone(),
            content: String::new(),
            tool_calls: Vec::new(),
            reasoning: String::new(),
            usage: st.last_usage,
            metrics: self.deps.metrics.metrics_for(&self.request_id),
        });
    }

    async fn enter_cancelled(&self) {
        let mut st = self.state.lock().await;
        // Already-terminal runs keep their state (terminal sets are sticky).
        let _ = self.machine.transition(AgentState::Cancelled, &st.ctx);
        info!(request_id = %self.request_id, "run cancelled");
        self.publish_empty_final(&mut st);
    }

    async fn finish_terminal(&self) {
        let mut st = self.state.lock().await;
        self.publish_empty_final(&mut st);
    }
}

/// The single consumer of the event bus.
///
/// Exits on cancellation, on reaching a terminal state, or when the run
/// settles back to idle with no background tasks keeping it alive.
async fn run_event_loop(driver: Arc<Driver>, mut rx: mpsc::Receiver<AgentEvent>) {
    loop {
        let event = tokio::select! {
            biased;
            _ = driver.cancel.cancelled() => {
                driver.enter_cancelled().await;
                break;
            }
            ev = rx.recv() => match ev {
                Some(ev) => ev,
                None => break,
            },
        };
        driver.dispatch(event).await;
        let state = driver.machine.current();
        if state.is_terminal() {
            driver.finish_terminal().await;
            break;
        }
        if state == AgentState::Idle {
            let stay = {
                let st = driver.state.lock().await;
                !driver.deps.tasks.polling_tasks().is_empty() && !st.ctx.completion_requested
            };
            if !stay {
                break;
            }
        }
    }
    debug!(request_id = %driver.request_id, state = %driver.machine.current(), "agent event loop exited");
}

/// The turn controller: owns the run lifecycle and wires the bus, the state
/// machine, the streaming worker and the tool orchestration together.
pub struct Agent {
    driver: Arc<Driver>,
    rx: std::sync::Mutex<Option<mpsc::Receiver<AgentEvent>>>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl Agent {
    /// `is_chat_mode = false` bypasses tool approval regardless of policy
    /// (headless/CI embeddings).
    pub fn new(cfg: Arc<Config>, deps: Collaborators, is_chat_mode: bool) -> Self {
        let request_id = Uuid::new_v4().to_string();
        let (bus, rx) = EventBus::bounded(cfg.agent.event_buffer_size);
        let mut ctx = AgentContext::new(
            request_id.clone(),
            Arc::clone(&deps.queue),
            cfg.agent.max_turns,
        );
        ctx.is_chat_mode = is_chat_mode;
        ctx.approval_policy = deps.approval_policy.clone();
        let state = TurnState {
            ctx,
            approval: ApprovalEpisode::default(),
            last_usage: None,
            last_reasoning: String::new(),
            final_complete_sent: false,
            background_wait_scheduled: false,
        };
        let driver = Arc::new(Driver {
            machine: Arc::new(StateMachine::new()),
            state: Arc::new(Mutex::new(state)),
            deps,
            cfg,
            bus,
            cancel: CancellationToken::new(),
            request_id,
            handlers: register_handlers(),
        });
        Self {
            driver,
            rx: std::sync::Mutex::new(Some(rx)),
            loop_task: Mutex::new(None),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.driver.request_id
    }

    pub fn state(&self) -> AgentState {
        self.driver.machine.current()
    }

    /// Sender half of the bus for external producers (background task
    /// pollers, completion requests).
    pub fn bus(&self) -> EventBus {
        self.driver.bus.clone()
    }

    /// Spawn the event loop and seed it with the first wake-up.
    pub async fn start(&self) {
        let rx = self.rx.lock().unwrap().take();
        let Some(rx) = rx else {
            warn!(request_id = %self.driver.request_id, "agent already started");
            return;
        };
        self.driver.deps.chat.publish(ChatEvent::Start {
            request_id: self.driver.request_id.clone(),
        });
        let handle = tokio::spawn(run_event_loop(Arc::clone(&self.driver), rx));
        *self.loop_task.lock().await = Some(handle);
        self.driver.bus.send(AgentEvent::MessageReceived).await;
    }

    /// Signal cancellation; observed by the event loop, the streaming worker
    /// and the background-task waiter.
    pub fn cancel(&self) {
        self.driver.cancel.cancel();
    }

    /// Block until the event loop exits.  The bus closes when this returns.
    pub async fn wait(&self) {
        let mut guard = self.loop_task.lock().await;
        if let Some(handle) = guard.as_mut() {
            if let Err(e) = handle.await {
                error!(error = %e, "agent event loop task failed");
            }
            *guard = None;
        }
    }

    /// Snapshot of the in-memory conversation.
    pub async fn conversation(&self) -> Vec<ConversationEntry> {
        self.driver.state.lock().await.ctx.conversation.clone()
    }

    pub async fn turns(&self) -> u32 {
        self.driver.state.lock().await.ctx.turns
    }
}
