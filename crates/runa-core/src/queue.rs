// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::Mutex;

use runa_model::{ConversationEntry, Message};

/// The cross-agent message queue.
///
/// External producers enqueue user-role entries at any time; the agent drains
/// only between turns (never mid-stream), so enqueues that arrive during a
/// streaming turn are observed at the next transition.
pub trait MessageQueue: Send + Sync {
    fn is_empty(&self) -> bool;
    fn len(&self) -> usize;
    fn enqueue(&self, entry: ConversationEntry);
    /// Atomically remove and return all enqueued entries in enqueue order.
    fn drain(&self) -> Vec<ConversationEntry>;

    /// Convenience for the common case of a plain text user message.
    fn enqueue_user(&self, text: &str) {
        self.enqueue(ConversationEntry::new(Message::user(text)));
    }
}

/// Process-local queue backed by a mutex-guarded deque.
#[derive(Default)]
pub struct InMemoryMessageQueue {
    entries: Mutex<VecDeque<ConversationEntry>>,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageQueue for InMemoryMessageQueue {
    fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn enqueue(&self, entry: ConversationEntry) {
        self.entries.lock().unwrap().push_back(entry);
    }

    fn drain(&self) -> Vec<ConversationEntry> {
        let mut q = self.entries.lock().unwrap();
        q.drain(..).collect()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
